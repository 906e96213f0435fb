//! `f5secret`: secrets are stored encrypted by the device vault.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use super::{DataCtx, KeywordOutcome};
use crate::platform::{DeviceType, ValidationContext};

/// Prefix of ciphertext produced by the device vault.
pub const CIPHER_PREFIX: &str = "$M$";

const PROTECTED_VAULT: &str = "SecureVault";
const PROTECTED_BASE64: &str = "plainBase64";

pub(super) fn validate(
    data: &DataCtx<'_>,
    ctx: &ValidationContext,
) -> Result<KeywordOutcome, String> {
    let Some(secret) = data.data.as_object() else {
        return Ok(KeywordOutcome::Valid);
    };
    if secret.contains_key("environmentVar") {
        return Ok(KeywordOutcome::Valid);
    }
    let Some(cipher_text) = secret.get("cipherText").and_then(Value::as_str) else {
        return Ok(KeywordOutcome::Valid);
    };
    let protected = secret
        .get("protected")
        .and_then(Value::as_str)
        .unwrap_or("plainText");

    let plain_text = match protected {
        PROTECTED_VAULT => {
            return if cipher_text.starts_with(CIPHER_PREFIX) {
                Ok(KeywordOutcome::Valid)
            } else {
                Err(format!(
                    "'cipherText' should be encrypted by the device vault (start with '{CIPHER_PREFIX}') when 'protected' is '{PROTECTED_VAULT}'"
                ))
            };
        }
        PROTECTED_BASE64 => {
            let bytes = BASE64
                .decode(cipher_text.trim())
                .map_err(|e| format!("unable to decode 'cipherText' as base64: {e}"))?;
            String::from_utf8(bytes)
                .map_err(|e| format!("decoded 'cipherText' is not valid UTF-8: {e}"))?
        }
        _ => cipher_text.to_string(),
    };

    let platform = ctx.platform.clone();
    let mut updated = secret.clone();
    let data_path = data.data_path.to_string();

    Ok(KeywordOutcome::Deferred(Box::new(move || {
        async move {
            let device = platform.device_type().await.map_err(|e| e.to_string())?;
            if device != DeviceType::BigIp {
                return Err(format!(
                    "Specifying a secret is supported on BIG-IP only. Detected device type: '{device}'"
                ));
            }
            debug!(path = %data_path, "encrypting secret");
            let cipher = platform
                .encrypt_secret(&plain_text)
                .await
                .map_err(|e| e.to_string())?;
            updated.insert("cipherText".into(), Value::String(cipher));
            updated.insert("protected".into(), Value::String(PROTECTED_VAULT.into()));
            Ok(Some(Value::Object(updated)))
        }
        .boxed()
    })))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::keywords::test_support::{context, run, run_deferred, MockPlatform};
    use crate::keywords::Keyword;

    #[tokio::test]
    async fn base64_is_decoded_before_encryption() {
        let platform = MockPlatform::new(DeviceType::BigIp);
        let ctx = context(platform.clone());
        let root = json!({"C": {"class": "Telemetry_Consumer", "passphrase": {
            "cipherText": "Zm9v",
            "protected": "plainBase64"
        }}});
        let outcome = run(Keyword::F5Secret, &json!(true), &root, "/C/passphrase", &ctx).unwrap();
        let updated = run_deferred(outcome).await.unwrap().unwrap();

        assert_eq!(*platform.encrypted.lock().unwrap(), vec!["foo".to_string()]);
        assert_eq!(updated["protected"], "SecureVault");
        assert!(updated["cipherText"].as_str().unwrap().starts_with(CIPHER_PREFIX));
    }

    #[tokio::test]
    async fn plain_text_is_encrypted_as_is() {
        let platform = MockPlatform::new(DeviceType::BigIp);
        let ctx = context(platform.clone());
        let root = json!({"s": {"cipherText": "secret"}});
        let outcome = run(Keyword::F5Secret, &json!(true), &root, "/s", &ctx).unwrap();
        run_deferred(outcome).await.unwrap();
        assert_eq!(*platform.encrypted.lock().unwrap(), vec!["secret".to_string()]);
    }

    #[tokio::test]
    async fn non_bigip_device_is_rejected() {
        let platform = MockPlatform::new(DeviceType::Container);
        let ctx = context(platform.clone());
        let root = json!({"s": {"cipherText": "secret", "protected": "plainText"}});
        let outcome = run(Keyword::F5Secret, &json!(true), &root, "/s", &ctx).unwrap();
        let err = run_deferred(outcome).await.unwrap_err();
        assert!(err.contains("supported on BIG-IP only"));
        assert!(platform.encrypted.lock().unwrap().is_empty());
    }

    #[test]
    fn vault_secret_requires_prefix() {
        let ctx = context(MockPlatform::new(DeviceType::BigIp));
        let root = json!({
            "good": {"cipherText": "$M$abc", "protected": "SecureVault"},
            "bad": {"cipherText": "abc", "protected": "SecureVault"}
        });
        let ok = run(Keyword::F5Secret, &json!(true), &root, "/good", &ctx).unwrap();
        assert!(matches!(ok, KeywordOutcome::Valid));
        let err = run(Keyword::F5Secret, &json!(true), &root, "/bad", &ctx).unwrap_err();
        assert!(err.contains("'$M$'"));
    }

    #[test]
    fn environment_variable_passes_immediately() {
        let ctx = context(MockPlatform::new(DeviceType::Container));
        let root = json!({"s": {"environmentVar": "PASSWORD"}});
        let out = run(Keyword::F5Secret, &json!(true), &root, "/s", &ctx).unwrap();
        assert!(matches!(out, KeywordOutcome::Valid));
    }

    #[test]
    fn invalid_base64_fails_synchronously() {
        let ctx = context(MockPlatform::new(DeviceType::BigIp));
        let root = json!({"s": {"cipherText": "***", "protected": "plainBase64"}});
        let err = run(Keyword::F5Secret, &json!(true), &root, "/s", &ctx).unwrap_err();
        assert!(err.contains("base64"));
    }
}

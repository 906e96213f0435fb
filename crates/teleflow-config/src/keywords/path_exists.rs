//! `pathExists`: the referenced file must be readable by the agent.

use futures::FutureExt;
use tracing::debug;

use super::{DataCtx, KeywordOutcome};

pub(super) fn validate(data: &DataCtx<'_>) -> Result<KeywordOutcome, String> {
    let path = data.data.as_str().unwrap_or_default().to_string();
    Ok(KeywordOutcome::Deferred(Box::new(move || {
        async move {
            tokio::fs::File::open(&path)
                .await
                .map_err(|e| format!("Unable to access path \"{path}\": {e}"))?;
            debug!(%path, "path accessible");
            Ok(None)
        }
        .boxed()
    })))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::keywords::test_support::{context, run, run_deferred, MockPlatform};
    use crate::keywords::Keyword;
    use crate::platform::DeviceType;

    #[tokio::test]
    async fn existing_file_passes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let root = json!({"p": file.path().to_str().unwrap()});
        let ctx = context(MockPlatform::new(DeviceType::BigIp));
        let outcome = run(Keyword::PathExists, &json!(true), &root, "/p", &ctx).unwrap();
        assert_eq!(run_deferred(outcome).await, Ok(None));
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let root = json!({"p": "/nonexistent/teleflow/cert.pem"});
        let ctx = context(MockPlatform::new(DeviceType::BigIp));
        let outcome = run(Keyword::PathExists, &json!(true), &root, "/p", &ctx).unwrap();
        let err = run_deferred(outcome).await.unwrap_err();
        assert!(err.starts_with("Unable to access path \"/nonexistent/teleflow/cert.pem\""));
    }
}

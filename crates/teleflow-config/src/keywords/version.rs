use super::{KeywordOutcome, SchemaCtx};
use crate::platform::ValidationContext;

/// `nodeSupportVersion`: the running agent must be at least the configured
/// version for the schema branch to apply.
pub(super) fn validate(
    schema: &SchemaCtx<'_>,
    ctx: &ValidationContext,
) -> Result<KeywordOutcome, String> {
    let raw = schema.config.as_str().unwrap_or_default();
    let required = semver::Version::parse(raw)
        .map_err(|e| format!("invalid minimum version \"{raw}\": {e}"))?;
    if ctx.runtime_version < required {
        return Err(format!(
            "requires runtime version {required} or newer (current: {})",
            ctx.runtime_version
        ));
    }
    Ok(KeywordOutcome::Valid)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::keywords::test_support::{context, run, MockPlatform};
    use crate::keywords::Keyword;
    use crate::platform::DeviceType;

    #[test]
    fn runtime_below_minimum() {
        let mut ctx = context(MockPlatform::new(DeviceType::BigIp));
        ctx.runtime_version = semver::Version::new(1, 2, 0);
        let root = json!({"protocol": "grpc"});

        let err = run(Keyword::NodeSupportVersion, &json!("8.11.1"), &root, "/protocol", &ctx)
            .unwrap_err();
        assert!(err.contains("requires runtime version 8.11.1"));

        assert!(run(Keyword::NodeSupportVersion, &json!("1.2.0"), &root, "/protocol", &ctx).is_ok());
    }
}

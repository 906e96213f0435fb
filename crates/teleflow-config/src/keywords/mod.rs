//! Custom schema keywords.
//!
//! Every keyword receives the schema side (its own configuration, the
//! schema object it sits in) and the data side (the value, its path, its
//! parent and the whole document) and answers with a [`KeywordOutcome`]:
//! valid, a replacement value for the data, or a deferred asynchronous
//! check. An `Err` carries the message of a failed check.

mod class;
mod connectivity;
mod expand;
mod path_exists;
mod secret;
mod time_window;
mod version;

use std::fmt;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::namespace::{self, NamespaceCtx};
use crate::platform::ValidationContext;

pub use connectivity::probe as probe_host;
pub use secret::CIPHER_PREFIX;

/// Future produced by a deferred check. `Some(value)` replaces the checked
/// value in the document once the check's group has finished.
pub type DeferredFuture = BoxFuture<'static, Result<Option<Value>, String>>;

/// Zero-argument deferred work, invoked only after the synchronous pass
/// succeeded.
pub type DeferredCheck = Box<dyn FnOnce() -> DeferredFuture + Send>;

pub enum KeywordOutcome {
    Valid,
    /// Replace the validated value in place; later keywords see the new value.
    Replace(Value),
    Deferred(DeferredCheck),
}

impl fmt::Debug for KeywordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "Valid"),
            Self::Replace(v) => f.debug_tuple("Replace").field(v).finish(),
            Self::Deferred(_) => write!(f, "Deferred(..)"),
        }
    }
}

/// Schema side of a keyword invocation.
#[derive(Debug, Clone, Copy)]
pub struct SchemaCtx<'s> {
    pub keyword: Keyword,
    /// The keyword's own value in the schema.
    pub config: &'s Value,
    /// The schema object holding the keyword.
    pub parent_schema: &'s Value,
    pub schema_path: &'s str,
}

/// Data side of a keyword invocation.
#[derive(Debug, Clone, Copy)]
pub struct DataCtx<'d> {
    pub data: &'d Value,
    pub data_path: &'d str,
    pub parent: Option<&'d Value>,
    pub property_name: Option<&'d str>,
    pub root: &'d Value,
}

impl DataCtx<'_> {
    /// Namespace the value lives in.
    pub fn namespace(&self) -> NamespaceCtx {
        namespace::namespaced_object(self.data_path, self.root)
    }
}

/// Closed set of custom keywords known to the schema engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    DeclarationClass,
    DeclarationClassProp,
    F5Secret,
    HostConnectivityCheck,
    PathExists,
    TimeWindowMinSize,
    NodeSupportVersion,
    F5Expand,
}

impl Keyword {
    pub const ALL: [Keyword; 8] = [
        Keyword::DeclarationClass,
        Keyword::DeclarationClassProp,
        Keyword::F5Secret,
        Keyword::HostConnectivityCheck,
        Keyword::PathExists,
        Keyword::TimeWindowMinSize,
        Keyword::NodeSupportVersion,
        Keyword::F5Expand,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DeclarationClass => "declarationClass",
            Self::DeclarationClassProp => "declarationClassProp",
            Self::F5Secret => "f5secret",
            Self::HostConnectivityCheck => "hostConnectivityCheck",
            Self::PathExists => "pathExists",
            Self::TimeWindowMinSize => "timeWindowMinSize",
            Self::NodeSupportVersion => "nodeSupportVersion",
            Self::F5Expand => "f5expand",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Keywords that rewrite the value run before every other keyword of
    /// the same schema object.
    pub fn is_modifying(self) -> bool {
        matches!(self, Self::F5Expand)
    }

    /// Schema constraining the keyword's own configuration.
    pub fn metaschema(self) -> Value {
        match self {
            Self::DeclarationClass => json!({"type": "string", "minLength": 1}),
            Self::DeclarationClassProp => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "minLength": 1},
                    "partsNum": {"type": "integer", "minimum": 0}
                },
                "required": ["path"],
                "additionalProperties": false
            }),
            Self::TimeWindowMinSize => json!({"type": "number", "minimum": 0}),
            Self::NodeSupportVersion => json!({"type": "string", "minLength": 1}),
            Self::F5Secret | Self::HostConnectivityCheck | Self::PathExists | Self::F5Expand => {
                json!({"type": "boolean"})
            }
        }
    }

    /// JSON type the keyword inspects; other values pass untouched.
    fn applies_to(self, data: &Value) -> bool {
        match self {
            Self::DeclarationClass
            | Self::DeclarationClassProp
            | Self::HostConnectivityCheck
            | Self::PathExists
            | Self::F5Expand => data.is_string(),
            Self::F5Secret | Self::TimeWindowMinSize => data.is_object(),
            Self::NodeSupportVersion => true,
        }
    }

    pub fn evaluate(
        self,
        schema: &SchemaCtx<'_>,
        data: &DataCtx<'_>,
        ctx: &ValidationContext,
    ) -> Result<KeywordOutcome, String> {
        if schema.config == &Value::Bool(false) || !self.applies_to(data.data) {
            return Ok(KeywordOutcome::Valid);
        }
        match self {
            Self::DeclarationClass => class::declaration_class(schema, data),
            Self::DeclarationClassProp => class::declaration_class_prop(schema, data),
            Self::F5Secret => secret::validate(data, ctx),
            Self::HostConnectivityCheck => connectivity::validate(data, ctx),
            Self::PathExists => path_exists::validate(data),
            Self::TimeWindowMinSize => time_window::validate(schema, data),
            Self::NodeSupportVersion => version::validate(schema, ctx),
            Self::F5Expand => expand::validate(data, ctx),
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::platform::{DeviceType, Platform, PlatformError};

    /// Platform double that records what it was asked to encrypt.
    pub struct MockPlatform {
        pub device: DeviceType,
        pub encrypted: Mutex<Vec<String>>,
    }

    impl MockPlatform {
        pub fn new(device: DeviceType) -> Arc<Self> {
            Arc::new(Self {
                device,
                encrypted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Platform for MockPlatform {
        async fn device_type(&self) -> Result<DeviceType, PlatformError> {
            Ok(self.device)
        }

        async fn encrypt_secret(&self, plain_text: &str) -> Result<String, PlatformError> {
            self.encrypted
                .lock()
                .map_err(|e| PlatformError::Encryption(e.to_string()))?
                .push(plain_text.to_string());
            Ok(format!("{CIPHER_PREFIX}{}", plain_text.len()))
        }
    }

    pub fn context(platform: Arc<MockPlatform>) -> ValidationContext {
        ValidationContext::new(platform)
    }

    /// Evaluate `keyword` on the value at `data_path` in `root`.
    pub fn run(
        keyword: Keyword,
        config: &Value,
        root: &Value,
        data_path: &str,
        ctx: &ValidationContext,
    ) -> Result<KeywordOutcome, String> {
        let data = root.pointer(data_path).expect("data path exists");
        let parent_path = teleflow_core::path::split_last(data_path).map(|(p, _)| p);
        let parent = parent_path.as_deref().and_then(|p| root.pointer(p));
        let property_name = data_path.rsplit('/').next();
        let parent_schema = Value::Object(Default::default());
        let schema = SchemaCtx {
            keyword,
            config,
            parent_schema: &parent_schema,
            schema_path: "#",
        };
        let data = DataCtx {
            data,
            data_path,
            parent,
            property_name,
            root,
        };
        keyword.evaluate(&schema, &data, ctx)
    }

    pub async fn run_deferred(outcome: KeywordOutcome) -> Result<Option<Value>, String> {
        match outcome {
            KeywordOutcome::Deferred(check) => check().await,
            other => panic!("expected deferred outcome, got {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for k in Keyword::ALL {
            assert_eq!(Keyword::from_name(k.name()), Some(k));
        }
        assert_eq!(Keyword::from_name("type"), None);
    }

    #[test]
    fn only_expand_is_modifying() {
        let modifying: Vec<_> = Keyword::ALL.into_iter().filter(|k| k.is_modifying()).collect();
        assert_eq!(modifying, vec![Keyword::F5Expand]);
    }

    #[test]
    fn disabled_keyword_is_noop() {
        let ctx = test_support::context(test_support::MockPlatform::new(
            crate::platform::DeviceType::BigIp,
        ));
        let root = json!({"a": "/definitely/not/here"});
        let out = test_support::run(Keyword::PathExists, &json!(false), &root, "/a", &ctx).unwrap();
        assert!(matches!(out, KeywordOutcome::Valid));
    }
}

//! Class names and lookups shared by the validator and the normalizer.

use serde_json::Value;

pub const CLASS_KEY: &str = "class";

pub const ROOT_CLASS: &str = "Telemetry";
pub const NAMESPACE_CLASS: &str = "Telemetry_Namespace";
pub const SHARED_CLASS: &str = "Shared";
pub const CONTROLS_CLASS: &str = "Controls";
pub const SYSTEM_CLASS: &str = "Telemetry_System";
pub const SYSTEM_POLLER_CLASS: &str = "Telemetry_System_Poller";
pub const IHEALTH_POLLER_CLASS: &str = "Telemetry_iHealth_Poller";
pub const LISTENER_CLASS: &str = "Telemetry_Listener";
pub const CONSUMER_CLASS: &str = "Telemetry_Consumer";
pub const ENDPOINTS_CLASS: &str = "Telemetry_Endpoints";

/// Value of the `class` discriminator, if `value` is an object carrying one.
pub fn class_of(value: &Value) -> Option<&str> {
    value.get(CLASS_KEY).and_then(Value::as_str)
}

/// True if `value` is an object whose `class` equals `class`.
pub fn has_class(value: &Value, class: &str) -> bool {
    class_of(value) == Some(class)
}

pub fn is_namespace(value: &Value) -> bool {
    has_class(value, NAMESPACE_CLASS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn class_lookup() {
        let v = json!({"class": "Telemetry_Namespace", "a": 1});
        assert_eq!(class_of(&v), Some(NAMESPACE_CLASS));
        assert!(is_namespace(&v));
        assert!(!has_class(&v, SHARED_CLASS));
        assert_eq!(class_of(&json!("Telemetry")), None);
        assert_eq!(class_of(&json!({"class": 5})), None);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single formatted validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    /// JSON pointer of the offending value.
    pub data_path: String,
    /// `#`-prefixed pointer into the schema that produced the error.
    pub schema_path: String,
    #[serde(default)]
    pub params: Value,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        keyword: impl Into<String>,
        data_path: impl Into<String>,
        schema_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            property_name: None,
            data_path: data_path.into(),
            schema_path: schema_path.into(),
            params: Value::Object(Default::default()),
            message: message.into(),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_property_name(mut self, name: Option<String>) -> Self {
        self.property_name = name;
        self
    }
}

/// An entry of a failed validation: either a formatted validation error or
/// some other failure passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorEntry {
    Validation(ValidationError),
    Other(String),
}

impl From<ValidationError> for ErrorEntry {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

/// Rejection of a validation attempt with every collected error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationFailure {
    pub errors: Vec<ErrorEntry>,
}

impl ValidationFailure {
    pub fn new(errors: Vec<ErrorEntry>) -> Self {
        Self { errors }
    }

    pub fn single(entry: impl Into<ErrorEntry>) -> Self {
        Self {
            errors: vec![entry.into()],
        }
    }

    /// The error list as a JSON array.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.errors).unwrap_or(Value::Null)
    }

    pub fn validation_errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter_map(|e| match e {
            ErrorEntry::Validation(v) => Some(v),
            ErrorEntry::Other(_) => None,
        })
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl std::error::Error for ValidationFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_camel_case() {
        let e = ValidationError::new("type", "/a", "#/properties/a/type", "should be string")
            .with_params(json!({"type": "string"}));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["dataPath"], "/a");
        assert_eq!(v["schemaPath"], "#/properties/a/type");
        assert!(v.get("propertyName").is_none());
    }

    #[test]
    fn failure_displays_json_array() {
        let failure = ValidationFailure::new(vec![
            ValidationError::new("required", "", "#/required", "should have required property 'class'")
                .into(),
            ErrorEntry::Other("socket closed".into()),
        ]);
        let text = failure.to_string();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[1], "socket closed");
        assert_eq!(failure.validation_errors().count(), 1);
    }
}

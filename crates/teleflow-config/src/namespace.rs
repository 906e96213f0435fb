use serde_json::{Map, Value};
use teleflow_core::declaration;
use teleflow_core::path;

/// Scope a data path belongs to: a named `Telemetry_Namespace` or the
/// default unnamed namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceCtx {
    /// `None` for the default unnamed namespace.
    pub name: Option<String>,
    /// Objects visible from the data path.
    pub scoped: Value,
    /// Data path relative to `scoped`.
    pub data_path: String,
}

impl NamespaceCtx {
    pub fn is_default(&self) -> bool {
        self.name.is_none()
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("default unnamed namespace")
    }
}

/// Determine the namespace of `data_path` inside `root`.
pub fn namespaced_object(data_path: &str, root: &Value) -> NamespaceCtx {
    let segments = path::segments(data_path);

    if let Some(first) = segments.first() {
        if let Some(candidate) = root.get(first.as_str()) {
            if declaration::is_namespace(candidate) {
                return NamespaceCtx {
                    name: Some(first.clone()),
                    scoped: candidate.clone(),
                    data_path: path::join(&segments[1..]),
                };
            }
        }
    }

    let scoped: Map<String, Value> = root
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(_, v)| !declaration::is_namespace(v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    NamespaceCtx {
        name: None,
        scoped: Value::Object(scoped),
        data_path: data_path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decl() -> Value {
        json!({
            "class": "Telemetry",
            "My_System": {"class": "Telemetry_System"},
            "My_Namespace": {
                "class": "Telemetry_Namespace",
                "My_System": {"class": "Telemetry_System", "host": "x"}
            },
            "Other_Namespace": {"class": "Telemetry_Namespace"}
        })
    }

    #[test]
    fn path_inside_named_namespace() {
        let ns = namespaced_object("/My_Namespace/My_System/host", &decl());
        assert_eq!(ns.name.as_deref(), Some("My_Namespace"));
        assert_eq!(ns.data_path, "/My_System/host");
        assert_eq!(ns.scoped["My_System"]["host"], "x");
        assert!(!ns.is_default());
    }

    #[test]
    fn path_in_default_namespace() {
        let ns = namespaced_object("/My_System", &decl());
        assert!(ns.is_default());
        assert_eq!(ns.label(), "default unnamed namespace");
        assert_eq!(ns.data_path, "/My_System");
        let scoped = ns.scoped.as_object().unwrap();
        assert!(scoped.contains_key("My_System"));
        assert!(scoped.contains_key("class"));
        assert!(!scoped.contains_key("My_Namespace"));
        assert!(!scoped.contains_key("Other_Namespace"));
    }

    #[test]
    fn root_path_is_default_namespace() {
        let ns = namespaced_object("", &decl());
        assert!(ns.is_default());
        assert_eq!(ns.data_path, "");
    }

    #[test]
    fn namespace_object_itself() {
        let ns = namespaced_object("/My_Namespace", &decl());
        assert_eq!(ns.name.as_deref(), Some("My_Namespace"));
        assert_eq!(ns.data_path, "");
    }
}

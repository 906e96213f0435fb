use serde::Deserialize;
use serde_json::{Map, Value};

/// Single-key envelopes the device API wraps stats in.
pub const PASS_KEYS: [&str; 4] = ["nestedStats", "value", "description", "color"];

const ENTRIES_KEY: &str = "entries";
const URL_PREFIXES: [&str; 2] = ["https://localhost/", "mgmt/tm/"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceOptions {
    #[serde(default)]
    pub convert_array_to_map: Option<ArrayToMap>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayToMap {
    pub key_name: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl ArrayToMap {
    /// Key an array by `key_name`. Returns the array back when any element
    /// lacks a usable key.
    fn convert(&self, items: Vec<Value>) -> Result<Map<String, Value>, Vec<Value>> {
        let prefix = self.key_prefix.as_deref().unwrap_or_default();
        let mut keys = Vec::with_capacity(items.len());
        for item in &items {
            let key = match item.get(&self.key_name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return Err(items),
            };
            keys.push(format!("{prefix}{key}"));
        }
        Ok(keys.into_iter().zip(items).collect())
    }
}

fn strip_url_prefixes(key: &str) -> String {
    URL_PREFIXES
        .iter()
        .fold(key.to_string(), |key, prefix| key.replacen(prefix, "", 1))
}

/// Strip stat envelopes and `entries` maps, recursively.
pub fn reduce_data(data: Value, opts: &ReduceOptions) -> Value {
    match data {
        Value::Object(mut map) => {
            if map.len() == 1 {
                if let Some(key) = PASS_KEYS.iter().find(|k| map.contains_key(**k)) {
                    let inner = map.remove(*key).unwrap_or(Value::Null);
                    return reduce_data(inner, opts);
                }
            }
            if map.get(ENTRIES_KEY).is_some_and(Value::is_object) {
                if let Some(Value::Object(entries)) = map.remove(ENTRIES_KEY) {
                    return Value::Object(
                        entries
                            .into_iter()
                            .map(|(k, v)| (strip_url_prefixes(&k), reduce_data(v, opts)))
                            .collect(),
                    );
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, reduce_data(v, opts)))
                    .collect(),
            )
        }
        Value::Array(items) => match &opts.convert_array_to_map {
            Some(conv) => match conv.convert(items) {
                Ok(map) => reduce_data(Value::Object(map), opts),
                Err(items) => reduce_items(items, opts),
            },
            None => reduce_items(items, opts),
        },
        scalar => scalar,
    }
}

fn reduce_items(items: Vec<Value>, opts: &ReduceOptions) -> Value {
    Value::Array(items.into_iter().map(|v| reduce_data(v, opts)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reduce(data: Value) -> Value {
        reduce_data(data, &ReduceOptions::default())
    }

    #[test]
    fn unwraps_envelope_chain() {
        assert_eq!(reduce(json!({"nestedStats": {"value": 5}})), json!(5));
        assert_eq!(reduce(json!({"description": "up"})), json!("up"));
    }

    #[test]
    fn multi_key_objects_are_kept() {
        let data = json!({"value": 1, "other": {"color": "green"}});
        assert_eq!(reduce(data), json!({"value": 1, "other": "green"}));
    }

    #[test]
    fn entries_urls_are_stripped() {
        let data = json!({"entries": {"https://localhost/mgmt/tm/sys/x": {"a": 1}}});
        assert_eq!(reduce(data), json!({"sys/x": {"a": 1}}));
    }

    #[test]
    fn nested_entries() {
        let data = json!({
            "kind": "tm:ltm:virtual:virtualcollectionstats",
            "entries": {
                "https://localhost/mgmt/tm/ltm/virtual/~Common~vs/stats": {
                    "nestedStats": {
                        "entries": {
                            "clientside.curConns": {"value": 3},
                            "tmName": {"description": "/Common/vs"}
                        }
                    }
                }
            }
        });
        assert_eq!(
            reduce(data),
            json!({"ltm/virtual/~Common~vs/stats": {"clientside.curConns": 3, "tmName": "/Common/vs"}})
        );
    }

    #[test]
    fn array_to_map() {
        let opts = ReduceOptions {
            convert_array_to_map: Some(ArrayToMap {
                key_name: "name".into(),
                key_prefix: Some("/Common/".into()),
            }),
        };
        let data = json!([{"name": "a", "v": {"value": 1}}, {"name": "b", "v": 2}]);
        assert_eq!(
            reduce_data(data, &opts),
            json!({"/Common/a": {"name": "a", "v": 1}, "/Common/b": {"name": "b", "v": 2}})
        );

        let keyless = json!([{"name": "a"}, {"id": 2}]);
        assert_eq!(reduce_data(keyless.clone(), &opts), keyless);
    }

    #[test]
    fn scalars_and_arrays_pass_through() {
        assert_eq!(reduce(json!("x")), json!("x"));
        assert_eq!(reduce(json!([{"value": 1}, 2])), json!([1, 2]));
    }
}

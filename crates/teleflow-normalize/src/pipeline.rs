//! The `data` and `event` normalization pipelines.

use serde_json::{Map, Value};
use tracing::debug;

use crate::classifier::{EventClassifier, EVENT_CATEGORY_KEY};
use crate::error::Result;
use crate::filter::{filter_data_by_keys, KeyFilter};
use crate::functions::NormalizeFunction;
use crate::properties::{Properties, StatsProcessor};
use crate::reduce::{reduce_data, ReduceOptions};
use crate::rename::{rename_keys, RenamePatterns};
use crate::tagger::{Action, EventTagger, TagSet};

/// Value of a stat whose data is not in the response.
pub const MISSING_DATA: &str = "missing data";
/// Separates the path segments of [`DataOptions::key`].
pub const KEY_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Default)]
pub struct DataOptions {
    /// Path to the value of interest, segments joined by `::`.
    pub key: Option<String>,
    pub reduce: ReduceOptions,
    pub filter: Option<KeyFilter>,
    pub rename: Option<RenamePatterns>,
    pub functions: Vec<NormalizeFunction>,
    pub tags: Option<TagSet>,
    pub tag_locations: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    pub rename: Option<RenamePatterns>,
    /// Add the category tag.
    pub classify: bool,
    pub tags: Option<TagSet>,
}

fn drill(data: Value, key: &str) -> Option<Value> {
    let mut current = data;
    for segment in key.split(KEY_SEPARATOR).filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(mut map) => map.remove(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.into_iter().nth(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// reduce → drill into `key` → filter → rename → functions → tags.
///
/// A missing `key` segment short-circuits to [`MISSING_DATA`].
pub fn normalize_data(data: Value, opts: &DataOptions, tagger: &EventTagger) -> Result<Value> {
    let mut data = reduce_data(data, &opts.reduce);
    if let Some(key) = &opts.key {
        match drill(data, key) {
            Some(value) => data = value,
            None => {
                debug!(key = %key, "key not found in data");
                return Ok(Value::String(MISSING_DATA.to_string()));
            }
        }
    }
    if let Some(filter) = &opts.filter {
        data = filter_data_by_keys(data, filter);
    }
    if let Some(rename) = &opts.rename {
        data = rename_keys(data, rename);
    }
    for function in &opts.functions {
        data = function.apply(data)?;
    }
    if let Some(tags) = &opts.tags {
        tagger.add_tags(&mut data, tags, opts.tag_locations.as_ref());
    }
    Ok(data)
}

/// Parse a flat `KEY="value",KEY2="value2"` string. `None` when the text
/// is not in that form.
fn parse_key_values(text: &str) -> Option<Map<String, Value>> {
    if text.is_empty() {
        return None;
    }
    let mut map = Map::new();
    for segment in text.split("\",") {
        let (key, value) = segment.split_once('=')?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return None;
        }
        let value = value.trim();
        let value = value.strip_prefix('"').unwrap_or(value);
        let value = value.strip_suffix('"').unwrap_or(value);
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    Some(map)
}

/// Raw event text to a record: JSON objects are taken as is, key=value
/// strings are split, anything else is kept under `data`.
pub fn parse_event(raw: &str) -> Map<String, Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
            return map;
        }
    }
    parse_key_values(trimmed).unwrap_or_else(|| {
        let mut map = Map::new();
        map.insert("data".to_string(), Value::String(raw.to_string()));
        map
    })
}

/// parse → rename → category → tags.
pub fn normalize_event(
    raw: &str,
    opts: &EventOptions,
    classifier: &EventClassifier,
    tagger: &EventTagger,
) -> Value {
    let mut data = Value::Object(parse_event(raw));
    if let Some(rename) = &opts.rename {
        data = rename_keys(data, rename);
    }
    if opts.classify {
        if let Value::Object(map) = &mut data {
            if !map.contains_key(EVENT_CATEGORY_KEY) {
                let category = classifier.classify(map, Some(raw)).to_string();
                map.insert(EVENT_CATEGORY_KEY.to_string(), Value::String(category));
            }
        }
    }
    if let Some(tags) = &opts.tags {
        tagger.add_tags(&mut data, tags, None);
    }
    data
}

/// Stats and event normalization configured from one set of properties
/// definitions.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stats: StatsProcessor,
    classifier: EventClassifier,
    event_options: EventOptions,
}

impl Normalizer {
    pub fn new(properties: &Properties) -> Result<Self> {
        let mut classifier = EventClassifier::with_defaults();
        for rule in &properties.events.rules {
            classifier.add_rule(rule)?;
        }
        if let Some(category) = &properties.events.default_category {
            classifier.set_default_category(category.clone());
        }
        let event_options = EventOptions {
            rename: properties
                .events
                .rename_keys
                .as_ref()
                .map(RenamePatterns::from_definition)
                .transpose()?,
            classify: true,
            tags: properties.global_tags()?,
        };
        Ok(Self {
            stats: StatsProcessor::new(properties)?,
            classifier,
            event_options,
        })
    }

    /// Normalizer for the built-in properties definitions.
    pub fn embedded() -> Result<Self> {
        Self::new(&Properties::embedded()?)
    }

    pub fn set_default_category(&mut self, category: impl Into<String>) {
        self.classifier.set_default_category(category);
    }

    pub fn event(&self, raw: &str) -> Value {
        normalize_event(raw, &self.event_options, &self.classifier, self.stats.tagger())
    }

    pub fn data(&self, data: Value, opts: &DataOptions) -> Result<Value> {
        normalize_data(data, opts, self.stats.tagger())
    }

    /// Build the system info record from endpoint responses.
    pub fn stats(&self, raw: &Value) -> Result<Value> {
        self.stats.process(raw)
    }

    pub fn handle_actions(&self, data: &mut Value, actions: &[Action]) -> Result<()> {
        self.stats.tagger().handle_actions(data, actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_pipeline_order() {
        let raw = json!({
            "entries": {
                "https://localhost/mgmt/tm/sys/x": {
                    "nestedStats": {"entries": {
                        "keepA": {"value": 1},
                        "keepB": {"value": 3},
                        "drop": {"value": 2}
                    }}
                }
            }
        });
        let opts = DataOptions {
            key: Some("sys/x".into()),
            filter: Some(KeyFilter::exclude(["drop"])),
            rename: Some(RenamePatterns::parse(&json!({"keep": {"constant": "v"}}), false).unwrap()),
            ..Default::default()
        };
        // Both keys rename to "v"; the later one wins.
        let out = normalize_data(raw, &opts, &EventTagger::default()).unwrap();
        assert_eq!(out, json!({"v": 3}));
    }

    #[test]
    fn missing_key_yields_sentinel() {
        let opts = DataOptions {
            key: Some("a::missing".into()),
            functions: vec![NormalizeFunction::GetSum],
            ..Default::default()
        };
        let out = normalize_data(json!({"a": {"b": 1}}), &opts, &EventTagger::default()).unwrap();
        assert_eq!(out, json!(MISSING_DATA));
    }

    #[test]
    fn drill_into_arrays() {
        let opts = DataOptions {
            key: Some("items::1::name".into()),
            ..Default::default()
        };
        let data = json!({"items": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(normalize_data(data, &opts, &EventTagger::default()).unwrap(), json!("b"));
    }

    #[test]
    fn function_errors_propagate() {
        let opts = DataOptions {
            functions: vec![NormalizeFunction::from_definition(
                &json!({"name": "getAverage", "args": {"keyWithValue": "v"}}),
            )
            .unwrap()],
            ..Default::default()
        };
        assert!(normalize_data(json!({"a": {}}), &opts, &EventTagger::default()).is_err());
    }

    #[test]
    fn parse_key_value_event() {
        let map = parse_event(r#"key1="value",key2="value""#);
        assert_eq!(Value::Object(map), json!({"key1": "value", "key2": "value"}));

        let map = parse_event(r#"msg="a=b, c",code="7""#);
        assert_eq!(Value::Object(map), json!({"msg": "a=b, c", "code": "7"}));
    }

    #[test]
    fn parse_other_events() {
        assert_eq!(
            Value::Object(parse_event(r#" {"a": 1} "#)),
            json!({"a": 1})
        );
        assert_eq!(
            Value::Object(parse_event("<134>Jul 1 host message")),
            json!({"data": "<134>Jul 1 host message"})
        );
    }

    #[test]
    fn event_end_to_end_with_properties() {
        let normalizer = Normalizer::embedded().unwrap();
        let out = normalizer.event(r#"key1="value",key2="value""#);
        assert_eq!(
            out,
            json!({"key1": "value", "key2": "value", "telemetryEventCategory": "event"})
        );
    }

    #[test]
    fn event_without_options_is_only_parsed() {
        let out = normalize_event(
            r#"key1="value",key2="value""#,
            &EventOptions::default(),
            &EventClassifier::with_defaults(),
            &EventTagger::default(),
        );
        assert_eq!(out, json!({"key1": "value", "key2": "value"}));
    }

    #[test]
    fn event_classified_and_tagged() {
        let normalizer = Normalizer::embedded().unwrap();
        let out = normalizer.event(
            r#"virtual_name="/Common/app/vs",policy_name="/Common/p",request_status="blocked""#,
        );
        assert_eq!(out["telemetryEventCategory"], "ASM");
        assert_eq!(out["tenant"], "Common");
        assert_eq!(out["application"], "app");
    }

    #[test]
    fn custom_default_category() {
        let mut normalizer = Normalizer::embedded().unwrap();
        normalizer.set_default_category("unknown");
        assert_eq!(normalizer.event("a=\"1\"")["telemetryEventCategory"], "unknown");
        assert_eq!(
            normalizer.event(r#"lsn_event="x",lsn_client="y""#)["telemetryEventCategory"],
            "CGNAT"
        );
    }
}

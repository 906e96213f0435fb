//! Tags and data actions applied to normalized records.
//!
//! Locations are nested objects whose keys select record keys (exact key
//! first, otherwise a regex, `*`/`.*` for every key) and whose leaves are
//! `true`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::classifier::EVENT_CATEGORY_KEY;
use crate::error::{NormalizeError, Result};
use crate::matcher::{find_keys, KeyMatcher};

pub const SYSTEM_INFO_CATEGORY: &str = "systemInfo";

/// Event keys whose value names the resource a pattern tag is derived from,
/// in lookup order.
pub const CLASSIFY_BY_KEYS: [&str; 5] = [
    "virtual_name",
    "policy_name",
    "Access_Profile",
    "context_name",
    "vs_name",
];

static TENANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([^/]*)/").expect("valid tenant regex"));
static APPLICATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[^/]*/([^/]*)/").expect("valid application regex"));

#[derive(Debug, Clone)]
pub enum TagValue {
    Literal(Value),
    /// Derived from a resource name such as `/Tenant/App/vs`.
    Extract(KeyMatcher),
}

impl TagValue {
    /// `` `T` `` and `` `A` `` are the tenant and application built-ins,
    /// `{pattern, group}` a custom extraction, anything else a literal.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s == "`T`" => Ok(Self::Extract(KeyMatcher::Regex {
                pattern: TENANT_RE.clone(),
                group: 1,
            })),
            Value::String(s) if s == "`A`" => Ok(Self::Extract(KeyMatcher::Regex {
                pattern: APPLICATION_RE.clone(),
                group: 1,
            })),
            Value::Object(map) if map.contains_key("pattern") => {
                let pattern = map
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| NormalizeError::Definition("tag pattern must be a string".into()))?;
                let group = map.get("group").and_then(Value::as_u64).unwrap_or(0) as usize;
                Ok(Self::Extract(KeyMatcher::regex(pattern, group)?))
            }
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// Tag value for a record, given the resource name it is derived from.
    fn resolve(&self, source: Option<&str>) -> Option<Value> {
        match self {
            Self::Literal(v) => Some(v.clone()),
            Self::Extract(m) => source
                .and_then(|s| m.extract(s))
                .map(|s| Value::String(s.to_string())),
        }
    }
}

/// Ordered tag definitions.
#[derive(Debug, Clone, Default)]
pub struct TagSet {
    tags: Vec<(String, TagValue)>,
}

impl TagSet {
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| NormalizeError::Definition("tags must be an object".into()))?;
        let tags = map
            .iter()
            .map(|(k, v)| Ok((k.clone(), TagValue::from_value(v)?)))
            .collect::<Result<_>>()?;
        Ok(Self { tags })
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn apply(&self, target: &mut Value, source: Option<&str>) {
        let Value::Object(target) = target else {
            return;
        };
        for (key, value) in self.iter() {
            if let Some(resolved) = value.resolve(source) {
                target.insert(key.to_string(), resolved);
            }
        }
    }
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionDef {
    #[serde(default = "enabled")]
    enable: bool,
    #[serde(default)]
    set_tag: Option<Value>,
    #[serde(default)]
    include_data: Option<Value>,
    #[serde(default)]
    exclude_data: Option<Value>,
    #[serde(default)]
    if_all_match: Option<Value>,
    #[serde(default)]
    locations: Option<Value>,
}

/// One entry of a poller's or listener's `actions` list. Tags and
/// conditions are compiled when the action is parsed.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "ActionDef")]
pub struct Action {
    pub enable: bool,
    pub set_tag: Option<TagSet>,
    pub include_data: bool,
    pub exclude_data: bool,
    pub if_all_match: Option<Conditions>,
    pub locations: Option<Value>,
}

impl TryFrom<ActionDef> for Action {
    type Error = NormalizeError;

    fn try_from(def: ActionDef) -> Result<Self> {
        let set_tag = def.set_tag.as_ref().map(TagSet::from_value).transpose()?;
        let if_all_match = def
            .if_all_match
            .as_ref()
            .map(|v| {
                Conditions::from_value(v)
                    .ok_or_else(|| NormalizeError::Definition("ifAllMatch must be an object".into()))
            })
            .transpose()?;
        Ok(Self {
            enable: def.enable,
            set_tag,
            include_data: def.include_data.is_some(),
            exclude_data: def.exclude_data.is_some(),
            if_all_match,
            locations: def.locations,
        })
    }
}

/// Compiled `ifAllMatch` conditions.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    entries: Vec<Condition>,
}

#[derive(Debug, Clone)]
struct Condition {
    key: String,
    matcher: KeyMatcher,
    expected: Expected,
}

#[derive(Debug, Clone)]
enum Expected {
    Nested(Conditions),
    /// Equal to `value`, or matched by it as a regex.
    Value { value: Value, pattern: Option<Regex> },
}

impl Conditions {
    /// `None` unless `value` is an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let entries = map
            .iter()
            .map(|(key, expected)| Condition {
                key: key.clone(),
                matcher: KeyMatcher::location(key),
                expected: match expected {
                    Value::Object(_) => {
                        Expected::Nested(Conditions::from_value(expected).unwrap_or_default())
                    }
                    Value::String(s) => Expected::Value {
                        value: expected.clone(),
                        pattern: Regex::new(s).ok(),
                    },
                    other => Expected::Value {
                        value: other.clone(),
                        pattern: None,
                    },
                },
            })
            .collect();
        Some(Self { entries })
    }

    /// True when every condition key selects at least one key of `data` and
    /// every selected value satisfies the condition.
    pub fn matches(&self, data: &Value) -> bool {
        let Some(data) = data.as_object() else {
            return false;
        };
        self.entries.iter().all(|cond| {
            if let Some(actual) = data.get(&cond.key) {
                return cond.expected.matches(actual);
            }
            let mut selected = data.iter().filter(|(k, _)| cond.matcher.matches(k)).peekable();
            selected.peek().is_some() && selected.all(|(_, actual)| cond.expected.matches(actual))
        })
    }
}

impl Expected {
    fn matches(&self, actual: &Value) -> bool {
        match self {
            Self::Nested(conditions) => conditions.matches(actual),
            Self::Value { value, .. } if actual == value => true,
            Self::Value {
                pattern: Some(re), ..
            } => match actual {
                Value::String(s) => re.is_match(s),
                Value::Number(_) | Value::Bool(_) => re.is_match(&actual.to_string()),
                _ => false,
            },
            Self::Value { .. } => false,
        }
    }
}

/// Applies tags and actions. Knows which system stats are tagged per item.
#[derive(Debug, Clone, Default)]
pub struct EventTagger {
    tag_stats: Vec<String>,
}

impl EventTagger {
    pub fn new<S: Into<String>>(tag_stats: impl IntoIterator<Item = S>) -> Self {
        Self {
            tag_stats: tag_stats.into_iter().map(Into::into).collect(),
        }
    }

    pub fn handle_actions(&self, data: &mut Value, actions: &[Action]) -> Result<()> {
        for (index, action) in actions.iter().enumerate() {
            if !action.enable {
                continue;
            }
            if let Some(conditions) = &action.if_all_match {
                if !conditions.matches(data) {
                    debug!(action = index, "action conditions not met");
                    continue;
                }
            }
            if let Some(tags) = &action.set_tag {
                self.add_tags(data, tags, action.locations.as_ref());
            } else if action.include_data {
                include_locations(data, required_locations(action, "includeData")?);
            } else if action.exclude_data {
                exclude_locations(data, required_locations(action, "excludeData")?);
            }
        }
        Ok(())
    }

    /// Tag `data` at `locations`, or at the default locations: every item of
    /// the tagged stats for system info, the top level for events.
    pub fn add_tags(&self, data: &mut Value, tags: &TagSet, locations: Option<&Value>) {
        if tags.is_empty() {
            return;
        }
        if let Some(locations) = locations {
            for_each_location(data, locations, &mut |name: &str, target: &mut Value| {
                tags.apply(target, Some(name))
            });
            return;
        }

        let is_system_info =
            data.get(EVENT_CATEGORY_KEY).and_then(Value::as_str) == Some(SYSTEM_INFO_CATEGORY);
        if is_system_info {
            for stat in &self.tag_stats {
                let items: Vec<String> = data
                    .get(stat)
                    .and_then(Value::as_object)
                    .map(|m| m.keys().cloned().collect())
                    .unwrap_or_default();
                for item in &items {
                    for (key, value) in tags.iter() {
                        add_tag(data, key, value, Some(stat.as_str()), Some(item.as_str()));
                    }
                }
            }
        } else {
            for (key, value) in tags.iter() {
                add_tag(data, key, value, None, None);
            }
        }
    }
}

fn required_locations<'a>(action: &'a Action, kind: &str) -> Result<&'a Value> {
    action
        .locations
        .as_ref()
        .ok_or_else(|| NormalizeError::Definition(format!("{kind} requires 'locations'")))
}

/// First classify-by key present in an event record.
fn classify_source(data: &Value) -> Option<String> {
    CLASSIFY_BY_KEYS
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Set one tag. Without a location the tag goes to the top level; with a
/// location to `data[location]`, or `data[stat][location]` when a stat is
/// given. Extracted tags use the location name as source, or a classify-by
/// key of the record. Tags that cannot be derived are skipped.
pub fn add_tag(
    data: &mut Value,
    key: &str,
    value: &TagValue,
    stat: Option<&str>,
    location: Option<&str>,
) {
    let source = match location {
        Some(loc) => Some(loc.to_string()),
        None => classify_source(data),
    };
    let Some(resolved) = value.resolve(source.as_deref()) else {
        return;
    };
    let target = match (stat, location) {
        (Some(stat), Some(loc)) => data.get_mut(stat).and_then(|s| s.get_mut(loc)),
        (None, Some(loc)) => data.get_mut(loc),
        _ => Some(data),
    };
    if let Some(Value::Object(target)) = target {
        target.insert(key.to_string(), resolved);
    }
}

/// True when every condition key matches at least one key of `data` and
/// every matched value equals the expected value or matches it as a regex.
pub fn check_data(data: &Value, conditions: &Value) -> bool {
    Conditions::from_value(conditions).is_some_and(|c| c.matches(data))
}

fn for_each_location<F>(data: &mut Value, locations: &Value, f: &mut F)
where
    F: FnMut(&str, &mut Value),
{
    let (Some(locations), Value::Object(map)) = (locations.as_object(), data) else {
        return;
    };
    for (loc_key, sub) in locations {
        for key in find_keys(map, loc_key) {
            let Some(child) = map.get_mut(&key) else {
                continue;
            };
            match sub {
                Value::Bool(true) => f(&key, child),
                Value::Object(_) => for_each_location(child, sub, f),
                _ => {}
            }
        }
    }
}

/// Keep only the data at `locations`.
fn include_locations(data: &mut Value, locations: &Value) {
    let (Some(locations), Value::Object(map)) = (locations.as_object(), data) else {
        return;
    };
    let mut keep: Vec<(String, &Value)> = Vec::new();
    for (loc_key, sub) in locations {
        keep.extend(find_keys(map, loc_key).into_iter().map(|k| (k, sub)));
    }
    map.retain(|k, _| keep.iter().any(|(kept, _)| kept == k));
    for (key, sub) in keep {
        if sub.is_object() {
            if let Some(child) = map.get_mut(&key) {
                include_locations(child, sub);
            }
        }
    }
}

/// Drop the data at `locations`.
fn exclude_locations(data: &mut Value, locations: &Value) {
    let (Some(locations), Value::Object(map)) = (locations.as_object(), data) else {
        return;
    };
    for (loc_key, sub) in locations {
        for key in find_keys(map, loc_key) {
            match sub {
                Value::Bool(true) => {
                    map.remove(&key);
                }
                Value::Object(_) => {
                    if let Some(child) = map.get_mut(&key) {
                        exclude_locations(child, sub);
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(v: Value) -> TagSet {
        TagSet::from_value(&v).unwrap()
    }

    fn actions(v: Value) -> Vec<Action> {
        serde_json::from_value(v).unwrap()
    }

    fn system_info() -> Value {
        json!({
            "telemetryEventCategory": "systemInfo",
            "system": {"hostname": "bigip1"},
            "virtualServers": {
                "/Common/app/vs1": {"clientside.curConns": 1},
                "/Tenant2/vs2": {"clientside.curConns": 2}
            }
        })
    }

    #[test]
    fn system_info_items_tagged_by_name() {
        let tagger = EventTagger::new(["virtualServers"]);
        let mut data = system_info();
        tagger.add_tags(&mut data, &tags(json!({"tenant": "`T`", "application": "`A`"})), None);

        let vs1 = &data["virtualServers"]["/Common/app/vs1"];
        assert_eq!(vs1["tenant"], "Common");
        assert_eq!(vs1["application"], "app");
        let vs2 = &data["virtualServers"]["/Tenant2/vs2"];
        assert_eq!(vs2["tenant"], "Tenant2");
        assert!(vs2.get("application").is_none());
        assert!(data["system"].get("tenant").is_none());
    }

    #[test]
    fn event_tagged_from_classify_key() {
        let tagger = EventTagger::default();
        let mut data = json!({"virtual_name": "/Common/app/vs", "hostname": "h"});
        tagger.add_tags(
            &mut data,
            &tags(json!({"tenant": "`T`", "application": "`A`", "env": "prod"})),
            None,
        );
        assert_eq!(data["tenant"], "Common");
        assert_eq!(data["application"], "app");
        assert_eq!(data["env"], "prod");
    }

    #[test]
    fn event_without_classify_key_gets_literals_only() {
        let mut data = json!({"msg": "x"});
        EventTagger::default().add_tags(&mut data, &tags(json!({"tenant": "`T`", "a": 1})), None);
        assert_eq!(data, json!({"msg": "x", "a": 1}));
    }

    #[test]
    fn explicit_locations() {
        let tagger = EventTagger::new(["virtualServers"]);
        let mut data = system_info();
        let locations = json!({"virtualServers": {"^/Common/": true}});
        tagger.add_tags(&mut data, &tags(json!({"tenant": "`T`"})), Some(&locations));
        assert_eq!(data["virtualServers"]["/Common/app/vs1"]["tenant"], "Common");
        assert!(data["virtualServers"]["/Tenant2/vs2"].get("tenant").is_none());
    }

    #[test]
    fn add_tag_targets() {
        let mut data = json!({"pools": {"p1": {}}, "system": {}});
        add_tag(&mut data, "a", &TagValue::Literal(json!(1)), None, None);
        add_tag(&mut data, "b", &TagValue::Literal(json!(2)), None, Some("system"));
        add_tag(&mut data, "c", &TagValue::Literal(json!(3)), Some("pools"), Some("p1"));
        add_tag(&mut data, "d", &TagValue::Literal(json!(4)), Some("pools"), Some("missing"));
        assert_eq!(
            data,
            json!({"pools": {"p1": {"c": 3}}, "system": {"b": 2}, "a": 1})
        );
    }

    #[test]
    fn custom_pattern_tag() {
        let value = TagValue::from_value(&json!({"pattern": "-(\\w+)$", "group": 1})).unwrap();
        let mut data = json!({"vs_name": "web-prod"});
        add_tag(&mut data, "env", &value, None, None);
        assert_eq!(data["env"], "prod");
    }

    #[test]
    fn check_data_conditions() {
        let data = json!({
            "system": {"hostname": "bigip1.example.com", "cpu": 12},
            "virtualServers": {"vs1": {"enabled": true}, "vs2": {"enabled": true}}
        });
        assert!(check_data(&data, &json!({"system": {"hostname": "bigip1"}})));
        assert!(check_data(&data, &json!({"system": {"cpu": 12}})));
        assert!(check_data(&data, &json!({"virtualServers": {".*": {"enabled": true}}})));
        assert!(!check_data(&data, &json!({"system": {"hostname": "^other"}})));
        assert!(!check_data(&data, &json!({"pools": {"x": 1}})));
        assert!(!check_data(&data, &json!({"system": {"cpu": 13}})));
    }

    #[test]
    fn conditions_compiled_once_and_reused() {
        let conditions = Conditions::from_value(&json!({
            "system": {"hostname": "^bigip[0-9]+\\.", "cpu": 12},
            "virtualServers": {".*": {"enabled": true}}
        }))
        .unwrap();
        let up = json!({
            "system": {"hostname": "bigip1.example.com", "cpu": 12},
            "virtualServers": {"vs1": {"enabled": true}}
        });
        let down = json!({
            "system": {"hostname": "bigip1.example.com", "cpu": 12},
            "virtualServers": {"vs1": {"enabled": false}}
        });
        assert!(conditions.matches(&up));
        assert!(conditions.matches(&up));
        assert!(!conditions.matches(&down));
        assert!(Conditions::from_value(&json!("x")).is_none());
    }

    #[test]
    fn invalid_actions_rejected_when_parsed() {
        let err = serde_json::from_value::<Vec<Action>>(json!([
            {"setTag": {"env": {"pattern": "("}}}
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));

        let err = serde_json::from_value::<Vec<Action>>(json!([
            {"ifAllMatch": "up", "setTag": {"a": 1}}
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ifAllMatch must be an object"));
    }

    #[test]
    fn actions_honour_enable_and_conditions() {
        let tagger = EventTagger::default();
        let mut data = json!({"virtual_name": "/T1/app/vs", "status": "up"});
        let list = actions(json!([
            {"enable": false, "setTag": {"disabled": true}},
            {"ifAllMatch": {"status": "down"}, "setTag": {"down": true}},
            {"ifAllMatch": {"status": "up"}, "setTag": {"tenant": "`T`"}}
        ]));
        tagger.handle_actions(&mut data, &list).unwrap();
        assert_eq!(data, json!({"virtual_name": "/T1/app/vs", "status": "up", "tenant": "T1"}));
    }

    #[test]
    fn include_and_exclude_data() {
        let tagger = EventTagger::default();
        let mut data = system_info();
        let list = actions(json!([
            {"includeData": {}, "locations": {"virtualServers": {"^/Common/": true}, "system": true}}
        ]));
        tagger.handle_actions(&mut data, &list).unwrap();
        assert_eq!(
            data,
            json!({
                "system": {"hostname": "bigip1"},
                "virtualServers": {"/Common/app/vs1": {"clientside.curConns": 1}}
            })
        );

        let list = actions(json!([
            {"excludeData": {}, "locations": {"virtualServers": {"*": true}}}
        ]));
        tagger.handle_actions(&mut data, &list).unwrap();
        assert_eq!(data["virtualServers"], json!({}));

        let err = tagger
            .handle_actions(&mut data, &actions(json!([{"excludeData": {}}])))
            .unwrap_err();
        assert!(err.to_string().contains("excludeData requires 'locations'"));
    }
}

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{NormalizeError, Result};

/// Key of the category tag added to every normalized record.
pub const EVENT_CATEGORY_KEY: &str = "telemetryEventCategory";
pub const DEFAULT_CATEGORY: &str = "event";

/// A single classification rule: required keys and/or raw-text regex →
/// category.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub category: String,
    pub keys: Vec<String>,
    pub pattern: Option<Regex>,
    pub priority: u8,
}

impl ClassificationRule {
    fn matches(&self, event: &Map<String, Value>, raw: Option<&str>) -> bool {
        let keys_ok = self.keys.iter().all(|k| event.contains_key(k));
        let pattern_ok = match (&self.pattern, raw) {
            (None, _) => true,
            (Some(re), Some(raw)) => re.is_match(raw),
            (Some(_), None) => false,
        };
        keys_ok && pattern_ok
    }
}

/// Rule as written in the properties definitions.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationDef {
    pub category: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub priority: u8,
}

/// Assigns a category to events from the keys they carry.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    rules: Vec<ClassificationRule>,
    default_category: String,
}

impl EventClassifier {
    /// Classifier for the device event sources.
    pub fn with_defaults() -> Self {
        let keyed = |category: &str, keys: &[&str], priority| ClassificationRule {
            category: category.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            pattern: None,
            priority,
        };
        let mut rules = vec![
            keyed("AVR", &["EOCTimestamp", "Microtimestamp"], 10),
            keyed("ASM", &["policy_name", "request_status"], 9),
            keyed("APM", &["Access_Profile", "Session_Id"], 8),
            keyed("AFM", &["acl_policy_name", "acl_rule_name"], 7),
            keyed("LTM", &["event_source", "event_timestamp"], 6),
        ];
        rules.push(ClassificationRule {
            category: "syslog".to_string(),
            keys: Vec::new(),
            pattern: Some(Regex::new(r"^<\d{1,3}>").expect("valid syslog pattern")),
            priority: 1,
        });
        Self {
            rules,
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }

    /// No rules, everything gets the default category.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }

    pub fn set_default_category(&mut self, category: impl Into<String>) {
        self.default_category = category.into();
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    pub fn add_rule(&mut self, def: &ClassificationDef) -> Result<()> {
        let pattern = def
            .pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|e| NormalizeError::Pattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        if def.keys.is_empty() && pattern.is_none() {
            return Err(NormalizeError::Definition(format!(
                "classification rule '{}' needs keys or a pattern",
                def.category
            )));
        }
        self.rules.push(ClassificationRule {
            category: def.category.clone(),
            keys: def.keys.clone(),
            pattern,
            priority: def.priority,
        });
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(())
    }

    /// Category of an event. `raw` is the text the event was parsed from,
    /// when there was one.
    pub fn classify(&self, event: &Map<String, Value>, raw: Option<&str>) -> &str {
        self.rules
            .iter()
            .find(|r| r.matches(event, raw))
            .map(|r| r.category.as_str())
            .unwrap_or(&self.default_category)
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

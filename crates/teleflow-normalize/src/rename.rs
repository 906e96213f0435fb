use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{NormalizeError, Result};
use crate::matcher::KeyMatcher;

#[derive(Debug, Clone)]
enum RenameAction {
    Constant(String),
    /// Replace every match of `from` in the key.
    ReplaceCharacter { from: Regex, to: String },
    /// Replace the key with a capture group, when the regex matches.
    Extract(KeyMatcher),
}

#[derive(Debug, Clone)]
struct RenameRule {
    matcher: KeyMatcher,
    action: RenameAction,
}

impl RenameRule {
    /// New key if the rule matches `key`.
    fn apply(&self, key: &str) -> Option<String> {
        if !self.matcher.matches(key) {
            return None;
        }
        Some(match &self.action {
            RenameAction::Constant(c) => c.clone(),
            RenameAction::ReplaceCharacter { from, to } => {
                from.replace_all(key, regex::NoExpand(to.as_str())).into_owned()
            }
            RenameAction::Extract(m) => m.extract(key).unwrap_or(key).to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RuleDef {
    constant: Option<String>,
    replace_character: Option<String>,
    pattern: Option<String>,
    #[serde(default)]
    group: usize,
    exact_match: Option<bool>,
}

/// Ordered rulesets. Within a ruleset the first matching rule renames the
/// key; every ruleset sees the key produced by the previous one.
#[derive(Debug, Clone, Default)]
pub struct RenamePatterns {
    rulesets: Vec<Vec<RenameRule>>,
}

impl RenamePatterns {
    /// Parse a ruleset object or an array of them. `exact_match` applies to
    /// rules that do not set `exactMatch` themselves.
    pub fn parse(patterns: &Value, exact_match: bool) -> Result<Self> {
        let sets: Vec<&Map<String, Value>> = match patterns {
            Value::Object(map) => vec![map],
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_object().ok_or_else(|| {
                        NormalizeError::Definition("rename ruleset must be an object".into())
                    })
                })
                .collect::<Result<_>>()?,
            _ => {
                return Err(NormalizeError::Definition(
                    "rename patterns must be an object or an array".into(),
                ))
            }
        };

        let mut rulesets = Vec::with_capacity(sets.len());
        for set in sets {
            let mut rules = Vec::with_capacity(set.len());
            for (literal, def) in set {
                rules.push(parse_rule(literal, def, exact_match)?);
            }
            rulesets.push(rules);
        }
        Ok(Self { rulesets })
    }

    /// Parse `{ "patterns": ..., "options": { "exactMatch": bool } }`.
    pub fn from_definition(def: &Value) -> Result<Self> {
        let exact = def
            .pointer("/options/exactMatch")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        match def.get("patterns") {
            Some(patterns) => Self::parse(patterns, exact),
            None => Err(NormalizeError::Definition(
                "renameKeys requires 'patterns'".into(),
            )),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rulesets.iter().all(Vec::is_empty)
    }

    /// Append the rulesets of `other` after these.
    pub fn extend(&mut self, other: RenamePatterns) {
        self.rulesets.extend(other.rulesets);
    }

    fn rename(&self, key: String) -> String {
        self.rulesets.iter().fold(key, |key, rules| {
            rules.iter().find_map(|r| r.apply(&key)).unwrap_or(key)
        })
    }
}

fn parse_rule(literal: &str, def: &Value, default_exact: bool) -> Result<RenameRule> {
    let def: RuleDef = serde_json::from_value(def.clone())
        .map_err(|e| NormalizeError::Definition(format!("rename rule '{literal}': {e}")))?;
    let matcher = if def.exact_match.unwrap_or(default_exact) {
        KeyMatcher::Literal(literal.to_string())
    } else {
        KeyMatcher::Substring(literal.to_string())
    };
    let action = if let Some(c) = def.constant {
        RenameAction::Constant(c)
    } else if let Some(to) = def.replace_character {
        let from = Regex::new(literal).map_err(|e| NormalizeError::Pattern {
            pattern: literal.to_string(),
            reason: e.to_string(),
        })?;
        RenameAction::ReplaceCharacter { from, to }
    } else if let Some(pattern) = def.pattern {
        RenameAction::Extract(KeyMatcher::regex(&pattern, def.group)?)
    } else {
        return Err(NormalizeError::Definition(format!(
            "rename rule '{literal}' needs one of constant, replaceCharacter, pattern"
        )));
    };
    Ok(RenameRule { matcher, action })
}

/// Rename object keys throughout `data`. Later duplicates overwrite earlier
/// ones.
pub fn rename_keys(data: Value, patterns: &RenamePatterns) -> Value {
    if patterns.is_empty() {
        return data;
    }
    match data {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (patterns.rename(k), rename_keys(v, patterns)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| rename_keys(v, patterns)).collect())
        }
        scalar => scalar,
    }
}

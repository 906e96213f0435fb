//! Key matching shared by renaming, filtering, tag locations and action
//! conditions.

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{NormalizeError, Result};

#[derive(Debug, Clone)]
pub enum KeyMatcher {
    /// Key equals the text.
    Literal(String),
    /// Key contains the text.
    Substring(String),
    /// Key matches the regex; `group` selects the extracted capture.
    Regex { pattern: Regex, group: usize },
    Wildcard,
}

impl KeyMatcher {
    pub fn regex(pattern: &str, group: usize) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| NormalizeError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::Regex { pattern, group })
    }

    /// Matcher for a location or condition key: `*` and `.*` match every
    /// key, anything else is a regex (or a literal if it is not a valid
    /// regex).
    pub fn location(key: &str) -> Self {
        match key {
            "*" | ".*" => Self::Wildcard,
            _ => Regex::new(key)
                .map(|pattern| Self::Regex { pattern, group: 0 })
                .unwrap_or_else(|_| Self::Literal(key.to_string())),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Literal(text) => key == text,
            Self::Substring(text) => key.contains(text.as_str()),
            Self::Regex { pattern, .. } => pattern.is_match(key),
            Self::Wildcard => true,
        }
    }

    /// The part of `key` this matcher selects: the configured capture group
    /// for regexes, the whole key otherwise.
    pub fn extract<'k>(&self, key: &'k str) -> Option<&'k str> {
        match self {
            Self::Regex { pattern, group } => pattern
                .captures(key)
                .and_then(|caps| caps.get(*group))
                .map(|m| m.as_str()),
            other => other.matches(key).then_some(key),
        }
    }
}

/// Keys of `map` selected by a location key. An exact key wins over
/// pattern matches.
pub fn find_keys(map: &Map<String, Value>, key: &str) -> Vec<String> {
    if map.contains_key(key) {
        return vec![key.to_string()];
    }
    let matcher = KeyMatcher::location(key);
    map.keys().filter(|k| matcher.matches(k)).cloned().collect()
}

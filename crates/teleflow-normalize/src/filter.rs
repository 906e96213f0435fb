use serde::Deserialize;
use serde_json::Value;

use crate::error::{NormalizeError, Result};
use crate::matcher::KeyMatcher;

/// Key filter: `include` keeps keys containing any entry, `exclude` drops
/// keys equal to any entry.
#[derive(Debug, Clone)]
pub enum KeyFilter {
    Include(Vec<KeyMatcher>),
    Exclude(Vec<KeyMatcher>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterDef {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

impl KeyFilter {
    pub fn include<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self::Include(keys.into_iter().map(|k| KeyMatcher::Substring(k.into())).collect())
    }

    pub fn exclude<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self::Exclude(keys.into_iter().map(|k| KeyMatcher::Literal(k.into())).collect())
    }

    /// Parse `{ "include": [...] }` or `{ "exclude": [...] }`.
    pub fn from_definition(def: &Value) -> Result<Self> {
        let def: FilterDef = serde_json::from_value(def.clone())
            .map_err(|e| NormalizeError::Definition(format!("filterKeys: {e}")))?;
        match (def.include, def.exclude) {
            (Some(keys), None) => Ok(Self::include(keys)),
            (None, Some(keys)) => Ok(Self::exclude(keys)),
            (Some(_), Some(_)) => Err(NormalizeError::Definition(
                "filterKeys: include and exclude are mutually exclusive".into(),
            )),
            (None, None) => Err(NormalizeError::Definition(
                "filterKeys: expected include or exclude".into(),
            )),
        }
    }

    fn keeps(&self, key: &str) -> bool {
        match self {
            Self::Include(m) => m.iter().any(|m| m.matches(key)),
            Self::Exclude(m) => !m.iter().any(|m| m.matches(key)),
        }
    }
}

/// Drop filtered keys from objects at every depth. Arrays are left as is.
pub fn filter_data_by_keys(data: Value, filter: &KeyFilter) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| filter.keeps(k))
                .map(|(k, v)| (k, filter_data_by_keys(v, filter)))
                .collect(),
        ),
        other => other,
    }
}

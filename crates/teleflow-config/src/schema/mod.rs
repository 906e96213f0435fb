//! Declaration schemas: a JSON-Schema subset plus the custom keywords.
//!
//! A [`SchemaSet`] holds every schema by `$id`. [`SchemaSet::compile`] checks
//! the set once: every `$ref` must resolve, every regex must compile, and
//! every custom keyword configuration must satisfy the keyword's
//! metaschema.

mod walker;

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::keywords::Keyword;

pub(crate) use walker::Walker;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse schema '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema '{0}' has no $id")]
    MissingId(String),

    #[error("duplicate schema id '{0}'")]
    DuplicateId(String),

    #[error("invalid pattern '{pattern}' at {schema_path}: {reason}")]
    BadRegex {
        pattern: String,
        schema_path: String,
        reason: String,
    },

    #[error("unresolved $ref '{reference}' at {schema_path}")]
    UnresolvedRef {
        reference: String,
        schema_path: String,
    },

    #[error("invalid configuration of keyword '{keyword}' at {schema_path}: {message}")]
    KeywordConfig {
        keyword: String,
        schema_path: String,
        message: String,
    },
}

impl From<SchemaError> for teleflow_core::TeleflowError {
    fn from(e: SchemaError) -> Self {
        Self::Schema(e.to_string())
    }
}

/// Where a schema object sits: the `$id` of its document and the JSON
/// pointer inside that document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SchemaLoc {
    pub id: String,
    pub pointer: String,
}

impl SchemaLoc {
    pub fn root(id: &str) -> Self {
        Self {
            id: id.to_string(),
            pointer: String::new(),
        }
    }

    pub fn child(&self, segment: &str) -> Self {
        Self {
            id: self.id.clone(),
            pointer: teleflow_core::path::push(&self.pointer, segment),
        }
    }

    /// `#/a/b` for the schema validation started from, `id#/a/b` otherwise.
    pub fn display(&self, root_id: &str) -> String {
        if self.id == root_id {
            format!("#{}", self.pointer)
        } else {
            format!("{}#{}", self.id, self.pointer)
        }
    }
}

/// Subschema-bearing keywords whose value is a single schema.
const SCHEMA_VALUED: &[&str] = &["additionalProperties", "not", "if", "then", "else"];
/// Keywords whose value is a map of name to schema.
const SCHEMA_MAPS: &[&str] = &["properties", "patternProperties", "definitions"];
/// Keywords whose value is a list of schemas.
const SCHEMA_LISTS: &[&str] = &["allOf", "anyOf", "oneOf"];

#[derive(Debug, Default)]
pub struct SchemaSet {
    schemas: HashMap<String, Value>,
    regexes: HashMap<String, Regex>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a schema document. `name` is only used in errors.
    pub fn add(&mut self, name: &str, source: &str) -> Result<String, SchemaError> {
        let value: Value = serde_json::from_str(source).map_err(|source| SchemaError::Parse {
            name: name.to_string(),
            source,
        })?;
        self.add_value(name, value)
    }

    pub fn add_value(&mut self, name: &str, schema: Value) -> Result<String, SchemaError> {
        let id = schema
            .get("$id")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::MissingId(name.to_string()))?
            .to_string();
        if self.schemas.contains_key(&id) {
            return Err(SchemaError::DuplicateId(id));
        }
        self.schemas.insert(id.clone(), schema);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.schemas.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub(crate) fn regex(&self, pattern: &str) -> Option<&Regex> {
        self.regexes.get(pattern)
    }

    /// Resolve `reference` as seen from the document `from_id`.
    pub(crate) fn resolve_ref(&self, from_id: &str, reference: &str) -> Option<(&Value, SchemaLoc)> {
        let (doc_part, fragment) = reference.split_once('#').unwrap_or((reference, ""));
        let id = if doc_part.is_empty() { from_id } else { doc_part };
        let doc = self.schemas.get(id)?;
        let target = doc.pointer(fragment)?;
        Some((
            target,
            SchemaLoc {
                id: id.to_string(),
                pointer: fragment.to_string(),
            },
        ))
    }

    /// Check the whole set and cache every regex it uses.
    pub fn compile(&mut self) -> Result<(), SchemaError> {
        let mut patterns = Vec::new();
        for (id, schema) in &self.schemas {
            self.check_schema(schema, &SchemaLoc::root(id), &mut patterns)?;
        }
        for (pattern, loc) in patterns {
            if self.regexes.contains_key(&pattern) {
                continue;
            }
            let re = Regex::new(&pattern).map_err(|e| SchemaError::BadRegex {
                pattern: pattern.clone(),
                schema_path: loc.display(""),
                reason: e.to_string(),
            })?;
            self.regexes.insert(pattern, re);
        }
        debug!(
            schemas = self.schemas.len(),
            regexes = self.regexes.len(),
            "schemas compiled"
        );
        Ok(())
    }

    fn check_schema(
        &self,
        schema: &Value,
        loc: &SchemaLoc,
        patterns: &mut Vec<(String, SchemaLoc)>,
    ) -> Result<(), SchemaError> {
        let Some(obj) = schema.as_object() else {
            return Ok(());
        };

        if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
            if self.resolve_ref(&loc.id, reference).is_none() {
                return Err(SchemaError::UnresolvedRef {
                    reference: reference.to_string(),
                    schema_path: loc.display(""),
                });
            }
        }

        if let Some(p) = obj.get("pattern").and_then(Value::as_str) {
            patterns.push((p.to_string(), loc.child("pattern")));
        }
        if let Some(map) = obj.get("patternProperties").and_then(Value::as_object) {
            for p in map.keys() {
                patterns.push((p.clone(), loc.child("patternProperties")));
            }
        }

        for keyword in Keyword::ALL {
            if let Some(config) = obj.get(keyword.name()) {
                check_keyword_config(keyword, config, &loc.child(keyword.name()))?;
            }
        }

        for key in SCHEMA_VALUED {
            if let Some(sub) = obj.get(*key) {
                self.check_schema(sub, &loc.child(key), patterns)?;
            }
        }
        for key in SCHEMA_MAPS {
            if let Some(map) = obj.get(*key).and_then(Value::as_object) {
                let base = loc.child(key);
                for (name, sub) in map {
                    self.check_schema(sub, &base.child(name), patterns)?;
                }
            }
        }
        for key in SCHEMA_LISTS {
            if let Some(list) = obj.get(*key).and_then(Value::as_array) {
                let base = loc.child(key);
                for (i, sub) in list.iter().enumerate() {
                    self.check_schema(sub, &base.child(&i.to_string()), patterns)?;
                }
            }
        }
        match obj.get("items") {
            Some(Value::Array(list)) => {
                let base = loc.child("items");
                for (i, sub) in list.iter().enumerate() {
                    self.check_schema(sub, &base.child(&i.to_string()), patterns)?;
                }
            }
            Some(sub) => self.check_schema(sub, &loc.child("items"), patterns)?,
            None => {}
        }
        Ok(())
    }
}

/// Validate a keyword's configuration against its metaschema.
fn check_keyword_config(keyword: Keyword, config: &Value, loc: &SchemaLoc) -> Result<(), SchemaError> {
    let meta = SchemaSet::new();
    let metaschema = keyword.metaschema();
    let mut walker = Walker::new(&meta, None, "", config.clone());
    walker.validate(&metaschema, &SchemaLoc::root(""), "");
    match walker.errors.first() {
        None => Ok(()),
        Some(err) => Err(SchemaError::KeywordConfig {
            keyword: keyword.name().to_string(),
            schema_path: loc.display(""),
            message: format!("{} {}", err.data_path, err.message).trim().to_string(),
        }),
    }
}

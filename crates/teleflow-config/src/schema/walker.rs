//! Single-pass schema interpreter.
//!
//! The walker owns the document while it validates it: modifying keywords
//! and `default` rewrite the document in place, deferred keyword checks are
//! queued, and every failed check appends a formatted error. Branches of
//! `anyOf`/`oneOf`/`not`/`if` are tried against a snapshot of the value
//! they apply to and only the accepted branch is committed.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use teleflow_core::path;
use teleflow_core::ValidationError;

use super::{SchemaLoc, SchemaSet};
use crate::keywords::{DataCtx, Keyword, KeywordOutcome, SchemaCtx};
use crate::platform::ValidationContext;
use crate::runner::DeferredEntry;

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[-0-9a-z]{0,61}[0-9a-z])?)*\.?$")
        .expect("valid hostname regex")
});

/// Outcome of validating one branch: its errors, its queued checks and the
/// value it produced at the checked path.
struct BranchOutcome {
    errors: Vec<ValidationError>,
    deferred: Vec<DeferredEntry>,
    value: Option<Value>,
}

pub(crate) struct Walker<'a> {
    schemas: &'a SchemaSet,
    /// `None` skips custom keywords (metaschema checks).
    ctx: Option<&'a ValidationContext>,
    root_id: &'a str,
    pub doc: Value,
    pub errors: Vec<ValidationError>,
    pub deferred: Vec<DeferredEntry>,
}

impl<'a> Walker<'a> {
    pub fn new(
        schemas: &'a SchemaSet,
        ctx: Option<&'a ValidationContext>,
        root_id: &'a str,
        doc: Value,
    ) -> Self {
        Self {
            schemas,
            ctx,
            root_id,
            doc,
            errors: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Validate the value at `data_path` against `schema`. Returns true if
    /// no error was added.
    pub fn validate(&mut self, schema: &'a Value, loc: &SchemaLoc, data_path: &str) -> bool {
        let before = self.errors.len();
        let obj = match schema {
            Value::Object(obj) => obj,
            Value::Bool(false) => {
                self.error("false schema", data_path, loc, json!({}), "boolean schema is false");
                return false;
            }
            _ => return true,
        };
        if self.doc.pointer(data_path).is_none() {
            return true;
        }

        for keyword in Keyword::ALL.into_iter().filter(|k| k.is_modifying()) {
            if let Some(config) = obj.get(keyword.name()) {
                self.custom(keyword, config, schema, loc, data_path);
            }
        }

        if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
            match self.schemas.resolve_ref(&loc.id, reference) {
                Some((target, target_loc)) => {
                    self.validate(target, &target_loc, data_path);
                }
                None => self.error(
                    "$ref",
                    data_path,
                    &loc.child("$ref"),
                    json!({"ref": reference}),
                    format!("can't resolve reference {reference}"),
                ),
            }
        }

        self.check_type(obj, loc, data_path);
        self.check_enum(obj, loc, data_path);
        self.check_string(obj, loc, data_path);
        self.check_number(obj, loc, data_path);
        self.check_array(obj, loc, data_path);
        self.check_object(obj, loc, data_path);
        self.check_combinators(obj, loc, data_path);

        for keyword in Keyword::ALL.into_iter().filter(|k| !k.is_modifying()) {
            if let Some(config) = obj.get(keyword.name()) {
                self.custom(keyword, config, schema, loc, data_path);
            }
        }

        self.errors.len() == before
    }

    fn error(
        &mut self,
        keyword: &str,
        data_path: &str,
        loc: &SchemaLoc,
        params: Value,
        message: impl Into<String>,
    ) {
        self.errors.push(
            ValidationError::new(keyword, data_path, loc.display(self.root_id), message)
                .with_params(params),
        );
    }

    fn data(&self, data_path: &str) -> Option<&Value> {
        self.doc.pointer(data_path)
    }

    fn regex_matches(&self, pattern: &str, text: &str) -> bool {
        match self.schemas.regex(pattern) {
            Some(re) => re.is_match(text),
            None => Regex::new(pattern).is_ok_and(|re| re.is_match(text)),
        }
    }

    fn check_type(&mut self, obj: &'a Map<String, Value>, loc: &SchemaLoc, data_path: &str) {
        let names: Vec<&str> = match obj.get("type") {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(list)) => list.iter().filter_map(Value::as_str).collect(),
            _ => return,
        };
        let Some(data) = self.data(data_path) else {
            return;
        };
        if names.iter().any(|t| type_matches(t, data)) {
            return;
        }
        let expected = names.join(",");
        self.error(
            "type",
            data_path,
            &loc.child("type"),
            json!({"type": expected}),
            format!("should be {expected}"),
        );
    }

    fn check_enum(&mut self, obj: &'a Map<String, Value>, loc: &SchemaLoc, data_path: &str) {
        let Some(data) = self.data(data_path) else {
            return;
        };
        let enum_miss = obj
            .get("enum")
            .and_then(Value::as_array)
            .filter(|allowed| !allowed.contains(data));
        let const_miss = obj.get("const").filter(|expected| *expected != data);

        if let Some(allowed) = enum_miss {
            self.error(
                "enum",
                data_path,
                &loc.child("enum"),
                json!({"allowedValues": allowed}),
                "should be equal to one of the allowed values",
            );
        }
        if let Some(expected) = const_miss {
            self.error(
                "const",
                data_path,
                &loc.child("const"),
                json!({"allowedValue": expected}),
                "should be equal to constant",
            );
        }
    }

    fn check_string(&mut self, obj: &'a Map<String, Value>, loc: &SchemaLoc, data_path: &str) {
        let Some(text) = self.data(data_path).and_then(Value::as_str).map(str::to_string) else {
            return;
        };
        let len = text.chars().count() as u64;

        if let Some(limit) = obj.get("minLength").and_then(Value::as_u64) {
            if len < limit {
                self.error(
                    "minLength",
                    data_path,
                    &loc.child("minLength"),
                    json!({"limit": limit}),
                    format!("should NOT be shorter than {limit} characters"),
                );
            }
        }
        if let Some(limit) = obj.get("maxLength").and_then(Value::as_u64) {
            if len > limit {
                self.error(
                    "maxLength",
                    data_path,
                    &loc.child("maxLength"),
                    json!({"limit": limit}),
                    format!("should NOT be longer than {limit} characters"),
                );
            }
        }
        if let Some(pattern) = obj.get("pattern").and_then(Value::as_str) {
            if !self.regex_matches(pattern, &text) {
                self.error(
                    "pattern",
                    data_path,
                    &loc.child("pattern"),
                    json!({"pattern": pattern}),
                    format!("should match pattern \"{pattern}\""),
                );
            }
        }
        if let Some(format) = obj.get("format").and_then(Value::as_str) {
            if !format_matches(format, &text) {
                self.error(
                    "format",
                    data_path,
                    &loc.child("format"),
                    json!({"format": format}),
                    format!("should match format \"{format}\""),
                );
            }
        }
    }

    fn check_number(&mut self, obj: &'a Map<String, Value>, loc: &SchemaLoc, data_path: &str) {
        let Some(n) = self.data(data_path).and_then(Value::as_f64) else {
            return;
        };
        let bounds: [(&str, &str, fn(f64, f64) -> bool); 4] = [
            ("minimum", ">=", |n, l| n >= l),
            ("maximum", "<=", |n, l| n <= l),
            ("exclusiveMinimum", ">", |n, l| n > l),
            ("exclusiveMaximum", "<", |n, l| n < l),
        ];
        for (keyword, comparison, holds) in bounds {
            let Some(limit) = obj.get(keyword).filter(|l| l.is_number()) else {
                continue;
            };
            if !holds(n, limit.as_f64().unwrap_or_default()) {
                self.error(
                    keyword,
                    data_path,
                    &loc.child(keyword),
                    json!({"comparison": comparison, "limit": limit}),
                    format!("should be {comparison} {limit}"),
                );
            }
        }
    }

    fn check_array(&mut self, obj: &'a Map<String, Value>, loc: &SchemaLoc, data_path: &str) {
        let Some(items) = self.data(data_path).and_then(Value::as_array) else {
            return;
        };
        let len = items.len();
        let duplicate = if obj.get("uniqueItems") == Some(&Value::Bool(true)) {
            find_duplicate(items)
        } else {
            None
        };

        if let Some(limit) = obj.get("minItems").and_then(Value::as_u64) {
            if (len as u64) < limit {
                self.error(
                    "minItems",
                    data_path,
                    &loc.child("minItems"),
                    json!({"limit": limit}),
                    format!("should NOT have fewer than {limit} items"),
                );
            }
        }
        if let Some(limit) = obj.get("maxItems").and_then(Value::as_u64) {
            if len as u64 > limit {
                self.error(
                    "maxItems",
                    data_path,
                    &loc.child("maxItems"),
                    json!({"limit": limit}),
                    format!("should NOT have more than {limit} items"),
                );
            }
        }
        if let Some((j, i)) = duplicate {
            self.error(
                "uniqueItems",
                data_path,
                &loc.child("uniqueItems"),
                json!({"i": i, "j": j}),
                format!("should NOT have duplicate items (items ## {j} and {i} are identical)"),
            );
        }

        match obj.get("items") {
            Some(Value::Array(schemas)) => {
                let base = loc.child("items");
                for (i, sub) in schemas.iter().enumerate().take(len) {
                    let item_path = path::push(data_path, &i.to_string());
                    self.validate(sub, &base.child(&i.to_string()), &item_path);
                }
            }
            Some(sub) => {
                let base = loc.child("items");
                for i in 0..len {
                    let item_path = path::push(data_path, &i.to_string());
                    self.validate(sub, &base, &item_path);
                }
            }
            None => {}
        }
    }

    fn check_object(&mut self, obj: &'a Map<String, Value>, loc: &SchemaLoc, data_path: &str) {
        if !self.data(data_path).is_some_and(Value::is_object) {
            return;
        }
        let properties = obj.get("properties").and_then(Value::as_object);

        if let Some(props) = properties {
            if let Some(Value::Object(target)) = self.doc.pointer_mut(data_path) {
                for (name, sub) in props {
                    if let Some(default) = sub.get("default") {
                        if !target.contains_key(name) {
                            target.insert(name.clone(), default.clone());
                        }
                    }
                }
            }
        }

        if let Some(required) = obj.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                let present = self
                    .data(data_path)
                    .is_some_and(|d| d.get(name).is_some());
                if !present {
                    self.error(
                        "required",
                        data_path,
                        &loc.child("required"),
                        json!({"missingProperty": name}),
                        format!("should have required property '{name}'"),
                    );
                }
            }
        }

        let keys: Vec<String> = self
            .data(data_path)
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        let pattern_props = obj.get("patternProperties").and_then(Value::as_object);
        let additional = obj.get("additionalProperties");

        for key in &keys {
            let child_path = path::push(data_path, key);
            let mut matched = false;

            if let Some(sub) = properties.and_then(|p| p.get(key)) {
                matched = true;
                self.validate(sub, &loc.child("properties").child(key), &child_path);
            }
            if let Some(patterns) = pattern_props {
                for (pattern, sub) in patterns {
                    if self.regex_matches(pattern, key) {
                        matched = true;
                        let sub_loc = loc.child("patternProperties").child(pattern);
                        self.validate(sub, &sub_loc, &child_path);
                    }
                }
            }
            if matched {
                continue;
            }
            match additional {
                Some(Value::Bool(false)) => self.error(
                    "additionalProperties",
                    data_path,
                    &loc.child("additionalProperties"),
                    json!({"additionalProperty": key}),
                    "should NOT have additional properties",
                ),
                Some(sub) => {
                    self.validate(sub, &loc.child("additionalProperties"), &child_path);
                }
                None => {}
            }
        }
    }

    fn check_combinators(
        &mut self,
        obj: &'a Map<String, Value>,
        loc: &SchemaLoc,
        data_path: &str,
    ) {
        if let Some(list) = obj.get("allOf").and_then(Value::as_array) {
            let base = loc.child("allOf");
            for (i, sub) in list.iter().enumerate() {
                self.validate(sub, &base.child(&i.to_string()), data_path);
            }
        }

        if let Some(list) = obj.get("anyOf").and_then(Value::as_array) {
            let base = loc.child("anyOf");
            let mut branch_errors = Vec::new();
            let mut accepted = None;
            for (i, sub) in list.iter().enumerate() {
                let branch = self.try_branch(sub, &base.child(&i.to_string()), data_path);
                if branch.errors.is_empty() {
                    accepted = Some(branch);
                    break;
                }
                branch_errors.extend(branch.errors);
            }
            match accepted {
                Some(branch) => self.commit(branch, data_path),
                None => {
                    self.errors.extend(branch_errors);
                    self.error(
                        "anyOf",
                        data_path,
                        &base,
                        json!({}),
                        "should match some schema in anyOf",
                    );
                }
            }
        }

        if let Some(list) = obj.get("oneOf").and_then(Value::as_array) {
            let base = loc.child("oneOf");
            let mut branch_errors = Vec::new();
            let mut passing = Vec::new();
            for (i, sub) in list.iter().enumerate() {
                let branch = self.try_branch(sub, &base.child(&i.to_string()), data_path);
                if branch.errors.is_empty() {
                    passing.push((i, branch));
                } else {
                    branch_errors.extend(branch.errors);
                }
            }
            if passing.len() == 1 {
                if let Some((_, branch)) = passing.pop() {
                    self.commit(branch, data_path);
                }
            } else {
                let indices: Vec<usize> = passing.iter().map(|(i, _)| *i).collect();
                let passing_schemas = if indices.is_empty() {
                    self.errors.extend(branch_errors);
                    Value::Null
                } else {
                    json!(indices)
                };
                self.error(
                    "oneOf",
                    data_path,
                    &base,
                    json!({"passingSchemas": passing_schemas}),
                    "should match exactly one schema in oneOf",
                );
            }
        }

        if let Some(sub) = obj.get("not") {
            let not_loc = loc.child("not");
            if self.try_branch(sub, &not_loc, data_path).errors.is_empty() {
                self.error("not", data_path, &not_loc, json!({}), "should NOT be valid");
            }
        }

        if let Some(condition) = obj.get("if") {
            let if_loc = loc.child("if");
            let branch_key = if self.try_branch(condition, &if_loc, data_path).errors.is_empty() {
                "then"
            } else {
                "else"
            };
            if let Some(branch) = obj.get(branch_key) {
                if !self.validate(branch, &loc.child(branch_key), data_path) {
                    self.error(
                        "if",
                        data_path,
                        &if_loc,
                        json!({"failingKeyword": branch_key}),
                        format!("should match \"{branch_key}\" schema"),
                    );
                }
            }
        }
    }

    fn custom(
        &mut self,
        keyword: Keyword,
        config: &'a Value,
        schema: &'a Value,
        loc: &SchemaLoc,
        data_path: &str,
    ) {
        let Some(ctx) = self.ctx else {
            return;
        };
        let schema_path = loc.child(keyword.name()).display(self.root_id);
        let split = path::split_last(data_path);
        let property_name = split.as_ref().map(|(_, name)| name.clone());

        let outcome = {
            let Some(data) = self.doc.pointer(data_path) else {
                return;
            };
            let parent = split.as_ref().and_then(|(p, _)| self.doc.pointer(p));
            let schema_ctx = SchemaCtx {
                keyword,
                config,
                parent_schema: schema,
                schema_path: &schema_path,
            };
            let data_ctx = DataCtx {
                data,
                data_path,
                parent,
                property_name: property_name.as_deref(),
                root: &self.doc,
            };
            keyword.evaluate(&schema_ctx, &data_ctx, ctx)
        };

        match outcome {
            Ok(KeywordOutcome::Valid) => {}
            Ok(KeywordOutcome::Replace(value)) => {
                path::replace(&mut self.doc, data_path, value);
            }
            Ok(KeywordOutcome::Deferred(check)) => self.deferred.push(DeferredEntry {
                keyword,
                data_path: data_path.to_string(),
                schema_path,
                property_name,
                check,
            }),
            Err(message) => self.errors.push(
                ValidationError::new(keyword.name(), data_path, schema_path, message)
                    .with_params(json!({"keyword": keyword.name()}))
                    .with_property_name(property_name),
            ),
        }
    }

    /// Validate against `schema`, then put back the value at `data_path`.
    /// Every rewrite happens at or below `data_path`, so only that subtree
    /// is snapshotted.
    fn try_branch(
        &mut self,
        schema: &'a Value,
        loc: &SchemaLoc,
        data_path: &str,
    ) -> BranchOutcome {
        let snapshot = self.doc.pointer(data_path).cloned();
        let mut walker = Walker::new(
            self.schemas,
            self.ctx,
            self.root_id,
            std::mem::take(&mut self.doc),
        );
        walker.validate(schema, loc, data_path);
        let Walker {
            doc,
            errors,
            deferred,
            ..
        } = walker;
        self.doc = doc;

        let value = snapshot.and_then(|original| {
            self.doc
                .pointer_mut(data_path)
                .map(|slot| std::mem::replace(slot, original))
        });
        BranchOutcome {
            errors,
            deferred,
            value,
        }
    }

    fn commit(&mut self, branch: BranchOutcome, data_path: &str) {
        if let (Some(value), Some(slot)) = (branch.value, self.doc.pointer_mut(data_path)) {
            *slot = value;
        }
        self.deferred.extend(branch.deferred);
    }
}

fn type_matches(name: &str, data: &Value) -> bool {
    match name {
        "object" => data.is_object(),
        "array" => data.is_array(),
        "string" => data.is_string(),
        "boolean" => data.is_boolean(),
        "null" => data.is_null(),
        "number" => data.is_number(),
        "integer" => {
            data.is_i64() || data.is_u64() || data.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => false,
    }
}

fn format_matches(format: &str, text: &str) -> bool {
    match format {
        "hostname" => text.len() <= 253 && HOSTNAME_RE.is_match(text),
        "ipv4" => text.parse::<Ipv4Addr>().is_ok(),
        "ipv6" => text.parse::<Ipv6Addr>().is_ok(),
        _ => true,
    }
}

/// First pair `(j, i)` with `j < i` of equal items.
fn find_duplicate(items: &[Value]) -> Option<(usize, usize)> {
    (1..items.len()).find_map(|i| (0..i).rev().find(|&j| items[j] == items[i]).map(|j| (j, i)))
}

//! Post-processing functions run by name at the end of the data pipeline.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{NormalizeError, Result};
use crate::filter::{filter_data_by_keys, KeyFilter};
use crate::rename::{rename_keys, RenamePatterns};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageArgs {
    pub key_with_value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstKeyArgs {
    #[serde(default)]
    pub split_on_value: Option<String>,
    #[serde(default)]
    pub key_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentArgs {
    pub total_key: String,
    pub partial_key: String,
    #[serde(default)]
    pub inverse: bool,
}

#[derive(Debug, Clone)]
pub struct CsvArgs {
    pub map_key: String,
    pub filter: Option<KeyFilter>,
    pub rename: Option<RenamePatterns>,
}

#[derive(Debug, Clone)]
pub enum NormalizeFunction {
    /// Rounded mean of one field across all children.
    GetAverage(AverageArgs),
    /// Field-wise sum of child objects, nested objects included.
    GetSum,
    GetFirstKey(FirstKeyArgs),
    /// Rounded percentage of `partial_key` over `total_key`.
    GetPercentFromKeys(PercentArgs),
    /// CSV text to a map of rows keyed by the `map_key` column.
    FormatAsJson(CsvArgs),
    /// `{key: {ruleName, eventType, ..}}` to `{rule: {events: {eventType: {..}}}}`.
    RestructureRules,
}

fn args<T: for<'de> Deserialize<'de>>(name: &str, args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| NormalizeError::Definition(format!("{name}: {e}")))
}

impl NormalizeFunction {
    /// Build a function from `{ "name": "...", "args": {...} }`.
    pub fn from_definition(def: &Value) -> Result<Self> {
        let name = def
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| NormalizeError::Definition("function definition needs 'name'".into()))?;
        let empty = json!({});
        let a = def.get("args").unwrap_or(&empty);
        Ok(match name {
            "getAverage" => Self::GetAverage(args(name, a)?),
            "getSum" => Self::GetSum,
            "getFirstKey" => Self::GetFirstKey(args(name, a)?),
            "getPercentFromKeys" => Self::GetPercentFromKeys(args(name, a)?),
            "formatAsJson" => Self::FormatAsJson(csv_args(a)?),
            "restructureRules" => Self::RestructureRules,
            other => {
                return Err(NormalizeError::Definition(format!(
                    "unknown function '{other}'"
                )))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetAverage(_) => "getAverage",
            Self::GetSum => "getSum",
            Self::GetFirstKey(_) => "getFirstKey",
            Self::GetPercentFromKeys(_) => "getPercentFromKeys",
            Self::FormatAsJson(_) => "formatAsJson",
            Self::RestructureRules => "restructureRules",
        }
    }

    pub fn apply(&self, data: Value) -> Result<Value> {
        match self {
            Self::GetAverage(a) => get_average(&data, a),
            Self::GetSum => get_sum(&data),
            Self::GetFirstKey(a) => get_first_key(&data, a),
            Self::GetPercentFromKeys(a) => get_percent_from_keys(&data, a),
            Self::FormatAsJson(a) => format_as_json(&data, a),
            Self::RestructureRules => restructure_rules(data),
        }
    }
}

fn csv_args(a: &Value) -> Result<CsvArgs> {
    match a.get("type").and_then(Value::as_str) {
        None | Some("csv") => {}
        Some(other) => {
            return Err(NormalizeError::Definition(format!(
                "formatAsJson: unsupported type '{other}'"
            )))
        }
    }
    let map_key = a
        .get("mapKey")
        .and_then(Value::as_str)
        .ok_or_else(|| NormalizeError::Definition("formatAsJson: 'mapKey' is required".into()))?
        .to_string();
    let filter = a.get("filterKeys").map(KeyFilter::from_definition).transpose()?;
    let rename = a
        .get("renameKeys")
        .map(RenamePatterns::from_definition)
        .transpose()?;
    Ok(CsvArgs {
        map_key,
        filter,
        rename,
    })
}

/// Integral results become JSON integers.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn object<'a>(function: &'static str, data: &'a Value) -> Result<&'a Map<String, Value>> {
    data.as_object().ok_or_else(|| NormalizeError::InvalidInput {
        function,
        reason: "data must be an object".into(),
    })
}

fn get_average(data: &Value, a: &AverageArgs) -> Result<Value> {
    let map = object("getAverage", data)?;
    if map.is_empty() {
        return Ok(json!(0));
    }
    let mut total = 0.0;
    for (key, child) in map {
        total += child
            .get(&a.key_with_value)
            .and_then(as_number)
            .ok_or_else(|| NormalizeError::MissingField {
                function: "getAverage",
                field: a.key_with_value.clone(),
                key: key.clone(),
            })?;
    }
    Ok(number((total / map.len() as f64).round()))
}

fn merge_sum(acc: &mut Map<String, Value>, child: &Map<String, Value>) {
    for (key, value) in child {
        match value {
            Value::Number(n) => {
                let prev = acc.get(key).and_then(Value::as_f64).unwrap_or(0.0);
                acc.insert(key.clone(), number(prev + n.as_f64().unwrap_or(0.0)));
            }
            Value::Object(inner) => {
                let slot = acc
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(slot) = slot {
                    merge_sum(slot, inner);
                }
            }
            _ => {}
        }
    }
}

fn get_sum(data: &Value) -> Result<Value> {
    let mut acc = Map::new();
    for child in object("getSum", data)?.values() {
        if let Value::Object(child) = child {
            merge_sum(&mut acc, child);
        }
    }
    Ok(Value::Object(acc))
}

fn get_first_key(data: &Value, a: &FirstKeyArgs) -> Result<Value> {
    let key = object("getFirstKey", data)?
        .keys()
        .next()
        .ok_or_else(|| NormalizeError::InvalidInput {
            function: "getFirstKey",
            reason: "data has no keys".into(),
        })?;
    let key = match &a.split_on_value {
        Some(sep) => key.split(sep.as_str()).next().unwrap_or(key),
        None => key.as_str(),
    };
    let prefix = a.key_prefix.as_deref().unwrap_or_default();
    Ok(Value::String(format!("{prefix}{key}")))
}

fn get_percent_from_keys(data: &Value, a: &PercentArgs) -> Result<Value> {
    let map = object("getPercentFromKeys", data)?;
    let field = |name: &str| {
        map.get(name)
            .and_then(as_number)
            .ok_or_else(|| NormalizeError::MissingField {
                function: "getPercentFromKeys",
                field: name.to_string(),
                key: "data".into(),
            })
    };
    let total = field(&a.total_key)?;
    let partial = field(&a.partial_key)?;
    let percent = if total == 0.0 {
        0.0
    } else {
        partial / total * 100.0
    };
    let percent = if a.inverse { 100.0 - percent } else { percent };
    Ok(number(percent.round()))
}

fn parse_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

fn csv_value(cell: &str) -> Value {
    if let Ok(n) = cell.parse::<i64>() {
        return json!(n);
    }
    match cell.parse::<f64>() {
        Ok(n) if n.is_finite() => json!(n),
        _ => Value::String(cell.to_string()),
    }
}

fn format_as_json(data: &Value, a: &CsvArgs) -> Result<Value> {
    let text = data.as_str().ok_or_else(|| NormalizeError::InvalidInput {
        function: "formatAsJson",
        reason: "data must be CSV text".into(),
    })?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .map(parse_csv_line)
        .ok_or_else(|| NormalizeError::InvalidInput {
            function: "formatAsJson",
            reason: "CSV has no header".into(),
        })?;
    let key_index = header
        .iter()
        .position(|h| *h == a.map_key)
        .ok_or_else(|| NormalizeError::MissingField {
            function: "formatAsJson",
            field: a.map_key.clone(),
            key: "header".into(),
        })?;

    let mut out = Map::new();
    for line in lines {
        let cells = parse_csv_line(line);
        let Some(key) = cells.get(key_index).cloned() else {
            continue;
        };
        let mut row = Value::Object(
            header
                .iter()
                .zip(&cells)
                .map(|(h, c)| (h.clone(), csv_value(c)))
                .collect(),
        );
        if let Some(filter) = &a.filter {
            row = filter_data_by_keys(row, filter);
        }
        if let Some(rename) = &a.rename {
            row = rename_keys(row, rename);
        }
        out.insert(key, row);
    }
    Ok(Value::Object(out))
}

fn restructure_rules(data: Value) -> Result<Value> {
    let Value::Object(map) = data else {
        return Err(NormalizeError::InvalidInput {
            function: "restructureRules",
            reason: "data must be an object".into(),
        });
    };
    let mut out = Map::new();
    for (key, item) in map {
        let Value::Object(mut fields) = item else {
            out.insert(key, item);
            continue;
        };
        let rule = match fields.remove("ruleName") {
            Some(Value::String(name)) => name,
            _ => key,
        };
        let slot = out
            .entry(rule)
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(slot) = slot else {
            continue;
        };
        match fields.remove("eventType") {
            Some(event_type) => {
                let event_type = match event_type {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let events = slot
                    .entry("events")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(events) = events {
                    events.insert(event_type, Value::Object(fields));
                }
            }
            None => slot.extend(fields),
        }
    }
    Ok(Value::Object(out))
}

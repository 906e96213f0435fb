//! `declarationClass` and `declarationClassProp`: references to other
//! objects of the same namespace.

use serde_json::Value;
use teleflow_core::declaration;

use super::{DataCtx, KeywordOutcome, SchemaCtx};

/// Placeholder in a `declarationClassProp` path consuming one data segment.
const PLACEHOLDER: &str = "%s";

pub(super) fn declaration_class(
    schema: &SchemaCtx<'_>,
    data: &DataCtx<'_>,
) -> Result<KeywordOutcome, String> {
    let class = schema.config.as_str().unwrap_or_default();
    let name = data.data.as_str().unwrap_or_default();
    let ns = data.namespace();

    match ns.scoped.get(name) {
        None => Err(format!(
            "declaration with name \"{name}\" doesn't exist ({})",
            ns.label()
        )),
        Some(obj) if declaration::has_class(obj, class) => Ok(KeywordOutcome::Valid),
        Some(_) => Err(format!(
            "\"{name}\" must be of object type and class \"{class}\""
        )),
    }
}

pub(super) fn declaration_class_prop(
    schema: &SchemaCtx<'_>,
    data: &DataCtx<'_>,
) -> Result<KeywordOutcome, String> {
    let template = schema
        .config
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let parts_num = schema.config.get("partsNum").and_then(Value::as_u64);
    let value = data.data.as_str().unwrap_or_default();

    let data_parts: Vec<&str> = value.split('/').collect();
    if let Some(expected) = parts_num.filter(|n| *n > 0) {
        if data_parts.len() as u64 != expected {
            return Err(format!(
                "\"{value}\" should be in format \"ObjectName/property\" with {expected} part(s) separated by '/' (template \"{template}\")"
            ));
        }
    }

    let mut template_parts = template.split('/');
    let class = template_parts.next().unwrap_or_default();
    let object_name = data_parts[0];

    let ns = data.namespace();
    let object = match ns.scoped.get(object_name) {
        Some(obj) if declaration::has_class(obj, class) => obj,
        Some(_) => {
            return Err(format!(
                "\"{object_name}\" must be of object type and class \"{class}\""
            ))
        }
        None => {
            return Err(format!(
                "declaration with name \"{object_name}\" doesn't exist ({})",
                ns.label()
            ))
        }
    };

    let mut remaining = data_parts[1..].iter().copied();
    let mut lookup: Vec<&str> = Vec::new();
    for part in template_parts {
        if part == PLACEHOLDER {
            match remaining.next() {
                Some(p) => lookup.push(p),
                None => {
                    return Err(format!(
                        "\"{value}\" has not enough parts to fill path \"{template}\""
                    ))
                }
            }
        } else {
            lookup.push(part);
        }
    }
    lookup.extend(remaining);

    let mut current = object;
    for (i, seg) in lookup.iter().enumerate() {
        current = match current.as_object().and_then(|m| m.get(*seg)) {
            Some(next) => next,
            None => {
                let resolved: Vec<&str> = std::iter::once(object_name)
                    .chain(lookup[..=i].iter().copied())
                    .collect();
                return Err(format!(
                    "Unable to find \"{}\" in declaration ({})",
                    resolved.join("/"),
                    ns.label()
                ));
            }
        };
    }
    Ok(KeywordOutcome::Valid)
}

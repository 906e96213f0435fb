//! `f5expand`: rewrite backtick pointers in a string to the values they
//! reference, within the namespace of the string.

use serde_json::Value;

use super::{DataCtx, KeywordOutcome};
use crate::platform::ValidationContext;
use crate::pointer;

pub(super) fn validate(
    data: &DataCtx<'_>,
    ctx: &ValidationContext,
) -> Result<KeywordOutcome, String> {
    if !ctx.expand {
        return Ok(KeywordOutcome::Valid);
    }
    let Some(text) = data.data.as_str() else {
        return Ok(KeywordOutcome::Valid);
    };
    let ns = data.namespace();
    match pointer::expand_pointers(text, &ns.scoped, &ns.data_path) {
        Ok(Value::String(s)) if s == text => Ok(KeywordOutcome::Valid),
        Ok(expanded) => Ok(KeywordOutcome::Replace(expanded)),
        Err(e) => Err(e.to_string()),
    }
}

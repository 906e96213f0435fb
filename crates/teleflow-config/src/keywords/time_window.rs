//! `timeWindowMinSize`: `{start, end}` in `HH:MM` must span at least the
//! configured number of minutes. Windows may wrap past midnight.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{DataCtx, KeywordOutcome, SchemaCtx};

const MINUTES_PER_DAY: i64 = 24 * 60;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").expect("valid regex"));

fn minutes(value: Option<&Value>) -> Option<i64> {
    let caps = TIME_RE.captures(value?.as_str()?)?;
    let h: i64 = caps[1].parse().ok()?;
    let m: i64 = caps[2].parse().ok()?;
    Some(h * 60 + m)
}

pub(super) fn validate(
    schema: &SchemaCtx<'_>,
    data: &DataCtx<'_>,
) -> Result<KeywordOutcome, String> {
    let min_size = schema.config.as_f64().unwrap_or_default();
    // Malformed times are left to the `pattern` of the schema.
    let (Some(start), Some(end)) = (minutes(data.data.get("start")), minutes(data.data.get("end")))
    else {
        return Ok(KeywordOutcome::Valid);
    };

    let mut size = end - start;
    if size < 0 {
        size += MINUTES_PER_DAY;
    }
    if size == 0 || (size as f64) < min_size {
        return Err(format!(
            "specify window with size of a {min_size} or more minutes, current size is {size} minute(s)"
        ));
    }
    Ok(KeywordOutcome::Valid)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::keywords::test_support::{context, run, MockPlatform};
    use crate::keywords::Keyword;
    use crate::platform::DeviceType;

    fn check(start: &str, end: &str, min: u64) -> Result<(), String> {
        let ctx = context(MockPlatform::new(DeviceType::BigIp));
        let root = json!({"w": {"start": start, "end": end}});
        run(Keyword::TimeWindowMinSize, &json!(min), &root, "/w", &ctx).map(|_| ())
    }

    #[test]
    fn window_wrapping_midnight() {
        let err = check("23:00", "00:59", 120).unwrap_err();
        assert!(err.contains("current size is 119 minute(s)"));
        assert!(check("23:00", "00:59", 60).is_ok());
    }

    #[test]
    fn empty_window_rejected() {
        assert!(check("10:00", "10:00", 0).is_err());
    }

    #[test]
    fn plain_window() {
        assert!(check("01:00", "02:00", 60).is_ok());
        assert!(check("01:00", "01:30", 60).is_err());
    }

    #[test]
    fn malformed_times_are_ignored() {
        assert!(check("25:00", "02:00", 60).is_ok());
    }
}

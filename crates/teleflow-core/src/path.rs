//! JSON pointer helpers (RFC 6901) for data paths reported by the validator.

use serde_json::Value;

/// Escape a single reference token.
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Decode a single reference token.
pub fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Append a token to a pointer.
pub fn push(pointer: &str, segment: &str) -> String {
    format!("{pointer}/{}", escape_segment(segment))
}

/// Split a pointer into decoded tokens. `""` is the root and has no tokens.
pub fn segments(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .strip_prefix('/')
        .unwrap_or(pointer)
        .split('/')
        .map(unescape_segment)
        .collect()
}

/// Build a pointer from decoded tokens.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| format!("/{}", escape_segment(s.as_ref())))
        .collect()
}

/// Parent pointer and the last decoded token, or `None` for the root.
pub fn split_last(pointer: &str) -> Option<(String, String)> {
    let mut segs = segments(pointer);
    let last = segs.pop()?;
    Some((join(&segs), last))
}

/// Look up a value by decoded tokens. Arrays are indexed by decimal tokens.
pub fn get<'a, S: AsRef<str>>(root: &'a Value, segments: &[S]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |current, seg| match current {
        Value::Object(map) => map.get(seg.as_ref()),
        Value::Array(items) => seg.as_ref().parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Replace the value at `pointer`. Returns false if the target does not exist.
pub fn replace(root: &mut Value, pointer: &str, value: Value) -> bool {
    match root.pointer_mut(pointer) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn segments_roundtrip_escapes() {
        let p = join(&["a/b", "c~d", "0"]);
        assert_eq!(p, "/a~1b/c~0d/0");
        assert_eq!(segments(&p), vec!["a/b", "c~d", "0"]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn split_last_of_root_is_none() {
        assert!(split_last("").is_none());
        assert_eq!(
            split_last("/a/b"),
            Some(("/a".to_string(), "b".to_string()))
        );
    }

    #[test]
    fn get_walks_arrays() {
        let v = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(get(&v, &["a", "1", "b"]), Some(&json!(2)));
        assert_eq!(get(&v, &["a", "x"]), None);
    }

    #[test]
    fn replace_in_place() {
        let mut v = json!({"a": {"b": 1}});
        assert!(replace(&mut v, "/a/b", json!("x")));
        assert_eq!(v, json!({"a": {"b": "x"}}));
        assert!(!replace(&mut v, "/missing/b", json!(1)));
    }
}

//! Declaration pointer dialect.
//!
//! Pointers come in three flavours, chosen by their first character:
//!
//! - `@...` resolves from the nearest ancestor of the source value that owns
//!   a `class` key;
//! - `/...` is absolute and must stay inside `Shared`;
//! - anything else is relative to the container of the source value.
//!
//! Strings embed pointers between backticks: `` `=ptr` `` inserts the value
//! as text, `` `+ptr` `` inserts it base64-decoded, and `` `>ptr` `` replaces
//! the whole string with the referenced value (objects included).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;
use teleflow_core::declaration::{self, SHARED_CLASS};
use teleflow_core::path;
use thiserror::Error;

const BACKTICK: char = '`';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("absolute pointer '{0}' must start with '{shared}'", shared = SHARED_CLASS)]
    OutsideShared(String),

    #[error("unable to resolve pointer '{0}'")]
    Unresolved(String),

    #[error("pointer '{0}' has no class-bearing ancestor")]
    NoClassAncestor(String),

    #[error("unable to base64-decode value of pointer '{pointer}': {reason}")]
    Base64 { pointer: String, reason: String },

    #[error("incorrect pointer syntax at position {position} in '{text}'")]
    Syntax { text: String, position: usize },

    #[error("unterminated pointer in '{0}'")]
    Unterminated(String),

    #[error("pointer '{0}' replaces the whole value and cannot be combined with other text")]
    ObjectWithText(String),
}

/// How a resolved value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Render non-string results as JSON text.
    pub stringify: bool,
    /// Base64-decode the rendered text.
    pub base64_decode: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            stringify: true,
            base64_decode: false,
        }
    }
}

impl ResolveOptions {
    /// Options selected by the character after an opening backtick.
    pub fn from_lead(lead: char) -> Option<Self> {
        match lead {
            '=' => Some(Self::default()),
            '+' => Some(Self {
                stringify: true,
                base64_decode: true,
            }),
            '>' => Some(Self {
                stringify: false,
                base64_decode: false,
            }),
            _ => None,
        }
    }
}

/// Resolve `pointer` against `origin`. `source_pointer` is the JSON pointer
/// (inside `origin`) of the value that contains the pointer expression.
pub fn resolve(
    origin: &Value,
    pointer: &str,
    source_pointer: &str,
    opts: ResolveOptions,
) -> Result<Value, PointerError> {
    let target = locate(origin, pointer, source_pointer)?;
    render(target, pointer, opts)
}

fn locate<'a>(
    origin: &'a Value,
    pointer: &str,
    source_pointer: &str,
) -> Result<&'a Value, PointerError> {
    let rest = pointer_segments(pointer);

    let base: Vec<String> = if pointer.starts_with('@') {
        class_ancestor(origin, source_pointer)
            .ok_or_else(|| PointerError::NoClassAncestor(pointer.to_string()))?
    } else if pointer.starts_with('/') {
        match rest.first() {
            Some(first) if first.eq_ignore_ascii_case(SHARED_CLASS) => Vec::new(),
            _ => return Err(PointerError::OutsideShared(pointer.to_string())),
        }
    } else {
        let mut container = path::segments(source_pointer);
        container.pop();
        container
    };

    let full: Vec<String> = base.into_iter().chain(rest).collect();
    path::get(origin, &full).ok_or_else(|| PointerError::Unresolved(pointer.to_string()))
}

/// Segments of a pointer expression: split on `/`, empties and leading `@`
/// markers dropped.
fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .skip_while(|s| s.chars().all(|c| c == '@'))
        .map(path::unescape_segment)
        .collect()
}

/// Walk from the origin root down the source path and return the path of
/// the first ancestor object that owns a `class` key. The origin itself and
/// the source value are not candidates.
fn class_ancestor(origin: &Value, source_pointer: &str) -> Option<Vec<String>> {
    let segments = path::segments(source_pointer);
    let mut current = origin;
    for (depth, seg) in segments.iter().enumerate() {
        if depth + 1 == segments.len() {
            break;
        }
        current = path::get(current, std::slice::from_ref(seg))?;
        if declaration::class_of(current).is_some() {
            return Some(segments[..=depth].to_vec());
        }
    }
    None
}

fn render(value: &Value, pointer: &str, opts: ResolveOptions) -> Result<Value, PointerError> {
    if !opts.stringify {
        return Ok(value.clone());
    }
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if !opts.base64_decode {
        return Ok(Value::String(text));
    }
    let bytes = BASE64
        .decode(text.trim())
        .map_err(|e| PointerError::Base64 {
            pointer: pointer.to_string(),
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|e| PointerError::Base64 {
            pointer: pointer.to_string(),
            reason: e.to_string(),
        })
}

/// One piece of a parsed template string.
#[derive(Debug, PartialEq)]
enum Piece<'t> {
    Text(String),
    Pointer { lead: char, pointer: &'t str },
}

fn parse_template(text: &str) -> Result<Vec<Piece<'_>>, PointerError> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if c != BACKTICK {
            literal.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some((_, BACKTICK)) => {
                chars.next();
                literal.push(BACKTICK);
            }
            Some((lead_pos, lead)) if ResolveOptions::from_lead(lead).is_some() => {
                chars.next();
                let start = lead_pos + lead.len_utf8();
                let end = text[start..]
                    .find(BACKTICK)
                    .map(|i| start + i)
                    .ok_or_else(|| PointerError::Unterminated(text.to_string()))?;
                if !literal.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Pointer {
                    lead,
                    pointer: &text[start..end],
                });
                while chars.peek().is_some_and(|(i, _)| *i <= end) {
                    chars.next();
                }
            }
            _ => {
                return Err(PointerError::Syntax {
                    text: text.to_string(),
                    position: pos,
                })
            }
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Text(literal));
    }
    Ok(pieces)
}

/// Expand every backtick pointer in `text`. Strings without a backtick are
/// returned unchanged.
pub fn expand_pointers(
    text: &str,
    origin: &Value,
    source_pointer: &str,
) -> Result<Value, PointerError> {
    if !text.contains(BACKTICK) {
        return Ok(Value::String(text.to_string()));
    }

    let pieces = parse_template(text)?;

    if let Some(pointer) = pieces.iter().find_map(|p| match p {
        Piece::Pointer { lead: '>', pointer } => Some(*pointer),
        _ => None,
    }) {
        if pieces.len() != 1 {
            return Err(PointerError::ObjectWithText(pointer.to_string()));
        }
        return resolve(origin, pointer, source_pointer, ResolveOptions::from_lead('>').unwrap_or_default());
    }

    let mut out = String::with_capacity(text.len());
    for piece in pieces {
        match piece {
            Piece::Text(s) => out.push_str(&s),
            Piece::Pointer { lead, pointer } => {
                let opts = ResolveOptions::from_lead(lead).unwrap_or_default();
                match resolve(origin, pointer, source_pointer, opts)? {
                    Value::String(s) => out.push_str(&s),
                    other => out.push_str(&other.to_string()),
                }
            }
        }
    }
    Ok(Value::String(out))
}

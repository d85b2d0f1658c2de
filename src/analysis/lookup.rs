/// Tolerant nested lookup into a forecast document.
///
/// Forecast documents mix objects and arrays freely (`daily.data` is a list
/// of objects, `alerts` may be absent). Walking a path never fails: an array
/// at any step is searched for its first element containing the next key,
/// and a missing key ends the walk with the caller's default.

use serde_json::Value;

use crate::model::NOT_AVAILABLE;

/// Walks `path` through `document`.
///
/// At each step the current node is treated as a list of candidates (a
/// non-array node is a list of one); the first candidate that is an object
/// containing the key is descended into. Returns `None` as soon as no
/// candidate has the key.
pub fn lookup<'a>(document: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = document;
    for key in path {
        current = match current {
            Value::Array(items) => items.iter().find_map(|item| item.get(*key))?,
            other => other.get(*key)?,
        };
    }
    Some(current)
}

/// Like [`lookup`], substituting `default` when the path does not resolve.
pub fn lookup_or<'a>(document: &'a Value, path: &[&str], default: &'a Value) -> &'a Value {
    lookup(document, path).unwrap_or(default)
}

/// Text rendering of the value at `path`, or `"Not available"`.
///
/// Strings come back without their JSON quotes; numbers and booleans use
/// their JSON spelling. A JSON null counts as not available.
pub fn lookup_text(document: &Value, path: &[&str]) -> String {
    match lookup(document, path) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => NOT_AVAILABLE.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Like [`lookup_text`] with a caller-chosen default.
pub fn lookup_text_or(document: &Value, path: &[&str], default: &str) -> String {
    match lookup(document, path) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Integer epoch at `path`. Floats are truncated.
pub fn lookup_epoch(document: &Value, path: &[&str]) -> Option<i64> {
    match lookup(document, path)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64),
        _ => None,
    }
}

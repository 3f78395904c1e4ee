//! Dotted-path evaluation over JSON documents.
//!
//! JSON sources have no tree selectors. The entry selector is a dotted path
//! to an array (`data.stories`), and field paths are dotted lookups inside
//! each record (`content.thumbnail.filename`). Numeric segments index into
//! arrays (`images.0.url`).

use crate::scraper::element::Element;
use serde_json::Value;

/// Follow a dotted path from `value`. An empty path is the value itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim().trim_matches('.');
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render a JSON value the way a field resolver expects it.
///
/// Strings are returned unquoted, `null` becomes empty, and containers are
/// serialized back to JSON text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Records found at `selector`, or nothing when it is not an array.
pub fn entries<'a>(document: &'a Value, selector: &str) -> &'a [Value] {
    match lookup(document, selector) {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    }
}

/// One record of a JSON entry array.
pub struct JsonRecord<'a> {
    value: &'a Value,
}

impl<'a> JsonRecord<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    fn string_at(&self, path: &str) -> String {
        lookup(self.value, path).map(value_to_string).unwrap_or_default()
    }
}

impl Element for JsonRecord<'_> {
    fn attr(&self, name: &str) -> String {
        self.string_at(name)
    }

    fn child_attr(&self, path: &str, name: &str) -> String {
        self.string_at(&format!("{path}.{name}"))
    }

    fn child_text(&self, path: &str) -> String {
        self.string_at(path).trim().to_string()
    }

    fn child_values(&self, path: &str, attribute: Option<&str>) -> Vec<String> {
        let read = |item: &Value| match attribute {
            Some(name) => lookup(item, name).map(value_to_string).unwrap_or_default(),
            None => value_to_string(item),
        };
        match lookup(self.value, path) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(read).collect(),
            Some(single) => vec![read(single)],
        }
    }
}

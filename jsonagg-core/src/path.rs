//! Field path resolution
//!
//! `$match` and `$group` address fields with dotted, case-insensitive paths
//! (`"Contacts.EMAIL"` finds `contacts.email`). `$sort` uses plain exact-case
//! top-level property access instead; see [`get_property`].

use serde_json::Value;

/// Case-insensitive comparison of two keys (full Unicode lowercase folding)
fn keys_equal_ignore_case(a: &str, b: &str) -> bool {
    a == b
        || a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
}

/// Look up `name` in an object ignoring case.
///
/// When several keys differ only by case, the first in document order wins.
/// Non-objects have no properties.
pub fn get_property_ignore_case<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .iter()
            .find(|(key, _)| keys_equal_ignore_case(key, name))
            .map(|(_, v)| v),
        _ => None,
    }
}

/// Exact-case, top-level property access (no dot traversal)
pub fn get_property<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(name),
        _ => None,
    }
}

/// A dot-separated path such as `contacts.email`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        FieldPath {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    /// Parse a `"$field.path"` reference, dropping the leading `$` if present
    pub fn from_reference(reference: &str) -> Self {
        Self::parse(reference.trim_start_matches('$'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Descend one segment at a time, ignoring case.
    ///
    /// Returns `None` as soon as a segment is missing or the current value is
    /// not an object.
    ///
    /// ```
    /// use serde_json::json;
    /// use jsonagg_core::path::FieldPath;
    ///
    /// let doc = json!({"Contacts": {"Email": "alice@example.com"}});
    /// let path = FieldPath::parse("contacts.email");
    /// assert_eq!(path.resolve(&doc), Some(&json!("alice@example.com")));
    /// assert_eq!(FieldPath::parse("contacts.phone").resolve(&doc), None);
    /// ```
    pub fn resolve<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(doc, |current, segment| get_property_ignore_case(current, segment))
    }
}

//! Shared value types: markup dialects and out-of-band property values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Markup dialect of an element, decided by its namespace.
///
/// `Svg` is the strict-XML dialect: elements are constructed namespace-aware
/// and tag case is preserved. `Html` and `Vml` use the default dialect.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Html,
    Svg,
    Vml,
}

impl DocType {
    /// All dialects, in table order.
    pub const ALL: [DocType; 3] = [DocType::Html, DocType::Svg, DocType::Vml];

    /// Wire name of the dialect.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocType::Html => "html",
            DocType::Svg => "svg",
            DocType::Vml => "vml",
        }
    }

    /// Whether elements of this dialect keep their tag case.
    pub const fn preserves_case(&self) -> bool {
        matches!(self, DocType::Svg)
    }
}

impl Default for DocType {
    fn default() -> Self {
        DocType::Html
    }
}

impl fmt::Debug for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocType({})", self.as_str())
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of an out-of-band property.
///
/// Untagged on the wire so that `{"checked": true}` and
/// `{"style.cssText": "color: red"}` both read naturally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl PropValue {
    /// A value counts as present unless it is `false`, `0` or empty.
    ///
    /// Absent values are never captured, so switching a flag off is
    /// observed as a removal.
    pub fn is_present(&self) -> bool {
        match self {
            PropValue::Bool(b) => *b,
            PropValue::Int(i) => *i != 0,
            PropValue::Text(s) => !s.is_empty(),
        }
    }

    /// Interpret as a boolean, DOM style.
    pub fn as_bool(&self) -> bool {
        self.is_present()
    }

    /// Interpret as an integer, parsing text when needed.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Bool(b) => Some(i64::from(*b)),
            PropValue::Int(i) => Some(*i),
            PropValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Render as the string a reflected attribute would hold.
    pub fn to_attribute_value(&self) -> String {
        match self {
            PropValue::Bool(b) => b.to_string(),
            PropValue::Int(i) => i.to_string(),
            PropValue::Text(s) => s.clone(),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

/// Flat mapping of property key (e.g. `style.cssText`) to value.
pub type PropertyMap = BTreeMap<String, PropValue>;

/// Flat mapping of attribute name to value.
pub type AttributeMap = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_wire_names() {
        assert_eq!(serde_json::to_string(&DocType::Svg).unwrap(), "\"svg\"");
        let parsed: DocType = serde_json::from_str("\"vml\"").unwrap();
        assert_eq!(parsed, DocType::Vml);
    }

    #[test]
    fn test_prop_value_presence() {
        assert!(!PropValue::Bool(false).is_present());
        assert!(!PropValue::Int(0).is_present());
        assert!(!PropValue::Text(String::new()).is_present());
        assert!(PropValue::Bool(true).is_present());
        assert!(PropValue::Int(-1).is_present());
        assert!(PropValue::from("x").is_present());
    }

    #[test]
    fn test_prop_value_untagged_json() {
        let map: PropertyMap =
            serde_json::from_str(r#"{"checked": true, "colSpan": 2, "value": "hi"}"#).unwrap();
        assert_eq!(map["checked"], PropValue::Bool(true));
        assert_eq!(map["colSpan"], PropValue::Int(2));
        assert_eq!(map["value"], PropValue::Text("hi".into()));
    }
}

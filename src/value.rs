//! The value taxonomy of the accessibility API.
//!
//! The OS returns values of many dynamic types under one attribute API; this
//! maps them onto a closed tagged union so every call site pattern-matches
//! and a new variant is a compile-time reminder.

use std::collections::BTreeMap;
use std::fmt;

/// A character range as `start` plus `len`; `end` is always `start + len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TextRange {
    pub start: i64,
    pub len: i64,
}

impl TextRange {
    pub fn new(start: i64, len: i64) -> Self {
        Self { start, len }
    }

    /// Range covering `[start, end)`.
    pub fn span(start: i64, end: i64) -> Self {
        Self { start, len: end - start }
    }

    pub fn end(&self) -> i64 {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A dynamically-typed attribute value, generic over the element handle type
/// of the gateway that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum AxValue<E> {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Attributed string, already flattened to its plain-text content.
    AttrStr(String),
    Url(String),
    Range(TextRange),
    Point(Point),
    Size(Size),
    Rect(Rect),
    Element(E),
    Array(Vec<AxValue<E>>),
    Dict(BTreeMap<String, AxValue<E>>),
    /// An error value stored inside an attribute slot (not a call failure).
    Failure(String),
    Null,
}

impl<E> AxValue<E> {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AxValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AxValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// String content of plain or attributed strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AxValue::Str(s) | AxValue::AttrStr(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<TextRange> {
        match self {
            AxValue::Range(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&E> {
        match self {
            AxValue::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Elements of an array value, skipping non-element entries.
    pub fn as_elements(&self) -> Option<Vec<&E>> {
        match self {
            AxValue::Array(items) => {
                Some(items.iter().filter_map(|v| v.as_element()).collect())
            }
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AxValue::Null)
    }

    /// Non-empty string content, trimmed check only (content returned as-is).
    pub fn non_empty_str(&self) -> Option<&str> {
        self.as_str().filter(|s| !s.is_empty())
    }
}

impl<E: fmt::Debug> AxValue<E> {
    /// Short human-readable tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AxValue::Bool(_) => "bool",
            AxValue::Int(_) => "int",
            AxValue::Float(_) => "float",
            AxValue::Str(_) => "string",
            AxValue::AttrStr(_) => "attributed-string",
            AxValue::Url(_) => "url",
            AxValue::Range(_) => "range",
            AxValue::Point(_) => "point",
            AxValue::Size(_) => "size",
            AxValue::Rect(_) => "rect",
            AxValue::Element(_) => "element",
            AxValue::Array(_) => "array",
            AxValue::Dict(_) => "dictionary",
            AxValue::Failure(_) => "error",
            AxValue::Null => "null",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_end_is_start_plus_len() {
        let r = TextRange::new(3, 4);
        assert_eq!(r.end(), 7);
        assert_eq!(TextRange::span(3, 7), r);
        assert!(TextRange::new(5, 0).is_empty());
    }

    #[test]
    fn accessors_match_variants() {
        let v: AxValue<u32> = AxValue::Str("hello".into());
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_bool(), None);

        let v: AxValue<u32> = AxValue::AttrStr("styled".into());
        assert_eq!(v.as_str(), Some("styled"));

        let v: AxValue<u32> = AxValue::Array(vec![
            AxValue::Element(1),
            AxValue::Str("x".into()),
            AxValue::Element(2),
        ]);
        assert_eq!(v.as_elements(), Some(vec![&1, &2]));
    }

    #[test]
    fn empty_strings_are_not_content() {
        let v: AxValue<u32> = AxValue::Str(String::new());
        assert_eq!(v.non_empty_str(), None);
        let v: AxValue<u32> = AxValue::Str("x".into());
        assert_eq!(v.non_empty_str(), Some("x"));
    }
}

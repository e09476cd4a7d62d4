use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::json_path;

/// One way a list endpoint may lay out its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// The body itself is a JSON array.
    BareArray,
    /// An object holding the array under this (dotted) key, e.g. `courses` or `data.items`.
    Field(String),
}

impl FromStr for ResponseShape {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "array" | "[]" => Self::BareArray,
            field => Self::Field(field.to_string()),
        })
    }
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BareArray => f.write_str("array"),
            Self::Field(name) => write!(f, "field `{name}`"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedList<'a> {
    /// Index into the resolver's shape list that matched.
    pub shape: usize,
    pub items: &'a [Value],
}

/// Tries an ordered list of shapes and reports which one matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeResolver {
    shapes: Vec<ResponseShape>,
}

impl ShapeResolver {
    pub fn new(shapes: Vec<ResponseShape>) -> Self {
        Self { shapes }
    }

    pub fn shapes(&self) -> &[ResponseShape] {
        &self.shapes
    }

    pub fn resolve<'a>(&self, body: &'a Value) -> Result<ResolvedList<'a>> {
        for (idx, shape) in self.shapes.iter().enumerate() {
            let candidate = match shape {
                ResponseShape::BareArray => body.as_array(),
                ResponseShape::Field(path) => {
                    json_path::lookup(body, path).and_then(Value::as_array)
                }
            };
            if let Some(items) = candidate {
                return Ok(ResolvedList { shape: idx, items });
            }
        }

        Err(Error::UnrecognizedShape {
            tried: self
                .shapes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    pub fn resolve_slice(&self, body: &[u8]) -> Result<usize> {
        let value: Value = serde_json::from_slice(body)?;
        Ok(self.resolve(&value)?.items.len())
    }
}

impl Default for ShapeResolver {
    /// Shapes seen across the course API: a bare array, `courses`, `data`.
    fn default() -> Self {
        Self::new(vec![
            ResponseShape::BareArray,
            ResponseShape::Field("courses".to_string()),
            ResponseShape::Field("data".to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tries_shapes_in_order() {
        let resolver = ShapeResolver::default();

        let bare = json!([{"courseId": "CS101"}, {"courseId": "CS102"}]);
        let resolved = resolver.resolve(&bare).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(resolved.shape, 0);
        assert_eq!(resolved.items.len(), 2);

        let wrapped = json!({"data": [1, 2, 3]});
        let resolved = resolver.resolve(&wrapped).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(resolved.shape, 2);
        assert_eq!(resolved.items.len(), 3);
    }

    #[test]
    fn unknown_object_is_unrecognized_not_empty() {
        let resolver = ShapeResolver::new(vec![
            ResponseShape::BareArray,
            ResponseShape::Field("notifications".to_string()),
        ]);
        let err = match resolver.resolve(&json!({"items": [1]})) {
            Ok(r) => panic!("expected error, got {r:?}"),
            Err(e) => e,
        };
        match err {
            Error::UnrecognizedShape { tried } => {
                assert_eq!(tried, "array, field `notifications`");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn field_that_is_not_an_array_does_not_match() {
        let resolver = ShapeResolver::new(vec![ResponseShape::Field("courses".to_string())]);
        assert!(resolver.resolve(&json!({"courses": {"a": 1}})).is_err());
        assert_eq!(
            resolver
                .resolve_slice(br#"{"courses": []}"#)
                .unwrap_or_else(|e| panic!("{e}")),
            0
        );
        assert!(matches!(resolver.resolve_slice(b"not json"), Err(Error::Json(_))));
    }

    #[test]
    fn shapes_parse_from_plan_strings() {
        assert_eq!("array".parse(), Ok(ResponseShape::BareArray));
        assert_eq!(
            "data.items".parse(),
            Ok(ResponseShape::Field("data.items".to_string()))
        );
    }
}

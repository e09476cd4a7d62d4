use std::sync::Arc;

use swarmr_value::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    #[strum(serialize = "integer", serialize = "int")]
    Integer,
    #[strum(serialize = "float", serialize = "number")]
    Float,
}

impl FieldKind {
    /// Parses a raw (already trimmed) field. Errors describe why the line is malformed.
    pub(crate) fn parse(self, raw: &str) -> std::result::Result<Value, String> {
        match self {
            Self::Text => Ok(Value::from(raw)),
            Self::Integer => raw.parse::<i64>().map(Value::I64).map_err(|e| {
                use std::num::IntErrorKind;
                match e.kind() {
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                        format!("integer `{raw}` overflows i64")
                    }
                    IntErrorKind::Empty => "empty integer field".to_string(),
                    _ => format!("`{raw}` is not an integer"),
                }
            }),
            Self::Float => {
                let v: f64 = raw
                    .parse()
                    .map_err(|_| format!("`{raw}` is not a number"))?;
                if !v.is_finite() {
                    return Err(format!("`{raw}` is not a finite number"));
                }
                Ok(Value::F64(v))
            }
        }
    }
}

/// How malformed lines are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LoadMode {
    /// Skip and count malformed lines.
    #[default]
    Lenient,
    /// Fail the whole load on the first malformed line.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub delimiter: char,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(delimiter: char, fields: Vec<FieldSpec>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::EmptySchema);
        }

        for (idx, f) in fields.iter().enumerate() {
            if fields[..idx].iter().any(|prev| prev.name == f.name) {
                return Err(Error::DuplicateField(f.name.clone()));
            }
        }

        Ok(Self { delimiter, fields })
    }

    pub fn field_names(&self) -> Arc<[Arc<str>]> {
        self.fields
            .iter()
            .map(|f| Arc::<str>::from(f.name.as_str()))
            .collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

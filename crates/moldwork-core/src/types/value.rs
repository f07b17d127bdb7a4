//! Scalar values held by keyvals, defaults and VALUE restrictions.

use super::MoldError;
use serde::{Deserialize, Serialize};

/// The declared type of a keyval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Enum,
}

impl ValueType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Enum => "enum",
        }
    }

    /// Whether RANGE restrictions measure values of this type by length.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(self, ValueType::String | ValueType::Enum)
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ValueType {
    type Err = MoldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ValueType::String),
            "integer" => Ok(ValueType::Integer),
            "float" => Ok(ValueType::Float),
            "boolean" => Ok(ValueType::Boolean),
            "enum" => Ok(ValueType::Enum),
            other => Err(MoldError::InvalidArgument(format!(
                "unknown value type '{}'",
                other
            ))),
        }
    }
}

/// A typed scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Enum(String),
}

impl Value {
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Enum(_) => ValueType::Enum,
        }
    }

    /// Parse the canonical text form of a value of the given type.
    pub fn parse(value_type: ValueType, text: &str) -> Result<Self, MoldError> {
        let invalid = || {
            MoldError::InvalidArgument(format!("'{}' is not a valid {} value", text, value_type))
        };
        match value_type {
            ValueType::String => Ok(Value::String(text.to_string())),
            ValueType::Enum => Ok(Value::Enum(text.to_string())),
            ValueType::Integer => text.trim().parse().map(Value::Integer).map_err(|_| invalid()),
            ValueType::Float => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .ok_or_else(invalid),
            ValueType::Boolean => match text.trim() {
                "true" | "yes" | "on" | "1" => Ok(Value::Boolean(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Boolean(false)),
                _ => Err(invalid()),
            },
        }
    }

    /// The magnitude RANGE restrictions compare against.
    ///
    /// Numbers measure as themselves, text by its length in characters.
    /// Booleans have no magnitude.
    #[must_use]
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) | Value::Enum(s) => Some(s.chars().count() as f64),
            Value::Boolean(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) | Value::Enum(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

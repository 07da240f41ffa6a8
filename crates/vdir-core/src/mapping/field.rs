//! Value producers shared by attribute and field mappings.

use serde::{Deserialize, Serialize};
use vdir_proto::Value;

/// How a mapped attribute or field obtains its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingValue {
    /// A fixed value.
    Constant(Value),
    /// A reference to a bound variable: a logical attribute name, or
    /// `alias.field` for per-source values.
    Variable(String),
    /// A scripted expression evaluated by the configured interpreter.
    Expression(String),
}

impl MappingValue {
    /// The variable name, if this is a variable reference.
    pub fn variable(&self) -> Option<&str> {
        match self {
            MappingValue::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// The constant value, if this is a constant.
    pub fn constant(&self) -> Option<&Value> {
        match self {
            MappingValue::Constant(value) => Some(value),
            _ => None,
        }
    }
}

//! Logical filter tree and combinator helpers.
//!
//! A filter arrives at the engine expressed over logical attribute names
//! and leaves it rewritten over backend field names. Both forms use the
//! same tree; only the names inside the leaf nodes change.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator for simple filters and relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

/// A single attribute/field comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleFilter {
    /// Attribute name (logical form) or field name (source-local form).
    pub attribute: String,
    /// Comparison operator.
    pub op: CompareOp,
    /// Value to compare against. `*` with `Eq` is a presence test.
    pub value: Value,
}

impl SimpleFilter {
    /// Create an equality filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    /// Create a presence filter (`attribute=*`).
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::eq(attribute, "*")
    }

    /// Check if this is a presence test.
    pub fn is_presence(&self) -> bool {
        self.op == CompareOp::Eq && self.value.is_wildcard()
    }
}

/// A substring match with `*` wildcards, e.g. `cn=a*b*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstringFilter {
    /// Attribute name (logical form) or field name (source-local form).
    pub attribute: String,
    /// Pattern containing `*` wildcards.
    pub pattern: String,
}

/// A logical filter tree.
///
/// Compound nodes own their children; translation and evaluation handle
/// every variant with exhaustive matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// All children must match.
    And(Vec<Filter>),
    /// At least one child must match.
    Or(Vec<Filter>),
    /// The child must not match.
    Not(Box<Filter>),
    /// A single comparison.
    Simple(SimpleFilter),
    /// A substring match.
    Substring(SubstringFilter),
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Simple(SimpleFilter::eq(attribute, value))
    }

    /// Create a presence filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Simple(SimpleFilter::present(attribute))
    }

    /// Create a substring filter.
    pub fn substring(attribute: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Substring(SubstringFilter {
            attribute: attribute.into(),
            pattern: pattern.into(),
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) => {
                write!(f, "(&")?;
                for c in children {
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Filter::Or(children) => {
                write!(f, "(|")?;
                for c in children {
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Filter::Not(child) => write!(f, "(!{child})"),
            Filter::Simple(s) => write!(f, "({}{}{})", s.attribute, s.op, s.value),
            Filter::Substring(s) => write!(f, "({}={})", s.attribute, s.pattern),
        }
    }
}

/// AND two optional filters together, flattening nested AND nodes.
///
/// `None` means "no constraint", so ANDing with it is the identity.
pub fn append_and(filter: Option<Filter>, other: Option<Filter>) -> Option<Filter> {
    match (filter, other) {
        (None, f) | (f, None) => f,
        (Some(Filter::And(mut children)), Some(Filter::And(more))) => {
            children.extend(more);
            Some(Filter::And(children))
        }
        (Some(Filter::And(mut children)), Some(f)) => {
            children.push(f);
            Some(Filter::And(children))
        }
        (Some(f), Some(Filter::And(mut children))) => {
            children.insert(0, f);
            Some(Filter::And(children))
        }
        (Some(a), Some(b)) => Some(Filter::And(vec![a, b])),
    }
}

/// OR two optional filters together, flattening nested OR nodes.
pub fn append_or(filter: Option<Filter>, other: Option<Filter>) -> Option<Filter> {
    match (filter, other) {
        (None, f) | (f, None) => f,
        (Some(Filter::Or(mut children)), Some(Filter::Or(more))) => {
            children.extend(more);
            Some(Filter::Or(children))
        }
        (Some(Filter::Or(mut children)), Some(f)) => {
            children.push(f);
            Some(Filter::Or(children))
        }
        (Some(f), Some(Filter::Or(mut children))) => {
            children.insert(0, f);
            Some(Filter::Or(children))
        }
        (Some(a), Some(b)) => Some(Filter::Or(vec![a, b])),
    }
}

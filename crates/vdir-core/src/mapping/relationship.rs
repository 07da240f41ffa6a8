//! Relationships between source fields.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vdir_proto::CompareOp;

/// A qualified reference to one field of one source alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldRef {
    /// Source alias within the entry.
    pub alias: String,
    /// Field name on the backend source.
    pub field: String,
}

impl FieldRef {
    /// Create a field reference from parts.
    pub fn new(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            field: field.into(),
        }
    }

    /// The `alias.field` form used as an AttributeValues key.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.alias, self.field)
    }
}

impl FromStr for FieldRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.split_once('.') {
            Some((alias, field)) if !alias.is_empty() && !field.is_empty() => {
                Ok(Self::new(alias, field))
            }
            _ => Err(Error::InvalidReference(s.to_string())),
        }
    }
}

impl TryFrom<String> for FieldRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl From<FieldRef> for String {
    fn from(r: FieldRef) -> String {
        r.qualified()
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.field)
    }
}

/// A comparison constraint between two source fields.
///
/// Relationships drive joins during search/load/merge and value
/// propagation between sources during mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Left-hand field reference.
    pub lhs: FieldRef,
    /// Comparison operator, almost always equality.
    #[serde(default = "default_op")]
    pub op: CompareOp,
    /// Right-hand field reference.
    pub rhs: FieldRef,
}

fn default_op() -> CompareOp {
    CompareOp::Eq
}

impl Relationship {
    /// Create an equality relationship.
    pub fn eq(lhs: FieldRef, rhs: FieldRef) -> Self {
        Self {
            lhs,
            op: CompareOp::Eq,
            rhs,
        }
    }

    /// Parse an equality relationship from `alias.field` strings.
    pub fn parse_eq(lhs: &str, rhs: &str) -> Result<Self, Error> {
        Ok(Self::eq(lhs.parse()?, rhs.parse()?))
    }

    /// Orient the relationship so the first returned side belongs to
    /// `alias`. Returns `None` if neither side does.
    pub fn oriented<'a>(&'a self, alias: &str) -> Option<(&'a FieldRef, &'a FieldRef)> {
        if self.lhs.alias == alias {
            Some((&self.lhs, &self.rhs))
        } else if self.rhs.alias == alias {
            Some((&self.rhs, &self.lhs))
        } else {
            None
        }
    }

    /// Check if the relationship touches the given alias.
    pub fn touches(&self, alias: &str) -> bool {
        self.lhs.alias == alias || self.rhs.alias == alias
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_ref() {
        let r: FieldRef = "users.id".parse().unwrap();
        assert_eq!(r.alias, "users");
        assert_eq!(r.field, "id");
        assert_eq!(r.qualified(), "users.id");
    }

    #[test]
    fn reject_malformed_refs() {
        assert!("users".parse::<FieldRef>().is_err());
        assert!(".id".parse::<FieldRef>().is_err());
        assert!("users.".parse::<FieldRef>().is_err());
    }

    #[test]
    fn orientation() {
        let rel = Relationship::parse_eq("users.id", "emails.uid").unwrap();

        let (local, remote) = rel.oriented("emails").unwrap();
        assert_eq!(local.field, "uid");
        assert_eq!(remote.field, "id");

        let (local, _) = rel.oriented("users").unwrap();
        assert_eq!(local.field, "id");

        assert!(rel.oriented("groups").is_none());
    }

    #[test]
    fn serde_uses_qualified_strings() {
        let rel = Relationship::parse_eq("a.x", "b.y").unwrap();
        let json = serde_json::to_string(&rel).unwrap();
        assert!(json.contains("\"a.x\""));
        let back: Relationship = serde_json::from_str(&json).unwrap();
        assert_eq!(rel, back);
    }
}

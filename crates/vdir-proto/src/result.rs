//! Backend result codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single backend operation.
///
/// Backend failures travel as values, not errors: a visitor records the
/// first non-success code it sees and stops descending that branch, while
/// sibling branches keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResultCode {
    /// The operation completed.
    #[default]
    Success,
    /// Internal backend failure.
    OperationsError,
    /// Result set truncated by a size limit.
    SizeLimitExceeded,
    /// No row matched the given key.
    NoSuchObject,
    /// Authentication against the backend failed.
    InvalidCredentials,
    /// A row with the given key already exists.
    AlreadyExists,
}

impl ResultCode {
    /// Check if this code indicates success.
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }

    /// The directory-protocol numeric code.
    pub fn code(self) -> u32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::OperationsError => 1,
            ResultCode::SizeLimitExceeded => 4,
            ResultCode::NoSuchObject => 32,
            ResultCode::InvalidCredentials => 49,
            ResultCode::AlreadyExists => 68,
        }
    }

    /// Combine with another code, keeping the first failure.
    pub fn and(self, other: ResultCode) -> ResultCode {
        if self.is_success() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultCode::Success => "success",
            ResultCode::OperationsError => "operations error",
            ResultCode::SizeLimitExceeded => "size limit exceeded",
            ResultCode::NoSuchObject => "no such object",
            ResultCode::InvalidCredentials => "invalid credentials",
            ResultCode::AlreadyExists => "already exists",
        };
        write!(f, "{s} ({})", self.code())
    }
}

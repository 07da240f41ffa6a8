//! VDIR protocol types.
//!
//! This crate defines the data types exchanged between the federation
//! engine and its collaborators: runtime values, the logical filter tree,
//! and the backend result-code taxonomy.
//!
//! # Modules
//!
//! - [`value`] - Runtime value type for attribute and field data
//! - [`filter`] - Logical filter tree and combinator helpers
//! - [`result`] - Backend result codes

pub mod filter;
pub mod result;
pub mod value;

pub use filter::{append_and, append_or, CompareOp, Filter, SimpleFilter, SubstringFilter};
pub use result::ResultCode;
pub use value::Value;

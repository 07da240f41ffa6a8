//! VDIR Core - Source federation for a virtual directory.
//!
//! This crate joins rows from independent backend sources into logical
//! directory entries. An [`mapping::EntryMapping`] declares which sources
//! back an entry and how their fields relate; the [`engine`] plans,
//! searches, loads, merges, and mutates across them through pluggable
//! [`connector::Connector`]s.

pub mod connector;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod filter;
pub mod graph;
pub mod interp;
pub mod lock;
pub mod mapping;
pub mod record;

pub use connector::{Connector, ConnectorRegistry, ConnectorResponse, MemoryConnector};
pub use engine::{
    EntryLoader, EntryMerger, FederationEngine, MutationKind, MutationVisitor, SearchPlan,
    SearchResponse, SearchRunner,
};
pub use error::Error;
pub use fanout::{Dispatch, FanoutBarrier};
pub use filter::FilterEvaluator;
pub use graph::{Graph, GraphEdge};
pub use interp::{ExprInterpreter, Interpreter};
pub use lock::SourceLocks;
pub use mapping::{
    AttributeMapping, EntryMapping, FieldMapping, FieldRef, MappingValue, Relationship,
    SourceMapping,
};
pub use record::{AttributeValues, Row};

/// Re-export protocol types.
pub use vdir_proto as proto;

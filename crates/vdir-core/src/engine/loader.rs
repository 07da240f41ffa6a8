//! Load-by-key traversal.
//!
//! Once a search has established which primary-source keys matter, this
//! visitor fetches the full rows of every reachable source so the merger
//! can assemble complete entries. Loading is best-effort per branch: a
//! backend failure is recorded and siblings still load.

use super::join;
use crate::connector::ConnectorRegistry;
use crate::error::Error;
use crate::graph::Graph;
use crate::lock::SourceLocks;
use crate::mapping::EntryMapping;
use crate::record::AttributeValues;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use vdir_proto::{append_and, Filter, ResultCode};

/// The per-alias rows fetched by one load pass, keyed `alias.field`.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Loaded rows per source alias.
    pub rows: BTreeMap<String, Vec<AttributeValues>>,
    /// First non-success backend code, or success.
    pub code: ResultCode,
}

/// Walks the graph fetching full rows for later merging.
pub struct EntryLoader<'a> {
    entry: &'a EntryMapping,
    graph: &'a Graph,
    connectors: &'a ConnectorRegistry,
    locks: &'a SourceLocks,
}

impl<'a> EntryLoader<'a> {
    /// Create a loader for one entry.
    pub fn new(
        entry: &'a EntryMapping,
        graph: &'a Graph,
        connectors: &'a ConnectorRegistry,
        locks: &'a SourceLocks,
    ) -> Self {
        Self {
            entry,
            graph,
            connectors,
            locks,
        }
    }

    /// Load every source reachable from `primary`.
    ///
    /// `filter` selects the relevant rows at the primary source, in that
    /// source's own field names. `base` carries `alias.field` values
    /// already known to the caller; an alias present there is treated as
    /// loaded and skipped, though its edges are still followed.
    pub fn load(
        &self,
        primary: &str,
        filter: Option<&Filter>,
        base: &AttributeValues,
    ) -> Result<LoadOutcome, Error> {
        let mut outcome = LoadOutcome::default();
        let mut visited = BTreeSet::new();
        self.visit(primary, filter.cloned(), base, &mut visited, &mut outcome)?;
        Ok(outcome)
    }

    fn visit(
        &self,
        alias: &str,
        filter: Option<Filter>,
        base: &AttributeValues,
        visited: &mut BTreeSet<String>,
        outcome: &mut LoadOutcome,
    ) -> Result<(), Error> {
        visited.insert(alias.to_string());

        let source = self
            .graph
            .node(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;

        let parent_rows = if base.contains_alias(alias) {
            // Already supplied by the caller; its values still drive the
            // join keys for sources further out.
            vec![base.clone()]
        } else {
            let mut effective = filter;
            if let Some(static_filter) = &source.filter {
                effective = append_and(effective, Some(static_filter.clone()));
            }

            let response = {
                let _guard = self.locks.read(&source.source)?;
                let connector = self.connectors.get(&source.source)?;
                connector.load(&source.source, effective.as_ref())
            };
            debug!(
                alias,
                source = %source.source,
                rows = response.rows.len(),
                code = %response.code,
                "loaded source"
            );
            if !response.code.is_success() {
                outcome.code = outcome.code.and(response.code);
                return Ok(());
            }

            let mut wrapped = Vec::with_capacity(response.rows.len());
            for row in &response.rows {
                let mut av = AttributeValues::new();
                av.add_prefixed(alias, row);
                wrapped.push(av);
            }
            outcome.rows.insert(alias.to_string(), wrapped.clone());
            wrapped
        };

        for edge in self.graph.edges_from(alias) {
            let Some(neighbor) = edge.other(alias) else {
                continue;
            };
            if visited.contains(neighbor) {
                continue;
            }
            if !self.entry.declares(neighbor) && !base.contains_alias(neighbor) {
                continue;
            }
            let key = join::join_filter(&parent_rows, &edge.relationships, neighbor);
            // A neighbor supplied in the base needs no key; otherwise an
            // unbound join key would mean an unfiltered fetch nothing can
            // merge against.
            if key.is_none() && !base.contains_alias(neighbor) {
                continue;
            }
            let neighbor = neighbor.to_string();
            self.visit(&neighbor, key, base, visited, outcome)?;
        }
        Ok(())
    }
}

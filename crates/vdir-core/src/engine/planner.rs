//! Search planning.
//!
//! A plan assigns every source reachable from the primary source a
//! translated filter and its depth in the traversal, and collects the
//! edges that cross into inherited sources. Sources unreachable from the
//! primary get no plan entry and are skipped by execution.

use super::translate;
use crate::error::Error;
use crate::graph::Graph;
use crate::interp::Interpreter;
use crate::mapping::{EntryMapping, Relationship};
use crate::record::AttributeValues;
use std::collections::BTreeMap;
use vdir_proto::Filter;

/// An edge from a locally declared source to an inherited one.
///
/// Execution bridges these through parent-supplied values instead of
/// searching the inherited source again.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectingEdge {
    /// The locally declared endpoint.
    pub from: String,
    /// The inherited endpoint.
    pub to: String,
    /// The relationships joining the two.
    pub relationships: Vec<Relationship>,
}

/// A per-entry search plan.
#[derive(Debug)]
pub struct SearchPlan {
    primary: String,
    filters: BTreeMap<String, Option<Filter>>,
    depths: BTreeMap<String, usize>,
    /// Aliases in discovery order; ties in [`best_start`] resolve to the
    /// earliest entry here.
    ///
    /// [`best_start`]: SearchPlan::best_start
    order: Vec<String>,
    connecting: Vec<ConnectingEdge>,
}

impl SearchPlan {
    /// Plan a search over the entry's graph.
    ///
    /// `filter` is the logical filter, if any; `parent` carries inherited
    /// `alias.field` values.
    pub fn build(
        entry: &EntryMapping,
        graph: &Graph,
        primary: &str,
        filter: Option<&Filter>,
        parent: &AttributeValues,
        interpreter: &dyn Interpreter,
    ) -> Result<Self, Error> {
        let mut plan = Self {
            primary: primary.to_string(),
            filters: BTreeMap::new(),
            depths: BTreeMap::new(),
            order: Vec::new(),
            connecting: Vec::new(),
        };
        plan.visit(entry, graph, primary, 0, filter, parent, interpreter)?;
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn visit(
        &mut self,
        entry: &EntryMapping,
        graph: &Graph,
        alias: &str,
        depth: usize,
        filter: Option<&Filter>,
        parent: &AttributeValues,
        interpreter: &dyn Interpreter,
    ) -> Result<(), Error> {
        let source = graph
            .node(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;

        let translated = match filter {
            Some(filter) => translate::translate(entry, source, filter, parent, interpreter)?,
            None => None,
        };
        self.filters.insert(alias.to_string(), translated);
        self.depths.insert(alias.to_string(), depth);
        self.order.push(alias.to_string());

        for edge in graph.edges_from(alias) {
            let Some(neighbor) = edge.other(alias) else {
                continue;
            };
            if self.depths.contains_key(neighbor) {
                continue;
            }
            if !entry.declares(neighbor) {
                // Inherited alias: bridge through parent context, never
                // descend.
                self.connecting.push(ConnectingEdge {
                    from: alias.to_string(),
                    to: neighbor.to_string(),
                    relationships: edge.relationships.clone(),
                });
                continue;
            }
            let neighbor = neighbor.to_string();
            self.visit(entry, graph, &neighbor, depth + 1, filter, parent, interpreter)?;
        }
        Ok(())
    }

    /// The planned filter for a source, if the source was reached.
    pub fn filter(&self, alias: &str) -> Option<&Filter> {
        self.filters.get(alias).and_then(|f| f.as_ref())
    }

    /// The traversal depth of a source, if it was reached.
    pub fn depth(&self, alias: &str) -> Option<usize> {
        self.depths.get(alias).copied()
    }

    /// Whether the source participates in planned execution.
    pub fn is_planned(&self, alias: &str) -> bool {
        self.depths.contains_key(alias)
    }

    /// The edges leading to inherited sources.
    pub fn connecting(&self) -> &[ConnectingEdge] {
        &self.connecting
    }

    /// Planned aliases in discovery order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// The source execution should start from: the deepest source holding
    /// a non-null filter, ties broken by discovery order, falling back to
    /// the primary source when nothing was pushed anywhere.
    pub fn best_start(&self) -> &str {
        let mut best: Option<(&str, usize)> = None;
        for alias in &self.order {
            if self.filters.get(alias).is_some_and(|f| f.is_some()) {
                let depth = self.depths[alias];
                if best.map_or(true, |(_, d)| depth > d) {
                    best = Some((alias, depth));
                }
            }
        }
        best.map_or(self.primary.as_str(), |(alias, _)| alias)
    }
}

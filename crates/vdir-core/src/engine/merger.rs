//! Entry merging.
//!
//! Reconciles caller-known values with the rows fetched by the loader
//! into one logical record per entry instance. The merge produces exactly
//! one coherent tuple per entry: for every source the first candidate row
//! satisfying the join wins, never a cross product.

use super::join;
use crate::error::Error;
use crate::filter::FilterEvaluator;
use crate::graph::Graph;
use crate::mapping::Relationship;
use crate::record::AttributeValues;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Merges loaded rows into one logical record.
pub struct EntryMerger<'a> {
    graph: &'a Graph,
}

impl<'a> EntryMerger<'a> {
    /// Create a merger over one entry graph.
    pub fn new(graph: &'a Graph) -> Self {
        Self { graph }
    }

    /// Merge one entry instance.
    ///
    /// `base` seeds the accumulator with values already bound to the
    /// entry (keyed `alias.field`); `loaded` holds candidate rows per
    /// alias from the loader. Returns `None` when a required source has
    /// no row satisfying its join, leaving the entry unresolved.
    pub fn merge(
        &self,
        primary: &str,
        base: &AttributeValues,
        loaded: &BTreeMap<String, Vec<AttributeValues>>,
    ) -> Result<Option<AttributeValues>, Error> {
        let mut accumulator = base.clone();
        let mut visited = BTreeSet::new();
        if self.visit(primary, None, loaded, &mut visited, &mut accumulator)? {
            Ok(Some(accumulator))
        } else {
            Ok(None)
        }
    }

    /// Returns false when the entry cannot be resolved.
    fn visit(
        &self,
        alias: &str,
        arrival: Option<&[Relationship]>,
        loaded: &BTreeMap<String, Vec<AttributeValues>>,
        visited: &mut BTreeSet<String>,
        accumulator: &mut AttributeValues,
    ) -> Result<bool, Error> {
        visited.insert(alias.to_string());

        let source = self
            .graph
            .node(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;

        if !accumulator.contains_alias(alias) {
            let candidates = loaded.get(alias).map_or(&[][..], Vec::as_slice);
            let chosen = candidates.iter().find(|candidate| match arrival {
                // No join context yet: only the static filter narrows.
                None => source.filter.as_ref().map_or(true, |f| {
                    FilterEvaluator::matches(f, &candidate.strip_alias(alias))
                }),
                Some(relationships) => join::evaluate(relationships, accumulator, candidate),
            });

            match chosen {
                Some(row) => {
                    trace!(alias, "merged row into entry");
                    accumulator.add(row);
                }
                None if source.required => {
                    trace!(alias, "required source unmatched, entry unresolved");
                    return Ok(false);
                }
                // Left-join miss: the source's fields stay absent.
                None => {}
            }
        }

        for edge in self.graph.edges_from(alias) {
            let Some(neighbor) = edge.other(alias) else {
                continue;
            };
            if visited.contains(neighbor) {
                continue;
            }
            let neighbor = neighbor.to_string();
            if !self.visit(
                &neighbor,
                Some(&edge.relationships),
                loaded,
                visited,
                accumulator,
            )? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

//! The federation engine.
//!
//! [`FederationEngine`] is the front door: it owns the graph cache and
//! the collaborators every visitor needs, infers the primary source of an
//! entry mapping, and runs the plan/search/load/merge pipeline for reads
//! and the mutation traversal for writes.

mod join;
mod loader;
mod merger;
mod mutate;
mod planner;
mod runner;
mod translate;

pub use join::{evaluate as join_evaluate, join, join_filter, left_join};
pub use loader::{EntryLoader, LoadOutcome};
pub use merger::EntryMerger;
pub use mutate::{key_of, transform, MutationKind, MutationVisitor};
pub use planner::{ConnectingEdge, SearchPlan};
pub use runner::{SearchOutcome, SearchRunner};
pub use translate::translate;

use crate::connector::ConnectorRegistry;
use crate::error::Error;
use crate::fanout::{run_branches, Dispatch, FanoutBarrier};
use crate::filter::FilterEvaluator;
use crate::interp::{eval_mapping_multi, ExprInterpreter, Interpreter};
use crate::lock::SourceLocks;
use crate::mapping::{EntryMapping, MappingValue, SourceMapping};
use crate::record::{AttributeValues, Row};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use vdir_proto::{append_and, append_or, Filter, ResultCode};

/// The logical entries produced by one search.
#[derive(Debug, Default)]
pub struct SearchResponse {
    /// One logical record per merged entry.
    pub entries: Vec<AttributeValues>,
    /// First non-success backend code, or success.
    pub code: ResultCode,
}

/// Federates directory operations across backend sources.
///
/// The engine itself holds no per-operation state; every operation builds
/// its visitors fresh, so one engine serves any number of threads.
pub struct FederationEngine {
    connectors: Arc<ConnectorRegistry>,
    locks: Arc<SourceLocks>,
    interpreter: Arc<dyn Interpreter>,
    graphs: DashMap<String, Arc<crate::graph::Graph>>,
}

impl FederationEngine {
    /// Create an engine with the default expression interpreter and lock
    /// timeouts.
    pub fn new(connectors: Arc<ConnectorRegistry>) -> Self {
        Self::with_parts(
            connectors,
            Arc::new(SourceLocks::new()),
            Arc::new(ExprInterpreter),
        )
    }

    /// Create an engine with explicit collaborators.
    pub fn with_parts(
        connectors: Arc<ConnectorRegistry>,
        locks: Arc<SourceLocks>,
        interpreter: Arc<dyn Interpreter>,
    ) -> Self {
        Self {
            connectors,
            locks,
            interpreter,
            graphs: DashMap::new(),
        }
    }

    /// The relationship graph for an entry, built once and cached by DN.
    ///
    /// Entry mappings are immutable after configuration load, so the
    /// cache never invalidates.
    pub fn graph(
        &self,
        entry: &EntryMapping,
        inherited: &[SourceMapping],
    ) -> Result<Arc<crate::graph::Graph>, Error> {
        if let Some(graph) = self.graphs.get(&entry.dn) {
            return Ok(graph.clone());
        }
        let graph = Arc::new(crate::graph::Graph::build(entry, inherited)?);
        self.graphs.insert(entry.dn.clone(), graph.clone());
        Ok(graph)
    }

    /// Infer the entry's primary source: the alias supplying a naming
    /// attribute, else the first declared source.
    pub fn primary_source(&self, entry: &EntryMapping) -> Result<String, Error> {
        for attribute in entry.rdn_attributes() {
            match &attribute.value {
                MappingValue::Variable(name) => {
                    if let Some((alias, _)) = name.split_once('.') {
                        if entry.declares(alias) {
                            return Ok(alias.to_string());
                        }
                    }
                }
                MappingValue::Expression(expression) => {
                    for variable in self.interpreter.variables(expression)? {
                        if let Some((alias, _)) = variable.split_once('.') {
                            if entry.declares(alias) {
                                return Ok(alias.to_string());
                            }
                        }
                    }
                }
                MappingValue::Constant(_) => {}
            }
        }
        entry
            .sources
            .first()
            .map(|s| s.alias.clone())
            .ok_or_else(|| Error::MissingPrimarySource(entry.dn.clone()))
    }

    /// Search one entry mapping.
    ///
    /// `parent` carries `alias.field` values inherited from an ancestor
    /// entry instance; `filter` is the logical filter, if any.
    #[instrument(skip_all, fields(dn = %entry.dn))]
    pub fn search(
        &self,
        entry: &EntryMapping,
        inherited: &[SourceMapping],
        parent: &AttributeValues,
        filter: Option<&Filter>,
    ) -> Result<SearchResponse, Error> {
        let primary = self.primary_source(entry)?;
        let graph = self.graph(entry, inherited)?;
        let primary_mapping = graph
            .node(&primary)
            .ok_or_else(|| Error::UnknownAlias(primary.clone()))?;

        let plan = SearchPlan::build(
            entry,
            &graph,
            &primary,
            filter,
            parent,
            self.interpreter.as_ref(),
        )?;
        let runner = SearchRunner::new(entry, &graph, &plan, &self.connectors, &self.locks);
        let outcome = runner.run(plan.best_start())?;
        if !outcome.code.is_success() {
            return Ok(SearchResponse {
                entries: Vec::new(),
                code: outcome.code,
            });
        }
        debug!(rows = outcome.rows.len(), "search joined rows");

        // Load full rows for the keys the search selected.
        let key_filter = primary_key_filter(primary_mapping, &outcome.rows);
        let loader = EntryLoader::new(entry, &graph, &self.connectors, &self.locks);
        let loaded = match &key_filter {
            Some(key_filter) => loader.load(&primary, Some(key_filter), parent)?,
            None => LoadOutcome::default(),
        };

        let merger = EntryMerger::new(&graph);
        let mut entries = Vec::new();
        let mut seen = BTreeSet::new();
        for row in &outcome.rows {
            let identity = primary_key_row(primary_mapping, row).key();
            if !identity.is_empty() && !seen.insert(identity) {
                continue;
            }

            let mut base = parent.clone();
            base.add_prefixed(&primary, &row.strip_alias(&primary));
            let Some(merged) = merger.merge(&primary, &base, &loaded.rows)? else {
                continue;
            };

            let logical = self.produce_attributes(entry, &merged)?;
            if filter.map_or(true, |f| FilterEvaluator::matches(f, &logical)) {
                entries.push(logical);
            }
        }

        Ok(SearchResponse {
            entries,
            code: outcome.code.and(loaded.code),
        })
    }

    /// Search several sibling entry mappings through one completion
    /// barrier, deduplicating entries by naming identity.
    pub fn search_subtree(
        &self,
        entries: &[EntryMapping],
        parent: &AttributeValues,
        filter: Option<&Filter>,
        dispatch: Dispatch,
    ) -> Result<SearchResponse, Error> {
        let barrier = FanoutBarrier::new(entries.len());
        let code = Mutex::new(ResultCode::Success);

        let branches: Vec<_> = entries
            .iter()
            .map(|entry| {
                let barrier = &barrier;
                let code = &code;
                move || {
                    if !barrier.is_abandoned() {
                        match self.search(entry, &[], parent, filter) {
                            Ok(response) => {
                                let mut code = code.lock();
                                *code = code.and(response.code);
                                for logical in response.entries {
                                    let key = format!("{}:{}", entry.dn, entry_identity(entry, &logical));
                                    barrier.submit(key, logical);
                                }
                            }
                            Err(_) => {
                                let mut code = code.lock();
                                *code = code.and(ResultCode::OperationsError);
                            }
                        }
                    }
                    barrier.complete_branch();
                }
            })
            .collect();
        run_branches(dispatch, branches);

        Ok(SearchResponse {
            entries: barrier.wait(),
            code: code.into_inner(),
        })
    }

    /// Add one entry.
    #[instrument(skip_all, fields(dn = %entry.dn))]
    pub fn add(
        &self,
        entry: &EntryMapping,
        inherited: &[SourceMapping],
        attributes: &AttributeValues,
    ) -> Result<ResultCode, Error> {
        let primary = self.primary_source(entry)?;
        let graph = self.graph(entry, inherited)?;
        let visitor = MutationVisitor::new(
            entry,
            &graph,
            &self.connectors,
            &self.locks,
            self.interpreter.as_ref(),
        );
        visitor.add(&primary, attributes)
    }

    /// Modify one entry from `old` logical values to `new`.
    #[instrument(skip_all, fields(dn = %entry.dn))]
    pub fn modify(
        &self,
        entry: &EntryMapping,
        inherited: &[SourceMapping],
        old: &AttributeValues,
        new: &AttributeValues,
    ) -> Result<ResultCode, Error> {
        let primary = self.primary_source(entry)?;
        let graph = self.graph(entry, inherited)?;
        let visitor = MutationVisitor::new(
            entry,
            &graph,
            &self.connectors,
            &self.locks,
            self.interpreter.as_ref(),
        );
        visitor.modify(&primary, old, new)
    }

    /// Rename one entry: its rows are deleted under the old naming values
    /// and re-added under the new ones.
    #[instrument(skip_all, fields(dn = %entry.dn))]
    pub fn rename(
        &self,
        entry: &EntryMapping,
        inherited: &[SourceMapping],
        old: &AttributeValues,
        new: &AttributeValues,
    ) -> Result<ResultCode, Error> {
        let primary = self.primary_source(entry)?;
        let graph = self.graph(entry, inherited)?;
        let visitor = MutationVisitor::new(
            entry,
            &graph,
            &self.connectors,
            &self.locks,
            self.interpreter.as_ref(),
        );
        visitor.rename(&primary, old, new)
    }

    /// Produce the externally visible attributes from a merged record.
    fn produce_attributes(
        &self,
        entry: &EntryMapping,
        merged: &AttributeValues,
    ) -> Result<AttributeValues, Error> {
        let mut logical = AttributeValues::new();
        for attribute in &entry.attributes {
            if let Some(values) =
                eval_mapping_multi(&attribute.value, merged, self.interpreter.as_ref())?
            {
                for value in values {
                    logical.add_value(attribute.name.clone(), value);
                }
            }
        }
        Ok(logical)
    }
}

/// The primary-key tuple of one joined row, in qualified form.
fn primary_key_row(source: &SourceMapping, row: &AttributeValues) -> Row {
    source
        .primary_key_fields()
        .filter_map(|field| {
            row.first(&format!("{}.{}", source.alias, field.name))
                .map(|value| (field.name.clone(), value.clone()))
        })
        .collect()
}

/// An OR-filter over the primary keys of the given rows, in the primary
/// source's own field names. `None` when no row binds a key.
fn primary_key_filter(source: &SourceMapping, rows: &[AttributeValues]) -> Option<Filter> {
    let mut out = None;
    let mut seen = BTreeSet::new();
    for row in rows {
        let key = primary_key_row(source, row);
        if key.is_empty() || !seen.insert(key.key()) {
            continue;
        }
        let mut conjunct = None;
        for (field, value) in key.iter() {
            conjunct = append_and(conjunct, Some(Filter::eq(field.clone(), value.clone())));
        }
        if let Some(conjunct) = conjunct {
            out = append_or(out, Some(conjunct));
        }
    }
    out
}

/// A stable identity string for deduplicating logical entries: the
/// naming attribute values, falling back to the whole record.
fn entry_identity(entry: &EntryMapping, logical: &AttributeValues) -> String {
    let mut out = String::new();
    for attribute in entry.rdn_attributes() {
        if let Some(values) = logical.get(&attribute.name) {
            for value in values {
                if !out.is_empty() {
                    out.push('+');
                }
                out.push_str(&attribute.name.to_ascii_lowercase());
                out.push('=');
                out.push_str(&value.to_string().to_ascii_lowercase());
            }
        }
    }
    if out.is_empty() {
        out = logical.to_string();
    }
    out
}

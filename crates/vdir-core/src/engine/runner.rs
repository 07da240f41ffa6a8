//! Planned multi-source search execution.
//!
//! Starts at the plan's chosen source, searches it through its connector,
//! then walks the graph joining each newly visited in-entry source into
//! the running row set. Join keys are pushed down dynamically: the values
//! accumulated so far become an OR-filter for the next source.

use super::join;
use super::planner::SearchPlan;
use crate::connector::ConnectorRegistry;
use crate::error::Error;
use crate::graph::Graph;
use crate::lock::SourceLocks;
use crate::mapping::{EntryMapping, Relationship};
use crate::record::AttributeValues;
use std::collections::BTreeSet;
use tracing::debug;
use vdir_proto::{append_and, Filter, ResultCode};

/// The joined row set of one planned search.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Joined rows, keyed `alias.field`.
    pub rows: Vec<AttributeValues>,
    /// First non-success backend code, or success.
    pub code: ResultCode,
}

/// Executes a [`SearchPlan`] against the backend connectors.
pub struct SearchRunner<'a> {
    entry: &'a EntryMapping,
    graph: &'a Graph,
    plan: &'a SearchPlan,
    connectors: &'a ConnectorRegistry,
    locks: &'a SourceLocks,
}

impl<'a> SearchRunner<'a> {
    /// Create a runner over one plan.
    pub fn new(
        entry: &'a EntryMapping,
        graph: &'a Graph,
        plan: &'a SearchPlan,
        connectors: &'a ConnectorRegistry,
        locks: &'a SourceLocks,
    ) -> Self {
        Self {
            entry,
            graph,
            plan,
            connectors,
            locks,
        }
    }

    /// Run the search starting from `start` (normally
    /// [`SearchPlan::best_start`]).
    pub fn run(&self, start: &str) -> Result<SearchOutcome, Error> {
        let mut outcome = SearchOutcome::default();
        let mut visited = BTreeSet::new();
        self.visit(start, None, None, &mut visited, &mut outcome)?;
        Ok(outcome)
    }

    /// Visit one source: search it, fold its rows into the running set,
    /// then descend to unvisited in-entry neighbors.
    ///
    /// `arrival` holds the relationships of the edge used to reach this
    /// source, absent only at the start.
    fn visit(
        &self,
        alias: &str,
        join_key: Option<Filter>,
        arrival: Option<&[Relationship]>,
        visited: &mut BTreeSet<String>,
        outcome: &mut SearchOutcome,
    ) -> Result<(), Error> {
        visited.insert(alias.to_string());

        let source = self
            .graph
            .node(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;

        let mut filter = self.plan.filter(alias).cloned();
        filter = append_and(filter, join_key);
        if let Some(static_filter) = &source.filter {
            filter = append_and(filter, Some(static_filter.clone()));
        }

        let response = {
            let _guard = self.locks.read(&source.source)?;
            let connector = self.connectors.get(&source.source)?;
            connector.search(&source.source, filter.as_ref())
        };
        debug!(
            alias,
            source = %source.source,
            rows = response.rows.len(),
            code = %response.code,
            "searched source"
        );
        if !response.code.is_success() {
            // First failure wins; this branch stops here.
            outcome.code = outcome.code.and(response.code);
            return Ok(());
        }

        let mut wrapped = Vec::with_capacity(response.rows.len());
        for row in &response.rows {
            let mut av = AttributeValues::new();
            av.add_prefixed(alias, row);
            wrapped.push(av);
        }

        if arrival.is_none() {
            outcome.rows = wrapped;
        } else if source.required {
            outcome.rows = join::join(&outcome.rows, &wrapped, arrival.unwrap_or(&[]));
        } else {
            outcome.rows = join::left_join(&outcome.rows, &wrapped, arrival.unwrap_or(&[]));
        }

        for edge in self.graph.edges_from(alias) {
            let Some(neighbor) = edge.other(alias) else {
                continue;
            };
            if visited.contains(neighbor) || !self.entry.declares(neighbor) {
                continue;
            }
            if outcome.rows.is_empty() {
                // Nothing left to join against.
                break;
            }
            let key = join::join_filter(&outcome.rows, &edge.relationships, neighbor);
            let neighbor = neighbor.to_string();
            let relationships = edge.relationships.clone();
            // A failed child branch stops there; sibling edges still run.
            self.visit(&neighbor, key, Some(&relationships), visited, outcome)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;
    use crate::interp::ExprInterpreter;
    use crate::mapping::{AttributeMapping, FieldMapping, Relationship, SourceMapping};
    use std::sync::Arc;
    use vdir_proto::Value;

    fn entry() -> EntryMapping {
        EntryMapping::new("ou=people,dc=example,dc=com")
            .with_attribute(AttributeMapping::variable("uid", "users.name").naming())
            .with_attribute(AttributeMapping::variable("mail", "emails.addr"))
            .with_source(
                SourceMapping::new("users", "db_users")
                    .with_field(FieldMapping::variable("id", "uidNumber").primary())
                    .with_field(FieldMapping::variable("name", "uid")),
            )
            .with_source(
                SourceMapping::new("emails", "db_emails")
                    .with_field(FieldMapping::variable("uid", "uidNumber").primary())
                    .with_field(FieldMapping::variable("addr", "mail"))
                    .optional(),
            )
            .with_relationship(Relationship::parse_eq("users.id", "emails.uid").unwrap())
    }

    fn row(entries: &[(&str, Value)]) -> AttributeValues {
        let mut av = AttributeValues::new();
        for (name, value) in entries {
            av.add_value(*name, value.clone());
        }
        av
    }

    fn backends() -> ConnectorRegistry {
        let conn = Arc::new(MemoryConnector::new());
        conn.insert(
            "db_users",
            row(&[("id", Value::Int(1)), ("name", Value::from("alice"))]),
        );
        conn.insert(
            "db_users",
            row(&[("id", Value::Int(2)), ("name", Value::from("bob"))]),
        );
        conn.insert(
            "db_emails",
            row(&[("uid", Value::Int(1)), ("addr", Value::from("a@x"))]),
        );

        let registry = ConnectorRegistry::new();
        registry.register("db_users", conn.clone());
        registry.register("db_emails", conn);
        registry
    }

    fn run(filter: Option<&Filter>) -> SearchOutcome {
        let entry = entry();
        let graph = Graph::build(&entry, &[]).unwrap();
        let plan = SearchPlan::build(
            &entry,
            &graph,
            "users",
            filter,
            &AttributeValues::new(),
            &ExprInterpreter,
        )
        .unwrap();
        let connectors = backends();
        let locks = SourceLocks::new();
        let runner = SearchRunner::new(&entry, &graph, &plan, &connectors, &locks);
        runner.run(plan.best_start()).unwrap()
    }

    #[test]
    fn left_join_keeps_users_without_email() {
        let outcome = run(Some(&Filter::present("uid")));
        assert!(outcome.code.is_success());
        assert_eq!(outcome.rows.len(), 2);

        let alice = outcome
            .rows
            .iter()
            .find(|r| r.first("users.name") == Some(&Value::from("alice")))
            .unwrap();
        assert_eq!(alice.first("emails.addr"), Some(&Value::from("a@x")));

        let bob = outcome
            .rows
            .iter()
            .find(|r| r.first("users.name") == Some(&Value::from("bob")))
            .unwrap();
        assert!(bob.get("emails.addr").is_none());
    }

    #[test]
    fn filter_narrows_start_source() {
        let outcome = run(Some(&Filter::eq("uid", "bob")));
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(
            outcome.rows[0].first("users.id"),
            Some(&Value::Int(2))
        );
    }

    #[test]
    fn required_source_turns_join_inner() {
        let mut entry = entry();
        entry.sources[1].required = true;
        let graph = Graph::build(&entry, &[]).unwrap();
        let plan = SearchPlan::build(
            &entry,
            &graph,
            "users",
            None,
            &AttributeValues::new(),
            &ExprInterpreter,
        )
        .unwrap();
        let connectors = backends();
        let locks = SourceLocks::new();
        let runner = SearchRunner::new(&entry, &graph, &plan, &connectors, &locks);
        let outcome = runner.run("users").unwrap();

        // bob has no email row and is dropped by the inner join.
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(
            outcome.rows[0].first("users.name"),
            Some(&Value::from("alice"))
        );
    }

    #[test]
    fn backend_failure_surfaces_as_code() {
        let entry = entry();
        let graph = Graph::build(&entry, &[]).unwrap();
        let plan = SearchPlan::build(
            &entry,
            &graph,
            "users",
            None,
            &AttributeValues::new(),
            &ExprInterpreter,
        )
        .unwrap();
        // The connector has no db_emails table, so that search fails.
        let conn = Arc::new(MemoryConnector::new());
        conn.insert("db_users", row(&[("id", Value::Int(1))]));
        let connectors = ConnectorRegistry::new();
        connectors.register("db_users", conn.clone());
        connectors.register("db_emails", conn);
        let locks = SourceLocks::new();

        let runner = SearchRunner::new(&entry, &graph, &plan, &connectors, &locks);
        let outcome = runner.run("users").unwrap();
        assert_eq!(outcome.code, ResultCode::OperationsError);
    }

    #[test]
    fn failed_branch_leaves_sibling_edges_running() {
        let entry = entry()
            .with_source(
                SourceMapping::new("phones", "db_phones")
                    .with_field(FieldMapping::variable("uid", "uidNumber").primary())
                    .with_field(FieldMapping::variable("num", "phone"))
                    .optional(),
            )
            .with_relationship(Relationship::parse_eq("users.id", "phones.uid").unwrap());
        let graph = Graph::build(&entry, &[]).unwrap();
        let plan = SearchPlan::build(
            &entry,
            &graph,
            "users",
            None,
            &AttributeValues::new(),
            &ExprInterpreter,
        )
        .unwrap();

        let connectors = backends();
        // The emails branch fails (no db_emails table on this connector);
        // the phones branch must still be searched and joined.
        connectors.register("db_emails", Arc::new(MemoryConnector::new()));
        let phones = Arc::new(MemoryConnector::new());
        phones.insert(
            "db_phones",
            row(&[("uid", Value::Int(1)), ("num", Value::from("555-0101"))]),
        );
        connectors.register("db_phones", phones);
        let locks = SourceLocks::new();

        let runner = SearchRunner::new(&entry, &graph, &plan, &connectors, &locks);
        let outcome = runner.run("users").unwrap();
        assert_eq!(outcome.code, ResultCode::OperationsError);

        let alice = outcome
            .rows
            .iter()
            .find(|r| r.first("users.id") == Some(&Value::Int(1)))
            .unwrap();
        assert_eq!(alice.first("phones.num"), Some(&Value::from("555-0101")));
    }

    #[test]
    fn static_filter_is_always_applied() {
        let mut entry = entry();
        entry.sources[0].filter = Some(Filter::eq("name", "alice"));
        let graph = Graph::build(&entry, &[]).unwrap();
        let plan = SearchPlan::build(
            &entry,
            &graph,
            "users",
            None,
            &AttributeValues::new(),
            &ExprInterpreter,
        )
        .unwrap();
        let connectors = backends();
        let locks = SourceLocks::new();
        let runner = SearchRunner::new(&entry, &graph, &plan, &connectors, &locks);
        let outcome = runner.run("users").unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(
            outcome.rows[0].first("users.name"),
            Some(&Value::from("alice"))
        );
    }
}

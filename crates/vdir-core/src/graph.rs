//! The per-entry relationship graph.
//!
//! Nodes are the source aliases an entry uses, including aliases inherited
//! from ancestor entries; edges carry the relationship set joining two
//! aliases. The graph is undirected and built once per entry mapping, then
//! cached; every visitor walks it read-only.

use crate::error::Error;
use crate::mapping::{EntryMapping, Relationship, SourceMapping};

/// An undirected edge between two source aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    /// One endpoint alias.
    pub left: String,
    /// The other endpoint alias.
    pub right: String,
    /// Every relationship declared between the two aliases.
    pub relationships: Vec<Relationship>,
}

impl GraphEdge {
    /// The opposite endpoint, if `alias` is one of the two.
    pub fn other(&self, alias: &str) -> Option<&str> {
        if self.left == alias {
            Some(&self.right)
        } else if self.right == alias {
            Some(&self.left)
        } else {
            None
        }
    }

    fn connects(&self, a: &str, b: &str) -> bool {
        (self.left == a && self.right == b) || (self.left == b && self.right == a)
    }
}

/// The relationship graph for one entry mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<SourceMapping>,
    edges: Vec<GraphEdge>,
}

impl Graph {
    /// Build the graph for an entry.
    ///
    /// `inherited` carries the effective source mappings contributed by
    /// ancestor entries; relationships may reference them. A relationship
    /// naming an alias that is neither declared nor inherited is a
    /// configuration error.
    pub fn build(entry: &EntryMapping, inherited: &[SourceMapping]) -> Result<Self, Error> {
        let mut nodes: Vec<SourceMapping> = entry.sources.clone();
        for source in inherited {
            if !nodes.iter().any(|n| n.alias == source.alias) {
                nodes.push(source.clone());
            }
        }

        let mut edges: Vec<GraphEdge> = Vec::new();
        for relationship in &entry.relationships {
            let lhs = &relationship.lhs.alias;
            let rhs = &relationship.rhs.alias;

            for alias in [lhs, rhs] {
                if !nodes.iter().any(|n| &n.alias == alias) {
                    return Err(Error::UnknownAlias(alias.clone()));
                }
            }

            match edges.iter_mut().find(|e| e.connects(lhs, rhs)) {
                Some(edge) => edge.relationships.push(relationship.clone()),
                None => edges.push(GraphEdge {
                    left: lhs.clone(),
                    right: rhs.clone(),
                    relationships: vec![relationship.clone()],
                }),
            }
        }

        Ok(Self { nodes, edges })
    }

    /// Get a node by alias.
    pub fn node(&self, alias: &str) -> Option<&SourceMapping> {
        self.nodes.iter().find(|n| n.alias == alias)
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &SourceMapping> {
        self.nodes.iter()
    }

    /// Iterate over the edges incident to an alias.
    pub fn edges_from<'a>(&'a self, alias: &'a str) -> impl Iterator<Item = &'a GraphEdge> {
        self.edges
            .iter()
            .filter(move |e| e.left == alias || e.right == alias)
    }

    /// Iterate over all edges.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter()
    }
}

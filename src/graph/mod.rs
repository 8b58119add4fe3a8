//! Schema Graph
//!
//! Accepted node types plus one directed edge per resolved reference field,
//! stored in a petgraph `DiGraph` with `BTreeMap` indexes so every listing is
//! in canonical order. Built once by [`GraphBuilder`], immutable afterwards.
//!
//! Consumers (codegen, validation) must check the accompanying
//! [`Diagnostics`] before trusting completeness: unresolved references are
//! kept on the field but have no edge.

pub mod analysis;
pub mod builder;
pub mod diagnostics;
pub mod loader;

pub use analysis::{compute_cycle_groups, CycleGroup};
pub use builder::GraphBuilder;
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use loader::{load_declarations, LoadConfig, LoadedDeclarations};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use crate::decl::{Cardinality, TypeRef};
use crate::error::Result;

// =============================================================================
// Node Types
// =============================================================================

/// Role of a field in the datamodel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum FieldRole {
    /// The inherited identifier; exactly one per node type
    Identifier,
    Plain,
    Reference {
        /// Target as written in the declaration
        target: String,
        /// Qualified name it resolved to, once the graph is built
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolved: Option<String>,
    },
}

impl FieldRole {
    /// Unresolved reference to `target`
    pub fn reference(target: impl Into<String>) -> Self {
        Self::Reference {
            target: target.into(),
            resolved: None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference { .. })
    }
}

/// Field metadata extracted from a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(flatten)]
    pub role: FieldRole,
    pub cardinality: Cardinality,
    /// Embedded type this field was promoted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_from: Option<String>,
    /// Package of the declaring type; reference targets resolve relative to it
    #[serde(skip)]
    pub declaring_package: String,
}

/// An accepted datamodel node type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub qualified_name: String,
    pub package: String,
    pub name: String,
    /// Declaring source location
    pub location: PathBuf,
    /// Embedding hops to `Node`
    pub depth: usize,
    /// Embedding path to the identifier field
    pub identity_path: String,
    /// Identifier first, then declared and promoted fields
    pub fields: Vec<FieldMetadata>,
    /// Graph node index for fast lookup
    #[serde(skip)]
    pub node_idx: Option<NodeIndex>,
}

impl NodeType {
    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identifier(&self) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.role == FieldRole::Identifier)
    }

    pub fn references(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.iter().filter(|f| f.role.is_reference())
    }
}

/// Edge weight: the field carrying the reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub field: String,
    pub cardinality: Cardinality,
}

/// Flattened edge listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub field: String,
    pub target: String,
    pub cardinality: Cardinality,
}

/// Node in a closure result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureNode {
    pub name: String,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub in_cycle: bool,
}

/// Search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub qualified_name: String,
    pub location: PathBuf,
    pub score: i64,
}

#[derive(Serialize)]
struct GraphDocument<'a> {
    nodes: Vec<&'a NodeType>,
    edges: Vec<EdgeRecord>,
    cycles: &'a [CycleGroup],
}

// =============================================================================
// Schema Graph
// =============================================================================

/// The schema graph of accepted node types
#[derive(Debug)]
pub struct SchemaGraph {
    /// Reference edges between node types, cycles allowed
    pub(crate) graph: DiGraph<String, ReferenceEdge>,

    /// Node types indexed by qualified name
    pub(crate) nodes: BTreeMap<String, NodeType>,

    /// Node index lookup: qualified name -> NodeIndex
    pub(crate) node_indices: HashMap<String, NodeIndex>,

    /// Index: simple name -> qualified names (names can collide across packages)
    pub(crate) by_name: HashMap<String, Vec<String>>,

    /// Strongly connected reference groups
    pub(crate) cycle_groups: Vec<CycleGroup>,
}

impl SchemaGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.nodes.contains_key(qualified_name)
    }

    pub fn get(&self, qualified_name: &str) -> Option<&NodeType> {
        self.nodes.get(qualified_name)
    }

    /// All node types, ordered by qualified name
    pub fn node_types(&self) -> impl Iterator<Item = &NodeType> {
        self.nodes.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Resolve a query (qualified or simple name) to a qualified name
    pub fn resolve(&self, query: &str) -> Option<&str> {
        if let Some((name, _)) = self.nodes.get_key_value(query) {
            return Some(name);
        }

        if let Some(names) = self.by_name.get(query) {
            return names.first().map(String::as_str);
        }

        let query_lower = query.to_lowercase();
        self.nodes
            .keys()
            .find(|name| {
                name.to_lowercase() == query_lower
                    || name.rsplit('.').next().map(str::to_lowercase) == Some(query_lower.clone())
            })
            .map(String::as_str)
    }

    /// Every edge, in canonical order
    pub fn edges(&self) -> Vec<EdgeRecord> {
        let mut edges: Vec<EdgeRecord> = self
            .graph
            .edge_references()
            .filter_map(|e| {
                Some(EdgeRecord {
                    source: self.graph.node_weight(e.source())?.clone(),
                    field: e.weight().field.clone(),
                    target: self.graph.node_weight(e.target())?.clone(),
                    cardinality: e.weight().cardinality,
                })
            })
            .collect();
        edges.sort();
        edges
    }

    /// Types referenced by `qualified_name`
    pub fn refs_out(&self, qualified_name: &str) -> Vec<&str> {
        self.neighbors(qualified_name, Direction::Outgoing)
    }

    /// Types referencing `qualified_name`
    pub fn refs_in(&self, qualified_name: &str) -> Vec<&str> {
        self.neighbors(qualified_name, Direction::Incoming)
    }

    fn neighbors(&self, qualified_name: &str, direction: Direction) -> Vec<&str> {
        let Some(&node_idx) = self.node_indices.get(qualified_name) else {
            return Vec::new();
        };

        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(node_idx, direction)
            .filter_map(|idx| self.graph.node_weight(idx).map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Transitive closure (dependencies or dependents), breadth-first so
    /// each node reports its shortest distance.
    pub fn closure(
        &self,
        qualified_name: &str,
        direction: Direction,
        max_depth: Option<usize>,
    ) -> Vec<ClosureNode> {
        let Some(&start_idx) = self.node_indices.get(qualified_name) else {
            return Vec::new();
        };

        let in_cycle: HashSet<&str> = self
            .cycle_groups
            .iter()
            .flat_map(|g| g.members.iter().map(String::as_str))
            .collect();

        let mut result = Vec::new();
        let mut visited = HashSet::from([start_idx]);
        let mut queue = VecDeque::from([(start_idx, 0usize)]);

        while let Some((node_idx, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for next in self.graph.neighbors_directed(node_idx, direction) {
                if !visited.insert(next) {
                    continue;
                }
                if let Some(name) = self.graph.node_weight(next) {
                    result.push(ClosureNode {
                        name: name.clone(),
                        depth: depth + 1,
                        in_cycle: in_cycle.contains(name.as_str()),
                    });
                }
                queue.push_back((next, depth + 1));
            }
        }

        result.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.name.cmp(&b.name)));
        result
    }

    /// Reference cycles, including self references
    pub fn cycle_groups(&self) -> &[CycleGroup] {
        &self.cycle_groups
    }

    pub fn is_cyclic(&self, qualified_name: &str) -> bool {
        self.cycle_groups
            .iter()
            .any(|g| g.members.iter().any(|m| m == qualified_name))
    }

    /// Search node types by name (fuzzy)
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let mut results: Vec<(i64, &NodeType)> = self
            .nodes
            .values()
            .filter_map(|node| {
                matcher
                    .fuzzy_match(&node.qualified_name, query)
                    .map(|score| (score, node))
            })
            .collect();

        // Score descending, name ascending on ties
        results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.qualified_name.cmp(&b.1.qualified_name)));

        results
            .into_iter()
            .take(limit)
            .map(|(score, node)| SearchResult {
                qualified_name: node.qualified_name.clone(),
                location: node.location.clone(),
                score,
            })
            .collect()
    }

    /// Canonical JSON form: nodes and edges in sorted order
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.document())?)
    }

    /// SHA-256 over the canonical JSON form. Equal graphs hash equally.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.document())?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    fn document(&self) -> GraphDocument<'_> {
        GraphDocument {
            nodes: self.nodes.values().collect(),
            edges: self.edges(),
            cycles: &self.cycle_groups,
        }
    }

    /// Export the graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph SchemaGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n");
        output.push('\n');

        for (name, node) in &self.nodes {
            let style = if self.is_cyclic(name) { ", color=\"#F44336\"" } else { "" };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{}\"{}];\n",
                dot_escape(name),
                dot_escape(&node.name),
                dot_escape(&node.package),
                style
            ));
        }

        output.push('\n');

        for edge in self.edges() {
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                dot_escape(&edge.source),
                dot_escape(&edge.target),
                dot_escape(&edge.field)
            ));
        }

        output.push_str("}\n");
        output
    }
}

/// Quoted DOT ids and labels: qualified names are used as-is
fn dot_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

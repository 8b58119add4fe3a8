//! Reference Cycle Analysis
//!
//! Strongly connected components of the reference graph. Cycles between node
//! types are legal (a parent referencing its children and back); they are
//! reported so generators know which types need indirection.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use super::ReferenceEdge;

/// A group of mutually referencing node types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleGroup {
    pub id: usize,
    /// Qualified names, sorted
    pub members: Vec<String>,
    /// Single type referencing itself
    pub is_self_referential: bool,
}

/// Compute cycle groups, ordered by their first member
pub fn compute_cycle_groups(graph: &DiGraph<String, ReferenceEdge>) -> Vec<CycleGroup> {
    let mut groups: Vec<(Vec<String>, bool)> = Vec::new();

    for scc in kosaraju_scc(graph) {
        if let [node_idx] = scc.as_slice() {
            let node_idx = *node_idx;
            let has_self_ref = graph
                .edges_directed(node_idx, Direction::Outgoing)
                .any(|e| e.target() == node_idx);

            if has_self_ref {
                if let Some(name) = graph.node_weight(node_idx) {
                    groups.push((vec![name.clone()], true));
                }
            }
        } else {
            let mut members: Vec<String> = scc
                .iter()
                .filter_map(|idx| graph.node_weight(*idx).cloned())
                .collect();
            members.sort();
            groups.push((members, false));
        }
    }

    groups.sort();
    groups
        .into_iter()
        .enumerate()
        .map(|(id, (members, is_self_referential))| CycleGroup {
            id,
            members,
            is_self_referential,
        })
        .collect()
}

//! Graph Builder
//!
//! Collects extracted node types, then resolves reference fields against the
//! accepted set and materializes one edge per resolved field.

use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use super::{compute_cycle_groups, Diagnostics, FieldRole, NodeType, ReferenceEdge, SchemaGraph};
use crate::decl::resolve_among;
use crate::error::{CompileError, Result};

#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<String, NodeType>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails on a second node type with the same qualified name
    pub fn add_node(&mut self, node: NodeType) -> Result<()> {
        use std::collections::btree_map::Entry;

        match self.nodes.entry(node.qualified_name.clone()) {
            Entry::Occupied(existing) => Err(CompileError::DuplicateNodeType(existing.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
        }
    }

    /// Resolve references and build the graph. Unresolved targets stay on
    /// the field with no edge and are reported.
    pub fn build(self, diagnostics: &mut Diagnostics) -> SchemaGraph {
        let mut nodes = self.nodes;
        let names: BTreeSet<String> = nodes.keys().cloned().collect();

        let mut graph = DiGraph::with_capacity(nodes.len(), nodes.len() * 2);
        let mut node_indices = HashMap::with_capacity(nodes.len());
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();

        for (qualified, node) in nodes.iter_mut() {
            let idx = graph.add_node(qualified.clone());
            node.node_idx = Some(idx);
            node_indices.insert(qualified.clone(), idx);
            by_name.entry(node.name.clone()).or_default().push(qualified.clone());
        }

        let mut pending = Vec::new();
        for (qualified, node) in nodes.iter_mut() {
            for field in &mut node.fields {
                let FieldRole::Reference { target, resolved } = &mut field.role else {
                    continue;
                };
                // Promoted fields resolve relative to the type that declared them
                match resolve_among(&names, &field.declaring_package, target) {
                    Some(found) => {
                        *resolved = Some(found.to_string());
                        pending.push((
                            qualified.clone(),
                            found.to_string(),
                            ReferenceEdge {
                                field: field.name.clone(),
                                cardinality: field.cardinality,
                            },
                        ));
                    }
                    None => diagnostics.unresolved_reference(qualified, &field.name, target),
                }
            }
        }

        for (source, target, edge) in pending {
            if let (Some(&from), Some(&to)) = (node_indices.get(&source), node_indices.get(&target)) {
                debug!(%source, %target, field = %edge.field, "reference edge");
                graph.add_edge(from, to, edge);
            }
        }

        let cycle_groups = compute_cycle_groups(&graph);

        info!(
            nodes = nodes.len(),
            edges = graph.edge_count(),
            cycles = cycle_groups.len(),
            "schema graph built"
        );

        SchemaGraph {
            graph,
            nodes,
            node_indices,
            by_name,
            cycle_groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{Cardinality, TypeRef};
    use crate::graph::{DiagnosticCode, FieldMetadata};
    use std::path::PathBuf;

    fn node(package: &str, name: &str, refs: &[(&str, &str)]) -> NodeType {
        let mut fields = vec![FieldMetadata {
            name: "ID".into(),
            ty: TypeRef::named("String"),
            role: FieldRole::Identifier,
            cardinality: Cardinality::One,
            promoted_from: Some("datamodel.ID".into()),
            declaring_package: "datamodel".into(),
        }];
        for (field, target) in refs {
            fields.push(FieldMetadata {
                name: field.to_string(),
                ty: TypeRef::named(*target),
                role: FieldRole::reference(*target),
                cardinality: Cardinality::One,
                promoted_from: None,
                declaring_package: package.into(),
            });
        }
        NodeType {
            qualified_name: crate::decl::qualify(package, name),
            package: package.into(),
            name: name.into(),
            location: PathBuf::from("model.go"),
            depth: 1,
            identity_path: format!("{}.Node.ID.ID", name),
            fields,
            node_idx: None,
        }
    }

    #[test]
    fn test_duplicate_node_type_is_fatal() {
        let mut builder = GraphBuilder::new();
        builder.add_node(node("shop", "Widget", &[])).unwrap();
        let err = builder.add_node(node("shop", "Widget", &[])).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateNodeType(name) if name == "shop.Widget"));
    }

    #[test]
    fn test_resolved_and_unresolved_references() {
        let mut builder = GraphBuilder::new();
        builder.add_node(node("shop", "Order", &[("Buyer", "Customer"), ("Coupon", "Coupon")])).unwrap();
        builder.add_node(node("shop", "Customer", &[])).unwrap();

        let mut diags = Diagnostics::new();
        let graph = builder.build(&mut diags);

        assert_eq!(graph.edge_count(), 1);
        let order = graph.get("shop.Order").unwrap();
        assert_eq!(
            order.field("Buyer").unwrap().role,
            FieldRole::Reference {
                target: "Customer".into(),
                resolved: Some("shop.Customer".into()),
            }
        );
        assert_eq!(order.field("Coupon").unwrap().role, FieldRole::reference("Coupon"));

        let item = diags.with_code(DiagnosticCode::UnresolvedReference).next().unwrap();
        assert_eq!(item.type_name, "shop.Order");
        assert!(item.message.contains("shop.Order.Coupon → Coupon"));
    }

    #[test]
    fn test_promoted_reference_resolves_in_declaring_package() {
        let mut order = node("shop", "Order", &[]);
        order.fields.push(FieldMetadata {
            name: "Owner".into(),
            ty: TypeRef::named("String"),
            role: FieldRole::reference("Customer"),
            cardinality: Cardinality::One,
            promoted_from: Some("Audit".into()),
            declaring_package: String::new(),
        });

        let mut builder = GraphBuilder::new();
        builder.add_node(order).unwrap();
        builder.add_node(node("shop", "Customer", &[])).unwrap();
        builder.add_node(node("crm", "Customer", &[])).unwrap();

        let mut diags = Diagnostics::new();
        let graph = builder.build(&mut diags);

        // Written in the unpackaged `Audit`, so `Customer` does not mean shop.Customer
        assert_eq!(graph.get("shop.Order").unwrap().field("Owner").unwrap().role, FieldRole::reference("Customer"));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(diags.with_code(DiagnosticCode::UnresolvedReference).count(), 1);
    }

    #[test]
    fn test_node_indices_assigned() {
        let mut builder = GraphBuilder::new();
        builder.add_node(node("", "A", &[("Next", "A")])).unwrap();
        let graph = builder.build(&mut Diagnostics::new());

        assert!(graph.get("A").unwrap().node_idx.is_some());
        assert!(graph.is_cyclic("A"));
    }
}

//! Field Extraction
//!
//! Turns an accepted candidate into a [`NodeType`]: the inherited identifier
//! first, then the type's own fields, then fields promoted from embedded
//! types (breadth-first, so a shallower field shadows a deeper one of the
//! same name).

use std::collections::{BTreeSet, HashSet};

use crate::decl::{resolve_among, FieldDecl, TypeDecl, TypeIndex};
use crate::graph::{Diagnostics, FieldMetadata, FieldRole, NodeType};
use crate::identity::is_builtin;
use crate::scanner::Candidate;
use crate::tag::RoleHint;

pub struct FieldExtractor<'i, 'a> {
    index: &'i TypeIndex<'a>,
    /// Shape-eligible node types, including location-excluded ones
    node_types: &'i BTreeSet<String>,
}

impl<'i, 'a> FieldExtractor<'i, 'a> {
    pub fn new(index: &'i TypeIndex<'a>, node_types: &'i BTreeSet<String>) -> Self {
        Self { index, node_types }
    }

    /// Malformed tags are reported against the declaring type and the field
    /// falls back to untagged classification.
    pub fn extract(&self, candidate: &Candidate<'a>, diagnostics: &mut Diagnostics) -> NodeType {
        let identity = &candidate.identity;
        let mut fields = vec![FieldMetadata {
            name: identity.field.clone(),
            cardinality: identity.ty.cardinality(),
            ty: identity.ty.clone(),
            role: FieldRole::Identifier,
            promoted_from: (identity.declaring_type != candidate.qualified_name)
                .then(|| identity.declaring_type.clone()),
            declaring_package: identity.declaring_package.clone(),
        }];

        let mut seen: HashSet<String> = HashSet::from([identity.field.clone()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut level: Vec<&'a TypeDecl> = vec![candidate.decl];

        while !level.is_empty() {
            let mut next = Vec::new();
            for decl in level {
                let declaring = decl.qualified_name();
                // Builtins contribute only the identifier, emitted above
                if !visited.insert(declaring.clone()) || is_builtin(&declaring) {
                    continue;
                }

                for field in &decl.fields {
                    if declaring == identity.declaring_type && field.name == identity.field {
                        continue;
                    }
                    if field.name == identity.field {
                        diagnostics.shadowed_identifier(
                            &candidate.qualified_name,
                            &format!("{}.{}", declaring, field.name),
                            &identity.path,
                        );
                        continue;
                    }
                    if !seen.insert(field.name.clone()) {
                        continue;
                    }
                    let role = self.classify(decl, &declaring, field, diagnostics);
                    fields.push(FieldMetadata {
                        name: field.name.clone(),
                        ty: field.ty.clone(),
                        cardinality: field.ty.cardinality(),
                        role,
                        promoted_from: (declaring != candidate.qualified_name)
                            .then(|| declaring.clone()),
                        declaring_package: decl.package.clone(),
                    });
                }

                next.extend(
                    decl.embeds
                        .iter()
                        .filter_map(|embed| self.index.resolve(&decl.package, embed)),
                );
            }
            level = next;
        }

        NodeType {
            qualified_name: candidate.qualified_name.clone(),
            package: candidate.decl.package.clone(),
            name: candidate.decl.name.clone(),
            location: candidate.decl.location.clone(),
            depth: candidate.depth,
            identity_path: identity.path.clone(),
            fields,
            node_idx: None,
        }
    }

    fn classify(
        &self,
        decl: &TypeDecl,
        declaring: &str,
        field: &FieldDecl,
        diagnostics: &mut Diagnostics,
    ) -> FieldRole {
        let hint = match field.declared_role() {
            Ok(hint) => hint,
            Err(error) => {
                diagnostics.malformed_tag(declaring, &field.name, &error);
                None
            }
        };

        match hint {
            Some(RoleHint::Plain) => FieldRole::Plain,
            Some(RoleHint::Reference(Some(target))) => FieldRole::reference(target),
            Some(RoleHint::Reference(None)) => FieldRole::reference(field.ty.element()),
            // The scanner rejects any type with a second identifier, so an
            // identifier hint here is the inherited one, skipped by the caller.
            Some(RoleHint::Identifier) | None => {
                let element = field.ty.element();
                if resolve_among(self.node_types, &decl.package, element).is_some() {
                    FieldRole::reference(element)
                } else {
                    FieldRole::Plain
                }
            }
        }
    }
}

//! Type Scanner
//!
//! Walks every user declaration's embedding tree looking for the builtin
//! `Node` shape. A declaration that reaches it is shape-eligible; it becomes a
//! candidate unless its location is excluded.
//!
//! Per declaration the walk records:
//! - the shortest embedding distance to `Node`
//! - every identifier field reachable, keyed by (declaring type, field)
//! - embedding cycles and embedding deeper than the configured bound
//!
//! Two paths into the same identifier field unify (diamond embedding). Two
//! distinct identifier fields are a conflict and reject the declaration.
//!
//! Cycles are found once up front as strongly connected components of the
//! embedding graph. Everything else is summarized per embedded type and
//! memoized, so shared sub-trees are visited once per pass.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};

use crate::decl::{Lookup, TypeDecl, TypeIndex, TypeRef};
use crate::graph::Diagnostics;
use crate::identity::{node_qualified_name, BUILTIN_PACKAGE};
use crate::location::LocationFilter;

/// Default bound on embedding hops followed from a declaration
pub const DEFAULT_MAX_EMBEDDING_DEPTH: usize = 16;

/// The identifier field a node type inherits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityOrigin {
    /// Qualified name of the type declaring the field
    pub declaring_type: String,
    pub declaring_package: String,
    pub field: String,
    pub ty: TypeRef,
    /// Embedding path used to reach it, e.g. `Widget.Node.ID.ID`
    pub path: String,
}

/// A declaration accepted as a node type
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub decl: &'a TypeDecl,
    pub qualified_name: String,
    /// Embedding hops to `Node`
    pub depth: usize,
    pub identity: IdentityOrigin,
}

#[derive(Debug)]
pub struct ScanOutcome<'a> {
    /// Accepted candidates, in declaration order
    pub candidates: Vec<Candidate<'a>>,
    /// Shape-eligible types dropped by the location filter
    pub excluded: BTreeSet<String>,
    pub diagnostics: Diagnostics,
}

impl ScanOutcome<'_> {
    /// Every shape-eligible qualified name, accepted or excluded
    pub fn node_type_names(&self) -> BTreeSet<String> {
        self.candidates
            .iter()
            .map(|c| c.qualified_name.clone())
            .chain(self.excluded.iter().cloned())
            .collect()
    }
}

/// What one type's embedding tree contributes. Identity paths are relative
/// to the type itself, e.g. `Node.ID.ID` for a type embedding `Node`.
#[derive(Debug, Clone, Default)]
struct Summary {
    node_depth: Option<usize>,
    /// Longest embedding chain below the type
    height: usize,
    identities: BTreeMap<(String, String), Reached>,
    cycle: Option<String>,
}

/// An identifier field reached from some type
#[derive(Debug, Clone)]
struct Reached {
    package: String,
    ty: TypeRef,
    path: String,
}

impl Summary {
    fn absorb(&mut self, inner_name: &str, inner: &Summary) {
        if let Some(cycle) = &inner.cycle {
            if self.cycle.as_ref().map_or(true, |current| cycle < current) {
                self.cycle = Some(cycle.clone());
            }
        }
        self.height = self.height.max(inner.height + 1);
        if let Some(depth) = inner.node_depth {
            self.node_depth = Some(self.node_depth.map_or(depth + 1, |d| d.min(depth + 1)));
        }
        for (key, reached) in &inner.identities {
            self.identities.entry(key.clone()).or_insert_with(|| Reached {
                path: format!("{}.{}", inner_name, reached.path),
                ..reached.clone()
            });
        }
    }
}

/// Memoized embedding summaries for one index
struct Summaries<'s, 'a> {
    index: &'s TypeIndex<'a>,
    node_name: &'s str,
    /// Qualified name of every type on an embedding cycle, with a
    /// description of its cycle
    cyclic: HashMap<String, String>,
    memo: HashMap<String, Summary>,
}

impl<'s, 'a> Summaries<'s, 'a> {
    fn new(index: &'s TypeIndex<'a>, node_name: &'s str) -> Self {
        Self {
            index,
            node_name,
            cyclic: embedding_cycles(index),
            memo: HashMap::new(),
        }
    }

    /// Summary of `decl`'s own fields and embeds. Embedded types resolve to
    /// a unique declaration, so they are memoized by qualified name.
    fn summarize(&mut self, decl: &'a TypeDecl) -> Summary {
        let qualified = decl.qualified_name();
        if let Some(cycle) = self.cyclic.get(&qualified) {
            return Summary {
                cycle: Some(cycle.clone()),
                ..Summary::default()
            };
        }

        let mut summary = Summary::default();
        if qualified == self.node_name {
            summary.node_depth = Some(0);
        }
        for field in decl.fields.iter().filter(|f| f.is_identifier()) {
            summary
                .identities
                .entry((qualified.clone(), field.name.clone()))
                .or_insert_with(|| Reached {
                    package: decl.package.clone(),
                    ty: field.ty.clone(),
                    path: field.name.clone(),
                });
        }

        for embed in &decl.embeds {
            let Some(inner) = self.index.resolve(&decl.package, embed) else {
                continue;
            };
            let key = inner.qualified_name();
            if !self.memo.contains_key(&key) {
                let computed = self.summarize(inner);
                self.memo.insert(key.clone(), computed);
            }
            if let Some(computed) = self.memo.get(&key) {
                summary.absorb(&inner.name, computed);
            }
        }
        summary
    }
}

/// Types on an embedding cycle, found as strongly connected components of
/// the embedding graph over uniquely resolved embeds.
fn embedding_cycles(index: &TypeIndex<'_>) -> HashMap<String, String> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    let mut node = |graph: &mut DiGraph<String, ()>, name: String| {
        *nodes
            .entry(name.clone())
            .or_insert_with(|| graph.add_node(name))
    };

    for decl in index.decls() {
        let from = node(&mut graph, decl.qualified_name());
        for embed in &decl.embeds {
            if let Some(inner) = index.resolve(&decl.package, embed) {
                let to = node(&mut graph, inner.qualified_name());
                graph.update_edge(from, to, ());
            }
        }
    }

    let mut cyclic = HashMap::new();
    for scc in kosaraju_scc(&graph) {
        let looped = scc.len() > 1 || graph.contains_edge(scc[0], scc[0]);
        if !looped {
            continue;
        }
        let mut members: Vec<&str> = scc.iter().map(|&idx| graph[idx].as_str()).collect();
        members.sort_unstable();
        let description = format!("embedding cycle through {}", members.join(", "));
        for member in members {
            cyclic.insert(member.to_string(), description.clone());
        }
    }
    cyclic
}

pub struct TypeScanner<'f> {
    filter: &'f LocationFilter,
    max_depth: usize,
    node_name: String,
}

impl<'f> TypeScanner<'f> {
    pub fn new(filter: &'f LocationFilter) -> Self {
        Self {
            filter,
            max_depth: DEFAULT_MAX_EMBEDDING_DEPTH,
            node_name: node_qualified_name(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn scan<'a>(&self, decls: &'a [TypeDecl], index: &TypeIndex<'a>) -> ScanOutcome<'a> {
        let mut candidates = Vec::new();
        let mut excluded = BTreeSet::new();
        let mut diagnostics = Diagnostics::new();
        let mut summaries = Summaries::new(index, &self.node_name);

        for decl in decls {
            let qualified = decl.qualified_name();

            if decl.package == BUILTIN_PACKAGE {
                if !self.filter.is_excluded(&decl.location) {
                    diagnostics.reserved_package(&qualified, BUILTIN_PACKAGE);
                }
                continue;
            }

            let summary = summaries.summarize(decl);

            if let Some(rule) = self.filter.matching_rule(&decl.location) {
                if summary.node_depth.is_some() {
                    debug!(type_name = %qualified, location = %decl.location.display(), %rule, "excluded by location");
                    excluded.insert(qualified);
                }
                continue;
            }

            for embed in &decl.embeds {
                match index.lookup(&decl.package, embed) {
                    Lookup::Unique(_) => {}
                    Lookup::Missing => diagnostics.unknown_embed(&qualified, embed),
                    Lookup::Ambiguous { qualified: target, count } => {
                        diagnostics.ambiguous_embed(&qualified, embed, &target, count)
                    }
                }
            }

            if let Some(cycle) = summary.cycle {
                diagnostics.embedding_cycle(&qualified, cycle);
                continue;
            }
            if summary.height > self.max_depth {
                diagnostics.embedding_cycle(
                    &qualified,
                    format!("embedding deeper than {} levels", self.max_depth),
                );
                continue;
            }

            let Some(depth) = summary.node_depth else {
                trace!(type_name = %qualified, "does not embed Node");
                continue;
            };

            let mut identities = summary
                .identities
                .into_iter()
                .map(|((declaring_type, field), reached)| IdentityOrigin {
                    declaring_type,
                    declaring_package: reached.package,
                    field,
                    ty: reached.ty,
                    path: format!("{}.{}", decl.name, reached.path),
                });
            let identity = match (identities.next(), identities.next()) {
                (Some(only), None) => only,
                (Some(first), Some(second)) => {
                    diagnostics.conflicting_identity(&qualified, &first.path, &second.path);
                    continue;
                }
                // Node always carries the builtin identifier
                (None, _) => continue,
            };

            debug!(type_name = %qualified, depth, identity = %identity.path, "node type candidate");
            candidates.push(Candidate {
                decl,
                qualified_name: qualified,
                depth,
                identity,
            });
        }

        ScanOutcome {
            candidates,
            excluded,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::FieldDecl;
    use crate::graph::DiagnosticCode;
    use crate::identity::NODE_TYPE;

    fn scan(decls: &[TypeDecl], filter: &LocationFilter) -> (Vec<String>, BTreeSet<String>, Diagnostics) {
        let index = TypeIndex::new(decls);
        let outcome = TypeScanner::new(filter).scan(decls, &index);
        let names = outcome.candidates.iter().map(|c| c.qualified_name.clone()).collect();
        (names, outcome.excluded, outcome.diagnostics)
    }

    #[test]
    fn test_direct_and_transitive_embedding() {
        let decls = vec![
            TypeDecl::new("shop", "Base", "shop/base.go").embed(NODE_TYPE),
            TypeDecl::new("shop", "Widget", "shop/widget.go").embed("Base"),
            TypeDecl::new("shop", "Money", "shop/money.go"),
        ];
        let index = TypeIndex::new(&decls);
        let outcome = TypeScanner::new(&LocationFilter::new()).scan(&decls, &index);

        assert_eq!(outcome.candidates.len(), 2);
        let widget = &outcome.candidates[1];
        assert_eq!(widget.qualified_name, "shop.Widget");
        assert_eq!(widget.depth, 2);
        assert_eq!(widget.identity.path, "Widget.Base.Node.ID.ID");
        assert_eq!(widget.identity.declaring_type, "datamodel.ID");
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_diamond_embedding_is_single_candidate() {
        let decls = vec![
            TypeDecl::new("", "Left", "a.go").embed(NODE_TYPE),
            TypeDecl::new("", "Right", "a.go").embed(NODE_TYPE),
            TypeDecl::new("", "Both", "a.go").embed("Left").embed("Right").embed(NODE_TYPE),
        ];
        let (names, _, diags) = scan(&decls, &LocationFilter::new());
        assert_eq!(names, vec!["Left", "Right", "Both"]);
        assert!(diags.is_empty());

        let index = TypeIndex::new(&decls);
        let outcome = TypeScanner::new(&LocationFilter::new()).scan(&decls, &index);
        assert_eq!(outcome.candidates[2].depth, 1);
    }

    #[test]
    fn test_second_identifier_conflicts() {
        let decls = vec![TypeDecl::new("", "Keyed", "a.go")
            .embed(NODE_TYPE)
            .field(FieldDecl::new("Key", TypeRef::named("String")).with_tag(r#"datamodel:"id""#))];
        let (names, _, diags) = scan(&decls, &LocationFilter::new());

        assert!(names.is_empty());
        let item = diags.with_code(DiagnosticCode::ConflictingIdentity).next().unwrap();
        assert_eq!(item.type_name, "Keyed");
        assert!(item.context.contains(&"Keyed.Key".to_string()));
        assert!(item.context.contains(&"Keyed.Node.ID.ID".to_string()));
    }

    #[test]
    fn test_excluded_location_is_not_candidate() {
        let decls = vec![
            TypeDecl::new("", "Fixture", "build/testing.go").embed(NODE_TYPE),
            TypeDecl::new("", "Helper", "build/helper.go"),
        ];
        let filter = LocationFilter::new().exclude_dir("build");
        let (names, excluded, diags) = scan(&decls, &filter);

        assert!(names.is_empty());
        assert_eq!(excluded.into_iter().collect::<Vec<_>>(), vec!["Fixture"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_embedding_cycle_rejected() {
        let decls = vec![
            TypeDecl::new("", "A", "a.go").embed("B").embed(NODE_TYPE),
            TypeDecl::new("", "B", "a.go").embed("A"),
        ];
        let (names, _, diags) = scan(&decls, &LocationFilter::new());
        assert!(names.is_empty());
        let cycles: Vec<_> = diags.with_code(DiagnosticCode::EmbeddingCycle).collect();
        assert_eq!(cycles.len(), 2);
        assert!(cycles.iter().all(|d| d.message == "embedding cycle through A, B"));
    }

    #[test]
    fn test_type_embedding_into_cycle_rejected() {
        let decls = vec![
            TypeDecl::new("", "Outer", "a.go").embed("Loop").embed(NODE_TYPE),
            TypeDecl::new("", "Loop", "a.go").embed("Loop"),
        ];
        let (names, _, diags) = scan(&decls, &LocationFilter::new());
        assert!(names.is_empty());

        let messages: Vec<_> = diags.all().iter().map(|d| (d.type_name.as_str(), d.message.as_str())).collect();
        assert_eq!(
            messages,
            vec![
                ("Outer", "embedding cycle through Loop"),
                ("Loop", "embedding cycle through Loop"),
            ]
        );
    }

    #[test]
    fn test_wide_shared_embedding_is_linear() {
        // Every type embeds all four types of the level below: 4^24 paths
        // if shared sub-trees were walked again for each parent.
        let width = 4;
        let levels = 24;
        let mut decls = Vec::new();
        for level in 0..levels {
            for slot in 0..width {
                let mut decl = TypeDecl::new("dag", format!("T{}_{}", level, slot), "dag.go");
                if level == 0 {
                    decl = decl.embed(NODE_TYPE);
                } else {
                    for below in 0..width {
                        decl = decl.embed(format!("T{}_{}", level - 1, below));
                    }
                }
                decls.push(decl);
            }
        }

        let index = TypeIndex::new(&decls);
        let outcome = TypeScanner::new(&LocationFilter::new())
            .with_max_depth(32)
            .scan(&decls, &index);

        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.candidates.len(), width * levels);
        let top = outcome
            .candidates
            .iter()
            .find(|c| c.qualified_name == "dag.T23_0")
            .unwrap();
        assert_eq!(top.depth, levels);
        assert!(top.identity.path.starts_with("T23_0.T22_0.T21_0."));
        assert!(top.identity.path.ends_with("T0_0.Node.ID.ID"));
    }

    #[test]
    fn test_duplicate_embed_is_ambiguous_in_any_order() {
        let decls = vec![
            TypeDecl::new("shop", "Base", "shop/a.go").embed(NODE_TYPE),
            TypeDecl::new("shop", "Base", "shop/b.go"),
            TypeDecl::new("shop", "Widget", "shop/w.go").embed("Base"),
        ];
        let mut reversed = decls.clone();
        reversed.reverse();

        for order in [decls, reversed] {
            let (names, _, diags) = scan(&order, &LocationFilter::new());
            assert_eq!(names, vec!["shop.Base"]);

            let items = diags.all();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].code, DiagnosticCode::AmbiguousEmbed);
            assert_eq!(items[0].type_name, "shop.Widget");
        }
    }

    #[test]
    fn test_builtin_package_declarations_rejected() {
        let decls = vec![
            TypeDecl::new(BUILTIN_PACKAGE, "Node", "shop/fake.go"),
            TypeDecl::new("shop", "Widget", "shop/widget.go").embed("datamodel.Node"),
        ];
        let index = TypeIndex::new(&decls);
        let outcome = TypeScanner::new(&LocationFilter::new()).scan(&decls, &index);

        let names: Vec<_> = outcome.candidates.iter().map(|c| c.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["shop.Widget"]);
        assert_eq!(outcome.candidates[0].identity.path, "Widget.Node.ID.ID");

        let items = outcome.diagnostics.all();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].code, DiagnosticCode::ReservedPackage);
        assert_eq!(items[0].type_name, "datamodel.Node");
    }

    #[test]
    fn test_depth_bound() {
        let mut decls = vec![TypeDecl::new("", "L0", "a.go").embed(NODE_TYPE)];
        for i in 1..6 {
            decls.push(TypeDecl::new("", format!("L{}", i), "a.go").embed(format!("L{}", i - 1)));
        }
        let index = TypeIndex::new(&decls);
        let outcome = TypeScanner::new(&LocationFilter::new())
            .with_max_depth(4)
            .scan(&decls, &index);

        // L3 reaches ID at depth 5
        let names: Vec<_> = outcome.candidates.iter().map(|c| c.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["L0", "L1", "L2"]);
        assert_eq!(outcome.diagnostics.with_code(DiagnosticCode::EmbeddingCycle).count(), 3);
    }

    #[test]
    fn test_unknown_embed_warns() {
        let decls = vec![TypeDecl::new("", "A", "a.go").embed(NODE_TYPE).embed("Missing")];
        let (names, _, diags) = scan(&decls, &LocationFilter::new());
        assert_eq!(names, vec!["A"]);
        assert_eq!(diags.with_code(DiagnosticCode::UnknownEmbed).count(), 1);
    }
}

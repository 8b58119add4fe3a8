//! Compiler
//!
//! One synchronous pass over an immutable declaration snapshot:
//! scan for node types, extract their fields, build the graph.

use std::path::Path;
use tracing::info;

use crate::config::CompilerConfig;
use crate::decl::{TypeDecl, TypeIndex};
use crate::error::Result;
use crate::extract::FieldExtractor;
use crate::graph::{load_declarations, Diagnostics, GraphBuilder, LoadConfig, SchemaGraph};
use crate::location::LocationFilter;
use crate::scanner::{TypeScanner, DEFAULT_MAX_EMBEDDING_DEPTH};

/// Result of a successful pass. A non-empty diagnostic list means the
/// graph is usable but incomplete.
#[derive(Debug)]
pub struct Compilation {
    pub graph: SchemaGraph,
    pub diagnostics: Diagnostics,
}

impl Compilation {
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Compiler {
    filter: LocationFilter,
    max_embedding_depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(LocationFilter::new())
    }
}

impl Compiler {
    pub fn new(filter: LocationFilter) -> Self {
        Self {
            filter,
            max_embedding_depth: DEFAULT_MAX_EMBEDDING_DEPTH,
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(config.location_filter()).with_max_embedding_depth(config.scan.max_embedding_depth)
    }

    pub fn with_max_embedding_depth(mut self, depth: usize) -> Self {
        self.max_embedding_depth = depth;
        self
    }

    pub fn filter(&self) -> &LocationFilter {
        &self.filter
    }

    /// Compile declarations into a graph. Fails on a malformed declaration
    /// or a duplicate node type; everything else is collected as diagnostics.
    pub fn compile(&self, decls: &[TypeDecl]) -> Result<Compilation> {
        for decl in decls {
            decl.validate()?;
        }

        let index = TypeIndex::new(decls);
        let outcome = TypeScanner::new(&self.filter)
            .with_max_depth(self.max_embedding_depth)
            .scan(decls, &index);

        let node_types = outcome.node_type_names();
        let extractor = FieldExtractor::new(&index, &node_types);
        let mut diagnostics = outcome.diagnostics;

        let mut builder = GraphBuilder::new();
        for candidate in &outcome.candidates {
            let node = extractor.extract(candidate, &mut diagnostics);
            builder.add_node(node)?;
        }

        let graph = builder.build(&mut diagnostics);
        diagnostics.sort();

        info!(
            declarations = decls.len(),
            node_types = graph.node_count(),
            excluded = outcome.excluded.len(),
            errors = diagnostics.error_count(),
            warnings = diagnostics.warning_count(),
            "compilation finished"
        );

        Ok(Compilation { graph, diagnostics })
    }

    /// Load declaration files under `root` and compile them
    pub fn compile_directory(&self, root: &Path, config: &LoadConfig) -> Result<Compilation> {
        let loaded = load_declarations(root, config)?;
        self.compile(&loaded.decls)
    }
}

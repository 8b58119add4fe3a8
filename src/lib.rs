//! Datamodel Schema Compiler
//!
//! Statically discovers declared types that embed the builtin `Node`
//! identity shape, extracts their fields and builds a typed schema graph
//! for code generation and validation.
//!
//! ## Features
//!
//! - **Structural discovery**: a type is a node type when it embeds `Node`,
//!   directly or through other embedded types
//! - **Location exclusion**: configured paths never enter the graph, whatever
//!   their shape
//! - **Partial failure**: per-type problems become diagnostics; only a
//!   duplicate node type aborts the pass
//! - **Deterministic output**: canonical ordering and a SHA-256 fingerprint
//!
//! ## Pipeline
//!
//! ```text
//! declarations ─▶ TypeScanner ─▶ FieldExtractor ─▶ GraphBuilder ─▶ SchemaGraph
//!                  (LocationFilter)                                 + Diagnostics
//! ```
//!
//! ## Example
//!
//! ```
//! use datamodel_schema::{Compiler, FieldDecl, TypeDecl, NODE_TYPE};
//!
//! let decls = vec![
//!     TypeDecl::new("shop", "Customer", "shop/customer.go").embed(NODE_TYPE),
//!     TypeDecl::new("shop", "Order", "shop/order.go")
//!         .embed(NODE_TYPE)
//!         .field(FieldDecl::new("Buyer", "Customer".parse().unwrap())),
//! ];
//!
//! let compilation = Compiler::default().compile(&decls).unwrap();
//! assert!(compilation.is_complete());
//! assert_eq!(compilation.graph.refs_out("shop.Order"), vec!["shop.Customer"]);
//! ```

pub mod compiler;
pub mod config;
pub mod decl;
pub mod error;
pub mod extract;
pub mod graph;
pub mod identity;
pub mod location;
pub mod scanner;
pub mod tag;

pub use compiler::{Compilation, Compiler};
pub use config::CompilerConfig;
pub use decl::{Cardinality, FieldDecl, TypeDecl, TypeRef};
pub use error::{CompileError, Result};
pub use graph::{
    CycleGroup, DiagnosticCode, DiagnosticItem, Diagnostics, FieldMetadata, FieldRole, NodeType,
    SchemaGraph, Severity,
};
pub use identity::{DatamodelNode, Declared, Id, Node, ID_TYPE, NODE_TYPE};
pub use location::{ExclusionRule, LocationFilter};
pub use tag::RoleHint;

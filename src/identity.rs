//! Identity Convention
//!
//! Every datamodel type embeds [`Node`], which itself embeds [`Id`]: a single
//! string field tagged `datamodel:"id"`. A type is a node type iff it reaches
//! `Node` through embedding, regardless of anything else it declares.
//!
//! The Rust-side shapes here are what runtime objects carry. The compiler works
//! on [`TypeDecl`]s, so the same two shapes are also exposed as builtin
//! declarations living in the reserved `datamodel` package.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::decl::{FieldDecl, TypeDecl, TypeRef};
use crate::error::{CompileError, Result};
use crate::tag::RoleHint;

/// Namespace key recognized inside field tags
pub const TAG_KEY: &str = "datamodel";

/// Package holding the builtin `ID` and `Node` declarations
pub const BUILTIN_PACKAGE: &str = "datamodel";

/// Builtin identity shape
pub const ID_TYPE: &str = "ID";

/// Builtin node shape (embeds [`ID_TYPE`])
pub const NODE_TYPE: &str = "Node";

/// The identifier field declared on [`ID_TYPE`]
pub const ID_FIELD: &str = "ID";

/// Location reported for builtin declarations
pub const BUILTIN_LOCATION: &str = "<builtin>";

/// Runtime identifier of a datamodel object. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id(String);

impl Id {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(CompileError::EmptyIdentifier);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Id {
    type Error = CompileError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base shape embedded by every datamodel type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "id")]
    id: Id,
}

impl Node {
    pub fn new(id: Id) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }
}

/// Capability held by every runtime datamodel object: it carries a [`Node`].
pub trait DatamodelNode {
    fn node(&self) -> &Node;

    fn id(&self) -> &str {
        self.node().id().as_str()
    }
}

impl DatamodelNode for Node {
    fn node(&self) -> &Node {
        self
    }
}

/// Static declaration of a Rust type, used to feed Rust-defined types into
/// the same compilation pass as externally loaded declarations.
pub trait Declared {
    fn declaration() -> TypeDecl;
}

impl Declared for Id {
    fn declaration() -> TypeDecl {
        TypeDecl::new(BUILTIN_PACKAGE, ID_TYPE, BUILTIN_LOCATION).field(
            FieldDecl::new(ID_FIELD, TypeRef::named("String")).with_role(RoleHint::Identifier),
        )
    }
}

impl Declared for Node {
    fn declaration() -> TypeDecl {
        TypeDecl::new(BUILTIN_PACKAGE, NODE_TYPE, BUILTIN_LOCATION).embed(ID_TYPE)
    }
}

/// Builtin `ID` and `Node` declarations, shared by every pass
pub fn builtin_declarations() -> &'static [TypeDecl] {
    static BUILTINS: OnceLock<Vec<TypeDecl>> = OnceLock::new();
    BUILTINS.get_or_init(|| vec![Id::declaration(), Node::declaration()])
}

/// Qualified name of the builtin `Node` shape
pub fn node_qualified_name() -> String {
    format!("{}.{}", BUILTIN_PACKAGE, NODE_TYPE)
}

pub fn is_builtin(qualified_name: &str) -> bool {
    builtin_declarations()
        .iter()
        .any(|decl| decl.qualified_name() == qualified_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        node: Node,
    }

    impl DatamodelNode for Widget {
        fn node(&self) -> &Node {
            &self.node
        }
    }

    #[test]
    fn test_empty_identifier_rejected() {
        assert!(matches!(Id::new(""), Err(CompileError::EmptyIdentifier)));
        assert!(serde_json::from_str::<Id>("\"\"").is_err());
    }

    #[test]
    fn test_capability_exposes_identifier() {
        let widget = Widget {
            node: Node::new(Id::new("widget-1").unwrap()),
        };
        assert_eq!(widget.id(), "widget-1");
    }

    #[test]
    fn test_builtins() {
        let builtins = builtin_declarations();
        assert_eq!(builtins.len(), 2);
        assert!(is_builtin("datamodel.ID"));
        assert!(is_builtin(&node_qualified_name()));
        assert!(!is_builtin("Node"));

        let id = &builtins[0];
        assert_eq!(id.fields.len(), 1);
        assert_eq!(id.fields[0].declared_role().unwrap(), Some(RoleHint::Identifier));
    }

    #[test]
    fn test_node_serializes_flat_id() {
        let node = Node::new(Id::new("n1").unwrap());
        assert_eq!(serde_json::to_string(&node).unwrap(), r#"{"id":"n1"}"#);
    }
}

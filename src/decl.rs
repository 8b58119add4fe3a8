//! Type Declarations
//!
//! The compiler's input: struct-like declarations with a source location,
//! embedded members and annotated fields. A source-loading collaborator
//! produces these (see [`crate::graph::loader`]), or Rust code builds them
//! directly through the builder methods.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::error::{CompileError, Result as CompileResult};
use crate::identity::{builtin_declarations, BUILTIN_PACKAGE};
use crate::tag::{parse_role, RoleHint, TagError};

// =============================================================================
// Type Declaration
// =============================================================================

/// One declared struct-like type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    /// Package / module the type lives in (may be empty)
    #[serde(default)]
    pub package: String,
    pub name: String,
    /// Source location, relative to the scanned root
    #[serde(default)]
    pub location: PathBuf,
    /// Embedded member types, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDecl>,
}

impl TypeDecl {
    pub fn new(
        package: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<PathBuf>,
    ) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            location: location.into(),
            embeds: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn embed(mut self, type_name: impl Into<String>) -> Self {
        self.embeds.push(type_name.into());
        self
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    /// `package.Name`, or just `Name` outside any package
    pub fn qualified_name(&self) -> String {
        qualify(&self.package, &self.name)
    }

    /// Check that the name and every field name are plain identifiers and
    /// the package is empty or a dotted path.
    pub fn validate(&self) -> CompileResult<()> {
        let invalid = |message: String| CompileError::InvalidDeclaration {
            path: self.location.display().to_string(),
            message,
        };

        if !is_plain_ident(&self.name) {
            return Err(invalid(format!("type name '{}' is not an identifier", self.name)));
        }
        let dotted = normalize_type_path(&self.package).is_some_and(|p| p == self.package);
        if !self.package.is_empty() && !dotted {
            return Err(invalid(format!(
                "package '{}' of {} is not a dotted path",
                self.package, self.name
            )));
        }
        if let Some(field) = self.fields.iter().find(|f| !is_plain_ident(&f.name)) {
            return Err(invalid(format!(
                "field name '{}' in {} is not an identifier",
                field.name,
                self.qualified_name()
            )));
        }
        Ok(())
    }
}

pub(crate) fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

// =============================================================================
// Field Declaration
// =============================================================================

/// A declared field. Its role comes from a typed descriptor (`role`) when
/// present, otherwise from the raw `tag` text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleHint>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            tag: None,
            role: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_role(mut self, role: RoleHint) -> Self {
        self.role = Some(role);
        self
    }

    /// The role this field asks for, if any
    pub fn declared_role(&self) -> Result<Option<RoleHint>, TagError> {
        if let Some(role) = &self.role {
            return Ok(Some(role.clone()));
        }
        match &self.tag {
            Some(tag) => parse_role(tag),
            None => Ok(None),
        }
    }

    /// True only for a well-formed identifier annotation
    pub fn is_identifier(&self) -> bool {
        matches!(self.declared_role(), Ok(Some(RoleHint::Identifier)))
    }
}

// =============================================================================
// Type References
// =============================================================================

/// How many targets a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Optional,
    Many,
}

impl Cardinality {
    fn combine(self, inner: Cardinality) -> Cardinality {
        self.max(inner)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid type reference '{raw}': {reason}")]
pub struct TypeRefError {
    pub raw: String,
    pub reason: String,
}

/// A declared field type, e.g. `Widget`, `shop::Widget`, `Option<Widget>`,
/// `Vec<Box<Widget>>` or `HashMap<String, Widget>`.
///
/// Only the element type matters for classification; wrappers decide the
/// [`Cardinality`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeRef {
    raw: String,
    element: String,
    cardinality: Cardinality,
}

impl TypeRef {
    /// A bare named type. The name is taken as-is.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            element: name.replace("::", "."),
            raw: name,
            cardinality: Cardinality::One,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, TypeRefError> {
        let (element, cardinality) = parse_type(raw.trim()).map_err(|reason| TypeRefError {
            raw: raw.to_string(),
            reason,
        })?;
        Ok(Self {
            raw: raw.trim().to_string(),
            element,
            cardinality,
        })
    }

    /// Innermost named type, `::` normalized to `.`
    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for TypeRef {
    type Err = TypeRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TypeRef {
    type Error = TypeRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TypeRef> for String {
    fn from(ty: TypeRef) -> Self {
        ty.raw
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

const OPTIONAL_WRAPPERS: &[&str] = &["Option"];
const TRANSPARENT_WRAPPERS: &[&str] = &["Box", "Rc", "Arc"];
const SEQUENCE_WRAPPERS: &[&str] = &["Vec", "VecDeque", "HashSet", "BTreeSet"];
const MAP_WRAPPERS: &[&str] = &["HashMap", "BTreeMap"];

fn parse_type(s: &str) -> Result<(String, Cardinality), String> {
    if let Some((wrapper, args)) = split_generic(s)? {
        let args = split_top_level(args);
        let (inner, base) = if OPTIONAL_WRAPPERS.contains(&wrapper) {
            (single_arg(wrapper, &args)?, Cardinality::Optional)
        } else if TRANSPARENT_WRAPPERS.contains(&wrapper) {
            (single_arg(wrapper, &args)?, Cardinality::One)
        } else if SEQUENCE_WRAPPERS.contains(&wrapper) {
            (single_arg(wrapper, &args)?, Cardinality::Many)
        } else if MAP_WRAPPERS.contains(&wrapper) {
            match args.as_slice() {
                [_, value] => (*value, Cardinality::Many),
                _ => return Err(format!("{} takes a key and a value type", wrapper)),
            }
        } else {
            return Err(format!("unsupported generic wrapper `{}`", wrapper));
        };
        let (element, cardinality) = parse_type(inner.trim())?;
        return Ok((element, base.combine(cardinality)));
    }

    normalize_type_path(s)
        .map(|element| (element, Cardinality::One))
        .ok_or_else(|| format!("`{}` is not a type name", s))
}

/// `Wrapper<args>` → `Some(("Wrapper", "args"))`
fn split_generic(s: &str) -> Result<Option<(&str, &str)>, String> {
    let Some(open) = s.find('<') else {
        return Ok(None);
    };
    let inner = s[open + 1..]
        .strip_suffix('>')
        .ok_or_else(|| format!("unbalanced generic arguments in `{}`", s))?;
    Ok(Some((s[..open].trim(), inner)))
}

fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts
}

fn single_arg<'a>(wrapper: &str, args: &[&'a str]) -> Result<&'a str, String> {
    match args {
        [one] => Ok(*one),
        _ => Err(format!("{} takes exactly one type argument", wrapper)),
    }
}

fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a (possibly qualified) type path, normalizing `::` to `.`
pub fn normalize_type_path(s: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:(?:\.|::)[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("type path pattern is valid")
    });
    pattern.is_match(s).then(|| s.replace("::", "."))
}

// =============================================================================
// Type Index
// =============================================================================

/// Outcome of resolving an embedded type name
#[derive(Debug, Clone)]
pub enum Lookup<'a> {
    Unique(&'a TypeDecl),
    /// Several declarations share the resolved qualified name
    Ambiguous { qualified: String, count: usize },
    Missing,
}

/// Lookup over user declarations plus the builtin identity shapes.
///
/// Names are resolved relative to a declaring package: exact qualified name,
/// then the same package, then the builtin package. User declarations in the
/// builtin package are never indexed, so `datamodel.Node` always means the
/// builtin.
pub struct TypeIndex<'a> {
    by_qualified: HashMap<String, Vec<&'a TypeDecl>>,
}

impl<'a> TypeIndex<'a> {
    pub fn new(decls: &'a [TypeDecl]) -> Self {
        let mut by_qualified: HashMap<String, Vec<&'a TypeDecl>> = HashMap::new();
        let user = decls.iter().filter(|d| d.package != BUILTIN_PACKAGE);
        for decl in builtin_declarations().iter().chain(user) {
            by_qualified.entry(decl.qualified_name()).or_default().push(decl);
        }
        Self { by_qualified }
    }

    /// Resolve `name` as written inside `package`. The first candidate name
    /// that exists decides; if it names several declarations the lookup is
    /// ambiguous rather than picking one.
    pub fn lookup(&self, package: &str, name: &str) -> Lookup<'a> {
        let name = name.replace("::", ".");
        let found = candidate_names(package, &name)
            .into_iter()
            .find_map(|qualified| self.by_qualified.get_key_value(&qualified));
        match found {
            None => Lookup::Missing,
            Some((_, decls)) if decls.len() == 1 => Lookup::Unique(decls[0]),
            Some((qualified, decls)) => Lookup::Ambiguous {
                qualified: qualified.clone(),
                count: decls.len(),
            },
        }
    }

    /// The declaration `name` stands for inside `package`, when there is
    /// exactly one
    pub fn resolve(&self, package: &str, name: &str) -> Option<&'a TypeDecl> {
        match self.lookup(package, name) {
            Lookup::Unique(decl) => Some(decl),
            _ => None,
        }
    }

    /// Every indexed declaration, builtins included
    pub fn decls(&self) -> impl Iterator<Item = &'a TypeDecl> + '_ {
        self.by_qualified.values().flatten().copied()
    }
}

/// Qualified names `name` may stand for when written inside `package`
pub(crate) fn candidate_names(package: &str, name: &str) -> Vec<String> {
    let mut names = vec![name.to_string()];
    if !name.contains('.') {
        if !package.is_empty() {
            names.push(qualify(package, name));
        }
        names.push(qualify(BUILTIN_PACKAGE, name));
    }
    names
}

/// Resolve `target`, written inside `package`, against a set of qualified
/// names: exact match, then same package, then a unique simple-name match.
pub fn resolve_among<'n>(names: &'n BTreeSet<String>, package: &str, target: &str) -> Option<&'n str> {
    let target = target.replace("::", ".");
    if let Some(found) = candidate_names(package, &target)
        .iter()
        .find_map(|candidate| names.get(candidate))
    {
        return Some(found.as_str());
    }

    if target.contains('.') {
        return None;
    }
    let mut matches = names
        .iter()
        .filter(|name| name.rsplit('.').next() == Some(target.as_str()));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only.as_str()),
        _ => None,
    }
}

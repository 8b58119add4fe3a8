//! Diagnostics
//!
//! Non-fatal issues collected during a compilation pass. A graph returned
//! with a non-empty diagnostic list is usable but incomplete.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tag::TagError;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Scanning ===
    /// Two distinct identifier fields reachable through embedding
    ConflictingIdentity,
    /// User declaration in the reserved builtin package
    ReservedPackage,
    /// Embedding cycle, or embedding deeper than the configured bound
    EmbeddingCycle,
    /// Embedded type name not declared anywhere
    UnknownEmbed,
    /// Embedded type name declared more than once
    AmbiguousEmbed,

    // === Fields ===
    /// Tag text could not be parsed
    MalformedTag,
    /// Declared field dropped because it reuses the identifier's name
    ShadowedIdentifier,

    // === Graph ===
    /// Reference target not among the accepted node types
    UnresolvedReference,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConflictingIdentity => "E001",
            Self::ReservedPackage => "E002",
            Self::EmbeddingCycle => "E003",
            Self::UnresolvedReference => "E004",
            Self::MalformedTag => "W001",
            Self::UnknownEmbed => "W002",
            Self::AmbiguousEmbed => "W003",
            Self::ShadowedIdentifier => "W004",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::ConflictingIdentity
            | Self::ReservedPackage
            | Self::EmbeddingCycle
            | Self::UnresolvedReference => Severity::Error,

            Self::MalformedTag
            | Self::UnknownEmbed
            | Self::AmbiguousEmbed
            | Self::ShadowedIdentifier => Severity::Warning,
        }
    }

    /// Whether the subject type was kept out of the graph
    pub fn rejects_type(&self) -> bool {
        matches!(
            self,
            Self::ConflictingIdentity | Self::ReservedPackage | Self::EmbeddingCycle
        )
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Qualified name of the type that caused this diagnostic
    pub type_name: String,
    /// Diagnostic code
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
    /// Additional context (embedding paths, tag text)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(type_name: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.type_name
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from a compilation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic item
    pub fn push(&mut self, item: DiagnosticItem) {
        tracing::warn!(code = %item.code, type_name = %item.type_name, "{}", item.message);
        self.items.push(item);
    }

    pub fn conflicting_identity(&mut self, type_name: &str, first_path: &str, second_path: &str) {
        self.push(
            DiagnosticItem::new(
                type_name,
                DiagnosticCode::ConflictingIdentity,
                format!("'{}' reaches more than one identifier field", type_name),
            )
            .with_context(first_path.to_string())
            .with_context(second_path.to_string()),
        );
    }

    pub fn reserved_package(&mut self, type_name: &str, package: &str) {
        self.push(DiagnosticItem::new(
            type_name,
            DiagnosticCode::ReservedPackage,
            format!("package '{}' is reserved for builtin types", package),
        ));
    }

    pub fn embedding_cycle(&mut self, type_name: &str, reason: impl Into<String>) {
        self.push(DiagnosticItem::new(
            type_name,
            DiagnosticCode::EmbeddingCycle,
            reason,
        ));
    }

    pub fn unknown_embed(&mut self, type_name: &str, embed: &str) {
        self.push(DiagnosticItem::new(
            type_name,
            DiagnosticCode::UnknownEmbed,
            format!("embedded type '{}' is not declared", embed),
        ));
    }

    pub fn ambiguous_embed(&mut self, type_name: &str, embed: &str, qualified: &str, count: usize) {
        self.push(DiagnosticItem::new(
            type_name,
            DiagnosticCode::AmbiguousEmbed,
            format!(
                "embedded type '{}' resolves to {} declarations of {}",
                embed, count, qualified
            ),
        ));
    }

    /// A declared field named like the inherited identifier was dropped
    pub fn shadowed_identifier(&mut self, type_name: &str, field_path: &str, identity_path: &str) {
        self.push(
            DiagnosticItem::new(
                type_name,
                DiagnosticCode::ShadowedIdentifier,
                format!("field '{}' is hidden by the inherited identifier", field_path),
            )
            .with_context(identity_path.to_string()),
        );
    }

    /// Add diagnostic for a tag that failed to parse
    pub fn malformed_tag(&mut self, type_name: &str, field: &str, error: &TagError) {
        self.push(
            DiagnosticItem::new(
                type_name,
                DiagnosticCode::MalformedTag,
                format!("malformed tag on field '{}.{}': {}", type_name, field, error.reason),
            )
            .with_context(format!("tag: {}", error.tag)),
        );
    }

    /// Add diagnostic for unresolved reference
    pub fn unresolved_reference(&mut self, type_name: &str, field: &str, target: &str) {
        self.push(DiagnosticItem::new(
            type_name,
            DiagnosticCode::UnresolvedReference,
            format!("unresolved reference {}.{} → {}", type_name, field, target),
        ));
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    /// Get all errors
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    /// Get all warnings
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Items carrying a given code
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    /// Get all items
    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Canonical order, independent of declaration order
    pub fn sort(&mut self) {
        self.items.sort();
        self.items.dedup();
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if !self.is_empty() {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::UnresolvedReference.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::MalformedTag.severity(), Severity::Warning);
        assert!(DiagnosticCode::ConflictingIdentity.rejects_type());
        assert!(DiagnosticCode::ReservedPackage.rejects_type());
        assert_eq!(DiagnosticCode::AmbiguousEmbed.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::ShadowedIdentifier.as_str(), "W004");
        assert!(!DiagnosticCode::UnresolvedReference.rejects_type());
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        diags.unresolved_reference("shop.Order", "Buyer", "Customer");
        diags.unknown_embed("shop.Order", "Audit");

        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert!(diags.has_errors());
        assert!(diags.all()[0].message.contains("shop.Order.Buyer → Customer"));
    }

    #[test]
    fn test_sort_is_order_independent() {
        let mut a = Diagnostics::new();
        a.unknown_embed("b.T", "X");
        a.unresolved_reference("a.T", "F", "Y");

        let mut b = Diagnostics::new();
        b.unresolved_reference("a.T", "F", "Y");
        b.unknown_embed("b.T", "X");

        a.sort();
        b.sort();
        assert_eq!(a, b);
    }
}

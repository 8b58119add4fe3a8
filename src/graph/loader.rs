//! Declaration Loading
//!
//! Reads declaration files (JSON or TOML) from a directory tree. Each file
//! holds an optional package and a list of types:
//!
//! ```json
//! { "package": "shop", "types": [ { "name": "Widget", "embeds": ["Node"] } ] }
//! ```
//!
//! A type without a location takes the file's path relative to the root, so
//! location exclusion works on loaded declarations the same way it does on
//! programmatic ones.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::decl::TypeDecl;
use crate::error::{CompileError, Result};

/// Configuration for declaration loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Skip files matching these relative path prefixes
    pub skip_prefixes: Vec<String>,
    /// File extensions to read, without the dot
    pub extensions: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: vec![
                "target/".to_string(),
                ".git/".to_string(),
                "node_modules/".to_string(),
            ],
            extensions: vec!["json".to_string(), "toml".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeclarationFile {
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    types: Vec<TypeDecl>,
}

/// Loaded declarations plus a hash over the files read
#[derive(Debug, Clone)]
pub struct LoadedDeclarations {
    pub decls: Vec<TypeDecl>,
    pub files: Vec<PathBuf>,
    pub bundle_hash: String,
}

/// Load every declaration file under `root`, in sorted path order
pub fn load_declarations(root: &Path, config: &LoadConfig) -> Result<LoadedDeclarations> {
    let mut decls = Vec::new();
    let mut files = Vec::new();
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| CompileError::InvalidDeclaration {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !config.extensions.iter().any(|e| e == extension) {
            continue;
        }

        let relative_path = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        let relative_str = relative_path.to_string_lossy().replace('\\', "/");
        if config.skip_prefixes.iter().any(|p| relative_str.starts_with(p.as_str())) {
            debug!(path = %relative_str, "skipped");
            continue;
        }

        let content = fs::read_to_string(path)?;
        hasher.update(relative_str.as_bytes());
        hasher.update(content.as_bytes());

        let file = parse_file(&content, extension).map_err(|message| {
            CompileError::InvalidDeclaration {
                path: relative_str.clone(),
                message,
            }
        })?;

        let count = file.types.len();
        for mut decl in file.types {
            if decl.package.is_empty() {
                if let Some(package) = &file.package {
                    decl.package = package.clone();
                }
            }
            if decl.location.as_os_str().is_empty() {
                decl.location = PathBuf::from(&relative_str);
            }
            decl.validate().map_err(|e| match e {
                CompileError::InvalidDeclaration { message, .. } => CompileError::InvalidDeclaration {
                    path: relative_str.clone(),
                    message,
                },
                other => other,
            })?;
            decls.push(decl);
        }

        debug!(path = %relative_str, types = count, "loaded declaration file");
        files.push(relative_path);
    }

    info!(files = files.len(), types = decls.len(), "declarations loaded");

    Ok(LoadedDeclarations {
        decls,
        files,
        bundle_hash: format!("{:x}", hasher.finalize()),
    })
}

fn parse_file(content: &str, extension: &str) -> std::result::Result<DeclarationFile, String> {
    match extension {
        "toml" => toml::from_str(content).map_err(|e| e.to_string()),
        _ => serde_json::from_str(content).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::Cardinality;
    use tempfile::TempDir;

    fn write(dir: &TempDir, relative: &str, content: &str) {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_json_and_toml() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "shop/order.json",
            r#"{
                "package": "shop",
                "types": [
                    { "name": "Order", "embeds": ["Node"],
                      "fields": [ { "name": "Lines", "type": "Vec<LineItem>" } ] }
                ]
            }"#,
        );
        write(
            &dir,
            "catalog/product.toml",
            r#"
package = "catalog"

[[types]]
name = "Product"
embeds = ["Node"]

[[types.fields]]
name = "Maker"
type = "Option<Company>"
tag = 'datamodel:"ref"'
"#,
        );
        write(&dir, "README.md", "ignored");

        let loaded = load_declarations(dir.path(), &LoadConfig::default()).unwrap();
        assert_eq!(loaded.files.len(), 2);
        assert_eq!(loaded.decls.len(), 2);

        // Sorted: catalog/ before shop/
        let product = &loaded.decls[0];
        assert_eq!(product.qualified_name(), "catalog.Product");
        assert_eq!(product.location, PathBuf::from("catalog/product.toml"));
        assert_eq!(product.fields[0].ty.cardinality(), Cardinality::Optional);
        assert_eq!(product.fields[0].tag.as_deref(), Some(r#"datamodel:"ref""#));

        let order = &loaded.decls[1];
        assert_eq!(order.qualified_name(), "shop.Order");
        assert_eq!(order.fields[0].ty.element(), "LineItem");
    }

    #[test]
    fn test_explicit_location_and_package_kept() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "model.json",
            r#"{ "package": "shop", "types": [
                { "package": "billing", "name": "Invoice", "location": "build/invoice.go" }
            ] }"#,
        );
        let loaded = load_declarations(dir.path(), &LoadConfig::default()).unwrap();
        assert_eq!(loaded.decls[0].qualified_name(), "billing.Invoice");
        assert_eq!(loaded.decls[0].location, PathBuf::from("build/invoice.go"));
    }

    #[test]
    fn test_skip_prefixes() {
        let dir = TempDir::new().unwrap();
        write(&dir, "target/gen.json", r#"{ "types": [ { "name": "Gen" } ] }"#);
        write(&dir, "model.json", r#"{ "types": [ { "name": "Kept" } ] }"#);

        let loaded = load_declarations(dir.path(), &LoadConfig::default()).unwrap();
        assert_eq!(loaded.decls.len(), 1);
        assert_eq!(loaded.decls[0].name, "Kept");
    }

    #[test]
    fn test_invalid_type_name_rejected() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "shop/model.json",
            r#"{ "package": "shop", "types": [
                { "name": "Good" },
                { "name": "Bad\"Name", "location": "src/bad.go" }
            ] }"#,
        );

        let err = load_declarations(dir.path(), &LoadConfig::default()).unwrap_err();
        match err {
            CompileError::InvalidDeclaration { path, message } => {
                assert_eq!(path, "shop/model.json");
                assert!(message.contains("is not an identifier"), "{}", message);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_package_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "model.toml", "package = \"shop/v1\"\n\n[[types]]\nname = \"Widget\"\n");

        let err = load_declarations(dir.path(), &LoadConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidDeclaration { ref path, .. } if path == "model.toml"));
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = TempDir::new().unwrap();
        write(&dir, "broken.json", r#"{ "types": [ { "name": "X", "fields": [ { "name": "F", "type": "Vec<>" } ] } ] }"#);

        let err = load_declarations(dir.path(), &LoadConfig::default()).unwrap_err();
        match err {
            CompileError::InvalidDeclaration { path, .. } => assert_eq!(path, "broken.json"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bundle_hash_stable() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.json", r#"{ "types": [ { "name": "A" } ] }"#);
        let first = load_declarations(dir.path(), &LoadConfig::default()).unwrap();
        let second = load_declarations(dir.path(), &LoadConfig::default()).unwrap();
        assert_eq!(first.bundle_hash, second.bundle_hash);
    }
}

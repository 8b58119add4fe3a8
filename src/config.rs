//! Configuration for the datamodel compiler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (datamodel.toml)
//! - Environment variables (DATAMODEL__*)
//!
//! ## Example config file (datamodel.toml):
//! ```toml
//! [scan]
//! exclude_dirs = ["build"]
//! exclude_prefixes = ["internal/fixtures/"]
//! max_embedding_depth = 16
//!
//! [loader]
//! extensions = ["json", "toml"]
//! skip_prefixes = ["target/", ".git/"]
//!
//! [output]
//! format = "json"
//! pretty = true
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::graph::LoadConfig;
use crate::location::LocationFilter;
use crate::scanner::DEFAULT_MAX_EMBEDDING_DEPTH;

/// Main configuration for the compiler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Node type discovery
    #[serde(default)]
    pub scan: ScanConfig,

    /// Declaration file loading
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Graph export
    #[serde(default)]
    pub output: OutputConfig,
}

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Relative path prefixes whose declarations never become node types
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,

    /// Directory names excluded wherever they appear in a path
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    /// Embedding hops followed before a type is rejected
    #[serde(default = "default_max_embedding_depth")]
    pub max_embedding_depth: usize,
}

/// Loader settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Files under these prefixes are never read
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default = "default_true")]
    pub pretty: bool,
}

/// Graph export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Dot,
}

// Default value functions
fn default_exclude_dirs() -> Vec<String> {
    vec!["build".to_string()]
}

fn default_max_embedding_depth() -> usize {
    DEFAULT_MAX_EMBEDDING_DEPTH
}

fn default_extensions() -> Vec<String> {
    LoadConfig::default().extensions
}

fn default_skip_prefixes() -> Vec<String> {
    LoadConfig::default().skip_prefixes
}

fn default_true() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_prefixes: Vec::new(),
            exclude_dirs: default_exclude_dirs(),
            max_embedding_depth: default_max_embedding_depth(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            pretty: true,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, with an explicit file layered over the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = ["datamodel.toml", ".datamodel.toml", "config/datamodel.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(xdg_config) = xdg_config_path() {
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // DATAMODEL__SCAN__EXCLUDE_DIRS=build,gen
        builder = builder.add_source(
            Environment::with_prefix("DATAMODEL")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("scan.exclude_dirs")
                .with_list_parse_key("scan.exclude_prefixes")
                .with_list_parse_key("loader.extensions")
                .with_list_parse_key("loader.skip_prefixes")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn location_filter(&self) -> LocationFilter {
        LocationFilter::from_config(&self.scan)
    }

    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            skip_prefixes: self.loader.skip_prefixes.clone(),
            extensions: self.loader.extensions.clone(),
        }
    }
}

/// Per-user config file location
pub fn xdg_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "datamodel", "datamodel")
        .map(|dirs| dirs.config_dir().join("datamodel.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.scan.exclude_dirs, vec!["build"]);
        assert_eq!(config.scan.max_embedding_depth, 16);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.location_filter().is_excluded(Path::new("pkg/build/fixture.go")));
    }

    #[test]
    fn test_serialize_config() {
        let config = CompilerConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[scan]"));
        assert!(toml_str.contains("[loader]"));
        assert!(toml_str.contains("format = \"json\""));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[scan]\nexclude_prefixes = [\"gen/\"]\nexclude_dirs = [\"fixtures\"]\n\n[output]\nformat = \"dot\"\n",
        )
        .unwrap();

        let config = CompilerConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.scan.exclude_prefixes, vec!["gen/"]);
        assert_eq!(config.scan.exclude_dirs, vec!["fixtures"]);
        assert_eq!(config.output.format, OutputFormat::Dot);
        assert_eq!(config.loader, LoaderConfig::default());

        let filter = config.location_filter();
        assert!(filter.is_excluded(Path::new("gen/a.go")));
        assert!(!filter.is_excluded(Path::new("build/a.go")));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = CompilerConfig::default();
        config.scan.max_embedding_depth = 4;
        config.save(&path).unwrap();

        let loaded = CompilerConfig::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.scan.max_embedding_depth, 4);
    }
}

//! Location Filter
//!
//! Decides, from the source location alone, whether a declaration may enter
//! the schema graph. Shape never matters here: a type that embeds `Node` is
//! still dropped when it lives under an excluded location.
//!
//! Matching is case-sensitive. Paths are compared with `/` separators and
//! without a leading `./`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

use crate::config::ScanConfig;

/// A single exclusion rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionRule {
    /// Location string starts with this prefix
    Prefix(String),
    /// Some path component equals this directory name
    Directory(String),
}

impl ExclusionRule {
    pub fn matches(&self, location: &Path) -> bool {
        match self {
            Self::Prefix(prefix) => normalize(location).starts_with(&normalize_str(prefix)),
            Self::Directory(dir) => location.components().any(|c| match c {
                Component::Normal(name) => name.to_str() == Some(dir.as_str()),
                _ => false,
            }),
        }
    }
}

impl fmt::Display for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(prefix) => write!(f, "prefix:{}", prefix),
            Self::Directory(dir) => write!(f, "dir:{}", dir),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFilter {
    rules: Vec<ExclusionRule>,
}

impl LocationFilter {
    /// A filter that excludes nothing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        let mut filter = Self::new();
        for prefix in &config.exclude_prefixes {
            filter = filter.exclude_prefix(prefix.clone());
        }
        for dir in &config.exclude_dirs {
            filter = filter.exclude_dir(dir.clone());
        }
        filter
    }

    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.rules.push(ExclusionRule::Prefix(prefix.into()));
        self
    }

    pub fn exclude_dir(mut self, dir: impl Into<String>) -> Self {
        self.rules.push(ExclusionRule::Directory(dir.into()));
        self
    }

    /// First rule excluding `location`, if any
    pub fn matching_rule(&self, location: &Path) -> Option<&ExclusionRule> {
        self.rules.iter().find(|rule| rule.matches(location))
    }

    pub fn is_excluded(&self, location: &Path) -> bool {
        self.matching_rule(location).is_some()
    }
}

fn normalize(path: &Path) -> String {
    normalize_str(&path.to_string_lossy())
}

fn normalize_str(s: &str) -> String {
    let s = s.replace('\\', "/");
    s.strip_prefix("./").unwrap_or(&s).to_string()
}

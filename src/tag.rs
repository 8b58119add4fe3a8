//! Field Tag Grammar
//!
//! A tag is a whitespace-separated list of `key:"value"` pairs, e.g.
//!
//! ```text
//! json:"owner" datamodel:"ref=shop.Customer"
//! ```
//!
//! Only the [`TAG_KEY`] namespace is interpreted. Its value is a
//! comma-separated token list holding exactly one role token:
//!
//! - `id`: the field is the object's identifier
//! - `plain`: never treat the field as a reference
//! - `ref`: reference to the field's declared element type
//! - `ref=<TypeName>`: reference to an explicit type
//!
//! Other keys are ignored. A broken pair anywhere in the tag, or a
//! malformed `datamodel` value, is a [`TagError`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::decl::normalize_type_path;
use crate::identity::TAG_KEY;

/// Role requested for a field, either parsed from a tag or attached as a
/// typed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleHint {
    Identifier,
    Plain,
    /// Reference to another node type; `None` means "the declared element type"
    Reference(Option<String>),
}

/// A tag that could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed tag `{tag}`: {reason}")]
pub struct TagError {
    /// Offending tag text, verbatim
    pub tag: String,
    pub reason: String,
}

impl TagError {
    fn new(tag: &str, reason: impl Into<String>) -> Self {
        Self {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }
}

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^([A-Za-z_][A-Za-z0-9_.-]*):"((?:[^"\\]|\\.)*)""#)
            .expect("tag pair pattern is valid")
    })
}

/// Split a tag into its `(key, value)` pairs, in order
pub fn parse_pairs(tag: &str) -> Result<Vec<(String, String)>, TagError> {
    let mut pairs = Vec::new();
    let mut rest = tag.trim_start();

    while !rest.is_empty() {
        let caps = pair_pattern().captures(rest).ok_or_else(|| {
            TagError::new(tag, format!("expected key:\"value\" at `{}`", rest))
        })?;
        let consumed = caps.get(0).map(|m| m.end()).unwrap_or(rest.len());
        pairs.push((caps[1].to_string(), unescape(&caps[2])));

        let after = &rest[consumed..];
        if !after.is_empty() && !after.starts_with(char::is_whitespace) {
            return Err(TagError::new(
                tag,
                format!("pairs must be separated by whitespace at `{}`", after),
            ));
        }
        rest = after.trim_start();
    }

    Ok(pairs)
}

/// Look up the raw value stored under `key`. A repeated key is an error.
pub fn lookup(tag: &str, key: &str) -> Result<Option<String>, TagError> {
    let mut found = None;
    for (k, v) in parse_pairs(tag)? {
        if k != key {
            continue;
        }
        if found.replace(v).is_some() {
            return Err(TagError::new(tag, format!("key `{}` appears more than once", key)));
        }
    }
    Ok(found)
}

/// Parse the datamodel role out of a tag. `Ok(None)` when the tag carries no
/// `datamodel` key.
pub fn parse_role(tag: &str) -> Result<Option<RoleHint>, TagError> {
    lookup(tag, TAG_KEY)?
        .map(|value| parse_role_value(&value).map_err(|reason| TagError::new(tag, reason)))
        .transpose()
}

fn parse_role_value(value: &str) -> Result<RoleHint, String> {
    if value.trim().is_empty() {
        return Err(format!("empty `{}` value", TAG_KEY));
    }

    let mut role = None;
    for token in value.split(',') {
        let token = token.trim();
        let parsed = match token {
            "" => return Err("empty token".to_string()),
            "id" => RoleHint::Identifier,
            "plain" => RoleHint::Plain,
            "ref" => RoleHint::Reference(None),
            other => match other.strip_prefix("ref=") {
                Some(target) => {
                    let target = normalize_type_path(target.trim())
                        .ok_or_else(|| format!("invalid reference target `{}`", target))?;
                    RoleHint::Reference(Some(target))
                }
                None => return Err(format!("unknown token `{}`", other)),
            },
        };
        if role.replace(parsed).is_some() {
            return Err("more than one role token".to_string());
        }
    }

    role.ok_or_else(|| format!("no role token in `{}`", value))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

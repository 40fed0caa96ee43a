//! Hierarchical key construction with collision-free namespacing.
//!
//! A [`Namespace`] composes backend keys as
//! `root{delim}_rt{delim}group…{delim}key`. The `_rt` sentinel separates the
//! root from everything beneath it, and no accepted part may contain the
//! sentinel or the delimiter, so two distinct logical keys can never render
//! to the same backend key.

use std::fmt;
use thiserror::Error;

/// Delimiter between key segments.
pub const DEFAULT_DELIMITER: &str = ":";

/// Sentinel marking the end of the namespace root.
pub const ROOT_IDENTIFIER: &str = "_rt";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("key segment must not be empty")]
    EmptySegment,
    #[error("key segment {segment:?} contains reserved sequence {reserved:?}")]
    ReservedSequence { segment: String, reserved: String },
}

/// A fully-composed backend key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    parts: Vec<String>,
    key: String,
    delimiter: String,
}

impl Key {
    /// The caller-facing key, without namespace parts.
    pub fn name(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            write!(f, "{part}{}", self.delimiter)?;
        }
        write!(f, "{}", self.key)
    }
}

/// Namespace from which backend keys are minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    root: String,
    groups: Vec<String>,
    delimiter: String,
}

impl Namespace {
    pub fn new(root: impl Into<String>) -> Result<Self, NamespaceError> {
        let root = root.into();
        validate_segment(&root, DEFAULT_DELIMITER)?;
        Ok(Self { root, groups: Vec::new(), delimiter: DEFAULT_DELIMITER.to_string() })
    }

    /// Derive a child namespace scoped one group deeper.
    pub fn with_group(&self, group: impl Into<String>) -> Result<Self, NamespaceError> {
        let group = group.into();
        validate_segment(&group, &self.delimiter)?;
        let mut child = self.clone();
        child.groups.push(group);
        Ok(child)
    }

    /// The group path, `/`-joined; empty string at the root.
    pub fn group(&self) -> String {
        self.groups.join("/")
    }

    /// Render the namespace prefix shared by every key it mints.
    pub fn prefix(&self) -> String {
        let mut parts = vec![self.root.clone(), ROOT_IDENTIFIER.to_string()];
        parts.extend(self.groups.iter().cloned());
        let mut rendered = parts.join(&self.delimiter);
        rendered.push_str(&self.delimiter);
        rendered
    }

    /// Mint a backend key for `key`.
    pub fn key(&self, key: impl Into<String>) -> Result<Key, NamespaceError> {
        let key = key.into();
        validate_segment(&key, &self.delimiter)?;
        let mut parts = vec![self.root.clone(), ROOT_IDENTIFIER.to_string()];
        parts.extend(self.groups.iter().cloned());
        Ok(Key { parts, key, delimiter: self.delimiter.clone() })
    }
}

fn validate_segment(segment: &str, delimiter: &str) -> Result<(), NamespaceError> {
    if segment.is_empty() {
        return Err(NamespaceError::EmptySegment);
    }
    for reserved in [ROOT_IDENTIFIER, delimiter] {
        if segment.contains(reserved) {
            return Err(NamespaceError::ReservedSequence {
                segment: segment.to_string(),
                reserved: reserved.to_string(),
            });
        }
    }
    Ok(())
}

//! Materialized ancestor paths for the menu tree.
//!
//! A node's path is the ordered list of its ancestor ids, root first. It is
//! stored as the ids joined by `/` so subtree lookups can use a prefix match.
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PATH_SEPARATOR: char = '/';

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AncestorPath(Vec<String>);

impl AncestorPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse the stored form. The empty string is the root path.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::root();
        }
        Self(raw.split(PATH_SEPARATOR).map(str::to_string).collect())
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path carried by the children of the node `id` living at `self`.
    pub fn child(&self, id: &str) -> Self {
        let mut ids = self.0.clone();
        ids.push(id.to_string());
        Self(ids)
    }

    /// Segment-wise prefix test; `a/bc` does not start with `a/b`.
    pub fn starts_with(&self, prefix: &AncestorPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Swap `old_prefix` for `new_prefix`, keeping every id after it.
    pub fn rebase(&self, old_prefix: &AncestorPath, new_prefix: &AncestorPath) -> Option<Self> {
        if !self.starts_with(old_prefix) {
            return None;
        }
        let mut ids = new_prefix.0.clone();
        ids.extend_from_slice(&self.0[old_prefix.0.len()..]);
        Some(Self(ids))
    }

    pub fn to_storage(&self) -> String {
        self.0.join("/")
    }
}

impl fmt::Display for AncestorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage())
    }
}

impl From<String> for AncestorPath {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<AncestorPath> for String {
    fn from(value: AncestorPath) -> Self {
        value.to_storage()
    }
}

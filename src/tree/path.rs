//! Tree paths and their physical collection names
//!
//! A path is `domain/field1/field2/...`. Segments escape `%` and `/` so a
//! field named `a/b` never aliases the nested route `a` → `b`.
//! The collection name is a SHA-256 of the path string, so paths of any
//! depth map to fixed-length names.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::{TreeError, TreeResult};

/// Prefix of every index node collection
pub const NODE_COLLECTION_PREFIX: &str = "__node_";

/// Segment name of the identity path
pub const IDENTITY_FIELD: &str = "_id";

/// One traversal route through a domain's documents
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreePath(String);

impl TreePath {
    /// Path of the domain root (no field segments)
    pub fn root(domain: &str) -> Self {
        Self(escape_segment(domain))
    }

    /// Identity path `domain/_id`
    pub fn identity(domain: &str) -> Self {
        Self::root(domain).child(IDENTITY_FIELD)
    }

    /// Path extended by one field segment
    pub fn child(&self, field: &str) -> Self {
        Self(format!("{}/{}", self.0, escape_segment(field)))
    }

    /// Parse an already-escaped path string
    pub fn parse(raw: &str) -> TreeResult<Self> {
        if raw.is_empty() || raw.split('/').any(str::is_empty) {
            return Err(TreeError::InvalidPath(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Escaped path string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unescaped segments, domain first
    pub fn segments(&self) -> Vec<String> {
        self.0.split('/').map(unescape_segment).collect()
    }

    /// Domain this path belongs to
    pub fn domain(&self) -> String {
        self.segments().into_iter().next().unwrap_or_default()
    }

    /// Whether this is `domain/_id`
    pub fn is_identity(&self) -> bool {
        let segments = self.segments();
        segments.len() == 2 && segments[1] == IDENTITY_FIELD
    }

    /// Physical collection holding this path's nodes
    pub fn collection_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        format!("{}{:x}", NODE_COLLECTION_PREFIX, hasher.finalize())
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

fn unescape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("%2F") {
            out.push('/');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("%25") {
            out.push('%');
            rest = after;
        } else {
            out.push('%');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_path() {
        let path = TreePath::identity("Laptop");
        assert_eq!(path.as_str(), "Laptop/_id");
        assert!(path.is_identity());
        assert!(!TreePath::root("Laptop").child("name").is_identity());
    }

    #[test]
    fn test_collection_name_stable_and_fixed_length() {
        let short = TreePath::root("Laptop").child("name");
        let deep = TreePath::root("Laptop").child("a").child("b").child("c").child("d");

        assert_eq!(short.collection_name(), short.clone().collection_name());
        assert_eq!(short.collection_name().len(), deep.collection_name().len());
        assert_ne!(short.collection_name(), deep.collection_name());
        assert!(short.collection_name().starts_with(NODE_COLLECTION_PREFIX));
    }

    #[test]
    fn test_slash_in_field_does_not_alias_nesting() {
        let slash = TreePath::root("D").child("a/b");
        let nested = TreePath::root("D").child("a").child("b");
        assert_ne!(slash, nested);
        assert_ne!(slash.collection_name(), nested.collection_name());
        assert_eq!(slash.segments(), vec!["D", "a/b"]);
    }

    #[test]
    fn test_percent_round_trips() {
        let path = TreePath::root("D").child("100%/x");
        assert_eq!(path.segments()[1], "100%/x");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(TreePath::parse("D//x").is_err());
        assert!(TreePath::parse("").is_err());
        assert_eq!(TreePath::parse("D/x").unwrap().domain(), "D");
    }
}

//! Domain names
//!
//! A domain is a caller-chosen collection name. Names starting with `__`
//! belong to index collections and are never accepted.

use std::fmt;

use crate::tree::{TreePath, NODE_COLLECTION_PREFIX};

use super::errors::{EngineError, EngineResult};

const MAX_DOMAIN_LEN: usize = 128;

/// Validated domain name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(String);

impl Domain {
    /// Validate a domain name
    pub fn parse(name: &str) -> EngineResult<Self> {
        if name.is_empty() {
            return Err(EngineError::validation("Domain name must not be empty"));
        }
        if name.len() > MAX_DOMAIN_LEN {
            return Err(EngineError::validation(format!(
                "Domain name exceeds {} bytes",
                MAX_DOMAIN_LEN
            )));
        }
        if name.starts_with("__") {
            return Err(EngineError::validation(format!(
                "Domain name '{}' uses the reserved '__' prefix",
                name
            )));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(EngineError::validation(format!(
                "Domain name '{}' contains invalid character '{}'",
                name, c
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Domain name; also the canonical collection name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity path of the domain
    pub fn identity_path(&self) -> TreePath {
        TreePath::identity(&self.0)
    }

    /// Collection holding the identity nodes
    pub fn identity_collection(&self) -> String {
        self.identity_path().collection_name()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a collection holds index nodes rather than documents
pub fn is_node_collection(name: &str) -> bool {
    name.starts_with(NODE_COLLECTION_PREFIX)
}

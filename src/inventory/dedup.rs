//! Deduplication of resolved paths
//!
//! The same table is often reachable through several configured connections.
//! The first path seen for a unique key is kept; later ones are dropped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::identity::{CanonicalIdentity, RawPathTuple};

/// A raw path paired with its resolved identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPath {
    pub identity: CanonicalIdentity,
    pub raw: RawPathTuple,
}

impl ResolvedPath {
    pub fn unique_key(&self) -> String {
        self.identity.unique_key()
    }
}

/// Keep the first occurrence of every unique key, preserving input order
pub fn deduplicate(paths: Vec<ResolvedPath>) -> Vec<ResolvedPath> {
    let mut seen = HashSet::with_capacity(paths.len());
    paths
        .into_iter()
        .filter(|path| seen.insert(path.unique_key()))
        .collect()
}

//! Inventory Walker Adapter
//!
//! Drives the external walker over each connection root, classifies every
//! child into a direct or dataset-nested path and drops infrastructure tables.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::enrich::call_with_timeout;
use super::identity::{split_last_segment, RawPathTuple};
use crate::error::InventoryResult;

/// Suffixes identifying a workspace container rather than a feature dataset
pub const WORKSPACE_SUFFIXES: &[&str] = &[".sde", ".gdb", ".mdb"];

/// Name fragments of attachment, topology and network system tables.
/// Matched case-sensitively against the raw object name.
pub const JUNK_NAME_FRAGMENTS: &[&str] = &[
    "_ATTACH",
    "ATTACHREL",
    "_TOPO",
    "_NETWORK",
    "N_1_DESC",
    "_BUILDERR",
    "_JUNCTIONS",
    "_DIRTYAREAS",
];

/// One container and the spatial objects directly inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkGroup {
    pub directory: String,
    pub children: Vec<String>,
}

/// Enumerates spatial-table containers beneath a connection root
#[async_trait]
pub trait InventoryWalker: Send + Sync {
    async fn walk(&self, connection_root: &str) -> InventoryResult<Vec<WalkGroup>>;
}

/// True when the object name is a system artifact rather than a feature class
pub fn is_junk(object_name: &str) -> bool {
    JUNK_NAME_FRAGMENTS
        .iter()
        .any(|fragment| object_name.contains(fragment))
}

fn is_workspace(directory: &str) -> bool {
    let lower = directory.trim_end_matches(['\\', '/']).to_lowercase();
    WORKSPACE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Classify a walker group into raw path tuples, dropping junk names
pub fn classify_group(group: &WalkGroup) -> Vec<RawPathTuple> {
    let workspace = is_workspace(&group.directory);
    group
        .children
        .iter()
        .filter(|child| {
            if is_junk(child) {
                debug!(object_name = %child, "Skipping infrastructure table");
                false
            } else {
                true
            }
        })
        .map(|child| {
            if workspace {
                RawPathTuple::direct(group.directory.clone(), child.clone())
            } else {
                let (root, dataset) = split_last_segment(&group.directory);
                RawPathTuple::nested(root, dataset, child.clone())
            }
        })
        .collect()
}

/// Summary of one walker pass
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub paths: Vec<RawPathTuple>,
    pub roots_walked: usize,
    pub roots_failed: usize,
}

pub struct WalkerAdapter<'a, W: InventoryWalker + ?Sized> {
    walker: &'a W,
    call_timeout: Duration,
}

impl<'a, W: InventoryWalker + ?Sized> WalkerAdapter<'a, W> {
    pub fn new(walker: &'a W, call_timeout: Duration) -> Self {
        Self {
            walker,
            call_timeout,
        }
    }

    /// Walk every root in order; a failing root is logged and skipped
    pub async fn collect(&self, connection_roots: &[String]) -> WalkOutcome {
        let mut outcome = WalkOutcome::default();

        for root in connection_roots {
            let walked = call_with_timeout(self.call_timeout, "walk", root, self.walker.walk(root));
            match walked.await {
                Ok(groups) => {
                    let before = outcome.paths.len();
                    for group in &groups {
                        outcome.paths.extend(classify_group(group));
                    }
                    outcome.roots_walked += 1;
                    info!(
                        connection_root = %root,
                        found = outcome.paths.len() - before,
                        "Walked connection"
                    );
                }
                Err(e) => {
                    outcome.roots_failed += 1;
                    warn!(connection_root = %root, error = %e, "Failed to walk connection");
                }
            }
        }

        outcome
    }
}

//! File-backed inventory backend
//!
//! Serves walker groups, describe facts and row counts from an inventory
//! export (YAML or JSON). Path and table lookups are case-insensitive.
//!
//! ```yaml
//! connections:
//!   "C:\\conns\\gis.sde":
//!     instance: "sde:oracle11g:gishost:GISPROD"
//!     containers:
//!       - directory: "C:\\conns\\gis.sde"
//!         children: ["OWNER.ROADS"]
//! objects:
//!   "C:\\conns\\gis.sde\\OWNER.ROADS": { category: FeatureClass, shape_type: Polyline, versioned: true }
//! counts:
//!   "C:\\conns\\gis.sde": { "OWNER.ROADS": 1200 }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::enrich::{MetadataProvider, RecordCounter};
use super::entity::{MetadataSnapshot, ObjectCategory};
use super::walker::{InventoryWalker, WalkGroup};
use crate::config::parse_structured;
use crate::error::{CatalogError, InventoryError, InventoryResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotConnection {
    pub instance: String,
    #[serde(default)]
    pub containers: Vec<WalkGroup>,
}

/// On-disk shape of an inventory export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub connections: BTreeMap<String, SnapshotConnection>,
    #[serde(default)]
    pub objects: BTreeMap<String, MetadataSnapshot>,
    #[serde(default)]
    pub counts: BTreeMap<String, BTreeMap<String, u64>>,
}

pub struct SnapshotInventory {
    connections: HashMap<String, SnapshotConnection>,
    objects: HashMap<String, MetadataSnapshot>,
    counts: HashMap<String, HashMap<String, u64>>,
}

fn normalize(path: &str) -> String {
    path.trim_end_matches(['\\', '/']).to_uppercase()
}

impl SnapshotInventory {
    pub fn from_snapshot(file: SnapshotFile) -> Self {
        Self {
            connections: file
                .connections
                .into_iter()
                .map(|(root, conn)| (normalize(&root), conn))
                .collect(),
            objects: file
                .objects
                .into_iter()
                .map(|(path, meta)| (normalize(&path), meta))
                .collect(),
            counts: file
                .counts
                .into_iter()
                .map(|(root, tables)| {
                    let tables = tables
                        .into_iter()
                        .map(|(table, n)| (table.to_uppercase(), n))
                        .collect();
                    (normalize(&root), tables)
                })
                .collect(),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: SnapshotFile =
            parse_structured(path, &content).map_err(|message| CatalogError::Parse {
                path: path.to_path_buf(),
                message,
            })?;
        Ok(Self::from_snapshot(file))
    }
}

#[async_trait]
impl InventoryWalker for SnapshotInventory {
    async fn walk(&self, connection_root: &str) -> InventoryResult<Vec<WalkGroup>> {
        self.connections
            .get(&normalize(connection_root))
            .map(|conn| conn.containers.clone())
            .ok_or_else(|| InventoryError::Walk {
                connection_root: connection_root.to_string(),
                reason: "connection not present in inventory snapshot".to_string(),
            })
    }
}

#[async_trait]
impl MetadataProvider for SnapshotInventory {
    async fn describe(&self, path: &str) -> InventoryResult<MetadataSnapshot> {
        let key = normalize(path);
        if let Some(conn) = self.connections.get(&key) {
            return Ok(MetadataSnapshot {
                category: ObjectCategory::Workspace,
                instance_id: Some(conn.instance.clone()),
                ..MetadataSnapshot::default()
            });
        }
        self.objects
            .get(&key)
            .cloned()
            .ok_or_else(|| InventoryError::Describe {
                path: path.to_string(),
                reason: "object not present in inventory snapshot".to_string(),
            })
    }

    async fn exists(&self, path: &str) -> InventoryResult<bool> {
        Ok(self.objects.contains_key(&normalize(path)))
    }
}

#[async_trait]
impl RecordCounter for SnapshotInventory {
    async fn count_rows(&self, connection_root: &str, table: &str) -> InventoryResult<u64> {
        self.counts
            .get(&normalize(connection_root))
            .and_then(|tables| tables.get(&table.to_uppercase()))
            .copied()
            .ok_or_else(|| InventoryError::Count {
                table: table.to_string(),
                reason: "no recorded count".to_string(),
            })
    }
}

//! Inventory entities and their derived facts

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::dedup::ResolvedPath;
use super::identity::{CanonicalIdentity, RawPathTuple};

/// Name fragments marking inspection/maintenance style event tables
pub const EVENT_KEYWORDS: &[&str] = &["INSPECT", "REPAIR", "MAINT", "EVENT", "BREAK", "INCIDENT"];

/// General category of a described object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectCategory {
    FeatureClass,
    Table,
    FeatureDataset,
    Workspace,
    #[default]
    #[serde(other)]
    Other,
}

/// The describe facts the pipeline actually consumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    #[serde(default)]
    pub category: ObjectCategory,
    #[serde(default)]
    pub shape_type: Option<String>,
    #[serde(default)]
    pub versioned: bool,
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// Row count of a table, or `Unknown` when every count attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordCount {
    Known(u64),
    Unknown,
}

impl RecordCount {
    /// Exactly zero rows; `Unknown` is never empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Known(0))
    }
}

impl fmt::Display for RecordCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(n) => write!(f, "{}", n),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Outcome of a best-effort lookup: the value found, or the fallback used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Fallback { value: T, reason: String },
}

impl<T: Clone> Lookup<T> {
    pub fn value(&self) -> T {
        match self {
            Self::Found(v) => v.clone(),
            Self::Fallback { value, .. } => value.clone(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// One unique inventoried object and its lazily computed facts.
///
/// The describe lookup happens once, when the entity is built; everything
/// else is cached on first computation and never re-queried.
#[derive(Debug)]
pub struct InventoryEntity {
    pub identity: CanonicalIdentity,
    pub raw: RawPathTuple,
    /// `Err` holds the reason the object could not be described
    pub metadata: Result<MetadataSnapshot, String>,
    pub(crate) record_count: OnceCell<Lookup<RecordCount>>,
    pub(crate) has_attachments: OnceCell<Lookup<bool>>,
}

impl InventoryEntity {
    pub fn new(resolved: ResolvedPath, metadata: Result<MetadataSnapshot, String>) -> Self {
        Self {
            identity: resolved.identity,
            raw: resolved.raw,
            metadata,
            record_count: OnceCell::new(),
            has_attachments: OnceCell::new(),
        }
    }

    pub fn unique_key(&self) -> String {
        self.identity.unique_key()
    }

    pub fn full_path(&self) -> String {
        self.raw.full_path()
    }

    pub fn dataset(&self) -> Option<&str> {
        self.raw.dataset.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.metadata.is_ok()
    }

    pub fn is_versioned(&self) -> bool {
        self.metadata.as_ref().map(|m| m.versioned).unwrap_or(false)
    }

    /// Name heuristic, no I/O
    pub fn is_event(&self) -> bool {
        let key = self.unique_key();
        EVENT_KEYWORDS.iter().any(|kw| key.contains(kw))
    }

    /// Geometry shape for feature classes; `None` for tables or unreadable objects
    pub fn geometry_type(&self) -> Lookup<Option<String>> {
        match &self.metadata {
            Ok(m) if m.category == ObjectCategory::FeatureClass => Lookup::Found(m.shape_type.clone()),
            Ok(m) => Lookup::Fallback {
                value: None,
                reason: format!("object is a {:?}, not a feature class", m.category),
            },
            Err(reason) => Lookup::Fallback {
                value: None,
                reason: reason.clone(),
            },
        }
    }

    /// Cached count, if already computed
    pub fn cached_record_count(&self) -> Option<&Lookup<RecordCount>> {
        self.record_count.get()
    }

    /// Cached attachment check, if already computed
    pub fn cached_has_attachments(&self) -> Option<&Lookup<bool>> {
        self.has_attachments.get()
    }
}

/// Plain snapshot of an enriched entity, input to card derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFacts {
    pub identity: CanonicalIdentity,
    pub dataset: Option<String>,
    pub record_count: RecordCount,
    pub geometry_type: Option<String>,
    pub has_attachments: bool,
    pub is_event: bool,
    pub is_versioned: bool,
    pub exists: bool,
}

impl EntityFacts {
    pub fn unique_key(&self) -> String {
        self.identity.unique_key()
    }
}

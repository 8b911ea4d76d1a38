//! Database inventory
//!
//! This module provides:
//! - Identity resolution from walker paths to DATABASE.OWNER.NAME keys
//! - The walker adapter with its infrastructure-table denylist
//! - First-wins deduplication across connections
//! - Entities with lazily enriched facts (counts, geometry, attachments)
//! - A file-backed backend for the walker/metadata/count collaborators

pub mod dedup;
pub mod enrich;
pub mod entity;
pub mod identity;
pub mod snapshot;
pub mod walker;

pub use dedup::{deduplicate, ResolvedPath};
pub use enrich::{Enricher, MetadataProvider, RecordCounter};
pub use entity::{
    EntityFacts, InventoryEntity, Lookup, MetadataSnapshot, ObjectCategory, RecordCount,
};
pub use identity::{CanonicalIdentity, IdentityResolver, RawPathTuple};
pub use snapshot::{SnapshotFile, SnapshotInventory};
pub use walker::{InventoryWalker, WalkGroup, WalkerAdapter};

//! Identity Resolution
//!
//! Turns walker path fragments into the canonical DATABASE.OWNER.NAME identity
//! used as the only merge/lookup key across the pipeline.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::enrich::{call_with_timeout, MetadataProvider};
use crate::error::{InventoryError, InventoryResult};

/// A spatial table location as reported by the walker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawPathTuple {
    pub connection_root: String,
    /// Feature dataset the object is nested in, if any
    pub dataset: Option<String>,
    /// Object name as stored in the database (OWNER.NAME)
    pub object_name: String,
}

impl RawPathTuple {
    /// An object sitting directly in the workspace
    pub fn direct(connection_root: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            connection_root: connection_root.into(),
            dataset: None,
            object_name: object_name.into(),
        }
    }

    /// An object nested one level inside a feature dataset
    pub fn nested(
        connection_root: impl Into<String>,
        dataset: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            connection_root: connection_root.into(),
            dataset: Some(dataset.into()),
            object_name: object_name.into(),
        }
    }

    /// Full path of the object, joined with the root's own separator
    pub fn full_path(&self) -> String {
        match &self.dataset {
            Some(dataset) => join_path(
                &join_path(&self.connection_root, dataset),
                &self.object_name,
            ),
            None => join_path(&self.connection_root, &self.object_name),
        }
    }
}

/// Canonical identity of an inventoried object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalIdentity {
    pub database: String,
    pub owner: String,
    pub name: String,
}

impl CanonicalIdentity {
    pub fn new(
        database: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// DATABASE.OWNER.NAME, uppercase
    pub fn unique_key(&self) -> String {
        format!("{}.{}.{}", self.database, self.owner, self.name).to_uppercase()
    }

    /// DATABASE.NAME, uppercase; the shape service layers are matched on
    pub fn service_key(&self) -> String {
        format!("{}.{}", self.database, self.name).to_uppercase()
    }
}

impl fmt::Display for CanonicalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unique_key())
    }
}

/// Split OWNER.NAME; anything but exactly one separator is malformed
pub fn split_owner_name(raw: &RawPathTuple) -> InventoryResult<(String, String)> {
    let mut parts = raw.object_name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(InventoryError::MalformedName {
            connection_root: raw.connection_root.clone(),
            object_name: raw.object_name.clone(),
        }),
    }
}

/// Reduce a connection instance id to the database name, the last `:`
/// segment: `sde:oracle11g:gishost:MYDB` gives `MYDB`
pub fn database_from_instance(instance: &str) -> String {
    instance
        .rsplit(':')
        .next()
        .unwrap_or(instance)
        .trim()
        .to_uppercase()
}

/// Resolves raw tuples to identities, describing each connection root once.
/// A failed root lookup is cached too, so later objects fail without a call.
pub struct IdentityResolver<'a, M: MetadataProvider + ?Sized> {
    metadata: &'a M,
    call_timeout: Duration,
    databases: HashMap<String, InventoryResult<String>>,
}

impl<'a, M: MetadataProvider + ?Sized> IdentityResolver<'a, M> {
    pub fn new(metadata: &'a M, call_timeout: Duration) -> Self {
        Self {
            metadata,
            call_timeout,
            databases: HashMap::new(),
        }
    }

    /// Database name for a connection root (cached per root, success or not)
    pub async fn database_for(&mut self, connection_root: &str) -> InventoryResult<String> {
        if let Some(cached) = self.databases.get(connection_root) {
            return cached.clone();
        }

        let database = self.lookup_database(connection_root).await;
        match &database {
            Ok(name) => debug!(connection_root, database = %name, "Resolved connection database"),
            Err(e) => warn!(connection_root, error = %e, "Connection database unavailable"),
        }

        self.databases
            .insert(connection_root.to_string(), database.clone());
        database
    }

    async fn lookup_database(&self, connection_root: &str) -> InventoryResult<String> {
        let snapshot = call_with_timeout(
            self.call_timeout,
            "describe",
            connection_root,
            self.metadata.describe(connection_root),
        )
        .await?;
        let instance = snapshot
            .instance_id
            .ok_or_else(|| InventoryError::Describe {
                path: connection_root.to_string(),
                reason: "connection reports no instance id".to_string(),
            })?;
        Ok(database_from_instance(&instance))
    }

    pub async fn resolve(&mut self, raw: &RawPathTuple) -> InventoryResult<CanonicalIdentity> {
        let (owner, name) = split_owner_name(raw)?;
        let database = self.database_for(&raw.connection_root).await?;
        Ok(CanonicalIdentity::new(
            database,
            owner.to_uppercase(),
            name.to_uppercase(),
        ))
    }

    /// Number of distinct connection roots looked up so far
    pub fn described_roots(&self) -> usize {
        self.databases.len()
    }
}

/// Join two path segments using the separator already present in `base`
pub fn join_path(base: &str, segment: &str) -> String {
    let sep = if base.contains('\\') { '\\' } else { '/' };
    let trimmed = base.trim_end_matches(['\\', '/']);
    format!("{}{}{}", trimmed, sep, segment)
}

/// Split a path into (parent, last segment), accepting either separator
pub fn split_last_segment(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches(['\\', '/']);
    match trimmed.rfind(['\\', '/']) {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

/// Cut a string to at most `limit` characters
pub fn truncate_identifier(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::entity::MetadataSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingMetadata {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetadataProvider for CountingMetadata {
        async fn describe(&self, path: &str) -> InventoryResult<MetadataSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(MetadataSnapshot {
                instance_id: Some(format!("sde:oracle11g:{}:mydb", path.len())),
                ..MetadataSnapshot::default()
            })
        }

        async fn exists(&self, _path: &str) -> InventoryResult<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_unique_key_is_uppercase_dot_joined() {
        let id = CanonicalIdentity::new("mydb", "Owner", "Roads");
        assert_eq!(id.unique_key(), "MYDB.OWNER.ROADS");
        assert_eq!(id.service_key(), "MYDB.ROADS");
    }

    #[test]
    fn test_split_owner_name_requires_single_dot() {
        let ok = RawPathTuple::direct("C:\\db.sde", "OWNER.ROADS");
        assert_eq!(
            split_owner_name(&ok).unwrap(),
            ("OWNER".to_string(), "ROADS".to_string())
        );

        for bad in ["ROADS", "DB.OWNER.ROADS", ".ROADS", "OWNER."] {
            let raw = RawPathTuple::direct("C:\\db.sde", bad);
            assert!(matches!(
                split_owner_name(&raw),
                Err(InventoryError::MalformedName { .. })
            ));
        }
    }

    #[test]
    fn test_database_from_instance_strips_host_port() {
        assert_eq!(database_from_instance("sde:oracle11g:gishost:MYDB"), "MYDB");
        assert_eq!(database_from_instance("mydb"), "MYDB");
        assert_eq!(database_from_instance("host:5151:gisprod"), "GISPROD");
    }

    #[test]
    fn test_full_path_uses_root_separator() {
        let direct = RawPathTuple::direct("C:\\db.sde", "OWNER.ROADS");
        assert_eq!(direct.full_path(), "C:\\db.sde\\OWNER.ROADS");

        let nested = RawPathTuple::nested("/data/db.gdb", "OWNER.Water", "OWNER.HYDRANTS");
        assert_eq!(nested.full_path(), "/data/db.gdb/OWNER.Water/OWNER.HYDRANTS");
    }

    #[test]
    fn test_split_last_segment() {
        assert_eq!(
            split_last_segment("C:\\db.sde\\OWNER.Water"),
            ("C:\\db.sde", "OWNER.Water")
        );
        assert_eq!(split_last_segment("/a/b/"), ("/a", "b"));
        assert_eq!(split_last_segment("plain"), ("", "plain"));
    }

    #[test]
    fn test_truncate_identifier() {
        assert_eq!(truncate_identifier("ABCDEFGH", 5), "ABCDE");
        assert_eq!(truncate_identifier("ABC", 5), "ABC");
    }

    #[tokio::test]
    async fn test_dataset_and_direct_tuples_share_unique_key() {
        let metadata = CountingMetadata {
            calls: AtomicUsize::new(0),
        };
        let mut resolver = IdentityResolver::new(&metadata, Duration::from_secs(30));

        let direct = RawPathTuple::direct("C:\\db.sde", "OWNER.ROADS");
        let nested = RawPathTuple::nested("C:\\db.sde", "OWNER.Transport", "OWNER.ROADS");

        let a = resolver.resolve(&direct).await.unwrap();
        let b = resolver.resolve(&nested).await.unwrap();
        assert_eq!(a.unique_key(), b.unique_key());
        assert_eq!(nested.dataset.as_deref(), Some("OWNER.Transport"));

        // One describe per connection root, not per object
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.described_roots(), 1);
    }

    struct FailingMetadata {
        calls: AtomicUsize,
        hang: bool,
    }

    #[async_trait]
    impl MetadataProvider for FailingMetadata {
        async fn describe(&self, path: &str) -> InventoryResult<MetadataSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(100_000)).await;
            }
            Err(InventoryError::Describe {
                path: path.to_string(),
                reason: "connection refused".to_string(),
            })
        }

        async fn exists(&self, _path: &str) -> InventoryResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_failed_root_described_once() {
        let metadata = FailingMetadata {
            calls: AtomicUsize::new(0),
            hang: false,
        };
        let mut resolver = IdentityResolver::new(&metadata, Duration::from_secs(30));

        for name in ["OWNER.A", "OWNER.B", "OWNER.C"] {
            let raw = RawPathTuple::direct("C:\\db.sde", name);
            assert!(matches!(
                resolver.resolve(&raw).await,
                Err(InventoryError::Describe { .. })
            ));
        }
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.described_roots(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_root_describe_times_out() {
        let metadata = FailingMetadata {
            calls: AtomicUsize::new(0),
            hang: true,
        };
        let mut resolver = IdentityResolver::new(&metadata, Duration::from_secs(30));

        let start = tokio::time::Instant::now();
        let result = resolver
            .resolve(&RawPathTuple::direct("C:\\db.sde", "OWNER.ROADS"))
            .await;

        assert!(matches!(result, Err(InventoryError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}

//! Entity Enricher
//!
//! Computes the derived facts of each inventory entity against the external
//! metadata and record-count collaborators. Every lookup is best-effort:
//! failures and timeouts resolve to a documented fallback, never an error.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::dedup::ResolvedPath;
use super::entity::{EntityFacts, InventoryEntity, Lookup, MetadataSnapshot, RecordCount};
use super::identity::{join_path, truncate_identifier, CanonicalIdentity};
use crate::config::EnrichmentConfig;
use crate::error::{InventoryError, InventoryResult};

/// Suffix of the versioned edit view the engine exposes for a table
pub const VERSIONED_VIEW_SUFFIX: &str = "_EVW";

/// Sibling-table suffixes that signal attachments on a feature class
pub const ATTACHMENT_SUFFIXES: &[&str] = &["__ATTACH", "__ATTACH_EVW", "Photos"];

/// Describes objects and checks their existence
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn describe(&self, path: &str) -> InventoryResult<MetadataSnapshot>;

    async fn exists(&self, path: &str) -> InventoryResult<bool>;
}

/// Executes row-count queries against a table or view
#[async_trait]
pub trait RecordCounter: Send + Sync {
    async fn count_rows(&self, connection_root: &str, table: &str) -> InventoryResult<u64>;
}

/// Run one external call under `limit`; expiry becomes `InventoryError::Timeout`
pub(crate) async fn call_with_timeout<T, F>(
    limit: Duration,
    operation: &str,
    path: &str,
    call: F,
) -> InventoryResult<T>
where
    F: Future<Output = InventoryResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(InventoryError::Timeout {
            operation: operation.to_string(),
            path: path.to_string(),
        }),
    }
}

/// Alternate count target: the name cut to the identifier limit, as the
/// versioned edit view when the table is versioned
pub fn fallback_count_table(identity: &CanonicalIdentity, versioned: bool, limit: usize) -> String {
    let name = if versioned {
        let room = limit.saturating_sub(VERSIONED_VIEW_SUFFIX.len());
        format!(
            "{}{}",
            truncate_identifier(&identity.name, room),
            VERSIONED_VIEW_SUFFIX
        )
    } else {
        truncate_identifier(&identity.name, limit)
    };
    format!("{}.{}", identity.owner, name)
}

/// Candidate attachment sibling names, the base name cut so that name plus
/// suffix fits the identifier limit
pub fn attachment_candidates(name: &str, limit: usize) -> Vec<String> {
    ATTACHMENT_SUFFIXES
        .iter()
        .map(|suffix| {
            let combined = name.chars().count() + suffix.len();
            if combined > limit {
                let room = limit.saturating_sub(suffix.len());
                format!("{}{}", truncate_identifier(name, room), suffix)
            } else {
                format!("{}{}", name, suffix)
            }
        })
        .collect()
}

pub struct Enricher<'a> {
    metadata: &'a dyn MetadataProvider,
    counter: &'a dyn RecordCounter,
    config: EnrichmentConfig,
}

impl<'a> Enricher<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        counter: &'a dyn RecordCounter,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            metadata,
            counter,
            config,
        }
    }

    /// Run an external call under the configured timeout
    async fn timed<T, F>(&self, operation: &str, path: &str, call: F) -> InventoryResult<T>
    where
        F: Future<Output = InventoryResult<T>>,
    {
        call_with_timeout(self.config.call_timeout(), operation, path, call).await
    }

    /// Build the entity, describing its full path once
    pub async fn materialize(&self, resolved: ResolvedPath) -> InventoryEntity {
        let path = resolved.raw.full_path();
        let metadata = self
            .timed("describe", &path, self.metadata.describe(&path))
            .await
            .map_err(|e| {
                warn!(unique_key = %resolved.identity, path = %path, error = %e, "Object could not be described");
                e.to_string()
            });
        InventoryEntity::new(resolved, metadata)
    }

    /// Row count, computed once per entity
    pub async fn record_count(&self, entity: &InventoryEntity) -> Lookup<RecordCount> {
        entity
            .record_count
            .get_or_init(|| self.compute_record_count(entity))
            .await
            .clone()
    }

    async fn compute_record_count(&self, entity: &InventoryEntity) -> Lookup<RecordCount> {
        let metadata = match &entity.metadata {
            Ok(m) => m,
            Err(reason) => {
                return Lookup::Fallback {
                    value: RecordCount::Unknown,
                    reason: reason.clone(),
                }
            }
        };

        let root = &entity.raw.connection_root;
        let primary = format!("{}.{}", entity.identity.owner, entity.identity.name);
        let first_error = match self
            .timed("count", &primary, self.counter.count_rows(root, &primary))
            .await
        {
            Ok(n) => return Lookup::Found(RecordCount::Known(n)),
            Err(e) => e,
        };

        let alternate = fallback_count_table(
            &entity.identity,
            metadata.versioned,
            self.config.identifier_limit,
        );
        debug!(
            unique_key = %entity.identity,
            alternate = %alternate,
            error = %first_error,
            "Retrying count against alternate name"
        );

        match self
            .timed("count", &alternate, self.counter.count_rows(root, &alternate))
            .await
        {
            Ok(n) => Lookup::Found(RecordCount::Known(n)),
            Err(e) => {
                warn!(unique_key = %entity.identity, error = %e, "Record count unknown");
                Lookup::Fallback {
                    value: RecordCount::Unknown,
                    reason: format!("{}; {}", first_error, e),
                }
            }
        }
    }

    /// Attachment presence, computed once per entity
    pub async fn has_attachments(&self, entity: &InventoryEntity) -> Lookup<bool> {
        entity
            .has_attachments
            .get_or_init(|| self.compute_has_attachments(entity))
            .await
            .clone()
    }

    async fn compute_has_attachments(&self, entity: &InventoryEntity) -> Lookup<bool> {
        if let Err(reason) = &entity.metadata {
            return Lookup::Fallback {
                value: false,
                reason: reason.clone(),
            };
        }

        let mut errors = Vec::new();
        for candidate in attachment_candidates(&entity.identity.name, self.config.identifier_limit)
        {
            let path = join_path(
                &entity.raw.connection_root,
                &format!("{}.{}", entity.identity.owner, candidate),
            );
            match self
                .timed("exists", &path, self.metadata.exists(&path))
                .await
            {
                Ok(true) => return Lookup::Found(true),
                Ok(false) => {}
                Err(e) => errors.push(e.to_string()),
            }
        }

        if errors.is_empty() {
            Lookup::Found(false)
        } else {
            Lookup::Fallback {
                value: false,
                reason: errors.join("; "),
            }
        }
    }

    /// Resolve every derived fact into a plain snapshot
    pub async fn facts(&self, entity: &InventoryEntity) -> EntityFacts {
        let record_count = self.record_count(entity).await.value();
        let has_attachments = self.has_attachments(entity).await.value();

        EntityFacts {
            identity: entity.identity.clone(),
            dataset: entity.raw.dataset.clone(),
            record_count,
            geometry_type: entity.geometry_type().value(),
            has_attachments,
            is_event: entity.is_event(),
            is_versioned: entity.is_versioned(),
            exists: entity.exists(),
        }
    }
}

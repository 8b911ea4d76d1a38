//! Pipeline Orchestrator
//!
//! connections -> walk -> resolve -> deduplicate -> keyword filter ->
//! enrich -> derive -> sort -> board. Individual objects, records and cards
//! fail on their own; the run always carries on with the rest.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::board::BoardSink;
use crate::catalog::{extract_auxiliary_layers, extract_services, CatalogMembership};
use crate::config::AppConfig;
use crate::derive::{sort_intents, CardDeriver, CardIntent};
use crate::error::{CatalogError, InventoryError};
use crate::inventory::{
    deduplicate, EntityFacts, Enricher, IdentityResolver, InventoryWalker, MetadataProvider,
    RecordCount, RecordCounter, ResolvedPath, WalkerAdapter,
};

/// Per-stage counts for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub connections_walked: usize,
    pub connections_failed: usize,
    pub raw_paths: usize,
    pub malformed: usize,
    pub unresolved: usize,
    pub unique_entities: usize,
    pub filtered_out: usize,
    pub unreadable: usize,
    pub unknown_counts: usize,
    pub cards_planned: usize,
    pub cards_posted: usize,
    pub card_failures: usize,
    pub checklists_posted: usize,
    pub checklist_failures: usize,
}

impl RunReport {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            ..Self::default()
        }
    }
}

/// The two side-catalog memberships, built once before enrichment
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub services: CatalogMembership,
    pub auxiliary: CatalogMembership,
}

impl Catalogs {
    pub fn load(config: &AppConfig) -> Result<Self, CatalogError> {
        let services = extract_services(
            config.catalogs.service_documents.as_slice(),
            &config.service_extraction.excluded_service_types,
            &config.filters,
        )?
        .membership;

        let auxiliary = match &config.catalogs.auxiliary_layers {
            Some(path) => extract_auxiliary_layers(path, &config.filters)?.membership,
            None => CatalogMembership::new(),
        };

        Ok(Self {
            services,
            auxiliary,
        })
    }
}

/// Case-insensitive keyword match on the object name; no filters keeps all
pub fn matches_keywords(name: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let name = name.to_lowercase();
    filters
        .iter()
        .any(|filter| name.contains(&filter.to_lowercase()))
}

/// Planned cards plus the report so far
#[derive(Debug)]
pub struct Plan {
    pub intents: Vec<CardIntent>,
    pub report: RunReport,
}

pub struct Pipeline<'a> {
    config: &'a AppConfig,
    walker: &'a dyn InventoryWalker,
    metadata: &'a dyn MetadataProvider,
    counter: &'a dyn RecordCounter,
    catalogs: Catalogs,
    deriver: CardDeriver,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        walker: &'a dyn InventoryWalker,
        metadata: &'a dyn MetadataProvider,
        counter: &'a dyn RecordCounter,
        catalogs: Catalogs,
        deriver: CardDeriver,
    ) -> Self {
        Self {
            config,
            walker,
            metadata,
            counter,
            catalogs,
            deriver,
        }
    }

    async fn resolve_all(&self, report: &mut RunReport) -> Vec<ResolvedPath> {
        let call_timeout = self.config.enrichment.call_timeout();
        let walked = WalkerAdapter::new(self.walker, call_timeout)
            .collect(&self.config.connection_roots())
            .await;
        report.connections_walked = walked.roots_walked;
        report.connections_failed = walked.roots_failed;
        report.raw_paths = walked.paths.len();

        let mut resolver = IdentityResolver::new(self.metadata, call_timeout);
        let mut resolved = Vec::with_capacity(walked.paths.len());
        for raw in walked.paths {
            match resolver.resolve(&raw).await {
                Ok(identity) => resolved.push(ResolvedPath { identity, raw }),
                Err(e @ InventoryError::MalformedName { .. }) => {
                    report.malformed += 1;
                    warn!(
                        connection_root = %raw.connection_root,
                        object_name = %raw.object_name,
                        error = %e,
                        "Skipping object with malformed name"
                    );
                }
                Err(e) => {
                    report.unresolved += 1;
                    warn!(path = %raw.full_path(), error = %e, "Skipping unresolvable object");
                }
            }
        }

        info!(
            raw = report.raw_paths,
            resolved = resolved.len(),
            malformed = report.malformed,
            "Resolved identities"
        );
        resolved
    }

    async fn enrich_all(&self, unique: Vec<ResolvedPath>) -> Vec<EntityFacts> {
        let enricher = Enricher::new(
            self.metadata,
            self.counter,
            self.config.enrichment.clone(),
        );
        let enricher = &enricher;

        stream::iter(unique)
            .map(|resolved| async move {
                let entity = enricher.materialize(resolved).await;
                enricher.facts(&entity).await
            })
            .buffered(self.config.enrichment.concurrency)
            .collect()
            .await
    }

    /// Walk, reconcile and derive every card without touching the board
    pub async fn plan(&self) -> Plan {
        let mut report = RunReport::start();

        let resolved = self.resolve_all(&mut report).await;
        let unique = deduplicate(resolved);
        report.unique_entities = unique.len();

        let (kept, dropped): (Vec<_>, Vec<_>) = unique
            .into_iter()
            .partition(|p| matches_keywords(&p.identity.name, &self.config.filters));
        report.filtered_out = dropped.len();
        info!(
            unique = report.unique_entities,
            kept = kept.len(),
            filtered_out = report.filtered_out,
            "Deduplicated and filtered entities"
        );

        let facts = self.enrich_all(kept).await;
        report.unreadable = facts.iter().filter(|f| !f.exists).count();
        report.unknown_counts = facts
            .iter()
            .filter(|f| f.record_count == RecordCount::Unknown)
            .count();
        info!(
            enriched = facts.len(),
            unreadable = report.unreadable,
            unknown_counts = report.unknown_counts,
            "Enriched entities"
        );

        let mut intents: Vec<CardIntent> = facts
            .iter()
            .map(|f| {
                self.deriver
                    .derive(f, &self.catalogs.services, &self.catalogs.auxiliary)
            })
            .collect();
        sort_intents(&mut intents);
        report.cards_planned = intents.len();

        Plan { intents, report }
    }

    /// Plan, then post each card followed by its checklists
    pub async fn sync(&self, sink: &dyn BoardSink) -> RunReport {
        let Plan {
            intents,
            mut report,
        } = self.plan().await;

        post_intents(sink, &self.config.board.list_id, &intents, &mut report).await;
        report.finished_at = Some(Utc::now());

        info!(
            posted = report.cards_posted,
            failed = report.card_failures,
            checklists = report.checklists_posted,
            "Board sync finished"
        );
        report
    }
}

/// Post cards in order; a failed card is logged and skipped
pub async fn post_intents(
    sink: &dyn BoardSink,
    list_id: &str,
    intents: &[CardIntent],
    report: &mut RunReport,
) {
    for intent in intents {
        let card_id = match sink
            .create_card(list_id, &intent.label_ids, &intent.name, &intent.description)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                report.card_failures += 1;
                warn!(unique_key = %intent.name, error = %e, "Failed to create card");
                continue;
            }
        };
        report.cards_posted += 1;

        for checklist in &intent.checklists {
            match sink
                .create_checklist(&card_id, &checklist.template_id, &checklist.name)
                .await
            {
                Ok(()) => report.checklists_posted += 1,
                Err(e) => {
                    report.checklist_failures += 1;
                    warn!(
                        unique_key = %intent.name,
                        checklist = %checklist.name,
                        error = %e,
                        "Failed to copy checklist"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_keywords_case_insensitive() {
        let filters = vec!["Hydr".to_string(), "valve".to_string()];
        assert!(matches_keywords("HYDRANTS", &filters));
        assert!(matches_keywords("Valves", &filters));
        assert!(!matches_keywords("ROADS", &filters));
        assert!(matches_keywords("ROADS", &[]));
    }

    #[test]
    fn test_catalogs_load_without_sources_is_empty() {
        let catalogs = Catalogs::load(&AppConfig::default()).unwrap();
        assert!(catalogs.services.is_empty());
        assert!(catalogs.auxiliary.is_empty());
    }

    #[test]
    fn test_report_starts_with_zero_counters() {
        let report = RunReport::start();
        assert!(report.finished_at.is_none());
        assert_eq!(report.raw_paths, 0);
        assert_eq!(report.cards_posted, 0);
        assert_eq!(report.card_failures, 0);
        assert!(report.started_at > DateTime::<Utc>::default());
    }
}

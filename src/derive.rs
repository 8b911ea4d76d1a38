//! Card Derivation
//!
//! Pure mapping from an enriched entity and the two catalog memberships to a
//! card intent: label slots, description text, checklist copies and the
//! presentation priority. No I/O happens here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::board::{BoardLabel, ChecklistTemplate};
use crate::catalog::CatalogMembership;
use crate::config::ChecklistConfig;
use crate::inventory::{CanonicalIdentity, EntityFacts, RecordCount};

/// The six boolean label slots a card can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSlot {
    Event,
    Attachments,
    Service,
    Empty,
    InDataset,
    Auxiliary,
}

impl LabelSlot {
    pub const ALL: [LabelSlot; 6] = [
        Self::Event,
        Self::Attachments,
        Self::Service,
        Self::Empty,
        Self::InDataset,
        Self::Auxiliary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Attachments => "attachments",
            Self::Service => "service",
            Self::Empty => "empty",
            Self::InDataset => "in_dataset",
            Self::Auxiliary => "auxiliary",
        }
    }

    pub fn default_color(&self) -> &'static str {
        match self {
            Self::Event => "red",
            Self::Attachments => "purple",
            Self::Service => "blue",
            Self::Empty => "black",
            Self::InDataset => "green",
            Self::Auxiliary => "yellow",
        }
    }
}

impl std::fmt::Display for LabelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which slots are true for an entity
pub fn active_slots(
    facts: &EntityFacts,
    services: &CatalogMembership,
    auxiliary: &CatalogMembership,
) -> Vec<LabelSlot> {
    LabelSlot::ALL
        .into_iter()
        .filter(|slot| match slot {
            LabelSlot::Event => facts.is_event,
            LabelSlot::Attachments => facts.has_attachments,
            LabelSlot::Service => services.contains(&facts.identity.service_key()),
            LabelSlot::Empty => facts.record_count.is_empty(),
            LabelSlot::InDataset => facts.dataset.is_some(),
            LabelSlot::Auxiliary => auxiliary.contains(&facts.identity.name),
        })
        .collect()
}

/// Slot -> board label id, resolved through the configured slot colours
#[derive(Debug, Clone, Default)]
pub struct LabelDefinitions {
    ids: BTreeMap<LabelSlot, String>,
}

impl LabelDefinitions {
    /// Match configured colours against the board's labels
    pub fn from_board(colors: &BTreeMap<LabelSlot, String>, labels: &[BoardLabel]) -> Self {
        let ids = colors
            .iter()
            .filter_map(|(slot, color)| {
                labels
                    .iter()
                    .find(|label| label.color.as_deref() == Some(color.as_str()))
                    .map(|label| (*slot, label.id.clone()))
            })
            .collect();
        Self { ids }
    }

    /// Offline definitions: each slot's colour stands in for its id
    pub fn from_colors(colors: &BTreeMap<LabelSlot, String>) -> Self {
        Self { ids: colors.clone() }
    }

    pub fn id_for(&self, slot: LabelSlot) -> Option<&str> {
        self.ids.get(&slot).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A checklist to copy from a board template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistCopy {
    pub template_id: String,
    pub name: String,
}

/// Everything needed to create one card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardIntent {
    pub identity: CanonicalIdentity,
    pub name: String,
    pub description: String,
    pub labels: Vec<LabelSlot>,
    pub label_ids: Vec<String>,
    pub checklists: Vec<ChecklistCopy>,
    /// Number of attached labels; ordering only
    pub priority: usize,
}

/// Card description text
pub fn describe(
    facts: &EntityFacts,
    services: &CatalogMembership,
    auxiliary: &CatalogMembership,
) -> String {
    let mut lines = vec![
        format!("Owner: {}", facts.identity.owner),
        format!("Dataset: {}", facts.dataset.as_deref().unwrap_or("None")),
        format!(
            "Geometry Type: {}",
            facts.geometry_type.as_deref().unwrap_or("None")
        ),
        format!("Versioned: {}", if facts.is_versioned { "Yes" } else { "No" }),
    ];

    // Zero is already carried by the empty label
    if facts.record_count != RecordCount::Known(0) {
        lines.push(format!("Record Count: {}", facts.record_count));
    }

    let sections = [
        ("Services", services.sources(&facts.identity.service_key())),
        ("Auxiliary Layers", auxiliary.sources(&facts.identity.name)),
    ];
    for (heading, sources) in sections {
        if let Some(sources) = sources.filter(|s| !s.is_empty()) {
            lines.push(String::new());
            lines.push(format!("{}:", heading));
            lines.extend(sources.iter().map(|source| format!("- {}", source)));
        }
    }

    lines.join("\n").trim_end().to_string()
}

/// Board checklists usable as templates: prefixed names, prefix stripped
pub fn template_copies(
    templates: &[ChecklistTemplate],
    config: &ChecklistConfig,
) -> Vec<ChecklistCopy> {
    templates
        .iter()
        .filter_map(|t| {
            t.name
                .strip_prefix(config.template_prefix.as_str())
                .map(|name| ChecklistCopy {
                    template_id: t.id.clone(),
                    name: name.trim().to_string(),
                })
        })
        .collect()
}

fn contains_marker(name: &str, marker: &str) -> bool {
    !marker.is_empty() && name.to_lowercase().contains(&marker.to_lowercase())
}

/// Template copies applicable to an entity
pub fn select_checklists(
    facts: &EntityFacts,
    copies: &[ChecklistCopy],
    config: &ChecklistConfig,
) -> Vec<ChecklistCopy> {
    copies
        .iter()
        .filter(|c| facts.is_event || !contains_marker(&c.name, &config.event_marker))
        .filter(|c| {
            !facts.record_count.is_empty() || !contains_marker(&c.name, &config.conversion_marker)
        })
        .cloned()
        .collect()
}

/// Derives card intents against fixed label definitions and templates
pub struct CardDeriver {
    labels: LabelDefinitions,
    templates: Vec<ChecklistCopy>,
    config: ChecklistConfig,
}

impl CardDeriver {
    pub fn new(
        labels: LabelDefinitions,
        templates: &[ChecklistTemplate],
        config: ChecklistConfig,
    ) -> Self {
        let templates = template_copies(templates, &config);
        Self {
            labels,
            templates,
            config,
        }
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn derive(
        &self,
        facts: &EntityFacts,
        services: &CatalogMembership,
        auxiliary: &CatalogMembership,
    ) -> CardIntent {
        let (labels, label_ids): (Vec<LabelSlot>, Vec<String>) =
            active_slots(facts, services, auxiliary)
                .into_iter()
                .filter_map(|slot| self.labels.id_for(slot).map(|id| (slot, id.to_string())))
                .unzip();

        CardIntent {
            identity: facts.identity.clone(),
            name: facts.unique_key(),
            description: describe(facts, services, auxiliary),
            priority: label_ids.len(),
            labels,
            label_ids,
            checklists: select_checklists(facts, &self.templates, &self.config),
        }
    }
}

/// Order by database, then most labels first; ties keep their order
pub fn sort_intents(intents: &mut [CardIntent]) {
    intents.sort_by(|a, b| {
        a.identity
            .database
            .cmp(&b.identity.database)
            .then_with(|| b.priority.cmp(&a.priority))
    });
}

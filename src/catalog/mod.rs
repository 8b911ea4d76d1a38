//! Side catalogs
//!
//! Two independently shaped definition sources are reduced to the same
//! shape: join key -> set of contributing source names.
//!
//! - `service`: map documents, keyed by DATABASE.NAME (no owner)
//! - `auxiliary`: auxiliary layer groups, keyed by object NAME only

pub mod auxiliary;
pub mod service;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

pub use auxiliary::extract_auxiliary_layers;
pub use service::{extract_services, ServiceExtractor};

/// Join key to the set of sources referencing it. Built once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogMembership {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl CatalogMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, source: impl Into<String>) {
        self.entries
            .entry(key.into().to_uppercase())
            .or_default()
            .insert(source.into());
    }

    pub fn sources(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(&key.to_uppercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sources(key).map(|s| !s.is_empty()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Keep only keys containing any filter term (case-insensitive).
    /// An empty filter list keeps everything.
    pub fn retain_keywords(mut self, filters: &[String]) -> Self {
        if filters.is_empty() {
            return self;
        }
        let terms: Vec<String> = filters.iter().map(|f| f.to_uppercase()).collect();
        self.entries
            .retain(|key, _| terms.iter().any(|term| key.contains(term.as_str())));
        self
    }
}

/// Outcome of a catalog extraction
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub membership: CatalogMembership,
    /// Records skipped because a required field was missing or mistyped
    pub skipped: usize,
}

/// Object name without any OWNER. prefix, uppercased
pub(crate) fn bare_object_name(value: &str) -> String {
    value
        .rsplit('.')
        .next()
        .unwrap_or(value)
        .trim()
        .to_uppercase()
}

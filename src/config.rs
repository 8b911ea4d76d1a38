//! Run Configuration
//!
//! Loads the connection list, keyword filters, side-catalog locations and
//! board settings from a YAML or JSON file. Board credentials come from the
//! environment, never from the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::derive::LabelSlot;
use crate::error::ConfigError;

pub const TRELLO_API_BASE: &str = "https://api.trello.com/1";
pub const API_KEY_VAR: &str = "TRELLO_API_KEY";
pub const API_TOKEN_VAR: &str = "TRELLO_API_TOKEN";

/// Root configuration for one inventory run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Connection roots grouped by environment name
    #[serde(default)]
    pub database_connections: BTreeMap<String, Vec<String>>,
    /// Keywords an object name must contain (any of); empty keeps everything
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub catalogs: CatalogSources,
    /// File-backed inventory export driving the walker/metadata/count backend
    #[serde(default)]
    pub inventory_snapshot: Option<PathBuf>,
    #[serde(default)]
    pub board: BoardConfig,
    /// Label slot to board label colour
    #[serde(default = "default_label_colors")]
    pub labels: BTreeMap<LabelSlot, String>,
    #[serde(default)]
    pub checklists: ChecklistConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub service_extraction: ServiceExtractionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSources {
    #[serde(default)]
    pub service_documents: Vec<PathBuf>,
    #[serde(default)]
    pub auxiliary_layers: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub list_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            board_id: String::new(),
            list_id: String::new(),
            api_base: default_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistConfig {
    /// Marks a board checklist as a template; stripped from the copied name
    #[serde(default = "default_template_prefix")]
    pub template_prefix: String,
    /// Templates containing this token only apply to event entities
    #[serde(default = "default_event_marker")]
    pub event_marker: String,
    /// Templates containing this token are dropped for empty entities
    #[serde(default = "default_conversion_marker")]
    pub conversion_marker: String,
}

impl Default for ChecklistConfig {
    fn default() -> Self {
        Self {
            template_prefix: default_template_prefix(),
            event_marker: default_event_marker(),
            conversion_marker: default_conversion_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Engine identifier length limit used when deriving alternate names
    #[serde(default = "default_identifier_limit")]
    pub identifier_limit: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl EnrichmentConfig {
    /// Limit applied to every external inventory call
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            identifier_limit: default_identifier_limit(),
            call_timeout_secs: default_call_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceExtractionConfig {
    #[serde(default = "default_excluded_service_types")]
    pub excluded_service_types: Vec<String>,
}

impl Default for ServiceExtractionConfig {
    fn default() -> Self {
        Self {
            excluded_service_types: default_excluded_service_types(),
        }
    }
}

/// Board key/token pair
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| ConfigError::MissingCredential(API_KEY_VAR.to_string()))?;
        let api_token = std::env::var(API_TOKEN_VAR)
            .map_err(|_| ConfigError::MissingCredential(API_TOKEN_VAR.to_string()))?;
        Ok(Self { api_key, api_token })
    }
}

impl AppConfig {
    /// Load from a YAML or JSON file (chosen by extension)
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config: Self =
            parse_structured(path, &content).map_err(|message| ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            })?;

        // Relative catalog paths are relative to the config file
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML string
    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// All connection roots in group order, duplicates kept
    pub fn connection_roots(&self) -> Vec<String> {
        self.database_connections
            .values()
            .flat_map(|roots| roots.iter().cloned())
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.enrichment.identifier_limit < 8 {
            return Err(ConfigError::Invalid(format!(
                "enrichment.identifier_limit must be at least 8, got {}",
                self.enrichment.identifier_limit
            )));
        }
        if self.enrichment.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "enrichment.concurrency must be at least 1".to_string(),
            ));
        }
        if self.checklists.template_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "checklists.template_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for doc in &mut self.catalogs.service_documents {
            rebase(doc);
        }
        if let Some(aux) = self.catalogs.auxiliary_layers.as_mut() {
            rebase(aux);
        }
        if let Some(snapshot) = self.inventory_snapshot.as_mut() {
            rebase(snapshot);
        }
    }
}

/// Parse YAML or JSON content, picking the format from the file extension
pub(crate) fn parse_structured<T: DeserializeOwned>(
    path: &Path,
    content: &str,
) -> Result<T, String> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }
}

fn default_api_base() -> String {
    TRELLO_API_BASE.to_string()
}

fn default_label_colors() -> BTreeMap<LabelSlot, String> {
    LabelSlot::ALL
        .iter()
        .map(|slot| (*slot, slot.default_color().to_string()))
        .collect()
}

fn default_template_prefix() -> String {
    "TEMPLATE: ".to_string()
}

fn default_event_marker() -> String {
    "beehive".to_string()
}

fn default_conversion_marker() -> String {
    "conversion".to_string()
}

fn default_identifier_limit() -> usize {
    30
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    8
}

fn default_excluded_service_types() -> Vec<String> {
    vec![
        "MapServer".to_string(),
        "ImageServer".to_string(),
        "WMS".to_string(),
    ]
}

//! Task board integration
//!
//! The pipeline only ever writes to the board through `BoardSink`; label and
//! checklist-template snapshots are read once per run.

pub mod trello;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use trello::TrelloClient;

/// A label defined on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardLabel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// A checklist on the board that may serve as a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistTemplate {
    pub id: String,
    pub name: String,
}

/// Write side of the task board
#[async_trait]
pub trait BoardSink: Send + Sync {
    /// Create a card and return its id
    async fn create_card(
        &self,
        list_id: &str,
        label_ids: &[String],
        name: &str,
        description: &str,
    ) -> Result<String>;

    /// Copy a template checklist onto a card
    async fn create_checklist(&self, card_id: &str, source_template_id: &str, name: &str)
        -> Result<()>;
}

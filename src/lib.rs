//! SDE-Trello - Spatial Database Inventory to Task Board
//!
//! Walks enterprise geodatabase connections, reconciles every spatial table
//! against the published map-service catalog and the auxiliary layer list,
//! and posts one labelled card per unique table to a Trello board.
//!
//! ## Pipeline
//! connections -> walk -> resolve identity -> deduplicate -> keyword filter
//! -> enrich (counts, geometry, attachments) -> derive card -> sort -> board
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sde_trello::config::AppConfig;
//! use sde_trello::derive::{CardDeriver, LabelDefinitions};
//! use sde_trello::inventory::SnapshotInventory;
//! use sde_trello::pipeline::{Catalogs, Pipeline};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AppConfig::load_from_file("inventory.yaml".as_ref())?;
//! let backend = SnapshotInventory::load_from_file("snapshot.yaml".as_ref())?;
//! let deriver = CardDeriver::new(
//!     LabelDefinitions::from_colors(&config.labels),
//!     &[],
//!     config.checklists.clone(),
//! );
//! let pipeline = Pipeline::new(
//!     &config,
//!     &backend,
//!     &backend,
//!     &backend,
//!     Catalogs::load(&config)?,
//!     deriver,
//! );
//! let plan = pipeline.plan().await;
//! println!("{} cards planned", plan.intents.len());
//! # Ok(())
//! # }
//! ```

// Error types
pub mod error;

// Run configuration and credentials
pub mod config;

// Database inventory: walking, identity, dedup, enrichment
pub mod inventory;

// Service and auxiliary side catalogs
pub mod catalog;

// Labels, description and checklists per entity
pub mod derive;

// Task board client
pub mod board;

// End-to-end orchestration
pub mod pipeline;

pub use config::AppConfig;
pub use error::{CatalogError, ConfigError, InventoryError};
pub use pipeline::{Catalogs, Pipeline, Plan, RunReport};

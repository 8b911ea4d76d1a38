//! Error types for the inventory pipeline
//!
//! Inventory and catalog failures are recoverable per object or per record;
//! the pipeline logs them and keeps going. Only configuration errors abort a run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving and enriching inventory entities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Malformed object name '{object_name}' under '{connection_root}': expected OWNER.NAME")]
    MalformedName {
        connection_root: String,
        object_name: String,
    },

    #[error("Unable to describe '{path}': {reason}")]
    Describe { path: String, reason: String },

    #[error("Unable to count rows in '{table}': {reason}")]
    Count { table: String, reason: String },

    #[error("Unable to walk '{connection_root}': {reason}")]
    Walk {
        connection_root: String,
        reason: String,
    },

    #[error("{operation} timed out for '{path}'")]
    Timeout { operation: String, path: String },
}

/// Errors raised while loading side-catalog definition files
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Errors raised while loading the run configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Missing credential: {0} environment variable not set")]
    MissingCredential(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type InventoryResult<T> = std::result::Result<T, InventoryError>;

//! Auxiliary-Layer Extractor
//!
//! Reads one document mapping a layer-group label to its member tables and
//! inverts it to table NAME -> labels. Members may be listed bare or as
//! OWNER.NAME; both join on the bare name.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use super::{bare_object_name, Extraction};
use crate::config::parse_structured;
use crate::error::CatalogError;

/// Layer-group label -> member table names, kept raw so a bad entry only
/// skips itself
pub type AuxiliaryDocument = BTreeMap<String, serde_json::Value>;

/// Invert an auxiliary layer document
pub fn invert_auxiliary(document: &AuxiliaryDocument, filters: &[String]) -> Extraction {
    let mut extraction = Extraction::default();

    for (label, members) in document {
        let Some(members) = members.as_array() else {
            extraction.skipped += 1;
            debug!(layer = %label, "Skipping layer group without a member list");
            continue;
        };
        for member in members {
            match member.as_str().map(bare_object_name) {
                Some(name) if !name.is_empty() => extraction.membership.insert(name, label.clone()),
                _ => {
                    extraction.skipped += 1;
                    debug!(layer = %label, member = %member, "Skipping malformed layer member");
                }
            }
        }
    }

    extraction.membership = extraction.membership.retain_keywords(filters);
    extraction
}

/// Load and invert the auxiliary layer definition file
pub fn extract_auxiliary_layers(path: &Path, filters: &[String]) -> Result<Extraction, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let document: AuxiliaryDocument =
        parse_structured(path, &content).map_err(|message| CatalogError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

    let extraction = invert_auxiliary(&document, filters);
    info!(
        layers = document.len(),
        tables = extraction.membership.len(),
        skipped = extraction.skipped,
        "Extracted auxiliary layer membership"
    );
    Ok(extraction)
}

//! Service Extractor
//!
//! Reads service definition documents: map document path -> dataframe name ->
//! list of layers. Each usable layer contributes its map document path to the
//! DATABASE.NAME key of the table it draws from.
//!
//! ```json
//! {
//!   "\\\\gisserver\\mxds\\Water.mxd": {
//!     "Layers": [
//!       {
//!         "name": "Hydrants",
//!         "isGroupLayer": false,
//!         "dataSource": "C:\\conns\\gis.sde\\OWNER.HYDRANTS",
//!         "serviceProperties": { "ServiceType": "SDE", "Service": "sde:oracle11g:WATER" }
//!       }
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{bare_object_name, Extraction};
use crate::config::parse_structured;
use crate::error::CatalogError;
use crate::inventory::identity::{database_from_instance, split_last_segment};

/// Map document path -> raw dataframe object (dataframe name -> layer list).
/// Kept untyped below the top level so a bad entry only skips itself.
pub type ServiceDocument = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct LayerRecord {
    #[serde(rename = "isGroupLayer", default)]
    is_group_layer: bool,
    #[serde(rename = "dataSource")]
    data_source: String,
    #[serde(rename = "serviceProperties")]
    service_properties: ServiceProperties,
}

#[derive(Debug, Deserialize)]
struct ServiceProperties {
    #[serde(rename = "ServiceType", default)]
    service_type: Option<String>,
    #[serde(rename = "Service")]
    service: String,
}

pub struct ServiceExtractor {
    excluded_service_types: Vec<String>,
}

impl ServiceExtractor {
    pub fn new(excluded_service_types: Vec<String>) -> Self {
        Self {
            excluded_service_types,
        }
    }

    fn is_excluded(&self, service_type: Option<&str>) -> bool {
        service_type
            .map(|t| {
                self.excluded_service_types
                    .iter()
                    .any(|ex| ex.eq_ignore_ascii_case(t))
            })
            .unwrap_or(false)
    }

    /// DATABASE.NAME key for one layer; `None` when the layer does not apply
    fn layer_key(&self, record: &LayerRecord) -> Option<String> {
        if record.is_group_layer || self.is_excluded(record.service_properties.service_type.as_deref())
        {
            return None;
        }
        let (_, table) = split_last_segment(&record.data_source);
        let name = bare_object_name(table);
        let database = database_from_instance(&record.service_properties.service);
        if name.is_empty() || database.is_empty() {
            return None;
        }
        Some(format!("{}.{}", database, name))
    }

    /// Fold one parsed document into the membership
    fn extract_document(&self, document: &ServiceDocument, extraction: &mut Extraction) {
        for (map_path, dataframes) in document {
            let Some(dataframes) = dataframes.as_object() else {
                extraction.skipped += 1;
                debug!(map_document = %map_path, "Skipping map document without dataframes");
                continue;
            };
            for (dataframe, layers) in dataframes {
                let Some(layers) = layers.as_array() else {
                    extraction.skipped += 1;
                    debug!(
                        map_document = %map_path,
                        dataframe = %dataframe,
                        "Skipping dataframe without a layer list"
                    );
                    continue;
                };
                for layer in layers {
                    match serde_json::from_value::<LayerRecord>(layer.clone()) {
                        Ok(record) => {
                            if let Some(key) = self.layer_key(&record) {
                                extraction.membership.insert(key, map_path.clone());
                            }
                        }
                        Err(e) => {
                            extraction.skipped += 1;
                            debug!(
                                map_document = %map_path,
                                dataframe = %dataframe,
                                error = %e,
                                "Skipping malformed layer"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Extract from in-memory documents
    pub fn extract_documents<'d>(
        &self,
        documents: impl IntoIterator<Item = &'d ServiceDocument>,
        filters: &[String],
    ) -> Extraction {
        let mut extraction = Extraction::default();
        for document in documents {
            self.extract_document(document, &mut extraction);
        }
        extraction.membership = extraction.membership.retain_keywords(filters);
        extraction
    }

    /// Extract from definition files; an unreadable file fails the whole call
    pub fn extract_files(
        &self,
        paths: &[impl AsRef<Path>],
        filters: &[String],
    ) -> Result<Extraction, CatalogError> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            let document: ServiceDocument =
                parse_structured(path, &content).map_err(|message| CatalogError::Parse {
                    path: path.to_path_buf(),
                    message,
                })?;
            documents.push(document);
        }

        let extraction = self.extract_documents(&documents, filters);
        if extraction.skipped > 0 {
            warn!(skipped = extraction.skipped, "Skipped malformed service entries");
        }
        info!(
            documents = documents.len(),
            tables = extraction.membership.len(),
            "Extracted service membership"
        );
        Ok(extraction)
    }
}

/// Extract service membership with the given exclusions and filters
pub fn extract_services(
    paths: &[impl AsRef<Path>],
    excluded_service_types: &[String],
    filters: &[String],
) -> Result<Extraction, CatalogError> {
    ServiceExtractor::new(excluded_service_types.to_vec()).extract_files(paths, filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: serde_json::Value) -> ServiceDocument {
        serde_json::from_value(value).unwrap()
    }

    fn extractor() -> ServiceExtractor {
        ServiceExtractor::new(vec!["MapServer".to_string(), "WMS".to_string()])
    }

    #[test]
    fn test_layer_keyed_by_database_and_name() {
        let doc = document(json!({
            "C:\\mxds\\Water.mxd": {
                "Layers": [{
                    "isGroupLayer": false,
                    "dataSource": "C:\\conns\\gis.sde\\HYDRANTS",
                    "serviceProperties": {"ServiceType": "SDE", "Service": "region:WATER"}
                }]
            }
        }));

        let extraction = extractor().extract_documents([&doc], &[]);
        let sources = extraction.membership.sources("WATER.HYDRANTS").unwrap();
        assert!(sources.contains("C:\\mxds\\Water.mxd"));
        assert_eq!(extraction.skipped, 0);
    }

    #[test]
    fn test_owner_prefix_dropped_from_key() {
        let doc = document(json!({
            "a.mxd": {"Layers": [{
                "dataSource": "C:\\gis.sde\\OWNER.Water\\OWNER.Valves",
                "serviceProperties": {"Service": "sde:oracle:water"}
            }]}
        }));

        let extraction = extractor().extract_documents([&doc], &[]);
        assert!(extraction.membership.contains("WATER.VALVES"));
    }

    #[test]
    fn test_group_and_excluded_layers_ignored() {
        let doc = document(json!({
            "a.mxd": {"Layers": [
                {"isGroupLayer": true, "dataSource": "x\\GROUPED",
                 "serviceProperties": {"Service": "db:WATER"}},
                {"dataSource": "x\\TILES",
                 "serviceProperties": {"ServiceType": "mapserver", "Service": "db:WATER"}}
            ]}
        }));

        let extraction = extractor().extract_documents([&doc], &[]);
        assert!(extraction.membership.is_empty());
        assert_eq!(extraction.skipped, 0);
    }

    #[test]
    fn test_malformed_layer_does_not_abort_document() {
        let doc = document(json!({
            "a.mxd": {"Layers": [
                {"name": "broken, no data source"},
                {"dataSource": "x\\PIPES", "serviceProperties": {}},
                {"dataSource": "x\\MAINS", "serviceProperties": {"Service": "db:WATER"}}
            ]}
        }));

        let extraction = extractor().extract_documents([&doc], &[]);
        assert_eq!(extraction.skipped, 2);
        assert!(extraction.membership.contains("WATER.MAINS"));
    }

    #[test]
    fn test_sources_accumulate_across_documents() {
        let layer = json!({"dataSource": "x\\MAINS", "serviceProperties": {"Service": "db:WATER"}});
        let a = document(json!({"a.mxd": {"Layers": [layer.clone()]}}));
        let b = document(json!({"b.mxd": {"Other": [layer]}}));

        let extraction = extractor().extract_documents([&a, &b], &["mains".to_string()]);
        assert_eq!(extraction.membership.sources("WATER.MAINS").unwrap().len(), 2);
    }

    #[test]
    fn test_extract_files_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.yaml");
        std::fs::write(
            &path,
            "Sewer.mxd:\n  Layers:\n    - dataSource: \"x/MANHOLES\"\n      serviceProperties:\n        Service: \"db:SEWER\"\n",
        )
        .unwrap();

        let extraction = extract_services(&[&path], &[], &[]).unwrap();
        assert!(extraction.membership.contains("SEWER.MANHOLES"));
    }

    #[test]
    fn test_null_dataframe_skipped_alongside_valid_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        std::fs::write(
            &path,
            r#"{
                "a.mxd": {
                    "Layers": [{"dataSource": "x\\MAINS", "serviceProperties": {"Service": "db:WATER"}}],
                    "Broken": null
                },
                "b.mxd": "not a dataframe map"
            }"#,
        )
        .unwrap();

        let extraction = extract_services(&[&path], &[], &[]).unwrap();
        assert!(extraction.membership.contains("WATER.MAINS"));
        assert_eq!(extraction.skipped, 2);
    }
}

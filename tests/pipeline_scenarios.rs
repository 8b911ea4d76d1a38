//! End-to-end pipeline scenarios over a file-backed inventory and a
//! recording board.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use sde_trello::board::{BoardSink, ChecklistTemplate};
use sde_trello::config::AppConfig;
use sde_trello::derive::{CardDeriver, LabelDefinitions, LabelSlot};
use sde_trello::inventory::{RecordCount, SnapshotFile, SnapshotInventory};
use sde_trello::pipeline::{Catalogs, Pipeline};

const SNAPSHOT: &str = r#"
connections:
  "C:\\conns\\a.sde":
    instance: "sde:oracle11g:gishost:MYDB"
    containers:
      - directory: "C:\\conns\\a.sde"
        children:
          - "OWNER.ROADS"
          - "OWNER.PARCELS"
          - "OWNER.PIPES__ATTACH"
          - "owner.pipes__attach"
          - "OWNER.HYDRANT_INSPECTIONS"
          - "NO_OWNER"
  "C:\\conns\\b.sde":
    instance: "sde:oracle11g:gishost:MYDB"
    containers:
      - directory: "C:\\conns\\b.sde\\OWNER.LAND"
        children: ["OWNER.PARCELS", "OWNER.ZONING"]
  "C:\\conns\\water.sde":
    instance: "sde:oracle11g:waterhost:WATER"
    containers:
      - directory: "C:\\conns\\water.sde"
        children: ["OWNER.HYDRANTS"]
objects:
  "C:\\conns\\a.sde\\OWNER.ROADS": { category: FeatureClass, shape_type: Polyline }
  "C:\\conns\\a.sde\\OWNER.PARCELS": { category: FeatureClass, shape_type: Polygon }
  "C:\\conns\\a.sde\\owner.pipes__attach": { category: Table }
  "C:\\conns\\a.sde\\OWNER.HYDRANT_INSPECTIONS": { category: Table }
  "C:\\conns\\b.sde\\OWNER.LAND\\OWNER.PARCELS": { category: FeatureClass, shape_type: Polygon }
  "C:\\conns\\b.sde\\OWNER.LAND\\OWNER.ZONING": { category: FeatureClass, shape_type: Polygon }
  "C:\\conns\\water.sde\\OWNER.HYDRANTS": { category: FeatureClass, shape_type: Point }
  "C:\\conns\\water.sde\\OWNER.HYDRANTS__ATTACH": { category: Table }
counts:
  "C:\\conns\\a.sde":
    "OWNER.ROADS": 1200
    "OWNER.PARCELS": 0
    "OWNER.PIPES__ATTACH": 4
    "OWNER.HYDRANT_INSPECTIONS": 0
  "C:\\conns\\b.sde":
    "OWNER.PARCELS": 99
    "OWNER.ZONING": 15
"#;

const SERVICE_DOC: &str = r#"{
  "\\\\gisserver\\mxds\\Water.mxd": {
    "Layers": [
      {
        "dataSource": "C:\\conns\\water.sde\\OWNER.HYDRANTS",
        "serviceProperties": { "ServiceType": "SDE", "Service": "sde:oracle11g:WATER" }
      }
    ]
  }
}"#;

fn inventory() -> SnapshotInventory {
    let file: SnapshotFile = serde_yaml::from_str(SNAPSHOT).unwrap();
    SnapshotInventory::from_snapshot(file)
}

fn config(extra: &str) -> AppConfig {
    let yaml = format!(
        r#"
database_connections:
  production:
    - "C:\\conns\\a.sde"
    - "C:\\conns\\b.sde"
  water:
    - "C:\\conns\\water.sde"
board:
  board_id: "board"
  list_id: "list"
{extra}
"#
    );
    AppConfig::load_from_str(&yaml).unwrap()
}

fn templates() -> Vec<ChecklistTemplate> {
    ["TEMPLATE: Beehive Review", "TEMPLATE: Data Conversion", "TEMPLATE: QA", "Sprint notes"]
        .iter()
        .enumerate()
        .map(|(i, name)| ChecklistTemplate {
            id: format!("t{}", i),
            name: name.to_string(),
        })
        .collect()
}

fn pipeline<'a>(
    config: &'a AppConfig,
    backend: &'a SnapshotInventory,
    catalogs: Catalogs,
) -> Pipeline<'a> {
    let deriver = CardDeriver::new(
        LabelDefinitions::from_colors(&config.labels),
        &templates(),
        config.checklists.clone(),
    );
    Pipeline::new(config, backend, backend, backend, catalogs, deriver)
}

#[derive(Default)]
struct RecordingBoard {
    fail_cards: Vec<String>,
    cards: Mutex<Vec<(String, Vec<String>)>>,
    checklists: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl BoardSink for RecordingBoard {
    async fn create_card(
        &self,
        _list_id: &str,
        label_ids: &[String],
        name: &str,
        _description: &str,
    ) -> Result<String> {
        if self.fail_cards.iter().any(|f| f == name) {
            return Err(anyhow!("board rejected {}", name));
        }
        let mut cards = self.cards.lock().unwrap();
        cards.push((name.to_string(), label_ids.to_vec()));
        Ok(format!("card-{}", cards.len()))
    }

    async fn create_checklist(
        &self,
        card_id: &str,
        source_template_id: &str,
        _name: &str,
    ) -> Result<()> {
        self.checklists
            .lock()
            .unwrap()
            .push((card_id.to_string(), source_template_id.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn direct_workspace_object_has_no_dataset() {
    let config = config("");
    let backend = inventory();
    let plan = pipeline(&config, &backend, Catalogs::default()).plan().await;

    let roads = plan
        .intents
        .iter()
        .find(|i| i.name == "MYDB.OWNER.ROADS")
        .unwrap();
    assert!(roads.description.contains("Dataset: None"));
    assert!(roads.description.contains("Record Count: 1200"));
    assert!(!roads.labels.contains(&LabelSlot::InDataset));
}

#[tokio::test]
async fn uppercase_attachment_tables_dropped_lowercase_kept() {
    let config = config("");
    let backend = inventory();
    let plan = pipeline(&config, &backend, Catalogs::default()).plan().await;

    let attach: Vec<_> = plan
        .intents
        .iter()
        .filter(|i| i.identity.name == "PIPES__ATTACH")
        .collect();
    assert_eq!(attach.len(), 1);
    assert_eq!(plan.report.malformed, 1);
}

#[tokio::test]
async fn service_membership_joins_on_database_and_name() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("services.json");
    std::fs::write(&doc, SERVICE_DOC).unwrap();

    let extra = format!(
        "catalogs:\n  service_documents:\n    - {:?}\n",
        doc.to_string_lossy()
    );
    let config = config(&extra);
    let catalogs = Catalogs::load(&config).unwrap();
    assert!(catalogs.services.contains("WATER.HYDRANTS"));

    let backend = inventory();
    let plan = pipeline(&config, &backend, catalogs).plan().await;

    let hydrants = plan
        .intents
        .iter()
        .find(|i| i.name == "WATER.OWNER.HYDRANTS")
        .unwrap();
    assert!(hydrants.labels.contains(&LabelSlot::Service));
    assert!(hydrants.labels.contains(&LabelSlot::Attachments));
    assert!(hydrants.description.contains("Services:\n- \\\\gisserver\\mxds\\Water.mxd"));
}

#[tokio::test]
async fn checklists_follow_event_and_empty_rules() {
    let config = config("");
    let backend = inventory();
    let plan = pipeline(&config, &backend, Catalogs::default()).plan().await;

    let names = |key: &str| -> Vec<String> {
        plan.intents
            .iter()
            .find(|i| i.name == key)
            .unwrap()
            .checklists
            .iter()
            .map(|c| c.name.clone())
            .collect()
    };

    // Non-event with rows
    assert_eq!(names("MYDB.OWNER.ROADS"), vec!["Data Conversion", "QA"]);
    // Event table with zero rows
    assert_eq!(names("MYDB.OWNER.HYDRANT_INSPECTIONS"), vec!["Beehive Review", "QA"]);
}

#[tokio::test]
async fn first_connection_wins_on_duplicate_identity() {
    let config = config("");
    let backend = inventory();
    let plan = pipeline(&config, &backend, Catalogs::default()).plan().await;

    let parcels: Vec<_> = plan
        .intents
        .iter()
        .filter(|i| i.name == "MYDB.OWNER.PARCELS")
        .collect();
    assert_eq!(parcels.len(), 1);
    assert!(parcels[0].description.contains("Dataset: None"));
    assert!(parcels[0].labels.contains(&LabelSlot::Empty));

    let zoning = plan
        .intents
        .iter()
        .find(|i| i.name == "MYDB.OWNER.ZONING")
        .unwrap();
    assert!(zoning.description.contains("Dataset: OWNER.LAND"));
    assert!(zoning.labels.contains(&LabelSlot::InDataset));
}

#[tokio::test]
async fn unknown_count_is_not_empty() {
    let config = config("");
    let backend = inventory();
    let plan = pipeline(&config, &backend, Catalogs::default()).plan().await;

    let hydrants = plan
        .intents
        .iter()
        .find(|i| i.name == "WATER.OWNER.HYDRANTS")
        .unwrap();
    assert!(!hydrants.labels.contains(&LabelSlot::Empty));
    assert!(hydrants.description.contains("Record Count: Unknown"));
    assert!(plan.report.unknown_counts >= 1);
    assert_ne!(RecordCount::Unknown, RecordCount::Known(0));
}

#[tokio::test]
async fn keyword_filter_keeps_matching_names_only() {
    let config = config("filters: [\"road\", \"Zon\"]\n");
    let backend = inventory();
    let plan = pipeline(&config, &backend, Catalogs::default()).plan().await;

    let mut names: Vec<_> = plan.intents.iter().map(|i| i.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["MYDB.OWNER.ROADS", "MYDB.OWNER.ZONING"]);
    assert!(plan.report.filtered_out > 0);
}

#[tokio::test]
async fn keyword_filter_ignores_owner_database_dataset_and_path() {
    // Each filter appears in a database, owner, dataset or root, never a name
    let config = config("filters: [\"MYDB\", \"water\", \"owner\", \"LAND\", \"conns\"]\n");
    let backend = inventory();
    let plan = pipeline(&config, &backend, Catalogs::default()).plan().await;

    assert!(plan.intents.is_empty());
    assert!(plan.report.unique_entities > 0);
    assert_eq!(plan.report.filtered_out, plan.report.unique_entities);
}

#[tokio::test]
async fn cards_sorted_by_database_then_label_count() {
    let config = config("");
    let backend = inventory();
    let plan = pipeline(&config, &backend, Catalogs::default()).plan().await;

    let databases: Vec<_> = plan
        .intents
        .iter()
        .map(|i| i.identity.database.as_str())
        .collect();
    let mut sorted = databases.clone();
    sorted.sort();
    assert_eq!(databases, sorted);

    for pair in plan.intents.windows(2) {
        if pair[0].identity.database == pair[1].identity.database {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }
}

#[tokio::test]
async fn failed_card_does_not_stop_the_run() {
    let config = config("");
    let backend = inventory();
    let board = RecordingBoard {
        fail_cards: vec!["MYDB.OWNER.ROADS".to_string()],
        ..RecordingBoard::default()
    };

    let report = pipeline(&config, &backend, Catalogs::default())
        .sync(&board)
        .await;

    assert_eq!(report.card_failures, 1);
    assert_eq!(report.cards_posted, report.cards_planned - 1);
    assert!(report.finished_at.is_some());

    let cards = board.cards.lock().unwrap();
    assert!(cards.iter().all(|(name, _)| name != "MYDB.OWNER.ROADS"));
    assert_eq!(
        board.checklists.lock().unwrap().len(),
        report.checklists_posted
    );
}

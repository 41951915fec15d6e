//! End-to-end ingestion against the in-memory store

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use cie_ingest::rules::{Rule, RuleEngine};
use cie_ingest::{
    EventConfig, EventRegistry, IngestError, IngestionService, MemoryStore, Outcome, ScalarValue,
};
use common::*;
use serde_json::json;
use std::sync::Arc;

fn service(store: MemoryStore) -> IngestionService<MemoryStore> {
    IngestionService::builder(store, avs_registry()).build()
}

fn rules(yaml: &str) -> Vec<Rule> {
    serde_yaml::from_str(yaml).unwrap()
}

#[tokio::test]
async fn test_minimal_event_writes_main_row() {
    init_test_tracing();
    let store = MemoryStore::new().with_table("SEND_TRANSACTIONS", &["TRAN_ID", "TRAN_TYPE"]);
    let service = IngestionService::builder(store.clone(), minimal_registry()).build();

    let raw = envelope("AVS", json!({ "avsTranId": "T1", "transactionType": "AVS" }));
    let report = service.ingest(&raw).await.unwrap();

    assert_eq!(report.outcome, Outcome::Ingested);
    assert_eq!(report.event_id.as_deref(), Some("evt-001"));
    assert_eq!(report.parent_id.as_deref(), Some("T1"));
    assert_eq!(report.rows_inserted, 1);

    let rows = store.rows("SEND_TRANSACTIONS");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("TRAN_ID"), Some(&ScalarValue::from("T1")));
    assert_eq!(rows[0].get("TRAN_TYPE"), Some(&ScalarValue::from("AVS")));
}

#[tokio::test]
async fn test_missing_mandatory_field_writes_nothing() {
    init_test_tracing();
    let store = MemoryStore::new().with_table("SEND_TRANSACTIONS", &["TRAN_ID", "TRAN_TYPE"]);
    let service = IngestionService::builder(store.clone(), minimal_registry()).build();

    let raw = envelope("AVS", json!({ "avsTranId": "T1" }));
    let failure = service.ingest(&raw).await.unwrap_err();

    assert_eq!(failure.event_id, "evt-001");
    assert_eq!(failure.event_name, "AVS");
    assert!(matches!(
        &failure.error,
        IngestError::MissingMandatoryField { table, column } if table == "AVS" && column == "TRAN_TYPE"
    ));
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn test_blank_mandatory_value_counts_as_missing() {
    let store = MemoryStore::new().with_table("SEND_TRANSACTIONS", &["TRAN_ID", "TRAN_TYPE"]);
    let service = IngestionService::builder(store.clone(), minimal_registry()).build();

    let raw = envelope("AVS", json!({ "avsTranId": "T1", "transactionType": "   " }));
    let failure = service.ingest(&raw).await.unwrap_err();

    assert_eq!(failure.error.code(), "MISSING_MANDATORY_FIELD");
    assert_eq!(failure.error.column(), Some("TRAN_TYPE"));
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn test_full_hierarchy_with_address_fanout() {
    init_test_tracing();
    let store = avs_store();
    let service = service(store.clone());

    let report = service.ingest(&envelope("AVS", avs_payload())).await.unwrap();

    assert_eq!(report.rows_inserted, 4);
    assert_eq!(report.duplicates_skipped, 0);
    let per_table: Vec<_> = report
        .tables
        .iter()
        .map(|t| (t.logical_key.as_str(), t.rows_inserted))
        .collect();
    assert_eq!(per_table, vec![("AVS", 1), ("AVS_RECIPIENT", 1), ("AVS_ADDR", 2)]);

    let main = &store.rows("SEND_TRANSACTIONS")[0];
    assert_eq!(main.get("AMOUNT"), Some(&ScalarValue::Float(125.5)));
    assert!(matches!(main.get("CRTE_DT"), Some(ScalarValue::Timestamp(_))));

    let recipient = &store.rows("SEND_RECIPIENTS")[0];
    assert_eq!(recipient.get("TRAN_ID"), Some(&ScalarValue::from("T1")));
    assert_eq!(recipient.get("FIRST_NAME"), Some(&ScalarValue::from("Ann")));
    assert!(!recipient.is_blank("ID"));

    let addresses = store.rows("SEND_ADDRESSES");
    assert_eq!(addresses.len(), 2);
    let mut cities: Vec<_> = addresses
        .iter()
        .map(|r| r.get("CITY").and_then(ScalarValue::as_str).unwrap().to_string())
        .collect();
    cities.sort();
    assert_eq!(cities, vec!["LA", "NY"]);
    for row in &addresses {
        assert_eq!(row.get("PARENT_ID"), Some(&ScalarValue::from("T1")));
        assert_eq!(row.get("ADDR_TYPE"), Some(&ScalarValue::from("HOME")));
    }
    assert_ne!(addresses[0].get("ID"), addresses[1].get("ID"));
}

#[tokio::test]
async fn test_schema_drift_drops_unknown_columns_until_cache_cleared() {
    init_test_tracing();
    let store = MemoryStore::new().with_table("SEND_TRANSACTIONS", &["TRAN_ID", "TRAN_TYPE", "CRTE_DT"]);
    let event: EventConfig = serde_yaml::from_str(AVS_EVENT_YAML).unwrap();
    let main_only = EventConfig {
        tables: vec![event.tables[0].clone()],
        ..event
    };
    let registry = Arc::new(EventRegistry::builder().event(main_only).build().unwrap());
    let service = IngestionService::builder(store.clone(), registry).build();

    service.ingest(&envelope("AVS", avs_payload())).await.unwrap();
    let row = &store.rows("SEND_TRANSACTIONS")[0];
    assert!(row.get("AMOUNT").is_none());
    assert_eq!(row.get("TRAN_ID"), Some(&ScalarValue::from("T1")));

    // migration lands; cached catalog still hides the new column
    store.add_column("SEND_TRANSACTIONS", "AMOUNT");
    let mut payload = avs_payload();
    payload["avsTranId"] = json!("T2");
    service.ingest(&envelope("AVS", payload)).await.unwrap();
    assert!(store.rows("SEND_TRANSACTIONS")[1].get("AMOUNT").is_none());

    service.clear_cache();
    let mut payload = avs_payload();
    payload["avsTranId"] = json!("T3");
    service.ingest(&envelope("AVS", payload)).await.unwrap();
    assert_eq!(
        store.rows("SEND_TRANSACTIONS")[2].get("AMOUNT"),
        Some(&ScalarValue::Float(125.5))
    );
}

#[tokio::test]
async fn test_catalog_read_once_per_table() {
    let store = avs_store();
    let service = service(store.clone());

    for id in ["T1", "T2", "T3"] {
        let mut payload = avs_payload();
        payload["avsTranId"] = json!(id);
        service.ingest(&envelope("AVS", payload)).await.unwrap();
    }
    assert_eq!(store.introspection_count(), 3);

    service.clear_cache();
    let mut payload = avs_payload();
    payload["avsTranId"] = json!("T4");
    service.ingest(&envelope("AVS", payload)).await.unwrap();
    assert_eq!(store.introspection_count(), 6);
}

#[tokio::test]
async fn test_redelivery_is_absorbed_as_duplicates() {
    init_test_tracing();
    let store = avs_store();
    let service = service(store.clone());
    let raw = envelope("AVS", avs_payload());

    service.ingest(&raw).await.unwrap();
    let again = service.ingest(&raw).await.unwrap();

    assert_eq!(again.outcome, Outcome::Ingested);
    assert_eq!(again.rows_inserted, 0);
    assert_eq!(again.duplicates_skipped, 4);
    assert_eq!(store.total_rows(), 4);
}

#[tokio::test]
async fn test_failure_in_later_table_rolls_back_earlier_rows() {
    init_test_tracing();
    let store = avs_store();
    store.fail_inserts_into("SEND_ADDRESSES", "disk full");
    let service = service(store.clone());

    let failure = service.ingest(&envelope("AVS", avs_payload())).await.unwrap_err();

    assert_eq!(failure.error.code(), "STORE_FAILURE");
    assert_eq!(failure.error.table(), Some("AVS_ADDR"));
    assert!(failure.to_string().contains("disk full"));
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn test_mandatory_failure_in_detail_rolls_back_main() {
    let mut event: EventConfig = serde_yaml::from_str(AVS_EVENT_YAML).unwrap();
    event.tables[1].mandatory_columns = vec!["FIRST_NAME".into()];
    let registry = Arc::new(EventRegistry::builder().event(event).build().unwrap());
    let store = avs_store();
    let service = IngestionService::builder(store.clone(), registry).build();

    let mut payload = avs_payload();
    payload.as_object_mut().unwrap().remove("recipient");
    let failure = service.ingest(&envelope("AVS", payload)).await.unwrap_err();

    assert_eq!(failure.error.table(), Some("AVS_RECIPIENT"));
    assert_eq!(failure.error.column(), Some("FIRST_NAME"));
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn test_no_insertable_columns() {
    let store = MemoryStore::new().with_table("SEND_TRANSACTIONS", &["UNRELATED"]);
    let service = IngestionService::builder(store.clone(), minimal_registry()).build();

    let raw = envelope("AVS", json!({ "avsTranId": "T1", "transactionType": "AVS" }));
    let failure = service.ingest(&raw).await.unwrap_err();

    assert!(matches!(
        &failure.error,
        IngestError::NoInsertableColumns { table } if table == "AVS"
    ));
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn test_unknown_event_type() {
    let store = avs_store();
    let service = service(store.clone());

    let failure = service
        .ingest(&envelope("UNKNOWN_EVT", json!({ "x": 1 })))
        .await
        .unwrap_err();

    assert!(matches!(&failure.error, IngestError::UnknownEventType(name) if name == "UNKNOWN_EVT"));
    assert_eq!(failure.event_name, "UNKNOWN_EVT");
    assert_eq!(failure.event_id, "evt-001");
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn test_malformed_envelopes() {
    let service = service(avs_store());

    let failure = service.ingest("not json at all").await.unwrap_err();
    assert_eq!(failure.error.code(), "MALFORMED_ENVELOPE");
    assert_eq!(failure.event_id, "");

    let raw = json!({ "eventName": "AVS", "eventId": "e9", "eventPayload": "{broken" }).to_string();
    let failure = service.ingest(&raw).await.unwrap_err();
    assert_eq!(failure.error.code(), "MALFORMED_ENVELOPE");
    assert_eq!(failure.event_id, "e9");
    assert_eq!(failure.event_name, "AVS");

    let raw = json!({ "eventId": "e10", "eventPayload": "{}" }).to_string();
    let failure = service.ingest(&raw).await.unwrap_err();
    assert_eq!(failure.error.code(), "MALFORMED_ENVELOPE");
}

#[tokio::test]
async fn test_embedded_payload_object_is_accepted() {
    let store = MemoryStore::new().with_table("SEND_TRANSACTIONS", &["TRAN_ID", "TRAN_TYPE"]);
    let service = IngestionService::builder(store.clone(), minimal_registry()).build();

    let raw = json!({
        "eventName": "AVS",
        "eventPayload": { "avsTranId": "T1", "transactionType": "AVS" }
    })
    .to_string();
    let report = service.ingest(&raw).await.unwrap();

    assert_eq!(report.event_id, None);
    assert_eq!(store.row_count("SEND_TRANSACTIONS"), 1);
}

#[tokio::test]
async fn test_rejected_event_is_filtered_without_writes() {
    init_test_tracing();
    let engine = RuleEngine::new().with_rules(
        "AVS",
        rules(
            r#"
- name: drop-avs-service
  when:
    equals: { fact: eventSource, value: AVS_SERVICE }
  then: [reject]
"#,
        ),
    );
    let store = avs_store();
    let service = IngestionService::builder(store.clone(), avs_registry())
        .rules(engine)
        .build();

    let report = service.ingest(&envelope("AVS", avs_payload())).await.unwrap();

    assert_eq!(report.outcome, Outcome::Filtered);
    assert_eq!(report.rows_inserted, 0);
    assert!(report.tables.is_empty());
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn test_filtered_unknown_type_is_not_an_error() {
    let engine = RuleEngine::new().with_rules(
        "NOT_CONFIGURED",
        rules(
            r#"
- name: drop-all
  when: always
  then: [reject]
"#,
        ),
    );
    let service = IngestionService::builder(avs_store(), avs_registry())
        .rules(engine)
        .build();

    let report = service.ingest(&envelope("NOT_CONFIGURED", json!({}))).await.unwrap();
    assert_eq!(report.outcome, Outcome::Filtered);
}

#[tokio::test]
async fn test_rules_normalize_payload_before_mapping() {
    let engine = RuleEngine::new().with_rules(
        "AVS",
        rules(
            r#"
- name: default-transaction-type
  when:
    payloadMissing: { path: $.transactionType }
  then:
    - setPayloadField: { path: $.transactionType, value: AVS }
"#,
        ),
    );
    let store = MemoryStore::new().with_table("SEND_TRANSACTIONS", &["TRAN_ID", "TRAN_TYPE"]);
    let service = IngestionService::builder(store.clone(), minimal_registry())
        .rules(engine)
        .build();

    let raw = envelope("AVS", json!({ "avsTranId": "T1" }));
    service.ingest(&raw).await.unwrap();

    assert_eq!(
        store.rows("SEND_TRANSACTIONS")[0].get("TRAN_TYPE"),
        Some(&ScalarValue::from("AVS"))
    );
}

#[tokio::test]
async fn test_parent_id_generated_when_no_key_column() {
    let yaml = r#"
eventName: PROFILE
tables:
  - logicalKey: PROFILE
    order: 1
    kind: main
    columnMapping:
      NAME: $.name
  - logicalKey: PROFILE_ADDR
    order: 2
    kind: address
    addressRules:
      - type: MAILING
        rootPath: $.mailing
        fieldMapping:
          CITY: city
"#;
    let event: EventConfig = serde_yaml::from_str(yaml).unwrap();
    let registry = Arc::new(EventRegistry::builder().event(event).build().unwrap());
    let store = MemoryStore::new()
        .with_table("PROFILE", &["NAME"])
        .with_table("PROFILE_ADDR", &["ID", "PARENT_ID", "ADDR_TYPE", "CITY"]);
    let service = IngestionService::builder(store.clone(), registry).build();

    let raw = envelope("PROFILE", json!({ "name": "Ann", "mailing": { "city": "Oslo" } }));
    let report = service.ingest(&raw).await.unwrap();

    let parent = report.parent_id.unwrap();
    assert_eq!(parent.len(), 36);
    let address = &store.rows("PROFILE_ADDR")[0];
    assert_eq!(address.get("PARENT_ID"), Some(&ScalarValue::from(parent.as_str())));
    assert_eq!(address.get("ADDR_TYPE"), Some(&ScalarValue::from("MAILING")));
    assert_eq!(address.get("CITY"), Some(&ScalarValue::from("Oslo")));
}

#[tokio::test]
async fn test_inline_address_rules_override_event_set() {
    let mut event: EventConfig = serde_yaml::from_str(AVS_EVENT_YAML).unwrap();
    event.tables[2].address_rules = serde_yaml::from_str(
        r#"
- type: BILLING
  rootPath: $.billing
  fieldMapping:
    CITY: city
"#,
    )
    .unwrap();
    let addresses = serde_yaml::from_str(AVS_ADDR_YAML).unwrap();
    let registry = Arc::new(
        EventRegistry::builder()
            .event(event)
            .address_rules(addresses)
            .build()
            .unwrap(),
    );
    let store = avs_store();
    let service = IngestionService::builder(store.clone(), registry).build();

    let mut payload = avs_payload();
    payload["billing"] = json!({ "city": "Boston" });
    service.ingest(&envelope("AVS", payload)).await.unwrap();

    let rows = store.rows("SEND_ADDRESSES");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("ADDR_TYPE"), Some(&ScalarValue::from("BILLING")));
    assert_eq!(rows[0].get("CITY"), Some(&ScalarValue::from("Boston")));
}

#[tokio::test]
async fn test_missing_address_root_writes_no_address_rows() {
    let store = avs_store();
    let service = service(store.clone());

    let mut payload = avs_payload();
    payload["addresses"] = json!(null);
    let report = service.ingest(&envelope("AVS", payload)).await.unwrap();

    assert_eq!(report.rows_inserted, 2);
    assert_eq!(store.row_count("SEND_ADDRESSES"), 0);
}

#[tokio::test]
async fn test_shipped_configuration_ingests_demo_event() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let config = cie_ingest::load_config(&root.join("config")).unwrap();
    let store = MemoryStore::from_registry(&config.registry, &config.policy);
    let service = IngestionService::from_config(store.clone(), config);

    let raw = std::fs::read_to_string(root.join("demos/avs_event.json")).unwrap();
    let report = service.ingest(&raw).await.unwrap();

    assert_eq!(report.outcome, Outcome::Ingested);
    assert_eq!(report.rows_inserted, 3);
    assert_eq!(
        store.rows("SEND_TRANSACTIONS")[0].get("TRAN_TYPE"),
        Some(&ScalarValue::from("AVS"))
    );
    assert_eq!(
        store.rows("SEND_ADDRESSES")[0].get("LINE1"),
        Some(&ScalarValue::from("1 Main St"))
    );
    let statements = store.executed_statements();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("INSERT INTO SEND_TRANSACTIONS"));

    let load_test = raw.replace("AVS_SERVICE", "LOAD_TEST").replace("evt-0001", "evt-0002");
    let report = service.ingest(&load_test).await.unwrap();
    assert_eq!(report.outcome, Outcome::Filtered);
    assert_eq!(store.total_rows(), 3);
}

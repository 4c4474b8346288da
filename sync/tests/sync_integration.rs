use errors::{ErrorKind, StoreKind};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use proposal_core::{
    DocumentRecord, ProposalId, RecordPairState, RelationalRow, SyncDirection, SyncOperation
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sync::{ConsistencyValidator, DifferenceDetector, SyncOrchestrator, SyncSettings};
use testing::{
    InMemoryDocumentRepository, InMemoryLeaseProvider, InMemoryRecordRepository,
    RecordingSyncLog
};

struct Harness {
    records: Arc<InMemoryRecordRepository>,
    documents: Arc<InMemoryDocumentRepository>,
    log: Arc<RecordingSyncLog>,
    orchestrator: SyncOrchestrator
}

fn harness() -> Harness {
    harness_with(SyncSettings::default())
}

fn harness_with(settings: SyncSettings) -> Harness {
    let records = Arc::new(InMemoryRecordRepository::new());
    let documents = Arc::new(InMemoryDocumentRepository::new());
    let log = Arc::new(RecordingSyncLog::new());
    let orchestrator = SyncOrchestrator::new(
        records.clone(),
        Some(documents.clone()),
        log.clone(),
        settings
    )
    .unwrap();

    Harness {
        records,
        documents,
        log,
        orchestrator
    }
}

fn id(n: i64) -> ProposalId {
    ProposalId::new(n).unwrap()
}

fn proposal(organization_name: &str, status: &str) -> RelationalRow {
    RelationalRow::new()
        .with("organization_id", 5)
        .with("organization_name", organization_name)
        .with("proposal_status", status)
        .with("venue", "Main Hall")
        .with("budget", "1500.00")
        .with("event_start_date", "2025-03-01")
        .with("sdg_goals", "[\"SDG 4\"]")
}

#[tokio::test]
async fn test_relational_only_record_creates_document() {
    let h = harness();
    h.records.insert(
        10,
        RelationalRow::new()
            .with("organization_name", "Acme")
            .with("proposal_status", "approved")
    );

    let result = h.orchestrator.sync_relational_to_document(id(10)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Insert);
    assert_eq!(result.direction, SyncDirection::RelationalToDocument);
    assert!(result.differences.is_empty());

    let doc = h.documents.document(10).unwrap();
    assert_eq!(doc.get("proposalId"), Some(&json!("10")));
    assert_eq!(doc.get("organization_name"), Some(&json!("Acme")));
    assert_eq!(doc.get("proposal_status"), Some(&json!("approved")));
    assert!(doc.last_synced_from_relational().is_some());
    assert_eq!(doc.fields().len(), 4);
}

#[tokio::test]
async fn test_bidirectional_conflict_resolves_to_relational_value() {
    let h = harness();
    h.records
        .insert(11, RelationalRow::new().with("proposal_status", "draft"));
    h.documents
        .insert(11, DocumentRecord::new().with("proposal_status", "submitted"));

    let result = h.orchestrator.bidirectional_sync(id(11)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Update);
    assert_eq!(result.direction, SyncDirection::Bidirectional);

    let resolution = result.resolution.unwrap();
    assert_eq!(resolution.fields.len(), 1);
    assert_eq!(resolution.fields[0].field, "proposal_status");
    assert_eq!(resolution.fields[0].old_value, json!("submitted"));
    assert_eq!(resolution.fields[0].new_value, json!("draft"));

    let doc = h.documents.document(11).unwrap();
    assert_eq!(doc.get("proposal_status"), Some(&json!("draft")));
    assert_eq!(
        h.records.row(11).unwrap().get("proposal_status"),
        Some(&json!("draft"))
    );
    assert_eq!(h.log.entries_for("conflict_resolved").len(), 1);
}

#[tokio::test]
async fn test_absent_record_is_noop_and_fails_validation() {
    let h = harness();

    let result = h.orchestrator.bidirectional_sync(id(99)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Noop);
    assert_eq!(h.documents.write_count(), 0);
    assert_eq!(h.records.write_count(), 0);

    let report = h
        .orchestrator
        .validator()
        .validate_sync_integrity(id(99))
        .await
        .unwrap();
    assert!(!report.relational_exists);
    assert!(!report.document_exists);
    assert!(!report.passed);
    assert_eq!(report.state, RecordPairState::Absent);
    assert_eq!(report.differences.len(), 1);
    assert_eq!(report.differences[0].field, "existence");
}

#[tokio::test]
async fn test_sync_then_validate_passes() {
    let h = harness();
    h.records.insert(1, proposal("Acme", "approved"));

    h.orchestrator.sync_relational_to_document(id(1)).await.unwrap();
    let report = h
        .orchestrator
        .validator()
        .validate_sync_integrity(id(1))
        .await
        .unwrap();

    assert!(report.passed, "unexpected differences: {:?}", report.differences);
    assert_eq!(report.state, RecordPairState::Consistent);
}

#[tokio::test]
async fn test_repeat_sync_reports_no_differences() {
    let h = harness();
    h.records.insert(1, proposal("Acme", "approved"));

    let first = h.orchestrator.sync_relational_to_document(id(1)).await.unwrap();
    let after_first = h.documents.document(1).unwrap();
    let second = h.orchestrator.sync_relational_to_document(id(1)).await.unwrap();
    let after_second = h.documents.document(1).unwrap();

    assert_eq!(first.operation, SyncOperation::Insert);
    assert_eq!(second.operation, SyncOperation::Update);
    assert!(second.differences.is_empty());

    let detector = DifferenceDetector::default();
    assert!(
        detector
            .compare(after_first.fields(), after_second.fields())
            .is_empty()
    );
}

#[tokio::test]
async fn test_bidirectional_on_consistent_pair_writes_nothing() {
    let h = harness();
    h.records.insert(1, proposal("Acme", "approved"));
    h.orchestrator.sync_relational_to_document(id(1)).await.unwrap();
    let writes = h.documents.write_count();

    let result = h.orchestrator.bidirectional_sync(id(1)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Noop);
    assert!(result.differences.is_empty());
    assert!(result.resolution.is_none());
    assert_eq!(h.documents.write_count(), writes);
}

#[tokio::test]
async fn test_bidirectional_relational_only_delegates_to_insert() {
    let h = harness();
    h.records.insert(4, proposal("Acme", "draft"));

    let result = h.orchestrator.bidirectional_sync(id(4)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Insert);
    assert!(h.documents.document(4).is_some());
}

#[tokio::test]
async fn test_bidirectional_removes_fields_only_the_document_has() {
    let h = harness();
    h.records.insert(2, proposal("Acme", "approved"));
    h.orchestrator.sync_relational_to_document(id(2)).await.unwrap();

    let stale = h.documents.document(2).unwrap().with("legacy_notes", "old");
    h.documents.insert(2, stale);

    let result = h.orchestrator.bidirectional_sync(id(2)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Update);
    assert!(h.documents.document(2).unwrap().get("legacy_notes").is_none());
}

#[tokio::test]
async fn test_document_to_relational_respects_allowlist() {
    let h = harness();
    h.records.insert(3, proposal("Acme", "approved"));
    h.orchestrator.sync_relational_to_document(id(3)).await.unwrap();

    let edited = h
        .documents
        .document(3)
        .unwrap()
        .with("venue", "Annex")
        .with("proposal_status", "rejected")
        .with("organization_name", "Someone Else")
        .with("budget", 2000.5);
    h.documents.insert(3, edited);

    let result = h.orchestrator.sync_document_to_relational(id(3)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Update);

    let changed: Vec<&str> = result.differences.iter().map(|d| d.field.as_str()).collect();
    assert_eq!(changed, vec!["budget", "venue"]);

    let row = h.records.row(3).unwrap();
    assert_eq!(row.get("venue"), Some(&json!("Annex")));
    assert_eq!(row.get("budget"), Some(&json!("2000.50")));
    assert_eq!(row.get("proposal_status"), Some(&json!("approved")));
    assert_eq!(row.get("organization_name"), Some(&json!("Acme")));
}

#[tokio::test]
async fn test_document_to_relational_noop_when_nothing_differs() {
    let h = harness();
    h.records.insert(3, proposal("Acme", "approved"));
    h.orchestrator.sync_relational_to_document(id(3)).await.unwrap();

    let result = h.orchestrator.sync_document_to_relational(id(3)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Noop);
    assert_eq!(h.records.write_count(), 0);
}

#[tokio::test]
async fn test_document_to_relational_settles_on_equivalent_values() {
    let h = harness();
    h.records.insert(
        4,
        proposal("Acme", "approved").with("expected_participants", 120)
    );
    h.documents.insert(
        4,
        DocumentRecord::new()
            .with("proposalId", "4")
            .with("expected_participants", "120")
            .with("budget", 1500)
            .with("event_start_date", "2025-03-01")
            .with("venue", "Main Hall")
            .with("sdg_goals", json!(["SDG 4"]))
    );

    for _ in 0..2 {
        let result = h.orchestrator.sync_document_to_relational(id(4)).await.unwrap();
        assert_eq!(result.operation, SyncOperation::Noop);
        assert!(result.differences.is_empty());
    }
    assert_eq!(h.records.write_count(), 0);
    assert_eq!(h.documents.write_count(), 0);
}

#[tokio::test]
async fn test_document_to_relational_stamps_document() {
    let h = harness();
    h.records.insert(3, proposal("Acme", "approved"));
    h.orchestrator.sync_relational_to_document(id(3)).await.unwrap();
    assert!(h.documents.document(3).unwrap().last_synced_to_relational().is_none());

    h.orchestrator.sync_document_to_relational(id(3)).await.unwrap();
    assert!(h.documents.document(3).unwrap().last_synced_to_relational().is_none());

    let edited = h.documents.document(3).unwrap().with("venue", "Annex");
    h.documents.insert(3, edited);
    let result = h.orchestrator.sync_document_to_relational(id(3)).await.unwrap();
    assert_eq!(result.operation, SyncOperation::Update);

    let doc = h.documents.document(3).unwrap();
    assert!(doc.last_synced_to_relational().is_some());
    assert!(doc.last_synced_from_relational().is_some());
    assert_eq!(doc.get("venue"), Some(&json!("Annex")));
    assert_eq!(h.records.row(3).unwrap().get("venue"), Some(&json!("Annex")));
}

#[tokio::test]
async fn test_malformed_relational_value_fails_without_writes() {
    let h = harness();
    h.records.insert(
        6,
        proposal("Acme", "approved").with("sdg_goals", "[not json")
    );

    let err = h
        .orchestrator
        .sync_relational_to_document(id(6))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Mapping);
    assert_eq!(h.documents.write_count(), 0);

    h.documents
        .insert(6, DocumentRecord::new().with("proposalId", "6").with("venue", "Annex"));
    let err = h.orchestrator.bidirectional_sync(id(6)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Mapping);
    assert_eq!(h.documents.write_count(), 0);
    assert_eq!(h.records.write_count(), 0);
    assert_eq!(
        h.documents.document(6).unwrap().get("venue"),
        Some(&json!("Annex"))
    );
}

#[tokio::test]
async fn test_missing_source_is_not_found() {
    let h = harness();

    let err = h
        .orchestrator
        .sync_relational_to_document(id(8))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.store(), Some(StoreKind::Relational));

    let err = h
        .orchestrator
        .sync_document_to_relational(id(8))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.store(), Some(StoreKind::Document));
}

#[tokio::test]
async fn test_document_only_record_is_not_promoted() {
    let h = harness();
    h.documents
        .insert(20, DocumentRecord::new().with("venue", "Annex"));

    let err = h
        .orchestrator
        .sync_document_to_relational(id(20))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OrphanDocument);

    let err = h.orchestrator.bidirectional_sync(id(20)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OrphanDocument);
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn test_batch_collects_item_failures() {
    let h = harness();
    for n in 1..=3 {
        h.records.insert(n, proposal("Acme", "approved"));
    }
    h.records.fail_on(2);

    let summary = h.orchestrator.batch_sync(&[1, 2, 3]).await;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].record_id, 2);
    assert_eq!(summary.errors[0].kind, ErrorKind::StoreUnavailable);

    assert!(h.documents.document(1).is_some());
    assert!(h.documents.document(2).is_none());
    assert!(h.documents.document(3).is_some());
}

#[tokio::test]
async fn test_batch_leaves_no_tracked_locks() {
    let h = harness();
    let ids: Vec<i64> = (1..=200).collect();
    for n in &ids {
        h.records.insert(*n, proposal("Acme", "approved"));
    }

    let summary = h.orchestrator.batch_sync(&ids).await;
    assert_eq!(summary.successful, 200);
    assert_eq!(h.orchestrator.tracked_locks(), 0);
}

#[tokio::test]
async fn test_batch_rejects_invalid_ids_per_item() {
    let h = harness();
    h.records.insert(1, proposal("Acme", "approved"));

    let summary = h
        .orchestrator
        .batch_sync_direction(&[0, 1], SyncDirection::Bidirectional)
        .await;
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors[0].record_id, 0);
    assert_eq!(summary.errors[0].kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_degraded_mode_without_document_store() {
    let records = Arc::new(InMemoryRecordRepository::new());
    records.insert(1, proposal("Acme", "approved"));
    let orchestrator = SyncOrchestrator::new(
        records.clone(),
        None,
        Arc::new(RecordingSyncLog::new()),
        SyncSettings::default()
    )
    .unwrap();

    assert!(orchestrator.is_degraded());
    let result = orchestrator.sync_relational_to_document(id(1)).await.unwrap();
    assert!(result.degraded);
    assert_eq!(result.operation, SyncOperation::Noop);

    let summary = orchestrator.batch_sync(&[1, 2]).await;
    assert_eq!(summary.successful, 2);
    assert!(summary.results.iter().all(|r| r.degraded));

    let report = orchestrator
        .validator()
        .validate_sync_integrity(id(1))
        .await
        .unwrap();
    assert!(report.degraded);
    assert!(report.relational_exists);
    assert!(!report.passed);
}

#[tokio::test]
async fn test_slow_store_times_out_as_retryable() {
    let h = harness_with(SyncSettings {
        store_timeout: Duration::from_millis(50),
        ..SyncSettings::default()
    });
    h.records.insert(1, proposal("Acme", "approved"));
    h.documents.set_latency(Duration::from_millis(500));

    let err = h
        .orchestrator
        .sync_relational_to_document(id(1))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.store(), Some(StoreKind::Document));
}

#[tokio::test]
async fn test_concurrent_syncs_on_one_record_are_serialized() {
    let h = harness();
    h.records.insert(1, proposal("Acme", "approved"));
    h.documents.set_latency(Duration::from_millis(20));
    let orchestrator = Arc::new(h.orchestrator);

    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.sync_relational_to_document(id(1)).await
        }));
    }
    let mut operations = Vec::new();
    for handle in handles {
        operations.push(handle.await.unwrap().unwrap().operation);
    }

    // Each sync makes two document calls of 20ms; serialized that is >= 160ms.
    assert!(started.elapsed() >= Duration::from_millis(160));
    assert_eq!(
        operations
            .iter()
            .filter(|op| **op == SyncOperation::Insert)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_held_lease_rejects_sync() {
    let records = Arc::new(InMemoryRecordRepository::new());
    let documents = Arc::new(InMemoryDocumentRepository::new());
    let leases = Arc::new(InMemoryLeaseProvider::new());
    records.insert(5, proposal("Acme", "approved"));
    records.insert(6, proposal("Acme", "approved"));

    let orchestrator = SyncOrchestrator::new(
        records,
        Some(documents.clone()),
        Arc::new(RecordingSyncLog::new()),
        SyncSettings::default()
    )
    .unwrap()
    .with_lease_provider(leases.clone());

    leases.hold("proposal_sync:5");
    let err = orchestrator
        .sync_relational_to_document(id(5))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.store(), Some(StoreKind::Lock));
    assert!(documents.document(5).is_none());

    orchestrator.sync_relational_to_document(id(6)).await.unwrap();
    assert!(!leases.is_held("proposal_sync:6"));
}

#[tokio::test]
async fn test_sync_log_records_start_and_end() {
    let h = harness();
    h.records.insert(1, proposal("Acme", "approved"));

    h.orchestrator.sync_relational_to_document(id(1)).await.unwrap();
    let _ = h.orchestrator.sync_relational_to_document(id(2)).await;

    let entries = h.log.entries_for("sync_relational_to_document");
    let phases: Vec<&str> = entries
        .iter()
        .filter_map(|d| d.get("phase").and_then(Value::as_str))
        .collect();
    assert_eq!(phases, vec!["start", "end", "start", "error"]);
    assert_eq!(entries[1].get("operation"), Some(&json!("insert")));
    assert_eq!(entries[3].get("errorKind"), Some(&json!("not_found")));
}

#[tokio::test]
async fn test_validation_reports_conflicting_fields() {
    let h = harness();
    h.records.insert(1, proposal("Acme", "approved"));
    h.orchestrator.sync_relational_to_document(id(1)).await.unwrap();
    let edited = h.documents.document(1).unwrap().with("venue", "Annex");
    h.documents.insert(1, edited);

    let report = h
        .orchestrator
        .validator()
        .validate_sync_integrity(id(1))
        .await
        .unwrap();
    assert!(!report.passed);
    assert_eq!(report.state, RecordPairState::Conflicting);
    assert_eq!(report.differences.len(), 1);
    assert_eq!(report.differences[0].field, "venue");
    assert_eq!(report.differences[0].relational_value, json!("Main Hall"));
    assert_eq!(report.differences[0].document_value, json!("Annex"));
}

#[tokio::test]
async fn test_scan_orphans_partitions_ids() {
    let records = Arc::new(InMemoryRecordRepository::new());
    let documents = Arc::new(InMemoryDocumentRepository::new());
    records.insert(1, proposal("Acme", "approved"));
    records.insert(2, proposal("Acme", "approved"));
    documents.insert(2, DocumentRecord::new());
    documents.insert(3, DocumentRecord::new());
    documents.insert_raw("legacy-7", DocumentRecord::new());

    let validator = ConsistencyValidator::new(
        records,
        Some(documents),
        DifferenceDetector::default(),
        Duration::from_secs(1)
    )
    .unwrap();
    let scan = validator.scan_orphans(None).await.unwrap();

    assert_eq!(scan.relational_only, vec![id(1)]);
    assert_eq!(scan.document_only, vec![id(3)]);
    assert_eq!(scan.unparseable_document_ids, vec!["legacy-7".to_string()]);
    assert!(!scan.is_clean());
}

#[test]
fn test_operation_metrics_are_emitted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let h = harness();
    h.records.insert(1, proposal("Acme", "approved"));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    metrics::with_local_recorder(&recorder, || {
        runtime
            .block_on(h.orchestrator.sync_relational_to_document(id(1)))
            .unwrap();
    });

    let snapshot = snapshotter.snapshot().into_vec();
    let emitted = snapshot.iter().any(|(key, _, _, value)| {
        key.key().name() == "proposal_sync.operations"
            && matches!(value, DebugValue::Counter(1))
    });
    assert!(emitted, "operation counter missing from {snapshot:?}");
}

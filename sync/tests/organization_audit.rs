use errors::ErrorKind;
use proposal_core::{DocumentRecord, NameSource, ProposalId, RelationalRow};
use std::sync::Arc;
use std::time::Duration;
use sync::OrganizationAuditor;
use testing::{InMemoryDocumentRepository, InMemoryRecordRepository, StaticOwnerDirectory};

fn id(n: i64) -> ProposalId {
    ProposalId::new(n).unwrap()
}

fn row(organization_id: i64, name: Option<&str>, created_at: &str) -> RelationalRow {
    let row = RelationalRow::new()
        .with("organization_id", organization_id)
        .with("created_at", created_at);
    match name {
        Some(name) => row.with("organization_name", name),
        None => row
    }
}

fn doc(organization_id: i64) -> DocumentRecord {
    DocumentRecord::new().with("organization_id", organization_id)
}

#[tokio::test]
async fn test_owner_profile_name_is_canonical() {
    let records = Arc::new(InMemoryRecordRepository::new());
    let documents = Arc::new(InMemoryDocumentRepository::new());
    records.insert(1, row(5, Some("Acme Foundation"), "2025-01-01T00:00:00.000Z"));
    records.insert(2, row(5, Some("ACME"), "2025-02-01T00:00:00.000Z"));
    documents.insert(1, doc(5));

    let auditor = OrganizationAuditor::new(
        records,
        Some(documents),
        Some(Arc::new(StaticOwnerDirectory::new().with(5, "Acme Foundation"))),
        Duration::from_secs(1)
    );
    let summary = auditor.ensure_proposal_consistency(5).await.unwrap();

    assert_eq!(summary.canonical_name, "Acme Foundation");
    assert_eq!(summary.name_source, NameSource::OwnerProfile);
    assert_eq!(summary.relational_count, 2);
    assert_eq!(summary.document_count, Some(1));
    assert!(summary.count_mismatch);
    assert_eq!(summary.name_mismatches.len(), 1);
    assert_eq!(summary.name_mismatches[0].record_id, id(2));
    assert_eq!(summary.name_mismatches[0].stored_name.as_deref(), Some("ACME"));
    assert!(!summary.consistent);
    assert_eq!(summary.recommendations.len(), 2);
}

#[tokio::test]
async fn test_latest_proposal_name_when_no_owner_profile() {
    let records = Arc::new(InMemoryRecordRepository::new());
    let documents = Arc::new(InMemoryDocumentRepository::new());
    records.insert(1, row(7, Some("Old Name"), "2024-01-01T00:00:00.000Z"));
    records.insert(2, row(7, Some("  "), "2025-06-01T00:00:00.000Z"));
    records.insert(3, row(7, Some("New Name"), "2025-01-01T00:00:00.000Z"));

    let auditor = OrganizationAuditor::new(
        records,
        Some(documents.clone()),
        None,
        Duration::from_secs(1)
    );
    let summary = auditor.ensure_proposal_consistency(7).await.unwrap();

    assert_eq!(summary.canonical_name, "New Name");
    assert_eq!(summary.name_source, NameSource::LatestProposal);
    let mismatched: Vec<ProposalId> = summary
        .name_mismatches
        .iter()
        .map(|m| m.record_id)
        .collect();
    assert_eq!(mismatched, vec![id(2), id(1)]);
    assert_eq!(documents.write_count(), 0);
}

#[tokio::test]
async fn test_default_name_when_nothing_is_known() {
    let records = Arc::new(InMemoryRecordRepository::new());
    records.insert(1, row(9, None, "2025-01-01T00:00:00.000Z"));

    let auditor = OrganizationAuditor::new(
        records,
        Some(Arc::new(InMemoryDocumentRepository::new())),
        Some(Arc::new(StaticOwnerDirectory::new())),
        Duration::from_secs(1)
    )
    .with_default_name("Unassigned");
    let summary = auditor.ensure_proposal_consistency(9).await.unwrap();

    assert_eq!(summary.canonical_name, "Unassigned");
    assert_eq!(summary.name_source, NameSource::Default);
    assert_eq!(summary.name_mismatches.len(), 1);
    assert!(summary.name_mismatches[0].stored_name.is_none());
}

#[tokio::test]
async fn test_consistent_organization() {
    let records = Arc::new(InMemoryRecordRepository::new());
    let documents = Arc::new(InMemoryDocumentRepository::new());
    records.insert(1, row(3, Some("Acme"), "2025-01-01T00:00:00.000Z"));
    documents.insert(1, doc(3));
    documents.insert(50, doc(4));

    let auditor = OrganizationAuditor::new(records, Some(documents), None, Duration::from_secs(1));
    let summary = auditor.ensure_proposal_consistency(3).await.unwrap();

    assert!(summary.consistent);
    assert!(!summary.count_mismatch);
    assert_eq!(summary.recommendations, vec!["No action needed.".to_string()]);
}

#[tokio::test]
async fn test_degraded_audit_skips_document_count() {
    let records = Arc::new(InMemoryRecordRepository::new());
    records.insert(1, row(3, Some("Acme"), "2025-01-01T00:00:00.000Z"));

    let auditor = OrganizationAuditor::new(records, None, None, Duration::from_secs(1));
    let summary = auditor.ensure_proposal_consistency(3).await.unwrap();

    assert_eq!(summary.document_count, None);
    assert!(!summary.count_mismatch);
    assert!(summary.recommendations[0].contains("Document store unavailable"));
}

#[tokio::test]
async fn test_invalid_organization_and_store_failures() {
    let records = Arc::new(InMemoryRecordRepository::new());
    let auditor = OrganizationAuditor::new(records.clone(), None, None, Duration::from_secs(1));

    let err = auditor.ensure_proposal_consistency(0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    records.set_unavailable(true);
    let err = auditor.ensure_proposal_consistency(1).await.unwrap_err();
    assert!(err.is_retryable());
}

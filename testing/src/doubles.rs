//! In-memory stand-ins for the store traits, with fault injection.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use errors::{StoreKind, SyncError};
use proposal_core::{
    DocumentRecord, DocumentRepository, FieldMap, Lease, LeaseProvider, OwnerDirectory,
    ProposalId, RecordRepository, RelationalRow, SyncLog, SyncOperation
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Per-store switches shared by both repositories.
#[derive(Debug, Default)]
struct Faults {
    failing: DashSet<i64>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64
}

impl Faults {
    async fn check(
        &self,
        store: StoreKind,
        id: Option<ProposalId>,
        operation: &'static str
    ) -> Result<(), SyncError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let failing_id = id.is_some_and(|id| self.failing.contains(&id.get()));
        if self.unavailable.load(Ordering::SeqCst) || failing_id {
            return Err(SyncError::unavailable(store, operation, "injected failure"));
        }
        Ok(())
    }
}

fn organization_of(fields: &FieldMap) -> Option<i64> {
    match fields.get("organization_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None
    }
}

/// Relational store double keyed by the numeric id.
#[derive(Debug, Default)]
pub struct InMemoryRecordRepository {
    rows: DashMap<i64, RelationalRow>,
    faults: Faults,
    writes: AtomicUsize
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `row` under `id`, setting its `id` column.
    pub fn insert(&self, id: i64, row: RelationalRow) {
        self.rows.insert(id, row.with("id", id));
    }

    pub fn row(&self, id: i64) -> Option<RelationalRow> {
        self.rows.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Calls touching `id` fail with `StoreUnavailable`.
    pub fn fail_on(&self, id: i64) {
        self.faults.failing.insert(id);
    }

    /// Every call fails with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn check(&self, id: Option<ProposalId>, operation: &'static str) -> Result<(), SyncError> {
        self.faults.check(StoreKind::Relational, id, operation).await
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn get_by_id(&self, id: ProposalId) -> Result<Option<RelationalRow>, SyncError> {
        self.check(Some(id), "get_by_id").await?;
        Ok(self.row(id.get()))
    }

    async fn upsert(&self, id: ProposalId, row: &RelationalRow) -> Result<SyncOperation, SyncError> {
        self.check(Some(id), "upsert").await?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut operation = SyncOperation::Insert;
        self.rows
            .entry(id.get())
            .and_modify(|existing| {
                operation = SyncOperation::Update;
                for (column, value) in row.fields() {
                    existing.insert(column.clone(), value.clone());
                }
            })
            .or_insert_with(|| row.clone().with("id", id.get()));
        Ok(operation)
    }

    async fn update_fields(
        &self,
        id: ProposalId,
        row: &RelationalRow
    ) -> Result<SyncOperation, SyncError> {
        self.check(Some(id), "update_fields").await?;
        if row.fields().is_empty() {
            return Ok(SyncOperation::Noop);
        }

        let mut existing = self
            .rows
            .get_mut(&id.get())
            .ok_or_else(|| SyncError::not_found(StoreKind::Relational, id))?;
        for (column, value) in row.fields() {
            existing.insert(column.clone(), value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(SyncOperation::Update)
    }

    async fn list_ids(&self, organization_id: Option<i64>) -> Result<Vec<ProposalId>, SyncError> {
        self.check(None, "list_ids").await?;
        let mut ids: Vec<ProposalId> = self
            .rows
            .iter()
            .filter(|r| organization_id.is_none() || organization_of(r.fields()) == organization_id)
            .filter_map(|r| ProposalId::new(*r.key()).ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn organization_names(
        &self,
        organization_id: i64
    ) -> Result<Vec<(ProposalId, Option<String>)>, SyncError> {
        self.check(None, "organization_names").await?;
        let mut rows: Vec<(String, i64, Option<String>)> = self
            .rows
            .iter()
            .filter(|r| organization_of(r.fields()) == Some(organization_id))
            .map(|r| {
                let created = r
                    .get("created_at")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (created, *r.key(), r.organization_name().map(String::from))
            })
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

        Ok(rows
            .into_iter()
            .filter_map(|(_, id, name)| ProposalId::new(id).ok().map(|id| (id, name)))
            .collect())
    }
}

/// Document store double keyed by the `proposalId` string.
#[derive(Debug, Default)]
pub struct InMemoryDocumentRepository {
    documents: DashMap<String, DocumentRecord>,
    faults: Faults,
    writes: AtomicUsize
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `document` under `id`, setting its `proposalId`.
    pub fn insert(&self, id: i64, document: DocumentRecord) {
        let key = id.to_string();
        self.documents
            .insert(key.clone(), document.with("proposalId", key));
    }

    /// Stores `document` under an arbitrary key, valid proposal id or not.
    pub fn insert_raw(&self, key: &str, document: DocumentRecord) {
        self.documents
            .insert(key.to_string(), document.with("proposalId", key));
    }

    pub fn document(&self, id: i64) -> Option<DocumentRecord> {
        self.documents
            .get(&id.to_string())
            .map(|d| d.value().clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn fail_on(&self, id: i64) {
        self.faults.failing.insert(id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn check(&self, id: Option<ProposalId>, operation: &'static str) -> Result<(), SyncError> {
        self.faults.check(StoreKind::Document, id, operation).await
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn get_by_id(&self, id: ProposalId) -> Result<Option<DocumentRecord>, SyncError> {
        self.check(Some(id), "get_by_id").await?;
        Ok(self.document(id.get()))
    }

    async fn upsert(
        &self,
        id: ProposalId,
        document: &DocumentRecord
    ) -> Result<SyncOperation, SyncError> {
        self.check(Some(id), "upsert").await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let replaced = self
            .documents
            .insert(id.document_key(), document.clone());
        Ok(if replaced.is_some() {
            SyncOperation::Update
        } else {
            SyncOperation::Insert
        })
    }

    async fn list_ids(&self, organization_id: Option<i64>) -> Result<Vec<String>, SyncError> {
        self.check(None, "list_ids").await?;
        let mut ids: Vec<String> = self
            .documents
            .iter()
            .filter(|d| organization_id.is_none() || organization_of(d.fields()) == organization_id)
            .map(|d| d.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn count(&self, organization_id: Option<i64>) -> Result<u64, SyncError> {
        self.check(None, "count").await?;
        Ok(self
            .documents
            .iter()
            .filter(|d| organization_id.is_none() || organization_of(d.fields()) == organization_id)
            .count() as u64)
    }
}

/// Owner profiles registered up front.
#[derive(Debug, Default)]
pub struct StaticOwnerDirectory {
    names: DashMap<i64, String>
}

impl StaticOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, organization_id: i64, name: impl Into<String>) -> Self {
        self.names.insert(organization_id, name.into());
        self
    }
}

#[async_trait]
impl OwnerDirectory for StaticOwnerDirectory {
    async fn organization_name(&self, organization_id: i64) -> Result<Option<String>, SyncError> {
        Ok(self.names.get(&organization_id).map(|n| n.value().clone()))
    }
}

/// Keeps every sync log entry for assertions.
#[derive(Debug, Default)]
pub struct RecordingSyncLog {
    entries: Mutex<Vec<(String, FieldMap)>>
}

impl RecordingSyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, FieldMap)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries of one operation, in order.
    pub fn entries_for(&self, operation: &str) -> Vec<FieldMap> {
        self.entries()
            .into_iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, details)| details)
            .collect()
    }

    pub fn phases(&self, operation: &str) -> Vec<String> {
        self.entries_for(operation)
            .iter()
            .filter_map(|d| d.get("phase").and_then(Value::as_str).map(String::from))
            .collect()
    }
}

impl SyncLog for RecordingSyncLog {
    fn record(&self, operation: &str, details: &FieldMap) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((operation.to_string(), details.clone()));
    }
}

/// Lease provider with the same semantics as the Redis one, in memory.
#[derive(Debug, Default)]
pub struct InMemoryLeaseProvider {
    held: DashMap<String, String>
}

impl InMemoryLeaseProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as held by someone else.
    pub fn hold(&self, key: &str) {
        self.held
            .insert(key.to_string(), uuid::Uuid::new_v4().to_string());
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }
}

#[async_trait]
impl LeaseProvider for InMemoryLeaseProvider {
    async fn try_acquire(&self, key: &str, ttl_seconds: u64) -> Result<Option<Lease>, SyncError> {
        let token = uuid::Uuid::new_v4().to_string();
        match self.held.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(None),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(Some(Lease {
                    key: key.to_string(),
                    token,
                    ttl_seconds
                }))
            }
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool, SyncError> {
        Ok(self
            .held
            .remove_if(&lease.key, |_, token| *token == lease.token)
            .is_some())
    }
}

//! Store access with a per-call time budget.
//!
//! A call that outlives the budget fails as a retryable
//! [`SyncError::StoreUnavailable`] naming the store and the operation.

use errors::{StoreKind, SyncError};
use proposal_core::{
    DocumentRecord, DocumentRepository, ProposalId, RecordRepository, RelationalRow,
    SyncOperation
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, SyncError>;

pub(crate) async fn within<T, F>(
    budget: Duration,
    store: StoreKind,
    operation: &'static str,
    call: F
) -> Result<T>
where
    F: Future<Output = Result<T>>
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(elapsed) => {
            tracing::warn!(%store, operation, ?budget, "Store call timed out");
            metrics::counter!("proposal_sync.store.timeouts", "store" => store.to_string())
                .increment(1);
            Err(SyncError::unavailable(store, operation, elapsed))
        }
    }
}

#[derive(Clone)]
pub struct TimedRecords {
    inner: Arc<dyn RecordRepository>,
    budget: Duration
}

impl TimedRecords {
    pub fn new(inner: Arc<dyn RecordRepository>, budget: Duration) -> Self {
        Self { inner, budget }
    }

    pub async fn get_by_id(&self, id: ProposalId) -> Result<Option<RelationalRow>> {
        within(self.budget, StoreKind::Relational, "get_by_id", self.inner.get_by_id(id)).await
    }

    pub async fn update_fields(&self, id: ProposalId, row: &RelationalRow) -> Result<SyncOperation> {
        within(
            self.budget,
            StoreKind::Relational,
            "update_fields",
            self.inner.update_fields(id, row)
        )
        .await
    }

    pub async fn list_ids(&self, organization_id: Option<i64>) -> Result<Vec<ProposalId>> {
        within(
            self.budget,
            StoreKind::Relational,
            "list_ids",
            self.inner.list_ids(organization_id)
        )
        .await
    }

    pub async fn organization_names(
        &self,
        organization_id: i64
    ) -> Result<Vec<(ProposalId, Option<String>)>> {
        within(
            self.budget,
            StoreKind::Relational,
            "organization_names",
            self.inner.organization_names(organization_id)
        )
        .await
    }
}

#[derive(Clone)]
pub struct TimedDocuments {
    inner: Arc<dyn DocumentRepository>,
    budget: Duration
}

impl TimedDocuments {
    pub fn new(inner: Arc<dyn DocumentRepository>, budget: Duration) -> Self {
        Self { inner, budget }
    }

    pub async fn get_by_id(&self, id: ProposalId) -> Result<Option<DocumentRecord>> {
        within(self.budget, StoreKind::Document, "get_by_id", self.inner.get_by_id(id)).await
    }

    pub async fn upsert(&self, id: ProposalId, document: &DocumentRecord) -> Result<SyncOperation> {
        within(
            self.budget,
            StoreKind::Document,
            "upsert",
            self.inner.upsert(id, document)
        )
        .await
    }

    pub async fn list_ids(&self, organization_id: Option<i64>) -> Result<Vec<String>> {
        within(
            self.budget,
            StoreKind::Document,
            "list_ids",
            self.inner.list_ids(organization_id)
        )
        .await
    }

    pub async fn count(&self, organization_id: Option<i64>) -> Result<u64> {
        within(
            self.budget,
            StoreKind::Document,
            "count",
            self.inner.count(organization_id)
        )
        .await
    }
}

/// Both stores behind their time budget. The document store is optional;
/// without it every operation runs degraded.
#[derive(Clone)]
pub struct Stores {
    pub records: TimedRecords,
    pub documents: Option<TimedDocuments>,
    budget: Duration
}

impl Stores {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        documents: Option<Arc<dyn DocumentRepository>>,
        budget: Duration
    ) -> Self {
        Self {
            records: TimedRecords::new(records, budget),
            documents: documents.map(|d| TimedDocuments::new(d, budget)),
            budget
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_degraded(&self) -> bool {
        self.documents.is_none()
    }
}

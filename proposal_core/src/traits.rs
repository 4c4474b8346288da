//! Collaborator traits for the proposal sync engine.
//!
//! Every store is reached through one of these traits so that the sync
//! engine can run against PostgreSQL and MongoDB in production and against
//! in-memory doubles in tests.

use crate::types::{DocumentRecord, FieldMap, ProposalId, RelationalRow, SyncOperation};
use async_trait::async_trait;
use errors::SyncError;

/// The relational store: system of record for proposals.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn get_by_id(&self, id: ProposalId) -> Result<Option<RelationalRow>, SyncError>;

    /// Writes every column present in `row`, inserting the row when the id
    /// does not exist yet.
    async fn upsert(&self, id: ProposalId, row: &RelationalRow)
    -> Result<SyncOperation, SyncError>;

    /// Writes only the columns present in `row` onto an existing record.
    ///
    /// Returns `Noop` when `row` is empty. Fails with `NotFound` when the
    /// record does not exist.
    async fn update_fields(
        &self,
        id: ProposalId,
        row: &RelationalRow
    ) -> Result<SyncOperation, SyncError>;

    async fn list_ids(&self, organization_id: Option<i64>) -> Result<Vec<ProposalId>, SyncError>;

    /// Stored organization name of every proposal of an organization, newest
    /// proposal first.
    async fn organization_names(
        &self,
        organization_id: i64
    ) -> Result<Vec<(ProposalId, Option<String>)>, SyncError>;
}

/// The document store mirror, addressed by `ProposalId::document_key`.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn get_by_id(&self, id: ProposalId) -> Result<Option<DocumentRecord>, SyncError>;

    /// Replaces the whole document, creating it when absent.
    async fn upsert(
        &self,
        id: ProposalId,
        document: &DocumentRecord
    ) -> Result<SyncOperation, SyncError>;

    /// Raw `proposalId` values, which may not all parse as proposal ids.
    async fn list_ids(&self, organization_id: Option<i64>) -> Result<Vec<String>, SyncError>;

    async fn count(&self, organization_id: Option<i64>) -> Result<u64, SyncError>;
}

/// Lookup of an organization's profile as registered by its owner account.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn organization_name(&self, organization_id: i64) -> Result<Option<String>, SyncError>;
}

/// Structured operation log sink. Observability only, never control flow.
pub trait SyncLog: Send + Sync {
    fn record(&self, operation: &str, details: &FieldMap);
}

/// A held lease on a key, released with its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub token: String,
    pub ttl_seconds: u64
}

/// Cross-process single-writer leases for deployments that run more than one
/// sync worker.
#[async_trait]
pub trait LeaseProvider: Send + Sync {
    /// Returns `None` when another holder owns the key.
    async fn try_acquire(&self, key: &str, ttl_seconds: u64) -> Result<Option<Lease>, SyncError>;

    /// Returns `false` when the lease had already expired or changed hands.
    async fn release(&self, lease: &Lease) -> Result<bool, SyncError>;
}

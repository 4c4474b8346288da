//! # Proposal Sync Core
//!
//! Shared types and traits for the proposal store sync engine.
//!
//! This crate provides:
//! - The proposal field table shared by both stores
//! - Record representations for the relational and the document side
//! - Result types returned by sync, validation and audit operations
//! - Collaborator traits (repositories, owner directory, sync log, leases)

pub mod fields;
pub mod traits;
pub mod types;

pub use fields::{FieldKind, ProposalField};
pub use traits::{
    DocumentRepository, Lease, LeaseProvider, OwnerDirectory, RecordRepository, SyncLog
};
pub use types::{
    BatchItemError, BatchSyncSummary, ConflictResolution, ConflictStrategy, ConsistencyReport,
    DocumentRecord, EqualityMode, FieldDifference, FieldMap, NameMismatch, NameSource,
    OrganizationConsistencySummary, OrphanScan, ProposalId, RecordPairState, RelationalRow,
    ResolvedField, SyncDirection, SyncOperation, SyncResult
};

//! # Proposal Store Sync
//!
//! Keeps proposals consistent between the relational store (system of
//! record) and the document store that mirrors it.
//!
//! - [`SyncOrchestrator`]: single-record and batch sync in either direction
//! - [`ConsistencyValidator`]: integrity reports and orphan scans
//! - [`OrganizationAuditor`]: organization name and count audit

pub mod audit;
pub mod conflict;
pub mod difference;
pub mod field_mapper;
pub mod locks;
pub mod log;
pub mod orchestrator;
pub mod stores;
pub mod validator;

pub use audit::{DEFAULT_ORGANIZATION_NAME, OrganizationAuditor};
pub use conflict::{ConflictNotification, ConflictResolver};
pub use difference::DifferenceDetector;
pub use field_mapper::FieldMapper;
pub use locks::RecordLocks;
pub use log::{NoopSyncLog, TracingSyncLog};
pub use orchestrator::{SyncOrchestrator, SyncSettings};
pub use validator::ConsistencyValidator;

#[cfg(test)]
mod proptests;

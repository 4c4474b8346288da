use crate::conflict::ConflictResolver;
use crate::difference::DifferenceDetector;
use crate::field_mapper::FieldMapper;
use crate::locks::RecordLocks;
use crate::stores::{Result, Stores, TimedDocuments, within};
use crate::validator::ConsistencyValidator;
use chrono::Utc;
use errors::{StoreKind, SyncError};
use proposal_core::{
    BatchItemError, BatchSyncSummary, DocumentRecord, DocumentRepository, FieldDifference,
    FieldMap, Lease, LeaseProvider, ProposalField, ProposalId, RecordRepository, RelationalRow,
    SyncDirection, SyncLog, SyncOperation, SyncResult
};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runtime knobs of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub store_timeout: Duration,
    pub lease_ttl_seconds: u64
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            lease_ttl_seconds: 30
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &config::Config) -> Self {
        Self {
            store_timeout: config.sync.store_timeout(),
            lease_ttl_seconds: config.redis.lease_ttl_seconds
        }
    }
}

/// Keeps the relational store and its document mirror consistent, one
/// proposal at a time.
///
/// The relational store is the system of record. Every single-record
/// operation holds that record's lock for its whole duration, so concurrent
/// calls on the same id run one after the other.
pub struct SyncOrchestrator {
    stores: Stores,
    log: Arc<dyn SyncLog>,
    leases: Option<Arc<dyn LeaseProvider>>,
    locks: RecordLocks,
    mapper: FieldMapper,
    detector: DifferenceDetector,
    resolver: ConflictResolver,
    settings: SyncSettings
}

impl SyncOrchestrator {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        documents: Option<Arc<dyn DocumentRepository>>,
        log: Arc<dyn SyncLog>,
        settings: SyncSettings
    ) -> Result<Self> {
        if documents.is_none() {
            tracing::warn!("Document store not configured; sync operations will run degraded");
        }

        Ok(Self {
            stores: Stores::new(records, documents, settings.store_timeout),
            log,
            leases: None,
            locks: RecordLocks::new(),
            mapper: FieldMapper::new()?,
            detector: DifferenceDetector::default(),
            resolver: ConflictResolver::default(),
            settings
        })
    }

    pub fn from_config(
        records: Arc<dyn RecordRepository>,
        documents: Option<Arc<dyn DocumentRepository>>,
        log: Arc<dyn SyncLog>,
        config: &config::Config
    ) -> Result<Self> {
        Ok(Self::new(records, documents, log, SyncSettings::from_config(config))?
            .with_detector(DifferenceDetector::from_config(&config.sync)))
    }

    pub fn with_lease_provider(mut self, leases: Arc<dyn LeaseProvider>) -> Self {
        self.leases = Some(leases);
        self
    }

    pub fn with_detector(mut self, detector: DifferenceDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_degraded(&self) -> bool {
        self.stores.is_degraded()
    }

    /// A validator over the same stores and comparison rules.
    pub fn validator(&self) -> ConsistencyValidator {
        ConsistencyValidator::from_parts(
            self.stores.clone(),
            self.mapper.clone(),
            self.detector.clone()
        )
    }

    /// Drops idle per-record locks.
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }

    /// Per-record locks currently held or awaited.
    pub fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    #[tracing::instrument(skip(self), fields(record_id = %id))]
    pub async fn sync_relational_to_document(&self, id: ProposalId) -> Result<SyncResult> {
        self.run(SyncDirection::RelationalToDocument, id).await
    }

    #[tracing::instrument(skip(self), fields(record_id = %id))]
    pub async fn sync_document_to_relational(&self, id: ProposalId) -> Result<SyncResult> {
        self.run(SyncDirection::DocumentToRelational, id).await
    }

    #[tracing::instrument(skip(self), fields(record_id = %id))]
    pub async fn bidirectional_sync(&self, id: ProposalId) -> Result<SyncResult> {
        self.run(SyncDirection::Bidirectional, id).await
    }

    pub async fn sync(&self, id: ProposalId, direction: SyncDirection) -> Result<SyncResult> {
        match direction {
            SyncDirection::RelationalToDocument => self.sync_relational_to_document(id).await,
            SyncDirection::DocumentToRelational => self.sync_document_to_relational(id).await,
            SyncDirection::Bidirectional => self.bidirectional_sync(id).await
        }
    }

    /// Relational-to-document sync of every id, in order. Item failures are
    /// collected in the summary and never abort the batch.
    pub async fn batch_sync(&self, ids: &[i64]) -> BatchSyncSummary {
        self.batch_sync_direction(ids, SyncDirection::RelationalToDocument)
            .await
    }

    #[tracing::instrument(skip(self, ids), fields(total = ids.len()))]
    pub async fn batch_sync_direction(
        &self,
        ids: &[i64],
        direction: SyncDirection
    ) -> BatchSyncSummary {
        let mut summary = BatchSyncSummary {
            total: ids.len(),
            ..BatchSyncSummary::default()
        };

        for &raw in ids {
            let outcome = match ProposalId::new(raw) {
                Ok(id) => self.sync(id, direction).await,
                Err(e) => Err(e)
            };

            match outcome {
                Ok(result) => {
                    summary.successful += 1;
                    summary.results.push(result);
                }
                Err(error) => {
                    tracing::warn!(record_id = raw, %direction, "Batch item failed: {}", error);
                    metrics::counter!(
                        "proposal_sync.batch.failures",
                        "kind" => error.kind().to_string()
                    )
                    .increment(1);
                    summary.failed += 1;
                    summary.errors.push(BatchItemError {
                        record_id: raw,
                        kind: error.kind(),
                        message: error.to_string()
                    });
                }
            }
        }

        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "Batch sync finished"
        );
        summary
    }
}

impl SyncOrchestrator {
    async fn run(&self, direction: SyncDirection, id: ProposalId) -> Result<SyncResult> {
        let operation = operation_name(direction);
        let started = Instant::now();
        self.log_start(operation, id);

        let outcome = match &self.stores.documents {
            None => {
                tracing::warn!(record_id = %id, operation, "Document store unavailable, skipping");
                Ok(SyncResult::degraded(direction, id))
            }
            Some(documents) => {
                self.exclusive(id, self.dispatch(documents, direction, id))
                    .await
            }
        };

        self.finish(operation, id, &outcome, started);
        outcome
    }

    async fn dispatch(
        &self,
        documents: &TimedDocuments,
        direction: SyncDirection,
        id: ProposalId
    ) -> Result<SyncResult> {
        match direction {
            SyncDirection::RelationalToDocument => {
                let row = self
                    .stores
                    .records
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| SyncError::not_found(StoreKind::Relational, id))?;
                let existing = documents.get_by_id(id).await?;
                self.write_document(documents, id, &row, existing).await
            }
            SyncDirection::DocumentToRelational => {
                let document = documents
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| SyncError::not_found(StoreKind::Document, id))?;
                self.write_relational(documents, id, &document).await
            }
            SyncDirection::Bidirectional => self.reconcile(documents, id).await
        }
    }

    /// Runs `work` while holding the record lock and, when configured, the
    /// cross-process lease.
    async fn exclusive<T>(&self, id: ProposalId, work: impl Future<Output = Result<T>>) -> Result<T> {
        let _guard = self.locks.lock(id).await;
        let lease = self.acquire_lease(id).await?;

        let result = work.await;

        if let (Some(leases), Some(lease)) = (&self.leases, lease) {
            self.release_lease(leases.as_ref(), &lease).await;
        }
        result
    }

    async fn acquire_lease(&self, id: ProposalId) -> Result<Option<Lease>> {
        let Some(leases) = &self.leases else {
            return Ok(None);
        };

        let key = format!("proposal_sync:{id}");
        let acquired = within(
            self.settings.store_timeout,
            StoreKind::Lock,
            "acquire_lease",
            leases.try_acquire(&key, self.settings.lease_ttl_seconds)
        )
        .await?;

        match acquired {
            Some(lease) => {
                tracing::debug!(key = %lease.key, "Acquired sync lease");
                metrics::counter!("proposal_sync.lease.acquired").increment(1);
                Ok(Some(lease))
            }
            None => {
                tracing::info!(%key, "Sync lease held by another worker");
                metrics::counter!("proposal_sync.lease.contended").increment(1);
                Err(SyncError::unavailable(
                    StoreKind::Lock,
                    "acquire_lease",
                    format!("lease {key} is held by another worker")
                ))
            }
        }
    }

    async fn release_lease(&self, leases: &dyn LeaseProvider, lease: &Lease) {
        let released = within(
            self.settings.store_timeout,
            StoreKind::Lock,
            "release_lease",
            leases.release(lease)
        )
        .await;

        match released {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key = %lease.key, "Sync lease expired before release");
            }
            Err(e) => {
                tracing::warn!(key = %lease.key, "Failed to release sync lease: {}", e);
                metrics::counter!("proposal_sync.lease.release_failures").increment(1);
            }
        }
    }

    async fn write_document(
        &self,
        documents: &TimedDocuments,
        id: ProposalId,
        row: &RelationalRow,
        existing: Option<DocumentRecord>
    ) -> Result<SyncResult> {
        let mut document = self.mapper.mirror(id, row)?;
        let differences = existing
            .as_ref()
            .map(|current| self.detector.compare(document.fields(), current.fields()))
            .unwrap_or_default();

        document.stamp_synced_from_relational(Utc::now());
        documents.upsert(id, &document).await?;

        let operation = if existing.is_some() {
            SyncOperation::Update
        } else {
            SyncOperation::Insert
        };
        tracing::debug!(record_id = %id, %operation, differences = differences.len(), "Mirrored record");

        Ok(
            SyncResult::new(operation, SyncDirection::RelationalToDocument, id)
                .with_differences(differences)
        )
    }

    /// Writes the allowlisted fields the document carries back onto the
    /// existing relational record, then stamps the document.
    ///
    /// Values are compared in relational shape, so a document value that
    /// maps onto the stored column value is not a change.
    async fn write_relational(
        &self,
        documents: &TimedDocuments,
        id: ProposalId,
        document: &DocumentRecord
    ) -> Result<SyncResult> {
        let Some(current) = self.stores.records.get_by_id(id).await? else {
            return Err(SyncError::OrphanDocument { id: id.to_string() });
        };

        let incoming = self.mapper.to_relational(document)?;
        let canonical = self
            .mapper
            .to_relational(&self.mapper.mirror(id, &current)?)?;

        let mut changes = RelationalRow::new();
        let mut differences = Vec::new();
        for field in ProposalField::all().filter(|f| f.syncable_from_document()) {
            if self.detector.is_ignored(field.document_field()) {
                continue;
            }
            let column = field.column();
            let Some(theirs) = incoming.get(column) else {
                continue;
            };
            let ours = canonical.get(column).unwrap_or(&Value::Null);
            if self.detector.values_equal(ours, theirs) {
                continue;
            }

            differences.push(FieldDifference::new(column, ours.clone(), theirs.clone()));
            changes.insert(column, theirs.clone());
        }
        differences.sort_by(|a, b| a.field.cmp(&b.field));

        if changes.fields().is_empty() {
            return Ok(SyncResult::new(
                SyncOperation::Noop,
                SyncDirection::DocumentToRelational,
                id
            ));
        }

        self.stores.records.update_fields(id, &changes).await?;

        let mut stamped = document.clone();
        stamped.stamp_synced_to_relational(Utc::now());
        documents.upsert(id, &stamped).await?;

        Ok(
            SyncResult::new(SyncOperation::Update, SyncDirection::DocumentToRelational, id)
                .with_differences(differences)
        )
    }

    async fn reconcile(&self, documents: &TimedDocuments, id: ProposalId) -> Result<SyncResult> {
        let row = self.stores.records.get_by_id(id).await?;
        let existing = documents.get_by_id(id).await?;

        match (row, existing) {
            (None, None) => Ok(SyncResult::new(
                SyncOperation::Noop,
                SyncDirection::Bidirectional,
                id
            )),
            (Some(row), None) => self.write_document(documents, id, &row, None).await,
            (None, Some(document)) => self.write_relational(documents, id, &document).await,
            (Some(row), Some(current)) => {
                let mirror = self.mapper.mirror(id, &row)?;
                let differences = self.detector.compare(mirror.fields(), current.fields());
                if differences.is_empty() {
                    return Ok(SyncResult::new(
                        SyncOperation::Noop,
                        SyncDirection::Bidirectional,
                        id
                    ));
                }

                self.record_event(
                    "conflict_detected",
                    &self.resolver.detect_notification(id, &differences)
                );

                let resolution = self.resolver.resolve(id, &differences);
                let mut resolved = current;
                self.resolver.apply(&resolution, &mut resolved);
                resolved.stamp_synced_from_relational(Utc::now());
                documents.upsert(id, &resolved).await?;

                metrics::counter!("proposal_sync.conflicts_resolved")
                    .increment(resolution.fields.len() as u64);
                self.record_event(
                    "conflict_resolved",
                    &self.resolver.create_notification(&resolution)
                );

                Ok(
                    SyncResult::new(SyncOperation::Update, SyncDirection::Bidirectional, id)
                        .with_differences(differences)
                        .with_resolution(resolution)
                )
            }
        }
    }

    fn log_start(&self, operation: &str, id: ProposalId) {
        let mut details = FieldMap::new();
        details.insert("phase".to_string(), json!("start"));
        details.insert("recordId".to_string(), json!(id.get()));
        self.log.record(operation, &details);
    }

    fn finish(
        &self,
        operation: &'static str,
        id: ProposalId,
        outcome: &Result<SyncResult>,
        started: Instant
    ) {
        let mut details = FieldMap::new();
        details.insert("recordId".to_string(), json!(id.get()));

        let label = match outcome {
            Ok(result) => {
                details.insert("phase".to_string(), json!("end"));
                details.insert("operation".to_string(), json!(result.operation));
                details.insert("differences".to_string(), json!(result.differences.len()));
                details.insert("degraded".to_string(), json!(result.degraded));
                if result.degraded {
                    "degraded".to_string()
                } else {
                    result.operation.to_string()
                }
            }
            Err(error) => {
                tracing::warn!(record_id = %id, operation, "Sync failed: {}", error);
                details.insert("phase".to_string(), json!("error"));
                details.insert("errorKind".to_string(), json!(error.kind()));
                details.insert("error".to_string(), json!(error.to_string()));
                error.kind().to_string()
            }
        };
        self.log.record(operation, &details);

        metrics::counter!(
            "proposal_sync.operations",
            "operation" => operation,
            "outcome" => label
        )
        .increment(1);
        metrics::histogram!("proposal_sync.duration_ms", "operation" => operation)
            .record(started.elapsed().as_secs_f64() * 1000.0);
    }

    fn record_event(&self, operation: &str, event: &impl Serialize) {
        match serde_json::to_value(event) {
            Ok(Value::Object(details)) => self.log.record(operation, &details),
            Ok(_) => {}
            Err(e) => tracing::warn!(operation, "Failed to serialize sync event: {}", e)
        }
    }
}

fn operation_name(direction: SyncDirection) -> &'static str {
    match direction {
        SyncDirection::RelationalToDocument => "sync_relational_to_document",
        SyncDirection::DocumentToRelational => "sync_document_to_relational",
        SyncDirection::Bidirectional => "bidirectional_sync"
    }
}

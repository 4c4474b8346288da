use crate::difference::DifferenceDetector;
use crate::field_mapper::FieldMapper;
use crate::stores::{Result, Stores};
use chrono::Utc;
use proposal_core::{
    ConsistencyReport, DocumentRepository, FieldDifference, OrphanScan, ProposalId,
    RecordPairState, RecordRepository
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Read-only checks of whether the two stores agree.
#[derive(Clone)]
pub struct ConsistencyValidator {
    stores: Stores,
    mapper: FieldMapper,
    detector: DifferenceDetector
}

impl ConsistencyValidator {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        documents: Option<Arc<dyn DocumentRepository>>,
        detector: DifferenceDetector,
        store_timeout: Duration
    ) -> Result<Self> {
        Ok(Self::from_parts(
            Stores::new(records, documents, store_timeout),
            FieldMapper::new()?,
            detector
        ))
    }

    pub(crate) fn from_parts(stores: Stores, mapper: FieldMapper, detector: DifferenceDetector) -> Self {
        Self {
            stores,
            mapper,
            detector
        }
    }

    /// Compares one proposal across both stores.
    ///
    /// A pair with a missing side reports a single `existence` difference.
    /// Without a document store the report is degraded and never passes.
    #[tracing::instrument(skip(self), fields(record_id = %id))]
    pub async fn validate_sync_integrity(&self, id: ProposalId) -> Result<ConsistencyReport> {
        let row = self.stores.records.get_by_id(id).await?;
        let relational_exists = row.is_some();

        let Some(documents) = &self.stores.documents else {
            tracing::warn!(record_id = %id, "Document store unavailable, integrity not checked");
            return Ok(ConsistencyReport {
                record_id: id,
                relational_exists,
                document_exists: false,
                state: RecordPairState::classify(relational_exists, false, false),
                differences: Vec::new(),
                passed: false,
                degraded: true,
                checked_at: Utc::now()
            });
        };

        let document = documents.get_by_id(id).await?;
        let document_exists = document.is_some();

        let differences = match (&row, &document) {
            (Some(row), Some(document)) => {
                let mirror = self.mapper.mirror(id, row)?;
                self.detector.compare(mirror.fields(), document.fields())
            }
            _ => vec![FieldDifference::existence(relational_exists, document_exists)]
        };
        let passed = relational_exists && document_exists && differences.is_empty();

        if !passed {
            tracing::info!(
                record_id = %id,
                differences = differences.len(),
                "Integrity check found drift"
            );
        }

        Ok(ConsistencyReport {
            record_id: id,
            relational_exists,
            document_exists,
            state: RecordPairState::classify(
                relational_exists,
                document_exists,
                !differences.is_empty()
            ),
            differences,
            passed,
            degraded: false,
            checked_at: Utc::now()
        })
    }

    /// Ids present in one store only, optionally for one organization.
    #[tracing::instrument(skip(self))]
    pub async fn scan_orphans(&self, organization_id: Option<i64>) -> Result<OrphanScan> {
        let Some(documents) = &self.stores.documents else {
            return Ok(OrphanScan {
                organization_id,
                degraded: true,
                ..OrphanScan::default()
            });
        };

        let relational: BTreeSet<ProposalId> = self
            .stores
            .records
            .list_ids(organization_id)
            .await?
            .into_iter()
            .collect();

        let mut mirrored = BTreeSet::new();
        let mut unparseable_document_ids = Vec::new();
        for raw in documents.list_ids(organization_id).await? {
            match ProposalId::from_document_key(&raw) {
                Ok(id) => {
                    mirrored.insert(id);
                }
                Err(_) => unparseable_document_ids.push(raw)
            }
        }
        unparseable_document_ids.sort();

        let scan = OrphanScan {
            organization_id,
            relational_only: relational.difference(&mirrored).copied().collect(),
            document_only: mirrored.difference(&relational).copied().collect(),
            unparseable_document_ids,
            degraded: false
        };

        tracing::info!(
            relational_only = scan.relational_only.len(),
            document_only = scan.document_only.len(),
            unparseable = scan.unparseable_document_ids.len(),
            "Orphan scan finished"
        );
        Ok(scan)
    }
}

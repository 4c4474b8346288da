//! Cross-organization consistency audit.
//!
//! Checks that an organization's proposals agree on the organization name
//! and that both stores hold the same number of them. The audit only
//! reports; it never writes.

use crate::stores::{Result, Stores, within};
use errors::{StoreKind, SyncError};
use proposal_core::{
    DocumentRepository, NameMismatch, NameSource, OrganizationConsistencySummary, OwnerDirectory,
    ProposalId, RecordRepository
};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ORGANIZATION_NAME: &str = "Unknown Organization";

pub struct OrganizationAuditor {
    stores: Stores,
    owners: Option<Arc<dyn OwnerDirectory>>,
    default_name: String
}

impl OrganizationAuditor {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        documents: Option<Arc<dyn DocumentRepository>>,
        owners: Option<Arc<dyn OwnerDirectory>>,
        store_timeout: Duration
    ) -> Self {
        Self {
            stores: Stores::new(records, documents, store_timeout),
            owners,
            default_name: DEFAULT_ORGANIZATION_NAME.to_string()
        }
    }

    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn ensure_proposal_consistency(
        &self,
        organization_id: i64
    ) -> Result<OrganizationConsistencySummary> {
        if organization_id <= 0 {
            return Err(SyncError::validation(
                "organization_id",
                format!("organization id must be positive, got {organization_id}")
            ));
        }

        let stored = self
            .stores
            .records
            .organization_names(organization_id)
            .await?;
        let relational_count = stored.len() as u64;

        let document_count = match &self.stores.documents {
            Some(documents) => Some(documents.count(Some(organization_id)).await?),
            None => None
        };
        let count_mismatch = document_count.is_some_and(|count| count != relational_count);

        let (canonical_name, name_source) = self.canonical_name(organization_id, &stored).await?;

        let name_mismatches: Vec<NameMismatch> = stored
            .iter()
            .filter(|(_, name)| name.as_deref().map(str::trim) != Some(canonical_name.as_str()))
            .map(|(id, name)| NameMismatch {
                record_id: *id,
                stored_name: name.clone()
            })
            .collect();

        let recommendations = recommendations(
            organization_id,
            &canonical_name,
            name_source,
            relational_count,
            document_count,
            &name_mismatches
        );
        let consistent = !count_mismatch && name_mismatches.is_empty();

        tracing::info!(
            organization_id,
            relational_count,
            ?document_count,
            mismatches = name_mismatches.len(),
            consistent,
            "Organization audit finished"
        );

        Ok(OrganizationConsistencySummary {
            organization_id,
            canonical_name,
            name_source,
            relational_count,
            document_count,
            count_mismatch,
            name_mismatches,
            recommendations,
            consistent
        })
    }

    /// Owner profile first, then the newest proposal that carries a name,
    /// then the configured default.
    async fn canonical_name(
        &self,
        organization_id: i64,
        stored: &[(ProposalId, Option<String>)]
    ) -> Result<(String, NameSource)> {
        if let Some(owners) = &self.owners {
            let profile = within(
                self.stores.budget(),
                StoreKind::Relational,
                "organization_name",
                owners.organization_name(organization_id)
            )
            .await?;
            if let Some(name) = profile.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                return Ok((name.to_string(), NameSource::OwnerProfile));
            }
        }

        let latest = stored
            .iter()
            .filter_map(|(_, name)| name.as_deref().map(str::trim))
            .find(|name| !name.is_empty());
        if let Some(name) = latest {
            return Ok((name.to_string(), NameSource::LatestProposal));
        }

        Ok((self.default_name.clone(), NameSource::Default))
    }
}

fn recommendations(
    organization_id: i64,
    canonical_name: &str,
    name_source: NameSource,
    relational_count: u64,
    document_count: Option<u64>,
    mismatches: &[NameMismatch]
) -> Vec<String> {
    let mut out = Vec::new();

    match document_count {
        Some(count) if count != relational_count => out.push(format!(
            "Run a batch sync for organization {organization_id}: the relational store holds \
             {relational_count} proposal(s) but the document store holds {count}."
        )),
        None => out.push(
            "Document store unavailable; proposal counts were not compared.".to_string()
        ),
        _ => {}
    }

    if !mismatches.is_empty() {
        let ids: Vec<String> = mismatches.iter().map(|m| m.record_id.to_string()).collect();
        out.push(format!(
            "Set organization_name to \"{canonical_name}\" on {} proposal(s): {}.",
            mismatches.len(),
            ids.join(", ")
        ));
    }

    if name_source == NameSource::Default {
        out.push(format!(
            "No organization name on record for organization {organization_id}; register the \
             owner profile so a canonical name can be resolved."
        ));
    }

    if out.is_empty() {
        out.push("No action needed.".to_string());
    }
    out
}

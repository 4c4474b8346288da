//! Connects the configured stores and wires them into the sync engine.

use anyhow::{Context, Result};
use config::Config;
use proposal_core::DocumentRepository;
use std::sync::Arc;
use storage::{MongoProposalRepository, PostgresProposalRepository, RedisLeaseProvider};
use sync::{ConsistencyValidator, OrganizationAuditor, SyncOrchestrator, TracingSyncLog};

use crate::output;

pub struct Runtime {
    pub config: Config,
    pub records: Arc<PostgresProposalRepository>,
    pub documents: Option<Arc<MongoProposalRepository>>,
    pub leases: Option<Arc<RedisLeaseProvider>>
}

impl Runtime {
    /// PostgreSQL is mandatory. An unreachable MongoDB downgrades every
    /// operation to degraded mode instead of failing the command.
    pub async fn connect(config: Config) -> Result<Self> {
        let records = PostgresProposalRepository::connect(&config.postgres)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let documents = if config.mongodb.enabled {
            match MongoProposalRepository::connect(&config.mongodb).await {
                Ok(documents) => Some(Arc::new(documents)),
                Err(e) => {
                    output::warn(&format!("MongoDB unavailable, running degraded: {e}"));
                    None
                }
            }
        } else {
            None
        };

        let leases = if config.redis.enabled {
            let leases = RedisLeaseProvider::new(&config.redis.url)
                .await
                .context("Failed to connect to Redis")?;
            Some(Arc::new(leases))
        } else {
            None
        };

        tracing::info!(
            degraded = documents.is_none(),
            leases = leases.is_some(),
            "Stores connected"
        );

        Ok(Self {
            config,
            records: Arc::new(records),
            documents,
            leases
        })
    }

    fn documents(&self) -> Option<Arc<dyn DocumentRepository>> {
        self.documents
            .clone()
            .map(|documents| documents as Arc<dyn DocumentRepository>)
    }

    pub fn orchestrator(&self) -> Result<SyncOrchestrator> {
        let orchestrator = SyncOrchestrator::from_config(
            self.records.clone(),
            self.documents(),
            Arc::new(TracingSyncLog),
            &self.config
        )?;
        Ok(match &self.leases {
            Some(leases) => orchestrator.with_lease_provider(leases.clone()),
            None => orchestrator
        })
    }

    pub fn validator(&self) -> Result<ConsistencyValidator> {
        Ok(self.orchestrator()?.validator())
    }

    pub fn auditor(&self) -> OrganizationAuditor {
        OrganizationAuditor::new(
            self.records.clone(),
            self.documents(),
            Some(self.records.clone()),
            self.config.sync.store_timeout()
        )
        .with_default_name(self.config.sync.default_organization_name.clone())
    }
}

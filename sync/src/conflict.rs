use chrono::{DateTime, Utc};
use proposal_core::{
    ConflictResolution, ConflictStrategy, DocumentRecord, FieldDifference, ProposalId,
    ResolvedField,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Emitted to the sync log whenever a bidirectional sync overwrites
/// document fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConflictNotification {
    #[serde(rename_all = "camelCase")]
    ConflictDetected {
        record_id: ProposalId,
        fields: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ConflictResolved {
        record_id: ProposalId,
        strategy: ConflictStrategy,
        fields: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

/// Resolves divergent field values between the two stores.
///
/// The relational store is the system of record: every conflicting field
/// takes the relational value.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Builds the per-field resolution for a set of differences.
    ///
    /// Deterministic given the same input: fields come out in the order of
    /// `differences`, and the existence pseudo-field is never resolved.
    pub fn resolve(
        &self,
        record_id: ProposalId,
        differences: &[FieldDifference],
    ) -> ConflictResolution {
        let fields = differences
            .iter()
            .filter(|d| d.field != FieldDifference::EXISTENCE)
            .map(|d| match self.strategy {
                ConflictStrategy::RelationalWins => ResolvedField {
                    field: d.field.clone(),
                    old_value: d.document_value.clone(),
                    new_value: d.relational_value.clone(),
                },
            })
            .collect();

        ConflictResolution {
            record_id,
            strategy: self.strategy,
            fields,
            resolved_at: Utc::now(),
        }
    }

    /// Writes the resolved values into `document`. A resolved `null` removes
    /// the field, since the winning side does not carry it.
    pub fn apply(&self, resolution: &ConflictResolution, document: &mut DocumentRecord) {
        for resolved in &resolution.fields {
            match &resolved.new_value {
                Value::Null => {
                    document.remove(&resolved.field);
                }
                value => {
                    document.insert(resolved.field.clone(), value.clone());
                }
            }
        }
    }

    pub fn detect_notification(
        &self,
        record_id: ProposalId,
        differences: &[FieldDifference],
    ) -> ConflictNotification {
        ConflictNotification::ConflictDetected {
            record_id,
            fields: differences.iter().map(|d| d.field.clone()).collect(),
            timestamp: Utc::now(),
        }
    }

    pub fn create_notification(&self, resolution: &ConflictResolution) -> ConflictNotification {
        ConflictNotification::ConflictResolved {
            record_id: resolution.record_id,
            strategy: resolution.strategy,
            fields: resolution.fields.iter().map(|f| f.field.clone()).collect(),
            timestamp: resolution.resolved_at,
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ConflictStrategy::RelationalWins)
    }
}

use proposal_core::{FieldMap, SyncLog};
use serde_json::Value;

/// Default [`SyncLog`]: one structured `tracing` event per entry under the
/// `proposal_sync` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSyncLog;

impl SyncLog for TracingSyncLog {
    fn record(&self, operation: &str, details: &FieldMap) {
        let details = Value::Object(details.clone());
        match details.get("phase").and_then(Value::as_str) {
            Some("error") => tracing::warn!(target: "proposal_sync", operation, %details),
            _ => tracing::info!(target: "proposal_sync", operation, %details)
        }
    }
}

/// Logs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSyncLog;

impl SyncLog for NoopSyncLog {
    fn record(&self, _operation: &str, _details: &FieldMap) {}
}

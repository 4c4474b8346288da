use config::ObservabilityConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the process-wide Prometheus recorder when metrics are enabled.
///
/// A CLI run is too short to scrape, so there is no HTTP listener; the
/// handle renders the exposition text once the command finishes.
pub fn install_metrics(config: &ObservabilityConfig) -> Option<PrometheusHandle> {
    if !config.metrics_enabled {
        tracing::debug!("Metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Failed to install metrics recorder: {}", e);
            None
        }
    }
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    // 1. Initialize Tracing (Logs)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "scar_chain=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Initialize Metrics (Prometheus)
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Store handle for polling collaborators
    if PROM_HANDLE.set(handle).is_err() {
        tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
    }

    metrics::describe_counter!(
        "scar_appends_total",
        "Total incident records appended to the chain"
    );
    metrics::describe_histogram!(
        "scar_append_duration_seconds",
        "Time taken to durably append one record"
    );
    metrics::describe_histogram!(
        "scar_replay_duration_seconds",
        "Time taken to replay the log at startup"
    );
    metrics::describe_counter!(
        "scar_chain_verifications_total",
        "Total whole-chain verification runs"
    );
    metrics::describe_counter!(
        "scar_freezes_total",
        "Total Active -> Frozen transitions"
    );
    metrics::describe_gauge!("scar_freeze_epoch", "Current freeze epoch counter");

    // Ensure at least one metric exists on startup
    metrics::gauge!("scar_chain_up", 1.0);
}

/// Render current metrics for a polling collaborator.
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}

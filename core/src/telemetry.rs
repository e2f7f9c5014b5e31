// Logging setup and stats reporting
use crate::event::EventBusStats;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns an error if a global subscriber is already set; callers that may
/// run more than once (tests) can ignore it.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()?;

    info!(target: "telemetry", "Tracing initialized");
    Ok(())
}

/// Print a stats snapshot to the log
pub fn log_stats(stats: &EventBusStats) {
    info!(target: "telemetry", "=== Event Bus ===");
    info!(target: "telemetry", "Published: {}", stats.total_published);
    info!(target: "telemetry", "Delivered: {}", stats.total_delivered);
    info!(target: "telemetry", "Dropped: {}", stats.dropped_events);
    info!(target: "telemetry", "Subscribers: {}", stats.active_subscriptions);
    info!(target: "telemetry", "Backlog: {}", stats.backlog_size);
}

/// Fraction of attempted deliveries that were dropped.
pub fn drop_rate(stats: &EventBusStats) -> f64 {
    let attempted = stats.total_delivered + stats.dropped_events;
    if attempted == 0 {
        0.0
    } else {
        stats.dropped_events as f64 / attempted as f64
    }
}

//! Tracing initialization for binaries embedding the engine.
//!
//! The library logs through `log` and `tracing`; this wires both into one
//! subscriber. Embedding applications with their own subscriber can skip
//! this entirely.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber with an env-based filter and bridges
/// `log` records into it. Idempotent: later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    let _ = tracing::subscriber::set_global_default(subscriber);
}

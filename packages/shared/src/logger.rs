//! Logging setup utilities for the chat bot.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter directive for the given crate targets.
///
/// Crate names are normalised the way Rust names their modules, so
/// `snoochat-client` becomes `snoochat_client`.
pub fn default_directive(targets: &[&str], default_log_level: &str) -> String {
    targets
        .iter()
        .map(|target| format!("{}={}", target.replace('-', "_"), default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// Only the listed crate targets log at `default_log_level`; everything else
/// stays silent. The whole filter can be overridden with the `RUST_LOG`
/// environment variable.
///
/// # Arguments
///
/// * `targets` - Crate or binary names to enable (e.g. `["snoochat-client", "snoochat"]`)
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use snoochat_shared::logger::setup_logger;
///
/// setup_logger(&["snoochat-client", "snoochat"], "info");
/// ```
pub fn setup_logger(targets: &[&str], default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(targets, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

//! Logging initialization
//!
//! Structured JSON logs go to stdout and to a daily rolling file at the same
//! time.

use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,log_monitor=debug"
    } else {
        "info,log_monitor=info"
    }
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the level; otherwise `verbose` decides between info and
/// debug for this crate. Files are written as `<log_dir>/log-monitor.log.YYYY-MM-DD`.
///
/// The returned `WorkerGuard` must be held by `main` so buffered lines are
/// flushed on exit.
pub fn init_logging(log_dir: &Path, verbose: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = rolling::daily(log_dir, "log-monitor.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .flatten_event(false);

    let file_layer = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .flatten_event(false)
        .with_ansi(false)
        .with_writer(non_blocking);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .or_else(|err| {
            // Detect "already initialized" via source downcasting
            use std::error::Error;
            if err
                .source()
                .and_then(|s| s.downcast_ref::<tracing::dispatcher::SetGlobalDefaultError>())
                .is_some()
            {
                return Ok(());
            }
            eprintln!("Failed to initialize tracing: {}", err);
            Err(err)
        })
        .ok();

    guard
}

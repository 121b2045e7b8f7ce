pub mod cloudhub;
pub mod config;
pub mod monitoring;
pub mod shutdown;
pub mod utils;

use std::sync::Arc;

use tracing::info;

use crate::cloudhub::CloudHubClient;
use crate::config::{load_patterns, AppConfig};
use crate::monitoring::{
    AlertDispatcher, FileCheckpointStore, LogMonitor, LogScanner, Scheduler, SmtpNotifier,
};
use crate::shutdown::shutdown_signal;
use crate::utils::MonitorResult;

/// Wire up the monitor from configuration and run it until shutdown
pub async fn run(config: AppConfig) -> MonitorResult<()> {
    let patterns = load_patterns(&config.patterns_file)?;

    let cloudhub = Arc::new(CloudHubClient::new(config.mulesoft.clone())?);
    let notifier = Arc::new(SmtpNotifier::new(&config.smtp)?);
    let checkpoints = Arc::new(FileCheckpointStore::new(&config.checkpoint_dir)?);
    let dispatcher = Arc::new(AlertDispatcher::new(notifier, &config.mulesoft));

    let monitor = LogMonitor::new(
        patterns,
        cloudhub.clone(),
        cloudhub,
        checkpoints,
        dispatcher,
    )
    .with_scanner(LogScanner::new(config.timestamp_marker.clone()))
    .with_max_concurrent_scans(config.max_concurrent_scans);
    let scheduler = Scheduler::new(config.check_interval);

    let applications = monitor
        .patterns()
        .iter()
        .map(|p| p.app_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        control_plane = %config.mulesoft.control_plane,
        environment = %config.mulesoft.env_id,
        interval_secs = scheduler.period().as_secs(),
        applications = %applications,
        "Log monitor started"
    );

    let monitor = &monitor;
    let cycles = scheduler
        .run(
            move || async move {
                monitor.run_cycle().await;
            },
            shutdown_signal(),
        )
        .await;

    info!(cycles, "Log monitor stopped");
    Ok(())
}

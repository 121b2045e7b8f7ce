//! One monitoring cycle over every configured pattern
//!
//! Authenticates once, then walks the patterns in configured order. For each
//! pattern the running instances are discovered and scanned; faults are
//! contained to the pattern or instance they happened in.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Local};
use futures::{stream, StreamExt};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::checkpoint::CheckpointStore;
use super::scanner::{LogScanner, MatchSink, ScanReport, ScanTarget};
use super::source::{AccessToken, CredentialProvider, LogSource};
use crate::config::Pattern;
use crate::utils::MonitorError;

#[derive(Debug)]
pub enum InstanceOutcome {
    Scanned(ScanReport),
    /// Checkpoint read or stream open failed; nothing was scanned
    Failed(MonitorError),
}

#[derive(Debug)]
pub struct InstanceReport {
    pub instance_id: String,
    pub outcome: InstanceOutcome,
}

impl InstanceReport {
    pub fn found_match(&self) -> bool {
        matches!(&self.outcome, InstanceOutcome::Scanned(scan) if scan.found_match())
    }
}

#[derive(Debug)]
pub enum PatternOutcome {
    Checked { instances: Vec<InstanceReport> },
    DiscoveryFailed(MonitorError),
}

#[derive(Debug)]
pub struct PatternReport {
    pub pattern_type: String,
    pub app_name: String,
    pub outcome: PatternOutcome,
}

impl PatternReport {
    pub fn found_match(&self) -> bool {
        match &self.outcome {
            PatternOutcome::Checked { instances } => instances.iter().any(InstanceReport::found_match),
            PatternOutcome::DiscoveryFailed(_) => false,
        }
    }

    pub fn instances(&self) -> &[InstanceReport] {
        match &self.outcome {
            PatternOutcome::Checked { instances } => instances,
            PatternOutcome::DiscoveryFailed(_) => &[],
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed,
    AuthenticationFailed(MonitorError),
}

#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Local>,
    pub outcome: CycleOutcome,
    pub patterns: Vec<PatternReport>,
}

impl CycleReport {
    /// True when any instance of any pattern produced a match
    pub fn any_match(&self) -> bool {
        self.patterns.iter().any(PatternReport::found_match)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Completed)
    }
}

/// Runs monitoring cycles against a log source
pub struct LogMonitor {
    patterns: Vec<Pattern>,
    credentials: Arc<dyn CredentialProvider>,
    source: Arc<dyn LogSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    alerts: Arc<dyn MatchSink>,
    scanner: LogScanner,
    max_concurrent_scans: usize,
}

impl LogMonitor {
    pub fn new(
        patterns: Vec<Pattern>,
        credentials: Arc<dyn CredentialProvider>,
        source: Arc<dyn LogSource>,
        checkpoints: Arc<dyn CheckpointStore>,
        alerts: Arc<dyn MatchSink>,
    ) -> Self {
        Self {
            patterns,
            credentials,
            source,
            checkpoints,
            alerts,
            scanner: LogScanner::default(),
            max_concurrent_scans: 1,
        }
    }

    pub fn with_scanner(mut self, scanner: LogScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Instances of one pattern scanned at the same time; at least 1
    pub fn with_max_concurrent_scans(mut self, limit: usize) -> Self {
        self.max_concurrent_scans = limit.max(1);
        self
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Run one full cycle. Never fails: every fault is logged and reported.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", cycle_id = %cycle_id);
        self.cycle(cycle_id).instrument(span).await
    }

    async fn cycle(&self, cycle_id: Uuid) -> CycleReport {
        let started_at = Local::now();
        let mut report = CycleReport {
            cycle_id,
            started_at,
            outcome: CycleOutcome::Completed,
            patterns: Vec::with_capacity(self.patterns.len()),
        };

        let token = match self.credentials.authenticate().await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, scope = e.scope(), "Authentication failed, skipping cycle");
                report.outcome = CycleOutcome::AuthenticationFailed(e);
                return report;
            }
        };

        let total = self.patterns.len();
        for (index, pattern) in self.patterns.iter().enumerate() {
            let pattern_report = self.check_pattern(index + 1, total, pattern, &token).await;
            report.patterns.push(pattern_report);
        }

        info!(
            matches = report.any_match(),
            "[{}] Check completed - New matches: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            if report.any_match() { "Yes" } else { "No" }
        );
        report
    }

    async fn check_pattern(
        &self,
        position: usize,
        total: usize,
        pattern: &Pattern,
        token: &AccessToken,
    ) -> PatternReport {
        let discovered = self.source.discover(&pattern.app_name, token).await;
        let outcome = match discovered {
            Err(e) => {
                error!(
                    error = %e,
                    app = %pattern.app_name,
                    pattern_type = %pattern.kind,
                    "Instance discovery failed, skipping pattern"
                );
                PatternOutcome::DiscoveryFailed(e)
            }
            Ok(instance_ids) => {
                let instance_ids = dedup_preserving_order(instance_ids);
                info!(
                    app = %pattern.app_name,
                    pattern_type = %pattern.kind,
                    "Pattern {}/{} - Monitoring {} [{} workers]",
                    position,
                    total,
                    pattern.app_name,
                    instance_ids.len()
                );
                if instance_ids.is_empty() {
                    warn!(app = %pattern.app_name, "No instances found for {}", pattern.app_name);
                }

                let instances = stream::iter(instance_ids)
                    .map(|instance_id| self.check_instance(pattern, instance_id, token))
                    .buffered(self.max_concurrent_scans)
                    .collect::<Vec<_>>()
                    .await;
                PatternOutcome::Checked { instances }
            }
        };

        PatternReport {
            pattern_type: pattern.kind.clone(),
            app_name: pattern.app_name.clone(),
            outcome,
        }
    }

    async fn check_instance(
        &self,
        pattern: &Pattern,
        instance_id: String,
        token: &AccessToken,
    ) -> InstanceReport {
        let outcome = match self.scan_instance(pattern, &instance_id, token).await {
            Ok(scan) => {
                info!(
                    app = %pattern.app_name,
                    instance = %instance_id,
                    "{} (from: {}) -> {}",
                    instance_id,
                    scan.started_from.as_deref().unwrap_or("start"),
                    if scan.found_match() { "Match" } else { "No Match" }
                );
                InstanceOutcome::Scanned(scan)
            }
            Err(e) => {
                error!(
                    error = %e,
                    scope = e.scope(),
                    app = %pattern.app_name,
                    instance = %instance_id,
                    pattern_type = %pattern.kind,
                    "Skipping instance"
                );
                InstanceOutcome::Failed(e)
            }
        };

        InstanceReport {
            instance_id,
            outcome,
        }
    }

    async fn scan_instance(
        &self,
        pattern: &Pattern,
        instance_id: &str,
        token: &AccessToken,
    ) -> Result<ScanReport, MonitorError> {
        let checkpoint = self.checkpoints.get(&pattern.app_name, instance_id)?;
        debug!(
            app = %pattern.app_name,
            instance = %instance_id,
            checkpoint = checkpoint.as_deref().unwrap_or("start"),
            "Opening log stream"
        );

        let lines = self
            .source
            .open_log_stream(&pattern.app_name, instance_id, token)
            .await?;

        let target = ScanTarget {
            pattern,
            instance_id,
            checkpoint: checkpoint.as_deref(),
        };
        Ok(self
            .scanner
            .scan(target, lines, self.checkpoints.as_ref(), self.alerts.as_ref())
            .await)
    }
}

fn dedup_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

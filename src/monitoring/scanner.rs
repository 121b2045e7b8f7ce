//! Incremental log stream scanner
//!
//! Scans one instance's log from the top and only starts matching once a
//! timestamped line newer than the stored checkpoint shows up:
//! - `Gated`: a checkpoint exists and no newer marker line was seen yet
//! - `Active`: every non-empty line is matched against the pattern
//!
//! Marker lines carry their timestamp as the text before the marker token
//! (`2024-01-01T10:00:05 INFO ...`). Timestamps are compared as plain strings.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use super::checkpoint::CheckpointStore;
use super::matcher::PatternMatcher;
use crate::config::Pattern;
use crate::utils::MonitorResult;

/// Default token identifying timestamped lines
pub const DEFAULT_MARKER_TOKEN: &str = "INFO";

/// One decoded line and its 1-based position in the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub number: usize,
    pub text: String,
}

/// A line of an active scan that matched the pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub pattern: Pattern,
    pub instance_id: String,
    pub line: LogLine,
    /// Last marker timestamp seen at or before this line
    pub timestamp: Option<String>,
}

/// Receives match events as soon as they are found
#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn on_match(&self, event: &MatchEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Gated,
    Active,
}

/// A line that could not be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub number: usize,
    pub reason: String,
}

/// How an instance scan ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTermination {
    Completed,
    /// Stream broke off; no checkpoint was written
    StreamFault(String),
    /// Stream was fully read but the checkpoint could not be saved
    CheckpointFault(String),
}

/// Outcome of scanning one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub instance_id: String,
    pub started_from: Option<String>,
    /// Highest line position reached, empty lines included
    pub lines_read: usize,
    pub bytes_read: usize,
    pub lines_processed: usize,
    pub skipped: Vec<SkippedLine>,
    pub matches: usize,
    /// Lexicographically greatest marker timestamp seen in this scan
    pub newest_timestamp: Option<String>,
    pub persisted_checkpoint: Option<String>,
    pub final_state: ScanState,
    pub termination: ScanTermination,
}

impl ScanReport {
    pub fn found_match(&self) -> bool {
        self.matches > 0
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.termination, ScanTermination::StreamFault(_))
    }
}

/// What is being scanned and where it resumes from
#[derive(Debug, Clone, Copy)]
pub struct ScanTarget<'a> {
    pub pattern: &'a Pattern,
    pub instance_id: &'a str,
    pub checkpoint: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct LogScanner {
    marker: String,
}

impl Default for LogScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_TOKEN)
    }
}

impl LogScanner {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Timestamp of a marker line: the trimmed text before the first marker
    /// token, if any
    pub fn extract_timestamp<'l>(&self, line: &'l str) -> Option<&'l str> {
        let (prefix, _) = line.split_once(self.marker.as_str())?;
        let prefix = prefix.trim();
        (!prefix.is_empty()).then_some(prefix)
    }

    /// Scan a stream to its end, emitting matches into `sink` and saving the
    /// newest timestamp into `checkpoints` when the stream ended normally.
    pub async fn scan<S>(
        &self,
        target: ScanTarget<'_>,
        mut lines: S,
        checkpoints: &dyn CheckpointStore,
        sink: &dyn MatchSink,
    ) -> ScanReport
    where
        S: Stream<Item = MonitorResult<Vec<u8>>> + Unpin + Send,
    {
        let pattern = target.pattern;
        let instance_id = target.instance_id;
        let matcher = PatternMatcher::for_pattern(pattern);

        let mut state = match target.checkpoint {
            Some(_) => ScanState::Gated,
            None => ScanState::Active,
        };
        let mut report = ScanReport {
            instance_id: instance_id.to_string(),
            started_from: target.checkpoint.map(str::to_string),
            lines_read: 0,
            bytes_read: 0,
            lines_processed: 0,
            skipped: Vec::new(),
            matches: 0,
            newest_timestamp: None,
            persisted_checkpoint: None,
            final_state: state,
            termination: ScanTermination::Completed,
        };
        let mut last_seen: Option<String> = None;

        while let Some(item) = lines.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    error!(
                        error = %e,
                        app = %pattern.app_name,
                        instance = %instance_id,
                        pattern_type = %pattern.kind,
                        line = report.lines_read + 1,
                        "Log stream failed, aborting instance scan"
                    );
                    report.termination = ScanTermination::StreamFault(e.to_string());
                    break;
                }
            };

            report.lines_read += 1;
            let number = report.lines_read;
            report.bytes_read += raw.len();

            let text = match decode_line(raw) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(reason) => {
                    warn!(
                        app = %pattern.app_name,
                        instance = %instance_id,
                        pattern_type = %pattern.kind,
                        line = number,
                        reason = %reason,
                        "Skipping malformed log line"
                    );
                    report.skipped.push(SkippedLine { number, reason });
                    continue;
                }
            };

            if let Some(timestamp) = self.extract_timestamp(&text) {
                if report
                    .newest_timestamp
                    .as_deref()
                    .map_or(true, |newest| timestamp > newest)
                {
                    report.newest_timestamp = Some(timestamp.to_string());
                }
                if state == ScanState::Gated
                    && target.checkpoint.is_some_and(|cp| timestamp > cp)
                {
                    debug!(instance = %instance_id, line = number, timestamp = %timestamp, "Passed checkpoint");
                    state = ScanState::Active;
                }
                last_seen = Some(timestamp.to_string());
            }

            if state == ScanState::Active && matcher.matches(&text) {
                info!(
                    pattern_type = %pattern.kind,
                    app = %pattern.app_name,
                    instance = %instance_id,
                    line = number,
                    "Match found [{}]: {}",
                    pattern.kind,
                    text
                );
                report.matches += 1;
                let event = MatchEvent {
                    pattern: pattern.clone(),
                    instance_id: instance_id.to_string(),
                    line: LogLine { number, text },
                    timestamp: last_seen.clone(),
                };
                sink.on_match(&event).await;
            }

            report.lines_processed += 1;
        }

        report.final_state = state;

        if report.termination == ScanTermination::Completed {
            self.persist_checkpoint(target, checkpoints, &mut report);
        }

        debug!(
            instance = %instance_id,
            lines = report.lines_read,
            bytes = report.bytes_read,
            skipped = report.skipped.len(),
            matches = report.matches,
            "Instance scan finished"
        );
        report
    }

    fn persist_checkpoint(
        &self,
        target: ScanTarget<'_>,
        checkpoints: &dyn CheckpointStore,
        report: &mut ScanReport,
    ) {
        let Some(newest) = report.newest_timestamp.as_deref() else {
            return;
        };
        // Never move the checkpoint backwards, e.g. after a log rotation
        let next = match target.checkpoint {
            Some(prior) if prior > newest => prior,
            _ => newest,
        };

        match checkpoints.set(&target.pattern.app_name, target.instance_id, next) {
            Ok(()) => report.persisted_checkpoint = Some(next.to_string()),
            Err(e) => {
                error!(
                    error = %e,
                    app = %target.pattern.app_name,
                    instance = %target.instance_id,
                    "Failed to persist checkpoint"
                );
                report.termination = ScanTermination::CheckpointFault(e.to_string());
            }
        }
    }
}

/// Decode one raw line. `Ok(None)` for empty lines, `Err` for line faults.
fn decode_line(mut raw: Vec<u8>) -> Result<Option<String>, String> {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    if raw.is_empty() {
        return Ok(None);
    }
    String::from_utf8(raw)
        .map(Some)
        .map_err(|e| format!("invalid UTF-8: {}", e.utf8_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::checkpoint::InMemoryCheckpointStore;
    use crate::utils::MonitorError;
    use futures::stream;
    use std::sync::Mutex;

    const APP: &str = "orders-api";
    const INSTANCE: &str = "i-1";

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<MatchEvent>>,
    }

    impl CollectingSink {
        fn events(&self) -> Vec<MatchEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MatchSink for CollectingSink {
        async fn on_match(&self, event: &MatchEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn pattern() -> Pattern {
        Pattern::new(
            "ERROR_X",
            "Connection refused",
            vec!["a@x.com".to_string()],
            APP,
        )
    }

    fn lines(items: &[&str]) -> impl Stream<Item = MonitorResult<Vec<u8>>> + Unpin + Send {
        let owned: Vec<MonitorResult<Vec<u8>>> =
            items.iter().map(|l| Ok(l.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    async fn run(
        items: &[&str],
        checkpoint: Option<&str>,
        store: &InMemoryCheckpointStore,
        sink: &CollectingSink,
    ) -> ScanReport {
        let pattern = pattern();
        let target = ScanTarget {
            pattern: &pattern,
            instance_id: INSTANCE,
            checkpoint,
        };
        LogScanner::default()
            .scan(target, lines(items), store, sink)
            .await
    }

    const SCENARIO: [&str; 2] = [
        "2024-01-01T10:00:00 INFO boot",
        "2024-01-01T10:00:05 INFO Connection    refused to db",
    ];

    #[test]
    fn should_extract_timestamp_before_marker() {
        let scanner = LogScanner::default();
        assert_eq!(
            scanner.extract_timestamp("2024-01-01T10:00:05 INFO started"),
            Some("2024-01-01T10:00:05")
        );
        assert_eq!(
            scanner.extract_timestamp("  2024-01-01 10:00:05,123  INFO x INFO y"),
            Some("2024-01-01 10:00:05,123")
        );
        assert_eq!(scanner.extract_timestamp("INFO no prefix"), None);
        assert_eq!(scanner.extract_timestamp("2024-01-01 ERROR boom"), None);
    }

    #[test]
    fn should_use_configured_marker() {
        let scanner = LogScanner::new("|");
        assert_eq!(scanner.marker(), "|");
        assert_eq!(scanner.extract_timestamp("T1 | ERROR x"), Some("T1"));
    }

    #[tokio::test]
    async fn should_match_and_persist_without_checkpoint() {
        // Arrange
        let store = InMemoryCheckpointStore::new();
        let sink = CollectingSink::default();

        // Act
        let report = run(&SCENARIO, None, &store, &sink).await;

        // Assert
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].line.number, 2);
        assert_eq!(events[0].line.text, SCENARIO[1]);
        assert_eq!(events[0].timestamp.as_deref(), Some("2024-01-01T10:00:05"));
        assert_eq!(events[0].instance_id, INSTANCE);
        assert!(report.found_match());
        assert_eq!(report.termination, ScanTermination::Completed);
        assert_eq!(
            store.get(APP, INSTANCE).unwrap().as_deref(),
            Some("2024-01-01T10:00:05")
        );
    }

    #[tokio::test]
    async fn should_not_match_lines_at_checkpoint() {
        // Arrange
        let store = InMemoryCheckpointStore::with_entry(APP, INSTANCE, "2024-01-01T10:00:05");
        let sink = CollectingSink::default();

        // Act
        let report = run(&SCENARIO, Some("2024-01-01T10:00:05"), &store, &sink).await;

        // Assert
        assert!(sink.events().is_empty());
        assert!(!report.found_match());
        assert_eq!(report.final_state, ScanState::Gated);
        assert_eq!(
            report.persisted_checkpoint.as_deref(),
            Some("2024-01-01T10:00:05")
        );
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn should_be_idempotent_on_unchanged_stream() {
        // Arrange
        let store = InMemoryCheckpointStore::new();
        let first_sink = CollectingSink::default();
        let first = run(&SCENARIO, None, &store, &first_sink).await;
        let checkpoint = first.persisted_checkpoint.clone();

        // Act
        let second_sink = CollectingSink::default();
        let second = run(&SCENARIO, checkpoint.as_deref(), &store, &second_sink).await;

        // Assert
        assert_eq!(first_sink.events().len(), 1);
        assert!(second_sink.events().is_empty());
        assert_eq!(second.persisted_checkpoint, checkpoint);
    }

    #[tokio::test]
    async fn should_match_only_lines_after_checkpoint() {
        // Arrange
        let items = [
            "T1 INFO Connection refused early",
            "plain Connection refused while gated",
            "T2 INFO Connection refused at checkpoint",
            "T3 INFO Connection refused later",
            "plain Connection refused after activation",
            "T4 INFO all good",
        ];
        let store = InMemoryCheckpointStore::new();
        let sink = CollectingSink::default();

        // Act
        let report = run(&items, Some("T2"), &store, &sink).await;

        // Assert
        let numbers: Vec<usize> = sink.events().iter().map(|e| e.line.number).collect();
        assert_eq!(numbers, vec![4, 5]);
        assert_eq!(sink.events()[1].timestamp.as_deref(), Some("T3"));
        assert_eq!(report.final_state, ScanState::Active);
        assert_eq!(report.persisted_checkpoint.as_deref(), Some("T4"));
    }

    #[tokio::test]
    async fn should_advance_checkpoint_to_newest_timestamp() {
        // Arrange
        let store = InMemoryCheckpointStore::new();
        let sink = CollectingSink::default();

        // Act
        run(&["T1 INFO a", "T2 INFO b"], None, &store, &sink).await;
        let follow_up = CollectingSink::default();
        let report = run(
            &["T1 INFO Connection refused", "T2 INFO Connection refused"],
            Some("T2"),
            &store,
            &follow_up,
        )
        .await;

        // Assert
        assert_eq!(report.started_from.as_deref(), Some("T2"));
        assert!(follow_up.events().is_empty());
        assert_eq!(store.get(APP, INSTANCE).unwrap().as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn should_never_move_checkpoint_backwards() {
        // Arrange
        let store = InMemoryCheckpointStore::with_entry(APP, INSTANCE, "T5");
        let sink = CollectingSink::default();

        // Act
        let report = run(&["T1 INFO rotated", "T2 INFO log"], Some("T5"), &store, &sink).await;

        // Assert
        assert_eq!(report.newest_timestamp.as_deref(), Some("T2"));
        assert_eq!(report.persisted_checkpoint.as_deref(), Some("T5"));
        assert_eq!(store.get(APP, INSTANCE).unwrap().as_deref(), Some("T5"));
    }

    #[tokio::test]
    async fn should_not_write_checkpoint_without_marker_lines() {
        // Arrange
        let store = InMemoryCheckpointStore::new();
        let sink = CollectingSink::default();

        // Act
        let report = run(
            &["plain Connection refused", "another plain line"],
            None,
            &store,
            &sink,
        )
        .await;

        // Assert
        assert_eq!(sink.events().len(), 1);
        assert!(sink.events()[0].timestamp.is_none());
        assert!(report.persisted_checkpoint.is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn should_skip_empty_lines_but_count_positions() {
        // Arrange
        let store = InMemoryCheckpointStore::new();
        let sink = CollectingSink::default();

        // Act
        let report = run(
            &["T1 INFO boot", "", "\r", "T2 INFO Connection refused\r"],
            None,
            &store,
            &sink,
        )
        .await;

        // Assert
        assert_eq!(report.lines_read, 4);
        assert_eq!(report.lines_processed, 2);
        assert_eq!(sink.events()[0].line.number, 4);
        assert_eq!(sink.events()[0].line.text, "T2 INFO Connection refused");
    }

    #[tokio::test]
    async fn should_isolate_malformed_line() {
        // Arrange
        let mut items: Vec<MonitorResult<Vec<u8>>> = (1..=10)
            .map(|i| Ok(format!("T{:02} INFO Connection refused #{}", i, i).into_bytes()))
            .collect();
        items[4] = Ok(vec![b'T', b'9', b'9', b' ', 0xff, 0xfe, b'x']);
        let pattern = pattern();
        let store = InMemoryCheckpointStore::new();
        let sink = CollectingSink::default();
        let target = ScanTarget {
            pattern: &pattern,
            instance_id: INSTANCE,
            checkpoint: None,
        };

        // Act
        let report = LogScanner::default()
            .scan(target, stream::iter(items), &store, &sink)
            .await;

        // Assert
        let numbers: Vec<usize> = sink.events().iter().map(|e| e.line.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].number, 5);
        assert!(report.skipped[0].reason.contains("UTF-8"));
        assert_eq!(report.termination, ScanTermination::Completed);
        assert_eq!(store.get(APP, INSTANCE).unwrap().as_deref(), Some("T10"));
    }

    #[tokio::test]
    async fn should_abort_without_checkpoint_on_stream_fault() {
        // Arrange
        let items: Vec<MonitorResult<Vec<u8>>> = vec![
            Ok(b"T1 INFO Connection refused".to_vec()),
            Err(MonitorError::stream("connection reset by peer")),
            Ok(b"T2 INFO Connection refused".to_vec()),
        ];
        let pattern = pattern();
        let store = InMemoryCheckpointStore::new();
        let sink = CollectingSink::default();
        let target = ScanTarget {
            pattern: &pattern,
            instance_id: INSTANCE,
            checkpoint: None,
        };

        // Act
        let report = LogScanner::default()
            .scan(target, stream::iter(items), &store, &sink)
            .await;

        // Assert
        assert!(report.is_aborted());
        assert_eq!(sink.events().len(), 1);
        assert_eq!(report.lines_read, 1);
        assert_eq!(report.newest_timestamp.as_deref(), Some("T1"));
        assert!(report.persisted_checkpoint.is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn should_report_checkpoint_write_failure() {
        // Arrange
        struct FailingStore;
        impl CheckpointStore for FailingStore {
            fn get(&self, _: &str, _: &str) -> MonitorResult<Option<String>> {
                Ok(None)
            }
            fn set(&self, _: &str, _: &str, _: &str) -> MonitorResult<()> {
                Err(MonitorError::checkpoint("disk full"))
            }
        }
        let pattern = pattern();
        let sink = CollectingSink::default();
        let target = ScanTarget {
            pattern: &pattern,
            instance_id: INSTANCE,
            checkpoint: None,
        };

        // Act
        let report = LogScanner::default()
            .scan(target, lines(&SCENARIO), &FailingStore, &sink)
            .await;

        // Assert
        assert_eq!(sink.events().len(), 1);
        assert!(matches!(
            report.termination,
            ScanTermination::CheckpointFault(ref msg) if msg.contains("disk full")
        ));
        assert!(report.persisted_checkpoint.is_none());
    }
}

//! Log monitoring pipeline
//!
//! - Pattern matching and incremental log scanning
//! - Per-instance checkpoints
//! - Email alerts for matches
//! - Cycle orchestration and scheduling

pub mod alert;
pub mod checkpoint;
pub mod email_alert;
pub mod matcher;
pub mod orchestrator;
pub mod scanner;
pub mod scheduler;
pub mod source;

pub use alert::{AlertDispatcher, DispatchReport, Notifier};
pub use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use email_alert::SmtpNotifier;
pub use matcher::{matches, normalize, PatternMatcher};
pub use orchestrator::{
    CycleOutcome, CycleReport, InstanceOutcome, InstanceReport, LogMonitor, PatternOutcome,
    PatternReport,
};
pub use scanner::{
    LogLine, LogScanner, MatchEvent, MatchSink, ScanReport, ScanState, ScanTarget,
    ScanTermination, SkippedLine,
};
pub use scheduler::Scheduler;
pub use source::{AccessToken, CredentialProvider, LogSource, LogStream};

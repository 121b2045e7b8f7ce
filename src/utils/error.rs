//! Monitor-wide error type
//!
//! One variant per failure scope. Each fault is resolved at the narrowest
//! scope it belongs to; only `Config` and `Auth` are allowed to end more than
//! a single pattern, instance, line or recipient.

use thiserror::Error;

/// Result alias used by the monitoring components
pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Startup configuration could not be loaded (process scope)
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential could not be acquired (cycle scope)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Instance listing failed (pattern scope)
    #[error("instance discovery failed: {0}")]
    Discovery(String),

    /// Log stream could not be opened or read further (instance scope)
    #[error("log stream error: {0}")]
    Stream(String),

    /// Checkpoint could not be read or persisted (instance scope)
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Notification could not be delivered (recipient scope)
    #[error("notification failed: {0}")]
    Notify(String),
}

impl From<crate::config::ConfigError> for MonitorError {
    fn from(err: crate::config::ConfigError) -> Self {
        MonitorError::Config(err.to_string())
    }
}

impl MonitorError {
    pub fn config(msg: impl Into<String>) -> Self {
        MonitorError::Config(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        MonitorError::Auth(msg.into())
    }

    pub fn discovery(msg: impl Into<String>) -> Self {
        MonitorError::Discovery(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        MonitorError::Stream(msg.into())
    }

    pub fn checkpoint(msg: impl Into<String>) -> Self {
        MonitorError::Checkpoint(msg.into())
    }

    pub fn notify(msg: impl Into<String>) -> Self {
        MonitorError::Notify(msg.into())
    }

    /// Short scope label used in log fields
    pub fn scope(&self) -> &'static str {
        match self {
            MonitorError::Config(_) => "process",
            MonitorError::Auth(_) => "cycle",
            MonitorError::Discovery(_) => "pattern",
            MonitorError::Stream(_) => "instance",
            MonitorError::Checkpoint(_) => "instance",
            MonitorError::Notify(_) => "recipient",
        }
    }
}

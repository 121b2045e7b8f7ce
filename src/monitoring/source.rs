//! Collaborator interfaces for credentials and log retrieval

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::utils::MonitorResult;

/// Ordered raw log lines without terminators. An `Err` item is a stream
/// fault: nothing more can be read from this stream.
pub type LogStream = BoxStream<'static, MonitorResult<Vec<u8>>>;

/// Bearer credential obtained once per cycle
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Acquires the platform credential
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn authenticate(&self) -> MonitorResult<AccessToken>;
}

/// Lists application instances and streams their logs
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Instance ids currently running for an application
    async fn discover(&self, app_name: &str, token: &AccessToken) -> MonitorResult<Vec<String>>;

    /// Open the full log of one instance, oldest line first
    async fn open_log_stream(
        &self,
        app_name: &str,
        instance_id: &str,
        token: &AccessToken,
    ) -> MonitorResult<LogStream>;
}

//! Alert dispatch for pattern matches
//!
//! Turns each `MatchEvent` into one plain-text notification and delivers it
//! to every recipient of the pattern independently.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument};

use super::scanner::{MatchEvent, MatchSink};
use crate::config::{ControlPlane, MulesoftConfig};
use crate::utils::MonitorResult;

/// Delivers one message to one recipient
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> MonitorResult<()>;
}

/// Per-event delivery tally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    control_plane: ControlPlane,
    environment: String,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, mulesoft: &MulesoftConfig) -> Self {
        Self::with_context(notifier, mulesoft.control_plane, mulesoft.env_id.clone())
    }

    pub fn with_context(
        notifier: Arc<dyn Notifier>,
        control_plane: ControlPlane,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            control_plane,
            environment: environment.into(),
        }
    }

    pub fn build_subject(&self, event: &MatchEvent) -> String {
        format!(
            "Log Alert: {} - {}",
            event.pattern.kind, event.pattern.app_name
        )
    }

    pub fn build_body(&self, event: &MatchEvent) -> String {
        format!(
            "Alert Details:\n\
             Application: {}\n\
             Worker: {}\n\
             Control Plane: {}\n\
             Environment: {}\n\
             Type: {}\n\
             Pattern: {}\n\n\
             Log Entry:\n{}\n\n\
             Time: {}\n",
            event.pattern.app_name,
            event.instance_id,
            self.control_plane,
            self.environment,
            event.pattern.kind,
            event.pattern.search_string,
            event.line.text,
            event.timestamp.as_deref().unwrap_or("unknown"),
        )
    }

    /// Send the alert to every recipient. Failures are logged per recipient
    /// and never stop delivery to the rest.
    #[instrument(skip_all, fields(app = %event.pattern.app_name, instance = %event.instance_id, pattern_type = %event.pattern.kind))]
    pub async fn dispatch(&self, event: &MatchEvent) -> DispatchReport {
        let subject = self.build_subject(event);
        let body = self.build_body(event);
        let mut report = DispatchReport::default();

        for recipient in &event.pattern.recipients {
            match self.notifier.send(recipient, &subject, &body).await {
                Ok(()) => {
                    info!(recipient = %recipient, "Alert sent");
                    report.delivered.push(recipient.clone());
                }
                Err(e) => {
                    error!(error = %e, recipient = %recipient, "Failed to send alert");
                    report.failed.push(recipient.clone());
                }
            }
        }

        report
    }
}

#[async_trait]
impl MatchSink for AlertDispatcher {
    async fn on_match(&self, event: &MatchEvent) {
        self.dispatch(event).await;
    }
}

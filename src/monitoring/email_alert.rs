//! SMTP delivery of alert notifications

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error};

use super::alert::Notifier;
use crate::config::SmtpConfig;
use crate::utils::{MonitorError, MonitorResult};

/// Sends one plain-text message per recipient through an SMTP relay
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> MonitorResult<Self> {
        let sender: Mailbox = config.sender.parse().map_err(|e| {
            error!(error = %e, sender = %config.sender, "Invalid SMTP sender address");
            MonitorError::config(format!("Invalid SMTP sender '{}': {}", config.sender, e))
        })?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                error!(error = %e, host = %config.host, "Failed to configure SMTP relay");
                MonitorError::config(format!("Invalid SMTP relay '{}': {}", config.host, e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        debug!(host = %config.host, port = config.port, tls = config.use_tls, "SMTP notifier ready");
        Ok(Self { transport, sender })
    }

    fn build_message(&self, recipient: &str, subject: &str, body: &str) -> MonitorResult<Message> {
        let to: Mailbox = recipient
            .trim()
            .parse()
            .map_err(|e| MonitorError::notify(format!("Invalid recipient '{}': {}", recipient, e)))?;

        Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MonitorError::notify(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> MonitorResult<()> {
        let message = self.build_message(recipient, subject, body)?;

        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, recipient = %recipient, "SMTP delivery failed");
            MonitorError::notify(format!("SMTP delivery to {} failed: {}", recipient, e))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sender: &str) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "alerts".to_string(),
            password: "secret".to_string(),
            sender: sender.to_string(),
            use_tls: true,
        }
    }

    #[tokio::test]
    async fn should_reject_invalid_sender() {
        // Act
        let result = SmtpNotifier::new(&config("not an address"));

        // Assert
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }

    #[tokio::test]
    async fn should_build_plain_text_message() {
        // Arrange
        let notifier = SmtpNotifier::new(&config("alerts@example.com")).expect("Failed to build");

        // Act
        let message = notifier
            .build_message("ops@example.com", "Log Alert: ERROR_X - orders-api", "Alert Details:")
            .expect("Failed to build message");

        // Assert
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("From: alerts@example.com"));
        assert!(raw.contains("Subject: Log Alert: ERROR_X - orders-api"));
        assert!(raw.contains("text/plain"));
    }

    #[tokio::test]
    async fn should_fail_on_invalid_recipient() {
        // Arrange
        let notifier = SmtpNotifier::new(&config("alerts@example.com")).expect("Failed to build");

        // Act
        let result = notifier.build_message("nobody", "s", "b");

        // Assert
        assert!(matches!(result, Err(MonitorError::Notify(_))));
    }
}

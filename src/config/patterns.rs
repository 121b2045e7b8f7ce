//! Alert pattern definitions
//!
//! Patterns are read once at startup from a JSON array:
//!
//! ```json
//! [
//!   {
//!     "type": "ERROR_X",
//!     "search_string": "Connection refused",
//!     "mail": ["ops@example.com"],
//!     "app_name": "orders-api"
//!   }
//! ]
//! ```

use std::fs;
use std::path::Path;

use lettre::Address;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

use super::ConfigError;
use crate::monitoring::matcher::normalize;

/// Configured rule pairing a search string with the recipients to notify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Pattern {
    /// Alert category shown in notifications
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "type must not be empty"))]
    pub kind: String,

    #[validate(custom(function = "validate_search_string"))]
    pub search_string: String,

    /// Notification addresses, in delivery order
    #[serde(rename = "mail", alias = "recipients")]
    #[validate(custom(function = "validate_recipients"))]
    pub recipients: Vec<String>,

    #[validate(length(min = 1, message = "app_name must not be empty"))]
    pub app_name: String,
}

impl Pattern {
    pub fn new(
        kind: impl Into<String>,
        search_string: impl Into<String>,
        recipients: Vec<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            search_string: search_string.into(),
            recipients,
            app_name: app_name.into(),
        }
    }
}

fn validate_search_string(value: &str) -> Result<(), ValidationError> {
    if normalize(value).is_empty() {
        return Err(ValidationError::new("empty_search_string")
            .with_message("search_string must contain non-whitespace text".into()));
    }
    Ok(())
}

fn validate_recipients(value: &[String]) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new("no_recipients")
            .with_message("at least one recipient is required".into()));
    }
    if let Some(bad) = value.iter().find(|r| r.trim().parse::<Address>().is_err()) {
        let mut err = ValidationError::new("invalid_recipient")
            .with_message("recipient is not a valid email address".into());
        err.add_param("value".into(), bad);
        return Err(err);
    }
    Ok(())
}

/// Parse and validate a pattern list from JSON text
pub fn parse_patterns(content: &str, source: &str) -> Result<Vec<Pattern>, ConfigError> {
    let patterns: Vec<Pattern> =
        serde_json::from_str(content).map_err(|e| ConfigError::PatternsMalformed {
            path: source.to_string(),
            source: e,
        })?;

    for (index, pattern) in patterns.iter().enumerate() {
        pattern
            .validate()
            .map_err(|e| ConfigError::InvalidPattern {
                index: index + 1,
                reason: e.to_string(),
            })?;
    }

    Ok(patterns)
}

/// Load the ordered pattern list from a file
pub fn load_patterns(path: &Path) -> Result<Vec<Pattern>, ConfigError> {
    let file = path.display().to_string();

    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = %e, file = %file, "Failed to read patterns file");
        ConfigError::PatternsUnreadable {
            path: file.clone(),
            source: e,
        }
    })?;

    let patterns = parse_patterns(&content, &file).inspect_err(|e| {
        error!(error = %e, file = %file, "Failed to load patterns");
    })?;

    if patterns.is_empty() {
        warn!(file = %file, "Patterns file contains no patterns, nothing will be monitored");
    } else {
        info!(file = %file, count = patterns.len(), "Loaded search patterns");
    }

    Ok(patterns)
}

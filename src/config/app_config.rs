use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_PATTERNS_FILE: &str = "patterns.json";
const DEFAULT_CHECKPOINT_DIR: &str = "last_check";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_TIMESTAMP_MARKER: &str = "INFO";
const DEFAULT_MAX_CONCURRENT_SCANS: usize = 1;

const REQUIRED_VARS: [&str; 8] = [
    "MULESOFT_CLIENT_ID",
    "MULESOFT_CLIENT_SECRET",
    "MULESOFT_ORG_ID",
    "MULESOFT_ENV_ID",
    "SMTP_HOST",
    "SMTP_USERNAME",
    "SMTP_PASSWORD",
    "SMTP_SENDER",
];

/// Anypoint control plane hosting the organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPlane {
    #[default]
    Us,
    Eu,
    Gov,
}

impl ControlPlane {
    /// Identifier used in configuration and alert bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlPlane::Us => "us",
            ControlPlane::Eu => "eu1",
            ControlPlane::Gov => "gov",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            ControlPlane::Us => "https://anypoint.mulesoft.com",
            ControlPlane::Eu => "https://eu1.anypoint.mulesoft.com",
            ControlPlane::Gov => "https://gov.anypoint.mulesoft.com",
        }
    }
}

impl FromStr for ControlPlane {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "us" => Ok(ControlPlane::Us),
            "eu1" => Ok(ControlPlane::Eu),
            "gov" => Ok(ControlPlane::Gov),
            other => Err(ConfigError::InvalidControlPlane(other.to_string())),
        }
    }
}

impl fmt::Display for ControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anypoint platform access settings
#[derive(Clone)]
pub struct MulesoftConfig {
    pub client_id: String,
    pub client_secret: String,
    pub org_id: String,
    pub env_id: String,
    pub control_plane: ControlPlane,
}

impl MulesoftConfig {
    /// CloudHub v2 API root
    pub fn api_base_url(&self) -> String {
        format!("{}/cloudhub/api/v2", self.control_plane.base_url())
    }

    /// OAuth2 token endpoint
    pub fn auth_url(&self) -> String {
        format!("{}/accounts/api/v2/oauth2/token", self.control_plane.base_url())
    }
}

impl fmt::Debug for MulesoftConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MulesoftConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("org_id", &self.org_id)
            .field("env_id", &self.env_id)
            .field("control_plane", &self.control_plane)
            .finish()
    }
}

/// Outgoing mail server settings
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
    pub use_tls: bool,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sender", &self.sender)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

/// Process-wide configuration, built once at startup and passed by reference
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mulesoft: MulesoftConfig,
    pub smtp: SmtpConfig,
    pub check_interval: Duration,
    pub verbose_logging: bool,
    pub patterns_file: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Token whose preceding text is taken as a line's timestamp
    pub timestamp_marker: String,
    pub max_concurrent_scans: usize,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_VARS
            .into_iter()
            .filter(|key| get(key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVariables(missing));
        }
        let required = |key: &str| get(key).unwrap_or_default();

        let control_plane = match get("MULESOFT_CONTROL_PLANE") {
            Some(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %value, "Invalid control plane, defaulting to us");
                ControlPlane::Us
            }),
            None => ControlPlane::Us,
        };

        let check_interval_secs: u64 = parse_or(
            "CHECK_INTERVAL_SECONDS",
            get("CHECK_INTERVAL_SECONDS"),
            DEFAULT_CHECK_INTERVAL_SECS,
        )?;
        if check_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        let max_concurrent_scans: usize = parse_or(
            "MAX_CONCURRENT_SCANS",
            get("MAX_CONCURRENT_SCANS"),
            DEFAULT_MAX_CONCURRENT_SCANS,
        )?;
        if max_concurrent_scans == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        let smtp_port = parse_or("SMTP_PORT", get("SMTP_PORT"), DEFAULT_SMTP_PORT)?;

        Ok(Self {
            mulesoft: MulesoftConfig {
                client_id: required("MULESOFT_CLIENT_ID"),
                client_secret: required("MULESOFT_CLIENT_SECRET"),
                org_id: required("MULESOFT_ORG_ID"),
                env_id: required("MULESOFT_ENV_ID"),
                control_plane,
            },
            smtp: SmtpConfig {
                host: required("SMTP_HOST"),
                port: smtp_port,
                username: required("SMTP_USERNAME"),
                password: required("SMTP_PASSWORD"),
                sender: required("SMTP_SENDER"),
                use_tls: get("SMTP_USE_TLS").map(|v| parse_flag(&v)).unwrap_or(true),
            },
            check_interval: Duration::from_secs(check_interval_secs),
            verbose_logging: get("VERBOSE_LOGGING")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            patterns_file: PathBuf::from(
                get("PATTERNS_FILE").unwrap_or_else(|| DEFAULT_PATTERNS_FILE.to_string()),
            ),
            checkpoint_dir: PathBuf::from(
                get("CHECKPOINT_DIR").unwrap_or_else(|| DEFAULT_CHECKPOINT_DIR.to_string()),
            ),
            log_dir: PathBuf::from(get("LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())),
            timestamp_marker: get("TIMESTAMP_MARKER")
                .unwrap_or_else(|| DEFAULT_TIMESTAMP_MARKER.to_string()),
            max_concurrent_scans,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            name: name.to_string(),
            value: v,
        }),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
    #[error("Invalid numeric value for {name}: {value}")]
    InvalidNumber { name: String, value: String },
    #[error("Check interval must be greater than zero")]
    InvalidInterval,
    #[error("Maximum concurrent scans must be greater than zero")]
    InvalidConcurrency,
    #[error("Invalid control plane: {0}")]
    InvalidControlPlane(String),
    #[error("Unable to read patterns file {path}: {source}")]
    PatternsUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed patterns file {path}: {source}")]
    PatternsMalformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid pattern #{index}: {reason}")]
    InvalidPattern { index: usize, reason: String },
}

pub mod app_config;
pub mod patterns;

pub use app_config::{AppConfig, ConfigError, ControlPlane, MulesoftConfig, SmtpConfig};
pub use patterns::{load_patterns, parse_patterns, Pattern};

pub mod error;
pub mod logging;

pub use error::{MonitorError, MonitorResult};
pub use logging::init_logging;

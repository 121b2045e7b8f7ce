use std::process::ExitCode;

use log_monitor::config::AppConfig;
use log_monitor::utils::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Environment
    dotenvy::dotenv().ok();

    // 2. Configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // 3. Logging
    let _guard = init_logging(&config.log_dir, config.verbose_logging);

    // 4. Monitor loop
    match log_monitor::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, scope = e.scope(), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

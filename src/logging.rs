use anyhow::Context;
use flexi_logger::Logger;

use crate::config;

/// Start the stderr logger at the requested level. Diagnostics go to
/// stderr so stdout carries nothing but the run summary.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    Logger::try_with_str(level)
        .with_context(|| format!("invalid log level {level:?}"))?
        .log_to_stderr()
        .format(flexi_logger::detailed_format)
        .start()
        .context("failed to start logger")?;

    log::info!("{}", "=".repeat(60));
    log::info!("sd-embeddings-sync starting");
    log::info!("Version: {}", config::APP_VERSION);
    log::info!("Platform: {}", std::env::consts::OS);
    log::info!("{}", "=".repeat(60));

    Ok(())
}

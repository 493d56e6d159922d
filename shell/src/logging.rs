use crate::config::ShellConfig;
use anyhow::{Context, Result};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};
use std::fs::OpenOptions;

/// Installs a file logger when `PIPESHELL_LOG` names a file.
///
/// The terminal is never logged to; it belongs to the line editor and the
/// commands being run.
pub fn init(config: &ShellConfig) -> Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let log_config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Debug)
        .set_target_level(LevelFilter::Debug)
        .build();
    WriteLogger::init(config.log_level, log_config, file).context("installing logger")?;
    log::info!("logging to {} at {}", path.display(), config.log_level);
    Ok(())
}

use std::path::PathBuf;

use anyhow::Context;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};

use crate::config;

pub fn init_logging() -> anyhow::Result<()> {
    let log_dir = app_log_dir()?;

    // File keeps everything at the configured level; stderr mirrors INFO+ so the
    // CLI user sees progress. RUST_LOG overrides the default level.
    Logger::try_with_env_or_str(config::logging::DEFAULT_LEVEL)?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(config::logging::LOG_FILE_NAME),
        )
        .rotate(
            Criterion::Size(config::logging::LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config::logging::LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stderr(Duplicate::Info)
        .format(flexi_logger::detailed_format)
        .start()
        .context("failed to start logger")?;

    log::info!("{}", "=".repeat(60));
    log::info!("inbox-search starting");
    log::info!("Version: {}", config::APP_VERSION);
    log::info!("Platform: {}", std::env::consts::OS);
    log::info!("{}", "=".repeat(60));

    Ok(())
}

fn app_log_dir() -> anyhow::Result<PathBuf> {
    let home = home_dir().context("cannot determine home directory for logs")?;
    let dir = home.join(config::logging::LOG_DIR_REL);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed creating log dir {}", dir.display()))?;
    Ok(dir)
}

pub fn home_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("HOME") {
        if !v.is_empty() {
            return Some(PathBuf::from(v));
        }
    }
    // Windows fallback
    if let Ok(v) = std::env::var("USERPROFILE") {
        if !v.is_empty() {
            return Some(PathBuf::from(v));
        }
    }
    None
}

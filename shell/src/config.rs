use log::LevelFilter;
use std::path::PathBuf;

/// Prompt printed before every line.
pub const PROMPT: &str = "$ ";

pub const HISTFILE_VAR: &str = "HISTFILE";
pub const LOG_FILE_VAR: &str = "PIPESHELL_LOG";
pub const LOG_LEVEL_VAR: &str = "PIPESHELL_LOG_LEVEL";

/// Startup settings read once from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// History file loaded at startup and written on exit.
    pub histfile: Option<PathBuf>,
    /// Debug log destination. No logging when unset.
    pub log_file: Option<PathBuf>,
    pub log_level: LevelFilter,
}

impl ShellConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable lookup. Empty values count as unset
    /// and an unknown log level falls back to `info`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str| lookup(key).filter(|v: &String| !v.is_empty()).map(PathBuf::from);
        let log_level = lookup(LOG_LEVEL_VAR)
            .and_then(|level| level.trim().parse().ok())
            .unwrap_or(LevelFilter::Info);
        Self {
            histfile: path(HISTFILE_VAR),
            log_file: path(LOG_FILE_VAR),
            log_level,
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

// ABOUTME: Configuration for the backup store: where scratch files live.
// ABOUTME: Reads RFSCAN_HOME from the environment, falling back to ~/.rtlsdr_scanner.

use std::path::PathBuf;

use thiserror::Error;

/// Directory name used under the user's home when RFSCAN_HOME is unset.
pub const DEFAULT_DIR_NAME: &str = ".rtlsdr_scanner";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("neither RFSCAN_HOME nor HOME is set; cannot locate the backup directory")]
    NoHome,
}

/// Backup store configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    /// Directory holding every process's scratch file. Created on open.
    pub root: PathBuf,
}

impl BackupConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - RFSCAN_HOME: backup directory (default: ~/.rtlsdr_scanner)
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Some(root) = non_empty_var("RFSCAN_HOME") {
            return Ok(Self::new(root));
        }

        let home = non_empty_var("HOME")
            .or_else(|| non_empty_var("USERPROFILE"))
            .ok_or(ConfigError::NoHome)?;

        Ok(Self::new(PathBuf::from(home).join(DEFAULT_DIR_NAME)))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

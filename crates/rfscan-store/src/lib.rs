// ABOUTME: Backup store for rfscan: crash-safe autosave of the scan in progress and recovery browsing.
// ABOUTME: Provides the BackupManager, its catalog entries, and directory configuration.

pub mod backup;
pub mod config;

pub use backup::{BackupEntry, BackupError, BackupManager, PREFIX};
pub use config::{BackupConfig, ConfigError};

// ABOUTME: Crash-safe autosave of the in-progress scan and recovery of backups left by earlier runs.
// ABOUTME: Saves run on one background worker at a time; requests made while it is busy are dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use rfscan_core::ScanSession;
use rfscan_core::codec::legacy::{decode_snapshot, encode_snapshot};
use rfscan_core::codec::{CodecError, RecordError};
use thiserror::Error;
use ulid::Ulid;

use crate::config::BackupConfig;

/// File name prefix shared by every process's scratch file.
pub const PREFIX: &str = "rsba_";

/// Errors that can occur during backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("encode error: {0}")]
    Encode(#[from] RecordError),

    #[error("no backup at index {0}")]
    NoSuchBackup(usize),
}

/// A scratch file left behind by another process.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

impl BackupEntry {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Owns this process's scratch file and the catalog of recoverable ones.
///
/// Dropping the manager without calling [`BackupManager::close`] leaves the
/// scratch file on disk so the next run can offer it for recovery.
pub struct BackupManager {
    root: PathBuf,
    scratch: PathBuf,
    in_flight: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    completed: Arc<AtomicU64>,
    entries: Vec<BackupEntry>,
}

/// Clears the in-flight flag when the worker ends, even by panicking.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BackupManager {
    /// Create the backup root if needed, claim a fresh scratch file, and scan
    /// for scratch files left by other processes.
    pub fn open(config: &BackupConfig) -> Result<Self, BackupError> {
        fs::create_dir_all(&config.root)?;
        let scratch = create_scratch(&config.root)?;
        let entries = scan(&config.root, &scratch)?;

        tracing::info!(
            "backup scratch file {}, {} recoverable backups",
            scratch.display(),
            entries.len()
        );

        Ok(Self {
            root: config.root.clone(),
            scratch,
            in_flight: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            completed: Arc::new(AtomicU64::new(0)),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of this process's own scratch file.
    pub fn scratch_path(&self) -> &Path {
        &self.scratch
    }

    /// Hand a snapshot to the background worker without blocking.
    ///
    /// Returns `false` when a save is already running; the snapshot is then
    /// discarded rather than queued.
    pub fn save(&self, snapshot: Arc<ScanSession>) -> bool {
        let mut slot = self.worker_slot();

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("backup in progress, dropping snapshot");
            return false;
        }

        let guard = InFlight(Arc::clone(&self.in_flight));
        let path = self.scratch.clone();
        let staging = staging_path(&self.scratch);
        let completed = Arc::clone(&self.completed);

        let spawned = thread::Builder::new()
            .name("backup".to_string())
            .spawn(move || {
                let _guard = guard;
                match write_snapshot(&path, &staging, &snapshot) {
                    Ok(bytes) => {
                        completed.fetch_add(1, Ordering::AcqRel);
                        tracing::debug!(
                            "backed up {} sweeps ({} bytes)",
                            snapshot.sweep_count(),
                            bytes
                        );
                    }
                    Err(e) => {
                        tracing::warn!("backup to {} failed: {}", path.display(), e);
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                true
            }
            Err(e) => {
                tracing::warn!("could not start backup worker: {}", e);
                false
            }
        }
    }

    /// Whether a save is currently running.
    pub fn is_saving(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of saves that reached disk since open.
    pub fn completed_saves(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Block until the running save, if any, has finished.
    pub fn wait(&self) {
        let handle = self.worker_slot().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!("backup worker panicked");
        }
    }

    /// Rescan the backup root and return the recoverable backups, newest first.
    /// Empty scratch files are deleted along the way.
    pub fn catalog(&mut self) -> Result<&[BackupEntry], BackupError> {
        self.entries = scan(&self.root, &self.scratch)?;
        Ok(&self.entries)
    }

    /// The catalog as of the last scan.
    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    /// Decode the backup at `index` in the current catalog.
    pub fn load(&self, index: usize) -> Result<ScanSession, BackupError> {
        let entry = self.entry(index)?;
        let bytes = fs::read(&entry.path)?;
        let session = decode_snapshot(&bytes)?;

        tracing::info!(
            "loaded backup {} ({} sweeps)",
            entry.name(),
            session.sweep_count()
        );
        Ok(session)
    }

    /// Delete the backup at `index` and rescan.
    pub fn delete(&mut self, index: usize) -> Result<(), BackupError> {
        let path = self.entry(index)?.path.clone();
        fs::remove_file(&path)?;
        tracing::info!("deleted backup {}", path.display());

        self.entries = scan(&self.root, &self.scratch)?;
        Ok(())
    }

    /// Remove this process's scratch file. Call only on a clean shutdown.
    pub fn close(self) -> Result<(), BackupError> {
        self.wait();
        for path in [staging_path(&self.scratch), self.scratch.clone()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!("removed backup scratch file {}", self.scratch.display());
        Ok(())
    }

    fn entry(&self, index: usize) -> Result<&BackupEntry, BackupError> {
        self.entries
            .get(index)
            .ok_or(BackupError::NoSuchBackup(index))
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Claim a new, empty scratch file. ULID suffixes sort by creation time.
fn create_scratch(root: &Path) -> io::Result<PathBuf> {
    let mut attempts = 0;
    loop {
        let path = root.join(format!("{}{}", PREFIX, Ulid::new()));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempts < 3 => {
                attempts += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sibling file a snapshot is staged in before it replaces the scratch file.
/// Its name does not carry [`PREFIX`], so catalog scans never see it.
fn staging_path(scratch: &Path) -> PathBuf {
    let name = scratch
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    scratch.with_file_name(format!(".{}.tmp", name))
}

/// Write to `staging`, fsync, then rename over `path`. The previous snapshot
/// stays intact until the rename.
fn write_snapshot(
    path: &Path,
    staging: &Path,
    session: &ScanSession,
) -> Result<usize, BackupError> {
    let bytes = encode_snapshot(session)?;

    let mut file = File::create(staging)?;
    if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(staging);
        return Err(e.into());
    }
    drop(file);

    if let Err(e) = fs::rename(staging, path) {
        let _ = fs::remove_file(staging);
        return Err(e.into());
    }
    Ok(bytes.len())
}

/// List scratch files under `root` other than `own`, newest first, deleting empty ones.
fn scan(root: &Path, own: &Path) -> Result<Vec<BackupEntry>, BackupError> {
    let own_name = own.file_name();
    let mut entries = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(PREFIX) || Some(name.as_os_str()) == own_name {
            continue;
        }

        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("skipping unreadable backup {}: {}", path.display(), e);
                continue;
            }
        };

        // Left by a process that crashed before its first save completed.
        if metadata.len() == 0 {
            match fs::remove_file(&path) {
                Ok(()) => tracing::info!("removed empty backup {}", path.display()),
                Err(e) => tracing::warn!("could not remove empty backup {}: {}", path.display(), e),
            }
            continue;
        }

        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        entries.push(BackupEntry {
            path,
            modified,
            size: metadata.len(),
        });
    }

    entries.sort_by(|a, b| b.path.file_name().cmp(&a.path.file_name()));
    Ok(entries)
}

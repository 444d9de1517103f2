// ABOUTME: Versioned codec for scan session files: decodes every historical revision, encodes the current one.
// ABOUTME: Decoding probes the legacy binary layout first and falls through to the JSON document format.

pub mod document;
pub mod legacy;
pub mod migrate;
mod records;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::format::HEADER;
use crate::model::ScanSession;

pub use migrate::FieldError;
pub use records::RecordError;

/// Errors that can occur while reading or writing session files.
///
/// A missing file is not an error: [`decode_session`] reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid or corrupted file: {0}")]
    Corrupt(String),
}

impl From<FieldError> for CodecError {
    fn from(err: FieldError) -> Self {
        CodecError::Corrupt(err.to_string())
    }
}

/// Outcome of running one format parser over a byte buffer.
#[derive(Debug)]
pub enum Probe {
    /// The bytes are in this format and decoded structurally.
    Decoded { header: String, session: ScanSession },
    /// The bytes are not in this format; another parser may accept them.
    NotThisFormat(String),
    /// The bytes claim this format but cannot be decoded.
    Corrupt(String),
}

/// Read and decode the session file at `path`.
///
/// Returns `Ok(None)` when nothing exists at `path`. Any decode failure is
/// reported whole as [`CodecError::Corrupt`]; no partial session escapes.
pub fn decode_session(path: &Path) -> Result<Option<ScanSession>, CodecError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("no session file at {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let session = decode_bytes(&bytes)?;
    tracing::debug!(
        "decoded {} ({} sweeps, {} fixes)",
        path.display(),
        session.sweep_count(),
        session.location.len()
    );
    Ok(Some(session))
}

/// Decode a session from an in-memory file image.
pub fn decode_bytes(bytes: &[u8]) -> Result<ScanSession, CodecError> {
    let (header, mut session) = match legacy::probe(bytes) {
        Probe::Decoded { header, session } => (header, session),
        Probe::NotThisFormat(reason) => {
            tracing::debug!("not a legacy binary session ({}), trying JSON", reason);
            match document::probe(bytes) {
                Probe::Decoded { header, session } => (header, session),
                Probe::NotThisFormat(reason) | Probe::Corrupt(reason) => {
                    return Err(CodecError::Corrupt(reason));
                }
            }
        }
        Probe::Corrupt(reason) => return Err(CodecError::Corrupt(reason)),
    };

    if header != HEADER {
        return Err(CodecError::Corrupt(format!(
            "unexpected header {:?}",
            header
        )));
    }

    session.prune_empty_sweeps();
    Ok(session)
}

/// Encode `session` as a current-version JSON document.
pub fn encode(session: &ScanSession) -> Vec<u8> {
    document::encode(session).into_bytes()
}

/// Write `session` to `path` as a current-version document.
/// Writes to a sibling temp file, fsyncs, then renames over `path`.
pub fn encode_session(session: &ScanSession, path: &Path) -> Result<(), CodecError> {
    let tmp_path = temp_path_for(path);
    let bytes = encode(session);

    let mut file = File::create(&tmp_path)?;
    if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    drop(file);

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    tracing::info!(
        "saved {} ({} sweeps, {} bytes)",
        path.display(),
        session.sweep_count(),
        bytes.len()
    );
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

// ABOUTME: Sequential binary record stream used by legacy session files and backup snapshots.
// ABOUTME: Each record is one bincode value written back to back; end of input terminates the stream.

use bincode::error::{DecodeError, EncodeError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Upper bound on the size of any single record.
const RECORD_LIMIT: usize = 64 * 1024 * 1024;

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<RECORD_LIMIT>()
}

/// Errors raised while reading or writing a record stream.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record {record}: {source}")]
    Decode {
        record: usize,
        #[source]
        source: DecodeError,
    },

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("{0} bytes of trailing data after last record")]
    Trailing(usize),
}

/// Appends records to an in-memory buffer.
#[derive(Debug, Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: Serialize>(&mut self, value: &T) -> Result<(), RecordError> {
        let bytes = bincode::serde::encode_to_vec(value, config())?;
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads records in order from a byte slice.
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    record: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            record: 0,
        }
    }

    pub fn next<T: DeserializeOwned>(&mut self) -> Result<T, RecordError> {
        let (value, used) =
            bincode::serde::decode_from_slice(&self.bytes[self.offset..], config()).map_err(
                |source| RecordError::Decode {
                    record: self.record,
                    source,
                },
            )?;
        self.offset += used;
        self.record += 1;
        Ok(value)
    }

    /// Consume the reader, failing if any bytes follow the last record read.
    pub fn finish(self) -> Result<(), RecordError> {
        let remaining = self.bytes.len() - self.offset;
        if remaining > 0 {
            return Err(RecordError::Trailing(remaining));
        }
        Ok(())
    }
}

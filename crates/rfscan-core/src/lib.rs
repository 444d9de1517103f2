// ABOUTME: Core library for rfscan, containing the scan session model and the versioned file codec.
// ABOUTME: Consumers decode any historical session file and always write the current schema.

pub mod codec;
pub mod format;
pub mod model;

pub use codec::{CodecError, decode_bytes, decode_session, encode, encode_session};
pub use format::{HEADER, VERSION};
pub use model::{Fix, ScanSession, SortKey, Sweep};

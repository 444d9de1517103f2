// ABOUTME: Legacy pre-schema binary session layout and the backup snapshot layout built on the same records.
// ABOUTME: Legacy files hold header, version, start, stop and one flat sweep; snapshots hold a whole session.

use crate::codec::records::{RecordError, RecordReader, RecordWriter};
use crate::codec::{CodecError, Probe};
use crate::format::{HEADER, VERSION};
use crate::model::{SINGLE_SWEEP_TIME, ScanSession, Sweep};

/// Version number carried by legacy binary files.
pub const LEGACY_VERSION: i64 = 1;

/// Try to read `bytes` as a legacy binary session.
///
/// Any structural failure, or a header other than [`HEADER`], means "not this
/// format". Arbitrary bytes (a JSON document included) can occasionally
/// decode as a well-formed record stream, so only a matching header claims
/// the file and the JSON parser decides everything else.
pub fn probe(bytes: &[u8]) -> Probe {
    let mut reader = RecordReader::new(bytes);
    let parsed = read_legacy(&mut reader).and_then(|parsed| {
        reader.finish()?;
        Ok(parsed)
    });

    match parsed {
        Ok((header, session)) if header == HEADER => Probe::Decoded { header, session },
        Ok((header, _)) => Probe::NotThisFormat(format!("unexpected header {:?}", header)),
        Err(e) => Probe::NotThisFormat(e.to_string()),
    }
}

fn read_legacy(reader: &mut RecordReader<'_>) -> Result<(String, ScanSession), RecordError> {
    let header: String = reader.next()?;
    let _version: i64 = reader.next()?;
    let start: f64 = reader.next()?;
    let stop: f64 = reader.next()?;
    let sweep: Sweep = reader.next()?;

    let mut session = ScanSession::new(start, stop);
    session.insert_sweep(SINGLE_SWEEP_TIME, sweep);
    Ok((header, session))
}

/// Encode `session` in the legacy binary layout.
///
/// The layout holds a single flat sweep, so only the earliest sweep is kept and
/// all settings beyond the frequency range are lost.
pub fn encode(session: &ScanSession) -> Result<Vec<u8>, RecordError> {
    encode_with_header(HEADER, session)
}

pub(crate) fn encode_with_header(
    header: &str,
    session: &ScanSession,
) -> Result<Vec<u8>, RecordError> {
    let empty = Sweep::new();
    let sweep = session.spectrum.values().next().unwrap_or(&empty);

    let mut writer = RecordWriter::new();
    writer.push(&header)?;
    writer.push(&LEGACY_VERSION)?;
    writer.push(&session.start)?;
    writer.push(&session.stop)?;
    writer.push(sweep)?;
    Ok(writer.into_bytes())
}

/// Encode a complete session as a backup snapshot: header, version, session.
pub fn encode_snapshot(session: &ScanSession) -> Result<Vec<u8>, RecordError> {
    let mut writer = RecordWriter::new();
    writer.push(&HEADER)?;
    writer.push(&VERSION)?;
    writer.push(session)?;
    Ok(writer.into_bytes())
}

/// Decode a backup snapshot produced by [`encode_snapshot`].
pub fn decode_snapshot(bytes: &[u8]) -> Result<ScanSession, CodecError> {
    let corrupt = |e: RecordError| CodecError::Corrupt(e.to_string());

    let mut reader = RecordReader::new(bytes);
    let header: String = reader.next().map_err(corrupt)?;
    if header != HEADER {
        return Err(CodecError::Corrupt(format!("unexpected header {:?}", header)));
    }
    let version: i64 = reader.next().map_err(corrupt)?;
    let mut session: ScanSession = reader.next().map_err(corrupt)?;
    reader.finish().map_err(corrupt)?;

    tracing::debug!("decoded version {} snapshot", version);
    session.prune_empty_sweeps();
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_DWELL, DEFAULT_NFFT, Fix, SortKey};

    fn sample_session() -> ScanSession {
        let mut session = ScanSession::new(144.0, 146.0);
        session.description = "2m band".to_string();
        session.record(100.0, 144.5, -50.0);
        session.record(100.0, 145.0, -48.5);
        session.record(101.0, 144.5, -51.0);
        session.record_fix(100.0, Fix::new(40.0, -105.0, Some(1600.0)));
        session
    }

    #[test]
    fn legacy_file_decodes_as_single_sweep() {
        let bytes = encode(&sample_session()).unwrap();

        let Probe::Decoded { header, session } = probe(&bytes) else {
            panic!("legacy bytes should decode");
        };

        assert_eq!(header, HEADER);
        assert_eq!(session.start, 144.0);
        assert_eq!(session.stop, 146.0);
        assert_eq!(session.dwell, DEFAULT_DWELL);
        assert_eq!(session.nfft, DEFAULT_NFFT);
        assert!(session.description.is_empty());
        assert!(session.location.is_empty());
        assert_eq!(session.sweep_count(), 1);
        let sweep = &session.spectrum[&SortKey(SINGLE_SWEEP_TIME)];
        assert_eq!(sweep[&SortKey(144.5)], -50.0);
        assert_eq!(sweep[&SortKey(145.0)], -48.5);
    }

    #[test]
    fn truncated_legacy_file_is_not_this_format() {
        let bytes = encode(&sample_session()).unwrap();

        let probe = probe(&bytes[..bytes.len() - 3]);

        assert!(matches!(probe, Probe::NotThisFormat(_)));
    }

    #[test]
    fn trailing_data_is_not_this_format() {
        let mut bytes = encode(&sample_session()).unwrap();
        bytes.extend_from_slice(b"extra");

        assert!(matches!(probe(&bytes), Probe::NotThisFormat(_)));
    }

    #[test]
    fn foreign_header_is_not_this_format() {
        let bytes = encode_with_header("Some Other Scanner", &sample_session()).unwrap();

        assert!(matches!(probe(&bytes), Probe::NotThisFormat(_)));
    }

    #[test]
    fn json_document_is_not_this_format() {
        let doc = crate::codec::encode(&sample_session());

        assert!(matches!(probe(&doc), Probe::NotThisFormat(_)));
    }

    #[test]
    fn snapshot_keeps_whole_session() {
        let session = sample_session();

        let bytes = encode_snapshot(&session).unwrap();
        let restored = decode_snapshot(&bytes).unwrap();

        assert_eq!(restored, session);
    }

    #[test]
    fn truncated_snapshot_is_corrupt() {
        let bytes = encode_snapshot(&sample_session()).unwrap();

        let err = decode_snapshot(&bytes[..bytes.len() / 2]).unwrap_err();

        assert!(matches!(err, CodecError::Corrupt(_)));
    }

    #[test]
    fn empty_snapshot_is_corrupt() {
        assert!(matches!(decode_snapshot(&[]), Err(CodecError::Corrupt(_))));
    }
}

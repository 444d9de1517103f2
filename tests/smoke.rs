// ABOUTME: End-to-end smoke test for the full rfscan lifecycle.
// ABOUTME: Tests live autosave, crash recovery, saving to the current format, and upgrading legacy files.

use std::sync::Arc;

use rfscan_core::codec::legacy;
use rfscan_core::format::ensure_extension;
use rfscan_core::{Fix, HEADER, ScanSession, SortKey, decode_session, encode_session};
use rfscan_store::{BackupConfig, BackupManager};

/// Simulate a producer capturing `sweeps` sweeps across the band.
fn capture(sweeps: usize) -> ScanSession {
    let mut session = ScanSession::new(118.0, 137.0);
    session.device = Some("Generic RTL2832U".to_string());
    session.gain = Some(37.2);
    session.tuner = 6;
    session.description = "Airband".to_string();

    for sweep in 0..sweeps {
        let t = 1_700_000_000.0 + sweep as f64 * 2.5;
        for bin in 0..64 {
            let freq = 118.0 + bin as f64 * 0.3;
            session.record(t, freq, -90.0 + (bin % 7) as f64);
        }
        session.record_fix(t, Fix::new(47.45, 8.56, Some(432.0)));
    }
    session
}

#[test]
fn smoke_test_full_lifecycle() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = BackupConfig::new(dir.path().join("backups"));

    // 1. A capture runs and autosaves snapshots, then the process dies.
    let running = BackupManager::open(&config).unwrap();
    let mut live = capture(3);
    assert!(running.save(Arc::new(live.clone())));
    running.wait();
    live.record(1_800_000_000.0, 120.0, -10.0);
    assert!(running.save(Arc::new(live.clone())));
    running.wait();
    drop(running);

    // 2. The next run finds the backup and recovers it.
    let mut next = BackupManager::open(&config).unwrap();
    assert_eq!(next.catalog().unwrap().len(), 1);
    let recovered = next.load(0).unwrap();
    assert_eq!(recovered, live, "latest accepted snapshot should be recovered");

    // 3. The recovered session is saved in the current format and read back.
    let path = ensure_extension(&dir.path().join("recovered"));
    encode_session(&recovered, &path).unwrap();
    let reloaded = decode_session(&path).unwrap().expect("saved file should exist");
    assert_eq!(reloaded, live);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(HEADER));
    assert!(text.contains("\"Version\": 9"));

    // 4. The recovered backup is deleted and the manager closes cleanly.
    next.delete(0).unwrap();
    assert!(next.entries().is_empty());
    let scratch = next.scratch_path().to_path_buf();
    next.close().unwrap();
    assert!(!scratch.exists());
    assert!(std::fs::read_dir(dir.path().join("backups")).unwrap().next().is_none());
}

#[test]
fn smoke_test_legacy_upgrade() {
    let dir = tempfile::TempDir::new().unwrap();
    let legacy_path = dir.path().join("old_scan.rfs");
    std::fs::write(&legacy_path, legacy::encode(&capture(2)).unwrap()).unwrap();

    let session = decode_session(&legacy_path).unwrap().expect("legacy file should load");
    assert_eq!(session.start, 118.0);
    assert_eq!(session.stop, 137.0);
    assert_eq!(session.sweep_count(), 1);
    assert!(session.spectrum.contains_key(&SortKey(1.0)));
    assert!(session.device.is_none(), "legacy files carry no device settings");

    encode_session(&session, &legacy_path).unwrap();
    let upgraded = decode_session(&legacy_path).unwrap().unwrap();
    assert_eq!(upgraded, session);
}

#[test]
fn smoke_test_missing_file_is_nothing_to_load() {
    let dir = tempfile::TempDir::new().unwrap();

    assert!(decode_session(&dir.path().join("nope.rfs")).unwrap().is_none());
}

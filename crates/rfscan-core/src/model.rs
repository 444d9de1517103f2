// ABOUTME: Defines the ScanSession struct holding one scan run's settings, spectrum and GPS track.
// ABOUTME: Spectrum and location are ordered maps keyed by SortKey so consumers always see ascending order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Dwell time assumed for files written before dwell was recorded.
pub const DEFAULT_DWELL: f64 = 0.131;

/// FFT size assumed for files written before it was recorded.
pub const DEFAULT_NFFT: u32 = 1024;

/// Timestamp given to the single sweep of files that predate multi-sweep spectra.
pub const SINGLE_SWEEP_TIME: f64 = 1.0;

/// An `f64` with a total order, usable as an ordered map key.
///
/// Ordering and equality follow [`f64::total_cmp`], so `-0.0 < 0.0` and NaN
/// keys sort after every finite value instead of poisoning the map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKey(pub f64);

impl SortKey {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for SortKey {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One frequency pass: frequency (MHz) to power level (dB/Hz).
pub type Sweep = BTreeMap<SortKey, f64>;

/// Sweep timestamp (seconds since the epoch) to sweep.
pub type Spectrum = BTreeMap<SortKey, Sweep>;

/// Sample timestamp to GPS fix.
pub type Location = BTreeMap<SortKey, Fix>;

/// A GPS fix correlated with a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
}

impl Fix {
    pub fn new(lat: f64, lon: f64, alt: Option<f64>) -> Self {
        Self { lat, lon, alt }
    }
}

/// A single scan run: the capture settings plus everything it measured.
///
/// Sessions built by a live producer are mutated sweep by sweep and only ever
/// persisted through a snapshot copy. Sessions built by the codec are complete
/// on return and are not touched by the persistence layer afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub start: f64,
    pub stop: f64,
    pub dwell: f64,
    pub nfft: u32,
    pub device: Option<String>,
    pub gain: Option<f64>,
    pub lo: Option<f64>,
    pub calibration: Option<f64>,
    pub tuner: u32,
    pub time: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: String,
    pub spectrum: Spectrum,
    pub location: Location,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 0.0,
            dwell: DEFAULT_DWELL,
            nfft: DEFAULT_NFFT,
            device: None,
            gain: None,
            lo: None,
            calibration: None,
            tuner: 0,
            time: None,
            latitude: None,
            longitude: None,
            description: String::new(),
            spectrum: Spectrum::new(),
            location: Location::new(),
        }
    }
}

impl ScanSession {
    /// Create an empty session covering `start..=stop` MHz with default capture settings.
    pub fn new(start: f64, stop: f64) -> Self {
        Self {
            start,
            stop,
            ..Self::default()
        }
    }

    /// Record one power reading, creating the sweep at `timestamp` if needed.
    pub fn record(&mut self, timestamp: f64, frequency: f64, power: f64) {
        self.spectrum
            .entry(SortKey(timestamp))
            .or_default()
            .insert(SortKey(frequency), power);
    }

    /// Insert or replace a whole sweep. Empty sweeps are ignored so that every
    /// timestamp in the spectrum carries at least one reading.
    pub fn insert_sweep(&mut self, timestamp: f64, sweep: Sweep) {
        if sweep.is_empty() {
            return;
        }
        self.spectrum.insert(SortKey(timestamp), sweep);
    }

    pub fn record_fix(&mut self, timestamp: f64, fix: Fix) {
        self.location.insert(SortKey(timestamp), fix);
    }

    pub fn sweep_count(&self) -> usize {
        self.spectrum.len()
    }

    pub fn first_sweep_time(&self) -> Option<f64> {
        self.spectrum.keys().next().map(|k| k.value())
    }

    pub fn last_sweep_time(&self) -> Option<f64> {
        self.spectrum.keys().next_back().map(|k| k.value())
    }

    /// Drop sweeps that hold no readings.
    pub(crate) fn prune_empty_sweeps(&mut self) {
        self.spectrum.retain(|_, sweep| !sweep.is_empty());
    }
}

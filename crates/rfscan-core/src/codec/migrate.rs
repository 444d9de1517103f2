// ABOUTME: Ordered table of schema migration steps that rebuild a ScanSession from any document version.
// ABOUTME: Each step reads the fields introduced by one revision and leaves defaults for the rest.

use std::ops::RangeInclusive;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{Fix, SINGLE_SWEEP_TIME, ScanSession, SortKey, Sweep};

/// The object half of a `[header, fields]` session document.
pub type Fields = Map<String, Value>;

/// A field that is missing or holds the wrong kind of value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("missing field {0}")]
    Missing(&'static str),

    #[error("field {field} is not {expected}")]
    Invalid { field: String, expected: &'static str },
}

/// One historical schema rule.
pub struct Migration {
    pub name: &'static str,
    /// Document versions the step applies to.
    pub versions: RangeInclusive<i64>,
    pub apply: fn(ScanSession, &Fields) -> Result<ScanSession, FieldError>,
}

/// Every migration step, in application order.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        name: "frequency range",
        versions: i64::MIN..=i64::MAX,
        apply: frequency_range,
    },
    Migration {
        name: "dwell and fft size",
        versions: 2..=i64::MAX,
        apply: dwell_and_nfft,
    },
    Migration {
        name: "device settings",
        versions: 3..=i64::MAX,
        apply: device_settings,
    },
    Migration {
        name: "tuner",
        versions: 5..=i64::MAX,
        apply: tuner,
    },
    Migration {
        name: "capture time and position",
        versions: 6..=i64::MAX,
        apply: time_and_position,
    },
    Migration {
        name: "flat spectrum",
        versions: i64::MIN..=6,
        apply: flat_spectrum,
    },
    Migration {
        name: "sweep spectrum",
        versions: 7..=i64::MAX,
        apply: sweep_spectrum,
    },
    Migration {
        name: "description",
        versions: 8..=i64::MAX,
        apply: description,
    },
    Migration {
        name: "location track",
        versions: 9..=i64::MAX,
        apply: location_track,
    },
];

/// Build a session from a version `version` document by applying every step
/// whose range covers it, starting from the session defaults.
pub fn migrate(version: i64, fields: &Fields) -> Result<ScanSession, FieldError> {
    MIGRATIONS
        .iter()
        .filter(|step| step.versions.contains(&version))
        .try_fold(ScanSession::default(), |session, step| {
            tracing::trace!("applying migration step '{}' for version {}", step.name, version);
            (step.apply)(session, fields)
        })
}

fn frequency_range(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    session.start = number(fields, "Start")?;
    session.stop = number(fields, "Stop")?;
    Ok(session)
}

fn dwell_and_nfft(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    session.dwell = number(fields, "Dwell")?;
    session.nfft = integer(fields, "Nfft")?;
    Ok(session)
}

fn device_settings(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    session.device = optional_string(fields, "Device")?;
    session.gain = optional_number(fields, "Gain")?;
    session.lo = optional_number(fields, "LO")?;
    session.calibration = optional_number(fields, "Calibration")?;
    Ok(session)
}

fn tuner(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    // Some writers stored null for an unknown tuner.
    session.tuner = match field(fields, "Tuner")? {
        Value::Null => 0,
        _ => integer(fields, "Tuner")?,
    };
    Ok(session)
}

fn time_and_position(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    session.time = optional_string(fields, "Time")?;
    session.latitude = optional_number(fields, "Latitude")?;
    session.longitude = optional_number(fields, "Longitude")?;
    Ok(session)
}

fn flat_spectrum(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    let sweep = parse_sweep("Spectrum", field(fields, "Spectrum")?)?;
    session.spectrum.clear();
    session.insert_sweep(SINGLE_SWEEP_TIME, sweep);
    Ok(session)
}

fn sweep_spectrum(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    let sweeps = object("Spectrum", field(fields, "Spectrum")?)?;
    session.spectrum.clear();
    for (time, sweep) in sweeps {
        let path = format!("Spectrum[{}]", time);
        let timestamp = parse_key(&path, time)?;
        let sweep = parse_sweep(&path, sweep)?;
        session.spectrum.insert(SortKey(timestamp), sweep);
    }
    Ok(session)
}

fn description(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    session.description = optional_string(fields, "Description")?.unwrap_or_default();
    Ok(session)
}

fn location_track(mut session: ScanSession, fields: &Fields) -> Result<ScanSession, FieldError> {
    let track = object("Location", field(fields, "Location")?)?;
    session.location.clear();
    for (time, fix) in track {
        let path = format!("Location[{}]", time);
        let timestamp = parse_key(&path, time)?;
        session.location.insert(SortKey(timestamp), parse_fix(&path, fix)?);
    }
    Ok(session)
}

fn field<'a>(fields: &'a Fields, key: &'static str) -> Result<&'a Value, FieldError> {
    fields.get(key).ok_or(FieldError::Missing(key))
}

fn invalid(field: &str, expected: &'static str) -> FieldError {
    FieldError::Invalid {
        field: field.to_string(),
        expected,
    }
}

/// Spelling of the non-finite floats some writers emit as bare tokens.
/// [`crate::codec::document`] quotes those tokens before parsing.
pub(crate) const NON_FINITE: [(&str, f64); 3] = [
    ("-Infinity", f64::NEG_INFINITY),
    ("Infinity", f64::INFINITY),
    ("NaN", f64::NAN),
];

/// A JSON number or a quoted non-finite token.
fn float(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => NON_FINITE
            .iter()
            .find(|(token, _)| *token == s.as_str())
            .map(|(_, f)| *f),
        _ => value.as_f64(),
    }
}

/// Like [`float`], but `null` reads as NaN: the encoder writes non-finite
/// readings as `null`.
fn reading(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(f64::NAN),
        _ => float(value),
    }
}

fn number(fields: &Fields, key: &'static str) -> Result<f64, FieldError> {
    reading(field(fields, key)?).ok_or_else(|| invalid(key, "a number"))
}

fn optional_number(fields: &Fields, key: &'static str) -> Result<Option<f64>, FieldError> {
    match field(fields, key)? {
        Value::Null => Ok(None),
        value => float(value).map(Some).ok_or_else(|| invalid(key, "a number")),
    }
}

fn optional_string(fields: &Fields, key: &'static str) -> Result<Option<String>, FieldError> {
    match field(fields, key)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(invalid(key, "a string")),
    }
}

fn integer(fields: &Fields, key: &'static str) -> Result<u32, FieldError> {
    let value = field(fields, key)?;
    let whole = match value.as_u64() {
        Some(n) => Some(n),
        // Integral floats, e.g. 1024.0.
        None => value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0)
            .map(|f| f as u64),
    };
    whole
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| invalid(key, "an unsigned integer"))
}

fn object<'a>(path: &str, value: &'a Value) -> Result<&'a Fields, FieldError> {
    value.as_object().ok_or_else(|| invalid(path, "an object"))
}

fn parse_key(path: &str, key: &str) -> Result<f64, FieldError> {
    key.trim()
        .parse::<f64>()
        .map_err(|_| invalid(path, "keyed by numbers"))
}

fn parse_sweep(path: &str, value: &Value) -> Result<Sweep, FieldError> {
    let mut sweep = Sweep::new();
    for (freq, power) in object(path, value)? {
        let entry = format!("{}[{}]", path, freq);
        let frequency = parse_key(&entry, freq)?;
        let level = reading(power).ok_or_else(|| invalid(&entry, "a number"))?;
        sweep.insert(SortKey(frequency), level);
    }
    Ok(sweep)
}

fn parse_fix(path: &str, value: &Value) -> Result<Fix, FieldError> {
    let parts = value
        .as_array()
        .filter(|parts| parts.len() == 2 || parts.len() == 3)
        .ok_or_else(|| invalid(path, "a [lat, lon, alt] triple"))?;

    let coordinate = |i: usize| reading(&parts[i]).ok_or_else(|| invalid(path, "numeric"));
    let alt = match parts.get(2) {
        None | Some(Value::Null) => None,
        Some(v) => Some(float(v).ok_or_else(|| invalid(path, "numeric"))?),
    };

    Ok(Fix::new(coordinate(0)?, coordinate(1)?, alt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_DWELL, DEFAULT_NFFT};
    use serde_json::json;

    /// Build the fields object a version `version` writer would have produced.
    fn fields_for(version: i64) -> Fields {
        let mut doc = json!({
            "Version": version,
            "Start": 88,
            "Stop": 108,
        });
        let obj = doc.as_object_mut().unwrap();
        if version > 1 {
            obj.insert("Dwell".into(), json!(0.5));
            obj.insert("Nfft".into(), json!(4096));
        }
        if version > 2 {
            obj.insert("Device".into(), json!("RTL2838"));
            obj.insert("Gain".into(), json!(28.0));
            obj.insert("LO".into(), json!(-125));
            obj.insert("Calibration".into(), json!(0.75));
        }
        if version > 4 {
            obj.insert("Tuner".into(), json!(6));
        }
        if version > 5 {
            obj.insert("Time".into(), json!("2014-06-01T12:00:00Z"));
            obj.insert("Latitude".into(), json!(52.5));
            obj.insert("Longitude".into(), json!(-1.25));
        }
        if version < 7 {
            obj.insert("Spectrum".into(), json!({"100.0": -30.0, "99.5": -31.5}));
        } else {
            obj.insert(
                "Spectrum".into(),
                json!({"1401624000.5": {"100.0": -30.0, "99.5": -31.5},
                       "1401624001.5": {"100.0": -29.0}}),
            );
        }
        if version > 7 {
            obj.insert("Description".into(), json!("Field notes"));
        }
        if version > 8 {
            obj.insert(
                "Location".into(),
                json!({"1401624000.5": [52.5, -1.25, 80.0], "1401624001.5": [52.6, -1.26, null]}),
            );
        }
        obj.clone()
    }

    #[test]
    fn every_version_fills_documented_defaults() {
        for version in 1..=9 {
            let session = migrate(version, &fields_for(version))
                .unwrap_or_else(|e| panic!("version {} failed: {}", version, e));

            assert_eq!(session.start, 88.0, "v{}", version);
            assert_eq!(session.stop, 108.0, "v{}", version);

            if version > 1 {
                assert_eq!(session.dwell, 0.5, "v{}", version);
                assert_eq!(session.nfft, 4096, "v{}", version);
            } else {
                assert_eq!(session.dwell, DEFAULT_DWELL, "v{}", version);
                assert_eq!(session.nfft, DEFAULT_NFFT, "v{}", version);
            }

            if version > 2 {
                assert_eq!(session.device.as_deref(), Some("RTL2838"), "v{}", version);
                assert_eq!(session.gain, Some(28.0), "v{}", version);
                assert_eq!(session.lo, Some(-125.0), "v{}", version);
                assert_eq!(session.calibration, Some(0.75), "v{}", version);
            } else {
                assert!(session.device.is_none(), "v{}", version);
                assert!(session.gain.is_none(), "v{}", version);
                assert!(session.lo.is_none(), "v{}", version);
                assert!(session.calibration.is_none(), "v{}", version);
            }

            let expected_tuner = if version > 4 { 6 } else { 0 };
            assert_eq!(session.tuner, expected_tuner, "v{}", version);

            if version > 5 {
                assert_eq!(session.time.as_deref(), Some("2014-06-01T12:00:00Z"));
                assert_eq!(session.latitude, Some(52.5));
                assert_eq!(session.longitude, Some(-1.25));
            } else {
                assert!(session.time.is_none(), "v{}", version);
                assert!(session.latitude.is_none(), "v{}", version);
                assert!(session.longitude.is_none(), "v{}", version);
            }

            let expected_desc = if version > 7 { "Field notes" } else { "" };
            assert_eq!(session.description, expected_desc, "v{}", version);

            assert_eq!(session.location.len(), if version > 8 { 2 } else { 0 });
        }
    }

    #[test]
    fn flat_spectrum_is_promoted_to_single_sweep() {
        for version in 1..7 {
            let session = migrate(version, &fields_for(version)).unwrap();

            assert_eq!(session.sweep_count(), 1, "v{}", version);
            let sweep = &session.spectrum[&SortKey(SINGLE_SWEEP_TIME)];
            let freqs: Vec<f64> = sweep.keys().map(|k| k.value()).collect();
            assert_eq!(freqs, vec![99.5, 100.0]);
            assert_eq!(sweep[&SortKey(99.5)], -31.5);
        }
    }

    #[test]
    fn nested_spectrum_keys_are_parsed() {
        let session = migrate(7, &fields_for(7)).unwrap();

        let times: Vec<f64> = session.spectrum.keys().map(|k| k.value()).collect();
        assert_eq!(times, vec![1401624000.5, 1401624001.5]);
        assert_eq!(session.spectrum[&SortKey(1401624001.5)][&SortKey(100.0)], -29.0);
    }

    #[test]
    fn location_track_allows_missing_altitude() {
        let session = migrate(9, &fields_for(9)).unwrap();

        assert_eq!(
            session.location[&SortKey(1401624000.5)],
            Fix::new(52.5, -1.25, Some(80.0))
        );
        assert_eq!(session.location[&SortKey(1401624001.5)].alt, None);
    }

    #[test]
    fn future_versions_use_every_step() {
        let mut fields = fields_for(9);
        fields.insert("Version".into(), json!(12));
        fields.insert("Unknown".into(), json!({"added": "later"}));

        let session = migrate(12, &fields).unwrap();

        assert_eq!(session.description, "Field notes");
        assert_eq!(session.location.len(), 2);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let mut fields = fields_for(4);
        fields.remove("Gain");

        assert_eq!(migrate(4, &fields).unwrap_err(), FieldError::Missing("Gain"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut fields = fields_for(3);
        fields.insert("Start".into(), json!("eighty-eight"));
        assert!(matches!(migrate(3, &fields), Err(FieldError::Invalid { .. })));

        let mut fields = fields_for(7);
        fields.insert("Spectrum".into(), json!({"not-a-time": {"1.0": -1.0}}));
        assert!(matches!(migrate(7, &fields), Err(FieldError::Invalid { .. })));

        let mut fields = fields_for(5);
        fields.insert("Spectrum".into(), json!({"100.0": "loud"}));
        assert!(matches!(migrate(5, &fields), Err(FieldError::Invalid { .. })));

        let mut fields = fields_for(9);
        fields.insert("Location".into(), json!({"1.0": [52.0]}));
        assert!(matches!(migrate(9, &fields), Err(FieldError::Invalid { .. })));
    }

    #[test]
    fn null_and_non_finite_readings_are_accepted() {
        let mut fields = fields_for(7);
        fields.insert(
            "Spectrum".into(),
            json!({"1.0": {"100.0": null, "100.5": "-Infinity", "101.0": "NaN", "101.5": -12.0}}),
        );
        fields.insert("Start".into(), json!("Infinity"));

        let session = migrate(7, &fields).unwrap();

        let sweep = &session.spectrum[&SortKey(1.0)];
        assert!(sweep[&SortKey(100.0)].is_nan());
        assert_eq!(sweep[&SortKey(100.5)], f64::NEG_INFINITY);
        assert!(sweep[&SortKey(101.0)].is_nan());
        assert_eq!(sweep[&SortKey(101.5)], -12.0);
        assert_eq!(session.start, f64::INFINITY);
    }

    #[test]
    fn null_tuner_reads_as_zero() {
        let mut fields = fields_for(5);
        fields.insert("Tuner".into(), Value::Null);

        assert_eq!(migrate(5, &fields).unwrap().tuner, 0);
    }

    #[test]
    fn integral_float_fft_size_is_accepted() {
        let mut fields = fields_for(2);
        fields.insert("Nfft".into(), json!(512.0));
        assert_eq!(migrate(2, &fields).unwrap().nfft, 512);

        fields.insert("Nfft".into(), json!(512.5));
        assert!(migrate(2, &fields).is_err());
    }
}

// ABOUTME: JSON session document: a two-element array of header marker and fields object.
// ABOUTME: Encodes the current schema and parses any schema version through the migration table.

use serde_json::{Map, Number, Value};

use crate::codec::Probe;
use crate::codec::migrate::{NON_FINITE, migrate};
use crate::format::{HEADER, VERSION};
use crate::model::{ScanSession, Sweep};

/// Render `session` as a pretty-printed current-version document.
///
/// Never fails: non-finite numbers are written as `null`, which reads back
/// as NaN.
pub fn encode(session: &ScanSession) -> String {
    let mut fields = Map::new();
    fields.insert("Version".into(), Value::from(VERSION));
    fields.insert("Start".into(), number(session.start));
    fields.insert("Stop".into(), number(session.stop));
    fields.insert("Dwell".into(), number(session.dwell));
    fields.insert("Nfft".into(), Value::from(session.nfft));
    fields.insert("Device".into(), optional_string(&session.device));
    fields.insert("Gain".into(), optional_number(session.gain));
    fields.insert("LO".into(), optional_number(session.lo));
    fields.insert("Calibration".into(), optional_number(session.calibration));
    fields.insert("Tuner".into(), Value::from(session.tuner));
    fields.insert("Time".into(), optional_string(&session.time));
    fields.insert("Latitude".into(), optional_number(session.latitude));
    fields.insert("Longitude".into(), optional_number(session.longitude));
    fields.insert("Description".into(), Value::String(session.description.clone()));

    let spectrum: Map<String, Value> = session
        .spectrum
        .iter()
        .map(|(time, sweep)| (key(time.value()), encode_sweep(sweep)))
        .collect();
    fields.insert("Spectrum".into(), Value::Object(spectrum));

    let location: Map<String, Value> = session
        .location
        .iter()
        .map(|(time, fix)| {
            let triple = vec![number(fix.lat), number(fix.lon), optional_number(fix.alt)];
            (key(time.value()), Value::Array(triple))
        })
        .collect();
    fields.insert("Location".into(), Value::Object(location));

    let doc = Value::Array(vec![Value::String(HEADER.to_string()), Value::Object(fields)]);
    format!("{:#}", doc)
}

fn encode_sweep(sweep: &Sweep) -> Value {
    Value::Object(
        sweep
            .iter()
            .map(|(freq, power)| (key(freq.value()), number(*power)))
            .collect(),
    )
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn optional_number(value: Option<f64>) -> Value {
    value.map(number).unwrap_or(Value::Null)
}

fn optional_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

/// Textual map key for a timestamp or frequency, formatted like a JSON number.
fn key(value: f64) -> String {
    Number::from_f64(value)
        .map(|n| n.to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Try to read `bytes` as a JSON session document of any schema version.
pub fn probe(bytes: &[u8]) -> Probe {
    let doc: Value = match parse(bytes) {
        Ok(doc) => doc,
        Err(e) => return Probe::NotThisFormat(format!("not a JSON document: {}", e)),
    };

    let Some(parts) = doc.as_array().filter(|parts| parts.len() >= 2) else {
        return Probe::Corrupt("document is not a [header, fields] pair".to_string());
    };
    let Some(header) = parts[0].as_str() else {
        return Probe::Corrupt("header is not a string".to_string());
    };
    let Some(fields) = parts[1].as_object() else {
        return Probe::Corrupt("fields are not an object".to_string());
    };
    let Some(version) = fields.get("Version").and_then(integer) else {
        return Probe::Corrupt("missing or non-integer Version".to_string());
    };

    if version > VERSION {
        tracing::debug!("document version {} is newer than {}", version, VERSION);
    }

    match migrate(version, fields) {
        Ok(session) => Probe::Decoded {
            header: header.to_string(),
            session,
        },
        Err(e) => Probe::Corrupt(format!("version {} document: {}", version, e)),
    }
}

/// Parse strictly, then retry with bare `NaN`/`Infinity`/`-Infinity` tokens
/// quoted. The retry's error is discarded in favour of the strict one.
fn parse(bytes: &[u8]) -> Result<Value, serde_json::Error> {
    let strict = match serde_json::from_slice(bytes) {
        Ok(doc) => return Ok(doc),
        Err(e) => e,
    };
    let Ok(text) = std::str::from_utf8(bytes) else {
        return Err(strict);
    };
    serde_json::from_str(&quote_non_finite(text)).map_err(|_| strict)
}

/// Wrap every non-finite token outside a string literal in quotes.
fn quote_non_finite(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
        } else if let Some((token, _)) = NON_FINITE
            .iter()
            .find(|(token, _)| bytes[i..].starts_with(token.as_bytes()))
        {
            out.push_str(&text[copied..i]);
            out.push('"');
            out.push_str(token);
            out.push('"');
            i += token.len();
            copied = i;
            continue;
        }
        i += 1;
    }

    out.push_str(&text[copied..]);
    out
}

/// An integer, or a float with no fractional part.
fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64 / 2.0)
            .map(|f| f as i64)
    })
}

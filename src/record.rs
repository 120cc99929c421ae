use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// One decrypted tracker report. Every field is optional; absent and `null` both
/// become `None`, so a reported zero is never confused with a missing reading.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TelemetryRecord {
    pub device: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub hdop: Option<f64>,
    pub time: Option<String>,
    pub pressure: Option<f64>,
    pub temp: Option<f64>,
}

/// Plaintext that decrypted fine but is not a usable record. Carries the
/// plaintext so operators can see what the device actually sent.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub plain: String,
}

impl ParseError {
    fn new(message: impl Into<String>, plain: &str) -> Self {
        ParseError {
            message: message.into(),
            plain: plain.to_string(),
        }
    }
}

/// Shape decrypted plaintext into a [`TelemetryRecord`].
///
/// The plaintext must be a JSON object. Unknown keys are ignored, but a known
/// key holding the wrong JSON type (say `"lat": "10.5"`) rejects the record
/// instead of storing a value of the wrong type.
pub fn parse(plaintext: &str) -> Result<TelemetryRecord, ParseError> {
    let value: Value =
        serde_json::from_str(plaintext).map_err(|err| ParseError::new(err.to_string(), plaintext))?;

    if !value.is_object() {
        return Err(ParseError::new(
            format!("expected a JSON object, found {}", json_kind(&value)),
            plaintext,
        ));
    }

    serde_json::from_value(value).map_err(|err| ParseError::new(err.to_string(), plaintext))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

use crate::protocol::TagSet;
use simd_json::OwnedValue;
use simd_json::prelude::{ValueAsArray, ValueAsObject, ValueAsScalar};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("JSON parse error: {0}")]
    JsonError(#[from] simd_json::Error),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid field type: {0}")]
    InvalidFieldType(String),
    #[error("Invalid event format")]
    InvalidFormat,
}

/// Already-extracted fields of one monitoring-check event. This is the
/// only shape the dispatcher ever sees.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub client_name: Option<String>,
    pub client_tags: TagSet,
    pub check_tags: TagSet,
    pub output: String,
    pub handlers: Vec<String>,
}

/// Parses the inbound JSON event envelope. Requires top-level `client`
/// and `check` objects and a `check.output` string; tags and handlers
/// are optional.
pub fn parse_event(raw: &[u8]) -> Result<Event, EventError> {
    // simd-json parses in place, so it gets its own copy of the input.
    let mut data = raw.to_vec();
    let json: OwnedValue = simd_json::from_slice(&mut data)?;

    let root = json.as_object().ok_or(EventError::InvalidFormat)?;

    let client = root
        .get("client")
        .and_then(|v| v.as_object())
        .ok_or_else(|| EventError::MissingField("client".to_string()))?;
    let check = root
        .get("check")
        .and_then(|v| v.as_object())
        .ok_or_else(|| EventError::MissingField("check".to_string()))?;

    let output = check
        .get("output")
        .ok_or_else(|| EventError::MissingField("check.output".to_string()))?
        .as_str()
        .ok_or_else(|| EventError::InvalidFieldType("check.output".to_string()))?
        .to_string();

    let handlers = check
        .get("handlers")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(Event {
        client_name: client
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        client_tags: extract_tags(client.get("tags")),
        check_tags: extract_tags(check.get("tags")),
        output,
        handlers,
    })
}

/// Tag values may be strings, numbers, or booleans in the wild; they are
/// all carried as text. Non-scalar values degrade to empty, which the
/// encoder later skips.
fn extract_tags(value: Option<&OwnedValue>) -> TagSet {
    value
        .and_then(|v| v.as_object())
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| (key.to_string(), scalar_to_string(value)))
                .collect()
        })
        .unwrap_or_default()
}

fn scalar_to_string(value: &OwnedValue) -> String {
    if let Some(s) = value.as_str() {
        s.to_string()
    } else if let Some(i) = value.as_i64() {
        i.to_string()
    } else if let Some(f) = value.as_f64() {
        f.to_string()
    } else if let Some(b) = value.as_bool() {
        b.to_string()
    } else {
        String::new()
    }
}

//! Encoding of attributes into the metadata companion payload.
//!
//! The payload is a versioned JSON envelope, base64 armoured so it can travel
//! as object user metadata:
//!
//! ```text
//! base64({"attributes":{...},"version":1})
//! ```

use crate::{
    errors::{CloudObjectError, Result},
    models::attributes::Attributes,
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub const ATTRIBUTES_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<'a> {
    version: u32,
    attributes: Cow<'a, Attributes>,
}

/// Serialize `attributes`. Keys are emitted in sorted order, so equal
/// mappings always encode to identical bytes.
pub fn encode(attributes: &Attributes) -> Result<Bytes> {
    let envelope = Envelope {
        version: ATTRIBUTES_FORMAT_VERSION,
        attributes: Cow::Borrowed(attributes),
    };
    let json = serde_json::to_vec(&envelope)
        .map_err(|err| CloudObjectError::CorruptAttributes(err.to_string()))?;
    Ok(Bytes::from(general_purpose::STANDARD.encode(json)))
}

pub fn decode(payload: &[u8]) -> Result<Attributes> {
    let json = general_purpose::STANDARD
        .decode(payload)
        .map_err(|err| CloudObjectError::CorruptAttributes(format!("invalid base64: {err}")))?;
    let envelope: Envelope<'static> = serde_json::from_slice(&json)
        .map_err(|err| CloudObjectError::CorruptAttributes(format!("invalid json: {err}")))?;

    if envelope.version != ATTRIBUTES_FORMAT_VERSION {
        return Err(CloudObjectError::CorruptAttributes(format!(
            "unsupported format version {}",
            envelope.version
        )));
    }
    Ok(envelope.attributes.into_owned())
}

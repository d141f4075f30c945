//! Embedded photo payloads

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;

use crate::error::{Error, Result};

/// Largest decoded photo accepted inline with a record
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// A photo decoded from a `data:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPhoto {
    pub mime_type: String,
    pub data: Vec<u8>,
}

fn data_uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^data:(image/[a-zA-Z0-9.+-]+);base64,([A-Za-z0-9+/=\s]+)$")
            .expect("Invalid regex")
    })
}

/// Decode a `data:image/<type>;base64,<payload>` URI
pub fn decode_data_uri(uri: &str) -> Result<DecodedPhoto> {
    let captures = data_uri_pattern()
        .captures(uri.trim())
        .ok_or_else(|| Error::InvalidInput("photo must be a base64 image data URI".into()))?;

    let mime_type = captures[1].to_ascii_lowercase();
    let encoded: String = captures[2].split_whitespace().collect();
    let data = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|error| Error::InvalidInput(format!("photo is not valid base64: {error}")))?;

    if data.is_empty() {
        return Err(Error::InvalidInput("photo is empty".into()));
    }
    if data.len() > MAX_PHOTO_BYTES {
        return Err(Error::InvalidInput(format!(
            "photo exceeds {MAX_PHOTO_BYTES} bytes"
        )));
    }

    Ok(DecodedPhoto { mime_type, data })
}

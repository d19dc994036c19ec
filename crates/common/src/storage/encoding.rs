//! Encoding fallback chain for raw document bytes.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encodings a document may be decoded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
    #[serde(rename = "cp1252", alias = "windows-1252")]
    Cp1252,
}

impl TextEncoding {
    /// UTF-8, then Latin-1, then CP1252
    pub fn default_chain() -> Vec<TextEncoding> {
        vec![TextEncoding::Utf8, TextEncoding::Latin1, TextEncoding::Cp1252]
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Cp1252 => "cp1252",
        }
    }

    /// Strict decode; `None` when the bytes are not valid in this encoding
    fn try_decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            // Every byte maps to the code point of the same value
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Cp1252 => encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TextEncoding {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            "cp1252" | "windows-1252" => Ok(TextEncoding::Cp1252),
            other => Err(AppError::Configuration {
                message: format!("Unknown text encoding: {}", other),
            }),
        }
    }
}

/// Decode `bytes` with the first encoding in `chain` that accepts them.
///
/// Returns the text and the encoding that succeeded. Fails with
/// [`AppError::Decoding`] only when every encoding in the chain rejects the
/// input.
pub fn decode(source_name: &str, bytes: &[u8], chain: &[TextEncoding]) -> Result<(String, TextEncoding)> {
    for encoding in chain {
        if let Some(text) = encoding.try_decode(bytes) {
            return Ok((text, *encoding));
        }
        tracing::debug!(source = source_name, encoding = %encoding, "Decoding failed, trying next encoding");
    }

    Err(AppError::Decoding {
        source_name: source_name.to_string(),
        tried: chain.iter().map(|e| e.label().to_string()).collect(),
    })
}

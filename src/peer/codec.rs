//! Compact text encoding for signaling blobs: JSON, gzip, then base64.

use crate::error::CodecError;
use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};

/// Upper bound on decompressed size, against zip bombs.
pub const MAX_DECOMPRESSED_SIZE: u64 = 256 * 1024;

pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;

    let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
    gz.write_all(&json)?;
    let compressed = gz.finish()?;

    Ok(general_purpose::STANDARD.encode(compressed))
}

pub fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T, CodecError> {
    let compressed = general_purpose::STANDARD.decode(encoded.trim())?;

    // ограничиваем распаковку, чтобы не съесть память
    let mut json = Vec::new();
    GzDecoder::new(&compressed[..])
        .take(MAX_DECOMPRESSED_SIZE + 1)
        .read_to_end(&mut json)?;
    if json.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(CodecError::TooLarge(MAX_DECOMPRESSED_SIZE));
    }

    Ok(serde_json::from_slice(&json)?)
}

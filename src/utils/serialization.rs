// Encoding helpers shared by the ledger (canonical hashing) and the wire codec
use crate::error::{BlockchainError, Result};
use data_encoding::BASE64;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize data using bincode 2.0 with standard configuration.
///
/// This is the canonical byte form hashed for transaction IDs, so the field
/// order of the encoded struct is part of the hash definition.
pub fn serialize<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// JSON-encode a value and wrap it in base64 so it fits in one protocol argument.
pub fn encode_b64_json<T: Serialize>(data: &T) -> Result<String> {
    let json = serde_json::to_vec(data)?;
    Ok(BASE64.encode(&json))
}

/// Inverse of [`encode_b64_json`]. NUL padding left over from fixed-size
/// socket reads is trimmed before decoding.
pub fn decode_b64_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = trim_nul(raw);
    let bytes = BASE64.decode(trimmed.as_bytes())?;
    let data = serde_json::from_slice(&bytes)?;
    Ok(data)
}

pub fn trim_nul(raw: &str) -> &str {
    raw.trim_matches('\0')
}

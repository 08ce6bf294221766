use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};

use crate::error::{BlockchainError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

fn since_epoch() -> Result<std::time::Duration> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))
}

/// Milliseconds since the unix epoch, used for block timestamps.
pub fn current_timestamp() -> Result<i64> {
    let duration = since_epoch()?.as_millis();

    // Ensure the timestamp fits in i64
    if duration > i64::MAX as u128 {
        return Err(BlockchainError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

/// Nanoseconds since the unix epoch, used for transactions and outputs.
pub fn current_timestamp_nanos() -> Result<i64> {
    let duration = since_epoch()?.as_nanos();

    if duration > i64::MAX as u128 {
        return Err(BlockchainError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// SHA-256 rendered as lowercase hex, the form every hash takes on the wire.
pub fn sha256_hex(data: &[u8]) -> String {
    HEXLOWER.encode(&sha256_digest(data))
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| BlockchainError::InvalidAddress(format!("Invalid base58 encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_base58_rejects_invalid_alphabet() {
        assert!(base58_decode("0OIl").is_err());
        let encoded = base58_encode(b"jackie");
        assert_eq!(base58_decode(&encoded).unwrap(), b"jackie".to_vec());
    }

    #[test]
    fn test_nanos_are_finer_than_millis() {
        let millis = current_timestamp().unwrap();
        let nanos = current_timestamp_nanos().unwrap();
        assert!(nanos / 1_000_000 >= millis);
    }
}

//! Utility functions and helpers
//!
//! This module contains hashing, encoding and timestamp helpers used
//! throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, current_timestamp_nanos, sha256_digest,
    sha256_hex,
};

pub use serialization::{decode_b64_json, encode_b64_json, serialize, trim_nul};

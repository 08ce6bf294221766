//! Wallet functionality
//!
//! Ed25519 key generation, signing and verification. The ledger only ever
//! sees addresses and signatures; private seeds stay on this side.

#[allow(clippy::module_inception)]
pub mod wallet;

pub use wallet::{
    address, new_wallet, parse_wallet, sign, validate_address, verify, Wallet, PUBLIC_KEY_LEN,
    SEED_LEN,
};

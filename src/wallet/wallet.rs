use crate::error::{BlockchainError, Result};
use crate::utils::{base58_decode, base58_encode};
use data_encoding::HEXLOWER;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const SEED_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;

/// An Ed25519 key pair kept as its 32-byte seed.
///
/// The address is the base58 form of the public key, so anybody holding an
/// address can verify signatures without extra lookups.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Wallet {
    seed: [u8; SEED_LEN],
    public_key: Vec<u8>,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.get_address())
            .finish()
    }
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let rng = SystemRandom::new();
        let mut seed = [0u8; SEED_LEN];
        rng.fill(&mut seed)
            .map_err(|e| BlockchainError::Crypto(format!("Failed to generate seed: {e}")))?;
        let wallet = Self::from_seed(&seed);
        seed.zeroize();
        wallet
    }

    fn from_seed(seed: &[u8; SEED_LEN]) -> Result<Wallet> {
        let key_pair = Self::key_pair(seed)?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet {
            seed: *seed,
            public_key,
        })
    }

    fn key_pair(seed: &[u8]) -> Result<Ed25519KeyPair> {
        Ed25519KeyPair::from_seed_unchecked(seed)
            .map_err(|e| BlockchainError::Crypto(format!("Failed to build Ed25519 key: {e}")))
    }

    /// Rebuild a wallet from the hex seed handed out by [`new_wallet`].
    pub fn from_private_seed(private_seed: &str) -> Result<Wallet> {
        let mut bytes = HEXLOWER
            .decode(private_seed.trim().to_lowercase().as_bytes())
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private seed: {e}")))?;
        if bytes.len() != SEED_LEN {
            bytes.zeroize();
            return Err(BlockchainError::Wallet(format!(
                "Private seed must be {SEED_LEN} bytes"
            )));
        }
        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(&bytes);
        bytes.zeroize();
        let wallet = Self::from_seed(&seed);
        seed.zeroize();
        wallet
    }

    pub fn get_address(&self) -> String {
        base58_encode(self.public_key.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_private_seed(&self) -> String {
        HEXLOWER.encode(&self.seed)
    }

    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let key_pair = Self::key_pair(&self.seed)?;
        Ok(key_pair.sign(payload).as_ref().to_vec())
    }
}

/// Create a fresh wallet, returning `(address, private_seed)`.
pub fn new_wallet() -> Result<(String, String)> {
    let wallet = Wallet::new()?;
    Ok((wallet.get_address(), wallet.get_private_seed()))
}

pub fn parse_wallet(private_seed: &str) -> Result<Wallet> {
    Wallet::from_private_seed(private_seed)
}

pub fn sign(wallet: &Wallet, payload: &[u8]) -> Result<Vec<u8>> {
    wallet.sign(payload)
}

pub fn address(wallet: &Wallet) -> String {
    wallet.get_address()
}

/// Check `signature` over `payload` against the public key encoded in `address`.
pub fn verify(address: &str, payload: &[u8], signature: &[u8]) -> bool {
    let public_key = match base58_decode(address) {
        Ok(key) => key,
        Err(_) => return false,
    };
    if public_key.len() != PUBLIC_KEY_LEN {
        return false;
    }
    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(payload, signature)
        .is_ok()
}

pub fn validate_address(address: &str) -> bool {
    matches!(base58_decode(address), Ok(key) if key.len() == PUBLIC_KEY_LEN)
}

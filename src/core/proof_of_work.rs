use crate::core::Block;
use crate::utils::sha256_hex;
use log::debug;

/// Longest prefix a SHA-256 hex digest can have.
pub const MAX_DIFFICULTY: usize = 64;

/// Nonce search for one block header.
///
/// The target is a count of leading `'0'` hex digits in the block hash.
pub struct ProofOfWork {
    previous_hash: String,
    timestamp: i64,
    tx_digest: String,
    difficulty: usize,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: &Block, difficulty: usize) -> ProofOfWork {
        ProofOfWork {
            previous_hash: block.get_previous_hash().to_string(),
            timestamp: block.get_timestamp(),
            tx_digest: block.hash_transactions(),
            difficulty: difficulty.min(MAX_DIFFICULTY),
        }
    }

    /// Whether `hash` starts with `difficulty` zero digits.
    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Validate proof-of-work for a block: its stored hash must be the real
    /// header hash and satisfy the difficulty.
    pub fn validate(block: &Block, difficulty: usize) -> bool {
        let pow = ProofOfWork::new_proof_of_work(block, difficulty);
        let hash = pow.hash_with_nonce(block.get_nonce());
        hash == block.get_hash() && Self::meets_difficulty(&hash, pow.difficulty)
    }

    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        format!(
            "{}::{}::{}::{}",
            self.previous_hash, self.timestamp, self.tx_digest, nonce
        )
        .into_bytes()
    }

    pub fn hash_with_nonce(&self, nonce: i64) -> String {
        sha256_hex(self.prepare_data(nonce).as_slice())
    }

    /// Increment the nonce from zero until the hash meets the target.
    /// Unbounded and CPU-bound; callers run it off the dispatch path.
    pub fn run(&self) -> (i64, String) {
        let mut nonce: i64 = 0;
        loop {
            let hash = self.hash_with_nonce(nonce);
            if Self::meets_difficulty(&hash, self.difficulty) {
                debug!("Found nonce {nonce} for hash {hash}");
                return (nonce, hash);
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}

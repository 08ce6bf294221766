use crate::core::{ProofOfWork, Transaction};
use crate::error::Result;
use crate::utils::{current_timestamp, sha256_hex};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    hash: String,
    previous_hash: String,
    nonce: i64,
    timestamp: i64, // Milliseconds since the unix epoch
    transactions: Vec<Transaction>,
}

impl Block {
    /// Build a block on top of `previous_hash` and mine it to `difficulty`.
    pub fn new_block(
        previous_hash: String,
        transactions: &[Transaction],
        difficulty: usize,
    ) -> Result<Block> {
        let mut block = Block {
            hash: String::new(),
            previous_hash,
            nonce: 0,
            timestamp: current_timestamp()?,
            transactions: transactions.to_vec(),
        };

        info!(
            "Starting proof-of-work for block with {} transactions (difficulty: {difficulty})",
            block.transactions.len()
        );
        let pow = ProofOfWork::new_proof_of_work(&block, difficulty);
        let (nonce, hash) = pow.run();
        block.nonce = nonce;
        block.hash = hash;
        info!("Proof-of-work completed for block: {}", block.hash);

        Ok(block)
    }

    /// Recompute the header hash from the block's fields.
    pub fn calculate_hash(&self) -> String {
        ProofOfWork::new_proof_of_work(self, 0).hash_with_nonce(self.nonce)
    }

    /// Digest of the transaction set that goes into the header.
    pub fn hash_transactions(&self) -> String {
        let txhashs: String = self.transactions.iter().map(|tx| tx.hash()).collect();
        sha256_hex(txhashs.as_bytes())
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }
}

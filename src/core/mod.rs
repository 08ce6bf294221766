//! Core ledger functionality
//!
//! Blocks, transactions, the in-memory chain and proof-of-work mining.
//! Nothing in here knows about the network.

pub mod block;
pub mod blockchain;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, GENESIS_PREVIOUS_HASH};
pub use proof_of_work::{ProofOfWork, MAX_DIFFICULTY};
pub use transaction::{TXInput, TXOutput, Transaction};

//! # Jackie Chain - A Small Peer-to-Peer Ledger
//!
//! This is an educational blockchain node I built in Rust. Each node keeps the
//! whole ledger in memory, mines blocks with proof-of-work and talks to its
//! neighbors over a tiny text protocol that shares its port with an HTTP API.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **UTXO Ledger**: Signed transactions spend earlier outputs, blocks are mined on a ticker
//! - **JACKIE Protocol**: `JACKIE <ACTION> <args>` lines, one TCP connection per message
//! - **Gossip Mesh**: A CONNECT floods through the network until every node knows every other
//! - **Unanimous Approval**: A transaction is committed only after every neighbor says OK
//! - **HTTP Facade**: Wallets, balances, blocks and payments as JSON on the same port
//!
//! ## How I Organized My Code
//! - `core/`: Blocks, transactions, proof-of-work and the chain itself
//! - `storage/`: The in-memory UTXO index
//! - `wallet/`: Ed25519 keys, base58 addresses, signing
//! - `network/`: Wire codec, peer directory, approval rounds, node state machine, HTTP
//! - `config/`: Environment and command-line settings
//! - `utils/`: Hashing, encoding and clock helpers
//! - `cli/`: Command-line interface
//!
//! ## When I Need to Understand Something
//! 1. Start with `main.rs` to see how a node boots
//! 2. Look at `core/blockchain.rs` for the ledger rules
//! 3. Check `network/node.rs` for what each protocol message does
//! 4. Review `network/server.rs` for the accept loop and background threads
//!
//! Nothing is persisted: a node that restarts downloads the chain again from
//! the peer it joins.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    Block, Blockchain, ProofOfWork, TXInput, TXOutput, Transaction, GENESIS_PREVIOUS_HASH,
    MAX_DIFFICULTY,
};
pub use error::{BlockchainError, Result};
pub use network::{
    Action, ApprovalCoordinator, Message, NodeService, Peer, PeerDirectory, Server,
    UnanimousApproval,
};
pub use storage::UTXOSet;
pub use utils::{base58_decode, base58_encode, current_timestamp, sha256_digest, sha256_hex};
pub use wallet::{new_wallet, parse_wallet, validate_address, verify, Wallet};

//! Error handling for the node
//!
//! One error type covers the ledger, the peer directory, the wire protocol
//! and the HTTP facade. Handlers decide what to do with each class: validation
//! errors go back to the HTTP caller, protocol and transport errors are logged.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Comprehensive error types for node operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors (dial, read, write)
    Network(String),
    /// Malformed or unknown protocol message
    Protocol(String),
    /// Transaction validation errors
    Transaction(String),
    /// Signature did not verify against the sender's key
    InvalidSignature(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File and socket I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Insufficient funds for transaction
    InsufficientFunds { required: u64, available: u64 },
    /// Block validation errors
    InvalidBlock(String),
    /// The peer ID is already in the directory
    DuplicatePeer(String),
    /// A node tried to register itself as its own neighbor
    SelfConnect,
    /// The peer ID is not in the directory
    PeerNotFound(String),
    /// Malformed HTTP request
    Http(String),
}

impl BlockchainError {
    /// Whether this error is the caller's fault and should be reported back
    /// to an HTTP client as a 4xx.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BlockchainError::Transaction(_)
                | BlockchainError::InvalidSignature(_)
                | BlockchainError::Wallet(_)
                | BlockchainError::InvalidAddress(_)
                | BlockchainError::InsufficientFunds { .. }
                | BlockchainError::Serialization(_)
                | BlockchainError::Http(_)
        )
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::InvalidSignature(msg) => write!(f, "Invalid signature: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::DuplicatePeer(id) => write!(f, "Duplicated peer: {id}"),
            BlockchainError::SelfConnect => write!(f, "Cannot add self as a peer"),
            BlockchainError::PeerNotFound(id) => write!(f, "Peer not found: {id}"),
            BlockchainError::Http(msg) => write!(f, "HTTP error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<data_encoding::DecodeError> for BlockchainError {
    fn from(err: data_encoding::DecodeError) -> Self {
        BlockchainError::Serialization(format!("Invalid encoding: {err}"))
    }
}

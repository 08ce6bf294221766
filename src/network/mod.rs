//! Peer-to-peer networking
//!
//! The JACKIE text protocol, the peer directory, transaction approval rounds
//! and the HTTP facade, all served from one TCP port.

pub mod api;
pub mod approval;
pub mod http;
pub mod node;
pub mod peers;
pub mod protocol;
pub mod server;

pub use approval::{ApprovalCoordinator, RoundStatus, UnanimousApproval};
pub use http::{Request, Response};
pub use node::{LedgerState, NodeService, NodeStats, Submission};
pub use peers::{Peer, PeerDirectory};
pub use protocol::{send, Action, Message};
pub use server::Server;

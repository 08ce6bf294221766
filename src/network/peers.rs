use crate::error::{BlockchainError, Result};
use crate::utils::trim_nul;
use std::collections::HashMap;

/// A neighbor this node gossips with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    id: String,
    host: String,
    port: u16,
}

impl Peer {
    pub fn new(id: &str, host: &str, port: u16) -> Peer {
        Peer {
            id: trim_nul(id).to_string(),
            host: trim_nul(host).to_string(),
            port,
        }
    }

    pub fn get_id(&self) -> &str {
        self.id.as_str()
    }

    pub fn get_host(&self) -> &str {
        self.host.as_str()
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// `host:port`, ready to dial.
    pub fn get_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Known neighbors keyed by peer ID.
///
/// Not synchronized on its own: it lives inside the node's ledger state and
/// is only touched while that lock is held.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    local_id: String,
    peers: HashMap<String, Peer>,
}

impl PeerDirectory {
    pub fn new(local_id: &str) -> PeerDirectory {
        PeerDirectory {
            local_id: trim_nul(local_id).to_string(),
            peers: HashMap::new(),
        }
    }

    pub fn get_local_id(&self) -> &str {
        self.local_id.as_str()
    }

    /// Register a neighbor. Re-adding a known ID or our own ID are both
    /// expected during gossip and leave the directory as it was.
    pub fn add_peer(&mut self, id: &str, host: &str, port: u16) -> Result<()> {
        let peer = Peer::new(id, host, port);
        if peer.id == self.local_id {
            return Err(BlockchainError::SelfConnect);
        }
        if self.peers.contains_key(&peer.id) {
            return Err(BlockchainError::DuplicatePeer(peer.id));
        }
        self.peers.insert(peer.id.clone(), peer);
        Ok(())
    }

    pub fn remove_peer(&mut self, id: &str) -> Result<Peer> {
        let id = trim_nul(id);
        self.peers
            .remove(id)
            .ok_or_else(|| BlockchainError::PeerNotFound(id.to_string()))
    }

    /// Snapshot of peer ID -> `host:port`.
    pub fn neighborhood(&self) -> HashMap<String, String> {
        self.peers
            .iter()
            .map(|(id, peer)| (id.clone(), peer.get_addr()))
            .collect()
    }

    pub fn neighbor_by_id(&self, id: &str) -> Option<String> {
        self.peers.get(trim_nul(id)).map(Peer::get_addr)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(trim_nul(id))
    }

    pub fn get_peers(&self) -> Vec<Peer> {
        self.peers.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

// This is the node's brain: it owns the ledger state and reacts to every
// protocol message. Handlers run under one lock and hand back the messages
// they want sent; the actual sends happen after the lock is released.

use crate::config::Config;
use crate::core::{Block, Blockchain, TXInput, TXOutput, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::approval::{ApprovalCoordinator, RoundStatus, UnanimousApproval};
use crate::network::peers::PeerDirectory;
use crate::network::protocol::{self, Message};
use crate::wallet::{parse_wallet, validate_address};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Messages a handler wants delivered, as (address, message).
pub type Outbound = Vec<(String, Message)>;

/// Everything that changes while the node runs. Guarded by a single mutex.
pub struct LedgerState {
    pub chain: Blockchain,
    pub peers: PeerDirectory,
    pub approvals: Box<dyn ApprovalCoordinator>,
}

/// What the caller gets back after submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub hash: String,
    /// Peers whose approval is still needed; empty when already committed.
    pub awaiting: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStats {
    pub node_id: String,
    pub uptime: u64,
    pub port: u16,
    pub neighbors: HashMap<String, String>,
    pub mining_interval: u64,
    pub miner: Option<String>,
    pub height: usize,
    pub pending: usize,
    pub difficulty: usize,
    pub reward: u64,
}

#[derive(Clone)]
pub struct NodeService {
    state: Arc<Mutex<LedgerState>>,
    config: Arc<Config>,
    started_at: Instant,
}

impl NodeService {
    pub fn new(config: Config) -> NodeService {
        Self::with_coordinator(config, Box::new(UnanimousApproval::new()))
    }

    pub fn with_coordinator(config: Config, approvals: Box<dyn ApprovalCoordinator>) -> NodeService {
        let state = LedgerState {
            chain: Blockchain::new(config.get_difficulty(), config.get_reward()),
            peers: PeerDirectory::new(config.get_node_id()),
            approvals,
        };
        NodeService {
            state: Arc::new(Mutex::new(state)),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| BlockchainError::Io("Ledger state lock poisoned".to_string()))
    }

    /// Run `f` against the current state while holding the lock.
    pub fn read_state<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&LedgerState) -> T,
    {
        let state = self.lock()?;
        Ok(f(&state))
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    pub fn node_id(&self) -> &str {
        self.config.get_node_id()
    }

    pub fn uptime(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn stats(&self) -> Result<NodeStats> {
        let state = self.lock()?;
        Ok(NodeStats {
            node_id: self.node_id().to_string(),
            uptime: self.uptime(),
            port: self.config.get_port(),
            neighbors: state.peers.neighborhood(),
            mining_interval: self.config.get_mining_interval().as_secs(),
            miner: self.config.get_mining_addr().map(str::to_string),
            height: state.chain.height(),
            pending: state.chain.get_pending_transactions().len(),
            difficulty: state.chain.get_difficulty(),
            reward: state.chain.get_reward(),
        })
    }

    fn deliver(outbound: Outbound) {
        for (addr, message) in outbound {
            if let Err(e) = protocol::send(&addr, &message) {
                warn!("Failed to deliver {} to {addr}: {e}", message.action());
            }
        }
    }

    fn reply_to(state: &LedgerState, id: &str, message: Message) -> Result<Outbound> {
        let addr = state
            .peers
            .neighbor_by_id(id)
            .ok_or_else(|| BlockchainError::PeerNotFound(id.to_string()))?;
        Ok(vec![(addr, message)])
    }

    fn to_all(state: &LedgerState, message: Message) -> Outbound {
        state
            .peers
            .neighborhood()
            .into_values()
            .map(|addr| (addr, message.clone()))
            .collect()
    }

    /// Ask the node at `addr` to let us into its network.
    pub fn join(&self, addr: &str) -> Result<()> {
        info!("Joining network through {addr}");
        protocol::send(
            addr,
            &Message::Connect {
                id: self.node_id().to_string(),
                host: self.config.get_host().to_string(),
                port: self.config.get_port(),
            },
        )
    }

    /// Apply one inbound protocol message.
    pub fn handle_message(&self, message: Message) -> Result<()> {
        let outbound = {
            let mut state = self.lock()?;
            self.dispatch(&mut state, message)?
        };
        Self::deliver(outbound);
        Ok(())
    }

    fn dispatch(&self, state: &mut LedgerState, message: Message) -> Result<Outbound> {
        let local_id = self.node_id().to_string();
        match message {
            Message::Connect { id, host, port } => {
                let previous = state.peers.get_peers();
                match state.peers.add_peer(&id, &host, port) {
                    Ok(()) => {}
                    // Already known (or ourselves): the flood stops here
                    Err(e @ BlockchainError::DuplicatePeer(_)) | Err(e @ BlockchainError::SelfConnect) => {
                        debug!("Ignoring CONNECT from {id}: {e}");
                        return Ok(vec![]);
                    }
                    Err(e) => return Err(e),
                }
                info!("Peer {id} connected from {host}:{port}");

                let newcomer = state
                    .peers
                    .neighbor_by_id(&id)
                    .ok_or_else(|| BlockchainError::PeerNotFound(id.clone()))?;
                let mut outbound = vec![(
                    newcomer.clone(),
                    Message::ConnectLoopback {
                        id: local_id,
                        host: self.config.get_host().to_string(),
                        port: self.config.get_port(),
                    },
                )];
                // The newcomer hears about every neighbor we already had...
                outbound.extend(previous.iter().map(|peer| {
                    (
                        newcomer.clone(),
                        Message::Connect {
                            id: peer.get_id().to_string(),
                            host: peer.get_host().to_string(),
                            port: peer.get_port(),
                        },
                    )
                }));
                // ...and every one of them hears about the newcomer
                let forward = Message::Connect { id, host, port };
                outbound.extend(
                    previous
                        .iter()
                        .map(|peer| (peer.get_addr(), forward.clone())),
                );
                Ok(outbound)
            }
            Message::ConnectLoopback { id, host, port } => {
                match state.peers.add_peer(&id, &host, port) {
                    Ok(()) => info!("Peer {id} acknowledged us from {host}:{port}"),
                    Err(e @ BlockchainError::DuplicatePeer(_)) | Err(e @ BlockchainError::SelfConnect) => {
                        debug!("CONNECT_LOOPBACK from {id}: {e}");
                    }
                    Err(e) => return Err(e),
                }
                if state.chain.is_empty() {
                    return Self::reply_to(state, &id, Message::DownloadBlockchain { id: local_id });
                }
                Ok(vec![])
            }
            Message::ConnectOk { id } => {
                info!("Peer {id} finished synchronizing");
                Ok(vec![])
            }
            Message::Disconnect { id } => {
                state.peers.remove_peer(&id)?;
                info!("Peer {id} disconnected");
                Ok(vec![])
            }
            Message::Text { text } => {
                info!("Message: {text}");
                Ok(vec![])
            }
            Message::TxApprobation { id, tx } => {
                let hash = tx.hash();
                let reply = match state.chain.add_pending_transaction(tx.clone()) {
                    Ok(()) => {
                        info!("Approved transaction {hash} from {id}");
                        Message::TxApprobationOk { jury: local_id, tx }
                    }
                    Err(e) => {
                        warn!("Rejected transaction {hash} from {id}: {e}");
                        Message::TxApprobationFail { jury: local_id, tx }
                    }
                };
                Self::reply_to(state, &id, reply)
            }
            Message::TxApprobationOk { jury, tx } => {
                let hash = tx.hash();
                match state.approvals.record_approval(&hash, &jury) {
                    RoundStatus::Approved => {
                        info!("Transaction {hash} approved by every peer");
                        state.chain.add_pending_transaction(tx)?;
                    }
                    RoundStatus::Waiting(left) => {
                        debug!("Transaction {hash} approved by {jury}, {left} approvals left");
                    }
                    RoundStatus::Unknown => {
                        warn!("Approval from {jury} for unknown transaction {hash}");
                    }
                }
                Ok(vec![])
            }
            Message::TxApprobationFail { jury, tx } => {
                let hash = tx.hash();
                if state.approvals.record_rejection(&hash, &jury) == RoundStatus::Unknown {
                    warn!("Rejection from {jury} for unknown transaction {hash}");
                }
                Ok(vec![])
            }
            Message::DownloadBlockchain { id } => {
                let chain = state.chain.clone();
                Self::reply_to(
                    state,
                    &id,
                    Message::DownloadBlockchainOk {
                        id: local_id,
                        chain,
                    },
                )
            }
            Message::DownloadBlockchainOk { id, chain } => {
                state.chain.replace(chain)?;
                info!(
                    "Downloaded blockchain from {id}, height {}",
                    state.chain.height()
                );
                Self::reply_to(state, &id, Message::ConnectOk { id: local_id })
            }
            Message::SyncUptime { id } => Self::reply_to(
                state,
                &id,
                Message::SyncUptimeOk {
                    id: local_id,
                    uptime: self.uptime(),
                },
            ),
            Message::SyncUptimeOk { id, uptime } => {
                info!("Peer {id} has been up for {uptime}s");
                Ok(vec![])
            }
            Message::BlockApprobation { id, block } => {
                let hash = block.get_hash().to_string();
                if let Err(e) = state.chain.accept_block(block) {
                    warn!("Ignoring block {hash} from {id}: {e}");
                }
                Ok(vec![])
            }
        }
    }

    /// Validate `tx` locally and start an approval round with every
    /// neighbor. Without neighbors the transaction is committed right away.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Submission> {
        let hash = tx.hash();
        let (awaiting, outbound) = {
            let mut state = self.lock()?;
            state.chain.check_pending_transaction(&tx)?;

            if state.peers.is_empty() {
                state.chain.add_pending_transaction(tx)?;
                (vec![], vec![])
            } else {
                let jury = state.peers.ids();
                state.approvals.start_round(&hash, jury.clone());
                let outbound = Self::to_all(
                    &state,
                    Message::TxApprobation {
                        id: self.node_id().to_string(),
                        tx,
                    },
                );
                (jury, outbound)
            }
        };
        Self::deliver(outbound);
        Ok(Submission { hash, awaiting })
    }

    /// Build and sign a payment from `sender`'s spendable outputs, sending
    /// any remainder back to `sender` as change.
    pub fn create_payment(
        &self,
        sender: &str,
        receiver: &str,
        private_seed: &str,
        amount: u64,
    ) -> Result<Transaction> {
        let wallet = parse_wallet(private_seed)?;
        if wallet.get_address() != sender {
            return Err(BlockchainError::Wallet(
                "Private seed does not belong to the sender".to_string(),
            ));
        }
        if !validate_address(receiver) {
            return Err(BlockchainError::InvalidAddress(receiver.to_string()));
        }
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be greater than zero".to_string(),
            ));
        }

        let spendable = self.read_state(|state| state.chain.spendable_inputs(sender))?;
        let mut inputs: Vec<TXInput> = vec![];
        let mut total = 0u64;
        for input in spendable {
            if total >= amount {
                break;
            }
            total = total.checked_add(input.get_amount()).ok_or_else(|| {
                BlockchainError::Transaction(format!("Balance of {sender} overflows"))
            })?;
            inputs.push(input);
        }
        if total < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: total,
            });
        }

        let mut outputs = vec![TXOutput::new(receiver, amount)?];
        if total > amount {
            outputs.push(TXOutput::new(sender, total - amount)?);
        }
        Transaction::new_signed_transaction(&wallet, inputs, outputs)
    }

    /// Mine the pending batch if there is one and announce the block.
    pub fn mine_tick(&self) -> Result<Option<Block>> {
        let miner = match self.config.get_mining_addr() {
            Some(miner) => miner,
            None => return Ok(None),
        };
        let (block, outbound) = {
            let mut state = self.lock()?;
            if state.chain.get_pending_transactions().is_empty() {
                return Ok(None);
            }
            let block = state.chain.mine_block(miner)?;
            let outbound = Self::to_all(
                &state,
                Message::BlockApprobation {
                    id: self.node_id().to_string(),
                    block: block.clone(),
                },
            );
            (block, outbound)
        };
        Self::deliver(outbound);
        Ok(Some(block))
    }

    /// Mine one block unconditionally so a fresh network has a first reward
    /// waiting in the pending list.
    pub fn seed_chain(&self) -> Result<Option<Block>> {
        let miner = match self.config.get_mining_addr() {
            Some(miner) => miner,
            None => return Ok(None),
        };
        let mut state = self.lock()?;
        if !state.chain.is_empty() {
            return Ok(None);
        }
        let block = state.chain.mine_block(miner)?;
        Ok(Some(block))
    }

    /// Tell every neighbor we are leaving. Send failures are ignored.
    pub fn terminate(&self) -> Result<()> {
        let outbound = {
            let state = self.lock()?;
            Self::to_all(
                &state,
                Message::Disconnect {
                    id: self.node_id().to_string(),
                },
            )
        };
        info!("Disconnecting from {} peers", outbound.len());
        Self::deliver(outbound);
        Ok(())
    }

    pub fn broadcast_text(&self, line: &str) -> Result<()> {
        let outbound = {
            let state = self.lock()?;
            Self::to_all(
                &state,
                Message::Text {
                    text: format!("{}: {line}", self.node_id()),
                },
            )
        };
        Self::deliver(outbound);
        Ok(())
    }
}

// HTTP routes served next to the JACKIE protocol on the node's port

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::http::{Request, Response};
use crate::network::node::{NodeService, Submission};
use crate::wallet::{new_wallet, parse_wallet};
use http::StatusCode;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct CreateTransactionBody {
    pub sender: String,
    pub receiver: String,
    pub private_seed: String,
    pub amount: u64,
}

#[derive(Debug, Serialize)]
struct WalletBody {
    address: String,
    private_seed: String,
}

#[derive(Debug, Serialize)]
struct BalanceBody {
    date: String,
    balance: u64,
}

#[derive(Debug, Serialize)]
struct PeerInfo {
    id: String,
    address: String,
}

#[derive(Debug, Serialize)]
struct InfoBody {
    id: String,
    uptime: u64,
    peers: Vec<PeerInfo>,
    node_port: u16,
    mining_clock: u64,
}

#[derive(Debug, Serialize)]
struct PendingBody {
    transactions: Vec<Transaction>,
    awaiting: HashMap<String, Vec<String>>,
}

/// `offset`/`limit` window over a list already ordered newest first.
fn page<T: Clone>(items: &[T], request: &Request) -> Vec<T> {
    let offset = request.query_usize("offset", 0);
    let limit = request.query_usize("limit", items.len());
    items.iter().skip(offset).take(limit).cloned().collect()
}

fn failure(e: BlockchainError) -> Response {
    if e.is_validation() {
        warn!("Rejected request: {e}");
        Response::error(StatusCode::BAD_REQUEST, &e.to_string())
    } else {
        error!("Request failed: {e}");
        Response::error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T>) -> Response {
    match result {
        Ok(body) => Response::json(status, &body),
        Err(e) => failure(e),
    }
}

/// Dispatch one HTTP request against the node.
pub fn route(node: &NodeService, request: &Request) -> Response {
    match (request.method(), request.segments().as_slice()) {
        ("GET", ["chain"]) => respond(StatusCode::OK, node.read_state(|s| s.chain.clone())),
        ("GET", ["blocks"]) => respond(StatusCode::OK, list_blocks(node, request)),
        ("GET", ["transactions"]) => respond(StatusCode::OK, list_transactions(node, request)),
        ("GET", ["pending"]) => respond(StatusCode::OK, pending(node)),
        ("GET", ["info"]) => respond(StatusCode::OK, info(node)),
        ("GET", ["stats"]) => respond(StatusCode::OK, node.stats()),
        ("GET", ["wallets", seed]) => respond(StatusCode::OK, wallet_by_seed(seed)),
        ("POST", ["wallets"]) => respond(StatusCode::CREATED, create_wallet()),
        ("GET", ["balance", address]) => respond(StatusCode::OK, balance(node, address)),
        ("POST", ["transactions"]) => respond(StatusCode::CREATED, create_transaction(node, request)),
        _ => Response::not_found(),
    }
}

fn list_blocks(node: &NodeService, request: &Request) -> Result<Vec<Block>> {
    let newest_first: Vec<Block> =
        node.read_state(|s| s.chain.get_blocks().iter().rev().cloned().collect())?;
    Ok(page(&newest_first, request))
}

fn list_transactions(node: &NodeService, request: &Request) -> Result<Vec<Transaction>> {
    let mut transactions = node.read_state(|s| s.chain.transactions())?;
    transactions.reverse();
    Ok(page(&transactions, request))
}

fn pending(node: &NodeService) -> Result<PendingBody> {
    node.read_state(|s| PendingBody {
        transactions: s.chain.get_pending_transactions().to_vec(),
        awaiting: s.approvals.open_rounds(),
    })
}

fn info(node: &NodeService) -> Result<InfoBody> {
    let stats = node.stats()?;
    let peers = stats
        .neighbors
        .into_iter()
        .map(|(id, address)| PeerInfo { id, address })
        .collect();
    Ok(InfoBody {
        id: stats.node_id,
        uptime: stats.uptime,
        peers,
        node_port: stats.port,
        mining_clock: stats.mining_interval,
    })
}

fn wallet_by_seed(seed: &str) -> Result<WalletBody> {
    let wallet = parse_wallet(seed)?;
    Ok(WalletBody {
        address: wallet.get_address(),
        private_seed: wallet.get_private_seed(),
    })
}

fn create_wallet() -> Result<WalletBody> {
    let (address, private_seed) = new_wallet()?;
    Ok(WalletBody {
        address,
        private_seed,
    })
}

fn balance(node: &NodeService, address: &str) -> Result<BalanceBody> {
    let balance = node.read_state(|s| s.chain.balance(address))?;
    Ok(BalanceBody {
        date: chrono::Utc::now().to_rfc3339(),
        balance,
    })
}

fn create_transaction(node: &NodeService, request: &Request) -> Result<Submission> {
    let body: CreateTransactionBody = serde_json::from_slice(request.body())?;
    let tx = node.create_payment(&body.sender, &body.receiver, &body.private_seed, body.amount)?;
    node.submit_transaction(tx)
}

// This is the core ledger - blocks, the pending batch and the UTXO index
// Everything lives in memory; the node service owns one of these behind its lock
// and is the only thing that mutates it

use crate::core::{Block, ProofOfWork, TXInput, TXOutput, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// `previous_hash` of the first block in a chain.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blockchain {
    blocks: Vec<Block>,                    // Append-only, oldest first
    pending_transactions: Vec<Transaction>, // Waiting for the next mined block
    utxo: UTXOSet,                         // Index of unspent outputs from confirmed blocks
    difficulty: usize,                     // Leading zero hex digits required
    reward: u64,                           // Coinbase amount for the miner
}

impl Blockchain {
    // An empty ledger: no blocks, nothing pending, no outputs
    pub fn new(difficulty: usize, reward: u64) -> Blockchain {
        Blockchain {
            blocks: vec![],
            pending_transactions: vec![],
            utxo: UTXOSet::new(),
            difficulty,
            reward,
        }
    }

    /// Queue a transaction for the next block.
    ///
    /// The signature is checked (coinbase transactions skip this) along with
    /// the spends: every input must name a confirmed unspent output that no
    /// other pending transaction claims. The UTXO set is left alone until the
    /// transaction is mined.
    pub fn add_pending_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.check_pending_transaction(&tx)?;
        info!("Transaction {} added to the pending list", tx.hash());
        self.pending_transactions.push(tx);
        Ok(())
    }

    /// Every check `add_pending_transaction` runs, without queueing.
    pub fn check_pending_transaction(&self, tx: &Transaction) -> Result<()> {
        tx.verify()?;

        let hash = tx.hash();
        if self.pending_transactions.iter().any(|p| p.hash() == hash) {
            return Err(BlockchainError::Transaction(format!(
                "Transaction {hash} is already pending"
            )));
        }

        if tx.is_coinbase() {
            return Ok(());
        }

        let pending_spends = self.pending_spends();
        for input in tx.get_inputs() {
            let source = input.get_source_output_hash();
            if pending_spends.contains(source) {
                return Err(BlockchainError::Transaction(format!(
                    "Output {source} is already spent by a pending transaction"
                )));
            }
            if self.is_output_spent(source) {
                return Err(BlockchainError::Transaction(format!(
                    "Output {source} was already spent in a confirmed block"
                )));
            }
            let output = self.utxo.get(source).ok_or_else(|| {
                BlockchainError::Transaction(format!("Output {source} is not unspent"))
            })?;
            if output.get_amount() != input.get_amount()
                || output.get_receiver() != input.get_sender()
            {
                return Err(BlockchainError::Transaction(format!(
                    "Input does not match unspent output {source}"
                )));
            }
        }

        let input_value = tx.get_input_value()?;
        let output_value = tx.get_output_value()?;
        if output_value > input_value {
            return Err(BlockchainError::InsufficientFunds {
                required: output_value,
                available: input_value,
            });
        }
        Ok(())
    }

    /// Mine the current pending batch into a block on top of the tail.
    ///
    /// The nonce search runs to completion on the calling thread. Once the
    /// block is appended, its spends and outputs are applied to the UTXO set
    /// and the pending list is replaced by a fresh coinbase for `miner_address`.
    pub fn mine_block(&mut self, miner_address: &str) -> Result<Block> {
        let transactions = self.pending_transactions.clone();
        let coinbase = Transaction::new_coinbase_tx(miner_address, self.reward)?;
        let block = Block::new_block(self.tip_hash(), &transactions, self.difficulty)?;

        self.utxo.update(&block);
        self.blocks.push(block.clone());
        self.pending_transactions = vec![coinbase];

        info!(
            "Block {} mined at height {} with {} transactions",
            block.get_hash(),
            self.blocks.len(),
            transactions.len()
        );
        Ok(block)
    }

    /// Append a block mined by a peer if it extends our tail.
    ///
    /// There is no fork resolution: a block that does not link to the local
    /// tail is rejected. Its spends are checked against the UTXO set the same
    /// way pending transactions are.
    pub fn accept_block(&mut self, block: Block) -> Result<()> {
        if block.get_previous_hash() != self.tip_hash() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} does not extend local tail {}",
                block.get_hash(),
                self.tip_hash()
            )));
        }
        let mut utxo = self.utxo.clone();
        self.check_block(&mut utxo, &block)?;

        let confirmed: HashSet<String> = block.get_transactions().iter().map(|tx| tx.hash()).collect();
        let spent: HashSet<&str> = block
            .get_transactions()
            .iter()
            .flat_map(|tx| tx.get_inputs())
            .map(TXInput::get_source_output_hash)
            .collect();
        self.pending_transactions.retain(|tx| {
            !confirmed.contains(&tx.hash())
                && !tx
                    .get_inputs()
                    .iter()
                    .any(|input| spent.contains(input.get_source_output_hash()))
        });

        self.utxo = utxo;
        info!("Accepted block {} from the network", block.get_hash());
        self.blocks.push(block);
        Ok(())
    }

    // Proof-of-work, signatures and spends of `block`, applied to `utxo` as
    // it goes. On error `utxo` is left half-applied and must be thrown away.
    fn check_block(&self, utxo: &mut UTXOSet, block: &Block) -> Result<()> {
        if !ProofOfWork::validate(block, self.difficulty) {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} fails proof-of-work at difficulty {}",
                block.get_hash(),
                self.difficulty
            )));
        }

        for tx in block.get_transactions() {
            tx.verify()?;
            let output_value = tx.get_output_value()?;

            if !tx.is_coinbase() {
                for input in tx.get_inputs() {
                    let source = input.get_source_output_hash();
                    let output = utxo.spend(source).ok_or_else(|| {
                        BlockchainError::InvalidBlock(format!(
                            "Block {} spends {source}, which is not unspent",
                            block.get_hash()
                        ))
                    })?;
                    if output.get_amount() != input.get_amount()
                        || output.get_receiver() != input.get_sender()
                    {
                        return Err(BlockchainError::InvalidBlock(format!(
                            "Block {} has an input that does not match output {source}",
                            block.get_hash()
                        )));
                    }
                }
                let input_value = tx.get_input_value()?;
                if output_value > input_value {
                    return Err(BlockchainError::InvalidBlock(format!(
                        "Transaction {} in block {} pays out {output_value} from {input_value}",
                        tx.hash(),
                        block.get_hash()
                    )));
                }
            }
            utxo.add_outputs(tx);
        }
        Ok(())
    }

    // Replays every block from an empty UTXO set and returns the set at the tail
    fn replay(&self) -> Result<UTXOSet> {
        let mut utxo = UTXOSet::new();
        let mut previous_hash = GENESIS_PREVIOUS_HASH.to_string();
        for block in &self.blocks {
            if block.get_previous_hash() != previous_hash {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {} does not link to {previous_hash}",
                    block.get_hash()
                )));
            }
            self.check_block(&mut utxo, block)?;
            previous_hash = block.get_hash().to_string();
        }
        Ok(utxo)
    }

    /// Check every block: hash recomputes, meets the difficulty, links to
    /// its predecessor and only spends outputs that are still unspent.
    pub fn validate(&self) -> Result<()> {
        self.replay().map(|_| ())
    }

    /// Swap in a chain downloaded from a peer.
    ///
    /// The downloaded blocks are validated against the local difficulty and
    /// the UTXO index is rebuilt from them instead of trusting the sender's.
    /// Pending transactions that fail the local checks are dropped.
    pub fn replace(&mut self, downloaded: Blockchain) -> Result<()> {
        let mut replacement = Blockchain {
            blocks: downloaded.blocks,
            pending_transactions: vec![],
            utxo: UTXOSet::new(),
            difficulty: self.difficulty,
            reward: self.reward,
        };
        replacement.utxo = replacement.replay()?;

        for tx in downloaded.pending_transactions {
            if let Err(e) = replacement.add_pending_transaction(tx) {
                warn!("Dropping downloaded pending transaction: {e}");
            }
        }

        *self = replacement;
        Ok(())
    }

    fn pending_spends(&self) -> HashSet<&str> {
        self.pending_transactions
            .iter()
            .flat_map(|tx| tx.get_inputs())
            .map(TXInput::get_source_output_hash)
            .collect()
    }

    /// Whether a confirmed transaction already consumed `output_hash`.
    pub fn is_output_spent(&self, output_hash: &str) -> bool {
        self.blocks
            .iter()
            .flat_map(|block| block.get_transactions())
            .flat_map(|tx| tx.get_inputs())
            .any(|input| input.get_source_output_hash() == output_hash)
    }

    /// Unspent outputs whose receiver is `address`.
    pub fn utxos_by_address(&self, address: &str) -> Vec<TXOutput> {
        self.utxo.find_by_address(address)
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.utxo.balance(address)
    }

    /// Unspent outputs of `address` not already claimed by a pending
    /// transaction, ready to be signed as inputs.
    pub fn spendable_inputs(&self, address: &str) -> Vec<TXInput> {
        let pending_spends = self.pending_spends();
        let mut outputs = self.utxos_by_address(address);
        outputs.sort_by_key(TXOutput::get_timestamp);
        outputs
            .iter()
            .filter(|output| !pending_spends.contains(output.hash().as_str()))
            .map(TXOutput::to_input)
            .collect()
    }

    pub fn tip_hash(&self) -> String {
        match self.blocks.last() {
            Some(block) => block.get_hash().to_string(),
            None => GENESIS_PREVIOUS_HASH.to_string(),
        }
    }

    /// Confirmed transactions, oldest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.blocks
            .iter()
            .flat_map(|block| block.get_transactions().iter().cloned())
            .collect()
    }

    pub fn get_blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    pub fn get_pending_transactions(&self) -> &[Transaction] {
        self.pending_transactions.as_slice()
    }

    pub fn get_utxo_set(&self) -> &UTXOSet {
        &self.utxo
    }

    pub fn get_difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn get_reward(&self) -> u64 {
        self.reward
    }

    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    // Mines twice so `owner` ends up with one confirmed coinbase output
    fn funded_chain(owner: &Wallet, reward: u64) -> Blockchain {
        let mut chain = Blockchain::new(1, reward);
        chain.mine_block(&owner.get_address()).unwrap();
        chain.mine_block(&owner.get_address()).unwrap();
        chain
    }

    fn pay(chain: &Blockchain, from: &Wallet, to: &str, amount: u64) -> Transaction {
        let inputs = chain.spendable_inputs(&from.get_address());
        let total: u64 = inputs.iter().map(TXInput::get_amount).sum();
        let mut outputs = vec![TXOutput::new(to, amount).unwrap()];
        if total > amount {
            outputs.push(TXOutput::new(&from.get_address(), total - amount).unwrap());
        }
        Transaction::new_signed_transaction(from, inputs, outputs).unwrap()
    }

    #[test]
    fn test_new_chain_is_empty() {
        let chain = Blockchain::new(2, 10);
        assert!(chain.is_empty());
        assert!(chain.get_pending_transactions().is_empty());
        assert!(chain.get_utxo_set().is_empty());
        assert_eq!(chain.tip_hash(), GENESIS_PREVIOUS_HASH);
    }

    #[test]
    fn test_genesis_mining_scenario() {
        let mut chain = Blockchain::new(2, 10);
        let block = chain.mine_block("M").unwrap();

        assert!(block.get_hash().starts_with("00"));
        assert_eq!(block.get_previous_hash(), GENESIS_PREVIOUS_HASH);
        assert_eq!(chain.height(), 1);

        let pending = chain.get_pending_transactions();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_coinbase());
        assert_eq!(pending[0].get_outputs().len(), 1);
        assert_eq!(pending[0].get_outputs()[0].get_receiver(), "M");
        assert_eq!(pending[0].get_outputs()[0].get_amount(), 10);
        // Coinbase is only pending, nothing is spendable yet
        assert_eq!(chain.balance("M"), 0);
    }

    #[test]
    fn test_valid_transaction_is_pending_exactly_once() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let mut chain = funded_chain(&alice, 50);
        let tx = pay(&chain, &alice, &bob.get_address(), 20);

        chain.add_pending_transaction(tx.clone()).unwrap();
        let count = chain
            .get_pending_transactions()
            .iter()
            .filter(|p| p.hash() == tx.hash())
            .count();
        assert_eq!(count, 1);

        // Adding it again is rejected
        assert!(chain.add_pending_transaction(tx).is_err());
    }

    #[test]
    fn test_invalid_signature_leaves_pending_unchanged() {
        let alice = Wallet::new().unwrap();
        let mallory = Wallet::new().unwrap();
        let mut chain = funded_chain(&alice, 50);

        let mut forged = pay(&chain, &alice, &mallory.get_address(), 20);
        // Re-sign the same spend with the wrong key
        let inputs = forged.get_inputs().to_vec();
        let outputs = forged.get_outputs().to_vec();
        let honest = Transaction::new_signed_transaction(&alice, inputs, outputs).unwrap();
        let mut json = serde_json::to_value(&honest).unwrap();
        json["signature"] = serde_json::to_value(mallory.sign(b"junk").unwrap()).unwrap();
        forged = serde_json::from_value(json).unwrap();

        let before = chain.get_pending_transactions().to_vec();
        for _ in 0..2 {
            let result = chain.add_pending_transaction(forged.clone());
            assert!(matches!(result, Err(BlockchainError::InvalidSignature(_))));
            assert_eq!(chain.get_pending_transactions(), before.as_slice());
        }
    }

    #[test]
    fn test_conflicting_spend_is_rejected() {
        let alice = Wallet::new().unwrap();
        let mut chain = funded_chain(&alice, 50);
        let first = pay(&chain, &alice, "bob", 10);
        let second = pay(&chain, &alice, "carol", 10);

        chain.add_pending_transaction(first).unwrap();
        let result = chain.add_pending_transaction(second);
        assert!(matches!(result, Err(BlockchainError::Transaction(_))));
    }

    #[test]
    fn test_outputs_exceeding_inputs_are_rejected() {
        let alice = Wallet::new().unwrap();
        let mut chain = funded_chain(&alice, 50);
        let inputs = chain.spendable_inputs(&alice.get_address());
        let outputs = vec![TXOutput::new("bob", 51).unwrap()];
        let tx = Transaction::new_signed_transaction(&alice, inputs, outputs).unwrap();

        assert!(matches!(
            chain.add_pending_transaction(tx),
            Err(BlockchainError::InsufficientFunds {
                required: 51,
                available: 50
            })
        ));
    }

    #[test]
    fn test_utxo_balance_after_mining() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let mut chain = funded_chain(&alice, 50);
        assert_eq!(chain.balance(&alice.get_address()), 50);

        let tx = pay(&chain, &alice, &bob.get_address(), 20);
        chain.add_pending_transaction(tx).unwrap();
        chain.mine_block("miner").unwrap();

        // Alice: 50 + 50 (second coinbase) - 50 spent + 30 change
        let alice_addr = alice.get_address();
        let received: u64 = chain
            .transactions()
            .iter()
            .flat_map(|tx| tx.get_outputs())
            .filter(|o| o.get_receiver() == alice_addr)
            .map(TXOutput::get_amount)
            .sum();
        let spent: u64 = chain
            .transactions()
            .iter()
            .flat_map(|tx| tx.get_inputs())
            .filter(|i| i.get_sender() == alice_addr)
            .map(TXInput::get_amount)
            .sum();
        assert_eq!(chain.balance(&alice_addr), received - spent);
        assert_eq!(chain.balance(&alice_addr), 80);
        assert_eq!(chain.balance(&bob.get_address()), 20);
    }

    #[test]
    fn test_spent_output_cannot_be_reused_after_mining() {
        let alice = Wallet::new().unwrap();
        let mut chain = funded_chain(&alice, 50);
        let tx = pay(&chain, &alice, "bob", 50);
        let replay_inputs = tx.get_inputs().to_vec();
        chain.add_pending_transaction(tx).unwrap();
        chain.mine_block("miner").unwrap();

        let replay = Transaction::new_signed_transaction(
            &alice,
            replay_inputs,
            vec![TXOutput::new("carol", 50).unwrap()],
        )
        .unwrap();
        assert!(chain.add_pending_transaction(replay).is_err());
    }

    #[test]
    fn test_json_round_trip_and_validate() {
        let mut chain = Blockchain::new(1, 10);
        chain.mine_block("M").unwrap();
        chain.mine_block("M").unwrap();

        let json = serde_json::to_string(&chain).unwrap();
        let decoded: Blockchain = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.get_blocks(), chain.get_blocks());
        for block in decoded.get_blocks() {
            assert_eq!(block.calculate_hash(), block.get_hash());
        }
        assert!(decoded.validate().is_ok());
    }

    #[test]
    fn test_replace_rebuilds_utxo_index() {
        let mut source = Blockchain::new(1, 10);
        source.mine_block("M").unwrap();
        source.mine_block("M").unwrap();

        let mut local = Blockchain::new(1, 10);
        local.replace(source.clone()).unwrap();

        assert_eq!(local.get_blocks(), source.get_blocks());
        assert_eq!(local.balance("M"), 10);
        assert_eq!(local.get_pending_transactions().len(), 1);
    }

    #[test]
    fn test_replace_rejects_broken_links() {
        let mut source = Blockchain::new(1, 10);
        source.mine_block("M").unwrap();
        source.mine_block("M").unwrap();
        source.blocks.swap(0, 1);

        let mut local = Blockchain::new(1, 10);
        assert!(matches!(
            local.replace(source),
            Err(BlockchainError::InvalidBlock(_))
        ));
        assert!(local.is_empty());
    }

    #[test]
    fn test_accept_block_extends_tail_only() {
        let mut miner = Blockchain::new(1, 10);
        let first = miner.mine_block("M").unwrap();
        let second = miner.mine_block("M").unwrap();

        let mut follower = Blockchain::new(1, 10);
        assert!(follower.accept_block(second.clone()).is_err());
        follower.accept_block(first).unwrap();
        follower.accept_block(second).unwrap();

        assert_eq!(follower.get_blocks(), miner.get_blocks());
        assert_eq!(follower.balance("M"), 10);
    }

    // Alice's 50 is spent to bob and mined; hands back the inputs she used
    fn spent_chain(alice: &Wallet) -> (Blockchain, Vec<TXInput>) {
        let mut chain = funded_chain(alice, 50);
        let tx = pay(&chain, alice, "bob", 50);
        let inputs = tx.get_inputs().to_vec();
        chain.add_pending_transaction(tx).unwrap();
        chain.mine_block("miner").unwrap();
        (chain, inputs)
    }

    #[test]
    fn test_accept_block_rejects_double_spend() {
        let alice = Wallet::new().unwrap();
        let (mut chain, inputs) = spent_chain(&alice);
        let respend = Transaction::new_signed_transaction(
            &alice,
            inputs,
            vec![TXOutput::new("carol", 1000).unwrap()],
        )
        .unwrap();
        let block = Block::new_block(chain.tip_hash(), &[respend], 1).unwrap();
        let height = chain.height();

        assert!(matches!(
            chain.accept_block(block),
            Err(BlockchainError::InvalidBlock(_))
        ));
        assert_eq!(chain.height(), height);
        assert_eq!(chain.balance("carol"), 0);
        assert_eq!(chain.balance("bob"), 50);
    }

    #[test]
    fn test_accept_block_rejects_outputs_above_inputs() {
        let alice = Wallet::new().unwrap();
        let mut chain = funded_chain(&alice, 50);
        let inflated = Transaction::new_signed_transaction(
            &alice,
            chain.spendable_inputs(&alice.get_address()),
            vec![TXOutput::new("carol", 1000).unwrap()],
        )
        .unwrap();
        let block = Block::new_block(chain.tip_hash(), &[inflated], 1).unwrap();

        assert!(matches!(
            chain.accept_block(block),
            Err(BlockchainError::InvalidBlock(_))
        ));
        assert_eq!(chain.balance(&alice.get_address()), 50);
        assert_eq!(chain.balance("carol"), 0);
    }

    #[test]
    fn test_accept_block_rejects_overflowing_coinbase() {
        let mut chain = Blockchain::new(1, 10);
        let coinbase = Transaction::new_coinbase_tx("M", u64::MAX).unwrap();
        let mut json = serde_json::to_value(&coinbase).unwrap();
        let mut extra = json["outputs"][0].clone();
        extra["timestamp"] = serde_json::json!(extra["timestamp"].as_i64().unwrap() + 1);
        json["outputs"].as_array_mut().unwrap().push(extra);
        let coinbase: Transaction = serde_json::from_value(json).unwrap();
        let block = Block::new_block(chain.tip_hash(), &[coinbase], 1).unwrap();

        assert!(chain.accept_block(block).is_err());
        assert!(chain.is_empty());
        assert_eq!(chain.balance("M"), 0);
    }

    #[test]
    fn test_replace_rejects_double_spend() {
        let alice = Wallet::new().unwrap();
        let (mut source, inputs) = spent_chain(&alice);
        let respend = Transaction::new_signed_transaction(
            &alice,
            inputs,
            vec![TXOutput::new("carol", 1000).unwrap()],
        )
        .unwrap();
        let block = Block::new_block(source.tip_hash(), &[respend], 1).unwrap();
        source.blocks.push(block);

        let mut local = Blockchain::new(1, 50);
        assert!(matches!(
            local.replace(source),
            Err(BlockchainError::InvalidBlock(_))
        ));
        assert!(local.is_empty());
        assert_eq!(local.balance("carol"), 0);
    }
}

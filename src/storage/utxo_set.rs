use crate::core::{Block, TXOutput, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// ( K -> output hash, V => TXOutput )
///
/// Only block application mutates the set: outputs consumed by inputs are
/// removed once and outputs produced are inserted once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTXOSet {
    outputs: HashMap<String, TXOutput>,
}

impl UTXOSet {
    pub fn new() -> UTXOSet {
        UTXOSet {
            outputs: HashMap::new(),
        }
    }

    /// Rebuild the set from scratch by replaying `blocks` in order.
    pub fn reindex(blocks: &[Block]) -> UTXOSet {
        let mut utxo_set = UTXOSet::new();
        for block in blocks {
            utxo_set.update(block);
        }
        utxo_set
    }

    /// Apply one confirmed block. The block must already have been checked
    /// against this set.
    pub fn update(&mut self, block: &Block) {
        for tx in block.get_transactions() {
            for input in tx.get_inputs() {
                if self.spend(input.get_source_output_hash()).is_none() {
                    log::debug!(
                        "Spent output {} was not in the UTXO set",
                        input.get_source_output_hash()
                    );
                }
            }
            self.add_outputs(tx);
        }
    }

    /// Remove `output_hash` from the set, handing back the output it named.
    pub fn spend(&mut self, output_hash: &str) -> Option<TXOutput> {
        self.outputs.remove(output_hash)
    }

    pub fn add_outputs(&mut self, tx: &Transaction) {
        for output in tx.get_outputs() {
            self.outputs.insert(output.hash(), output.clone());
        }
    }

    pub fn get(&self, output_hash: &str) -> Option<&TXOutput> {
        self.outputs.get(output_hash)
    }

    pub fn contains(&self, output_hash: &str) -> bool {
        self.outputs.contains_key(output_hash)
    }

    /// Linear scan for every unspent output owned by `address`.
    pub fn find_by_address(&self, address: &str) -> Vec<TXOutput> {
        self.outputs
            .values()
            .filter(|output| output.is_locked_with(address))
            .cloned()
            .collect()
    }

    /// Sum of the outputs owned by `address`, capped at `u64::MAX`.
    pub fn balance(&self, address: &str) -> u64 {
        self.outputs
            .values()
            .filter(|output| output.is_locked_with(address))
            .fold(0u64, |total, output| total.saturating_add(output.get_amount()))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

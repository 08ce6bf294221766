// This file implements the transaction system - how value moves between addresses
// I'm using the UTXO (Unspent Transaction Output) model: each transaction consumes
// previous outputs and creates new ones

use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp_nanos, serialize, sha256_hex};
use crate::wallet::{self, Wallet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// This represents a transaction output - a "check" that can be cashed later
// by whoever holds the key behind `receiver`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct TXOutput {
    receiver: String, // Address allowed to spend this output
    amount: u64,      // Value of the output
    timestamp: i64,   // Creation time in nanoseconds, keeps equal payments apart
}

impl TXOutput {
    pub fn new(receiver: &str, amount: u64) -> Result<TXOutput> {
        Ok(TXOutput {
            receiver: receiver.to_string(),
            amount,
            timestamp: current_timestamp_nanos()?,
        })
    }

    pub fn get_receiver(&self) -> &str {
        self.receiver.as_str()
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The key this output is stored under in the UTXO set.
    pub fn hash(&self) -> String {
        let payload = format!("{}::{}::{}", self.receiver, self.amount, self.timestamp);
        sha256_hex(payload.as_bytes())
    }

    pub fn is_locked_with(&self, address: &str) -> bool {
        self.receiver == address
    }

    // Converting an unspent output into an (unsigned) input that spends it
    pub fn to_input(&self) -> TXInput {
        TXInput {
            sender: self.receiver.clone(),
            amount: self.amount,
            signature: vec![],
            source_output_hash: self.hash(),
        }
    }
}

// This represents a transaction input - it points at the output being spent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct TXInput {
    sender: String, // Owner of the output being spent
    amount: u64,    // Value carried over from the output
    #[serde(default)]
    signature: Vec<u8>, // Sender's signature over `source_output_hash`
    source_output_hash: String,
}

impl TXInput {
    pub fn get_sender(&self) -> &str {
        self.sender.as_str()
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_source_output_hash(&self) -> &str {
        self.source_output_hash.as_str()
    }
}

// The main transaction structure. Coinbase transactions are the ones with no inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct Transaction {
    #[serde(default)]
    signature: Vec<u8>, // Sender's signature over the canonical hash
    inputs: Vec<TXInput>,
    outputs: Vec<TXOutput>,
    timestamp: i64,
}

impl Transaction {
    // When I create a coinbase transaction (the reward for mining a block)
    pub fn new_coinbase_tx(to: &str, reward: u64) -> Result<Transaction> {
        let txout = TXOutput::new(to, reward)?;
        Ok(Transaction {
            signature: vec![],
            inputs: vec![],
            outputs: vec![txout],
            timestamp: current_timestamp_nanos()?,
        })
    }

    /// Build and sign a transaction spending `inputs` owned by `sender`.
    ///
    /// Each input gets the sender's signature over the output it spends, then
    /// the whole transaction is signed over its canonical hash.
    pub fn new_signed_transaction(
        sender: &Wallet,
        inputs: Vec<TXInput>,
        outputs: Vec<TXOutput>,
    ) -> Result<Transaction> {
        if inputs.is_empty() {
            return Err(BlockchainError::Transaction(
                "A signed transaction needs at least one input".to_string(),
            ));
        }

        let address = sender.get_address();
        let mut signed_inputs = Vec::with_capacity(inputs.len());
        for mut input in inputs {
            if input.sender != address {
                return Err(BlockchainError::Transaction(format!(
                    "Input {} is not owned by {address}",
                    input.source_output_hash
                )));
            }
            input.signature = sender.sign(input.source_output_hash.as_bytes())?;
            signed_inputs.push(input);
        }

        let mut tx = Transaction {
            signature: vec![],
            inputs: signed_inputs,
            outputs,
            timestamp: current_timestamp_nanos()?,
        };
        tx.signature = sender.sign(tx.hash().as_bytes())?;
        Ok(tx)
    }

    // Signatures are stripped so the hash is what gets signed
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TXInput {
                signature: vec![],
                ..input.clone()
            })
            .collect();
        Transaction {
            signature: vec![],
            inputs,
            outputs: self.outputs.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Canonical hash: SHA-256 over the bincode form of the unsigned copy.
    pub fn hash(&self) -> String {
        match serialize(&self.trimmed_copy()) {
            Ok(serialized) => sha256_hex(&serialized),
            Err(_) => {
                // Fallback hash for serialization errors
                log::error!("Transaction serialization failed during hash calculation");
                sha256_hex(b"transaction_serialization_error")
            }
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Address spending the inputs, `None` for coinbase transactions.
    pub fn sender(&self) -> Option<&str> {
        self.inputs.first().map(|input| input.get_sender())
    }

    /// Signature checks. Coinbase transactions are always valid.
    pub fn verify(&self) -> Result<()> {
        let sender = match self.sender() {
            Some(sender) => sender,
            None => return Ok(()),
        };

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if input.sender != sender {
                return Err(BlockchainError::Transaction(format!(
                    "Mixed senders in one transaction: {sender} and {}",
                    input.sender
                )));
            }
            if !seen.insert(input.source_output_hash.as_str()) {
                return Err(BlockchainError::Transaction(format!(
                    "Output {} spent twice in one transaction",
                    input.source_output_hash
                )));
            }
            if !wallet::verify(
                sender,
                input.source_output_hash.as_bytes(),
                input.signature.as_slice(),
            ) {
                return Err(BlockchainError::InvalidSignature(format!(
                    "Input {} is not signed by {sender}",
                    input.source_output_hash
                )));
            }
        }

        if !wallet::verify(sender, self.hash().as_bytes(), self.signature.as_slice()) {
            return Err(BlockchainError::InvalidSignature(format!(
                "Transaction {} is not signed by {sender}",
                self.hash()
            )));
        }
        Ok(())
    }

    pub fn get_input_value(&self) -> Result<u64> {
        let mut total = 0u64;
        for input in &self.inputs {
            total = total
                .checked_add(input.amount)
                .ok_or_else(|| BlockchainError::Transaction("Input value overflow".to_string()))?;
        }
        Ok(total)
    }

    pub fn get_output_value(&self) -> Result<u64> {
        let mut total = 0u64;
        for output in &self.outputs {
            total = total
                .checked_add(output.amount)
                .ok_or_else(|| BlockchainError::Transaction("Output value overflow".to_string()))?;
        }
        Ok(total)
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_inputs(&self) -> &[TXInput] {
        self.inputs.as_slice()
    }

    pub fn get_outputs(&self) -> &[TXOutput] {
        self.outputs.as_slice()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }
}

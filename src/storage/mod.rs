//! Ledger state storage
//!
//! Everything is memory-resident: the UTXO index lives next to the chain it
//! was built from and is rebuilt whenever a chain is replaced.

pub mod utxo_set;

pub use utxo_set::UTXOSet;

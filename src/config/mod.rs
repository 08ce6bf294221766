//! Configuration management
//!
//! Node settings come from environment variables with defaults, and the
//! command line can override any of them before the node starts.

pub mod settings;

pub use settings::Config;

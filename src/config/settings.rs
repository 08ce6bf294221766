use crate::core::MAX_DIFFICULTY;
use crate::error::{BlockchainError, Result};
use std::env;
use std::time::Duration;
use uuid::Uuid;

static DEFAULT_NODE_HOST: &str = "127.0.0.1";
const DEFAULT_NODE_PORT: u16 = 3000;
const DEFAULT_MINING_INTERVAL_SECS: u64 = 10;
const DEFAULT_MINING_DIFFICULTY: usize = 4;
const DEFAULT_MINING_REWARD: u64 = 10;
/// Largest coinbase a node will mint, so reward sums stay far from `u64::MAX`.
pub const MAX_MINING_REWARD: u64 = 1_000_000_000_000;

const NODE_HOST_KEY: &str = "NODE_HOST";
const NODE_PORT_KEY: &str = "NODE_PORT";
const JOIN_ADDRESS_KEY: &str = "JOIN_ADDRESS";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";
const MINING_INTERVAL_KEY: &str = "MINING_INTERVAL_SECS";
const MINING_DIFFICULTY_KEY: &str = "MINING_DIFFICULTY";
const MINING_REWARD_KEY: &str = "MINING_REWARD";

/// Everything a node needs to start. Built from the environment, then
/// overridden by command-line flags, then validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    node_id: String,
    host: String,   // Advertised to peers in CONNECT
    port: u16,      // 0 picks a free port
    join_address: Option<String>,
    mining_address: Option<String>,
    mining_interval: Duration,
    difficulty: usize,
    reward: u64,
    console: bool,  // Broadcast stdin lines as MESSAGE
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_id: Uuid::new_v4().to_string(),
            host: DEFAULT_NODE_HOST.to_string(),
            port: DEFAULT_NODE_PORT,
            join_address: None,
            mining_address: None,
            mining_interval: Duration::from_secs(DEFAULT_MINING_INTERVAL_SECS),
            difficulty: DEFAULT_MINING_DIFFICULTY,
            reward: DEFAULT_MINING_REWARD,
            console: false,
            verbose: false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| BlockchainError::Config(format!("{key}={raw}: {e}")))
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(host) = lookup(NODE_HOST_KEY) {
            config.host = host;
        }
        if let Some(port) = lookup(NODE_PORT_KEY) {
            config.port = parse_var(NODE_PORT_KEY, &port)?;
        }
        config.join_address = lookup(JOIN_ADDRESS_KEY).filter(|addr| !addr.is_empty());
        config.mining_address = lookup(MINING_ADDRESS_KEY).filter(|addr| !addr.is_empty());
        if let Some(secs) = lookup(MINING_INTERVAL_KEY) {
            config.mining_interval = Duration::from_secs(parse_var(MINING_INTERVAL_KEY, &secs)?);
        }
        if let Some(difficulty) = lookup(MINING_DIFFICULTY_KEY) {
            config.difficulty = parse_var(MINING_DIFFICULTY_KEY, &difficulty)?;
        }
        if let Some(reward) = lookup(MINING_REWARD_KEY) {
            config.reward = parse_var(MINING_REWARD_KEY, &reward)?;
        }
        Ok(config)
    }

    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "Mining difficulty {} is above the maximum of {MAX_DIFFICULTY}",
                self.difficulty
            )));
        }
        if self.reward > MAX_MINING_REWARD {
            return Err(BlockchainError::Config(format!(
                "Mining reward {} is above the maximum of {MAX_MINING_REWARD}",
                self.reward
            )));
        }
        if self.mining_interval.is_zero() {
            return Err(BlockchainError::Config(
                "Mining interval must be greater than zero".to_string(),
            ));
        }
        if self.host.trim().is_empty() || self.host.contains(char::is_whitespace) {
            return Err(BlockchainError::Config(format!(
                "Invalid node host: {:?}",
                self.host
            )));
        }
        Ok(())
    }

    pub fn get_node_id(&self) -> &str {
        self.node_id.as_str()
    }

    pub fn set_node_id(&mut self, node_id: String) {
        self.node_id = node_id;
    }

    pub fn get_host(&self) -> &str {
        self.host.as_str()
    }

    pub fn set_host(&mut self, host: String) {
        self.host = host;
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn get_node_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn get_join_address(&self) -> Option<&str> {
        self.join_address.as_deref()
    }

    pub fn set_join_address(&mut self, addr: String) {
        self.join_address = Some(addr);
    }

    pub fn get_mining_addr(&self) -> Option<&str> {
        self.mining_address.as_deref()
    }

    pub fn set_mining_addr(&mut self, addr: String) {
        self.mining_address = Some(addr);
    }

    pub fn is_miner(&self) -> bool {
        self.mining_address.is_some()
    }

    pub fn get_mining_interval(&self) -> Duration {
        self.mining_interval
    }

    pub fn set_mining_interval(&mut self, interval: Duration) {
        self.mining_interval = interval;
    }

    pub fn get_difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: usize) {
        self.difficulty = difficulty;
    }

    pub fn get_reward(&self) -> u64 {
        self.reward
    }

    pub fn set_reward(&mut self, reward: u64) {
        self.reward = reward;
    }

    pub fn is_console(&self) -> bool {
        self.console
    }

    pub fn set_console(&mut self, console: bool) {
        self.console = console;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }
}

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "jackie-chain")]
pub struct Opt {
    #[arg(short, long, global = true, help = "Log at debug level and print raw frames")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(name = "startnode", about = "Start a blockchain node")]
    StartNode {
        #[arg(long, help = "Port to listen on for peers and HTTP [env: NODE_PORT]")]
        port: Option<u16>,
        #[arg(long, help = "Host advertised to peers [env: NODE_HOST]")]
        host: Option<String>,
        #[arg(long, help = "host:port of a node to join [env: JOIN_ADDRESS]")]
        join: Option<String>,
        #[arg(long, help = "Enable mining and send rewards to ADDRESS [env: MINING_ADDRESS]")]
        miner: Option<String>,
        #[arg(long, help = "Seconds between mining attempts [env: MINING_INTERVAL_SECS]")]
        interval: Option<u64>,
        #[arg(long, help = "Leading zero hex digits required [env: MINING_DIFFICULTY]")]
        difficulty: Option<usize>,
        #[arg(long, help = "Coinbase reward per block [env: MINING_REWARD]")]
        reward: Option<u64>,
        #[arg(long, help = "Broadcast each stdin line to the neighbors")]
        console: bool,
    },
}

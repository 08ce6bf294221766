// This is the entry point for the node binary
use clap::Parser;
use jackie_chain::{new_wallet, validate_address, Command, Config, Opt, Server};
use log::{error, info, LevelFilter};
use std::process;
use std::time::Duration;

fn main() {
    let opt = Opt::parse();

    // Info is enough to follow the gossip; --verbose adds raw frames and mining chatter
    let level = if opt.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder().filter_level(level).init();

    if let Err(e) = run_command(opt.command, opt.verbose) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createwallet => {
            let (address, private_seed) = new_wallet()?;
            println!("Your new address: {address}");
            println!("Your private seed: {private_seed}");
        }
        Command::StartNode {
            port,
            host,
            join,
            miner,
            interval,
            difficulty,
            reward,
            console,
        } => {
            // Environment first, flags win
            let mut config = Config::from_env()?;
            if let Some(port) = port {
                config.set_port(port);
            }
            if let Some(host) = host {
                config.set_host(host);
            }
            if let Some(join) = join {
                config.set_join_address(join);
            }
            if let Some(addr) = miner {
                config.set_mining_addr(addr);
            }
            if let Some(secs) = interval {
                config.set_mining_interval(Duration::from_secs(secs));
            }
            if let Some(difficulty) = difficulty {
                config.set_difficulty(difficulty);
            }
            if let Some(reward) = reward {
                config.set_reward(reward);
            }
            config.set_console(console);
            config.set_verbose(verbose);

            if let Some(addr) = config.get_mining_addr() {
                if !validate_address(addr) {
                    return Err(format!("Invalid miner address: {addr}").into());
                }
                info!("Mining is on. Address to receive rewards: {addr}");
            }

            let server = Server::bind(config)?;
            server.run().map_err(|e| format!("Server error: {e}"))?
        }
    }
    Ok(())
}

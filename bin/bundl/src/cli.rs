use std::path::PathBuf;

use bundl_deploy::{CONFIG_FILENAME, tasks::DEFAULT_MINING_INTERVAL_MS};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// The network used when none is given.
const DEFAULT_NETWORK: &str = "hardhat";

#[derive(Parser)]
#[command(name = "bundl")]
#[command(
    author,
    version,
    about = "Deploy contract graphs and run post-deployment tasks"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "BUNDL_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The network to act on: a built-in network (hardhat, localhost,
    /// arbitrumSepolia, baseSepolia, opSepolia) or one declared in the
    /// project file.
    #[arg(short, long, global = true, env = "BUNDL_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Path to the project file.
    ///
    /// Built-in defaults apply when the file does not exist.
    #[arg(short, long, global = true, alias = "conf", env = "BUNDL_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy every unit of the network that is not deployed yet.
    Deploy {
        /// Redeploy all units, even those recorded in the lock file.
        #[arg(long, env = "BUNDL_FORCE", default_value_t = false)]
        force: bool,
    },

    /// Print the deployment order without contacting the chain.
    Plan,

    /// Show the lock file entries of the network.
    Lock,

    /// Print the effective configuration as TOML.
    Config {
        /// Also write it to the project file.
        #[arg(long)]
        write: bool,
    },

    /// Register the deployed Balancer with the deployed Registry.
    Register,

    /// Mint mock tokens to the faucet.
    Mint,

    /// Enable interval mining on a development node.
    Mine {
        /// Block interval in milliseconds.
        #[arg(long, default_value_t = DEFAULT_MINING_INTERVAL_MS)]
        interval: u64,
    },
}

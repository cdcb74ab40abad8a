use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracekit_deploy::Network;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "tracekit")]
#[command(
    author,
    version,
    about = "Deploy the product traceability contracts to Starknet"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "TRACEKIT_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a configuration file, or a directory containing `Tracekit.toml`.
    #[arg(short, long, global = true, env = "TRACEKIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub deploy: DeployArgs,
}

#[derive(Subcommand)]
pub enum Command {
    /// Declare and deploy every contract of the plan, then update the manifest (default).
    Deploy(DeployArgs),

    /// Write the effective configuration to a TOML file.
    Init {
        /// Where to write the configuration.
        #[arg(short, long, default_value = "Tracekit.toml")]
        output: PathBuf,

        /// Network to resolve the configuration for.
        #[arg(short, long)]
        network: Option<Network>,
    },
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct DeployArgs {
    /// The network to deploy to (devnet, sepolia, mainnet).
    #[arg(short, long)]
    pub network: Option<Network>,

    /// Ignore the manifest and deploy every contract afresh.
    #[arg(long)]
    pub reset: bool,

    /// Path of the deployment manifest.
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Keep a timestamped copy of the previous manifest.
    #[arg(long)]
    pub archive: bool,
}

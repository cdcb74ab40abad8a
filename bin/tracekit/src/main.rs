//! tracekit deploys the product traceability contracts to a Starknet network.

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, DeployArgs};
use tracekit_deploy::{
    ArtifactSet, DeployConfig, DeploymentManifest, DeploymentPlan, Orchestrator, RunContext,
    RunReport, StarknetClient,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "tracekit failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Init { output, network }) => {
            let config = DeployConfig::load(cli.config.as_deref(), network)?;
            config.save_to_file(&output)
        }
        Some(Command::Deploy(args)) => deploy(cli.config, args).await,
        None => deploy(cli.config, cli.deploy).await,
    }
}

async fn deploy(config_path: Option<std::path::PathBuf>, args: DeployArgs) -> Result<()> {
    let mut config = DeployConfig::load(config_path.as_deref(), args.network)?;
    config.reset |= args.reset;
    config.archive_previous |= args.archive;
    if let Some(manifest) = args.manifest {
        config.manifest_path = manifest;
    }

    tracing::info!(
        network = %config.network,
        rpc_url = %config.rpc_url(),
        manifest = %config.manifest_path.display(),
        reset = config.reset,
        "Deploying traceability contracts"
    );

    let plan = DeploymentPlan::traceability(config.reward_token);
    let artifacts = ArtifactSet::load(&config.artifacts_dir, &config.package, plan.classes())
        .context("Failed to load compiled contracts, run `scarb build` first")?;
    let manifest = DeploymentManifest::load(&config.manifest_path)?;

    let chain_id = config.network.chain_id();
    let client = StarknetClient::new(
        config.rpc_url(),
        chain_id,
        config.credentials(),
        config.probe_timeout(),
    )?;

    let ctx = RunContext::new(client, config.network, artifacts, manifest)
        .with_reset(config.reset)
        .with_salt(config.salt)
        .with_tx_wait((&config).into());

    let report = Orchestrator::new(ctx, plan, config.rpc_url(), chain_id, &config.manifest_path)
        .with_probe_timeout(config.probe_timeout())
        .with_max_calls_per_tx(config.max_calls_per_tx)
        .with_archive_previous(config.archive_previous)
        .run()
        .await?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Contract", "Address", "Class hash", "Status"]);
    for contract in &report.deployed {
        table.add_row(vec![
            contract.contract_name.clone(),
            format!("{:#066x}", contract.address),
            format!("{:#066x}", contract.class_hash),
            if contract.already_deployed {
                "reused".to_string()
            } else {
                "deployed".to_string()
            },
        ]);
    }

    println!("{table}");
    tracing::info!(
        network = %report.network,
        deployed = report.newly_deployed().count(),
        transactions = report.transaction_count(),
        manifest = %report.manifest_path.display(),
        "✓ Deployment complete!"
    );
}

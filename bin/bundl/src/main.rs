//! bundl deploys contract graphs to EVM chains and runs post-deployment tasks.

mod cli;

use anyhow::{Context, Result};
use bundl_deploy::{
    ArtifactStore, DeploymentPlan, DeploymentReport, EtherscanVerifier, Executor, NetworkProfile,
    ProjectConfig, RpcChain, UnitStatus, load_dotenv, stale_entries, tasks,
};
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env first so its variables reach the CLI env fallbacks.
    let dotenv = load_dotenv();

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %format!("{err:#}"), "Ignoring .env"),
    }

    let config = ProjectConfig::load(&cli.config)?;
    let network = cli.network.as_str();

    match cli.command {
        Command::Deploy { force } => deploy(&config, network, force).await,
        Command::Plan => plan(&config, network),
        Command::Lock => show_lock(&config, network),
        Command::Config { write } => {
            print!("{}", config.to_toml()?);
            if write {
                config.save_to_file(&cli.config)?;
            }
            Ok(())
        }
        Command::Register => {
            let profile = config.network(network)?;
            let receipt =
                tasks::register(&connect(profile)?, &profile.lock_store(), network).await?;
            tracing::info!(tx_hash = %receipt.tx_hash, "Register complete");
            Ok(())
        }
        Command::Mint => {
            let profile = config.network(network)?;
            let receipt = tasks::mint(&connect(profile)?, &profile.lock_store(), network).await?;
            tracing::info!(
                faucet = %receipt.faucet,
                exposure_tx = %receipt.exposure.tx_hash,
                hedge_tx = %receipt.hedge.tx_hash,
                "Mint complete"
            );
            Ok(())
        }
        Command::Mine { interval } => {
            let profile = config.network(network)?;
            tasks::mine(&connect(profile)?, interval).await?;
            Ok(())
        }
    }
}

fn connect(profile: &NetworkProfile) -> Result<RpcChain> {
    let url = profile.resolve_rpc_url()?;
    let (poll_interval, timeout) = profile.confirmation();
    tracing::debug!(%url, ?timeout, "Connecting");
    Ok(RpcChain::new(url, profile.signer()?)?.with_confirmation(poll_interval, timeout))
}

/// The explorer verifier of `profile`, if verification is enabled and
/// possible.
fn verifier(config: &ProjectConfig, profile: &NetworkProfile) -> Result<Option<EtherscanVerifier>> {
    if !profile.verify {
        return Ok(None);
    }

    let Some(explorer) = &profile.explorer else {
        tracing::warn!("Verification enabled but no explorer configured, skipping");
        return Ok(None);
    };
    let Some(api_key) = explorer.api_key() else {
        tracing::warn!(
            api_key_env = %explorer.api_key_env,
            "Verification enabled but no explorer API key set, skipping"
        );
        return Ok(None);
    };

    let (interval, max_polls) = profile.verify_polling();
    let verifier = EtherscanVerifier::new(explorer.api_url()?, api_key, &config.build_info)?
        .with_polling(interval, max_polls);
    Ok(Some(verifier))
}

async fn deploy(config: &ProjectConfig, network: &str, force: bool) -> Result<()> {
    let profile = config.network(network)?;
    let plan = DeploymentPlan::build(config.units_for(network)?)?;

    let chain = connect(profile)?;
    let lock = profile.lock_store();
    let artifacts = ArtifactStore::new(&config.artifacts);

    let report = Executor::new(network, &chain, &lock, &artifacts)
        .with_verifier(verifier(config, profile)?)
        .force(force)
        .expect_chain_id(profile.chain_id)
        .run(&plan)
        .await?;

    print_report(&report, profile);

    match lock.path() {
        Some(path) => tracing::info!(path = %path.display(), "Lock file updated"),
        None => tracing::info!("Deployments of this network are kept in memory only"),
    }
    Ok(())
}

fn print_report(report: &DeploymentReport, profile: &NetworkProfile) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Unit", "Address", "Status"]);

    for unit in &report.units {
        let status = match unit.status {
            UnitStatus::Deployed { tx_hash } => format!("deployed ({tx_hash})"),
            UnitStatus::Skipped => "unchanged".to_string(),
        };
        let address = match &profile.explorer {
            Some(explorer) => explorer.address_url(unit.address),
            None => unit.address.to_string(),
        };
        table.add_row(vec![unit.name.clone(), address, status]);
    }
    println!("{table}");

    for failure in &report.verification_failures {
        tracing::warn!(unit = %failure.unit, "Not verified: {failure}");
    }
    tracing::info!(
        network = %report.network,
        chain_id = report.chain_id,
        deployed = report.deployed_count(),
        skipped = report.skipped_count(),
        unverified = report.verification_failures.len(),
        "Done"
    );
}

fn plan(config: &ProjectConfig, network: &str) -> Result<()> {
    let plan = DeploymentPlan::build(config.units_for(network)?)?;

    for (position, name) in plan.names().iter().enumerate() {
        let unit = plan
            .registry()
            .id(name)
            .map(|id| plan.registry().unit(id))
            .context("planned unit missing from registry")?;
        let depends_on: Vec<_> = unit.references().collect();
        if depends_on.is_empty() {
            println!("{}. {name}", position + 1);
        } else {
            println!("{}. {name} (after {})", position + 1, depends_on.join(", "));
        }
    }
    Ok(())
}

fn show_lock(config: &ProjectConfig, network: &str) -> Result<()> {
    let profile = config.network(network)?;
    let lock = profile.lock_store();
    let entries = lock.read(network)?;

    if entries.is_empty() {
        tracing::info!(network, "No deployments recorded");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Unit", "Contract", "Address", "Deployed at", "Bytecode hash"]);

    for (name, entry) in &entries {
        table.add_row(vec![
            name.clone(),
            entry.contract_name.clone().unwrap_or_else(|| name.clone()),
            entry.address.to_string(),
            entry.deployed_at.clone().unwrap_or_default(),
            entry.bytecode_hash.chars().take(12).collect(),
        ]);
    }
    println!("{table}");

    // Entries of units no longer declared stay in the file untouched.
    if let Ok(units) = config.units_for(network)
        && let Ok(plan) = DeploymentPlan::build(units)
    {
        let stale = stale_entries(&plan, &entries);
        if !stale.is_empty() {
            tracing::warn!(units = %stale.join(", "), "Lock entries without a declared unit");
        }
    }
    Ok(())
}

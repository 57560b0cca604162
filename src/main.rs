use clap::Parser;
use coinledger::adapters::{CoinGeckoClient, PostgresStore};
use coinledger::cli::{render_positions, Cli, Commands};
use coinledger::config::AppConfig;
use anyhow::Context;
use coinledger::error::Result;
use coinledger::persistence::{LedgerStore, MemoryStore};
use coinledger::{CycleOrchestrator, GracefulShutdown};
use std::sync::Arc;
use tracing::{error, info, warn};

mod main_runtime;

use main_runtime::{create_order_gateway, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, load_error) = match AppConfig::load_from(&cli.config) {
        Ok(c) => (c, None),
        Err(e) => (AppConfig::default_config(true), Some(e)),
    };
    if cli.dry_run {
        config.dry_run.enabled = true;
    }

    init_logging(&config.logging);
    if let Some(e) = load_error {
        warn!("Failed to load configuration from {}: {} - using defaults", cli.config, e);
    }

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }

    let command = cli.command.clone().unwrap_or(Commands::Run);
    info!(
        command = ?command,
        dry_run = config.dry_run.enabled,
        ephemeral = cli.ephemeral,
        top_n = config.market.top_n,
        "Starting coinledger"
    );

    if command == Commands::Migrate {
        if cli.ephemeral {
            info!("Ephemeral store has no schema to migrate");
            return Ok(());
        }
        connect_postgres(&config)
            .await
            .context("applying database migrations")?;
        return Ok(());
    }

    let store = open_store(&config, cli.ephemeral)
        .await
        .context("opening ledger store")?;

    match command {
        Commands::Portfolio { limit } => {
            let positions = store
                .held_positions(limit, 0)
                .await
                .context("reading held positions")?;
            println!("{}", render_positions(&positions));
        }
        Commands::Once => {
            let orchestrator = build_orchestrator(&config, store)?;
            let report = orchestrator.run_cycle().await.context("running cycle")?;
            orchestrator.metrics().record_cycle(&report);
            orchestrator.metrics().log_status();
        }
        Commands::Run => {
            let orchestrator = build_orchestrator(&config, store)?;
            let shutdown = GracefulShutdown::new();
            shutdown.listen_for_ctrl_c();
            orchestrator.run(&shutdown).await;
        }
        Commands::Migrate => {}
    }

    Ok(())
}

/// Connect and apply the schema once, before any cycle runs
async fn connect_postgres(config: &AppConfig) -> Result<PostgresStore> {
    let store = PostgresStore::new(
        &config.database.url,
        config.database.max_connections,
        config.database.acquire_timeout_secs,
    )
    .await
    .map_err(|e| {
        error!("Database connection failed: {}", e);
        e
    })?;
    store.migrate().await?;
    Ok(store)
}

async fn open_store(config: &AppConfig, ephemeral: bool) -> Result<Arc<dyn LedgerStore>> {
    if ephemeral {
        warn!("Using in-process store - ledger is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(connect_postgres(config).await?))
}

fn build_orchestrator(config: &AppConfig, store: Arc<dyn LedgerStore>) -> Result<CycleOrchestrator> {
    let market = Arc::new(CoinGeckoClient::new(&config.market)?);
    let gateway = create_order_gateway(config)?;
    Ok(CycleOrchestrator::new(config, market, gateway, store))
}

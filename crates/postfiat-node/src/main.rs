//! The Post Fiat node: wires credentials, cache, ledger access, the LLM
//! gateway and the queue orchestrator into one process.

mod services;
mod workers;

use anyhow::{Context, Result};
use postfiat_cache::TxCache;
use postfiat_config::{
    config_dir, NodeConfig, RuntimeConfig, DELTA_POLL_INTERVAL_SECS, FULL_BACKFILL_INTERVAL_SECS,
};
use postfiat_credentials::{CredentialStore, SecretKind};
use postfiat_config::TransactionRequirements;
use postfiat_engine::{EngineConfig, QueueOrchestrator};
use postfiat_ledger::{LedgerClient, LedgerMonitor, TxSubmitter, Wallet};
use postfiat_llm::OpenRouterGateway;
use services::{CacheHistorySource, ChannelSecrets, GoogleDocFetcher, NodeDispatch};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|raw| matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("PFT_PASSWORD") {
        return Ok(password);
    }
    print!("Encryption password: ");
    std::io::stdout().flush()?;
    let mut password = String::new();
    std::io::stdin().lock().read_line(&mut password)?;
    Ok(password.trim_end().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let runtime = RuntimeConfig {
        use_testnet: env_flag("USE_TESTNET"),
        has_local_node: env_flag("HAS_LOCAL_NODE"),
        enable_reinitiations: env_flag("ENABLE_REINITIATIONS"),
        use_openrouter_autorouter: env_flag("USE_OPENROUTER_AUTOROUTER"),
        disable_pft_requirements: env_flag("DISABLE_PFT_REQUIREMENTS"),
    };
    let network = runtime.network();
    info!(network = %network.name, "starting Post Fiat node");

    let node_config = NodeConfig::load(&NodeConfig::default_path(&network.name))
        .with_context(|| format!("loading node config from {}", config_dir().display()))?;

    let credentials = Arc::new(CredentialStore::open(&read_password()?)?);
    let database_url = credentials.get(&node_config.postgres_key())?;
    let openrouter_key = credentials.get("openrouter")?;

    let cache = TxCache::connect(&database_url).await?;
    if !node_config.schema_extensions.is_empty() {
        warn!(
            extensions = ?node_config.schema_extensions,
            "schema extensions listed but no extension registry is linked; core schema only"
        );
    }
    cache.init_schema(&[]).await?;

    let node_wallet = Wallet::from_seed(&credentials.wallet_seed(&node_config, SecretKind::Node)?)?;
    if node_wallet.address != node_config.node_address {
        anyhow::bail!(
            "node seed derives {} but config names {}",
            node_wallet.address,
            node_config.node_address
        );
    }
    let remembrancer_wallet = match node_config.remembrancer_seed_key() {
        Some(_) => Some(Wallet::from_seed(
            &credentials.wallet_seed(&node_config, SecretKind::Remembrancer)?,
        )?),
        None => None,
    };

    let rpc_client = LedgerClient::new(network.rpc_url(runtime.has_local_node));
    let public_client = LedgerClient::new(&network.public_rpc_url);
    let submitter = TxSubmitter::new(rpc_client.clone(), network.clone());

    let mut tracked = BTreeSet::from([node_config.node_address.clone()]);
    if let Some(address) = &node_config.remembrancer_address {
        tracked.insert(address.clone());
    }
    let monitor = Arc::new(LedgerMonitor::new(
        network.clone(),
        public_client.clone(),
        tracked,
    ));
    let tracked_accounts = monitor.tracked_accounts();

    let mut engine_config = EngineConfig::new(&node_config.node_name, &node_config.node_address);
    engine_config.remembrancer_address = node_config.remembrancer_address.clone();
    engine_config.auto_handshake_addresses = node_config.auto_handshake_addresses.clone();
    engine_config.reinitiations_enabled = runtime.reinitiations_enabled();
    engine_config.requirements =
        TransactionRequirements::from_configs(&network, &node_config, &runtime);
    if runtime.use_testnet && runtime.use_openrouter_autorouter {
        engine_config.model = "openrouter/auto".to_string();
    }

    let orchestrator = Arc::new(QueueOrchestrator::new(
        engine_config,
        Arc::new(CacheHistorySource::new(cache.clone())),
        Arc::new(OpenRouterGateway::new(openrouter_key)),
        Arc::new(NodeDispatch::new(
            submitter,
            node_wallet,
            remembrancer_wallet,
            node_config.clone(),
            Arc::clone(&credentials),
        )),
        Arc::new(GoogleDocFetcher::new()),
        Arc::new(ChannelSecrets::new(
            cache.clone(),
            node_config.clone(),
            Arc::clone(&credentials),
        )),
    ));

    let (stop_tx, stop_rx) = watch::channel(false);

    let mut handles = Vec::new();
    {
        // Hourly full backfill against the public endpoint.
        let client = public_client.clone();
        let cache = cache.clone();
        let issuer = network.issuer_address.clone();
        let tracked = Arc::clone(&tracked_accounts);
        let stop = stop_rx.clone();
        handles.push(tokio::spawn(workers::run_backfill(
            client,
            cache,
            issuer,
            tracked,
            Duration::from_secs(FULL_BACKFILL_INTERVAL_SECS),
            true,
            stop,
        )));
    }
    if runtime.has_local_node {
        // Faster delta poll against the local node.
        let client = rpc_client.clone();
        let cache = cache.clone();
        let issuer = network.issuer_address.clone();
        let tracked = Arc::clone(&tracked_accounts);
        let stop = stop_rx.clone();
        handles.push(tokio::spawn(workers::run_backfill(
            client,
            cache,
            issuer,
            tracked,
            Duration::from_secs(DELTA_POLL_INTERVAL_SECS),
            false,
            stop,
        )));
    }
    {
        let monitor = Arc::clone(&monitor);
        let sink: Arc<dyn postfiat_ledger::TxSink> = Arc::new(cache.clone());
        let stop = stop_rx.clone();
        handles.push(tokio::spawn(async move {
            monitor.run(sink, stop).await;
        }));
    }
    {
        let orchestrator = Arc::clone(&orchestrator);
        let stop = stop_rx.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.run(stop).await;
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = stop_tx.send(true);

    for handle in handles {
        if tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .is_err()
        {
            warn!("worker did not stop within 60s, abandoning");
        }
    }
    info!("node stopped");
    Ok(())
}

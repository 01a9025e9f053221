//! The queue worker: one dedicated loop running the five queues
//! sequentially, so each queue observes the previous queue's effects
//! through the cache.

use crate::context::ContextLimits;
use crate::policy::RewardPolicy;
use crate::queues;
use crate::traits::{DocFetcher, HistorySource, MemoDispatch, SecretResolver};
use crate::Result;
use postfiat_config::{
    TransactionRequirements, DEFAULT_OPENROUTER_MODEL, DEFAULT_TASK_CANDIDATES,
    QUEUE_CYCLE_SLEEP_SECS, VERIFY_SEND_ATTEMPTS, VERIFY_SEND_INTERVAL_SECS,
};
use postfiat_llm::LlmGateway;
use postfiat_state::{HandshakeRegistry, MemoHistory};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Static knobs for the orchestrator and its queues.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub node_name: String,
    pub node_address: String,
    pub remembrancer_address: Option<String>,
    pub auto_handshake_addresses: BTreeSet<String>,
    pub model: String,
    /// Candidate tasks generated per proposal request.
    pub task_candidates: usize,
    pub reward_policy: RewardPolicy,
    /// Minimum-PFT gate applied to incoming work items.
    pub requirements: TransactionRequirements,
    pub reinitiations_enabled: bool,
    pub cycle_sleep: Duration,
    pub verify_attempts: usize,
    pub verify_interval: Duration,
    pub context_limits: ContextLimits,
}

impl EngineConfig {
    pub fn new(node_name: impl Into<String>, node_address: impl Into<String>) -> Self {
        let node_address = node_address.into();
        Self {
            node_name: node_name.into(),
            auto_handshake_addresses: BTreeSet::from([node_address.clone()]),
            requirements: TransactionRequirements::new(
                node_address.clone(),
                None,
                String::new(),
                false,
            ),
            node_address,
            remembrancer_address: None,
            model: DEFAULT_OPENROUTER_MODEL.to_string(),
            task_candidates: DEFAULT_TASK_CANDIDATES,
            reward_policy: RewardPolicy::default(),
            reinitiations_enabled: false,
            cycle_sleep: Duration::from_secs(QUEUE_CYCLE_SLEEP_SECS),
            verify_attempts: VERIFY_SEND_ATTEMPTS,
            verify_interval: Duration::from_secs(VERIFY_SEND_INTERVAL_SECS),
            context_limits: ContextLimits::default(),
        }
    }
}

/// Owns the five processing loops.
pub struct QueueOrchestrator {
    pub(crate) config: EngineConfig,
    pub(crate) source: Arc<dyn HistorySource>,
    pub(crate) llm: Arc<dyn LlmGateway>,
    pub(crate) dispatch: Arc<dyn MemoDispatch>,
    pub(crate) docs: Arc<dyn DocFetcher>,
    pub(crate) secrets: Arc<dyn SecretResolver>,
    pub(crate) handshakes: HandshakeRegistry,
}

impl QueueOrchestrator {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn HistorySource>,
        llm: Arc<dyn LlmGateway>,
        dispatch: Arc<dyn MemoDispatch>,
        docs: Arc<dyn DocFetcher>,
        secrets: Arc<dyn SecretResolver>,
    ) -> Self {
        Self {
            config,
            source,
            llm,
            dispatch,
            docs,
            secrets,
            handshakes: HandshakeRegistry::new(),
        }
    }

    /// Cycle until `stop` flips; the current queue always finishes first.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(node = %self.config.node_address, "queue orchestrator started");
        while !*stop.borrow() {
            if let Err(err) = self.run_cycle().await {
                error!(%err, "queue cycle failed to start");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.cycle_sleep) => {}
                _ = stop.changed() => break,
            }
        }
        info!("queue orchestrator stopped");
    }

    /// One full pass over the five queues. The working history is refreshed
    /// once up front (the monitor has been streaming into the cache since
    /// the last cycle); per-queue failures are logged and skipped so one
    /// bad item never stalls the rest.
    pub async fn run_cycle(&self) -> Result<()> {
        let history = self.refresh_node_history().await?;

        if let Err(err) = queues::proposal::process(self, &history).await {
            error!(%err, "proposal queue failed");
        }
        if let Err(err) = queues::initiation::process(self, &history).await {
            error!(%err, "initiation queue failed");
        }
        if let Err(err) = queues::reward::process(self, &history).await {
            error!(%err, "reward queue failed");
        }
        if let Err(err) = queues::verification::process(self, &history).await {
            error!(%err, "verification queue failed");
        }
        if let Err(err) = queues::handshake::process(self).await {
            error!(%err, "handshake queue failed");
        }
        Ok(())
    }

    pub(crate) async fn refresh_node_history(&self) -> Result<MemoHistory> {
        self.source
            .history_for(&self.config.node_address, self.secrets.as_ref())
            .await
    }
}

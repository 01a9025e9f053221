//! End-to-end queue scenarios over stubbed collaborators: an in-memory
//! ledger/cache, a scripted LLM, and a dispatcher that lands each sent memo
//! straight back into the "cache" the way the monitor would.

use chrono::{DateTime, TimeZone, Utc};
use postfiat_cache::{MemoRow, ProcessingResult};
use postfiat_engine::{
    DocFetcher, EngineConfig, HistorySource, MemoDispatch, QueueOrchestrator, SecretResolver,
    WalletKind,
};
use postfiat_engine::traits::NoChannelSecrets;
use postfiat_llm::{ChatRequest, LlmGateway};
use postfiat_memo::Memo;
use postfiat_state::MemoHistory;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NODE: &str = "rNODE";
const USER: &str = "rUSER";
const TASK: &str = "2025-01-01_10:00__AA00";

#[derive(Debug, Clone)]
struct RawRow {
    hash: String,
    account: String,
    destination: String,
    memo_type: String,
    memo_format: String,
    memo_data: String,
    amount: f64,
    datetime: DateTime<Utc>,
    ledger_index: i64,
}

/// Shared fake of the ledger-backed cache.
struct World {
    rows: Mutex<Vec<RawRow>>,
    results: Mutex<Vec<ProcessingResult>>,
    clock: AtomicU32,
}

impl World {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
            clock: AtomicU32::new(0),
        })
    }

    fn tick(&self) -> (DateTime<Utc>, i64) {
        let minute = self.clock.fetch_add(1, Ordering::SeqCst);
        (
            Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap() + chrono::Duration::minutes(minute as i64),
            95_000_000 + minute as i64,
        )
    }

    fn seed(&self, account: &str, destination: &str, memo_type: &str, memo_data: &str) -> String {
        self.seed_with_amount(account, destination, memo_type, memo_data, 1.0)
    }

    fn seed_with_amount(
        &self,
        account: &str,
        destination: &str,
        memo_type: &str,
        memo_data: &str,
        amount: f64,
    ) -> String {
        let (datetime, ledger_index) = self.tick();
        let hash = format!("SEED{ledger_index}");
        self.rows.lock().unwrap().push(RawRow {
            hash: hash.clone(),
            account: account.to_string(),
            destination: destination.to_string(),
            memo_type: memo_type.to_string(),
            memo_format: "alice".to_string(),
            memo_data: memo_data.to_string(),
            amount,
            datetime,
            ledger_index,
        });
        hash
    }

    fn sent_by_node(&self) -> Vec<RawRow> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.account == NODE)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl HistorySource for World {
    async fn history_for(
        &self,
        account: &str,
        secrets: &dyn SecretResolver,
    ) -> postfiat_engine::Result<MemoHistory> {
        let rows: Vec<MemoRow> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.account == account || row.destination == account)
            .map(|row| MemoRow {
                hash: row.hash.clone(),
                account: row.account.clone(),
                destination: row.destination.clone(),
                ledger_index: row.ledger_index,
                datetime: row.datetime,
                memo_type: row.memo_type.clone(),
                memo_format: row.memo_format.clone(),
                memo_data: row.memo_data.clone(),
                pft_absolute_amount: row.amount,
                directional_pft: if row.destination == account {
                    row.amount
                } else {
                    -row.amount
                },
                transaction_result: "tesSUCCESS".to_string(),
            })
            .collect();
        // Same unseal pass the production cache-backed source performs.
        let mut history = MemoHistory::from_rows(account, rows);
        for counterparty in history.sealed_counterparties() {
            if let Some(secret) = secrets.channel_secret(account, &counterparty).await? {
                history.unseal_channel(&counterparty, &secret);
            }
        }
        Ok(history)
    }

    async fn record_result(&self, result: ProcessingResult) -> postfiat_engine::Result<()> {
        self.results.lock().unwrap().push(result);
        Ok(())
    }
}

/// Dispatcher that "validates" instantly: every send becomes a cached row.
struct InstantDispatch {
    world: Arc<World>,
}

#[async_trait::async_trait]
impl MemoDispatch for InstantDispatch {
    async fn send_memo(
        &self,
        from: WalletKind,
        destination: &str,
        memo: Memo,
        pft_amount: f64,
        encrypt: bool,
        _secrets: &dyn SecretResolver,
    ) -> postfiat_engine::Result<String> {
        assert_eq!(from, WalletKind::Node, "tests only wire the node wallet");
        assert!(!encrypt, "queue replies carry plaintext sentinels");
        let (datetime, ledger_index) = self.world.tick();
        let hash = format!("RESP{ledger_index}");
        self.world.rows.lock().unwrap().push(RawRow {
            hash: hash.clone(),
            account: NODE.to_string(),
            destination: destination.to_string(),
            memo_type: memo.memo_type,
            memo_format: memo.memo_format,
            memo_data: memo.memo_data,
            amount: pft_amount,
            datetime,
            ledger_index,
        });
        Ok(hash)
    }

    async fn ecdh_public_key(&self, _from: WalletKind) -> postfiat_engine::Result<String> {
        Ok(format!("ED{}", "AB".repeat(32)))
    }
}

/// LLM stub fed from scripted queues.
struct ScriptedLlm {
    batch: Mutex<VecDeque<String>>,
    single: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            batch: Mutex::new(VecDeque::new()),
            single: Mutex::new(VecDeque::new()),
        })
    }

    fn push_batch(&self, responses: &[&str]) {
        let mut queue = self.batch.lock().unwrap();
        for response in responses {
            queue.push_back(response.to_string());
        }
    }

    fn push_single(&self, response: &str) {
        self.single.lock().unwrap().push_back(response.to_string());
    }
}

#[async_trait::async_trait]
impl LlmGateway for ScriptedLlm {
    async fn complete(&self, _request: ChatRequest) -> postfiat_llm::Result<String> {
        self.single
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(postfiat_llm::LlmError::EmptyResponse)
    }

    async fn complete_batch(
        &self,
        requests: BTreeMap<String, ChatRequest>,
    ) -> BTreeMap<String, String> {
        let mut queue = self.batch.lock().unwrap();
        requests
            .into_keys()
            .filter_map(|key| queue.pop_front().map(|response| (key, response)))
            .collect()
    }
}

struct NoDocs;

#[async_trait::async_trait]
impl DocFetcher for NoDocs {
    async fn fetch_verification_text(&self, _link: &str) -> postfiat_engine::Result<String> {
        Ok(String::new())
    }
}

fn orchestrator(world: &Arc<World>, llm: &Arc<ScriptedLlm>) -> QueueOrchestrator {
    orchestrator_with_secrets(world, llm, Arc::new(NoChannelSecrets))
}

fn orchestrator_with_secrets(
    world: &Arc<World>,
    llm: &Arc<ScriptedLlm>,
    secrets: Arc<dyn SecretResolver>,
) -> QueueOrchestrator {
    let mut config = EngineConfig::new("postfiatfoundation", NODE);
    config.verify_attempts = 2;
    config.verify_interval = Duration::from_millis(1);
    QueueOrchestrator::new(
        config,
        Arc::clone(world) as Arc<dyn HistorySource>,
        Arc::clone(llm) as Arc<dyn LlmGateway>,
        Arc::new(InstantDispatch {
            world: Arc::clone(world),
        }),
        Arc::new(NoDocs),
        secrets,
    )
}

/// Resolver with one fixed established channel, for sealed-traffic tests.
struct FixedSecret {
    counterparty: String,
    secret: [u8; 32],
}

#[async_trait::async_trait]
impl SecretResolver for FixedSecret {
    async fn channel_secret(
        &self,
        _channel_address: &str,
        counterparty: &str,
    ) -> postfiat_engine::Result<Option<[u8; 32]>> {
        Ok((counterparty == self.counterparty).then_some(self.secret))
    }
}

/// S1: a task request is answered with the selector's pick, exactly once.
#[tokio::test]
async fn proposal_scenario() {
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator(&world, &llm);

    let request_hash = world.seed(USER, NODE, TASK, "REQUEST_POST_FIAT ___ build a report");
    llm.push_batch(&[
        "| Final Output | Design schema | Value of Task | 40 |",
        "| Final Output | Write report outline | Value of Task | 60 |",
        "| Final Output | Draft 1-pager | Value of Task | 50 |",
    ]);
    llm.push_single("| BEST OUTPUT | 2 |");

    orch.run_cycle().await.unwrap();

    let sent = world.sent_by_node();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, USER);
    assert_eq!(sent[0].memo_type, TASK);
    assert_eq!(sent[0].memo_data, "PROPOSED PF ___ Write report outline .. 60");
    assert_eq!(sent[0].amount, 1.0);

    let results = world.results.lock().unwrap().clone();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tx_hash, request_hash);
    assert_eq!(results[0].rule_name, "task_proposal");
    assert!(results[0].processed);

    // A second run must not double-send.
    orch.run_cycle().await.unwrap();
    assert_eq!(world.sent_by_node().len(), 1);
}

/// S2: an acceptance is acknowledged silently.
#[tokio::test]
async fn acceptance_is_silent() {
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator(&world, &llm);

    world.seed(NODE, USER, TASK, "PROPOSED PF ___ Write report outline .. 60");
    world.seed(USER, NODE, TASK, "ACCEPTANCE REASON ___ on it");

    orch.run_cycle().await.unwrap();

    // The proposal seed is the only node-sent row; nothing new went out.
    assert_eq!(world.sent_by_node().len(), 1);
    let history = world.history_for(NODE, &NoChannelSecrets).await.unwrap();
    let states = postfiat_state::tasks::task_states(&history);
    assert_eq!(states[TASK].state, postfiat_state::TaskType::Acceptance);
}

/// S3: completion draws a verification prompt; the verification response
/// draws the judged reward; further cycles are quiet.
#[tokio::test]
async fn completion_verification_reward_flow() {
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator(&world, &llm);

    world.seed(NODE, USER, TASK, "PROPOSED PF ___ Write report outline .. 60");
    world.seed(USER, NODE, TASK, "ACCEPTANCE REASON ___ on it");
    world.seed(USER, NODE, TASK, "COMPLETION JUSTIFICATION ___ did X");

    llm.push_batch(&["| Verifying Question | show me X |"]);
    orch.run_cycle().await.unwrap();

    let sent = world.sent_by_node();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].memo_data, "VERIFICATION PROMPT ___ show me X");
    assert_eq!(sent[1].amount, 1.0);

    world.seed(USER, NODE, TASK, "VERIFICATION RESPONSE ___ here is X");
    llm.push_batch(&["| Summary Judgment | good | Total PFT Rewarded | 45 |"]);
    orch.run_cycle().await.unwrap();

    let sent = world.sent_by_node();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[2].memo_data, "REWARD RESPONSE __ good");
    assert_eq!(sent[2].amount, 45.0);

    // Terminal: nothing further to do for this task.
    orch.run_cycle().await.unwrap();
    assert_eq!(world.sent_by_node().len(), 3);

    let results = world.results.lock().unwrap();
    let rules: Vec<&str> = results.iter().map(|r| r.rule_name.as_str()).collect();
    assert!(rules.contains(&"verification_prompt"));
    assert!(rules.contains(&"reward_response"));
}

/// S4: a valid initiation rite is rewarded once.
#[tokio::test]
async fn initiation_scenario() {
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator(&world, &llm);

    world.seed(USER, NODE, "INITIATION_RITE", "I will ship daily");
    llm.push_single("| Reward | 25 | Justification | concise, concrete |");

    orch.run_cycle().await.unwrap();

    let sent = world.sent_by_node();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].memo_type, "INITIATION_REWARD");
    assert_eq!(sent[0].memo_data, "concise, concrete");
    assert_eq!(sent[0].amount, 25.0);

    // Reinitiations are disabled: a rerun must not pay twice.
    orch.run_cycle().await.unwrap();
    assert_eq!(world.sent_by_node().len(), 1);
}

/// A too-short rite is ignored entirely.
#[tokio::test]
async fn invalid_rite_is_ignored() {
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator(&world, &llm);

    world.seed(USER, NODE, "INITIATION_RITE", "  hi  ");
    orch.run_cycle().await.unwrap();
    assert!(world.sent_by_node().is_empty());
}

/// S5: an incoming handshake to the node's address is auto-answered once.
#[tokio::test]
async fn handshake_scenario() {
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator(&world, &llm);

    world.seed(USER, NODE, "HANDSHAKE", &format!("ED{}", "01".repeat(32)));
    orch.run_cycle().await.unwrap();

    let sent = world.sent_by_node();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].memo_type, "HANDSHAKE");
    assert_eq!(sent[0].destination, USER);
    assert_eq!(sent[0].memo_data, format!("ED{}", "AB".repeat(32)));
    assert_eq!(sent[0].amount, 1.0);

    orch.run_cycle().await.unwrap();
    assert_eq!(world.sent_by_node().len(), 1);
}

/// An encrypted request decrypts through the channel secret and is
/// processed like plaintext; without the channel it stays sealed and inert.
#[tokio::test]
async fn sealed_request_needs_the_channel_secret() {
    let secret = [42u8; 32];
    let sealed =
        postfiat_memo::encrypt_memo("REQUEST_POST_FIAT ___ build a report", &secret).unwrap();

    // No established channel: the payload never classifies as a request.
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator(&world, &llm);
    world.seed(USER, NODE, TASK, &sealed);
    orch.run_cycle().await.unwrap();
    assert!(world.sent_by_node().is_empty());

    // With the channel resolved, the same cache rows yield a proposal.
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator_with_secrets(
        &world,
        &llm,
        Arc::new(FixedSecret {
            counterparty: USER.to_string(),
            secret,
        }),
    );
    world.seed(USER, NODE, TASK, &sealed);
    llm.push_batch(&[
        "| Final Output | Design schema | Value of Task | 40 |",
        "| Final Output | Write report outline | Value of Task | 60 |",
        "| Final Output | Draft 1-pager | Value of Task | 50 |",
    ]);
    llm.push_single("| BEST OUTPUT | 2 |");
    orch.run_cycle().await.unwrap();

    let sent = world.sent_by_node();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].memo_data, "PROPOSED PF ___ Write report outline .. 60");
}

/// A request that skips the 1 PFT signalling amount is ignored.
#[tokio::test]
async fn underfunded_request_is_ignored() {
    let world = World::new();
    let llm = ScriptedLlm::new();
    let orch = orchestrator(&world, &llm);

    world.seed_with_amount(USER, NODE, TASK, "REQUEST_POST_FIAT ___ build a report", 0.0);
    orch.run_cycle().await.unwrap();
    assert!(world.sent_by_node().is_empty());
}

//! Protocol constants shared across the engine.

/// Minimum XRP amount per transaction, in XRP.
pub const MIN_XRP_PER_TRANSACTION: f64 = 0.000001;

/// Minimum XRP balance for an account to operate.
pub const MIN_XRP_BALANCE: f64 = 12.0;

/// Maximum size of a single on-chain memo chunk, in bytes (approximate).
pub const MAX_MEMO_CHUNK_SIZE: usize = 900;

/// Payload budget before chunk labels are applied, in UTF-8 bytes.
pub const PRE_CHUNK_PAYLOAD_BUDGET: usize = 760;

/// Maximum length of a commitment sentence (initiation rite).
pub const MAX_COMMITMENT_SENTENCE_LENGTH: usize = 950;

/// Minimum trimmed length for an initiation rite to be considered valid.
pub const MIN_INITIATION_RITE_LENGTH: usize = 10;

/// Days of reward history fed to the reward arbiter.
pub const REWARD_PROCESSING_WINDOW_DAYS: i64 = 35;

/// Default reward clamp, PFT.
pub const MIN_REWARD_AMOUNT: u64 = 1;
pub const MAX_REWARD_AMOUNT: u64 = 1200;

/// Default per-user reward ceiling over a trailing 24 hours, PFT.
pub const DEFAULT_DAILY_REWARD_LIMIT: u64 = 4000;

/// Task value bounds for proposal generation.
pub const MIN_TASK_VALUE: u64 = 10;
pub const MAX_TASK_VALUE: u64 = 950;

/// Candidate tasks generated per proposal request.
pub const DEFAULT_TASK_CANDIDATES: usize = 3;

/// Sleep between queue processing cycles, seconds.
pub const QUEUE_CYCLE_SLEEP_SECS: u64 = 15;

/// Verification-of-send polling: attempts and interval.
pub const VERIFY_SEND_ATTEMPTS: usize = 6;
pub const VERIFY_SEND_INTERVAL_SECS: u64 = 10;

/// Full history backfill interval, seconds (60 minutes).
pub const FULL_BACKFILL_INTERVAL_SECS: u64 = 3600;

/// Delta poll interval against a local node, seconds.
pub const DELTA_POLL_INTERVAL_SECS: u64 = 30;

/// Websocket reconnect backoff bounds, seconds.
pub const WS_BACKOFF_INITIAL_SECS: u64 = 1;
pub const WS_BACKOFF_MAX_SECS: u64 = 60;

/// Minimum PFT balance for an account to be tracked by the monitor.
pub const PFT_HOLDER_TRACKING_THRESHOLD: f64 = 1.0;

/// Context assembly caps.
pub const MAX_PENDING_PROPOSALS_IN_CONTEXT: usize = 5;
pub const MAX_ACCEPTANCES_IN_CONTEXT: usize = 10;
pub const MAX_REFUSALS_IN_CONTEXT: usize = 6;
pub const MAX_REWARDS_IN_CONTEXT: usize = 10;
pub const MAX_CHUNK_MESSAGES_IN_CONTEXT: usize = 20;

/// LLM gateway defaults.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENROUTER_MODEL: &str = "anthropic/claude-3.5-sonnet:beta";
pub const LLM_MAX_CONCURRENT_REQUESTS: usize = 10;
pub const LLM_REQUESTS_PER_MINUTE: usize = 30;
pub const LLM_TRANSIENT_RETRY_SECS: u64 = 5;

/// System memo types: fixed `memo_type` strings that are not task-scoped.
pub mod system_memo_types {
    pub const INITIATION_REWARD: &str = "INITIATION_REWARD";
    pub const HANDSHAKE: &str = "HANDSHAKE";
    pub const INITIATION_RITE: &str = "INITIATION_RITE";
    pub const GOOGLE_DOC_CONTEXT_LINK: &str = "google_doc_context_link";
    pub const INITIATION_GRANT: &str = "discord_wallet_funding";
}

/// Every system memo type, for membership checks.
pub const SYSTEM_MEMO_TYPES: [&str; 5] = [
    system_memo_types::INITIATION_REWARD,
    system_memo_types::HANDSHAKE,
    system_memo_types::INITIATION_RITE,
    system_memo_types::GOOGLE_DOC_CONTEXT_LINK,
    system_memo_types::INITIATION_GRANT,
];

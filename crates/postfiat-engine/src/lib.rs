//! The queue orchestrator.
//!
//! Five queues run sequentially in one worker, each a pass of scan, LLM,
//! send, verify-on-ledger, record. Idempotency falls out of
//! the scans: a queue only selects work whose latest cached memo still
//! demands action, so once a reply lands in the cache the work item
//! disappears.

pub mod context;
pub mod orchestrator;
pub mod parsing;
pub mod policy;
pub mod prompts;
pub mod queues;
pub mod traits;

mod verify;

pub use orchestrator::{EngineConfig, QueueOrchestrator};
pub use policy::RewardPolicy;
pub use traits::{
    DocFetcher, HistorySource, MemoDispatch, NoChannelSecrets, SecretResolver, WalletKind,
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("send not confirmed on-ledger after {attempts} polls: {rule} / {memo_type}")]
    VerificationTimeout {
        rule: &'static str,
        memo_type: String,
        attempts: usize,
    },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("document fetch error: {0}")]
    Doc(String),

    #[error(transparent)]
    Llm(#[from] postfiat_llm::LlmError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

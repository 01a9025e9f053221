//! Ledger access for the Post Fiat node.
//!
//! Three layers share this crate:
//! - [`client`]: JSON-RPC queries and transaction submission
//! - [`submit`]: memo-bearing payment composition and send verification
//! - [`monitor`]: the long-lived websocket tail feeding the cache
//!
//! Plus the local machinery they need: wallet derivation, the Payment-subset
//! binary codec used for signing, and serde models of the wire JSON.

pub mod client;
pub mod codec;
pub mod monitor;
pub mod submit;
pub mod types;
pub mod wallet;

pub use client::LedgerClient;
pub use monitor::{LedgerMonitor, TxSink};
pub use submit::{SendOptions, TxReport, TxSubmitter};
pub use types::{Amount, Payment, TransactionRecord};
pub use wallet::Wallet;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("submission rejected ({engine_result}): {message}")]
    SubmissionRejected {
        engine_result: String,
        message: String,
    },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("insufficient XRP balance on {0}")]
    InsufficientXrpBalance(String),

    #[error("handshake not completed between {source_addr} and {counterparty}")]
    HandshakeRequired {
        source_addr: String,
        counterparty: String,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("memo send aborted after {sent} of {total} chunks: {cause}")]
    ChunkSendFailed {
        sent: usize,
        total: usize,
        cause: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error(transparent)]
    Memo(#[from] postfiat_memo::MemoError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

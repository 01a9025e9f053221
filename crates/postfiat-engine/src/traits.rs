//! Seams between the orchestrator and the outside world. Production wiring
//! lives in the node binary; tests drive the queues with stubs.

use crate::Result;
use postfiat_memo::Memo;
use postfiat_state::MemoHistory;

/// Which node-controlled wallet signs an outgoing memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletKind {
    Node,
    Remembrancer,
}

/// Resolves the symmetric secret of an encryption channel. Production
/// wiring derives it from handshake state in the cache and the stored
/// wallet seeds; a channel without both handshake halves resolves to
/// `None`.
#[async_trait::async_trait]
pub trait SecretResolver: Send + Sync {
    async fn channel_secret(
        &self,
        channel_address: &str,
        counterparty: &str,
    ) -> Result<Option<[u8; 32]>>;
}

/// Resolver for contexts with no usable channels.
pub struct NoChannelSecrets;

#[async_trait::async_trait]
impl SecretResolver for NoChannelSecrets {
    async fn channel_secret(
        &self,
        _channel_address: &str,
        _counterparty: &str,
    ) -> Result<Option<[u8; 32]>> {
        Ok(None)
    }
}

/// Read access to cached state plus outcome recording.
#[async_trait::async_trait]
pub trait HistorySource: Send + Sync {
    /// Fresh decoded memo history referenced on the given account. Sealed
    /// (`WHISPER__`) entries are opened with per-counterparty secrets from
    /// `secrets`; channels that cannot be resolved stay sealed.
    async fn history_for(
        &self,
        account: &str,
        secrets: &dyn SecretResolver,
    ) -> Result<MemoHistory>;

    /// Record a processing outcome after its send was confirmed on-ledger.
    async fn record_result(&self, result: postfiat_cache::ProcessingResult) -> Result<()>;
}

/// Outgoing memo traffic. Implementations sign with the named wallet,
/// submit, and wait for validation; the returned string is the response
/// transaction hash (of the last chunk for chunked sends).
#[async_trait::async_trait]
pub trait MemoDispatch: Send + Sync {
    /// Send a memo. With `encrypt`, the implementation resolves the
    /// sender-to-destination channel through `secrets` and seals the
    /// payload; an unestablished channel refuses the send rather than
    /// letting the payload on ledger in the clear.
    async fn send_memo(
        &self,
        from: WalletKind,
        destination: &str,
        memo: Memo,
        pft_amount: f64,
        encrypt: bool,
        secrets: &dyn SecretResolver,
    ) -> Result<String>;

    /// The ECDH public key of a node wallet, for handshake replies.
    async fn ecdh_public_key(&self, from: WalletKind) -> Result<String>;
}

/// External fetcher for a user's linked context document.
#[async_trait::async_trait]
pub trait DocFetcher: Send + Sync {
    async fn fetch_verification_text(&self, link: &str) -> Result<String>;
}

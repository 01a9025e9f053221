//! Production implementations of the engine's seams.

use postfiat_cache::{ProcessingResult, TxCache};
use postfiat_config::NodeConfig;
use postfiat_credentials::{CredentialStore, SecretKind};
use postfiat_engine::{
    DocFetcher, EngineError, HistorySource, MemoDispatch, SecretResolver, WalletKind,
};
use postfiat_ledger::{SendOptions, TxSubmitter, Wallet};
use postfiat_memo::Memo;
use postfiat_state::{HandshakeRegistry, MemoHistory};
use std::sync::Arc;
use tracing::debug;

/// Channel secrets derived from cached handshake state and the stored
/// wallet seeds. Only node-controlled channel addresses can resolve; a
/// channel without both handshake halves resolves to `None`.
pub struct ChannelSecrets {
    cache: TxCache,
    registry: HandshakeRegistry,
    node_config: NodeConfig,
    credentials: Arc<CredentialStore>,
}

impl ChannelSecrets {
    pub fn new(cache: TxCache, node_config: NodeConfig, credentials: Arc<CredentialStore>) -> Self {
        Self {
            cache,
            registry: HandshakeRegistry::new(),
            node_config,
            credentials,
        }
    }

    fn secret_kind(&self, channel_address: &str) -> Option<SecretKind> {
        if channel_address == self.node_config.node_address {
            Some(SecretKind::Node)
        } else if self.node_config.remembrancer_address.as_deref() == Some(channel_address) {
            Some(SecretKind::Remembrancer)
        } else {
            None
        }
    }
}

#[async_trait::async_trait]
impl SecretResolver for ChannelSecrets {
    async fn channel_secret(
        &self,
        channel_address: &str,
        counterparty: &str,
    ) -> postfiat_engine::Result<Option<[u8; 32]>> {
        let Some(kind) = self.secret_kind(channel_address) else {
            return Ok(None);
        };
        // Handshake memos are plaintext, so the raw cached history is
        // enough to read channel state.
        let rows = self
            .cache
            .history(channel_address, false)
            .await
            .map_err(|err| EngineError::Cache(err.to_string()))?;
        let history = MemoHistory::from_rows(channel_address, rows);
        let seed = self
            .credentials
            .wallet_seed(&self.node_config, kind)
            .map_err(|err| EngineError::Dispatch(err.to_string()))?;
        self.registry
            .channel_secret(&history, channel_address, counterparty, &seed)
            .map_err(|err| EngineError::Dispatch(err.to_string()))
    }
}

/// History reads and result writes backed by the Postgres cache. Sealed
/// entries are opened per counterparty before the queues see them.
pub struct CacheHistorySource {
    cache: TxCache,
}

impl CacheHistorySource {
    pub fn new(cache: TxCache) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl HistorySource for CacheHistorySource {
    async fn history_for(
        &self,
        account: &str,
        secrets: &dyn SecretResolver,
    ) -> postfiat_engine::Result<MemoHistory> {
        let rows = self
            .cache
            .history(account, false)
            .await
            .map_err(|err| EngineError::Cache(err.to_string()))?;
        let mut history = MemoHistory::from_rows(account, rows);
        for counterparty in history.sealed_counterparties() {
            if let Some(secret) = secrets.channel_secret(account, &counterparty).await? {
                debug!(account, %counterparty, "unsealing channel entries");
                history.unseal_channel(&counterparty, &secret);
            }
        }
        Ok(history)
    }

    async fn record_result(&self, result: ProcessingResult) -> postfiat_engine::Result<()> {
        self.cache
            .record_result(&result)
            .await
            .map_err(|err| EngineError::Cache(err.to_string()))
    }
}

/// Outgoing memos signed with the node's wallets and confirmed on-ledger by
/// the submitter.
pub struct NodeDispatch {
    submitter: TxSubmitter,
    node_wallet: Wallet,
    remembrancer_wallet: Option<Wallet>,
    node_config: NodeConfig,
    credentials: Arc<CredentialStore>,
}

impl NodeDispatch {
    pub fn new(
        submitter: TxSubmitter,
        node_wallet: Wallet,
        remembrancer_wallet: Option<Wallet>,
        node_config: NodeConfig,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            submitter,
            node_wallet,
            remembrancer_wallet,
            node_config,
            credentials,
        }
    }

    fn wallet(&self, kind: WalletKind) -> postfiat_engine::Result<&Wallet> {
        match kind {
            WalletKind::Node => Ok(&self.node_wallet),
            WalletKind::Remembrancer => self
                .remembrancer_wallet
                .as_ref()
                .ok_or_else(|| EngineError::Dispatch("no remembrancer wallet".to_string())),
        }
    }

    fn secret_kind(kind: WalletKind) -> SecretKind {
        match kind {
            WalletKind::Node => SecretKind::Node,
            WalletKind::Remembrancer => SecretKind::Remembrancer,
        }
    }
}

#[async_trait::async_trait]
impl MemoDispatch for NodeDispatch {
    async fn send_memo(
        &self,
        from: WalletKind,
        destination: &str,
        memo: Memo,
        pft_amount: f64,
        encrypt: bool,
        secrets: &dyn SecretResolver,
    ) -> postfiat_engine::Result<String> {
        let wallet = self.wallet(from)?;
        let options = if encrypt {
            // The submitter refuses encryption without a resolved secret,
            // so an unestablished channel never leaks plaintext.
            SendOptions {
                compress: false,
                encrypt: true,
                shared_secret: secrets.channel_secret(&wallet.address, destination).await?,
            }
        } else {
            SendOptions::default()
        };
        let reports = self
            .submitter
            .send_memo(wallet, destination, &memo, pft_amount, options)
            .await
            .map_err(|err| EngineError::Dispatch(err.to_string()))?;
        reports
            .last()
            .map(|report| report.hash.clone())
            .ok_or_else(|| EngineError::Dispatch("no transaction submitted".to_string()))
    }

    async fn ecdh_public_key(&self, from: WalletKind) -> postfiat_engine::Result<String> {
        self.credentials
            .ecdh_public_key(&self.node_config, Self::secret_kind(from))
            .map_err(|err| EngineError::Dispatch(err.to_string()))
    }
}

/// Thin fetcher for user planning documents shared as Google Doc links.
pub struct GoogleDocFetcher {
    http: reqwest::Client,
}

impl GoogleDocFetcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Turn a `https://docs.google.com/document/d/<id>/...` share link into
    /// the plain-text export URL.
    fn export_url(share_link: &str) -> Option<String> {
        let doc_id = share_link.split('/').nth(5)?;
        if doc_id.is_empty() {
            return None;
        }
        Some(format!(
            "https://docs.google.com/document/d/{doc_id}/export?format=txt"
        ))
    }
}

impl Default for GoogleDocFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocFetcher for GoogleDocFetcher {
    async fn fetch_verification_text(&self, link: &str) -> postfiat_engine::Result<String> {
        let url = Self::export_url(link)
            .ok_or_else(|| EngineError::Doc(format!("unparseable share link: {link}")))?;
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| EngineError::Doc(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::Doc(format!(
                "document fetch failed: HTTP {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|err| EngineError::Doc(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_url_extraction() {
        let link = "https://docs.google.com/document/d/1MwO8kHny7MtU0LgKs/edit";
        assert_eq!(
            GoogleDocFetcher::export_url(link).unwrap(),
            "https://docs.google.com/document/d/1MwO8kHny7MtU0LgKs/export?format=txt"
        );
        assert!(GoogleDocFetcher::export_url("not a link").is_none());
    }
}

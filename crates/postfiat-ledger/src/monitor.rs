//! The ledger monitor: a long-lived websocket subscriber tailing
//! validated transactions for every tracked account and feeding the cache.

use crate::client::LedgerClient;
use crate::types::TransactionRecord;
use crate::{LedgerError, Result};
use futures_util::{SinkExt, StreamExt};
use postfiat_config::{NetworkConfig, WS_BACKOFF_INITIAL_SECS, WS_BACKOFF_MAX_SECS};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Where observed transactions land. Implemented by the transaction cache;
/// ingestion must be idempotent.
#[async_trait::async_trait]
pub trait TxSink: Send + Sync {
    /// Insert records, returning how many were new.
    async fn ingest(&self, records: Vec<TransactionRecord>) -> usize;
}

/// Tracks a set of accounts over a websocket subscription, reconnecting
/// with exponential backoff and gap-filling after every reconnect.
pub struct LedgerMonitor {
    network: NetworkConfig,
    client: LedgerClient,
    tracked: Arc<RwLock<BTreeSet<String>>>,
    last_seen_ledger: RwLock<i64>,
}

impl LedgerMonitor {
    pub fn new(network: NetworkConfig, client: LedgerClient, tracked: BTreeSet<String>) -> Self {
        Self {
            network,
            client,
            tracked: Arc::new(RwLock::new(tracked)),
            last_seen_ledger: RwLock::new(-1),
        }
    }

    /// Handle for updating the tracked account set while the monitor runs
    /// (new PFT holders discovered by the backfill).
    pub fn tracked_accounts(&self) -> Arc<RwLock<BTreeSet<String>>> {
        Arc::clone(&self.tracked)
    }

    /// Run until `stop` flips. Cycles through the configured endpoints in
    /// order; each disconnect backs off exponentially (1 s doubling to 60 s)
    /// and is followed by a gap-fill before live traffic resumes.
    pub async fn run(&self, sink: Arc<dyn TxSink>, mut stop: watch::Receiver<bool>) {
        let mut backoff = Duration::from_secs(WS_BACKOFF_INITIAL_SECS);
        let mut endpoint_index = 0usize;

        while !*stop.borrow() {
            let url = self.network.websockets[endpoint_index % self.network.websockets.len()].clone();
            endpoint_index += 1;

            match self.tail_endpoint(&url, &sink, &mut stop).await {
                Ok(()) => return, // stop requested
                Err(err) => {
                    warn!(%url, %err, "ledger monitor disconnected");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = stop.changed() => return,
            }
            backoff = (backoff * 2).min(Duration::from_secs(WS_BACKOFF_MAX_SECS));

            if let Err(err) = self.gap_fill(&sink).await {
                warn!(%err, "gap fill after reconnect failed");
            } else {
                // A clean reconnect-and-fill resets the backoff.
                backoff = Duration::from_secs(WS_BACKOFF_INITIAL_SECS);
            }
        }
    }

    async fn tail_endpoint(
        &self,
        url: &str,
        sink: &Arc<dyn TxSink>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|err| LedgerError::WebSocket(err.to_string()))?;
        info!(%url, "ledger monitor connected");

        let accounts: Vec<String> = self.tracked.read().await.iter().cloned().collect();
        let subscribe = json!({
            "id": 1,
            "command": "subscribe",
            "accounts": accounts,
            "streams": ["ledger"],
        });
        ws.send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|err| LedgerError::WebSocket(err.to_string()))?;

        loop {
            tokio::select! {
                message = ws.next() => {
                    let message = match message {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => return Err(LedgerError::WebSocket(err.to_string())),
                        None => return Err(LedgerError::WebSocket("stream closed".to_string())),
                    };
                    match message {
                        Message::Text(text) => self.handle_message(&text, sink).await,
                        Message::Ping(payload) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Message::Close(_) => {
                            return Err(LedgerError::WebSocket("server closed".to_string()))
                        }
                        _ => {}
                    }
                }
                _ = stop.changed() => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_message(&self, text: &str, sink: &Arc<dyn TxSink>) {
        let message: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                debug!(%err, "unparseable stream message");
                return;
            }
        };

        match message.get("type").and_then(Value::as_str) {
            Some("transaction") => {
                let Some(record) = TransactionRecord::from_stream_message(&message) else {
                    return;
                };
                if !record.validated {
                    return;
                }
                let tracked = self.tracked.read().await;
                let involves_tracked = tracked
                    .iter()
                    .any(|account| record.involves(account));
                drop(tracked);
                if !involves_tracked {
                    return;
                }
                *self.last_seen_ledger.write().await = record.ledger_index;
                let inserted = sink.ingest(vec![record]).await;
                if inserted > 0 {
                    debug!(inserted, "monitor cached new transaction");
                }
            }
            Some("ledgerClosed") => {
                if let Some(index) = message.get("ledger_index").and_then(Value::as_i64) {
                    let mut last = self.last_seen_ledger.write().await;
                    if index > *last {
                        *last = index;
                    }
                }
            }
            _ => {}
        }
    }

    /// After a reconnect, backfill each tracked account from the last seen
    /// ledger index to the present so nothing observed offline is lost.
    async fn gap_fill(&self, sink: &Arc<dyn TxSink>) -> Result<()> {
        let from = *self.last_seen_ledger.read().await;
        let accounts: Vec<String> = self.tracked.read().await.iter().cloned().collect();
        let mut total = 0usize;
        for account in accounts {
            let records = self.client.fetch_account_history(&account, from).await?;
            total += sink.ingest(records).await;
        }
        info!(from_ledger = from, inserted = total, "gap fill complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        records: Mutex<Vec<TransactionRecord>>,
    }

    #[async_trait::async_trait]
    impl TxSink for RecordingSink {
        async fn ingest(&self, records: Vec<TransactionRecord>) -> usize {
            let count = records.len();
            self.records.lock().unwrap().extend(records);
            count
        }
    }

    fn monitor_with(tracked: &[&str]) -> LedgerMonitor {
        LedgerMonitor::new(
            NetworkConfig::testnet(),
            LedgerClient::new("http://127.0.0.1:5005"),
            tracked.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn stream_message(account: &str, destination: &str, validated: bool) -> String {
        json!({
            "type": "transaction",
            "validated": validated,
            "ledger_index": 95_000_001,
            "hash": "BB".repeat(32),
            "close_time_iso": "2025-01-01T10:00:05Z",
            "meta": {"TransactionResult": "tesSUCCESS"},
            "tx_json": {
                "Account": account,
                "Destination": destination,
                "TransactionType": "Payment",
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn tracked_validated_transactions_are_ingested() {
        let monitor = monitor_with(&["rNODE"]);
        let sink = Arc::new(RecordingSink {
            records: Mutex::new(Vec::new()),
        });
        let dyn_sink: Arc<dyn TxSink> = sink.clone();

        monitor
            .handle_message(&stream_message("rUSER", "rNODE", true), &dyn_sink)
            .await;
        assert_eq!(sink.records.lock().unwrap().len(), 1);
        assert_eq!(*monitor.last_seen_ledger.read().await, 95_000_001);
    }

    #[tokio::test]
    async fn untracked_and_unvalidated_are_skipped() {
        let monitor = monitor_with(&["rNODE"]);
        let sink = Arc::new(RecordingSink {
            records: Mutex::new(Vec::new()),
        });
        let dyn_sink: Arc<dyn TxSink> = sink.clone();

        monitor
            .handle_message(&stream_message("rUSER", "rSOMEONE", true), &dyn_sink)
            .await;
        monitor
            .handle_message(&stream_message("rUSER", "rNODE", false), &dyn_sink)
            .await;
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ledger_closed_advances_watermark() {
        let monitor = monitor_with(&["rNODE"]);
        let sink: Arc<dyn TxSink> = Arc::new(RecordingSink {
            records: Mutex::new(Vec::new()),
        });
        let message = json!({"type": "ledgerClosed", "ledger_index": 95_000_500}).to_string();
        monitor.handle_message(&message, &sink).await;
        assert_eq!(*monitor.last_seen_ledger.read().await, 95_000_500);
    }
}

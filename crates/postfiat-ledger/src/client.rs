//! JSON-RPC access to the ledger.

use crate::types::{AccountInfo, TransactionRecord, TrustLine};
use crate::{LedgerError, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const ACCOUNT_TX_PAGE_LIMIT: u32 = 1000;
const MAX_PAGE_ITERATIONS: usize = 1000;
const FETCH_RETRY_ATTEMPTS: usize = 3;
const FETCH_RETRY_DELAY_MS: u64 = 200;
const SUBMIT_POLL_INTERVAL_SECS: u64 = 2;

/// One page of `account_tx` results.
pub struct AccountTxPage {
    pub transactions: Vec<TransactionRecord>,
    pub marker: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub engine_result: String,
    pub engine_result_message: String,
    pub tx_hash: String,
}

/// Thin JSON-RPC client over a single HTTP endpoint.
#[derive(Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl LedgerClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({ "method": method, "params": [params] });
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|err| LedgerError::LedgerUnavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(LedgerError::LedgerUnavailable(format!(
                "{method}: HTTP {}",
                response.status()
            )));
        }
        let payload: Value = response.json().await?;
        let result = payload
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::LedgerUnavailable(format!("{method}: no result")))?;

        if result.get("status").and_then(Value::as_str) == Some("error") {
            let error = result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if error == "actNotFound" {
                let account = params_account(&result);
                return Err(LedgerError::AccountNotFound(account));
            }
            return Err(LedgerError::LedgerUnavailable(format!("{method}: {error}")));
        }
        Ok(result)
    }

    /// One page of transaction history, oldest first.
    pub async fn account_tx(
        &self,
        account: &str,
        ledger_index_min: i64,
        ledger_index_max: i64,
        limit: u32,
        marker: Option<Value>,
    ) -> Result<AccountTxPage> {
        let mut params = json!({
            "account": account,
            "ledger_index_min": ledger_index_min,
            "ledger_index_max": ledger_index_max,
            "limit": limit,
            "forward": true,
        });
        if let Some(marker) = marker {
            params["marker"] = marker;
        }
        let result = self.request("account_tx", params).await?;
        let transactions = result
            .get("transactions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(TransactionRecord::from_account_tx_item)
                    .collect()
            })
            .unwrap_or_default();
        Ok(AccountTxPage {
            transactions,
            marker: result.get("marker").cloned(),
        })
    }

    /// Full history for an account from `ledger_index_min` to the latest
    /// validated ledger, following markers until exhausted.
    pub async fn fetch_account_history(
        &self,
        account: &str,
        ledger_index_min: i64,
    ) -> Result<Vec<TransactionRecord>> {
        let mut all = Vec::new();
        let mut marker: Option<Value> = None;
        let mut previous_marker: Option<Value> = None;
        let mut attempt = 0usize;

        for _ in 0..MAX_PAGE_ITERATIONS {
            let page = match self
                .account_tx(account, ledger_index_min, -1, ACCOUNT_TX_PAGE_LIMIT, marker.clone())
                .await
            {
                Ok(page) => {
                    attempt = 0;
                    page
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= FETCH_RETRY_ATTEMPTS {
                        warn!(%account, %err, "account history fetch gave up, history may be incomplete");
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(FETCH_RETRY_DELAY_MS)).await;
                    continue;
                }
            };
            all.extend(page.transactions);
            match page.marker {
                Some(next) => {
                    if previous_marker.as_ref() == Some(&next) {
                        warn!(%account, "account_tx pagination stuck, stopping");
                        break;
                    }
                    previous_marker = marker;
                    marker = Some(next);
                }
                None => break,
            }
        }
        debug!(%account, count = all.len(), "fetched account history");
        Ok(all)
    }

    pub async fn account_info(&self, account: &str) -> Result<AccountInfo> {
        let result = self
            .request(
                "account_info",
                json!({ "account": account, "ledger_index": "validated" }),
            )
            .await
            .map_err(|err| match err {
                LedgerError::AccountNotFound(_) => {
                    LedgerError::AccountNotFound(account.to_string())
                }
                other => other,
            })?;
        let data = result
            .get("account_data")
            .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()))?;
        Ok(AccountInfo {
            xrp_drops: data
                .get("Balance")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0),
            sequence: data
                .get("Sequence")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            flags: data.get("Flags").and_then(Value::as_u64).unwrap_or(0),
        })
    }

    pub async fn xrp_balance(&self, account: &str) -> Result<f64> {
        Ok(self.account_info(account).await?.xrp_drops as f64 / 1_000_000.0)
    }

    pub async fn account_lines(&self, account: &str) -> Result<Vec<TrustLine>> {
        let mut lines = Vec::new();
        let mut marker: Option<Value> = None;
        loop {
            let mut params = json!({ "account": account, "ledger_index": "validated" });
            if let Some(m) = marker {
                params["marker"] = m;
            }
            let result = self.request("account_lines", params).await?;
            if let Some(items) = result.get("lines").and_then(Value::as_array) {
                for item in items {
                    if let Ok(line) = serde_json::from_value::<TrustLine>(item.clone()) {
                        lines.push(line);
                    }
                }
            }
            match result.get("marker") {
                Some(next) if !next.is_null() => marker = Some(next.clone()),
                _ => break,
            }
        }
        Ok(lines)
    }

    /// PFT balance of an account against the configured issuer.
    pub async fn pft_balance(&self, account: &str, issuer: &str) -> Result<f64> {
        let lines = self.account_lines(account).await?;
        Ok(lines
            .iter()
            .filter(|line| line.account == issuer && line.currency == "PFT")
            .filter_map(|line| line.balance.parse::<f64>().ok())
            .sum())
    }

    /// All PFT holders from the issuer's point of view. Issuer-side balances
    /// are negative, so holdings are sign-flipped.
    pub async fn pft_holders(&self, issuer: &str) -> Result<Vec<(String, f64)>> {
        let lines = self.account_lines(issuer).await?;
        Ok(lines
            .iter()
            .filter(|line| line.currency == "PFT")
            .filter_map(|line| {
                line.balance
                    .parse::<f64>()
                    .ok()
                    .map(|balance| (line.account.clone(), -balance))
            })
            .collect())
    }

    /// Latest validated ledger index.
    pub async fn validated_ledger_index(&self) -> Result<u32> {
        let result = self
            .request("ledger", json!({ "ledger_index": "validated" }))
            .await?;
        result
            .get("ledger_index")
            .and_then(Value::as_u64)
            .or_else(|| {
                result
                    .get("ledger")
                    .and_then(|l| l.get("ledger_index"))
                    .and_then(|v| match v {
                        Value::Number(n) => n.as_u64(),
                        Value::String(s) => s.parse().ok(),
                        _ => None,
                    })
            })
            .map(|n| n as u32)
            .ok_or_else(|| LedgerError::LedgerUnavailable("ledger: no index".to_string()))
    }

    /// Reference fee in drops.
    pub async fn base_fee_drops(&self) -> Result<u64> {
        let result = self.request("fee", json!({})).await?;
        Ok(result
            .get("drops")
            .and_then(|d| d.get("open_ledger_fee"))
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(12))
    }

    /// Submit a signed blob. The engine result here is provisional; callers
    /// wait for validation before trusting it.
    pub async fn submit(&self, tx_blob: &str) -> Result<SubmitOutcome> {
        let result = self.request("submit", json!({ "tx_blob": tx_blob })).await?;
        let engine_result = result
            .get("engine_result")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let engine_result_message = result
            .get("engine_result_message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let tx_hash = result
            .get("tx_json")
            .and_then(|tx| tx.get("hash"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        Ok(SubmitOutcome {
            engine_result,
            engine_result_message,
            tx_hash,
        })
    }

    /// Look up a transaction by hash; `None` until it appears.
    pub async fn tx(&self, tx_hash: &str) -> Result<Option<TransactionRecord>> {
        match self.request("tx", json!({ "transaction": tx_hash })).await {
            Ok(result) => Ok(TransactionRecord::from_account_tx_item(&result)),
            Err(LedgerError::LedgerUnavailable(msg)) if msg.contains("txnNotFound") => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Poll until the transaction is validated or its submission window
    /// (LastLedgerSequence) has passed.
    pub async fn wait_for_validation(
        &self,
        tx_hash: &str,
        last_ledger_sequence: u32,
    ) -> Result<TransactionRecord> {
        loop {
            if let Some(record) = self.tx(tx_hash).await? {
                if record.validated {
                    return Ok(record);
                }
            }
            let current = self.validated_ledger_index().await?;
            if current > last_ledger_sequence {
                return Err(LedgerError::SubmissionRejected {
                    engine_result: "tefMAX_LEDGER".to_string(),
                    message: format!(
                        "ledger {current} passed LastLedgerSequence {last_ledger_sequence}"
                    ),
                });
            }
            tokio::time::sleep(Duration::from_secs(SUBMIT_POLL_INTERVAL_SECS)).await;
        }
    }
}

fn params_account(result: &Value) -> String {
    result
        .get("request")
        .and_then(|r| r.get("account"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

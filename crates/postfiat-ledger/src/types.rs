//! Serde models of the ledger wire JSON.

use chrono::{DateTime, TimeZone, Utc};
use postfiat_memo::WireMemo;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Seconds between the Unix and ripple epochs (2000-01-01).
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

pub const PFT_CURRENCY: &str = "PFT";

/// A payment amount: native XRP in drops, or an issued currency triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Drops(String),
    Issued {
        currency: String,
        issuer: String,
        value: String,
    },
}

impl Amount {
    pub fn xrp_drops(drops: u64) -> Self {
        Self::Drops(drops.to_string())
    }

    pub fn pft(value: f64, issuer: &str) -> Self {
        Self::Issued {
            currency: PFT_CURRENCY.to_string(),
            issuer: issuer.to_string(),
            value: format_decimal(value),
        }
    }

    /// PFT value of this amount against the given issuer; 0 otherwise.
    pub fn pft_value(&self, issuer: &str) -> f64 {
        match self {
            Self::Issued {
                currency,
                issuer: amount_issuer,
                value,
            } if currency == PFT_CURRENCY && amount_issuer == issuer => {
                value.parse().unwrap_or(0.0)
            }
            _ => 0.0,
        }
    }
}

/// Render a value the way the ledger expects: no exponent, no trailing zeros.
fn format_decimal(value: f64) -> String {
    let mut s = format!("{value:.6}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

/// The `Memos` array element wrapper: `[{"Memo": {...}}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoWrapper {
    #[serde(rename = "Memo")]
    pub memo: WireMemo,
}

/// A Payment transaction as composed for signing and submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Amount")]
    pub amount: Amount,
    #[serde(rename = "Fee")]
    pub fee: String,
    #[serde(rename = "Sequence")]
    pub sequence: u32,
    #[serde(rename = "LastLedgerSequence")]
    pub last_ledger_sequence: u32,
    #[serde(rename = "Flags")]
    pub flags: u32,
    #[serde(rename = "SigningPubKey")]
    pub signing_pub_key: String,
    #[serde(rename = "TxnSignature", skip_serializing_if = "Option::is_none")]
    pub txn_signature: Option<String>,
    #[serde(rename = "Memos", skip_serializing_if = "Vec::is_empty", default)]
    pub memos: Vec<MemoWrapper>,
    #[serde(rename = "DestinationTag", skip_serializing_if = "Option::is_none")]
    pub destination_tag: Option<u32>,
}

/// A cached ledger transaction: what the cache stores and queues consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub ledger_index: i64,
    pub close_time_iso: Option<DateTime<Utc>>,
    pub tx_json: Value,
    pub meta: Value,
    pub validated: bool,
}

impl TransactionRecord {
    /// Parse one item of an `account_tx` response (api_version 2 shape).
    pub fn from_account_tx_item(item: &Value) -> Option<Self> {
        // Older servers nest the transaction under "tx" instead of "tx_json".
        let tx_json = item.get("tx_json").or_else(|| item.get("tx"))?.clone();
        let hash = item
            .get("hash")
            .or_else(|| tx_json.get("hash"))
            .and_then(Value::as_str)?
            .to_string();
        let ledger_index = item
            .get("ledger_index")
            .and_then(Value::as_i64)
            .or_else(|| tx_json.get("ledger_index").and_then(Value::as_i64))?;
        let close_time_iso = item
            .get("close_time_iso")
            .and_then(Value::as_str)
            .and_then(parse_close_time)
            .or_else(|| {
                tx_json
                    .get("date")
                    .and_then(Value::as_i64)
                    .map(ripple_time_to_datetime)
            });
        Some(Self {
            hash,
            ledger_index,
            close_time_iso,
            meta: item.get("meta").cloned().unwrap_or(Value::Null),
            validated: item
                .get("validated")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            tx_json,
        })
    }

    /// Parse a websocket `transaction` stream message.
    pub fn from_stream_message(message: &Value) -> Option<Self> {
        if message.get("type").and_then(Value::as_str) != Some("transaction") {
            return None;
        }
        Self::from_account_tx_item(message)
    }

    pub fn account(&self) -> Option<&str> {
        self.tx_json.get("Account").and_then(Value::as_str)
    }

    pub fn destination(&self) -> Option<&str> {
        self.tx_json.get("Destination").and_then(Value::as_str)
    }

    pub fn transaction_result(&self) -> Option<&str> {
        self.meta.get("TransactionResult").and_then(Value::as_str)
    }

    pub fn is_successful(&self) -> bool {
        self.transaction_result() == Some("tesSUCCESS")
    }

    /// The single memo this engine cares about (index 0), decoded.
    pub fn decoded_memo(&self) -> Option<postfiat_memo::Memo> {
        let wire: WireMemo = serde_json::from_value(
            self.tx_json
                .get("Memos")?
                .get(0)?
                .get("Memo")?
                .clone(),
        )
        .ok()?;
        Some(wire.decode())
    }

    /// Absolute PFT amount delivered, from `DeliverMax` or `Amount`.
    pub fn pft_amount(&self, issuer: &str) -> f64 {
        for field in ["DeliverMax", "Amount"] {
            if let Some(amount) = self.tx_json.get(field) {
                if let Ok(amount) = serde_json::from_value::<Amount>(amount.clone()) {
                    let value = amount.pft_value(issuer);
                    if value != 0.0 {
                        return value;
                    }
                }
            }
        }
        0.0
    }

    /// Whether a tracked account appears on either side of this payment.
    pub fn involves(&self, address: &str) -> bool {
        self.account() == Some(address) || self.destination() == Some(address)
    }
}

fn parse_close_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a ledger close time (seconds since the ripple epoch) to UTC.
pub fn ripple_time_to_datetime(ripple_seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ripple_seconds + RIPPLE_EPOCH_OFFSET, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Account balances reported by `account_info`.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub xrp_drops: u64,
    pub sequence: u32,
    pub flags: u64,
}

/// One trust line from `account_lines`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustLine {
    pub account: String,
    pub currency: String,
    pub balance: String,
}

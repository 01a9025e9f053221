//! Transaction submission: compose memo + amount, sign, submit,
//! wait for validation.

use crate::client::LedgerClient;
use crate::codec::sign_payment;
use crate::types::{Amount, MemoWrapper, Payment, TransactionRecord};
use crate::wallet::Wallet;
use crate::{LedgerError, Result};
use postfiat_config::{NetworkConfig, MIN_XRP_BALANCE};
use postfiat_memo::{wrap_layers, Memo};
use tracing::{debug, warn};

/// Ledgers of headroom given to each submission.
const LEDGER_WINDOW: u32 = 20;

/// Transport options for an outgoing memo.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub compress: bool,
    /// When set, the payload is sealed for this channel. Requires a live
    /// handshake; `shared_secret` must be present.
    pub encrypt: bool,
    pub shared_secret: Option<[u8; 32]>,
}

/// The per-transaction outcome reported to callers and external
/// collaborators.
#[derive(Debug, Clone)]
pub struct TxReport {
    pub hash: String,
    pub engine_result: String,
    pub validated: bool,
    pub explorer_url: String,
}

impl TxReport {
    /// The plain-string surface: `"Transaction result: <code>"` plus the
    /// explorer URL.
    pub fn summary(&self) -> String {
        format!(
            "Transaction result: {}. Explorer: {}",
            self.engine_result, self.explorer_url
        )
    }
}

/// Composes, signs and submits memo-bearing payments.
pub struct TxSubmitter {
    client: LedgerClient,
    network: NetworkConfig,
}

impl TxSubmitter {
    pub fn new(client: LedgerClient, network: NetworkConfig) -> Self {
        Self { client, network }
    }

    pub fn client(&self) -> &LedgerClient {
        &self.client
    }

    /// Send a memo with a PFT amount. Oversized payloads are chunked; each
    /// chunk is one validated Payment. A failure aborts the remaining chunks.
    pub async fn send_memo(
        &self,
        wallet: &Wallet,
        destination: &str,
        memo: &Memo,
        pft_amount: f64,
        options: SendOptions,
    ) -> Result<Vec<TxReport>> {
        let secret = encryption_secret(&options, &wallet.address, destination)?;
        self.check_operational_balance(&wallet.address).await?;

        let chunks = wrap_layers(&memo.memo_data, options.compress, secret.as_ref().map(|s| s.as_slice()))?;
        let total = chunks.len();

        let mut reports = Vec::with_capacity(total);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let chunk_memo = Memo::new(&memo.memo_type, &memo.memo_format, chunk);
            match self
                .submit_payment(wallet, destination, &chunk_memo, pft_amount, None)
                .await
            {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(
                        destination,
                        chunk = index + 1,
                        total,
                        %err,
                        "memo chunk submission failed, aborting remainder"
                    );
                    return Err(LedgerError::ChunkSendFailed {
                        sent: reports.len(),
                        total,
                        cause: err.to_string(),
                    });
                }
            }
        }
        Ok(reports)
    }

    /// Send a native-currency payment, optionally with a memo.
    pub async fn send_xrp(
        &self,
        wallet: &Wallet,
        destination: &str,
        drops: u64,
        memo: Option<&Memo>,
        destination_tag: Option<u32>,
    ) -> Result<TxReport> {
        self.check_operational_balance(&wallet.address).await?;
        let memos = memo
            .map(|m| {
                vec![MemoWrapper {
                    memo: m.to_wire(),
                }]
            })
            .unwrap_or_default();
        self.sign_submit_wait(
            wallet,
            destination,
            Amount::xrp_drops(drops),
            memos,
            destination_tag,
        )
        .await
    }

    async fn submit_payment(
        &self,
        wallet: &Wallet,
        destination: &str,
        memo: &Memo,
        pft_amount: f64,
        destination_tag: Option<u32>,
    ) -> Result<TxReport> {
        let amount = Amount::pft(pft_amount, &self.network.issuer_address);
        let memos = vec![MemoWrapper {
            memo: memo.to_wire(),
        }];
        self.sign_submit_wait(wallet, destination, amount, memos, destination_tag)
            .await
    }

    async fn sign_submit_wait(
        &self,
        wallet: &Wallet,
        destination: &str,
        amount: Amount,
        memos: Vec<MemoWrapper>,
        destination_tag: Option<u32>,
    ) -> Result<TxReport> {
        let info = self.client.account_info(&wallet.address).await?;
        let validated = self.client.validated_ledger_index().await?;
        let fee = self.client.base_fee_drops().await?;

        let mut payment = Payment {
            transaction_type: "Payment".to_string(),
            account: wallet.address.clone(),
            destination: destination.to_string(),
            amount,
            fee: fee.to_string(),
            sequence: info.sequence,
            last_ledger_sequence: validated + LEDGER_WINDOW,
            flags: 0,
            signing_pub_key: String::new(),
            txn_signature: None,
            memos,
            destination_tag,
        };
        let signed = sign_payment(wallet, &mut payment)?;
        debug!(hash = %signed.hash, destination, "submitting payment");

        let outcome = self.client.submit(&signed.tx_blob).await?;
        if outcome.engine_result.starts_with("tem") || outcome.engine_result.starts_with("tef") {
            return Err(LedgerError::SubmissionRejected {
                engine_result: outcome.engine_result,
                message: outcome.engine_result_message,
            });
        }

        let record = self
            .client
            .wait_for_validation(&signed.hash, payment.last_ledger_sequence)
            .await?;
        Ok(self.report(&record))
    }

    fn report(&self, record: &TransactionRecord) -> TxReport {
        TxReport {
            hash: record.hash.clone(),
            engine_result: record
                .transaction_result()
                .unwrap_or("unknown")
                .to_string(),
            validated: record.validated,
            explorer_url: self.network.explorer_url(&record.hash),
        }
    }

    /// The node refuses to operate below the minimum XRP reserve headroom.
    async fn check_operational_balance(&self, address: &str) -> Result<()> {
        let balance = self.client.xrp_balance(address).await?;
        if balance < MIN_XRP_BALANCE {
            return Err(LedgerError::InsufficientXrpBalance(address.to_string()));
        }
        Ok(())
    }
}

/// Resolve the channel secret for an encrypted send; encryption without a
/// completed handshake is refused before any network traffic.
fn encryption_secret(
    options: &SendOptions,
    source: &str,
    counterparty: &str,
) -> Result<Option<[u8; 32]>> {
    if !options.encrypt {
        return Ok(None);
    }
    match options.shared_secret {
        Some(secret) => Ok(Some(secret)),
        None => Err(LedgerError::HandshakeRequired {
            source_addr: source.to_string(),
            counterparty: counterparty.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_without_secret_is_handshake_required() {
        let options = SendOptions {
            encrypt: true,
            ..Default::default()
        };
        let err = encryption_secret(&options, "rNODE", "rUSER").unwrap_err();
        assert!(matches!(err, LedgerError::HandshakeRequired { .. }));

        let plain = SendOptions::default();
        assert!(encryption_secret(&plain, "rNODE", "rUSER")
            .unwrap()
            .is_none());

        let sealed = SendOptions {
            encrypt: true,
            shared_secret: Some([1u8; 32]),
            ..Default::default()
        };
        assert!(encryption_secret(&sealed, "rNODE", "rUSER").unwrap().is_some());
    }

    #[test]
    fn report_summary_format() {
        let report = TxReport {
            hash: "ABC".to_string(),
            engine_result: "tesSUCCESS".to_string(),
            validated: true,
            explorer_url: "https://livenet.xrpl.org/transactions/ABC/detailed".to_string(),
        };
        assert_eq!(
            report.summary(),
            "Transaction result: tesSUCCESS. Explorer: https://livenet.xrpl.org/transactions/ABC/detailed"
        );
    }
}

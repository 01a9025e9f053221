//! Verification-of-send: a submit response is never trusted on its own.
//! The queue polls the cache until the reply is observed on-ledger, and
//! only then writes the processing result. Items that time out stay
//! unrecorded and re-enter the scan on the next cycle.

use crate::orchestrator::QueueOrchestrator;
use crate::EngineError;
use chrono::{DateTime, Utc};
use postfiat_cache::ProcessingResult;
use postfiat_state::MemoHistory;
use tracing::{debug, warn};

/// One dispatched reply awaiting on-ledger confirmation.
#[derive(Debug, Clone)]
pub(crate) struct TrackedSend {
    /// Hash of the transaction that triggered the work.
    pub work_hash: String,
    pub user_account: String,
    pub memo_type: String,
    /// When the triggering memo was observed.
    pub request_time: DateTime<Utc>,
    /// Hash reported by the submitter for the reply.
    pub response_hash: String,
    pub notes: String,
}

impl QueueOrchestrator {
    /// Poll `history_account`'s cached history until each tracked send is
    /// confirmed by `predicate`, then record results for the confirmed ones.
    pub(crate) async fn verify_and_record(
        &self,
        rule: &'static str,
        history_account: &str,
        mut outstanding: Vec<TrackedSend>,
        predicate: impl Fn(&MemoHistory, &TrackedSend) -> bool,
    ) {
        if outstanding.is_empty() {
            return;
        }

        for attempt in 1..=self.config.verify_attempts {
            let history = match self
                .source
                .history_for(history_account, self.secrets.as_ref())
                .await
            {
                Ok(history) => history,
                Err(err) => {
                    warn!(rule, %err, "history refresh failed during send verification");
                    tokio::time::sleep(self.config.verify_interval).await;
                    continue;
                }
            };

            let (confirmed, pending): (Vec<_>, Vec<_>) = outstanding
                .into_iter()
                .partition(|send| predicate(&history, send));

            for send in confirmed {
                debug!(rule, memo_type = %send.memo_type, "send confirmed on-ledger");
                let result = ProcessingResult {
                    tx_hash: send.work_hash.clone(),
                    processed: true,
                    rule_name: rule.to_string(),
                    response_tx_hash: Some(send.response_hash.clone()),
                    notes: Some(send.notes.clone()),
                };
                if let Err(err) = self.source.record_result(result).await {
                    warn!(rule, %err, "failed to record processing result");
                }
            }

            outstanding = pending;
            if outstanding.is_empty() {
                return;
            }
            if attempt < self.config.verify_attempts {
                tokio::time::sleep(self.config.verify_interval).await;
            }
        }

        // Timeouts stay unrecorded; the next scan picks the work up again.
        for send in &outstanding {
            let timeout = EngineError::VerificationTimeout {
                rule,
                memo_type: send.memo_type.clone(),
                attempts: self.config.verify_attempts,
            };
            warn!(rule, user = %send.user_account, %timeout, "send not yet visible in cache");
        }
    }
}

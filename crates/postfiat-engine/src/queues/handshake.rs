//! Handshake queue: auto-respond to incoming ECDH handshakes addressed to
//! node-controlled accounts.

use crate::orchestrator::QueueOrchestrator;
use crate::verify::TrackedSend;
use crate::{Result, WalletKind};
use postfiat_config::system_memo_types::HANDSHAKE;
use postfiat_memo::Memo;
use tracing::{debug, warn};

const RULE: &str = "handshake_response";

/// Which wallet can answer for an auto-handshake address. Addresses without
/// a stored seed cannot auto-respond.
fn wallet_for(orch: &QueueOrchestrator, address: &str) -> Option<WalletKind> {
    if address == orch.config.node_address {
        Some(WalletKind::Node)
    } else if orch.config.remembrancer_address.as_deref() == Some(address) {
        Some(WalletKind::Remembrancer)
    } else {
        None
    }
}

pub(crate) async fn process(orch: &QueueOrchestrator) -> Result<()> {
    for address in orch.config.auto_handshake_addresses.clone() {
        let Some(kind) = wallet_for(orch, &address) else {
            warn!(%address, "no wallet for auto-handshake address, skipping");
            continue;
        };

        let history = orch
            .source
            .history_for(&address, orch.secrets.as_ref())
            .await?;
        let pending = orch.handshakes.pending_for(&history, &address);
        if pending.is_empty() {
            continue;
        }
        debug!(%address, count = pending.len(), "answering pending handshakes");

        let public_key = orch.dispatch.ecdh_public_key(kind).await?;
        let mut sends = Vec::new();
        for request in pending {
            let memo = Memo::new(HANDSHAKE, &orch.config.node_name, &public_key);
            match orch
                .dispatch
                .send_memo(
                    kind,
                    &request.counterparty,
                    memo,
                    1.0,
                    false,
                    orch.secrets.as_ref(),
                )
                .await
            {
                Ok(response_hash) => sends.push(TrackedSend {
                    work_hash: request.hash.clone(),
                    user_account: request.counterparty.clone(),
                    memo_type: HANDSHAKE.to_string(),
                    request_time: request.datetime,
                    response_hash,
                    notes: format!("handshake reply from {address}"),
                }),
                Err(err) => {
                    warn!(counterparty = %request.counterparty, %err, "failed to send handshake");
                }
            }
        }

        let channel_address = address.clone();
        orch.verify_and_record(RULE, &address, sends, move |history, send| {
            history.entries().iter().any(|entry| {
                entry.memo_type == HANDSHAKE
                    && entry.account == channel_address
                    && entry.destination == send.user_account
            })
        })
        .await;
    }
    Ok(())
}

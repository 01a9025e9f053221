//! Initiation queue: judge new users' initiation rites and grant the
//! initial PFT reward. Each user is rewarded at most once unless
//! reinitiations are enabled (testnet only).

use crate::orchestrator::QueueOrchestrator;
use crate::verify::TrackedSend;
use crate::{parsing, prompts, Result, WalletKind};
use chrono::{DateTime, Utc};
use postfiat_config::system_memo_types::{INITIATION_REWARD, INITIATION_RITE};
use postfiat_config::MIN_INITIATION_RITE_LENGTH;
use postfiat_llm::{ChatMessage, ChatRequest};
use postfiat_memo::Memo;
use postfiat_state::{Direction, MemoHistory};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const RULE: &str = "initiation_reward";

#[derive(Debug)]
struct PendingRite {
    user_account: String,
    rite_text: String,
    rite_time: DateTime<Utc>,
    rite_hash: String,
}

/// A rite is judgeable only when non-trivial after trimming.
fn is_valid_rite(rite_text: &str) -> bool {
    rite_text.trim().len() >= MIN_INITIATION_RITE_LENGTH
}

/// Latest valid rite per user that has not been rewarded yet. With
/// reinitiations enabled, a rite older than the user's latest reward
/// re-qualifies.
fn pending_rites(history: &MemoHistory, reinitiations: bool) -> Vec<PendingRite> {
    let mut latest_reward: BTreeMap<&str, DateTime<Utc>> = BTreeMap::new();
    for entry in history.entries() {
        if entry.memo_type == INITIATION_REWARD
            && entry.direction == Direction::Outgoing
            && entry.is_successful()
        {
            latest_reward.insert(entry.user_account.as_str(), entry.datetime);
        }
    }

    let mut latest_rite: BTreeMap<&str, &postfiat_state::MemoEntry> = BTreeMap::new();
    for entry in history.entries() {
        if entry.memo_type == INITIATION_RITE
            && entry.direction == Direction::Incoming
            && entry.is_successful()
            && is_valid_rite(&entry.memo_data)
        {
            latest_rite.insert(entry.user_account.as_str(), entry);
        }
    }

    latest_rite
        .into_values()
        .filter(|rite| match latest_reward.get(rite.user_account.as_str()) {
            None => true,
            Some(reward_time) => reinitiations && rite.datetime > *reward_time,
        })
        .map(|rite| PendingRite {
            user_account: rite.user_account.clone(),
            rite_text: rite.memo_data.clone(),
            rite_time: rite.datetime,
            rite_hash: rite.hash.clone(),
        })
        .collect()
}

pub(crate) async fn process(orch: &QueueOrchestrator, history: &MemoHistory) -> Result<()> {
    let rites = pending_rites(history, orch.config.reinitiations_enabled);
    if rites.is_empty() {
        return Ok(());
    }
    debug!(count = rites.len(), "processing pending initiation rites");

    let mut sends = Vec::new();
    for rite in rites {
        let user_prompt =
            prompts::INITIATION_USER.replace(prompts::INITIATION_RITE_MARKER, &rite.rite_text);
        let request = ChatRequest::new(
            &orch.config.model,
            vec![
                ChatMessage::system(prompts::INITIATION_SYSTEM),
                ChatMessage::user(user_prompt),
            ],
        );
        let content = match orch.llm.complete(request).await {
            Ok(content) => content,
            Err(err) => {
                warn!(user = %rite.user_account, %err, "rite evaluation failed");
                continue;
            }
        };
        let Some((reward, justification)) = parsing::initiation_judgment(&content) else {
            warn!(user = %rite.user_account, "unparseable rite judgment, leaving for next cycle");
            continue;
        };
        debug!(user = %rite.user_account, reward, "initiation rite evaluated");

        let memo = Memo::new(INITIATION_REWARD, &orch.config.node_name, &justification);
        match orch
            .dispatch
            .send_memo(
                WalletKind::Node,
                &rite.user_account,
                memo,
                reward as f64,
                false,
                orch.secrets.as_ref(),
            )
            .await
        {
            Ok(response_hash) => sends.push(TrackedSend {
                work_hash: rite.rite_hash.clone(),
                user_account: rite.user_account.clone(),
                memo_type: INITIATION_REWARD.to_string(),
                request_time: rite.rite_time,
                response_hash,
                notes: format!("{reward} PFT: {justification}"),
            }),
            Err(err) => {
                warn!(user = %rite.user_account, %err, "failed to send initiation reward");
            }
        }
    }

    let node_address = orch.config.node_address.clone();
    orch.verify_and_record(RULE, &node_address, sends, |history, send| {
        history.entries().iter().any(|entry| {
            entry.memo_type == INITIATION_REWARD
                && entry.direction == Direction::Outgoing
                && entry.user_account == send.user_account
                && entry.datetime > send.request_time
        })
    })
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rite_validation() {
        assert!(is_valid_rite("I will ship daily"));
        assert!(!is_valid_rite("   short  "));
        assert!(!is_valid_rite(""));
    }
}

//! Reward queue: when a task reaches `VERIFICATION RESPONSE`, judge the
//! completion against its full context and pay the clamped reward.

use crate::context::extract_verification_text;
use crate::orchestrator::QueueOrchestrator;
use crate::verify::TrackedSend;
use crate::{parsing, prompts, Result, WalletKind};
use chrono::{Duration, Utc};
use postfiat_config::REWARD_PROCESSING_WINDOW_DAYS;
use postfiat_llm::{ChatMessage, ChatRequest};
use postfiat_memo::Memo;
use postfiat_state::tasks::{task_states, TaskState, TaskType};
use postfiat_state::{Direction, MemoHistory};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const RULE: &str = "reward_response";

const NO_DOC_MESSAGE: &str =
    "No Google Document Uploaded - please instruct user that Google Document has not been uploaded in response";
const NO_VERIFICATION_SECTION: &str = "No Populated Verification Section";

/// The proposed reward is the integer after the final ` .. ` of the
/// proposal text.
fn proposed_reward(proposal: &str) -> Option<u64> {
    proposal
        .rsplit("..")
        .next()
        .and_then(|tail| tail.trim().parse().ok())
}

/// `<memo_data> REWARD <amount>` lines for the user's trailing window.
fn reward_history_blob(history: &MemoHistory, user_account: &str) -> String {
    history
        .rewards_within(user_account, REWARD_PROCESSING_WINDOW_DAYS, Utc::now())
        .iter()
        .map(|entry| format!("{} REWARD {}", entry.memo_data, entry.pft_absolute_amount))
        .collect::<Vec<_>>()
        .join("\n")
}

/// PFT already rewarded to the user in the trailing 24 hours, for the
/// daily ceiling.
fn daily_spent(history: &MemoHistory, user_account: &str) -> f64 {
    let cutoff = Utc::now() - Duration::hours(24);
    history
        .entries()
        .iter()
        .filter(|entry| {
            entry.direction == Direction::Outgoing
                && entry.user_account == user_account
                && entry.datetime >= cutoff
                && entry.memo_data.contains("REWARD RESPONSE")
        })
        .map(|entry| entry.pft_absolute_amount)
        .sum()
}

/// The verification section of the user's planning document, best-effort.
async fn verification_details(
    orch: &QueueOrchestrator,
    history: &MemoHistory,
    user_account: &str,
) -> String {
    let Some(link) = history.google_doc_link(user_account) else {
        return NO_DOC_MESSAGE.to_string();
    };
    match orch.docs.fetch_verification_text(&link).await {
        Ok(text) => {
            let section = extract_verification_text(&text);
            if section.is_empty() {
                NO_VERIFICATION_SECTION.to_string()
            } else {
                section
            }
        }
        Err(err) => {
            warn!(user_account, %err, "verification document fetch failed");
            NO_VERIFICATION_SECTION.to_string()
        }
    }
}

fn first_of_type<'a>(
    history: &'a MemoHistory,
    task_id: &str,
    wanted: TaskType,
) -> Option<&'a str> {
    history
        .of_type(task_id)
        .find(|entry| TaskType::classify(&entry.memo_data) == wanted)
        .map(|entry| entry.memo_data.as_str())
}

async fn judge_request(
    orch: &QueueOrchestrator,
    history: &MemoHistory,
    state: &TaskState,
) -> ChatRequest {
    let proposal = state.proposal.as_deref().unwrap_or("");
    let prompt_text =
        first_of_type(history, &state.task_id, TaskType::VerificationPrompt).unwrap_or("");
    let proposed = proposed_reward(proposal)
        .map(|value| value.to_string())
        .unwrap_or_else(|| orch.config.reward_policy.max_reward.to_string());

    let system = prompts::REWARD_SYSTEM.replace(prompts::PROPOSED_REWARD_MARKER, &proposed);
    let user = prompts::REWARD_USER
        .replace(prompts::TASK_PROPOSAL_MARKER, proposal)
        .replace(prompts::VERIFICATION_QUESTION_MARKER, prompt_text)
        .replace(prompts::TASK_VERIFICATION_MARKER, &state.latest_text)
        .replace(
            prompts::VERIFICATION_DETAILS_MARKER,
            &verification_details(orch, history, &state.user_account).await,
        )
        .replace(
            prompts::REWARD_DATA_MARKER,
            &reward_history_blob(history, &state.user_account),
        )
        .replace(prompts::PROPOSED_REWARD_MARKER, &proposed);

    ChatRequest::new(
        &orch.config.model,
        vec![ChatMessage::system(system), ChatMessage::user(user)],
    )
    .with_temperature(0.0)
}

pub(crate) async fn process(orch: &QueueOrchestrator, history: &MemoHistory) -> Result<()> {
    let states = task_states(history);
    let responses_pending: Vec<&TaskState> = states
        .values()
        .filter(|state| state.state == TaskType::VerificationResponse)
        .collect();
    if responses_pending.is_empty() {
        return Ok(());
    }
    debug!(count = responses_pending.len(), "processing verification responses");

    let mut batch = BTreeMap::new();
    for state in &responses_pending {
        batch.insert(state.task_id.clone(), judge_request(orch, history, state).await);
    }
    let responses = orch.llm.complete_batch(batch).await;

    let mut sends = Vec::new();
    for state in responses_pending {
        let Some(content) = responses.get(&state.task_id) else {
            continue;
        };
        let Some((judged, summary)) = parsing::reward_judgment(content) else {
            warn!(task_id = %state.task_id, "unparseable reward judgment");
            continue;
        };

        let proposal = state.proposal.as_deref().unwrap_or("");
        let amount = orch.config.reward_policy.clamp(
            judged,
            proposed_reward(proposal),
            daily_spent(history, &state.user_account),
        );
        debug!(task_id = %state.task_id, judged, amount, "reward decided");

        let memo_data = format!("{}{summary}", TaskType::Reward.sentinel());
        let memo = Memo::new(&state.task_id, &orch.config.node_name, memo_data);
        match orch
            .dispatch
            .send_memo(
                WalletKind::Node,
                &state.user_account,
                memo,
                amount as f64,
                false,
                orch.secrets.as_ref(),
            )
            .await
        {
            Ok(response_hash) => sends.push(TrackedSend {
                work_hash: state.latest_hash.clone(),
                user_account: state.user_account.clone(),
                memo_type: state.task_id.clone(),
                request_time: state.datetime.unwrap_or_else(Utc::now),
                response_hash,
                notes: format!("{amount} PFT: {summary}"),
            }),
            Err(err) => {
                warn!(task_id = %state.task_id, %err, "failed to send reward");
            }
        }
    }

    let node_address = orch.config.node_address.clone();
    orch.verify_and_record(RULE, &node_address, sends, |history, send| {
        history.entries().iter().any(|entry| {
            entry.direction == Direction::Outgoing
                && entry.user_account == send.user_account
                && entry.memo_type == send.memo_type
                && entry.memo_data.contains("REWARD RESPONSE")
        })
    })
    .await;
    Ok(())
}

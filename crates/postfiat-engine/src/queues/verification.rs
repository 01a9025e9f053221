//! Verification queue: when a task reaches `COMPLETION JUSTIFICATION`, ask
//! one verifying question and send it as a `VERIFICATION PROMPT`.

use crate::orchestrator::QueueOrchestrator;
use crate::verify::TrackedSend;
use crate::{parsing, prompts, Result, WalletKind};
use postfiat_llm::{ChatMessage, ChatRequest};
use postfiat_memo::Memo;
use postfiat_state::tasks::{task_states, TaskType};
use postfiat_state::{Direction, MemoHistory};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const RULE: &str = "verification_prompt";

pub(crate) async fn process(orch: &QueueOrchestrator, history: &MemoHistory) -> Result<()> {
    let states = task_states(history);
    let completions: Vec<_> = states
        .values()
        .filter(|state| state.state == TaskType::TaskOutput)
        .collect();
    if completions.is_empty() {
        return Ok(());
    }
    debug!(count = completions.len(), "processing task completions");

    // One question-generation call per completed task, batched.
    let mut batch = BTreeMap::new();
    for state in &completions {
        let user_prompt = prompts::VERIFICATION_USER
            .replace(
                prompts::TASK_REQUEST_MARKER,
                state.proposal.as_deref().unwrap_or(""),
            )
            .replace(prompts::COMPLETION_STRING_MARKER, &state.latest_text);
        batch.insert(
            state.task_id.clone(),
            ChatRequest::new(
                &orch.config.model,
                vec![
                    ChatMessage::system(prompts::VERIFICATION_SYSTEM),
                    ChatMessage::user(user_prompt),
                ],
            )
            .with_temperature(0.0),
        );
    }
    let responses = orch.llm.complete_batch(batch).await;

    let mut sends = Vec::new();
    for state in completions {
        let Some(content) = responses.get(&state.task_id) else {
            continue;
        };
        let Some(question) = parsing::verifying_question(content) else {
            warn!(task_id = %state.task_id, "unparseable verifying question");
            continue;
        };

        let memo_data = format!("{}{question}", TaskType::VerificationPrompt.sentinel());
        let memo = Memo::new(&state.task_id, &orch.config.node_name, memo_data);
        match orch
            .dispatch
            .send_memo(
                WalletKind::Node,
                &state.user_account,
                memo,
                1.0,
                false,
                orch.secrets.as_ref(),
            )
            .await
        {
            Ok(response_hash) => sends.push(TrackedSend {
                work_hash: state.latest_hash.clone(),
                user_account: state.user_account.clone(),
                memo_type: state.task_id.clone(),
                request_time: state.datetime.unwrap_or_else(chrono::Utc::now),
                response_hash,
                notes: question,
            }),
            Err(err) => {
                warn!(task_id = %state.task_id, %err, "failed to send verification prompt");
            }
        }
    }

    let node_address = orch.config.node_address.clone();
    orch.verify_and_record(RULE, &node_address, sends, |history, send| {
        history.entries().iter().any(|entry| {
            entry.direction == Direction::Outgoing
                && entry.user_account == send.user_account
                && entry.memo_type == send.memo_type
                && entry.memo_data.contains("VERIFICATION PROMPT")
        })
    })
    .await;
    Ok(())
}

//! Proposal queue: answer `REQUEST_POST_FIAT` memos with a proposed task.
//!
//! Two-phase generation: N candidate tasks are produced concurrently, then
//! a zero-temperature selector call picks the one to send.

use crate::context::build_user_context;
use crate::orchestrator::QueueOrchestrator;
use crate::verify::TrackedSend;
use crate::{parsing, prompts, Result};
use chrono::{DateTime, Utc};
use postfiat_config::TransactionRequirements;
use postfiat_llm::{ChatMessage, ChatRequest};
use postfiat_memo::{is_task_id, Memo};
use postfiat_state::tasks::TaskType;
use postfiat_state::{Direction, MemoHistory};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const RULE: &str = "task_proposal";

/// Sent when generation fails outright, so a requester is never left
/// waiting on a silent error.
const FALLBACK_TASK: &str =
    "Update and review your context document and ensure it is populated";
const FALLBACK_VALUE: u64 = 50;

#[derive(Debug)]
struct PendingRequest {
    task_id: String,
    user_account: String,
    request_text: String,
    request_time: DateTime<Utc>,
    request_hash: String,
}

/// A candidate `<task> .. <value>` line.
#[derive(Debug, Clone)]
struct Candidate {
    simplified: String,
}

/// Requests whose latest memo is still the request, which have never
/// received a proposal, and which carried the required PFT.
fn unprocessed_requests(
    history: &MemoHistory,
    requirements: &TransactionRequirements,
) -> Vec<PendingRequest> {
    struct TaskScan<'a> {
        latest_is_request: bool,
        has_proposal: bool,
        request: Option<&'a postfiat_state::MemoEntry>,
    }

    let mut scans: BTreeMap<&str, TaskScan> = BTreeMap::new();
    for entry in history.entries() {
        if !is_task_id(&entry.memo_type) {
            continue;
        }
        let classified = TaskType::classify(&entry.memo_data);
        let scan = scans.entry(&entry.memo_type).or_insert(TaskScan {
            latest_is_request: false,
            has_proposal: false,
            request: None,
        });
        scan.latest_is_request = classified == TaskType::RequestPostFiat;
        match classified {
            TaskType::Proposal => scan.has_proposal = true,
            TaskType::RequestPostFiat if scan.request.is_none() => {
                if requirements.meets_requirement(
                    &entry.destination,
                    Some(&entry.memo_type),
                    entry.pft_absolute_amount,
                ) {
                    scan.request = Some(entry);
                } else {
                    warn!(
                        task_id = %entry.memo_type,
                        amount = entry.pft_absolute_amount,
                        "request below PFT requirement, ignoring"
                    );
                }
            }
            _ => {}
        }
    }

    scans
        .values()
        .filter(|scan| scan.latest_is_request && !scan.has_proposal)
        .filter_map(|scan| scan.request)
        .map(|entry| PendingRequest {
            task_id: entry.memo_type.clone(),
            user_account: entry.user_account.clone(),
            request_text: TaskType::RequestPostFiat.strip(&entry.memo_data),
            request_time: entry.datetime,
            request_hash: entry.hash.clone(),
        })
        .collect()
}

pub(crate) async fn process(orch: &QueueOrchestrator, history: &MemoHistory) -> Result<()> {
    let requests = unprocessed_requests(history, &orch.config.requirements);
    if requests.is_empty() {
        return Ok(());
    }
    debug!(count = requests.len(), "processing task requests");

    let mut sends = Vec::new();
    for request in requests {
        let context = build_user_context(
            history,
            &request.user_account,
            orch.docs.as_ref(),
            orch.config.context_limits,
        )
        .await;

        let candidates = generate_candidates(orch, &context, &request.request_text).await;
        let chosen = select_candidate(orch, &context, &candidates).await;
        let proposal_data = format!("{}{}", TaskType::Proposal.sentinel(), chosen.simplified);

        let memo = Memo::new(&request.task_id, &orch.config.node_name, proposal_data);
        match orch
            .dispatch
            .send_memo(
                crate::WalletKind::Node,
                &request.user_account,
                memo,
                1.0,
                false,
                orch.secrets.as_ref(),
            )
            .await
        {
            Ok(response_hash) => sends.push(TrackedSend {
                work_hash: request.request_hash.clone(),
                user_account: request.user_account.clone(),
                memo_type: request.task_id.clone(),
                request_time: request.request_time,
                response_hash,
                notes: chosen.simplified.clone(),
            }),
            Err(err) => {
                warn!(task_id = %request.task_id, %err, "failed to send proposal");
                continue;
            }
        }
    }

    let node_address = orch.config.node_address.clone();
    let history_account = node_address.clone();
    orch.verify_and_record(RULE, &history_account, sends, move |history, send| {
        history.entries().iter().any(|entry| {
            entry.account == node_address
                && entry.direction == Direction::Outgoing
                && entry.user_account == send.user_account
                && entry.memo_type == send.memo_type
        })
    })
    .await;
    Ok(())
}

/// Phase A: N concurrent generation calls, each yielding one candidate.
async fn generate_candidates(
    orch: &QueueOrchestrator,
    context: &str,
    request_text: &str,
) -> Vec<Candidate> {
    let augmented_context = format!(
        "{context}\n<THE USER SPECIFIC TASK REQUEST STARTS HERE>\n{request_text}\n<THE USER SPECIFIC TASK REQUEST ENDS HERE>"
    );
    let user_prompt =
        prompts::TASK_GENERATION_USER.replace(prompts::FULL_USER_CONTEXT_MARKER, &augmented_context);

    let mut batch = BTreeMap::new();
    for index in 0..orch.config.task_candidates {
        batch.insert(
            format!("candidate_{index}"),
            ChatRequest::new(
                &orch.config.model,
                vec![
                    ChatMessage::system(prompts::TASK_GENERATION_SYSTEM),
                    ChatMessage::user(&user_prompt),
                ],
            ),
        );
    }

    let responses = orch.llm.complete_batch(batch).await;
    responses
        .values()
        .filter_map(|content| parsing::final_output(content))
        .map(|(task, value)| Candidate {
            simplified: format!("{task} .. {value}"),
        })
        .collect()
}

/// Phase B: one selector call over the candidate list; `| BEST OUTPUT | k |`
/// picks 1-based, defaulting to the first candidate on parse failure.
async fn select_candidate(
    orch: &QueueOrchestrator,
    context: &str,
    candidates: &[Candidate],
) -> Candidate {
    if candidates.is_empty() {
        warn!("task generation produced no parseable candidates, sending fallback");
        return Candidate {
            simplified: format!("{FALLBACK_TASK} .. {FALLBACK_VALUE}"),
        };
    }

    let options = candidates
        .iter()
        .map(|c| c.simplified.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let user_prompt = prompts::TASK_SELECTION_USER
        .replace(prompts::SELECTION_OPTION_MARKER, &options)
        .replace(prompts::FULL_USER_CONTEXT_MARKER, context);
    let request = ChatRequest::new(
        &orch.config.model,
        vec![
            ChatMessage::system(prompts::TASK_SELECTION_SYSTEM),
            ChatMessage::user(user_prompt),
        ],
    )
    .with_temperature(0.0);

    let choice = match orch.llm.complete(request).await {
        Ok(content) => parsing::best_output(&content),
        Err(err) => {
            warn!(%err, "task selection call failed, defaulting to first candidate");
            1
        }
    };
    candidates
        .get(choice.saturating_sub(1))
        .unwrap_or(&candidates[0])
        .clone()
}

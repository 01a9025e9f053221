//! User context assembly.
//!
//! Builds the bounded context string fed to task generation and reward
//! judging: recent task states per category, the user's linked planning
//! document, and their recent long-form memos. Every section is best-effort;
//! failures degrade to placeholder text rather than aborting the queue.

use crate::traits::DocFetcher;
use postfiat_config::{
    MAX_ACCEPTANCES_IN_CONTEXT, MAX_CHUNK_MESSAGES_IN_CONTEXT, MAX_PENDING_PROPOSALS_IN_CONTEXT,
    MAX_REFUSALS_IN_CONTEXT, MAX_REWARDS_IN_CONTEXT,
};
use postfiat_state::tasks::{
    accepted_proposals, pending_proposals, refused_proposals, rewarded_proposals,
    verification_proposals,
};
use postfiat_state::{MemoHistory, ProposalView};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Section caps, bounded to keep prompts under provider limits.
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    pub pending: usize,
    pub acceptances: usize,
    pub refusals: usize,
    pub rewards: usize,
    pub long_form_memos: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            pending: MAX_PENDING_PROPOSALS_IN_CONTEXT,
            acceptances: MAX_ACCEPTANCES_IN_CONTEXT,
            refusals: MAX_REFUSALS_IN_CONTEXT,
            rewards: MAX_REWARDS_IN_CONTEXT,
            long_form_memos: MAX_CHUNK_MESSAGES_IN_CONTEXT,
        }
    }
}

/// Assemble the full context string for one user. `node_history` is the
/// node's history; it is narrowed to the user's channel here.
pub async fn build_user_context(
    node_history: &MemoHistory,
    user_account: &str,
    docs: &dyn DocFetcher,
    limits: ContextLimits,
) -> String {
    let channel = node_history.filtered(|entry| entry.user_account == user_account);

    let mut proposals = pending_proposals(&channel);
    proposals.extend(accepted_proposals(&channel));
    let proposal_section = format_task_section(
        tail(proposals, limits.pending + limits.acceptances),
        "No pending or accepted proposals found.",
    );
    let refusal_section = format_task_section(
        tail(refused_proposals(&channel), limits.refusals),
        "No refused proposals found.",
    );
    let verification_section = format_task_section(
        tail(verification_proposals(&channel), limits.acceptances),
        "No tasks pending verification.",
    );
    let reward_section = format_task_section(
        tail(rewarded_proposals(&channel), limits.rewards),
        "No rewarded tasks found.",
    );

    let doc_section = match channel.google_doc_link(user_account) {
        Some(link) => match docs.fetch_verification_text(&link).await {
            Ok(text) => text,
            Err(err) => {
                warn!(user_account, %err, "planning document fetch failed");
                "Error retrieving planning document".to_string()
            }
        },
        None => "No planning document linked".to_string(),
    };

    let memo_section = channel
        .recent_long_form(user_account, limits.long_form_memos)
        .iter()
        .map(|entry| format!("[{}] {}", entry.datetime.format("%Y-%m-%d %H:%M"), entry.memo_data))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"***<<< ALL TASK GENERATION CONTEXT STARTS HERE >>>***

These are the proposed and accepted tasks that the user has. This is their
current work queue
<<PROPOSED AND ACCEPTED TASKS START HERE>>
{proposal_section}
<<PROPOSED AND ACCEPTED TASKS END HERE>>

These are the tasks the user has been proposed and has refused, with reasons
<<REFUSED TASKS START HERE>>
{refusal_section}
<<REFUSED TASKS END HERE>>

These are the tasks pending verification. The user needs to submit details
<<VERIFICATION TASKS START HERE>>
{verification_section}
<<VERIFICATION TASKS END HERE>>

<<REWARDED TASKS START HERE>>
{reward_section}
<<REWARDED TASKS END HERE>>

The following is the user's full planning document that they have assembled
to inform task generation and planning
<<USER PLANNING DOC STARTS HERE>>
{doc_section}
<<USER PLANNING DOC ENDS HERE>>

The following are the user's own comments regarding everything
<<USER COMMENTS AND LOGS START HERE>>
{memo_section}
<<USER COMMENTS AND LOGS END HERE>>

***<<< ALL TASK GENERATION CONTEXT ENDS HERE >>>***"#
    )
}

fn tail(mut views: Vec<ProposalView>, count: usize) -> Vec<ProposalView> {
    if views.len() > count {
        views.drain(..views.len() - count);
    }
    views
}

fn format_task_section(views: Vec<ProposalView>, empty_message: &str) -> String {
    if views.is_empty() {
        return empty_message.to_string();
    }
    views
        .iter()
        .map(|view| {
            let status = if view.status_text.is_empty() {
                "Pending response"
            } else {
                view.status_text.as_str()
            };
            format!(
                "Task ID: {}\nProposal: {}\nStatus: {}\n{}",
                view.task_id,
                view.proposal,
                status,
                "-".repeat(50)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the user-maintained verification section from a planning
/// document.
pub fn extract_verification_text(content: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?s)TASK VERIFICATION SECTION START(.*?)TASK VERIFICATION SECTION END")
            .unwrap()
    });
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoDocs;

    #[async_trait::async_trait]
    impl DocFetcher for NoDocs {
        async fn fetch_verification_text(&self, _link: &str) -> crate::Result<String> {
            Err(crate::EngineError::Doc("offline".to_string()))
        }
    }

    #[test]
    fn verification_text_extraction() {
        let doc = "preamble\nTASK VERIFICATION SECTION START\n evidence here \nTASK VERIFICATION SECTION END\ntrailer";
        assert_eq!(extract_verification_text(doc), "evidence here");
        assert_eq!(extract_verification_text("no markers"), "");
    }

    #[tokio::test]
    async fn context_sections_degrade_gracefully() {
        let history = MemoHistory::from_rows("rNODE", vec![]);
        let context =
            build_user_context(&history, "rUSER", &NoDocs, ContextLimits::default()).await;
        assert!(context.contains("No pending or accepted proposals found."));
        assert!(context.contains("No planning document linked"));
        assert!(context.contains("ALL TASK GENERATION CONTEXT ENDS HERE"));
    }
}

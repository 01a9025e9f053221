//! Task lifecycle classification.
//!
//! Every memo whose `memo_type` is a task id belongs to one task. The
//! latest state-changing memo decides the task's current stage; a REWARD
//! is terminal and later memos cannot regress it.

use crate::history::MemoHistory;
use chrono::{DateTime, Utc};
use postfiat_memo::is_task_id;
use std::collections::BTreeMap;

/// The canonical classifications of task memo payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    RequestPostFiat,
    Proposal,
    Acceptance,
    Refusal,
    TaskOutput,
    VerificationPrompt,
    VerificationResponse,
    Reward,
    /// Observed in the wild, cached, never acted upon.
    UserGenesis,
    NodeRequest,
    Unknown,
}

impl TaskType {
    /// The sentinel prefix used when composing a memo of this type.
    pub const fn sentinel(&self) -> &'static str {
        match self {
            Self::RequestPostFiat => "REQUEST_POST_FIAT ___ ",
            Self::Proposal => "PROPOSED PF ___ ",
            Self::Acceptance => "ACCEPTANCE REASON ___ ",
            Self::Refusal => "REFUSAL REASON ___ ",
            Self::TaskOutput => "COMPLETION JUSTIFICATION ___ ",
            Self::VerificationPrompt => "VERIFICATION PROMPT ___ ",
            Self::VerificationResponse => "VERIFICATION RESPONSE ___ ",
            Self::Reward => "REWARD RESPONSE __ ",
            Self::UserGenesis => "USER GENESIS __ ",
            Self::NodeRequest => "NODE REQUEST ___ ",
            Self::Unknown => "",
        }
    }

    /// Substring patterns that mark a payload as this type.
    const fn patterns(&self) -> &'static [&'static str] {
        match self {
            Self::Acceptance => &["ACCEPTANCE REASON ___"],
            Self::Proposal => &[" .. ", "PROPOSED PF ___"],
            Self::Refusal => &["REFUSAL REASON ___"],
            Self::VerificationPrompt => &["VERIFICATION PROMPT ___"],
            Self::VerificationResponse => &["VERIFICATION RESPONSE ___"],
            Self::Reward => &["REWARD RESPONSE __"],
            Self::TaskOutput => &["COMPLETION JUSTIFICATION ___"],
            Self::UserGenesis => &["USER GENESIS __"],
            Self::RequestPostFiat => &["REQUEST_POST_FIAT ___"],
            Self::NodeRequest => &["NODE REQUEST ___"],
            Self::Unknown => &[],
        }
    }

    /// Classify a memo payload. Match order follows the canonical pattern
    /// table; the first hit wins.
    pub fn classify(memo_data: &str) -> Self {
        const ORDER: [TaskType; 10] = [
            TaskType::Acceptance,
            TaskType::Proposal,
            TaskType::Refusal,
            TaskType::VerificationPrompt,
            TaskType::VerificationResponse,
            TaskType::Reward,
            TaskType::TaskOutput,
            TaskType::UserGenesis,
            TaskType::RequestPostFiat,
            TaskType::NodeRequest,
        ];
        for task_type in ORDER {
            if task_type
                .patterns()
                .iter()
                .any(|pattern| memo_data.contains(pattern))
            {
                return task_type;
            }
        }
        Self::Unknown
    }

    /// Whether this type advances a task's lifecycle after the proposal.
    const fn is_state_change(&self) -> bool {
        matches!(
            self,
            Self::Acceptance
                | Self::Refusal
                | Self::TaskOutput
                | Self::VerificationPrompt
                | Self::VerificationResponse
                | Self::Reward
        )
    }

    /// Strip this type's sentinel from a payload.
    pub fn strip(&self, memo_data: &str) -> String {
        let sentinel = self.sentinel();
        let trimmed = sentinel.trim_end();
        memo_data
            .strip_prefix(sentinel)
            .or_else(|| memo_data.strip_prefix(trimmed))
            .unwrap_or(memo_data)
            .trim()
            .to_string()
    }
}

/// The reduced state of one task.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub task_id: String,
    /// Full text of the first proposal memo, if any.
    pub proposal: Option<String>,
    /// The current stage: the latest state change, or Proposal.
    pub state: TaskType,
    /// Full text of the memo that set the current state.
    pub latest_text: String,
    /// Hash of the memo that set the current state.
    pub latest_hash: String,
    pub datetime: Option<DateTime<Utc>>,
    /// The user side of the channel.
    pub user_account: String,
}

/// A task surfaced by one of the per-state views, sentinel prefixes
/// stripped.
#[derive(Debug, Clone)]
pub struct ProposalView {
    pub task_id: String,
    pub proposal: String,
    pub status_text: String,
    pub user_account: String,
}

/// Reduce a history to per-task states, causally ordered within each task.
/// REWARD is terminal: once seen, later memos for that task are ignored.
pub fn task_states(history: &MemoHistory) -> BTreeMap<String, TaskState> {
    let mut states: BTreeMap<String, TaskState> = BTreeMap::new();

    for entry in history.entries() {
        if !is_task_id(&entry.memo_type) {
            continue;
        }
        let classified = TaskType::classify(&entry.memo_data);
        let state = states
            .entry(entry.memo_type.clone())
            .or_insert_with(|| TaskState {
                task_id: entry.memo_type.clone(),
                proposal: None,
                state: TaskType::Proposal,
                latest_text: String::new(),
                latest_hash: entry.hash.clone(),
                datetime: None,
                user_account: entry.user_account.clone(),
            });

        if classified == TaskType::Proposal && state.proposal.is_none() {
            state.proposal = Some(entry.memo_data.clone());
            state.datetime.get_or_insert(entry.datetime);
        } else if classified.is_state_change() && state.state != TaskType::Reward {
            state.state = classified;
            state.latest_text = entry.memo_data.clone();
            state.latest_hash = entry.hash.clone();
            state.datetime = Some(entry.datetime);
        }
    }
    states
}

fn view_for(state: &TaskState, status_type: TaskType) -> ProposalView {
    ProposalView {
        task_id: state.task_id.clone(),
        proposal: TaskType::Proposal.strip(state.proposal.as_deref().unwrap_or("")),
        status_text: status_type.strip(&state.latest_text),
        user_account: state.user_account.clone(),
    }
}

fn proposals_in_state(history: &MemoHistory, wanted: TaskType) -> Vec<ProposalView> {
    task_states(history)
        .values()
        .filter(|state| state.state == wanted && state.proposal.is_some())
        .map(|state| view_for(state, wanted))
        .collect()
}

/// Tasks proposed but not yet answered.
pub fn pending_proposals(history: &MemoHistory) -> Vec<ProposalView> {
    proposals_in_state(history, TaskType::Proposal)
}

pub fn accepted_proposals(history: &MemoHistory) -> Vec<ProposalView> {
    proposals_in_state(history, TaskType::Acceptance)
}

pub fn refused_proposals(history: &MemoHistory) -> Vec<ProposalView> {
    proposals_in_state(history, TaskType::Refusal)
}

pub fn verification_proposals(history: &MemoHistory) -> Vec<ProposalView> {
    proposals_in_state(history, TaskType::VerificationPrompt)
}

pub fn rewarded_proposals(history: &MemoHistory) -> Vec<ProposalView> {
    proposals_in_state(history, TaskType::Reward)
}

/// Tasks a user may still refuse: pending, accepted, or awaiting
/// verification. Refused and rewarded tasks are past the point of refusal.
pub fn refuseable_proposals(history: &MemoHistory) -> Vec<ProposalView> {
    let mut views = pending_proposals(history);
    views.extend(accepted_proposals(history));
    views.extend(verification_proposals(history));
    views.sort_by(|a, b| a.task_id.cmp(&b.task_id));
    views.dedup_by(|a, b| a.task_id == b.task_id);
    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::row;

    const TASK: &str = "2025-01-01_10:00__AA00";

    #[test]
    fn classification_matches_sentinels() {
        assert_eq!(
            TaskType::classify("REQUEST_POST_FIAT ___ build a report"),
            TaskType::RequestPostFiat
        );
        assert_eq!(
            TaskType::classify("PROPOSED PF ___ Write outline .. 60"),
            TaskType::Proposal
        );
        // The bare " .. " marker alone classifies as a proposal
        assert_eq!(TaskType::classify("Write outline .. 60"), TaskType::Proposal);
        assert_eq!(
            TaskType::classify("ACCEPTANCE REASON ___ on it"),
            TaskType::Acceptance
        );
        assert_eq!(
            TaskType::classify("COMPLETION JUSTIFICATION ___ did X"),
            TaskType::TaskOutput
        );
        assert_eq!(
            TaskType::classify("VERIFICATION RESPONSE ___ here is X"),
            TaskType::VerificationResponse
        );
        assert_eq!(TaskType::classify("REWARD RESPONSE __ good"), TaskType::Reward);
        assert_eq!(TaskType::classify("USER GENESIS __ hi"), TaskType::UserGenesis);
        assert_eq!(TaskType::classify("free text"), TaskType::Unknown);
    }

    #[test]
    fn lifecycle_progression() {
        let mut rows = vec![
            row("H0", "rUSER", "rNODE", TASK, "REQUEST_POST_FIAT ___ build", 0),
            row("H1", "rNODE", "rUSER", TASK, "PROPOSED PF ___ Build it .. 50", 1),
        ];
        let history = MemoHistory::from_rows("rNODE", rows.clone());
        let states = task_states(&history);
        assert_eq!(states[TASK].state, TaskType::Proposal);
        assert_eq!(pending_proposals(&history).len(), 1);

        rows.push(row("H2", "rUSER", "rNODE", TASK, "ACCEPTANCE REASON ___ on it", 2));
        let history = MemoHistory::from_rows("rNODE", rows.clone());
        assert_eq!(task_states(&history)[TASK].state, TaskType::Acceptance);
        assert!(pending_proposals(&history).is_empty());
        assert_eq!(accepted_proposals(&history).len(), 1);

        rows.push(row("H3", "rUSER", "rNODE", TASK, "COMPLETION JUSTIFICATION ___ did it", 3));
        rows.push(row("H4", "rNODE", "rUSER", TASK, "VERIFICATION PROMPT ___ show me", 4));
        let history = MemoHistory::from_rows("rNODE", rows.clone());
        assert_eq!(task_states(&history)[TASK].state, TaskType::VerificationPrompt);
        assert_eq!(verification_proposals(&history).len(), 1);

        rows.push(row("H5", "rUSER", "rNODE", TASK, "VERIFICATION RESPONSE ___ here", 5));
        rows.push(row("H6", "rNODE", "rUSER", TASK, "REWARD RESPONSE __ good", 6));
        let history = MemoHistory::from_rows("rNODE", rows.clone());
        let states = task_states(&history);
        assert_eq!(states[TASK].state, TaskType::Reward);
        assert_eq!(rewarded_proposals(&history).len(), 1);
    }

    #[test]
    fn reward_is_terminal() {
        let rows = vec![
            row("H1", "rNODE", "rUSER", TASK, "PROPOSED PF ___ Build it .. 50", 1),
            row("H2", "rNODE", "rUSER", TASK, "REWARD RESPONSE __ good", 2),
            // A stray acceptance after the reward must not regress the task.
            row("H3", "rUSER", "rNODE", TASK, "ACCEPTANCE REASON ___ late", 3),
        ];
        let history = MemoHistory::from_rows("rNODE", rows);
        assert_eq!(task_states(&history)[TASK].state, TaskType::Reward);
        assert!(accepted_proposals(&history).is_empty());
    }

    #[test]
    fn unknown_patterns_are_preserved_but_inert() {
        let rows = vec![
            row("H1", "rNODE", "rUSER", TASK, "PROPOSED PF ___ Build it .. 50", 1),
            row("H2", "rUSER", "rNODE", TASK, "USER GENESIS __ hello", 2),
            row("H3", "rUSER", "rNODE", TASK, "NODE REQUEST ___ something", 3),
        ];
        let history = MemoHistory::from_rows("rNODE", rows);
        // Neither memo advances the lifecycle.
        assert_eq!(task_states(&history)[TASK].state, TaskType::Proposal);
        assert_eq!(history.entries().len(), 3);
    }

    #[test]
    fn non_task_memo_types_are_ignored() {
        let rows = vec![row("H1", "rUSER", "rNODE", "HANDSHAKE", "ED0102", 0)];
        let history = MemoHistory::from_rows("rNODE", rows);
        assert!(task_states(&history).is_empty());
    }

    #[test]
    fn views_strip_sentinels() {
        let rows = vec![
            row("H1", "rNODE", "rUSER", TASK, "PROPOSED PF ___ Build it .. 50", 1),
            row("H2", "rUSER", "rNODE", TASK, "ACCEPTANCE REASON ___ on it", 2),
        ];
        let history = MemoHistory::from_rows("rNODE", rows);
        let views = accepted_proposals(&history);
        assert_eq!(views[0].proposal, "Build it .. 50");
        assert_eq!(views[0].status_text, "on it");
        assert_eq!(views[0].user_account, "rUSER");
    }

    #[test]
    fn refuseable_spans_three_states() {
        let task_b = "2025-01-01_11:00__BB00";
        let task_c = "2025-01-01_12:00__CC00";
        let rows = vec![
            row("H1", "rNODE", "rUSER", TASK, "PROPOSED PF ___ one .. 10", 1),
            row("H2", "rNODE", "rUSER", task_b, "PROPOSED PF ___ two .. 20", 2),
            row("H3", "rUSER", "rNODE", task_b, "ACCEPTANCE REASON ___ ok", 3),
            row("H4", "rNODE", "rUSER", task_c, "PROPOSED PF ___ three .. 30", 4),
            row("H5", "rUSER", "rNODE", task_c, "REFUSAL REASON ___ no", 5),
        ];
        let history = MemoHistory::from_rows("rNODE", rows);
        let refuseable = refuseable_proposals(&history);
        let ids: Vec<&str> = refuseable.iter().map(|v| v.task_id.as_str()).collect();
        assert_eq!(ids, vec![TASK, task_b]);
    }

    #[test]
    fn tie_break_on_same_timestamp_uses_ledger_then_hash() {
        let mut first = row("HA", "rUSER", "rNODE", TASK, "ACCEPTANCE REASON ___ a", 1);
        let mut second = row("HB", "rUSER", "rNODE", TASK, "REFUSAL REASON ___ b", 1);
        first.ledger_index = 100;
        second.ledger_index = 101;
        let rows = vec![
            row("H0", "rNODE", "rUSER", TASK, "PROPOSED PF ___ x .. 10", 0),
            second,
            first,
        ];
        let history = MemoHistory::from_rows("rNODE", rows);
        assert_eq!(task_states(&history)[TASK].state, TaskType::Refusal);
    }
}

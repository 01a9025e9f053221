//! Task identifiers: `YYYY-MM-DD_HH:MM` with an optional `__XXNN` suffix.
//!
//! The id doubles as the `memo_type` of every memo in a task's lifecycle.

use chrono::Utc;
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

const TASK_ID_PATTERN: &str = r"\d{4}-\d{2}-\d{2}_\d{2}:\d{2}(?:__[A-Z0-9]{4})?";

fn strict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{TASK_ID_PATTERN}$")).unwrap())
}

fn search_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TASK_ID_PATTERN).unwrap())
}

/// Whether the whole string is a task id.
pub fn is_task_id(candidate: &str) -> bool {
    strict_re().is_match(candidate)
}

/// Whether a task id appears anywhere in the string.
pub fn contains_task_id(text: &str) -> bool {
    search_re().is_match(text)
}

/// Mint a fresh task id: the current minute plus a random `LLDD` suffix.
pub fn generate_task_id() -> String {
    let mut rng = rand::thread_rng();
    let letters: String = (0..2)
        .map(|_| (b'A' + rng.gen_range(0..26)) as char)
        .collect();
    let digits: String = (0..2)
        .map(|_| (b'0' + rng.gen_range(0..10)) as char)
        .collect();
    format!(
        "{}__{letters}{digits}",
        Utc::now().format("%Y-%m-%d_%H:%M")
    )
}

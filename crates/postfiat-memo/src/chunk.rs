//! Chunking for memos that exceed the single-memo payload budget.
//!
//! Chunks share a `memo_type` and carry a 1-based `chunk_N__` label so the
//! receiver can reassemble in order.

use postfiat_config::PRE_CHUNK_PAYLOAD_BUDGET;
use regex::Regex;
use std::sync::OnceLock;

fn chunk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^chunk_(\d+)__").unwrap())
}

/// Split `text` into labelled chunks whose payloads stay within the
/// pre-chunk budget. Splits land on UTF-8 character boundaries.
pub fn split_into_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    let mut number = 1usize;
    while !rest.is_empty() {
        let mut end = rest.len().min(PRE_CHUNK_PAYLOAD_BUDGET);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        chunks.push(format!("chunk_{number}__{}", &rest[..end]));
        rest = &rest[end..];
        number += 1;
    }
    if chunks.is_empty() {
        chunks.push("chunk_1__".to_string());
    }
    chunks
}

/// Strip a leading `chunk_N__` label, if present.
pub fn strip_chunk_prefix(memo_data: &str) -> &str {
    match chunk_re().find(memo_data) {
        Some(m) => &memo_data[m.end()..],
        None => memo_data,
    }
}

/// The chunk number of a labelled payload, or `None` for unchunked memos.
pub fn chunk_number(memo_data: &str) -> Option<u32> {
    chunk_re()
        .captures(memo_data)
        .and_then(|caps| caps[1].parse().ok())
}

/// Whether a payload carries a chunk label.
pub fn is_chunked(memo_data: &str) -> bool {
    chunk_re().is_match(memo_data)
}

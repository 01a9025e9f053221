//! Memo history assembly: time-ordered, direction-tagged memo
//! sequences with chunk reassembly.

use chrono::{DateTime, Duration, Utc};
use postfiat_cache::MemoRow;
use postfiat_config::system_memo_types;
use postfiat_memo::{chunk_number, strip_chunk_prefix, unwrap_layers};
use std::collections::BTreeMap;

/// Transfer direction relative to the history's reference account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// One logical memo involving the reference account. Chunked memos are
/// collapsed into a single entry before they reach consumers.
#[derive(Debug, Clone)]
pub struct MemoEntry {
    pub hash: String,
    pub account: String,
    pub destination: String,
    /// The non-reference party of the transfer.
    pub user_account: String,
    pub direction: Direction,
    pub datetime: DateTime<Utc>,
    pub ledger_index: i64,
    pub memo_type: String,
    pub memo_format: String,
    pub memo_data: String,
    pub pft_absolute_amount: f64,
    pub directional_pft: f64,
    pub transaction_result: String,
    /// Whether this entry was reassembled from chunk rows (long-form).
    pub was_chunked: bool,
}

impl MemoEntry {
    pub fn is_successful(&self) -> bool {
        self.transaction_result == "tesSUCCESS"
    }

    fn from_row(reference: &str, row: MemoRow) -> Self {
        let direction = if row.destination == reference {
            Direction::Incoming
        } else {
            Direction::Outgoing
        };
        let user_account = if row.destination == reference {
            row.account.clone()
        } else {
            row.destination.clone()
        };
        Self {
            user_account,
            direction,
            hash: row.hash,
            account: row.account,
            destination: row.destination,
            datetime: row.datetime,
            ledger_index: row.ledger_index,
            memo_type: row.memo_type,
            memo_format: row.memo_format,
            memo_data: row.memo_data,
            pft_absolute_amount: row.pft_absolute_amount,
            directional_pft: row.directional_pft,
            transaction_result: row.transaction_result,
            was_chunked: false,
        }
    }
}

/// An account's full memo history, causally ordered by
/// (datetime, ledger_index, hash).
#[derive(Debug, Clone)]
pub struct MemoHistory {
    pub reference_account: String,
    entries: Vec<MemoEntry>,
}

impl MemoHistory {
    /// Build from cache rows: order, group chunk rows per
    /// (memo_type, sender), reassemble ascending by chunk number, and
    /// reverse the compression layer where possible.
    pub fn from_rows(reference_account: &str, rows: Vec<MemoRow>) -> Self {
        let mut raw: Vec<MemoEntry> = rows
            .into_iter()
            .map(|row| MemoEntry::from_row(reference_account, row))
            .collect();
        sort_causal(&mut raw);

        let mut entries = Vec::with_capacity(raw.len());
        let mut chunk_groups: BTreeMap<(String, String), Vec<MemoEntry>> = BTreeMap::new();

        for entry in raw {
            if chunk_number(&entry.memo_data).is_some() {
                chunk_groups
                    .entry((entry.memo_type.clone(), entry.account.clone()))
                    .or_default()
                    .push(entry);
            } else {
                entries.push(MemoEntry {
                    memo_data: unwrap_layers(&entry.memo_data, None),
                    ..entry
                });
            }
        }

        for (_, mut group) in chunk_groups {
            group.sort_by_key(|entry| chunk_number(&entry.memo_data).unwrap_or(u32::MAX));
            let joined: String = group
                .iter()
                .map(|entry| strip_chunk_prefix(&entry.memo_data))
                .collect();
            let pft_absolute: f64 = group.iter().map(|e| e.pft_absolute_amount).sum();
            let pft_directional: f64 = group.iter().map(|e| e.directional_pft).sum();
            // The last chunk's row represents the logical memo.
            let representative = group
                .pop()
                .expect("chunk groups are non-empty by construction");
            entries.push(MemoEntry {
                memo_data: unwrap_layers(&joined, None),
                pft_absolute_amount: pft_absolute,
                directional_pft: pft_directional,
                was_chunked: true,
                ..representative
            });
        }

        sort_causal(&mut entries);
        Self {
            reference_account: reference_account.to_string(),
            entries,
        }
    }

    pub fn entries(&self) -> &[MemoEntry] {
        &self.entries
    }

    /// A sub-history of entries matching the predicate (e.g. one
    /// counterparty), preserving order and the reference account.
    pub fn filtered(&self, predicate: impl Fn(&MemoEntry) -> bool) -> MemoHistory {
        MemoHistory {
            reference_account: self.reference_account.clone(),
            entries: self
                .entries
                .iter()
                .filter(|entry| predicate(entry))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counterparties that still have sealed (`WHISPER__`) entries after
    /// the keyless unwrap pass. Callers resolve each channel's secret and
    /// feed it back through [`MemoHistory::unseal_channel`].
    pub fn sealed_counterparties(&self) -> std::collections::BTreeSet<String> {
        self.entries
            .iter()
            .filter(|entry| postfiat_memo::is_encrypted(&entry.memo_data))
            .map(|entry| entry.user_account.clone())
            .collect()
    }

    /// Re-run layer unwrapping for one counterparty's sealed entries with
    /// the channel secret. Entries the secret cannot open stay sealed.
    pub fn unseal_channel(&mut self, counterparty: &str, secret: &[u8; 32]) {
        for entry in &mut self.entries {
            if entry.user_account == counterparty
                && postfiat_memo::is_encrypted(&entry.memo_data)
            {
                entry.memo_data = unwrap_layers(&entry.memo_data, Some(secret));
            }
        }
    }

    /// Entries whose `memo_type` equals the given type.
    pub fn of_type<'h>(&'h self, memo_type: &str) -> impl Iterator<Item = &'h MemoEntry> + 'h {
        let memo_type = memo_type.to_string();
        self.entries
            .iter()
            .filter(move |entry| entry.memo_type == memo_type)
    }

    /// The latest google-doc context link posted by an account.
    pub fn google_doc_link(&self, account: &str) -> Option<String> {
        self.entries
            .iter()
            .rev()
            .find(|entry| {
                entry.account == account
                    && entry.memo_type == system_memo_types::GOOGLE_DOC_CONTEXT_LINK
            })
            .map(|entry| entry.memo_data.clone())
    }

    /// The last `count` long-form (chunked) memos sent by an account,
    /// oldest first.
    pub fn recent_long_form(&self, account: &str, count: usize) -> Vec<&MemoEntry> {
        let mut memos: Vec<&MemoEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.was_chunked && entry.account == account)
            .collect();
        if memos.len() > count {
            memos.drain(..memos.len() - count);
        }
        memos
    }

    /// Reward memos received by an account within the trailing window.
    pub fn rewards_within(
        &self,
        account: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Vec<&MemoEntry> {
        let cutoff = now - Duration::days(window_days);
        self.entries
            .iter()
            .filter(|entry| {
                entry.destination == account
                    && entry.datetime >= cutoff
                    && entry.memo_data.contains("REWARD RESPONSE")
            })
            .collect()
    }
}

fn sort_causal(entries: &mut [MemoEntry]) {
    entries.sort_by(|a, b| {
        a.datetime
            .cmp(&b.datetime)
            .then(a.ledger_index.cmp(&b.ledger_index))
            .then(a.hash.cmp(&b.hash))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::row;
    use chrono::TimeZone;

    #[test]
    fn direction_and_counterparty_follow_reference() {
        let history = MemoHistory::from_rows(
            "rNODE",
            vec![
                row("H1", "rUSER", "rNODE", "T1", "hello", 0),
                row("H2", "rNODE", "rUSER", "T1", "reply", 1),
            ],
        );
        let entries = history.entries();
        assert_eq!(entries[0].direction, Direction::Incoming);
        assert_eq!(entries[0].user_account, "rUSER");
        assert_eq!(entries[1].direction, Direction::Outgoing);
        assert_eq!(entries[1].user_account, "rUSER");
    }

    #[test]
    fn chunk_rows_collapse_into_one_entry() {
        // Three chunks arriving out of order reassemble ascending by N.
        let history = MemoHistory::from_rows(
            "rNODE",
            vec![
                row("H2", "rUSER", "rNODE", "T2", "chunk_2__world ", 2),
                row("H1", "rUSER", "rNODE", "T2", "chunk_1__hello ", 1),
                row("H3", "rUSER", "rNODE", "T2", "chunk_3__again", 3),
            ],
        );
        assert_eq!(history.entries().len(), 1);
        let entry = &history.entries()[0];
        assert_eq!(entry.memo_data, "hello world again");
        assert!(entry.was_chunked);
        assert_eq!(entry.hash, "H3"); // last chunk is the representative
        assert_eq!(entry.directional_pft, 3.0); // group PFT sum
    }

    #[test]
    fn compressed_single_memo_is_unwrapped() {
        let compressed = postfiat_memo::compress_memo("the hidden text");
        let history = MemoHistory::from_rows(
            "rNODE",
            vec![row("H1", "rUSER", "rNODE", "T3", &compressed, 0)],
        );
        assert_eq!(history.entries()[0].memo_data, "the hidden text");
    }

    #[test]
    fn chunked_compressed_memo_reassembles_then_decompresses() {
        let payload = "long form dialogue ".repeat(100);
        let chunks = postfiat_memo::wrap_layers(&payload, true, None).unwrap();
        assert!(chunks.len() > 1);
        let rows: Vec<MemoRow> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| row(&format!("H{i}"), "rUSER", "rNODE", "T4", chunk, i as u32))
            .collect();
        let history = MemoHistory::from_rows("rNODE", rows);
        assert_eq!(history.entries().len(), 1);
        assert_eq!(history.entries()[0].memo_data, payload);
    }

    #[test]
    fn sealed_entries_open_with_the_channel_secret() {
        let secret = [42u8; 32];
        let sealed =
            postfiat_memo::encrypt_memo("VERIFICATION RESPONSE ___ here is X", &secret).unwrap();
        let mut history = MemoHistory::from_rows(
            "rNODE",
            vec![
                row("H1", "rUSER", "rNODE", "2025-01-01_10:00__AA00", &sealed, 0),
                row("H2", "rOTHER", "rNODE", "T9", "plain text", 1),
            ],
        );

        // Without the key the entry stays sealed and the channel is listed.
        assert!(history.entries()[0].memo_data.starts_with("WHISPER__"));
        let sealed_channels = history.sealed_counterparties();
        assert_eq!(sealed_channels.len(), 1);
        assert!(sealed_channels.contains("rUSER"));

        history.unseal_channel("rUSER", &secret);
        assert_eq!(
            history.entries()[0].memo_data,
            "VERIFICATION RESPONSE ___ here is X"
        );
        assert!(history.sealed_counterparties().is_empty());
    }

    #[test]
    fn wrong_channel_secret_leaves_entries_sealed() {
        let sealed = postfiat_memo::encrypt_memo("private", &[1u8; 32]).unwrap();
        let mut history = MemoHistory::from_rows(
            "rNODE",
            vec![row("H1", "rUSER", "rNODE", "T1", &sealed, 0)],
        );
        history.unseal_channel("rUSER", &[2u8; 32]);
        assert!(history.entries()[0].memo_data.starts_with("WHISPER__"));
    }

    #[test]
    fn google_doc_link_is_latest_from_account() {
        let history = MemoHistory::from_rows(
            "rNODE",
            vec![
                row("H1", "rUSER", "rNODE", "google_doc_context_link", "https://old", 0),
                row("H2", "rUSER", "rNODE", "google_doc_context_link", "https://new", 5),
            ],
        );
        assert_eq!(history.google_doc_link("rUSER").unwrap(), "https://new");
        assert!(history.google_doc_link("rOTHER").is_none());
    }

    #[test]
    fn rewards_window_filters_by_age_and_recipient() {
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        let mut old = row("H1", "rNODE", "rUSER", "2025-01-01_10:00", "REWARD RESPONSE __ ok", 0);
        old.datetime = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        let recent = row("H2", "rNODE", "rUSER", "2025-02-01_10:00", "REWARD RESPONSE __ good", 1);
        let history = MemoHistory::from_rows("rNODE", vec![old, recent]);
        let rewards = history.rewards_within("rUSER", 35, now);
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].hash, "H2");
    }
}

//! Shared builders for the crate's tests.

use chrono::{TimeZone, Utc};
use postfiat_cache::MemoRow;

/// A successful PFT memo row at 10:MM on 2025-01-01. Direction sign assumes
/// the reference account is `rNODE`.
pub fn row(
    hash: &str,
    account: &str,
    destination: &str,
    memo_type: &str,
    memo_data: &str,
    minute: u32,
) -> MemoRow {
    MemoRow {
        hash: hash.to_string(),
        account: account.to_string(),
        destination: destination.to_string(),
        ledger_index: 95_000_000 + minute as i64,
        datetime: Utc.with_ymd_and_hms(2025, 1, 1, 10, minute, 0).unwrap(),
        memo_type: memo_type.to_string(),
        memo_format: "alice".to_string(),
        memo_data: memo_data.to_string(),
        pft_absolute_amount: 1.0,
        directional_pft: if destination == "rNODE" { 1.0 } else { -1.0 },
        transaction_result: "tesSUCCESS".to_string(),
    }
}

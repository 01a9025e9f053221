//! Long-lived maintenance workers: the periodic history backfill and the
//! faster delta poll against a local node.

use postfiat_cache::TxCache;
use postfiat_config::PFT_HOLDER_TRACKING_THRESHOLD;
use postfiat_ledger::LedgerClient;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Periodically refresh the PFT holder set and backfill every tracked
/// account's full history into the cache. Inserts are idempotent, so this
/// worker may overlap the monitor and the delta poll freely.
pub async fn run_backfill(
    client: LedgerClient,
    cache: TxCache,
    issuer: String,
    tracked: Arc<RwLock<BTreeSet<String>>>,
    interval: Duration,
    refresh_holders: bool,
    mut stop: watch::Receiver<bool>,
) {
    info!(rpc = client.rpc_url(), ?interval, "backfill worker started");
    while !*stop.borrow() {
        if refresh_holders {
            match client.pft_holders(&issuer).await {
                Ok(holders) => {
                    let mut tracked = tracked.write().await;
                    for (account, balance) in holders {
                        if let Err(err) = cache.upsert_pft_holder(&account, balance).await {
                            warn!(%account, %err, "holder upsert failed");
                        }
                        if balance >= PFT_HOLDER_TRACKING_THRESHOLD {
                            tracked.insert(account);
                        }
                    }
                }
                Err(err) => warn!(%err, "PFT holder refresh failed"),
            }
        }

        let accounts: Vec<String> = tracked.read().await.iter().cloned().collect();
        let mut inserted = 0usize;
        for account in accounts {
            match client.fetch_account_history(&account, -1).await {
                Ok(records) => match cache.batch_insert(&records).await {
                    Ok(count) => inserted += count,
                    Err(err) => warn!(%account, %err, "backfill insert failed"),
                },
                Err(err) => warn!(%account, %err, "backfill fetch failed"),
            }
        }
        debug!(inserted, "backfill pass complete");

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop.changed() => break,
        }
    }
    info!("backfill worker stopped");
}

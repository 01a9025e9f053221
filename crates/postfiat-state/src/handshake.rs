//! Handshake registry: ECDH public-key exchange status per channel.
//!
//! A channel is the ordered pair (channel address, counterparty). Each side
//! publishes its key in a `HANDSHAKE` memo; once both directions are on
//! ledger the channel can carry encrypted memos either way.

use crate::history::{Direction, MemoHistory};
use chrono::{DateTime, Utc};
use postfiat_config::system_memo_types::HANDSHAKE;
use postfiat_memo::strip_chunk_prefix;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;

/// The two halves of a channel's key exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelKeys {
    /// Key the channel address sent to the counterparty.
    pub sent_key: Option<String>,
    /// Key received from the counterparty.
    pub received_key: Option<String>,
}

impl ChannelKeys {
    pub fn is_established(&self) -> bool {
        self.sent_key.is_some() && self.received_key.is_some()
    }
}

/// An unanswered incoming handshake.
#[derive(Debug, Clone)]
pub struct PendingHandshake {
    pub counterparty: String,
    pub public_key: String,
    pub datetime: DateTime<Utc>,
    /// Hash of the incoming handshake transaction.
    pub hash: String,
}

/// Read-through cache over handshake state. Correctness never depends on
/// the cache: only fully-established channels are memoized, everything else
/// re-reads history.
pub struct HandshakeRegistry {
    established: Mutex<HashMap<(String, String), ChannelKeys>>,
}

impl Default for HandshakeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeRegistry {
    pub fn new() -> Self {
        Self {
            established: Mutex::new(HashMap::new()),
        }
    }

    /// Latest handshake keys in both directions for a channel. `history`
    /// must be referenced on `channel_address`.
    pub fn channel_keys(
        &self,
        history: &MemoHistory,
        channel_address: &str,
        counterparty: &str,
    ) -> ChannelKeys {
        let cache_key = (channel_address.to_string(), counterparty.to_string());
        if let Some(keys) = self.established.lock().unwrap().get(&cache_key) {
            return keys.clone();
        }

        let mut keys = ChannelKeys::default();
        for entry in history.entries() {
            if entry.memo_type != HANDSHAKE || entry.user_account != counterparty {
                continue;
            }
            let key = strip_chunk_prefix(&entry.memo_data).to_string();
            match entry.direction {
                Direction::Outgoing => keys.sent_key = Some(key),
                Direction::Incoming => keys.received_key = Some(key),
            }
        }

        if keys.is_established() {
            debug!(channel_address, counterparty, "handshake channel established");
            self.established.lock().unwrap().insert(cache_key, keys.clone());
        }
        keys
    }

    /// The symmetric secret for a channel, once both handshake halves are
    /// on ledger: X25519 between our wallet seed and the counterparty's
    /// published key. `None` until the channel is established, which is
    /// what makes encrypted sends refuse early.
    pub fn channel_secret(
        &self,
        history: &MemoHistory,
        channel_address: &str,
        counterparty: &str,
        channel_seed: &str,
    ) -> postfiat_memo::Result<Option<[u8; 32]>> {
        let keys = self.channel_keys(history, channel_address, counterparty);
        match keys.received_key {
            Some(their_key) if keys.sent_key.is_some() => {
                postfiat_memo::shared_secret(&their_key, channel_seed).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Counterparties who sent a handshake to `address` and have not been
    /// answered. `history` must be referenced on `address`.
    pub fn pending_for(&self, history: &MemoHistory, address: &str) -> Vec<PendingHandshake> {
        let answered: HashSet<&str> = history
            .entries()
            .iter()
            .filter(|entry| {
                entry.memo_type == HANDSHAKE
                    && entry.account == address
                    && entry.direction == Direction::Outgoing
            })
            .map(|entry| entry.destination.as_str())
            .collect();

        let mut latest: HashMap<&str, PendingHandshake> = HashMap::new();
        for entry in history.entries() {
            if entry.memo_type != HANDSHAKE
                || entry.destination != address
                || answered.contains(entry.account.as_str())
            {
                continue;
            }
            latest.insert(
                entry.account.as_str(),
                PendingHandshake {
                    counterparty: entry.account.clone(),
                    public_key: strip_chunk_prefix(&entry.memo_data).to_string(),
                    datetime: entry.datetime,
                    hash: entry.hash.clone(),
                },
            );
        }
        let mut pending: Vec<PendingHandshake> = latest.into_values().collect();
        pending.sort_by(|a, b| a.counterparty.cmp(&b.counterparty));
        pending
    }
}

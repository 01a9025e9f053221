//! Derived views over cached ledger state.
//!
//! [`history`] assembles per-account memo sequences with chunk
//! reassembly, [`tasks`] reduces them to task lifecycle states, and
//! [`handshake`] tracks ECDH key exchange per channel. Everything here
//! is pure over in-memory data; the cache remains the source of truth.

pub mod handshake;
pub mod history;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testutil;

pub use handshake::{HandshakeRegistry, PendingHandshake};
pub use history::{Direction, MemoEntry, MemoHistory};
pub use tasks::{ProposalView, TaskState, TaskType};

//! The five processing queues. Each runs the same pass over the cycle's
//! working history: scan, call the LLM, send, verify on-ledger, record.

pub mod handshake;
pub mod initiation;
pub mod proposal;
pub mod reward;
pub mod verification;

//! Memo codec for the Post Fiat protocol.
//!
//! A memo travels on-ledger as three hex-encoded fields. Before hex encoding
//! the payload may pass through up to three layers, applied in this order on
//! send and reversed on receipt:
//!
//! 1. `COMPRESSED__`: Brotli, then Base64-url-safe
//! 2. `WHISPER__`:    ChaCha20-Poly1305 under an ECDH-derived key
//! 3. `chunk_N__`:    split across multiple on-chain memos
//!
//! Decoding is tolerant: a layer that fails to reverse logs a warning and
//! yields the raw input, never an error to the caller.

pub mod chunk;
pub mod cipher;
pub mod compress;
pub mod ecdh;
pub mod task_id;

mod memo;

pub use chunk::{chunk_number, split_into_chunks, strip_chunk_prefix};
pub use cipher::{decrypt_memo, encrypt_memo, is_encrypted, WHISPER_PREFIX};
pub use compress::{compress_memo, decompress_memo, is_compressed, COMPRESSED_PREFIX};
pub use ecdh::{ecdh_public_key_from_seed, encode_family_seed, shared_secret, SeedEntropy};
pub use memo::{Memo, WireMemo};
pub use task_id::{contains_task_id, generate_task_id, is_task_id};

use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum MemoError {
    #[error("invalid wallet seed: {0}")]
    InvalidSeed(String),

    #[error("malformed memo field: {0}")]
    MalformedMemo(String),

    #[error("decryption failed")]
    DecryptFailed,

    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

pub type Result<T> = std::result::Result<T, MemoError>;

/// Reverse the `WHISPER__` and `COMPRESSED__` layers of a memo payload.
///
/// Chunk reassembly happens upstream (the history builder joins chunk rows
/// before calling this). A missing shared secret, a wrong key, or corrupted
/// compression all fall back to returning the input unchanged.
pub fn unwrap_layers(memo_data: &str, shared_secret: Option<&[u8]>) -> String {
    let data = strip_chunk_prefix(memo_data);

    let decrypted = if is_encrypted(data) {
        match shared_secret {
            Some(secret) => match decrypt_memo(data, secret) {
                Ok(plain) => plain,
                Err(err) => {
                    warn!(%err, "memo decryption failed, returning raw data");
                    return memo_data.to_string();
                }
            },
            None => {
                warn!("encrypted memo with no channel secret, returning raw data");
                return memo_data.to_string();
            }
        }
    } else {
        data.to_string()
    };

    if is_compressed(&decrypted) {
        match decompress_memo(&decrypted) {
            Ok(plain) => plain,
            Err(err) => {
                warn!(%err, "memo decompression failed, returning raw data");
                memo_data.to_string()
            }
        }
    } else {
        decrypted
    }
}

/// Apply the send-side layers to a payload: optional compression, optional
/// encryption, then chunking when the result exceeds the single-memo budget.
pub fn wrap_layers(
    payload: &str,
    compress: bool,
    shared_secret: Option<&[u8]>,
) -> Result<Vec<String>> {
    let mut data = payload.to_string();
    if compress {
        data = compress_memo(&data);
    }
    if let Some(secret) = shared_secret {
        data = encrypt_memo(&data, secret)?;
    }
    if data.len() > postfiat_config::PRE_CHUNK_PAYLOAD_BUDGET {
        Ok(split_into_chunks(&data))
    } else {
        Ok(vec![data])
    }
}

//! The `WHISPER__` memo layer: ChaCha20-Poly1305 under an HKDF-expanded
//! ECDH shared secret. The wire form is the prefix plus
//! base64(nonce || ciphertext).

use crate::{MemoError, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

pub const WHISPER_PREFIX: &str = "WHISPER__";

const NONCE_LEN: usize = 12;
const HKDF_INFO: &[u8] = b"postfiat-memo-channel";

pub fn is_encrypted(memo_data: &str) -> bool {
    memo_data.starts_with(WHISPER_PREFIX)
}

fn channel_key(shared_secret: &[u8]) -> Result<Key> {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut okm = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut okm)
        .map_err(|err| MemoError::KeyDerivation(err.to_string()))?;
    Ok(Key::from(okm))
}

/// Encrypt a payload for the channel and wrap it with the `WHISPER__` prefix.
pub fn encrypt_memo(payload: &str, shared_secret: &[u8]) -> Result<String> {
    let cipher = ChaCha20Poly1305::new(&channel_key(shared_secret)?);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, payload.as_bytes())
        .map_err(|_| MemoError::DecryptFailed)?;

    let mut wire = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    wire.extend_from_slice(&nonce_bytes);
    wire.extend_from_slice(&ciphertext);
    Ok(format!("{WHISPER_PREFIX}{}", B64.encode(wire)))
}

/// Reverse [`encrypt_memo`]. Fails on a wrong key or tampered ciphertext.
pub fn decrypt_memo(memo_data: &str, shared_secret: &[u8]) -> Result<String> {
    let body = memo_data
        .strip_prefix(WHISPER_PREFIX)
        .ok_or(MemoError::DecryptFailed)?;
    let wire = B64.decode(body).map_err(|_| MemoError::DecryptFailed)?;
    if wire.len() <= NONCE_LEN {
        return Err(MemoError::DecryptFailed);
    }

    let (nonce_bytes, ciphertext) = wire.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(&channel_key(shared_secret)?);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| MemoError::DecryptFailed)?;

    String::from_utf8(plaintext).map_err(|_| MemoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: [u8; 32] = [42u8; 32];

    #[test]
    fn roundtrip() {
        let wire = encrypt_memo("a private note", &SECRET).unwrap();
        assert!(is_encrypted(&wire));
        assert_eq!(decrypt_memo(&wire, &SECRET).unwrap(), "a private note");
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let first = encrypt_memo("same text", &SECRET).unwrap();
        let second = encrypt_memo("same text", &SECRET).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_key_fails() {
        let wire = encrypt_memo("a private note", &SECRET).unwrap();
        assert!(decrypt_memo(&wire, &[1u8; 32]).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let wire = encrypt_memo("a private note", &SECRET).unwrap();
        let mut tampered = wire.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(decrypt_memo(&tampered, &SECRET).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary_strings(payload in ".{0,1000}") {
            let wire = encrypt_memo(&payload, &SECRET).unwrap();
            prop_assert_eq!(decrypt_memo(&wire, &SECRET).unwrap(), payload);
        }
    }
}

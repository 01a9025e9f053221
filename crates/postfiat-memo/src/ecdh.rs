//! ECDH key agreement over XRPL wallet seeds.
//!
//! The ledger's canonical ed25519 derivation is kept: the signing key is the
//! first half of SHA-512 over the seed entropy. For key agreement both sides
//! convert their ed25519 keys to Curve25519 and run X25519, so the handshake
//! can reuse the wallet keys users already hold.

use crate::{MemoError, Result};
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Prefix byte on serialized ed25519 keys ("ED" in hex).
const ED25519_PREFIX: u8 = 0xED;

/// secp256k1 family seed prefix.
const FAMILY_SEED_PREFIX: [u8; 1] = [0x21];

/// Ed25519 seed prefix ("sEd...").
const ED25519_SEED_PREFIX: [u8; 3] = [0x01, 0xE1, 0x4B];

/// The 16 bytes of entropy recovered from a wallet seed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SeedEntropy(pub [u8; 16]);

impl SeedEntropy {
    /// Decode an XRPL seed string (`s...` on the ripple base58 alphabet,
    /// 4-byte double-SHA-256 checksum).
    pub fn from_seed(seed: &str) -> Result<Self> {
        let decoded = bs58::decode(seed)
            .with_alphabet(bs58::Alphabet::RIPPLE)
            .into_vec()
            .map_err(|err| MemoError::InvalidSeed(format!("base58: {err}")))?;
        if decoded.len() < 5 {
            return Err(MemoError::InvalidSeed("seed too short".to_string()));
        }

        let (payload, checksum) = decoded.split_at(decoded.len() - 4);
        let digest = Sha256::digest(Sha256::digest(payload));
        if digest[..4] != *checksum {
            return Err(MemoError::InvalidSeed("checksum mismatch".to_string()));
        }

        let entropy = if payload.len() == 17 && payload[..1] == FAMILY_SEED_PREFIX {
            &payload[1..]
        } else if payload.len() == 19 && payload[..3] == ED25519_SEED_PREFIX {
            &payload[3..]
        } else {
            return Err(MemoError::InvalidSeed("unrecognized seed prefix".to_string()));
        };

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(entropy);
        Ok(Self(bytes))
    }

    /// The canonical ed25519 signing key: SHA-512 half of the entropy.
    pub fn signing_key(&self) -> SigningKey {
        let mut private = [0u8; 32];
        private.copy_from_slice(&Sha512::digest(self.0)[..32]);
        let key = SigningKey::from_bytes(&private);
        private.zeroize();
        key
    }
}

/// Encode raw entropy as a family seed string (`s...`). The inverse of
/// [`SeedEntropy::from_seed`]; used when minting wallets.
pub fn encode_family_seed(entropy: &[u8; 16]) -> String {
    let mut payload = FAMILY_SEED_PREFIX.to_vec();
    payload.extend_from_slice(entropy);
    let digest = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&digest[..4]);
    bs58::encode(payload)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_string()
}

/// The ECDH public key for a wallet seed, serialized the ledger way:
/// upper-hex, `ED`-prefixed 33 bytes.
pub fn ecdh_public_key_from_seed(seed: &str) -> Result<String> {
    let entropy = SeedEntropy::from_seed(seed)?;
    let verifying = entropy.signing_key().verifying_key();
    let mut serialized = vec![ED25519_PREFIX];
    serialized.extend_from_slice(verifying.as_bytes());
    Ok(hex::encode_upper(serialized))
}

/// X25519 shared secret between our seed and a received public key.
pub fn shared_secret(received_public_key: &str, channel_seed: &str) -> Result<[u8; 32]> {
    let entropy = SeedEntropy::from_seed(channel_seed)?;
    let signing = entropy.signing_key();

    // NaCl's sk-to-curve25519: clamped lower half of SHA-512 over the seed.
    // x25519-dalek clamps during the DH operation.
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&Sha512::digest(signing.to_bytes())[..32]);
    let secret = StaticSecret::from(scalar);
    scalar.zeroize();

    let their_edwards = parse_public_key(received_public_key)?;
    let their_montgomery = PublicKey::from(their_edwards.to_montgomery().to_bytes());

    Ok(secret.diffie_hellman(&their_montgomery).to_bytes())
}

fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|err| MemoError::MalformedMemo(format!("public key hex: {err}")))?;
    let raw: [u8; 32] = match bytes.len() {
        33 if bytes[0] == ED25519_PREFIX => bytes[1..]
            .try_into()
            .map_err(|_| MemoError::MalformedMemo("public key length".to_string()))?,
        32 => bytes
            .as_slice()
            .try_into()
            .map_err(|_| MemoError::MalformedMemo("public key length".to_string()))?,
        n => {
            return Err(MemoError::MalformedMemo(format!(
                "public key must be 32 or 33 bytes, got {n}"
            )))
        }
    };
    VerifyingKey::from_bytes(&raw)
        .map_err(|err| MemoError::MalformedMemo(format!("public key: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_seed(entropy: [u8; 16]) -> String {
        encode_family_seed(&entropy)
    }

    #[test]
    fn seed_roundtrip() {
        let entropy = [1u8; 16];
        let seed = test_seed(entropy);
        assert!(seed.starts_with('s'));
        let decoded = SeedEntropy::from_seed(&seed).unwrap();
        assert_eq!(decoded.0, entropy);
    }

    #[test]
    fn bad_checksum_rejected() {
        let seed = test_seed([2u8; 16]);
        let mut corrupted = seed.into_bytes();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == b'r' { b'p' } else { b'r' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert!(SeedEntropy::from_seed(&corrupted).is_err());
    }

    #[test]
    fn public_key_is_ed_prefixed_hex() {
        let key = ecdh_public_key_from_seed(&test_seed([3u8; 16])).unwrap();
        assert_eq!(key.len(), 66);
        assert!(key.starts_with("ED"));
        // Deterministic for a given seed
        assert_eq!(key, ecdh_public_key_from_seed(&test_seed([3u8; 16])).unwrap());
    }

    #[test]
    fn shared_secret_agrees_both_ways() {
        let seed_a = test_seed([4u8; 16]);
        let seed_b = test_seed([5u8; 16]);
        let pub_a = ecdh_public_key_from_seed(&seed_a).unwrap();
        let pub_b = ecdh_public_key_from_seed(&seed_b).unwrap();

        let ab = shared_secret(&pub_b, &seed_a).unwrap();
        let ba = shared_secret(&pub_a, &seed_b).unwrap();
        assert_eq!(ab, ba);
        assert_ne!(ab, [0u8; 32]);
    }

    #[test]
    fn distinct_pairs_distinct_secrets() {
        let seed_a = test_seed([6u8; 16]);
        let seed_b = test_seed([7u8; 16]);
        let seed_c = test_seed([8u8; 16]);
        let pub_b = ecdh_public_key_from_seed(&seed_b).unwrap();
        let pub_c = ecdh_public_key_from_seed(&seed_c).unwrap();
        assert_ne!(
            shared_secret(&pub_b, &seed_a).unwrap(),
            shared_secret(&pub_c, &seed_a).unwrap()
        );
    }
}

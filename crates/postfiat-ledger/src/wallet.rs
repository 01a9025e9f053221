//! Wallets: the node's signing identity, derived from an XRPL seed.

use crate::{LedgerError, Result};
use ed25519_dalek::{Signer, SigningKey};
use postfiat_memo::SeedEntropy;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Prefix byte on serialized ed25519 public keys.
const ED25519_PREFIX: u8 = 0xED;

/// Payload type prefix for classic addresses.
const ACCOUNT_ID_PREFIX: u8 = 0x00;

/// A signing wallet. The secret never leaves this struct; signing happens
/// in-process.
pub struct Wallet {
    signing_key: SigningKey,
    /// Upper-hex, `ED`-prefixed 33-byte public key.
    pub public_key_hex: String,
    /// The classic `r...` address.
    pub address: String,
}

impl Wallet {
    pub fn from_seed(seed: &str) -> Result<Self> {
        let entropy = SeedEntropy::from_seed(seed)
            .map_err(|err| LedgerError::InvalidAddress(err.to_string()))?;
        let signing_key = entropy.signing_key();
        let public_key = serialized_public_key(&signing_key);
        Ok(Self {
            public_key_hex: hex::encode_upper(&public_key),
            address: classic_address(&public_key),
            signing_key,
        })
    }

    /// Raw ed25519 signature over the prefixed serialized payload.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn serialized_public_key(signing_key: &SigningKey) -> Vec<u8> {
    let mut serialized = vec![ED25519_PREFIX];
    serialized.extend_from_slice(signing_key.verifying_key().as_bytes());
    serialized
}

/// Classic address: base58check(0x00 || RIPEMD160(SHA256(public key))) on the
/// ripple alphabet.
pub fn classic_address(serialized_public_key: &[u8]) -> String {
    let account_id = Ripemd160::digest(Sha256::digest(serialized_public_key));
    let mut payload = vec![ACCOUNT_ID_PREFIX];
    payload.extend_from_slice(&account_id);
    let checksum = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_string()
}

/// Decode a classic address back to its 20-byte account id.
pub fn decode_classic_address(address: &str) -> Result<[u8; 20]> {
    let decoded = bs58::decode(address)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_vec()
        .map_err(|err| LedgerError::InvalidAddress(format!("{address}: {err}")))?;
    if decoded.len() != 25 || decoded[0] != ACCOUNT_ID_PREFIX {
        return Err(LedgerError::InvalidAddress(address.to_string()));
    }
    let (payload, checksum) = decoded.split_at(21);
    let digest = Sha256::digest(Sha256::digest(payload));
    if digest[..4] != *checksum {
        return Err(LedgerError::InvalidAddress(format!(
            "{address}: checksum mismatch"
        )));
    }
    let mut account_id = [0u8; 20];
    account_id.copy_from_slice(&payload[1..]);
    Ok(account_id)
}

//! Encrypted on-disk store for node secrets.
//!
//! Values live in a single SQLite file as `(key, encrypted_value)` rows.
//! The symmetric key is derived from the operator password with Argon2id;
//! values are sealed with ChaCha20-Poly1305. The password is verified on
//! open by decrypting a canary credential (the Postgres connection string),
//! so a wrong password never yields a half-working store.

use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use postfiat_config::NodeConfig;
use rand::RngCore;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const CREDENTIALS_DB_FILENAME: &str = "credentials.sqlite";

/// Application-wide KDF salt. Changing it invalidates every stored value.
const KDF_SALT: &[u8] = b"postfiat_salt";

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid password")]
    InvalidPassword,

    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("value could not be decrypted: {0}")]
    Unsealable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Memo(#[from] postfiat_memo::MemoError),
}

pub type Result<T> = std::result::Result<T, CredentialError>;

/// Which stored wallet seed an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Node,
    Remembrancer,
}

impl SecretKind {
    /// The credential key holding this wallet's seed.
    pub fn credential_key(&self, config: &NodeConfig) -> Option<String> {
        match self {
            Self::Node => Some(config.node_seed_key()),
            Self::Remembrancer => config.remembrancer_seed_key(),
        }
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey([u8; 32]);

/// The open credential store. Holds the derived key in memory for the life
/// of the process; secrets are decrypted on demand.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    key: DerivedKey,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Open (or initialize) the store at the default location.
    pub fn open(password: &str) -> Result<Self> {
        Self::open_at(&default_db_path(), password)
    }

    /// Open the store at an explicit path, verifying the password against
    /// the canary credential when one exists.
    pub fn open_at(path: &Path, password: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS credentials (
                key TEXT PRIMARY KEY,
                encrypted_value TEXT NOT NULL
            )",
            [],
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            key: derive_key(password)?,
        };
        store.verify_password()?;
        debug!(path = %path.display(), "credential store opened");
        Ok(store)
    }

    /// Attempt to decrypt the canary row. A fresh store (no canary yet)
    /// accepts any password; it becomes fixed once credentials are written.
    fn verify_password(&self) -> Result<()> {
        let canary: Option<String> = self
            .conn
            .lock()
            .expect("credential store lock")
            .query_row(
                "SELECT encrypted_value FROM credentials
                 WHERE key LIKE '%postgresconnstring' LIMIT 1",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match canary {
            Some(sealed) => self
                .unseal(&sealed)
                .map(|_| ())
                .map_err(|_| CredentialError::InvalidPassword),
            None => Ok(()),
        }
    }

    pub fn get(&self, credential_key: &str) -> Result<String> {
        let sealed: String = self
            .conn
            .lock()
            .expect("credential store lock")
            .query_row(
                "SELECT encrypted_value FROM credentials WHERE key = ?1",
                [credential_key],
                |row| row.get(0),
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    CredentialError::CredentialNotFound(credential_key.to_string())
                }
                other => CredentialError::Database(other),
            })?;
        self.unseal(&sealed)
    }

    pub fn put(&self, credential_key: &str, value: &str) -> Result<()> {
        let sealed = self.seal(value)?;
        self.conn.lock().expect("credential store lock").execute(
            "INSERT OR REPLACE INTO credentials (key, encrypted_value) VALUES (?1, ?2)",
            [credential_key, sealed.as_str()],
        )?;
        Ok(())
    }

    /// Store a batch of credentials in one transaction.
    pub fn put_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let sealed: Vec<(String, String)> = entries
            .iter()
            .map(|(key, value)| Ok((key.to_string(), self.seal(value)?)))
            .collect::<Result<_>>()?;
        let mut conn = self.conn.lock().expect("credential store lock");
        let tx = conn.transaction()?;
        for (key, value) in &sealed {
            tx.execute(
                "INSERT OR REPLACE INTO credentials (key, encrypted_value) VALUES (?1, ?2)",
                [key.as_str(), value.as_str()],
            )?;
        }
        tx.commit()?;
        info!(count = entries.len(), "stored credentials");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("credential store lock");
        let mut stmt = conn.prepare("SELECT key FROM credentials ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Returns whether the credential existed.
    pub fn delete(&self, credential_key: &str) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .expect("credential store lock")
            .execute("DELETE FROM credentials WHERE key = ?1", [credential_key])?;
        Ok(deleted > 0)
    }

    /// The stored wallet seed for a secret kind.
    pub fn wallet_seed(&self, config: &NodeConfig, kind: SecretKind) -> Result<String> {
        let key = kind
            .credential_key(config)
            .ok_or_else(|| CredentialError::CredentialNotFound("remembrancer seed".to_string()))?;
        self.get(&key)
    }

    /// The ECDH public key for a stored wallet seed, hex-serialized.
    pub fn ecdh_public_key(&self, config: &NodeConfig, kind: SecretKind) -> Result<String> {
        let seed = self.wallet_seed(config, kind)?;
        Ok(postfiat_memo::ecdh_public_key_from_seed(&seed)?)
    }

    /// ECDH shared secret between a stored wallet seed and a received key.
    pub fn shared_secret(
        &self,
        config: &NodeConfig,
        kind: SecretKind,
        received_public_key: &str,
    ) -> Result<[u8; 32]> {
        let seed = self.wallet_seed(config, kind)?;
        Ok(postfiat_memo::shared_secret(received_public_key, &seed)?)
    }

    fn seal(&self, value: &str) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key.0));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(&Nonce::from(nonce_bytes), value.as_bytes())
            .map_err(|err| CredentialError::Unsealable(err.to_string()))?;
        let mut wire = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        wire.extend_from_slice(&nonce_bytes);
        wire.extend_from_slice(&ciphertext);
        Ok(B64.encode(wire))
    }

    fn unseal(&self, sealed: &str) -> Result<String> {
        let wire = B64
            .decode(sealed)
            .map_err(|err| CredentialError::Unsealable(err.to_string()))?;
        if wire.len() <= NONCE_LEN {
            return Err(CredentialError::Unsealable("value too short".to_string()));
        }
        let (nonce, ciphertext) = wire.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key.0));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialError::Unsealable("AEAD open failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|err| CredentialError::Unsealable(err.to_string()))
    }
}

fn derive_key(password: &str) -> Result<DerivedKey> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), KDF_SALT, &mut key)
        .map_err(|err| CredentialError::KeyDerivation(err.to_string()))?;
    Ok(DerivedKey(key))
}

/// Default path of the credentials database under the config directory.
pub fn default_db_path() -> PathBuf {
    postfiat_config::config_dir().join(CREDENTIALS_DB_FILENAME)
}

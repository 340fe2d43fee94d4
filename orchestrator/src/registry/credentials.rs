//! Per-module credential storage: a process-wide symmetric key encrypts
//! each module's credential payload before it touches disk. Grounded on
//! spec §4.9's `module_credentials(module_id PK, ciphertext, nonce, created_at)`.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::store;

use super::{RegistryError, RegistryResult};

/// Process-wide symmetric key. Never persisted — the process that encrypts
/// a credential must still be running (or hold the same key material) to
/// decrypt it.
#[derive(Clone)]
pub struct EncryptionKey(Key);

impl EncryptionKey {
    pub fn generate() -> Self {
        Self(ChaCha20Poly1305::generate_key(&mut OsRng))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(*Key::from_slice(&bytes))
    }
}

pub struct CredentialStore {
    db_path: std::path::PathBuf,
    key: EncryptionKey,
}

impl CredentialStore {
    pub fn new(db_path: impl Into<std::path::PathBuf>, key: EncryptionKey) -> Self {
        Self { db_path: db_path.into(), key }
    }

    /// Encrypt `plaintext` and upsert it for `module_id`. The plaintext
    /// itself is never written to disk or logged.
    pub fn put(&self, module_id: &str, plaintext: &[u8]) -> RegistryResult<()> {
        let cipher = ChaCha20Poly1305::new(&self.key.0);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| RegistryError::Encryption)?;

        let conn = store::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO module_credentials (module_id, ciphertext, nonce, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(module_id) DO UPDATE SET ciphertext = excluded.ciphertext, nonce = excluded.nonce",
            rusqlite::params![module_id, ciphertext, nonce.as_slice(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Fetch and decrypt the credential payload for `module_id`, if present.
    pub fn get(&self, module_id: &str) -> RegistryResult<Option<Vec<u8>>> {
        let conn = store::open(&self.db_path)?;
        let row: Option<(Vec<u8>, Vec<u8>)> = conn
            .query_row(
                "SELECT ciphertext, nonce FROM module_credentials WHERE module_id = ?1",
                rusqlite::params![module_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((ciphertext, nonce_bytes)) = row else { return Ok(None) };
        let nonce = Nonce::from_slice(&nonce_bytes);
        let cipher = ChaCha20Poly1305::new(&self.key.0);
        let plaintext = cipher.decrypt(nonce, ciphertext.as_slice()).map_err(|_| RegistryError::Decryption)?;
        Ok(Some(plaintext))
    }

    pub fn remove(&self, module_id: &str) -> RegistryResult<()> {
        let conn = store::open(&self.db_path)?;
        conn.execute("DELETE FROM module_credentials WHERE module_id = ?1", rusqlite::params![module_id])?;
        Ok(())
    }

    pub fn created_at(&self, module_id: &str) -> RegistryResult<Option<DateTime<Utc>>> {
        let conn = store::open(&self.db_path)?;
        let created_at: Option<String> = conn
            .query_row(
                "SELECT created_at FROM module_credentials WHERE module_id = ?1",
                rusqlite::params![module_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(created_at.map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)))
    }
}

//! # Session Keys
//!
//! A session key is the lowercase hex SHA-256 digest of a fresh UUIDv7.
//! The timestamp prefix of the UUID keeps generation time-ordered; hashing
//! hides it, along with the random part, from anyone holding the key.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Top-level store key of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Generate a new session key
///
/// Does not touch the store.
pub fn generate_session_key() -> SessionKey {
    key_from_id(Uuid::now_v7())
}

/// Hash an identifier into a session key
pub(crate) fn key_from_id(id: Uuid) -> SessionKey {
    let digest = Sha256::digest(id.to_string().as_bytes());
    SessionKey(format!("{:x}", digest))
}

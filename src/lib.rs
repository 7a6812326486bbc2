//! sessionkv - Sliding-expiration session records over a key-value store
//!
//! A session is one store key holding a map of named fields. Fields are
//! updated individually through an optimistic watch transaction, so writers
//! touching different fields of the same session never lose each other's
//! updates.
//!
//! ```no_run
//! use sessionkv::{ClientConfig, SessionStore};
//!
//! # fn main() -> sessionkv::SessionResult<()> {
//! let config = ClientConfig::new("127.0.0.1:6379", 0).with_lifetime_secs(1800);
//! let store = SessionStore::open(&config)?;
//!
//! let key = store.create_session()?;
//! store.set(&key, "profile", br#"{"id":"123"}"#)?;
//! let profile = store.get(&key, "profile")?;
//! store.destroy(&key)?;
//! # let _ = profile;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod observability;
pub mod session;

pub use backend::{Backend, Connection, MemoryBackend, TxOutcome};
pub use config::ClientConfig;
pub use session::{
    FieldMutation, Json, Record, SessionError, SessionKey, SessionResult, SessionStore,
    StoreValue,
};

//! # Sessions
//!
//! Sliding-expiration sessions whose fields live together in one stored
//! value.
//!
//! ## Invariants
//! - Every read or write that finds a session resets its expiration
//! - Field updates never overwrite a concurrent update to another field
//! - An empty record and an empty stored value are the same thing

pub mod codec;
pub mod errors;
pub mod key;
pub mod mutator;
pub mod reader;
pub mod store;
pub mod value;

pub use codec::Record;
pub use errors::{SessionError, SessionResult};
pub use key::{generate_session_key, SessionKey};
pub use mutator::{FieldMutation, OptimisticMutator, DEFAULT_MAX_RETRIES};
pub use reader::{ReadOutcome, SlidingReader};
pub use store::SessionStore;
pub use value::{Json, StoreValue};

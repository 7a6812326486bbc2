//! # Typed Payloads
//!
//! Payloads are opaque bytes to the store. [`StoreValue`] lets callers move
//! their own types in and out of a session field; [`Json`] covers any serde
//! type.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::SessionResult;

/// A value that can be kept in a session field
pub trait StoreValue: Sized {
    fn encode(&self) -> SessionResult<Vec<u8>>;

    fn decode(bytes: &[u8]) -> SessionResult<Self>;
}

/// JSON-encoded payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> StoreValue for Json<T> {
    fn encode(&self) -> SessionResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn decode(bytes: &[u8]) -> SessionResult<Self> {
        Ok(Json(serde_json::from_slice(bytes)?))
    }
}

impl StoreValue for Vec<u8> {
    fn encode(&self) -> SessionResult<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> SessionResult<Self> {
        Ok(bytes.to_vec())
    }
}

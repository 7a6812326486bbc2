//! # Record Codec
//!
//! Serializes a session's suffix→payload mapping into the single value kept
//! at the store.
//!
//! The stored form is a JSON object mapping each suffix to the standard,
//! padded base64 encoding of its payload. Keys are emitted in sorted order.
//!
//! ## Invariants
//! - The empty record encodes to empty bytes, never to `{}`
//! - Empty bytes and a top-level JSON `null` decode to the empty record
//! - Deleting the last field and never populating a record are indistinguishable

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::errors::{SessionError, SessionResult};

/// Decoded contents of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, Vec<u8>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload stored under `suffix`
    pub fn get(&self, suffix: &str) -> Option<&[u8]> {
        self.fields.get(suffix).map(Vec::as_slice)
    }

    /// Insert or overwrite a field
    pub fn insert(&mut self, suffix: impl Into<String>, payload: Vec<u8>) -> Option<Vec<u8>> {
        self.fields.insert(suffix.into(), payload)
    }

    /// Remove a field, returning its payload if it was present
    pub fn remove(&mut self, suffix: &str) -> Option<Vec<u8>> {
        self.fields.remove(suffix)
    }

    pub fn contains(&self, suffix: &str) -> bool {
        self.fields.contains_key(suffix)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Suffixes in sorted order
    pub fn suffixes(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Take the payload out of the record
    pub fn take(mut self, suffix: &str) -> Option<Vec<u8>> {
        self.fields.remove(suffix)
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<u8>)> for Record {
    fn from_iter<I: IntoIterator<Item = (S, Vec<u8>)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Encode a record into its stored form
pub fn encode(record: &Record) -> SessionResult<Vec<u8>> {
    if record.is_empty() {
        return Ok(Vec::new());
    }

    let wire: BTreeMap<&str, String> = record
        .fields
        .iter()
        .map(|(suffix, payload)| (suffix.as_str(), STANDARD.encode(payload)))
        .collect();

    Ok(serde_json::to_vec(&wire)?)
}

/// Decode a stored value into a record
///
/// A JSON `null` payload decodes as an empty payload, and a `null` record
/// as the empty record.
pub fn decode(bytes: &[u8]) -> SessionResult<Record> {
    if bytes.is_empty() {
        return Ok(Record::new());
    }

    let wire: Option<BTreeMap<String, Option<String>>> = serde_json::from_slice(bytes)?;
    let Some(wire) = wire else {
        return Ok(Record::new());
    };

    let mut fields = BTreeMap::new();
    for (suffix, encoded) in wire {
        let payload = match encoded {
            Some(text) => STANDARD.decode(text.as_bytes())?,
            None => Vec::new(),
        };
        fields.insert(suffix, payload);
    }

    Ok(Record { fields })
}

/// Decode, tagging failures as stored-data corruption
pub(crate) fn decode_stored(bytes: &[u8]) -> SessionResult<Record> {
    decode(bytes).map_err(|e| match e {
        SessionError::Codec(msg) => SessionError::Codec(format!("corrupted record: {}", msg)),
        other => other,
    })
}

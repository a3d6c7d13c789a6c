//! Content-addressed value cache for one consensus instance.
//!
//! QBFT messages quote values by 32-byte content hash; the transport owns
//! the binding from hash back to payload.  The store is populated from two
//! directions: the local QBFT machine caching a value it wants proposed,
//! and inbound messages unpacking the values they carry.  Entries are never
//! evicted — the store dies with its instance.

use {
    crate::{
        error::{ConsensusNetError, Result},
        message::{hash_envelope, AnyEnvelope},
    },
    qdv_consensus_qbft::ValueHash,
    std::{collections::HashMap, sync::Mutex},
};

/// Thread-safe mapping from content hash to value payload.
///
/// The inbound path writes while the broadcast path reads; the mutex guards
/// only map operations, never I/O.  Callers must ensure hash -> payload is
/// a function, which makes concurrent same-key writes idempotent.
#[derive(Debug, Default)]
pub struct ValueStore {
    values: Mutex<HashMap<ValueHash, AnyEnvelope>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge entries into the store, overwriting existing keys.
    pub fn put(&self, entries: impl IntoIterator<Item = (ValueHash, AnyEnvelope)>) {
        let mut values = self.values.lock().expect("value store lock poisoned");
        for (hash, envelope) in entries {
            values.insert(hash, envelope);
        }
    }

    /// Resolve a hash to its payload.
    pub fn get(&self, hash: ValueHash) -> Result<AnyEnvelope> {
        let values = self.values.lock().expect("value store lock poisoned");
        values
            .get(&hash)
            .cloned()
            .ok_or(ConsensusNetError::UnknownValue)
    }

    /// Hash a payload and store it, returning its handle.
    ///
    /// Used on the outbound path when the QBFT machine registers a value it
    /// wants to propose.
    pub fn cache(&self, envelope: AnyEnvelope) -> Result<ValueHash> {
        let hash = hash_envelope(&envelope)?;
        self.put([(hash, envelope)]);
        Ok(hash)
    }

    /// Number of distinct values held.
    pub fn len(&self) -> usize {
        self.values.lock().expect("value store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

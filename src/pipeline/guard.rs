//! In-flight guard
//!
//! Collapses concurrent redemptions of the same deposit inside one process.
//! Other processes are not covered; the destination contract's replay guard
//! still decides.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
}

/// Held while a redemption runs; releases the key on drop
#[derive(Debug)]
pub struct InFlightPermit {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if another task holds it
    pub fn try_acquire(&self, key: &str) -> Option<InFlightPermit> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(InFlightPermit {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

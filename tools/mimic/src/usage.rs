use crate::errors::MimicError;
use crate::fingerprint::Fingerprint;
use crate::store::RecordingStore;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Fingerprints looked up during the current run. Not persisted.
#[derive(Debug, Default)]
pub struct UsageTracker {
    used: Mutex<BTreeSet<Fingerprint>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_used(&self, key: &Fingerprint) {
        self.used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone());
    }

    pub fn is_used(&self, key: &Fingerprint) -> bool {
        self.used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(key)
    }

    pub fn reset(&self) {
        self.used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn used(&self) -> Vec<Fingerprint> {
        self.used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn unused(&self, all_keys: &[Fingerprint]) -> Vec<Fingerprint> {
        let used = self
            .used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        all_keys
            .iter()
            .filter(|key| !used.contains(*key))
            .cloned()
            .collect()
    }

    /// Deletes `keys` from the store; returns how many recordings existed.
    pub fn clear(&self, keys: &[Fingerprint], store: &RecordingStore) -> Result<usize, MimicError> {
        let mut removed = 0;
        for key in keys {
            if store.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

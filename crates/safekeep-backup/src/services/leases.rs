use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// What a lease protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseKey {
    /// A backup pipeline is producing this backup
    Backup(i32),
    /// A restore pipeline is running this restore
    Restore(i32),
    /// A restore is reading this backup's archive
    BackupRead(i32),
}

impl LeaseKey {
    fn is_shared(&self) -> bool {
        matches!(self, LeaseKey::BackupRead(_))
    }
}

/// In-process registry of running operations, keyed by row id.
///
/// `Backup` and `Restore` keys are exclusive; `BackupRead` may be held by
/// several restores of the same backup at once.
#[derive(Debug, Clone, Default)]
pub struct OperationLeases {
    held: Arc<Mutex<HashMap<LeaseKey, usize>>>,
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct Lease {
    key: LeaseKey,
    held: Arc<Mutex<HashMap<LeaseKey, usize>>>,
}

impl OperationLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `key`, or `None` if an exclusive holder already has it.
    pub fn try_acquire(&self, key: LeaseKey) -> Option<Lease> {
        self.try_acquire_unless(key, &[])
    }

    /// Take `key` only if none of `blockers` is currently held. The check and
    /// the acquisition happen under one lock.
    pub fn try_acquire_unless(&self, key: LeaseKey, blockers: &[LeaseKey]) -> Option<Lease> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if blockers
            .iter()
            .any(|b| held.get(b).copied().unwrap_or(0) > 0)
        {
            return None;
        }
        let count = held.get(&key).copied().unwrap_or(0);
        if count > 0 && !key.is_shared() {
            return None;
        }
        held.insert(key, count + 1);
        Some(Lease {
            key,
            held: self.held.clone(),
        })
    }

    pub fn is_held(&self, key: LeaseKey) -> bool {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.get(&key).copied().unwrap_or(0) > 0
    }
}

impl Lease {
    pub fn key(&self) -> LeaseKey {
        self.key
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = held.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                held.remove(&self.key);
            }
        }
    }
}

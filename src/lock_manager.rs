use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::SmallError;
use crate::page_id::HeapPageId;
use crate::transaction_id::TransactionId;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

#[derive(Default)]
struct LockEntry {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockEntry {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}

/// Per-page shared/exclusive lock table implementing two-phase locking.
///
/// Deadlocks are resolved purely by timeout: a blocked request gives up
/// after `shared_lock_timeout` (for `ReadOnly`) or `exclusive_lock_timeout`
/// (for `ReadWrite`), deliberately asymmetric so writers do not starve
/// behind a crowd of readers. There is no waits-for graph.
pub struct LockManager {
    state: Mutex<HashMap<HeapPageId, LockEntry>>,
    condvar: Condvar,
    shared_lock_timeout: Duration,
    exclusive_lock_timeout: Duration,
}

impl LockManager {
    pub fn new(shared_lock_timeout_ms: u64, exclusive_lock_timeout_ms: u64) -> LockManager {
        LockManager {
            state: Mutex::new(HashMap::new()),
            condvar: Condvar::new(),
            shared_lock_timeout: Duration::from_millis(shared_lock_timeout_ms),
            exclusive_lock_timeout: Duration::from_millis(exclusive_lock_timeout_ms),
        }
    }

    pub fn acquire(&self, tid: TransactionId, page_id: HeapPageId, perm: Permission) -> Result<(), SmallError> {
        let timeout = match perm {
            Permission::ReadOnly => self.shared_lock_timeout,
            Permission::ReadWrite => self.exclusive_lock_timeout,
        };
        let deadline = Instant::now() + timeout;

        let mut guard = self.state.lock().unwrap();
        loop {
            let entry = guard.entry(page_id).or_insert_with(LockEntry::default);
            if Self::try_grant(entry, tid, perm) {
                debug!("tid {} granted {:?} lock on {}", tid, perm, page_id);
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("tid {} timed out waiting for {:?} lock on {}", tid, perm, page_id);
                return Err(SmallError::transaction_aborted(&format!(
                    "timed out waiting for {:?} lock on page {}",
                    perm, page_id
                )));
            }

            let wait_for = (deadline - now).min(POLL_INTERVAL);
            let (g, _timed_out) = self.condvar.wait_timeout(guard, wait_for).unwrap();
            guard = g;
        }
    }

    /// Returns true and mutates `entry` if the lock was grantable.
    fn try_grant(entry: &mut LockEntry, tid: TransactionId, perm: Permission) -> bool {
        match perm {
            Permission::ReadOnly => {
                if entry.exclusive.is_none() || entry.exclusive == Some(tid) {
                    entry.shared.insert(tid);
                    true
                } else {
                    false
                }
            }
            Permission::ReadWrite => {
                if entry.exclusive == Some(tid) {
                    true
                } else if entry.exclusive.is_none()
                    && (entry.shared.is_empty() || (entry.shared.len() == 1 && entry.shared.contains(&tid)))
                {
                    entry.shared.remove(&tid);
                    entry.exclusive = Some(tid);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// True iff `tid` is a shared holder or the sole exclusive holder of
    /// `page_id`.
    pub fn holds_lock(&self, tid: TransactionId, page_id: HeapPageId) -> bool {
        let guard = self.state.lock().unwrap();
        match guard.get(&page_id) {
            Some(entry) => entry.shared.contains(&tid) || entry.exclusive == Some(tid),
            None => false,
        }
    }

    pub fn release(&self, tid: TransactionId, page_id: HeapPageId) {
        let mut guard = self.state.lock().unwrap();
        if let Some(entry) = guard.get_mut(&page_id) {
            entry.shared.remove(&tid);
            if entry.exclusive == Some(tid) {
                entry.exclusive = None;
            }
            if entry.is_free() {
                guard.remove(&page_id);
            }
        }
        drop(guard);
        self.condvar.notify_all();
    }

    /// Releases every lock held by `tid`, across all pages. Called once per
    /// transaction, at `transaction_complete`.
    pub fn release_all(&self, tid: TransactionId) {
        let mut guard = self.state.lock().unwrap();
        guard.retain(|_, entry| {
            entry.shared.remove(&tid);
            if entry.exclusive == Some(tid) {
                entry.exclusive = None;
            }
            !entry.is_free()
        });
        drop(guard);
        self.condvar.notify_all();
    }
}

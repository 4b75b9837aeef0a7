use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

/// A process-unique, monotonically increasing transaction identifier.
///
/// Production deployments may generate their own ids (e.g. handed out by a
/// transaction manager that spans more than this storage core); this counter
/// is what the core uses for tests and standalone use.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TransactionId {
    id: i64,
}

impl TransactionId {
    pub fn new() -> TransactionId {
        TransactionId {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
        }
    }

    pub fn get_id(&self) -> i64 {
        self.id
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        TransactionId::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "tid({})", self.id)
    }
}

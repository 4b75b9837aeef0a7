use std::fmt;

use backtrace::Backtrace;

/// Error taxonomy for the storage core.
///
/// Every variant carries an owned message; callers match on the variant, not
/// the message text, to decide how to react (retry, abort the transaction,
/// propagate).
#[derive(Debug)]
pub enum SmallError {
    /// Lock-wait deadline exceeded, or an invariant tripped mid-transaction.
    /// The caller must respond with `transaction_complete(tid, false)`.
    TransactionAborted(String),

    /// Logical storage error: all buffer pool pages dirty at eviction time,
    /// missing catalog entry, schema mismatch, duplicate BEGIN, etc.
    DbException(String),

    /// I/O layer failure (disk read/write, log append, bad file length).
    IoError(String),

    /// A caller-supplied argument is out of range or unsupported.
    InvalidArgument(String),

    /// Something expected to exist was not found (iterator exhausted where
    /// the API reports via error, unknown tid, unknown catalog entry).
    NotFound(String),
}

impl SmallError {
    pub fn new(message: &str) -> SmallError {
        SmallError::DbException(message.to_string())
    }

    pub fn transaction_aborted(message: &str) -> SmallError {
        SmallError::TransactionAborted(message.to_string())
    }

    pub fn not_found(message: &str) -> SmallError {
        SmallError::NotFound(message.to_string())
    }

    pub fn invalid_argument(message: &str) -> SmallError {
        SmallError::InvalidArgument(message.to_string())
    }

    /// Dumps a backtrace to the log at error level. Reserved for cases where
    /// the call site alone won't explain how an invariant got violated
    /// (deadlock abort, corrupted log frame).
    pub fn show_backtrace(&self) {
        let bt = Backtrace::new();
        log::error!("{}\n{:?}", self, bt);
    }
}

impl fmt::Display for SmallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SmallError::TransactionAborted(m) => write!(f, "transaction aborted: {}", m),
            SmallError::DbException(m) => write!(f, "db exception: {}", m),
            SmallError::IoError(m) => write!(f, "io error: {}", m),
            SmallError::InvalidArgument(m) => write!(f, "invalid argument: {}", m),
            SmallError::NotFound(m) => write!(f, "not found: {}", m),
        }
    }
}

impl std::error::Error for SmallError {}

impl From<std::io::Error> for SmallError {
    fn from(e: std::io::Error) -> Self {
        SmallError::IoError(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for SmallError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        SmallError::IoError(e.to_string())
    }
}

pub type SmallResult = Result<(), SmallError>;

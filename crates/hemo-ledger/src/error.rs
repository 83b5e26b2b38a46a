use std::io;

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The chain is broken or an entry's contents do not match its hash.
    /// Detection halts all further writes against the ledger.
    #[error("integrity violation at seq {seq}: {reason}")]
    IntegrityViolation { seq: u64, reason: String },

    /// The tail moved between the caller's snapshot and its append.
    /// Transient; retry against the new tail.
    #[error("concurrent append conflict: expected tail seq {expected}, found {actual}")]
    ConcurrentAppendConflict { expected: u64, actual: u64 },

    /// A prior integrity violation halted this ledger.
    #[error("ledger is halted after an integrity violation")]
    Halted,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl LedgerError {
    /// `true` when the caller may retry the operation against the new tail.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConcurrentAppendConflict { .. })
    }
}

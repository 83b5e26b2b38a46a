use hemo_ledger::LedgerError;

/// Errors produced while folding the ledger.
///
/// The workflows refuse invalid transitions at append time, so a valid
/// ledger never produces these; they surface only for hand-built or
/// corrupted histories.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("malformed subject id in entry {seq}: {subject}")]
    MalformedSubject { seq: u64, subject: String },

    #[error("entry {seq} addresses unknown subject {subject}")]
    UnknownSubject { seq: u64, subject: String },

    #[error("entry {seq} applies {action} to {subject} in state {from}")]
    InvalidTransition {
        seq: u64,
        subject: String,
        action: String,
        from: String,
    },

    #[error("entry {seq} re-creates existing subject {subject}")]
    DuplicateSubject { seq: u64, subject: String },

    #[error("entry {seq} applied out of order (projection is at seq {at})")]
    OutOfOrder { seq: u64, at: u64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

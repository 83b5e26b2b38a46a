use chrono::{DateTime, Utc};

use crate::entry::{EntryDraft, HeadRef, LedgerEntry, Subject};
use crate::error::LedgerError;

/// Write boundary: the sole path through which state changes are recorded.
pub trait LedgerWriter: Send + Sync {
    /// Append a single entry against whatever the current tail is.
    fn append(&self, draft: EntryDraft) -> Result<LedgerEntry, LedgerError>;

    /// Append several entries atomically: either all are appended in order
    /// or none are.
    fn append_batch(&self, drafts: Vec<EntryDraft>) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Append atomically, but only if the tail still matches
    /// `expected_head` (`None` = the ledger must be empty). Fails with
    /// [`LedgerError::ConcurrentAppendConflict`] otherwise; the caller
    /// re-reads the tail and retries.
    fn append_batch_at(
        &self,
        expected_head: Option<HeadRef>,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;
}

/// Read boundary for queries, projection, and verification.
pub trait LedgerReader: Send + Sync {
    /// Reference to the current tail entry, `None` when empty.
    fn head(&self) -> Result<Option<HeadRef>, LedgerError>;

    /// Number of entries.
    fn len(&self) -> Result<u64, LedgerError>;

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// Entry by sequence number, `None` when out of range.
    fn entry(&self, seq: u64) -> Result<Option<LedgerEntry>, LedgerError>;

    /// All entries in sequence order.
    fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Entries with sequence numbers strictly greater than `seq`, in order.
    fn read_since(&self, seq: u64) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Full history of one subject, oldest first.
    fn read_subject(&self, subject: &Subject) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Entries whose timestamps fall within `[from, to]`, in sequence order.
    fn read_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Everything one actor did, newest first.
    fn read_by_actor(&self, actor_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// The most recent `n` entries, newest first.
    fn read_recent(&self, n: usize) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Recompute every entry's hash and link; returns the first mismatching
    /// sequence number. A failure halts all further writes.
    fn verify_chain(&self) -> Result<(), LedgerError>;
}

/// Combined ledger boundary.
pub trait Ledger: LedgerWriter + LedgerReader {}

impl<T: LedgerWriter + LedgerReader> Ledger for T {}

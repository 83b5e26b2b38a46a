use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::entry::{EntryDraft, HeadRef, LedgerEntry, Subject};
use crate::error::LedgerError;
use crate::state::LedgerState;
use crate::traits::{LedgerReader, LedgerWriter};

/// In-memory ledger for tests, demos, and embedding.
///
/// All appends are serialized under the write lock, held only around the
/// read-tail/seal/commit step. Reads proceed concurrently. Once an
/// integrity violation is detected the ledger halts: every subsequent
/// append fails with [`LedgerError::Halted`].
#[derive(Default)]
pub struct InMemoryLedger {
    inner: RwLock<LedgerState>,
    halted: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_inner(
        &self,
        expected_head: Option<Option<HeadRef>>,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(LedgerError::Halted);
        }
        if drafts.is_empty() {
            return Ok(vec![]);
        }

        let mut state = write_lock(&self.inner)?;
        if let Some(expected) = expected_head {
            state.check_head(expected)?;
        }

        let sealed = state.seal_drafts(drafts)?;
        state.commit(&sealed);
        debug!(
            first_seq = sealed[0].seq,
            count = sealed.len(),
            tail = %hemo_crypto::short_hex(&sealed[sealed.len() - 1].hash),
            "ledger append"
        );
        Ok(sealed)
    }
}

impl LedgerWriter for InMemoryLedger {
    fn append(&self, draft: EntryDraft) -> Result<LedgerEntry, LedgerError> {
        let mut sealed = self.append_inner(None, vec![draft])?;
        Ok(sealed.remove(0))
    }

    fn append_batch(&self, drafts: Vec<EntryDraft>) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.append_inner(None, drafts)
    }

    fn append_batch_at(
        &self,
        expected_head: Option<HeadRef>,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.append_inner(Some(expected_head), drafts)
    }
}

impl LedgerReader for InMemoryLedger {
    fn head(&self) -> Result<Option<HeadRef>, LedgerError> {
        Ok(read_lock(&self.inner)?.head())
    }

    fn len(&self) -> Result<u64, LedgerError> {
        Ok(read_lock(&self.inner)?.len())
    }

    fn entry(&self, seq: u64) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.entry(seq))
    }

    fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.entries().to_vec())
    }

    fn read_since(&self, seq: u64) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_since(seq))
    }

    fn read_subject(&self, subject: &Subject) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_subject(subject))
    }

    fn read_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_between(from, to))
    }

    fn read_by_actor(&self, actor_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_by_actor(actor_id))
    }

    fn read_recent(&self, n: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_recent(n))
    }

    fn verify_chain(&self) -> Result<(), LedgerError> {
        let result = read_lock(&self.inner)?.verify();
        if let Err(LedgerError::IntegrityViolation { seq, reason }) = &result {
            warn!(seq, reason = %reason, "chain verification failed; halting ledger");
            self.halted.store(true, Ordering::SeqCst);
        }
        result
    }
}

pub(crate) fn read_lock<T>(
    lock: &RwLock<T>,
) -> Result<std::sync::RwLockReadGuard<'_, T>, LedgerError> {
    lock.read().map_err(|_| LedgerError::IntegrityViolation {
        seq: 0,
        reason: "ledger read lock poisoned".into(),
    })
}

pub(crate) fn write_lock<T>(
    lock: &RwLock<T>,
) -> Result<std::sync::RwLockWriteGuard<'_, T>, LedgerError> {
    lock.write().map_err(|_| LedgerError::IntegrityViolation {
        seq: 0,
        reason: "ledger write lock poisoned".into(),
    })
}

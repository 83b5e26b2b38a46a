use std::collections::HashMap;

use chrono::{DateTime, Utc};

use hemo_crypto::{ChainError, HashChainVerifier};

use crate::entry::{EntryDraft, HeadRef, LedgerEntry, Subject, SubjectKind};
use crate::error::LedgerError;

/// Shared in-memory chain state used by both ledger backends.
#[derive(Default)]
pub(crate) struct LedgerState {
    entries: Vec<LedgerEntry>,
    subject_index: HashMap<(SubjectKind, String), Vec<u64>>,
}

impl LedgerState {
    pub(crate) fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        let mut state = Self::default();
        for entry in entries {
            state.index(&entry);
            state.entries.push(entry);
        }
        state
    }

    pub(crate) fn head(&self) -> Option<HeadRef> {
        self.entries.last().map(LedgerEntry::head_ref)
    }

    pub(crate) fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub(crate) fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Optimistic concurrency check against the current tail.
    pub(crate) fn check_head(&self, expected: Option<HeadRef>) -> Result<(), LedgerError> {
        let actual = self.head();
        match (expected, actual) {
            (None, None) => Ok(()),
            (Some(e), Some(a)) if e == a => Ok(()),
            _ => Err(LedgerError::ConcurrentAppendConflict {
                expected: expected.map_or(0, |h| h.seq),
                actual: actual.map_or(0, |h| h.seq),
            }),
        }
    }

    /// Sequence and seal drafts onto the current tail. Timestamps are
    /// clamped to be non-decreasing along the chain.
    pub(crate) fn seal_drafts(
        &self,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut sealed = Vec::with_capacity(drafts.len());
        let mut seq = self.len();
        let mut prev_hash = self.head().map(|h| h.hash);
        let mut floor: Option<DateTime<Utc>> = self.entries.last().map(|e| e.timestamp);

        for mut draft in drafts {
            if let Some(floor) = floor {
                if draft.timestamp < floor {
                    draft.timestamp = floor;
                }
            }
            floor = Some(draft.timestamp);

            seq += 1;
            let entry = LedgerEntry::seal(seq, prev_hash, draft)?;
            prev_hash = Some(entry.hash);
            sealed.push(entry);
        }

        Ok(sealed)
    }

    /// Advance the tail. Entries must come from [`Self::seal_drafts`]
    /// against the current tail.
    pub(crate) fn commit(&mut self, entries: &[LedgerEntry]) {
        for entry in entries {
            self.index(entry);
            self.entries.push(entry.clone());
        }
    }

    fn index(&mut self, entry: &LedgerEntry) {
        self.subject_index
            .entry((entry.subject.kind, entry.subject.id.clone()))
            .or_default()
            .push(entry.seq);
    }

    /// Recompute every hash and link; first mismatch wins.
    pub(crate) fn verify(&self) -> Result<(), LedgerError> {
        for (index, entry) in self.entries.iter().enumerate() {
            let expected_seq = (index + 1) as u64;
            if entry.seq != expected_seq {
                return Err(LedgerError::IntegrityViolation {
                    seq: entry.seq,
                    reason: format!("expected seq {expected_seq}, found {}", entry.seq),
                });
            }
        }

        HashChainVerifier::verify_chain(&self.entries).map_err(|e| {
            let seq = match &e {
                ChainError::GenesisHasPrevHash => 1,
                ChainError::HashMismatch { index }
                | ChainError::BrokenLink { index }
                | ChainError::MissingPrevHash { index } => (*index + 1) as u64,
            };
            LedgerError::IntegrityViolation {
                seq,
                reason: e.to_string(),
            }
        })
    }

    pub(crate) fn entry(&self, seq: u64) -> Option<LedgerEntry> {
        if seq == 0 {
            return None;
        }
        self.entries.get((seq - 1) as usize).cloned()
    }

    pub(crate) fn read_since(&self, seq: u64) -> Vec<LedgerEntry> {
        let start = seq.min(self.len()) as usize;
        self.entries[start..].to_vec()
    }

    pub(crate) fn read_subject(&self, subject: &Subject) -> Vec<LedgerEntry> {
        let Some(seqs) = self
            .subject_index
            .get(&(subject.kind, subject.id.clone()))
        else {
            return vec![];
        };
        seqs.iter()
            .filter_map(|seq| self.entry(*seq))
            .collect()
    }

    pub(crate) fn read_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .cloned()
            .collect()
    }

    pub(crate) fn read_by_actor(&self, actor_id: &str) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.actor.id == actor_id)
            .cloned()
            .collect()
    }

    pub(crate) fn read_recent(&self, n: usize) -> Vec<LedgerEntry> {
        self.entries.iter().rev().take(n).cloned().collect()
    }
}

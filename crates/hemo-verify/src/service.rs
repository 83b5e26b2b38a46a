use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hemo_ledger::{Action, LedgerError, LedgerReader, Subject};
use hemo_types::{Actor, UnitId};

use crate::error::VerifyError;

/// Outcome of checking one ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryVerification {
    pub seq: u64,
    pub authentic: bool,
    /// The entry's stored hash, authentic or not.
    pub hash: [u8; 32],
    /// First sequence at which the chain breaks, when not authentic.
    pub first_invalid_seq: Option<u64>,
}

impl EntryVerification {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Outcome of checking a blood unit's latest ledger entry, the shape
/// backing public certificate verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitVerification {
    pub unit_id: UnitId,
    pub action: Action,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    pub entry: EntryVerification,
}

/// Whole-ledger verification summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub entries: u64,
    pub authentic: bool,
    pub first_invalid_seq: Option<u64>,
}

/// The longest prefix known to hash-chain correctly.
#[derive(Clone, Copy, Debug, Default)]
struct VerifiedPrefix {
    seq: u64,
    tail_hash: Option<[u8; 32]>,
}

/// Answers per-entry authenticity questions against a ledger.
///
/// The ledger is append-only, so a prefix that verified once never needs
/// re-walking: the service remembers how far it has verified and extends
/// the prefix incrementally. Entries inside the prefix still get their own
/// hash recomputed on lookup to catch in-place mutation of the backing
/// store after the prefix was walked.
pub struct VerificationService<R: LedgerReader + ?Sized> {
    reader: Arc<R>,
    prefix: Mutex<VerifiedPrefix>,
}

impl<R: LedgerReader + ?Sized> VerificationService<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            reader,
            prefix: Mutex::new(VerifiedPrefix::default()),
        }
    }

    /// Sequence up to which the chain has been verified.
    pub fn verified_up_to(&self) -> u64 {
        self.lock_prefix().seq
    }

    /// Verify the authenticity of the entry at `seq`.
    ///
    /// Walks only the gap between the cached verified prefix and `seq`.
    /// A failure is escalated to the ledger's own `verify_chain`, which
    /// halts all further appends.
    pub fn verify_entry(&self, seq: u64) -> Result<EntryVerification, VerifyError> {
        if seq == 0 {
            return Err(VerifyError::UnknownEntry { seq });
        }
        let target = self
            .reader
            .entry(seq)?
            .ok_or(VerifyError::UnknownEntry { seq })?;

        let mut prefix = self.lock_prefix();

        if seq <= prefix.seq {
            // Inside the walked prefix: linkage is known good, recheck
            // only this entry's content hash.
            let intact = target.recompute_hash()? == target.hash;
            if !intact {
                drop(prefix);
                return Ok(self.escalate(seq, target.hash, seq));
            }
            return Ok(EntryVerification {
                seq,
                authentic: true,
                hash: target.hash,
                first_invalid_seq: None,
            });
        }

        for entry in self.reader.read_since(prefix.seq)? {
            if entry.seq > seq {
                break;
            }
            let links = entry.seq == prefix.seq + 1 && entry.prev_hash == prefix.tail_hash;
            let intact = entry.recompute_hash()? == entry.hash;
            if !links || !intact {
                drop(prefix);
                return Ok(self.escalate(seq, target.hash, entry.seq));
            }
            prefix.seq = entry.seq;
            prefix.tail_hash = Some(entry.hash);
        }
        debug!(verified_up_to = prefix.seq, "extended verified prefix");

        Ok(EntryVerification {
            seq,
            authentic: true,
            hash: target.hash,
            first_invalid_seq: None,
        })
    }

    /// Verify the latest entry of a blood unit's history.
    pub fn verify_unit(&self, unit_id: &UnitId) -> Result<UnitVerification, VerifyError> {
        let history = self.reader.read_subject(&Subject::blood_unit(unit_id))?;
        let latest = history.last().ok_or_else(|| VerifyError::UnknownUnit {
            unit_id: unit_id.clone(),
        })?;

        let entry = self.verify_entry(latest.seq)?;
        Ok(UnitVerification {
            unit_id: unit_id.clone(),
            action: latest.action,
            actor: latest.actor.clone(),
            timestamp: latest.timestamp,
            entry,
        })
    }

    /// Re-verify the entire chain, bypassing the cached prefix.
    pub fn report(&self) -> Result<VerificationReport, VerifyError> {
        let entries = self.reader.len()?;
        match self.reader.verify_chain() {
            Ok(()) => Ok(VerificationReport {
                entries,
                authentic: true,
                first_invalid_seq: None,
            }),
            Err(LedgerError::IntegrityViolation { seq, .. }) => Ok(VerificationReport {
                entries,
                authentic: false,
                first_invalid_seq: Some(seq),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// A verification failure is never returned quietly: trigger the
    /// ledger's own chain check so writes halt.
    fn escalate(&self, seq: u64, hash: [u8; 32], first_invalid: u64) -> EntryVerification {
        warn!(seq, first_invalid, "entry failed verification, halting ledger");
        if let Err(e) = self.reader.verify_chain() {
            debug!(error = %e, "ledger chain check confirmed violation");
        }
        EntryVerification {
            seq,
            authentic: false,
            hash,
            first_invalid_seq: Some(first_invalid),
        }
    }

    fn lock_prefix(&self) -> std::sync::MutexGuard<'_, VerifiedPrefix> {
        // A poisoned prefix cache only ever under-reports what has been
        // verified, so recovering the guard is safe.
        match self.prefix.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use hemo_crypto::{HashChained, HashChainVerifier};
use hemo_types::{
    Actor, BloodGroup, ComponentType, DonationRequestId, HospitalRequestId, RequestNumber,
    TestPanel, UnitId, Urgency,
};

use crate::error::LedgerError;

/// Kind of entity a ledger entry is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    BloodUnit,
    DonationRequest,
    HospitalRequest,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BloodUnit => write!(f, "BloodUnit"),
            Self::DonationRequest => write!(f, "DonationRequest"),
            Self::HospitalRequest => write!(f, "HospitalRequest"),
        }
    }
}

/// The entity a ledger entry addresses, e.g. `BloodUnit#BB01-20260812-A9F3`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: String,
}

impl Subject {
    pub fn blood_unit(id: &UnitId) -> Self {
        Self {
            kind: SubjectKind::BloodUnit,
            id: id.to_string(),
        }
    }

    pub fn donation_request(id: &DonationRequestId) -> Self {
        Self {
            kind: SubjectKind::DonationRequest,
            id: id.to_string(),
        }
    }

    pub fn hospital_request(id: &HospitalRequestId) -> Self {
        Self {
            kind: SubjectKind::HospitalRequest,
            id: id.to_string(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// State-changing action recorded by a ledger entry. Closed set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    DonationSubmitted,
    DonationApproved,
    DonationRejected,
    Collected,
    Tested,
    Stored,
    Dispatched,
    Received,
    Used,
    ScreeningRejected,
    RequestCreated,
    RequestApproved,
    RequestRejected,
    RequestDispatched,
    RequestCompleted,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DonationSubmitted => "DONATION_SUBMITTED",
            Self::DonationApproved => "DONATION_APPROVED",
            Self::DonationRejected => "DONATION_REJECTED",
            Self::Collected => "COLLECTED",
            Self::Tested => "TESTED",
            Self::Stored => "STORED",
            Self::Dispatched => "DISPATCHED",
            Self::Received => "RECEIVED",
            Self::Used => "USED",
            Self::ScreeningRejected => "SCREENING_REJECTED",
            Self::RequestCreated => "REQUEST_CREATED",
            Self::RequestApproved => "REQUEST_APPROVED",
            Self::RequestRejected => "REQUEST_REJECTED",
            Self::RequestDispatched => "REQUEST_DISPATCHED",
            Self::RequestCompleted => "REQUEST_COMPLETED",
        };
        f.write_str(s)
    }
}

/// Structured snapshot carried by a ledger entry, one variant per action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPayload {
    DonationSubmitted {
        donor_id: String,
        bank_id: u32,
        blood_group: BloodGroup,
        component: ComponentType,
        preferred_date: NaiveDate,
        declaration: String,
    },
    DonationApproved,
    DonationRejected {
        reason: Option<String>,
    },
    /// A physical unit came into existence. Carries a back-reference to the
    /// originating donation request, which completes that request.
    Collected {
        donation_request_id: DonationRequestId,
        donor_id: String,
        blood_group: BloodGroup,
        component: ComponentType,
        volume_ml: u32,
        collection_date: NaiveDate,
        expiry_date: NaiveDate,
    },
    Tested {
        panel: TestPanel,
        notes: Option<String>,
    },
    Stored {
        location: String,
    },
    Dispatched {
        request_id: HospitalRequestId,
    },
    Received {
        request_id: HospitalRequestId,
    },
    Used {
        notes: Option<String>,
    },
    ScreeningRejected {
        panel: TestPanel,
    },
    RequestCreated {
        hospital_id: String,
        request_number: RequestNumber,
        blood_group: BloodGroup,
        component: ComponentType,
        quantity: u32,
        urgency: Urgency,
    },
    RequestApproved {
        reserved_units: Vec<UnitId>,
    },
    RequestRejected {
        reason: String,
    },
    RequestDispatched {
        units: Vec<UnitId>,
    },
    RequestCompleted {
        units: Vec<UnitId>,
    },
}

impl EntryPayload {
    /// The action this payload documents.
    pub fn action(&self) -> Action {
        match self {
            Self::DonationSubmitted { .. } => Action::DonationSubmitted,
            Self::DonationApproved => Action::DonationApproved,
            Self::DonationRejected { .. } => Action::DonationRejected,
            Self::Collected { .. } => Action::Collected,
            Self::Tested { .. } => Action::Tested,
            Self::Stored { .. } => Action::Stored,
            Self::Dispatched { .. } => Action::Dispatched,
            Self::Received { .. } => Action::Received,
            Self::Used { .. } => Action::Used,
            Self::ScreeningRejected { .. } => Action::ScreeningRejected,
            Self::RequestCreated { .. } => Action::RequestCreated,
            Self::RequestApproved { .. } => Action::RequestApproved,
            Self::RequestRejected { .. } => Action::RequestRejected,
            Self::RequestDispatched { .. } => Action::RequestDispatched,
            Self::RequestCompleted { .. } => Action::RequestCompleted,
        }
    }
}

/// An entry prepared by a workflow, not yet sequenced or sealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub subject: Subject,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    pub payload: EntryPayload,
}

impl EntryDraft {
    pub fn new(
        subject: Subject,
        actor: Actor,
        timestamp: DateTime<Utc>,
        payload: EntryPayload,
    ) -> Self {
        Self {
            subject,
            actor,
            timestamp,
            payload,
        }
    }
}

/// Reference to the current tail of the ledger, used as an optimistic
/// concurrency guard on appends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRef {
    pub seq: u64,
    pub hash: [u8; 32],
}

/// One immutable, hash-linked record of a single state-changing event.
///
/// `hash = BLAKE3(domain ‖ prev_hash ‖ canonical_json(entry with hash zeroed))`
/// and `prev_hash` equals the previous entry's `hash` (`None` at genesis).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 1-based monotonic sequence number.
    pub seq: u64,
    pub subject: Subject,
    pub action: Action,
    pub actor: Actor,
    /// Non-decreasing along the chain.
    pub timestamp: DateTime<Utc>,
    pub payload: EntryPayload,
    pub prev_hash: Option<[u8; 32]>,
    pub hash: [u8; 32],
}

impl LedgerEntry {
    /// Sequence a draft onto the chain and seal its hash.
    pub fn seal(
        seq: u64,
        prev_hash: Option<[u8; 32]>,
        draft: EntryDraft,
    ) -> Result<Self, LedgerError> {
        let mut entry = Self {
            seq,
            subject: draft.subject,
            action: draft.payload.action(),
            actor: draft.actor,
            timestamp: draft.timestamp,
            payload: draft.payload,
            prev_hash,
            hash: [0; 32],
        };
        entry.hash = HashChainVerifier::compute_hash(&entry.canonical_bytes()?, prev_hash);
        Ok(entry)
    }

    /// Canonical JSON bytes of the entry with the hash field zeroed.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        let mut canonical = self.clone();
        canonical.hash = [0; 32];
        serde_json::to_vec(&canonical).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    /// Recompute this entry's hash from its stored fields.
    pub fn recompute_hash(&self) -> Result<[u8; 32], LedgerError> {
        Ok(HashChainVerifier::compute_hash(
            &self.canonical_bytes()?,
            self.prev_hash,
        ))
    }

    pub fn head_ref(&self) -> HeadRef {
        HeadRef {
            seq: self.seq,
            hash: self.hash,
        }
    }
}

impl HashChained for LedgerEntry {
    fn entry_hash(&self) -> [u8; 32] {
        self.hash
    }

    fn prev_hash(&self) -> Option<[u8; 32]> {
        self.prev_hash
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        // Serialization of an already-sealed entry cannot fail.
        LedgerEntry::canonical_bytes(self).unwrap_or_default()
    }
}

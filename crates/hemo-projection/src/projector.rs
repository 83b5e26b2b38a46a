use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use hemo_ledger::{EntryPayload, LedgerEntry, LedgerReader};
use hemo_types::{
    BloodGroup, ComponentType, DonationRequestId, DonationStatus, HospitalRequestId,
    RequestStatus, UnitId, UnitStatus,
};

use crate::error::ProjectionError;
use crate::views::{BloodUnit, DonationRequest, HospitalRequest};

/// Deterministic fold of the ledger into current entity views.
///
/// Holds the sequence number it has folded up to, so it can be cached and
/// caught up incrementally from `read_since(last_seq)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    units: BTreeMap<UnitId, BloodUnit>,
    donations: BTreeMap<DonationRequestId, DonationRequest>,
    requests: BTreeMap<HospitalRequestId, HospitalRequest>,
    last_seq: u64,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an entire ledger from genesis.
    pub fn from_reader<R: LedgerReader + ?Sized>(reader: &R) -> Result<Self, ProjectionError> {
        let mut projection = Self::new();
        projection.catch_up(reader)?;
        Ok(projection)
    }

    /// Apply every entry appended since this projection was computed.
    pub fn catch_up<R: LedgerReader + ?Sized>(
        &mut self,
        reader: &R,
    ) -> Result<(), ProjectionError> {
        for entry in reader.read_since(self.last_seq)? {
            self.apply(&entry)?;
        }
        Ok(())
    }

    /// The sequence number this projection reflects.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn unit(&self, id: &UnitId) -> Option<&BloodUnit> {
        self.units.get(id)
    }

    pub fn units(&self) -> impl Iterator<Item = &BloodUnit> {
        self.units.values()
    }

    pub fn donation(&self, id: &DonationRequestId) -> Option<&DonationRequest> {
        self.donations.get(id)
    }

    pub fn donations(&self) -> impl Iterator<Item = &DonationRequest> {
        self.donations.values()
    }

    pub fn request(&self, id: &HospitalRequestId) -> Option<&HospitalRequest> {
        self.requests.get(id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &HospitalRequest> {
        self.requests.values()
    }

    /// Unit ids currently held by requests that have not released their
    /// reservation yet.
    pub fn reserved_units(&self) -> BTreeSet<UnitId> {
        self.requests
            .values()
            .filter(|r| r.status.holds_reservation())
            .flat_map(|r| r.reserved_units.iter().cloned())
            .collect()
    }

    /// Stored, unreserved, unexpired units of the given group/component,
    /// earliest expiry first (to minimize wastage when reserving).
    pub fn available_units(
        &self,
        group: BloodGroup,
        component: ComponentType,
        as_of: NaiveDate,
    ) -> Vec<&BloodUnit> {
        let reserved = self.reserved_units();
        let mut available: Vec<&BloodUnit> = self
            .units
            .values()
            .filter(|u| {
                u.blood_group == group
                    && u.component == component
                    && u.status_as_of(as_of) == UnitStatus::Stored
                    && !reserved.contains(&u.id)
            })
            .collect();
        available.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date).then(a.id.cmp(&b.id)));
        available
    }

    /// Apply one entry. Entries must arrive in sequence order.
    pub fn apply(&mut self, entry: &LedgerEntry) -> Result<(), ProjectionError> {
        if entry.seq != self.last_seq + 1 {
            return Err(ProjectionError::OutOfOrder {
                seq: entry.seq,
                at: self.last_seq,
            });
        }

        match &entry.payload {
            EntryPayload::DonationSubmitted {
                donor_id,
                bank_id,
                blood_group,
                component,
                preferred_date,
                declaration,
            } => {
                let id = self.donation_subject(entry)?;
                if self.donations.contains_key(&id) {
                    return Err(duplicate(entry));
                }
                self.donations.insert(
                    id,
                    DonationRequest {
                        id,
                        donor_id: donor_id.clone(),
                        bank_id: *bank_id,
                        blood_group: *blood_group,
                        component: *component,
                        preferred_date: *preferred_date,
                        declaration: declaration.clone(),
                        status: DonationStatus::Pending,
                        rejection_reason: None,
                        unit_id: None,
                    },
                );
            }
            EntryPayload::DonationApproved => {
                let id = self.donation_subject(entry)?;
                self.donation_transition(entry, &id, DonationStatus::Approved)?;
            }
            EntryPayload::DonationRejected { reason } => {
                let id = self.donation_subject(entry)?;
                self.donation_transition(entry, &id, DonationStatus::Rejected)?;
                if let Some(donation) = self.donations.get_mut(&id) {
                    donation.rejection_reason = reason.clone();
                }
            }
            EntryPayload::Collected {
                donation_request_id,
                donor_id,
                blood_group,
                component,
                volume_ml,
                collection_date,
                expiry_date,
            } => {
                let id = self.unit_subject(entry)?;
                if self.units.contains_key(&id) {
                    return Err(duplicate(entry));
                }
                // Collection completes the originating donation request.
                self.donation_transition(entry, donation_request_id, DonationStatus::Completed)?;
                if let Some(donation) = self.donations.get_mut(donation_request_id) {
                    donation.unit_id = Some(id.clone());
                }
                self.units.insert(
                    id.clone(),
                    BloodUnit {
                        id,
                        donor_id: donor_id.clone(),
                        donation_request_id: *donation_request_id,
                        blood_group: *blood_group,
                        component: *component,
                        volume_ml: *volume_ml,
                        collection_date: *collection_date,
                        expiry_date: *expiry_date,
                        status: UnitStatus::Collected,
                        tests: Default::default(),
                        storage_location: None,
                    },
                );
            }
            EntryPayload::Tested { panel, .. } => {
                let id = self.unit_subject(entry)?;
                self.unit_transition(entry, &id, UnitStatus::Tested)?;
                if let Some(unit) = self.units.get_mut(&id) {
                    unit.tests = *panel;
                }
            }
            EntryPayload::Stored { location } => {
                let id = self.unit_subject(entry)?;
                self.unit_transition(entry, &id, UnitStatus::Stored)?;
                if let Some(unit) = self.units.get_mut(&id) {
                    unit.storage_location = Some(location.clone());
                }
            }
            EntryPayload::Dispatched { .. } => {
                let id = self.unit_subject(entry)?;
                self.unit_transition(entry, &id, UnitStatus::Dispatched)?;
            }
            EntryPayload::Received { .. } => {
                let id = self.unit_subject(entry)?;
                self.unit_transition(entry, &id, UnitStatus::Received)?;
            }
            EntryPayload::Used { .. } => {
                let id = self.unit_subject(entry)?;
                self.unit_transition(entry, &id, UnitStatus::Used)?;
            }
            EntryPayload::ScreeningRejected { panel } => {
                let id = self.unit_subject(entry)?;
                self.unit_transition(entry, &id, UnitStatus::Rejected)?;
                if let Some(unit) = self.units.get_mut(&id) {
                    unit.tests = *panel;
                }
            }
            EntryPayload::RequestCreated {
                hospital_id,
                request_number,
                blood_group,
                component,
                quantity,
                urgency,
            } => {
                let id = self.request_subject(entry)?;
                if self.requests.contains_key(&id) {
                    return Err(duplicate(entry));
                }
                self.requests.insert(
                    id,
                    HospitalRequest {
                        id,
                        request_number: request_number.clone(),
                        hospital_id: hospital_id.clone(),
                        blood_group: *blood_group,
                        component: *component,
                        quantity: *quantity,
                        urgency: *urgency,
                        status: RequestStatus::Pending,
                        rejection_reason: None,
                        reserved_units: vec![],
                    },
                );
            }
            EntryPayload::RequestApproved { reserved_units } => {
                let id = self.request_subject(entry)?;
                self.request_transition(entry, &id, RequestStatus::Approved)?;
                if let Some(request) = self.requests.get_mut(&id) {
                    request.reserved_units = reserved_units.clone();
                }
            }
            EntryPayload::RequestRejected { reason } => {
                let id = self.request_subject(entry)?;
                self.request_transition(entry, &id, RequestStatus::Rejected)?;
                if let Some(request) = self.requests.get_mut(&id) {
                    request.rejection_reason = Some(reason.clone());
                }
            }
            EntryPayload::RequestDispatched { .. } => {
                let id = self.request_subject(entry)?;
                self.request_transition(entry, &id, RequestStatus::Dispatched)?;
            }
            EntryPayload::RequestCompleted { .. } => {
                let id = self.request_subject(entry)?;
                self.request_transition(entry, &id, RequestStatus::Completed)?;
            }
        }

        self.last_seq = entry.seq;
        Ok(())
    }

    fn unit_subject(&self, entry: &LedgerEntry) -> Result<UnitId, ProjectionError> {
        entry
            .subject
            .id
            .parse()
            .map_err(|_| malformed(entry))
    }

    fn donation_subject(&self, entry: &LedgerEntry) -> Result<DonationRequestId, ProjectionError> {
        entry
            .subject
            .id
            .parse()
            .map_err(|_| malformed(entry))
    }

    fn request_subject(&self, entry: &LedgerEntry) -> Result<HospitalRequestId, ProjectionError> {
        entry
            .subject
            .id
            .parse()
            .map_err(|_| malformed(entry))
    }

    fn unit_transition(
        &mut self,
        entry: &LedgerEntry,
        id: &UnitId,
        next: UnitStatus,
    ) -> Result<(), ProjectionError> {
        let unit = self.units.get_mut(id).ok_or_else(|| unknown(entry))?;
        if !unit.status.can_transition_to(next) {
            return Err(invalid(entry, unit.status.to_string()));
        }
        unit.status = next;
        Ok(())
    }

    fn donation_transition(
        &mut self,
        entry: &LedgerEntry,
        id: &DonationRequestId,
        next: DonationStatus,
    ) -> Result<(), ProjectionError> {
        let donation = self.donations.get_mut(id).ok_or_else(|| unknown(entry))?;
        if !donation.status.can_transition_to(next) {
            return Err(invalid(entry, donation.status.to_string()));
        }
        donation.status = next;
        Ok(())
    }

    fn request_transition(
        &mut self,
        entry: &LedgerEntry,
        id: &HospitalRequestId,
        next: RequestStatus,
    ) -> Result<(), ProjectionError> {
        let request = self.requests.get_mut(id).ok_or_else(|| unknown(entry))?;
        if !request.status.can_transition_to(next) {
            return Err(invalid(entry, request.status.to_string()));
        }
        request.status = next;
        Ok(())
    }
}

fn malformed(entry: &LedgerEntry) -> ProjectionError {
    ProjectionError::MalformedSubject {
        seq: entry.seq,
        subject: entry.subject.to_string(),
    }
}

fn unknown(entry: &LedgerEntry) -> ProjectionError {
    ProjectionError::UnknownSubject {
        seq: entry.seq,
        subject: entry.subject.to_string(),
    }
}

fn invalid(entry: &LedgerEntry, from: String) -> ProjectionError {
    ProjectionError::InvalidTransition {
        seq: entry.seq,
        subject: entry.subject.to_string(),
        action: entry.action.to_string(),
        from,
    }
}

fn duplicate(entry: &LedgerEntry) -> ProjectionError {
    ProjectionError::DuplicateSubject {
        seq: entry.seq,
        subject: entry.subject.to_string(),
    }
}

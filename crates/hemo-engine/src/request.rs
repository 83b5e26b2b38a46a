use std::sync::Arc;

use chrono::Datelike;
use tracing::debug;

use hemo_ledger::{EntryDraft, EntryPayload, HeadRef, Ledger, LedgerEntry, Subject};
use hemo_projection::{BloodUnit, HospitalRequest, Projection};
use hemo_types::{
    Actor, BloodGroup, ComponentType, HospitalRequestId, RequestNumber, RequestStatus, UnitId,
    UnitStatus, Urgency,
};

use crate::clock::Clock;
use crate::config::WorkflowConfig;
use crate::error::EngineError;

/// A hospital's request for stock.
#[derive(Clone, Debug)]
pub struct NewRequest {
    pub hospital_id: String,
    pub blood_group: BloodGroup,
    pub component: ComponentType,
    pub quantity: u32,
    pub urgency: Urgency,
}

/// Hospital-request lifecycle: PENDING → APPROVED → DISPATCHED → COMPLETED
/// (or REJECTED), with atomic check-and-reserve at approval.
pub struct RequestWorkflow<L: Ledger> {
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
    config: Arc<WorkflowConfig>,
}

impl<L: Ledger> RequestWorkflow<L> {
    pub(crate) fn new(ledger: Arc<L>, clock: Arc<dyn Clock>, config: Arc<WorkflowConfig>) -> Self {
        Self {
            ledger,
            clock,
            config,
        }
    }

    /// File a new request, assigning the next `REQ-{year}-{NNNNNN}` number.
    ///
    /// The ordinal is counted from a snapshot and appended under that
    /// snapshot's tail, so two concurrent creates can never share a number;
    /// the loser re-reads and takes the next one.
    pub fn create(&self, actor: &Actor, new: NewRequest) -> Result<HospitalRequest, EngineError> {
        EngineError::require(!new.hospital_id.trim().is_empty(), "hospital id is required")?;
        EngineError::require(new.quantity > 0, "requested quantity must be positive")?;

        let id = HospitalRequestId::new();
        let year = self.clock.today().year();
        let prefix = format!("REQ-{year}-");
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (projection, head) = self.snapshot()?;
            let ordinal = 1 + projection
                .requests()
                .filter(|r| r.request_number.as_str().starts_with(&prefix))
                .count() as u64;

            let draft = EntryDraft::new(
                Subject::hospital_request(&id),
                actor.clone(),
                self.clock.now(),
                EntryPayload::RequestCreated {
                    hospital_id: new.hospital_id.clone(),
                    request_number: RequestNumber::new(year, ordinal),
                    blood_group: new.blood_group,
                    component: new.component,
                    quantity: new.quantity,
                    urgency: new.urgency,
                },
            );
            match self.ledger.append_batch_at(head, vec![draft]) {
                Ok(_) => {
                    debug!(%id, hospital = %new.hospital_id, "hospital request created");
                    return self.request_view(&id);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_append_attempts => {
                    debug!(%id, attempt, "request numbering lost append race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Approve a pending request, atomically reserving its units.
    ///
    /// Check-and-reserve runs as an optimistic loop: project from one
    /// consistent snapshot, pick the earliest-expiring available units,
    /// then append guarded by the snapshot's tail. If another append won
    /// the race, re-read and retry up to `max_append_attempts` times.
    /// Stock is re-counted on every attempt, so two concurrent approvals
    /// can never reserve the same unit.
    pub fn approve(
        &self,
        actor: &Actor,
        id: HospitalRequestId,
    ) -> Result<HospitalRequest, EngineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (projection, head) = self.snapshot()?;
            let request = request_in(&projection, &id)?;
            require_request(&request, RequestStatus::Pending, "approve")?;

            let available = projection.available_units(
                request.blood_group,
                request.component,
                self.clock.today(),
            );
            if (available.len() as u32) < request.quantity {
                return Err(EngineError::InsufficientStock {
                    requested: request.quantity,
                    available: available.len() as u32,
                });
            }
            let reserved_units: Vec<UnitId> = available
                .iter()
                .take(request.quantity as usize)
                .map(|u| u.id.clone())
                .collect();

            let draft = EntryDraft::new(
                Subject::hospital_request(&id),
                actor.clone(),
                self.clock.now(),
                EntryPayload::RequestApproved { reserved_units },
            );
            match self.ledger.append_batch_at(head, vec![draft]) {
                Ok(_) => return self.request_view(&id),
                Err(e) if e.is_transient() && attempt < self.config.max_append_attempts => {
                    debug!(%id, attempt, "approval lost append race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reject a pending request. A reason is mandatory.
    pub fn reject(
        &self,
        actor: &Actor,
        id: HospitalRequestId,
        reason: String,
    ) -> Result<HospitalRequest, EngineError> {
        EngineError::require(!reason.trim().is_empty(), "rejection reason is required")?;

        let (projection, _) = self.snapshot()?;
        let request = request_in(&projection, &id)?;
        require_request(&request, RequestStatus::Pending, "reject")?;

        self.ledger.append(EntryDraft::new(
            Subject::hospital_request(&id),
            actor.clone(),
            self.clock.now(),
            EntryPayload::RequestRejected { reason },
        ))?;
        self.request_view(&id)
    }

    /// Send the reserved units out: request → DISPATCHED and every
    /// reserved unit → DISPATCHED, as one atomic batch.
    pub fn dispatch(
        &self,
        actor: &Actor,
        id: HospitalRequestId,
    ) -> Result<HospitalRequest, EngineError> {
        let (projection, _) = self.snapshot()?;
        let request = request_in(&projection, &id)?;
        require_request(&request, RequestStatus::Approved, "dispatch")?;

        let mut drafts = vec![EntryDraft::new(
            Subject::hospital_request(&id),
            actor.clone(),
            self.clock.now(),
            EntryPayload::RequestDispatched {
                units: request.reserved_units.clone(),
            },
        )];
        for unit_id in &request.reserved_units {
            drafts.push(EntryDraft::new(
                Subject::blood_unit(unit_id),
                actor.clone(),
                self.clock.now(),
                EntryPayload::Dispatched { request_id: id },
            ));
        }
        debug!(%id, units = request.reserved_units.len(), "request dispatched");
        self.ledger.append_batch(drafts)?;
        self.request_view(&id)
    }

    /// The hospital confirms arrival: units → RECEIVED, request →
    /// COMPLETED, reservation released. One atomic batch.
    pub fn confirm_receipt(
        &self,
        actor: &Actor,
        id: HospitalRequestId,
    ) -> Result<HospitalRequest, EngineError> {
        let (projection, _) = self.snapshot()?;
        let request = request_in(&projection, &id)?;
        require_request(&request, RequestStatus::Dispatched, "confirm receipt")?;

        let mut drafts = Vec::with_capacity(request.reserved_units.len() + 1);
        for unit_id in &request.reserved_units {
            drafts.push(EntryDraft::new(
                Subject::blood_unit(unit_id),
                actor.clone(),
                self.clock.now(),
                EntryPayload::Received { request_id: id },
            ));
        }
        drafts.push(EntryDraft::new(
            Subject::hospital_request(&id),
            actor.clone(),
            self.clock.now(),
            EntryPayload::RequestCompleted {
                units: request.reserved_units.clone(),
            },
        ));
        self.ledger.append_batch(drafts)?;
        self.request_view(&id)
    }

    /// Record that a received unit was transfused.
    pub fn record_transfusion(
        &self,
        actor: &Actor,
        unit_id: &UnitId,
        notes: Option<String>,
    ) -> Result<BloodUnit, EngineError> {
        let (projection, _) = self.snapshot()?;
        let unit = projection
            .unit(unit_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("unit {unit_id}")))?;
        if unit.status != UnitStatus::Received {
            return Err(EngineError::InvalidState {
                entity: format!("unit {unit_id}"),
                from: unit.status.to_string(),
                op: "record transfusion",
            });
        }

        self.ledger.append(EntryDraft::new(
            Subject::blood_unit(unit_id),
            actor.clone(),
            self.clock.now(),
            EntryPayload::Used { notes },
        ))?;
        let (projection, _) = self.snapshot()?;
        projection
            .unit(unit_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("unit {unit_id}")))
    }

    /// Projection and tail from one consistent read of the ledger.
    fn snapshot(&self) -> Result<(Projection, Option<HeadRef>), EngineError> {
        let entries = self.ledger.read_all()?;
        let head = entries.last().map(LedgerEntry::head_ref);
        let mut projection = Projection::new();
        for entry in &entries {
            projection.apply(entry)?;
        }
        Ok((projection, head))
    }

    fn request_view(&self, id: &HospitalRequestId) -> Result<HospitalRequest, EngineError> {
        let (projection, _) = self.snapshot()?;
        request_in(&projection, id)
    }
}

fn request_in(
    projection: &Projection,
    id: &HospitalRequestId,
) -> Result<HospitalRequest, EngineError> {
    projection
        .request(id)
        .cloned()
        .ok_or_else(|| EngineError::NotFound(format!("request {id}")))
}

fn require_request(
    request: &HospitalRequest,
    expected: RequestStatus,
    op: &'static str,
) -> Result<(), EngineError> {
    if request.status == expected {
        Ok(())
    } else {
        Err(EngineError::InvalidState {
            entity: format!("request {}", request.request_number),
            from: request.status.to_string(),
            op,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hemo_ledger::InMemoryLedger;
    use hemo_types::Role;

    use crate::clock::FixedClock;
    use crate::donation::{CompletionData, DonationWorkflow, NewDonation};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        donations: DonationWorkflow<InMemoryLedger>,
        requests: RequestWorkflow<InMemoryLedger>,
        donor_seq: std::cell::Cell<u32>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_date(date(2026, 8, 27)));
        let config = Arc::new(WorkflowConfig::default());
        Fixture {
            ledger: ledger.clone(),
            donations: DonationWorkflow::new(ledger.clone(), clock.clone(), config.clone()),
            requests: RequestWorkflow::new(ledger, clock, config),
            donor_seq: std::cell::Cell::new(0),
        }
    }

    fn clerk() -> Actor {
        Actor::new("clerk@bank.example", Role::BloodBank)
    }

    fn ward() -> Actor {
        Actor::new("ward@hospital.example", Role::Hospital)
    }

    impl Fixture {
        /// Donate and store one O+ whole-blood unit from a fresh donor.
        fn stock_one_unit(&self) -> UnitId {
            let n = self.donor_seq.get() + 1;
            self.donor_seq.set(n);
            let donation = self
                .donations
                .submit(
                    &Actor::new(format!("donor{n}@example.org"), Role::Donor),
                    NewDonation {
                        donor_id: format!("donor{n}@example.org"),
                        bank_id: 1,
                        blood_group: BloodGroup::OPos,
                        component: ComponentType::WholeBlood,
                        preferred_date: date(2026, 8, 27),
                        declaration: "healthy".into(),
                    },
                )
                .unwrap();
            self.donations.approve(&clerk(), donation.id).unwrap();
            self.donations
                .complete(
                    &clerk(),
                    donation.id,
                    CompletionData {
                        volume_ml: 450,
                        storage_location: Some("Fridge1".into()),
                    },
                )
                .unwrap()
                .id
        }

        fn new_request(&self, quantity: u32) -> HospitalRequest {
            self.requests
                .create(
                    &ward(),
                    NewRequest {
                        hospital_id: "ward@hospital.example".into(),
                        blood_group: BloodGroup::OPos,
                        component: ComponentType::WholeBlood,
                        quantity,
                        urgency: Urgency::Routine,
                    },
                )
                .unwrap()
        }
    }

    #[test]
    fn request_numbers_count_up_within_the_year() {
        let fx = fixture();
        let first = fx.new_request(1);
        let second = fx.new_request(1);
        assert_eq!(first.request_number.as_str(), "REQ-2026-000001");
        assert_eq!(second.request_number.as_str(), "REQ-2026-000002");
    }

    #[test]
    fn concurrent_creates_mint_distinct_numbers() {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_date(date(2026, 8, 27)));
        let config = Arc::new(WorkflowConfig {
            max_append_attempts: 64,
            ..WorkflowConfig::default()
        });
        let requests = RequestWorkflow::new(ledger, clock, config);

        let created: Vec<HospitalRequest> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        requests
                            .create(
                                &ward(),
                                NewRequest {
                                    hospital_id: "ward@hospital.example".into(),
                                    blood_group: BloodGroup::OPos,
                                    component: ComponentType::WholeBlood,
                                    quantity: 1,
                                    urgency: Urgency::Routine,
                                },
                            )
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let numbers: std::collections::BTreeSet<&str> = created
            .iter()
            .map(|r| r.request_number.as_str())
            .collect();
        assert_eq!(numbers.len(), 8);
        assert!(numbers.contains("REQ-2026-000001"));
        assert!(numbers.contains("REQ-2026-000008"));
    }

    #[test]
    fn approve_reserves_requested_quantity() {
        let fx = fixture();
        for _ in 0..3 {
            fx.stock_one_unit();
        }
        let request = fx.new_request(2);
        let approved = fx.requests.approve(&clerk(), request.id).unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.reserved_units.len(), 2);
    }

    #[test]
    fn approve_fails_insufficient_stock_and_leaves_pending() {
        let fx = fixture();
        for _ in 0..3 {
            fx.stock_one_unit();
        }
        let request = fx.new_request(5);
        let err = fx.requests.approve(&clerk(), request.id).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock {
                requested: 5,
                available: 3
            }
        ));

        let (projection, _) = fx.requests.snapshot().unwrap();
        let request = projection.request(&request.id).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.reserved_units.is_empty());
    }

    #[test]
    fn reject_demands_a_reason() {
        let fx = fixture();
        let request = fx.new_request(1);
        assert!(matches!(
            fx.requests.reject(&clerk(), request.id, "  ".into()),
            Err(EngineError::Validation(_))
        ));

        let rejected = fx
            .requests
            .reject(&clerk(), request.id, "no matching stock expected".into())
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("no matching stock expected")
        );
    }

    #[test]
    fn dispatch_and_receipt_walk_units_to_received() {
        let fx = fixture();
        let unit_id = fx.stock_one_unit();
        let request = fx.new_request(1);
        fx.requests.approve(&clerk(), request.id).unwrap();

        let dispatched = fx.requests.dispatch(&clerk(), request.id).unwrap();
        assert_eq!(dispatched.status, RequestStatus::Dispatched);

        let completed = fx.requests.confirm_receipt(&ward(), request.id).unwrap();
        assert_eq!(completed.status, RequestStatus::Completed);

        let (projection, _) = fx.requests.snapshot().unwrap();
        assert_eq!(
            projection.unit(&unit_id).unwrap().status,
            UnitStatus::Received
        );
        // Reservation released.
        assert!(projection.reserved_units().is_empty());
    }

    #[test]
    fn transfusion_closes_the_unit_lifecycle() {
        let fx = fixture();
        let unit_id = fx.stock_one_unit();
        let request = fx.new_request(1);
        fx.requests.approve(&clerk(), request.id).unwrap();
        fx.requests.dispatch(&clerk(), request.id).unwrap();
        fx.requests.confirm_receipt(&ward(), request.id).unwrap();

        let used = fx
            .requests
            .record_transfusion(&ward(), &unit_id, Some("patient 4411".into()))
            .unwrap();
        assert_eq!(used.status, UnitStatus::Used);

        // A second transfusion of the same unit is impossible.
        assert!(matches!(
            fx.requests.record_transfusion(&ward(), &unit_id, None),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn dispatch_requires_approval() {
        let fx = fixture();
        fx.stock_one_unit();
        let request = fx.new_request(1);
        assert!(matches!(
            fx.requests.dispatch(&clerk(), request.id),
            Err(EngineError::InvalidState { op: "dispatch", .. })
        ));
    }

    #[test]
    fn approve_prefers_earliest_expiry() {
        let fx = fixture();
        // First unit collected 2026-08-27 expires 2026-10-01; stock a
        // second one five days later through the same ledger.
        let earliest = fx.stock_one_unit();
        let later_donations = DonationWorkflow::new(
            fx.ledger.clone(),
            Arc::new(FixedClock::at_date(date(2026, 9, 1))),
            Arc::new(WorkflowConfig::default()),
        );
        let donation = later_donations
            .submit(
                &Actor::new("donor99@example.org", Role::Donor),
                NewDonation {
                    donor_id: "donor99@example.org".into(),
                    bank_id: 1,
                    blood_group: BloodGroup::OPos,
                    component: ComponentType::WholeBlood,
                    preferred_date: date(2026, 9, 1),
                    declaration: "healthy".into(),
                },
            )
            .unwrap();
        later_donations.approve(&clerk(), donation.id).unwrap();
        later_donations
            .complete(
                &clerk(),
                donation.id,
                CompletionData {
                    volume_ml: 450,
                    storage_location: Some("Fridge1".into()),
                },
            )
            .unwrap();

        let request = fx.new_request(1);
        let approved = fx.requests.approve(&clerk(), request.id).unwrap();
        assert_eq!(approved.reserved_units, vec![earliest]);
    }
}

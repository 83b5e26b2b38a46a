use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::debug;

use hemo_eligibility::CompletedDonation;
use hemo_ledger::{EntryDraft, EntryPayload, HeadRef, Ledger, LedgerEntry, Subject};
use hemo_projection::{BloodUnit, DonationRequest, Projection};
use hemo_types::{
    Actor, BloodGroup, ComponentType, DonationRequestId, DonationStatus, TestPanel, TestStatus,
    UnitId, UnitStatus,
};

use crate::clock::Clock;
use crate::config::{StoragePolicy, WorkflowConfig};
use crate::error::EngineError;

/// A donor's appointment submission.
#[derive(Clone, Debug)]
pub struct NewDonation {
    pub donor_id: String,
    pub bank_id: u32,
    pub blood_group: BloodGroup,
    pub component: ComponentType,
    pub preferred_date: NaiveDate,
    pub declaration: String,
}

/// Collection details supplied when an approved donation takes place.
#[derive(Clone, Debug)]
pub struct CompletionData {
    pub volume_ml: u32,
    /// Required under [`StoragePolicy::ImmediateStorage`]; ignored when
    /// the unit must pass screening before storage.
    pub storage_location: Option<String>,
}

/// Donation lifecycle: PENDING → APPROVED → COMPLETED (or REJECTED), then
/// the resulting unit's collection, screening, and storage steps.
pub struct DonationWorkflow<L: Ledger> {
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
    config: Arc<WorkflowConfig>,
}

impl<L: Ledger> DonationWorkflow<L> {
    pub(crate) fn new(ledger: Arc<L>, clock: Arc<dyn Clock>, config: Arc<WorkflowConfig>) -> Self {
        Self {
            ledger,
            clock,
            config,
        }
    }

    /// Submit a new donation request. The donor must be past every
    /// deferral window on the preferred date.
    pub fn submit(&self, actor: &Actor, new: NewDonation) -> Result<DonationRequest, EngineError> {
        EngineError::require(!new.donor_id.trim().is_empty(), "donor id is required")?;
        EngineError::require(new.bank_id > 0, "blood bank id is required")?;
        EngineError::require(
            !new.declaration.trim().is_empty(),
            "health declaration is required",
        )?;

        let projection = self.project()?;
        let history = completed_donations(&projection, &new.donor_id);
        let status = self
            .config
            .eligibility
            .evaluate(&history, new.preferred_date);
        if !status.eligible {
            return Err(EngineError::Ineligible {
                donor_id: new.donor_id,
                next_eligible: status.next_eligible_date,
            });
        }

        let id = DonationRequestId::new();
        debug!(%id, donor = %new.donor_id, "donation request submitted");
        self.ledger.append(EntryDraft::new(
            Subject::donation_request(&id),
            actor.clone(),
            self.clock.now(),
            EntryPayload::DonationSubmitted {
                donor_id: new.donor_id,
                bank_id: new.bank_id,
                blood_group: new.blood_group,
                component: new.component,
                preferred_date: new.preferred_date,
                declaration: new.declaration,
            },
        ))?;
        self.donation_view(&id)
    }

    /// Approve a pending donation request.
    pub fn approve(
        &self,
        actor: &Actor,
        id: DonationRequestId,
    ) -> Result<DonationRequest, EngineError> {
        let donation = self.donation_in(&self.project()?, &id)?;
        require_donation(&donation, DonationStatus::Pending, "approve")?;

        self.ledger.append(EntryDraft::new(
            Subject::donation_request(&id),
            actor.clone(),
            self.clock.now(),
            EntryPayload::DonationApproved,
        ))?;
        self.donation_view(&id)
    }

    /// Reject a pending donation request.
    pub fn reject(
        &self,
        actor: &Actor,
        id: DonationRequestId,
        reason: Option<String>,
    ) -> Result<DonationRequest, EngineError> {
        let donation = self.donation_in(&self.project()?, &id)?;
        require_donation(&donation, DonationStatus::Pending, "reject")?;

        self.ledger.append(EntryDraft::new(
            Subject::donation_request(&id),
            actor.clone(),
            self.clock.now(),
            EntryPayload::DonationRejected { reason },
        ))?;
        self.donation_view(&id)
    }

    /// Record that an approved donation took place, creating the physical
    /// unit. Under immediate storage this appends COLLECTED and STORED as
    /// one atomic batch; under screening-required only COLLECTED.
    ///
    /// The unit id is drawn until it is free in the projected state, and
    /// the append is guarded by the snapshot's tail, so a racing completion
    /// can neither reuse an id nor slip a duplicate past the check.
    pub fn complete(
        &self,
        actor: &Actor,
        id: DonationRequestId,
        data: CompletionData,
    ) -> Result<BloodUnit, EngineError> {
        EngineError::require(data.volume_ml > 0, "collected volume must be positive")?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let (projection, head) = self.snapshot()?;
            let donation = self.donation_in(&projection, &id)?;
            if donation.status == DonationStatus::Completed {
                return Err(EngineError::DuplicateCompletion(id));
            }
            require_donation(&donation, DonationStatus::Approved, "complete")?;

            let collection_date = self.clock.today();
            let shelf_life = self.config.shelf_life.days_for(donation.component);
            let expiry_date = collection_date + Duration::days(i64::from(shelf_life));
            let unit_id = fresh_unit_id(&projection, || {
                UnitId::generate(donation.bank_id, collection_date)
            });

            let mut drafts = vec![EntryDraft::new(
                Subject::blood_unit(&unit_id),
                actor.clone(),
                self.clock.now(),
                EntryPayload::Collected {
                    donation_request_id: id,
                    donor_id: donation.donor_id.clone(),
                    blood_group: donation.blood_group,
                    component: donation.component,
                    volume_ml: data.volume_ml,
                    collection_date,
                    expiry_date,
                },
            )];
            match self.config.storage_policy {
                StoragePolicy::ImmediateStorage => {
                    let location = data.storage_location.clone().ok_or_else(|| {
                        EngineError::Validation("storage location is required".into())
                    })?;
                    drafts.push(EntryDraft::new(
                        Subject::blood_unit(&unit_id),
                        actor.clone(),
                        self.clock.now(),
                        EntryPayload::Stored { location },
                    ));
                }
                StoragePolicy::RequireNegativeScreening => {}
            }

            match self.ledger.append_batch_at(head, drafts) {
                Ok(_) => {
                    debug!(%unit_id, donation = %id, "donation completed");
                    return self.unit_view(&unit_id);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_append_attempts => {
                    debug!(donation = %id, attempt, "completion lost append race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record the screening panel for a collected unit. A fully negative
    /// panel moves it to TESTED; any positive screen rejects it.
    pub fn record_test_results(
        &self,
        actor: &Actor,
        unit_id: &UnitId,
        panel: TestPanel,
    ) -> Result<BloodUnit, EngineError> {
        EngineError::require(
            panel.status() != TestStatus::Pending,
            "screening panel is incomplete",
        )?;

        let unit = self.unit_in(&self.project()?, unit_id)?;
        require_unit(&unit, UnitStatus::Collected, "record test results")?;

        let payload = match panel.status() {
            TestStatus::Passed => EntryPayload::Tested { panel, notes: None },
            _ => EntryPayload::ScreeningRejected { panel },
        };
        self.ledger.append(EntryDraft::new(
            Subject::blood_unit(unit_id),
            actor.clone(),
            self.clock.now(),
            payload,
        ))?;
        self.unit_view(unit_id)
    }

    /// Move a unit into storage. Under screening-required policy the unit
    /// must hold a passed panel, which means it is TESTED.
    pub fn store_unit(
        &self,
        actor: &Actor,
        unit_id: &UnitId,
        location: String,
    ) -> Result<BloodUnit, EngineError> {
        EngineError::require(!location.trim().is_empty(), "storage location is required")?;

        let unit = self.unit_in(&self.project()?, unit_id)?;
        if self.config.storage_policy == StoragePolicy::RequireNegativeScreening
            && unit.tests.status() != TestStatus::Passed
        {
            return Err(EngineError::InvalidState {
                entity: format!("unit {unit_id}"),
                from: format!("{} with panel {:?}", unit.status, unit.tests.status()),
                op: "store",
            });
        }
        if !unit.status.can_transition_to(UnitStatus::Stored) {
            return Err(EngineError::InvalidState {
                entity: format!("unit {unit_id}"),
                from: unit.status.to_string(),
                op: "store",
            });
        }

        self.ledger.append(EntryDraft::new(
            Subject::blood_unit(unit_id),
            actor.clone(),
            self.clock.now(),
            EntryPayload::Stored { location },
        ))?;
        self.unit_view(unit_id)
    }

    fn project(&self) -> Result<Projection, EngineError> {
        Ok(Projection::from_reader(self.ledger.as_ref())?)
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

    fn donation_in(
        &self,
        projection: &Projection,
        id: &DonationRequestId,
    ) -> Result<DonationRequest, EngineError> {
        projection
            .donation(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("donation {id}")))
    }

    fn unit_in(&self, projection: &Projection, id: &UnitId) -> Result<BloodUnit, EngineError> {
        projection
            .unit(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("unit {id}")))
    }

    fn donation_view(&self, id: &DonationRequestId) -> Result<DonationRequest, EngineError> {
        self.donation_in(&self.project()?, id)
    }

    fn unit_view(&self, id: &UnitId) -> Result<BloodUnit, EngineError> {
        self.unit_in(&self.project()?, id)
    }
}

/// A donor's completed donations, as the eligibility evaluator wants them.
pub(crate) fn completed_donations(
    projection: &Projection,
    donor_id: &str,
) -> Vec<CompletedDonation> {
    projection
        .units()
        .filter(|u| u.donor_id == donor_id)
        .map(|u| CompletedDonation::new(u.collection_date, u.component))
        .collect()
}

/// Draw unit ids until one is free in the projected state. The per-day
/// suffix is only four hex digits, so busy same-day banks do collide.
fn fresh_unit_id<F>(projection: &Projection, mut next: F) -> UnitId
where
    F: FnMut() -> UnitId,
{
    loop {
        let id = next();
        if projection.unit(&id).is_none() {
            return id;
        }
    }
}

fn require_donation(
    donation: &DonationRequest,
    expected: DonationStatus,
    op: &'static str,
) -> Result<(), EngineError> {
    if donation.status == expected {
        Ok(())
    } else {
        Err(EngineError::InvalidState {
            entity: format!("donation {}", donation.id),
            from: donation.status.to_string(),
            op,
        })
    }
}

fn require_unit(
    unit: &BloodUnit,
    expected: UnitStatus,
    op: &'static str,
) -> Result<(), EngineError> {
    if unit.status == expected {
        Ok(())
    } else {
        Err(EngineError::InvalidState {
            entity: format!("unit {}", unit.id),
            from: unit.status.to_string(),
            op,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemo_ledger::{InMemoryLedger, LedgerReader};
    use hemo_types::{Role, TestResult};

    use crate::clock::FixedClock;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn workflow(config: WorkflowConfig) -> DonationWorkflow<InMemoryLedger> {
        workflow_at(config, date(2026, 8, 27))
    }

    fn workflow_at(config: WorkflowConfig, today: NaiveDate) -> DonationWorkflow<InMemoryLedger> {
        DonationWorkflow::new(
            Arc::new(InMemoryLedger::new()),
            Arc::new(FixedClock::at_date(today)),
            Arc::new(config),
        )
    }

    fn donor() -> Actor {
        Actor::new("donor@example.org", Role::Donor)
    }

    fn clerk() -> Actor {
        Actor::new("clerk@bank.example", Role::BloodBank)
    }

    fn new_donation(preferred: NaiveDate) -> NewDonation {
        NewDonation {
            donor_id: "donor@example.org".into(),
            bank_id: 1,
            blood_group: BloodGroup::OPos,
            component: ComponentType::WholeBlood,
            preferred_date: preferred,
            declaration: "no recent illness".into(),
        }
    }

    fn completion(volume_ml: u32) -> CompletionData {
        CompletionData {
            volume_ml,
            storage_location: Some("Fridge1".into()),
        }
    }

    #[test]
    fn submit_approve_complete_stores_unit_with_two_chained_entries() {
        let wf = workflow(WorkflowConfig::default());
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();
        wf.approve(&clerk(), donation.id).unwrap();

        let tail_before = wf.ledger.head().unwrap().unwrap();
        let unit = wf.complete(&clerk(), donation.id, completion(450)).unwrap();

        assert_eq!(unit.status, UnitStatus::Stored);
        assert_eq!(unit.volume_ml, 450);
        assert_eq!(unit.storage_location.as_deref(), Some("Fridge1"));
        // Whole blood: 35 days from the pinned collection date.
        assert_eq!(unit.collection_date, date(2026, 8, 27));
        assert_eq!(unit.expiry_date, date(2026, 10, 1));
        assert!(unit.id.as_str().starts_with("BB01-20260827-"));

        // Exactly COLLECTED then STORED, linked from the prior tail.
        let appended = wf.ledger.read_since(tail_before.seq).unwrap();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0].prev_hash, Some(tail_before.hash));
        assert_eq!(appended[1].prev_hash, Some(appended[0].hash));

        let donation = wf.project().unwrap().donation(&donation.id).cloned().unwrap();
        assert_eq!(donation.status, DonationStatus::Completed);
        assert_eq!(donation.unit_id, Some(unit.id));
    }

    #[test]
    fn complete_requires_approval_first() {
        let wf = workflow(WorkflowConfig::default());
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();

        let err = wf
            .complete(&clerk(), donation.id, completion(450))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { op: "complete", .. }));
    }

    #[test]
    fn completion_skips_unit_ids_already_on_the_ledger() {
        let wf = workflow(WorkflowConfig::default());
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();
        wf.approve(&clerk(), donation.id).unwrap();
        let taken = wf.complete(&clerk(), donation.id, completion(450)).unwrap().id;

        // A generator that keeps hitting the existing id must be redrawn
        // until it yields a free one.
        let (projection, _) = wf.snapshot().unwrap();
        let free: UnitId = "BB01-20260827-0000".parse().unwrap();
        let mut candidates = vec![taken.clone(), taken, free.clone()].into_iter();
        let picked = fresh_unit_id(&projection, || candidates.next().unwrap());
        assert_eq!(picked, free);
        assert!(candidates.next().is_none());
    }

    #[test]
    fn same_day_completions_keep_the_read_models_healthy() {
        let wf = workflow(WorkflowConfig::default());
        let mut ids = std::collections::BTreeSet::new();
        for n in 0..32 {
            let mut new = new_donation(date(2026, 8, 27));
            new.donor_id = format!("donor{n}@example.org");
            let donation = wf.submit(&donor(), new).unwrap();
            wf.approve(&clerk(), donation.id).unwrap();
            let unit = wf.complete(&clerk(), donation.id, completion(450)).unwrap();
            assert!(ids.insert(unit.id));
        }
        assert_eq!(wf.project().unwrap().units().count(), 32);
    }

    #[test]
    fn completing_twice_is_a_duplicate() {
        let wf = workflow(WorkflowConfig::default());
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();
        wf.approve(&clerk(), donation.id).unwrap();
        wf.complete(&clerk(), donation.id, completion(450)).unwrap();

        let err = wf
            .complete(&clerk(), donation.id, completion(450))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateCompletion(id) if id == donation.id));
    }

    #[test]
    fn rejected_donation_is_terminal() {
        let wf = workflow(WorkflowConfig::default());
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();
        let rejected = wf
            .reject(&clerk(), donation.id, Some("incomplete declaration".into()))
            .unwrap();
        assert_eq!(rejected.status, DonationStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("incomplete declaration")
        );

        let err = wf.approve(&clerk(), donation.id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { op: "approve", .. }));
    }

    #[test]
    fn submit_validates_inputs() {
        let wf = workflow(WorkflowConfig::default());
        let mut blank_donor = new_donation(date(2026, 8, 27));
        blank_donor.donor_id = "  ".into();
        assert!(matches!(
            wf.submit(&donor(), blank_donor),
            Err(EngineError::Validation(_))
        ));

        let mut no_bank = new_donation(date(2026, 8, 27));
        no_bank.bank_id = 0;
        assert!(matches!(
            wf.submit(&donor(), no_bank),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn recent_donor_is_deferred_until_day_ninety() {
        let wf = workflow(WorkflowConfig::default());
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();
        wf.approve(&clerk(), donation.id).unwrap();
        wf.complete(&clerk(), donation.id, completion(450)).unwrap();

        // Collected 2026-08-27, so deferred through 2026-11-24.
        let err = wf
            .submit(&donor(), new_donation(date(2026, 11, 24)))
            .unwrap_err();
        match err {
            EngineError::Ineligible { next_eligible, .. } => {
                assert_eq!(next_eligible, date(2026, 11, 25));
                assert_eq!(next_eligible, date(2026, 8, 27) + Duration::days(90));
            }
            other => panic!("expected Ineligible, got {other:?}"),
        }

        // Day 90 exactly is allowed again.
        assert!(wf.submit(&donor(), new_donation(date(2026, 11, 25))).is_ok());
    }

    #[test]
    fn screening_policy_holds_unit_out_of_storage() {
        let config = WorkflowConfig {
            storage_policy: StoragePolicy::RequireNegativeScreening,
            ..WorkflowConfig::default()
        };
        let wf = workflow(config);
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();
        wf.approve(&clerk(), donation.id).unwrap();

        let unit = wf
            .complete(
                &clerk(),
                donation.id,
                CompletionData {
                    volume_ml: 450,
                    storage_location: None,
                },
            )
            .unwrap();
        assert_eq!(unit.status, UnitStatus::Collected);

        // Not screened yet: storage refused.
        let err = wf
            .store_unit(&clerk(), &unit.id, "Fridge1".into())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { op: "store", .. }));

        let tested = wf
            .record_test_results(&clerk(), &unit.id, TestPanel::all_negative())
            .unwrap();
        assert_eq!(tested.status, UnitStatus::Tested);

        let stored = wf.store_unit(&clerk(), &unit.id, "Fridge1".into()).unwrap();
        assert_eq!(stored.status, UnitStatus::Stored);
        assert_eq!(stored.storage_location.as_deref(), Some("Fridge1"));
    }

    #[test]
    fn positive_screen_rejects_the_unit() {
        let config = WorkflowConfig {
            storage_policy: StoragePolicy::RequireNegativeScreening,
            ..WorkflowConfig::default()
        };
        let wf = workflow(config);
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();
        wf.approve(&clerk(), donation.id).unwrap();
        let unit = wf
            .complete(
                &clerk(),
                donation.id,
                CompletionData {
                    volume_ml: 450,
                    storage_location: None,
                },
            )
            .unwrap();

        let panel = TestPanel {
            hiv: TestResult::Negative,
            hbv: TestResult::Positive,
            hcv: TestResult::Negative,
        };
        let rejected = wf.record_test_results(&clerk(), &unit.id, panel).unwrap();
        assert_eq!(rejected.status, UnitStatus::Rejected);
        assert_eq!(rejected.tests, panel);

        let err = wf
            .store_unit(&clerk(), &unit.id, "Fridge1".into())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { op: "store", .. }));
    }

    #[test]
    fn incomplete_panel_is_refused() {
        let wf = workflow(WorkflowConfig::default());
        let donation = wf.submit(&donor(), new_donation(date(2026, 8, 27))).unwrap();
        wf.approve(&clerk(), donation.id).unwrap();
        let unit = wf.complete(&clerk(), donation.id, completion(450)).unwrap();

        let err = wf
            .record_test_results(&clerk(), &unit.id, TestPanel::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}

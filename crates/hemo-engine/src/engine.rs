use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use hemo_eligibility::EligibilityStatus;
use hemo_ledger::{Ledger, LedgerEntry, Subject};
use hemo_projection::{BloodUnit, DonationRequest, HospitalRequest, InventorySnapshot, Projection};
use hemo_types::{DonationRequestId, HospitalRequestId, UnitId};
use hemo_verify::{EntryVerification, UnitVerification, VerificationReport, VerificationService};

use crate::clock::{Clock, SystemClock};
use crate::config::WorkflowConfig;
use crate::donation::{completed_donations, DonationWorkflow};
use crate::error::EngineError;
use crate::request::RequestWorkflow;

/// The embedding surface: workflows for writes, projection-backed read
/// models, audit queries, and verification, all over one ledger.
pub struct HemoChain<L: Ledger> {
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
    config: Arc<WorkflowConfig>,
    donations: DonationWorkflow<L>,
    requests: RequestWorkflow<L>,
    verifier: VerificationService<L>,
}

impl<L: Ledger> HemoChain<L> {
    pub fn new(ledger: L, config: WorkflowConfig) -> Self {
        Self::with_clock(ledger, config, Arc::new(SystemClock))
    }

    /// Build with an explicit clock, the seam tests pin time through.
    pub fn with_clock(ledger: L, config: WorkflowConfig, clock: Arc<dyn Clock>) -> Self {
        let ledger = Arc::new(ledger);
        let config = Arc::new(config);
        Self {
            donations: DonationWorkflow::new(ledger.clone(), clock.clone(), config.clone()),
            requests: RequestWorkflow::new(ledger.clone(), clock.clone(), config.clone()),
            verifier: VerificationService::new(ledger.clone()),
            ledger,
            clock,
            config,
        }
    }

    pub fn donations(&self) -> &DonationWorkflow<L> {
        &self.donations
    }

    pub fn requests(&self) -> &RequestWorkflow<L> {
        &self.requests
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    // ----- read models -----

    pub fn projection(&self) -> Result<Projection, EngineError> {
        Ok(Projection::from_reader(self.ledger.as_ref())?)
    }

    /// Stock aggregates as of today, expiry applied lazily.
    pub fn inventory(&self) -> Result<InventorySnapshot, EngineError> {
        self.inventory_as_of(self.clock.today())
    }

    pub fn inventory_as_of(&self, as_of: NaiveDate) -> Result<InventorySnapshot, EngineError> {
        Ok(InventorySnapshot::compute(&self.projection()?, as_of))
    }

    pub fn unit(&self, id: &UnitId) -> Result<BloodUnit, EngineError> {
        self.projection()?
            .unit(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("unit {id}")))
    }

    pub fn donation(&self, id: &DonationRequestId) -> Result<DonationRequest, EngineError> {
        self.projection()?
            .donation(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("donation {id}")))
    }

    pub fn request(&self, id: &HospitalRequestId) -> Result<HospitalRequest, EngineError> {
        self.projection()?
            .request(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("request {id}")))
    }

    /// May this donor donate today?
    pub fn eligibility(&self, donor_id: &str) -> Result<EligibilityStatus, EngineError> {
        let projection = self.projection()?;
        let history = completed_donations(&projection, donor_id);
        Ok(self
            .config
            .eligibility
            .evaluate(&history, self.clock.today()))
    }

    // ----- audit queries -----

    /// Full ledger history of one subject, oldest first.
    pub fn history(&self, subject: &Subject) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.ledger.read_subject(subject)?)
    }

    pub fn unit_history(&self, id: &UnitId) -> Result<Vec<LedgerEntry>, EngineError> {
        self.history(&Subject::blood_unit(id))
    }

    /// Everything one actor did, newest first.
    pub fn activity_of(&self, actor_id: &str) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.ledger.read_by_actor(actor_id)?)
    }

    /// The most recent `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.ledger.read_recent(n)?)
    }

    /// Entries within `[from, to]`, in sequence order.
    pub fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.ledger.read_between(from, to)?)
    }

    // ----- verification -----

    pub fn verify_entry(&self, seq: u64) -> Result<EntryVerification, hemo_verify::VerifyError> {
        self.verifier.verify_entry(seq)
    }

    pub fn verify_unit(&self, id: &UnitId) -> Result<UnitVerification, hemo_verify::VerifyError> {
        self.verifier.verify_unit(id)
    }

    /// Re-verify the entire chain.
    pub fn verify(&self) -> Result<VerificationReport, hemo_verify::VerifyError> {
        self.verifier.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use chrono::NaiveDate;
    use hemo_ledger::{FileLedger, InMemoryLedger, LedgerFileConfig, LedgerReader};
    use hemo_types::{Actor, BloodGroup, ComponentType, Role, StockLevel, Urgency};

    use crate::clock::FixedClock;
    use crate::donation::{CompletionData, NewDonation};
    use crate::request::NewRequest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clerk() -> Actor {
        Actor::new("clerk@bank.example", Role::BloodBank)
    }

    fn ward() -> Actor {
        Actor::new("ward@hospital.example", Role::Hospital)
    }

    fn engine_with_config(config: WorkflowConfig) -> HemoChain<InMemoryLedger> {
        HemoChain::with_clock(
            InMemoryLedger::new(),
            config,
            Arc::new(FixedClock::at_date(date(2026, 8, 27))),
        )
    }

    fn stock_units<L: Ledger>(chain: &HemoChain<L>, n: u32) -> Vec<UnitId> {
        (0..n)
            .map(|i| {
                let donation = chain
                    .donations()
                    .submit(
                        &Actor::new(format!("donor{i}@example.org"), Role::Donor),
                        NewDonation {
                            donor_id: format!("donor{i}@example.org"),
                            bank_id: 1,
                            blood_group: BloodGroup::OPos,
                            component: ComponentType::WholeBlood,
                            preferred_date: date(2026, 8, 27),
                            declaration: "healthy".into(),
                        },
                    )
                    .unwrap();
                chain.donations().approve(&clerk(), donation.id).unwrap();
                chain
                    .donations()
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
            })
            .collect()
    }

    fn one_unit_request<L: Ledger>(chain: &HemoChain<L>) -> HospitalRequestId {
        chain
            .requests()
            .create(
                &ward(),
                NewRequest {
                    hospital_id: "ward@hospital.example".into(),
                    blood_group: BloodGroup::OPos,
                    component: ComponentType::WholeBlood,
                    quantity: 1,
                    urgency: Urgency::Urgent,
                },
            )
            .unwrap()
            .id
    }

    #[test]
    fn concurrent_approvals_exhaust_stock_exactly() {
        // Plenty of retries so threads only fail for real stock reasons.
        let config = WorkflowConfig {
            max_append_attempts: 64,
            ..WorkflowConfig::default()
        };
        let chain = engine_with_config(config);
        stock_units(&chain, 3);
        let request_ids: Vec<HospitalRequestId> =
            (0..5).map(|_| one_unit_request(&chain)).collect();

        let results: Vec<Result<HospitalRequest, EngineError>> = std::thread::scope(|s| {
            let handles: Vec<_> = request_ids
                .iter()
                .map(|&id| {
                    let chain = &chain;
                    s.spawn(move || chain.requests().approve(&clerk(), id))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut reserved: BTreeSet<UnitId> = BTreeSet::new();
        let mut successes = 0;
        for result in results {
            match result {
                Ok(approved) => {
                    successes += 1;
                    for unit in approved.reserved_units {
                        // No unit reserved twice.
                        assert!(reserved.insert(unit));
                    }
                }
                Err(EngineError::InsufficientStock {
                    requested: 1,
                    available,
                }) => assert_eq!(available, 0),
                Err(other) => panic!("unexpected failure: {other:?}"),
            }
        }
        assert_eq!(successes, 3);
        assert_eq!(reserved.len(), 3);

        let snapshot = chain.inventory().unwrap();
        let count = snapshot.count(BloodGroup::OPos, ComponentType::WholeBlood);
        assert_eq!(count.available, 0);
        assert_eq!(count.reserved, 3);
    }

    #[test]
    fn inventory_classifies_stock_levels() {
        let chain = engine_with_config(WorkflowConfig::default());
        stock_units(&chain, 4);

        let snapshot = chain.inventory().unwrap();
        let count = snapshot.count(BloodGroup::OPos, ComponentType::WholeBlood);
        assert_eq!(count.available, 4);
        assert_eq!(count.level(), StockLevel::Low);
        assert_eq!(
            snapshot.count(BloodGroup::ANeg, ComponentType::Plasma).stored,
            0
        );
    }

    #[test]
    fn eligibility_read_model_reflects_completed_donations() {
        let chain = engine_with_config(WorkflowConfig::default());
        stock_units(&chain, 1);

        let fresh = chain.eligibility("someone-else@example.org").unwrap();
        assert!(fresh.eligible);

        let donor = chain.eligibility("donor0@example.org").unwrap();
        assert!(!donor.eligible);
        assert_eq!(donor.next_eligible_date, date(2026, 11, 25));
    }

    #[test]
    fn audit_queries_cover_subject_actor_and_recency() {
        let chain = engine_with_config(WorkflowConfig::default());
        let units = stock_units(&chain, 2);

        let history = chain.unit_history(&units[0]).unwrap();
        assert_eq!(history.len(), 2); // COLLECTED, STORED
        assert!(history[0].seq < history[1].seq);

        let clerk_activity = chain.activity_of("clerk@bank.example").unwrap();
        assert!(clerk_activity.len() >= 4);
        assert!(clerk_activity.windows(2).all(|w| w[0].seq > w[1].seq));

        let recent = chain.recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        let tail = chain.ledger().head().unwrap().unwrap();
        assert_eq!(recent[0].seq, tail.seq);
    }

    #[test]
    fn verification_covers_units_and_whole_chain() {
        let chain = engine_with_config(WorkflowConfig::default());
        let units = stock_units(&chain, 1);

        let report = chain.verify().unwrap();
        assert!(report.authentic);

        let unit = chain.verify_unit(&units[0]).unwrap();
        assert!(unit.entry.authentic);

        let genesis = chain.verify_entry(1).unwrap();
        assert!(genesis.authentic);
    }

    #[test]
    fn full_lifecycle_survives_file_ledger_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.hlog");
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_date(date(2026, 8, 27)));

        let request_id;
        let unit_id;
        {
            let ledger = FileLedger::open(&path, LedgerFileConfig::default()).unwrap();
            let chain =
                HemoChain::with_clock(ledger, WorkflowConfig::default(), clock.clone());
            unit_id = stock_units(&chain, 1).remove(0);
            request_id = one_unit_request(&chain);
            chain.requests().approve(&clerk(), request_id).unwrap();
            chain.requests().dispatch(&clerk(), request_id).unwrap();
            chain
                .requests()
                .confirm_receipt(&ward(), request_id)
                .unwrap();
            chain
                .requests()
                .record_transfusion(&ward(), &unit_id, None)
                .unwrap();
        }

        let ledger = FileLedger::open(&path, LedgerFileConfig::default()).unwrap();
        let chain = HemoChain::with_clock(ledger, WorkflowConfig::default(), clock);
        assert!(chain.verify().unwrap().authentic);

        let unit = chain.unit(&unit_id).unwrap();
        assert_eq!(unit.status.to_string(), "USED");
        let request = chain.request(&request_id).unwrap();
        assert_eq!(request.status.to_string(), "COMPLETED");
    }
}

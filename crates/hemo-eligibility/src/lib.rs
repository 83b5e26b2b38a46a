//! Donor eligibility evaluation for HemoChain.
//!
//! A donor who completed a donation on day `D` is deferred for the
//! component's interval: ineligible on every day in `[D, D + interval)`
//! and eligible again on `D + interval` exactly. Evaluation is a pure
//! function of the donor's completed-donation history and a query date;
//! nothing here reads the ledger or the clock.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use hemo_types::ComponentType;

/// Deferral intervals between donations, in days.
///
/// The default interval applies to every component without an explicit
/// override. Defaults to the standard 90-day whole-blood deferral.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityPolicy {
    /// Days a donor must wait after a completed donation.
    pub default_interval_days: u32,
    /// Per-component overrides of the default interval.
    pub interval_days: BTreeMap<ComponentType, u32>,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            default_interval_days: 90,
            interval_days: BTreeMap::new(),
        }
    }
}

impl EligibilityPolicy {
    pub fn interval_for(&self, component: ComponentType) -> u32 {
        self.interval_days
            .get(&component)
            .copied()
            .unwrap_or(self.default_interval_days)
    }
}

/// One completed donation in a donor's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedDonation {
    pub date: NaiveDate,
    pub component: ComponentType,
}

impl CompletedDonation {
    pub fn new(date: NaiveDate, component: ComponentType) -> Self {
        Self { date, component }
    }
}

/// Answer to "may this donor donate on `query_date`?".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityStatus {
    pub eligible: bool,
    /// Set when ineligible: the donation holding the donor back.
    pub deferred_by: Option<CompletedDonation>,
    /// First date the donor is eligible again. Equals `query_date` (or
    /// earlier history permitting) when `eligible` is true.
    pub next_eligible_date: NaiveDate,
}

impl EligibilityPolicy {
    /// Evaluate a donor's history against a query date.
    ///
    /// Every completed donation defers independently; the donor is
    /// eligible once all deferral windows have elapsed.
    pub fn evaluate(
        &self,
        history: &[CompletedDonation],
        query_date: NaiveDate,
    ) -> EligibilityStatus {
        let mut next_eligible_date = query_date;
        let mut deferred_by = None;

        for donation in history {
            let interval = i64::from(self.interval_for(donation.component));
            let released = donation.date + Duration::days(interval);
            if query_date < released && released > next_eligible_date {
                next_eligible_date = released;
                deferred_by = Some(*donation);
            }
        }

        EligibilityStatus {
            eligible: deferred_by.is_none(),
            deferred_by,
            next_eligible_date,
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a physical blood unit.
///
/// Transitions are monotonic along
/// COLLECTED → TESTED → STORED → DISPATCHED → RECEIVED → USED, with side
/// transitions to EXPIRED (from TESTED/STORED, evaluated lazily on read)
/// and REJECTED (failed screening). Anything not in
/// [`UnitStatus::can_transition_to`] is refused at append time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    Collected,
    Tested,
    Stored,
    Dispatched,
    Received,
    Used,
    Expired,
    Rejected,
}

impl UnitStatus {
    /// The closed transition table for blood units.
    pub fn can_transition_to(&self, next: UnitStatus) -> bool {
        use UnitStatus::*;
        matches!(
            (self, next),
            (Collected, Tested)
                | (Collected, Stored)
                | (Collected, Rejected)
                | (Tested, Stored)
                | (Tested, Rejected)
                | (Tested, Expired)
                | (Stored, Dispatched)
                | (Stored, Expired)
                | (Dispatched, Received)
                | (Received, Used)
        )
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Used | Self::Expired | Self::Rejected)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Collected => "COLLECTED",
            Self::Tested => "TESTED",
            Self::Stored => "STORED",
            Self::Dispatched => "DISPATCHED",
            Self::Received => "RECEIVED",
            Self::Used => "USED",
            Self::Expired => "EXPIRED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// Status of a donor's donation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DonationStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

impl DonationStatus {
    pub fn can_transition_to(&self, next: DonationStatus) -> bool {
        use DonationStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// Status of a hospital's stock request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Dispatched,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Dispatched)
                | (Dispatched, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// The request still holds its reservation in these states.
    pub fn holds_reservation(&self) -> bool {
        matches!(self, Self::Approved | Self::Dispatched)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Dispatched => "DISPATCHED",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// Urgency of a hospital request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    Routine,
    /// Needed within 24 hours.
    Urgent,
    /// Critical, needed immediately.
    Emergency,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Routine => "ROUTINE",
            Self::Urgent => "URGENT",
            Self::Emergency => "EMERGENCY",
        };
        f.write_str(s)
    }
}

/// Result of a single infectious-disease screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestResult {
    #[default]
    Pending,
    Negative,
    Positive,
}

/// HIV/HBV/HCV screening panel for a blood unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestPanel {
    pub hiv: TestResult,
    pub hbv: TestResult,
    pub hcv: TestResult,
}

/// Aggregate outcome of a [`TestPanel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    /// At least one screen has not been run.
    Pending,
    /// All screens negative.
    Passed,
    /// At least one screen positive.
    Failed,
}

impl TestPanel {
    /// A panel with all screens negative.
    pub const fn all_negative() -> Self {
        Self {
            hiv: TestResult::Negative,
            hbv: TestResult::Negative,
            hcv: TestResult::Negative,
        }
    }

    pub fn status(&self) -> TestStatus {
        let results = [self.hiv, self.hbv, self.hcv];
        if results.contains(&TestResult::Positive) {
            TestStatus::Failed
        } else if results.contains(&TestResult::Pending) {
            TestStatus::Pending
        } else {
            TestStatus::Passed
        }
    }
}

/// Stock-level classification for an inventory aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockLevel {
    Safe,
    Low,
    Critical,
}

impl StockLevel {
    /// Fixed thresholds: ≥10 available units is Safe, 3–9 Low, <3 Critical.
    pub fn classify(available: u32) -> Self {
        if available >= 10 {
            Self::Safe
        } else if available >= 3 {
            Self::Low
        } else {
            Self::Critical
        }
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use hemo_types::{
    BloodGroup, ComponentType, DonationRequestId, DonationStatus, HospitalRequestId,
    RequestNumber, RequestStatus, TestPanel, UnitId, UnitStatus, Urgency,
};

/// A physical blood unit, reconstructed from its ledger history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodUnit {
    pub id: UnitId,
    pub donor_id: String,
    pub donation_request_id: DonationRequestId,
    pub blood_group: BloodGroup,
    pub component: ComponentType,
    pub volume_ml: u32,
    pub collection_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: UnitStatus,
    pub tests: TestPanel,
    pub storage_location: Option<String>,
}

impl BloodUnit {
    /// Status with expiry applied lazily: a TESTED or STORED unit past its
    /// expiry date reads as EXPIRED without any ledger write.
    pub fn status_as_of(&self, date: NaiveDate) -> UnitStatus {
        if matches!(self.status, UnitStatus::Tested | UnitStatus::Stored)
            && date > self.expiry_date
        {
            UnitStatus::Expired
        } else {
            self.status
        }
    }
}

/// A donor's appointment request, reconstructed from the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRequest {
    pub id: DonationRequestId,
    pub donor_id: String,
    pub bank_id: u32,
    pub blood_group: BloodGroup,
    pub component: ComponentType,
    pub preferred_date: NaiveDate,
    pub declaration: String,
    pub status: DonationStatus,
    pub rejection_reason: Option<String>,
    /// Set once the donation is completed.
    pub unit_id: Option<UnitId>,
}

/// A hospital's stock request, reconstructed from the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HospitalRequest {
    pub id: HospitalRequestId,
    pub request_number: RequestNumber,
    pub hospital_id: String,
    pub blood_group: BloodGroup,
    pub component: ComponentType,
    pub quantity: u32,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    /// Specific units held for this request once approved.
    pub reserved_units: Vec<UnitId>,
}

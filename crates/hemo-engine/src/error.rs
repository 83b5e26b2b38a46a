use chrono::NaiveDate;

use hemo_ledger::LedgerError;
use hemo_projection::ProjectionError;
use hemo_types::DonationRequestId;

/// Errors surfaced by the donation and request workflows.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{op} not allowed: {entity} is {from}")]
    InvalidState {
        entity: String,
        from: String,
        op: &'static str,
    },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("donation {0} is already completed")]
    DuplicateCompletion(DonationRequestId),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("donor {donor_id} is ineligible until {next_eligible}")]
    Ineligible {
        donor_id: String,
        next_eligible: NaiveDate,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl EngineError {
    fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn require(cond: bool, msg: &str) -> Result<(), Self> {
        if cond {
            Ok(())
        } else {
            Err(Self::validation(msg))
        }
    }
}

use hemo_ledger::LedgerError;
use hemo_types::UnitId;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no ledger entry with sequence {seq}")]
    UnknownEntry { seq: u64 },

    #[error("no ledger history for unit {unit_id}")]
    UnknownUnit { unit_id: UnitId },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

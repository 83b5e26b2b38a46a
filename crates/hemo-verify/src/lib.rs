//! Verification service for HemoChain.
//!
//! Answers "is this ledger entry authentic?" without re-walking the whole
//! chain on every call: entries verified once stay verified (the ledger is
//! append-only), so the service caches the longest verified prefix and only
//! checks the entries appended since.
//!
//! A detected violation is never silent. The service re-runs the ledger's
//! own [`verify_chain`](hemo_ledger::LedgerReader::verify_chain), which
//! halts all further writes until the process restarts on repaired storage.

pub mod error;
pub mod service;

pub use error::VerifyError;
pub use service::{EntryVerification, UnitVerification, VerificationReport, VerificationService};

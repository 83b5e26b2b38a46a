//! Append-only audit ledger for HemoChain.
//!
//! This crate is the single write path for every state change in the
//! system. It provides:
//! - The hash-linked [`LedgerEntry`] record and its typed payloads
//! - [`LedgerWriter`] / [`LedgerReader`] trait boundaries
//! - [`InMemoryLedger`] for tests and embedding
//! - [`FileLedger`] persisting entries to a CRC-framed append-only file
//! - Chain verification with halt-on-tamper semantics

pub mod entry;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

mod state;

pub use entry::{
    Action, EntryDraft, EntryPayload, HeadRef, LedgerEntry, Subject, SubjectKind,
};
pub use error::LedgerError;
pub use file::{FileLedger, LedgerFileConfig};
pub use memory::InMemoryLedger;
pub use traits::{Ledger, LedgerReader, LedgerWriter};

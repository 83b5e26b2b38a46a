//! HemoChain engine: the write-side workflows and the embedding facade.
//!
//! [`HemoChain`] wires one ledger to the donation and hospital-request
//! workflows, the inventory projection, the eligibility evaluator, and the
//! verification service. Embedders construct it once and treat it as the
//! whole system:
//!
//! ```
//! use hemo_engine::{HemoChain, WorkflowConfig};
//! use hemo_ledger::InMemoryLedger;
//!
//! let chain = HemoChain::new(InMemoryLedger::new(), WorkflowConfig::default());
//! assert!(chain.inventory().unwrap().counts().next().is_none());
//! ```
//!
//! Writes only ever happen through the workflows, which validate state
//! transitions before appending; the ledger itself stays the single source
//! of truth, and every read model is a fold over it.

pub mod clock;
pub mod config;
pub mod donation;
pub mod engine;
pub mod error;
pub mod request;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ShelfLifePolicy, StoragePolicy, WorkflowConfig};
pub use donation::{CompletionData, DonationWorkflow, NewDonation};
pub use engine::HemoChain;
pub use error::EngineError;
pub use request::{NewRequest, RequestWorkflow};

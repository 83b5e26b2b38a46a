//! Inventory projector for HemoChain.
//!
//! Inventory is never stored as mutable state. Current blood-unit,
//! donation-request, and hospital-request views are derived by folding the
//! audit ledger in sequence order; aggregates are recomputed from those
//! views on demand. Re-running the fold on the same prefix always yields
//! the same snapshot.

pub mod error;
pub mod inventory;
pub mod projector;
pub mod views;

pub use error::ProjectionError;
pub use inventory::{InventorySnapshot, StockCount};
pub use projector::Projection;
pub use views::{BloodUnit, DonationRequest, HospitalRequest};

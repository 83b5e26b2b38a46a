//! Foundation types for HemoChain.
//!
//! This crate provides the blood-banking domain vocabulary used throughout
//! the HemoChain system. Every other HemoChain crate depends on `hemo-types`.
//!
//! # Key Types
//!
//! - [`BloodGroup`] — ABO/Rh blood group
//! - [`ComponentType`] — blood component with its shelf life
//! - [`UnitStatus`] / [`DonationStatus`] / [`RequestStatus`] — closed
//!   lifecycle enums with explicit transition tables
//! - [`TestPanel`] — HIV/HBV/HCV screening results
//! - [`Actor`] — already-authenticated identity performing an action
//! - [`UnitId`], [`DonationRequestId`], [`HospitalRequestId`] — typed ids

pub mod actor;
pub mod blood;
pub mod error;
pub mod ids;
pub mod status;

pub use actor::{Actor, Role};
pub use blood::{BloodGroup, ComponentType};
pub use error::TypeError;
pub use ids::{DonationRequestId, HospitalRequestId, RequestNumber, UnitId};
pub use status::{
    DonationStatus, RequestStatus, StockLevel, TestPanel, TestResult, TestStatus, UnitStatus,
    Urgency,
};

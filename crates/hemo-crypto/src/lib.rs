//! Hashing primitives for HemoChain.
//!
//! Provides the domain-separated BLAKE3 [`ContentHasher`] used when sealing
//! ledger entries, and the [`HashChainVerifier`] that checks a sequence of
//! hash-linked records for tampering.

pub mod chain;
pub mod hasher;

pub use chain::{ChainError, HashChainVerifier, HashChained};
pub use hasher::{short_hex, ContentHasher, HasherError};

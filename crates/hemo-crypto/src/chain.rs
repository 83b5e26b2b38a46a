use crate::hasher::ContentHasher;

/// Trait for records that participate in a hash chain.
pub trait HashChained {
    /// The record's own hash.
    fn entry_hash(&self) -> [u8; 32];
    /// The previous record's hash (`None` for genesis).
    fn prev_hash(&self) -> Option<[u8; 32]>;
    /// Canonical bytes covered by the hash (the record with its hash field
    /// zeroed).
    fn canonical_bytes(&self) -> Vec<u8>;
}

/// Hash chain integrity verifier.
///
/// Verifies that a sequence of records forms a valid chain: each record's
/// prev_hash matches the previous record's hash, and each record's hash is
/// correctly computed from its canonical bytes.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a chain of records, returning the first violation found.
    ///
    /// Checks:
    /// 1. The first record has no previous hash
    /// 2. Each subsequent record's prev_hash matches its predecessor's hash
    /// 3. Each record's hash is correct for its canonical bytes
    pub fn verify_chain(records: &[impl HashChained]) -> Result<(), ChainError> {
        if records.is_empty() {
            return Ok(());
        }

        if records[0].prev_hash().is_some() {
            return Err(ChainError::GenesisHasPrevHash);
        }

        let computed = Self::compute_hash(&records[0].canonical_bytes(), None);
        if computed != records[0].entry_hash() {
            return Err(ChainError::HashMismatch { index: 0 });
        }

        for i in 1..records.len() {
            let expected_prev = records[i - 1].entry_hash();
            match records[i].prev_hash() {
                Some(prev) if prev == expected_prev => {}
                Some(_) => return Err(ChainError::BrokenLink { index: i }),
                None => return Err(ChainError::MissingPrevHash { index: i }),
            }

            let computed = Self::compute_hash(&records[i].canonical_bytes(), Some(expected_prev));
            if computed != records[i].entry_hash() {
                return Err(ChainError::HashMismatch { index: i });
            }
        }

        Ok(())
    }

    /// Compute the sealed hash for canonical bytes and an optional previous
    /// hash: `BLAKE3(domain ‖ prev_hash ‖ canonical_bytes)`.
    pub fn compute_hash(canonical: &[u8], prev_hash: Option<[u8; 32]>) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ContentHasher::ENTRY.domain().as_bytes());
        hasher.update(b":");
        if let Some(prev) = prev_hash {
            hasher.update(&prev);
        }
        hasher.update(canonical);
        *hasher.finalize().as_bytes()
    }
}

/// Errors from hash chain verification, by position in the slice.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("genesis record carries a previous hash")]
    GenesisHasPrevHash,

    #[error("record {index} hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("record {index} previous-hash link is broken")]
    BrokenLink { index: usize },

    #[error("record {index} is missing its previous hash")]
    MissingPrevHash { index: usize },
}

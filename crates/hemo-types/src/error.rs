use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown blood group: {0}")]
    UnknownBloodGroup(String),

    #[error("unknown component type: {0}")]
    UnknownComponentType(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

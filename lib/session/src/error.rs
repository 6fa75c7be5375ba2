//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause:
//! backends and stores return `Report<StoreError>` so callers can attach
//! their own context while the variant stays inspectable.

use std::fmt;

/// Errors from session storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not read or write a record.
    Backend { details: String },
    /// A record could not be encoded or decoded.
    Serialization { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { details } => write!(f, "session backend error: {details}"),
            Self::Serialization { details } => {
                write!(f, "session record serialization error: {details}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

//! Core types shared by the token-handler crates.
//!
//! This crate provides the identifiers that flow between the session store,
//! the authentication flow and the HTTP surface, plus the `Result` alias used
//! for layered error reporting.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, RecordId, StateId};

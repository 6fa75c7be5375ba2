//! Error handling foundation for token-handler.
//!
//! Storage layers report failures as `rootcause` reports over their own
//! error enums; the flow layers flatten them into domain errors.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

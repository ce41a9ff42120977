//! Error types for rule construction.
//!
//! The packet path itself never fails: every call produces a verdict, and
//! malformed traffic is expressed as a drop reason. Errors only exist at the
//! edge where user-supplied rule material is turned into a filter.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Errors from validating user-supplied rule material.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid port range: first ({first}) exceeds last ({last})")]
    InvalidPortRange { first: u16, last: u16 },

    #[error("invalid prefix length: {0}")]
    PrefixLen(#[from] ipnet::PrefixLenError),
}

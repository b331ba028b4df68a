//! Error types for value parsing in netnexus-types.

use thiserror::Error;

/// Errors that can occur when parsing connectivity values.
///
/// This error type is platform-agnostic and does not include
/// radio-specific errors (those belong in netnexus-core).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The hardware address was empty after trimming.
    #[error("Invalid address: address cannot be empty")]
    EmptyAddress,

    /// The hardware address contained characters that cannot appear in one.
    #[error("Invalid address '{address}': unexpected character '{character}'")]
    InvalidAddress {
        /// The rejected input.
        address: String,
        /// The first offending character.
        character: char,
    },
}

/// Result type alias using netnexus-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

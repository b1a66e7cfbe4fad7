//! Shared error definitions for wire primitives.

use thiserror::Error;

/// Result alias used throughout the primitives crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or validating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// Declaration name failed validation.
    #[error("invalid declaration name `{name}`: {reason}")]
    InvalidDeclarationName {
        /// The offending name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Declaration body failed validation.
    #[error("invalid declaration `{name}`: {reason}")]
    InvalidDeclaration {
        /// Name of the declaration being validated.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A declaration sequence was empty or otherwise malformed.
    #[error("invalid declaration set: {reason}")]
    InvalidDeclarationSet {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

//! Error types for the core crate.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while decoding a resource quantity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// The quantity string was empty.
    #[error("Empty quantity")]
    Empty,

    /// The numeric part could not be parsed.
    #[error("Invalid number in quantity: {0:?}")]
    InvalidNumber(String),

    /// The suffix is not a known SI, binary or exponent suffix.
    #[error("Unknown suffix {suffix:?} in quantity: {quantity:?}")]
    UnknownSuffix {
        /// The full quantity string.
        quantity: String,
        /// The suffix that failed to parse.
        suffix: String,
    },

    /// The value does not fit in a signed 64-bit integer.
    #[error("Quantity out of range: {0:?}")]
    Overflow(String),
}

/// Core errors shared by the scheduler cache crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A resource quantity could not be decoded.
    #[error("Invalid quantity for {name}: {source}")]
    InvalidQuantity {
        /// Resource name the quantity was attached to.
        name: String,
        /// The underlying decode error.
        #[source]
        source: QuantityError,
    },
}

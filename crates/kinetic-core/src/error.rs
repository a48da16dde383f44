//! Error Types for Kinetic Core
//!
//! Errors raised while building or decoding messages.
//!
//! ## Error Categories
//!
//! - `InvalidPayload`: record payload could not be decoded (bad base64)
//! - `MissingPartitionKey`: a record arrived without a partition key
//!
//! All functions in this crate return `Result<T>`, aliased to `Result<T, Error>`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Missing partition key")]
    MissingPartitionKey,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::InvalidPayload(e.to_string())
    }
}

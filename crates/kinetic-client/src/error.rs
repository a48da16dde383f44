//! Error types for kinetic client operations.
//!
//! This module defines the call-level errors returned by the dispatcher, the
//! topology resolver and the stream lifecycle manager. Per-record failures are
//! NOT errors: they are reported on the `Message` itself and through the
//! dispatcher's failure handler, and the batch always completes.
//!
//! ## Error Handling Strategy
//!
//! - **Connectivity/API errors**: `Service`, `Timeout`, `ResourceNotFound`
//! - **Missing topology**: `NilDescribeStreamResponse`, `NilStreamDescription`
//! - **Incomplete responses**: `NilPutRecordsResponse`, `NilFailedRecordCount`,
//!   `OutcomeCountMismatch`
//! - **Waiters**: `WaiterCancelled`, `WaiterExhausted`
//! - **Client errors**: `ConfigError`, `MessageTooLarge`, `PoolClosed`
//!
//! ## Examples
//!
//! ```ignore
//! use kinetic_client::{BatchDispatcher, ClientError};
//!
//! match dispatcher.dispatch(&mut batch, &|m: &Message| retry_tx.try_send(m.clone())).await {
//!     Ok(report) => println!("sent {} / failed {}", report.sent, report.failed),
//!     Err(ClientError::Timeout(after)) => eprintln!("put-records timed out after {:?}", after),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Call-level error type for kinetic client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The stream service call failed (network failure or API error).
    ///
    /// Contains the service operation name and the underlying message.
    ///
    /// ## Resolution
    /// - Check connectivity to the stream service endpoint
    /// - The dispatch pool retries the batch when its retry policy allows
    #[error("Stream service call {0} failed: {1}")]
    Service(&'static str, String),

    /// The stream does not exist (or no longer exists).
    ///
    /// Deletion waiters treat this as success.
    #[error("Stream '{0}' not found")]
    ResourceNotFound(String),

    /// The put-records call did not complete within the response-read timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Describe-stream returned no response at all.
    #[error("DescribeStream returned a nil response")]
    NilDescribeStreamResponse,

    /// Describe-stream returned a response without a stream description.
    #[error("DescribeStream returned a nil StreamDescription")]
    NilStreamDescription,

    /// Put-records returned no response at all.
    #[error("PutRecords returned a nil response")]
    NilPutRecordsResponse,

    /// Put-records returned a response without the failed-record count.
    #[error("PutRecords returned a nil FailedRecordCount")]
    NilFailedRecordCount,

    /// Put-records returned a different number of outcomes than records submitted.
    ///
    /// Outcome index `i` must describe submitted record `i`; when the counts
    /// differ no outcome can be attributed safely, so none are applied.
    #[error("PutRecords returned {returned} outcomes for {submitted} records")]
    OutcomeCountMismatch { submitted: usize, returned: usize },

    /// A lifecycle waiter observed its cancellation token.
    #[error("Waiter {0} cancelled")]
    WaiterCancelled(&'static str),

    /// A lifecycle waiter ran out of attempts before the stream reached the
    /// expected state.
    #[error("Waiter {waiter} gave up after {attempts} attempts")]
    WaiterExhausted { waiter: &'static str, attempts: u32 },

    /// A single message is larger than the configured batch byte limit and can
    /// never be dispatched.
    #[error("Message of {size} bytes exceeds batch limit of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// The dispatch pool no longer accepts batches.
    #[error("Dispatch pool is closed")]
    PoolClosed,

    /// Invalid client configuration.
    ///
    /// ## Causes
    /// - Zero batch size, queue depth or rate limit
    /// - Unreadable or malformed configuration file
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ClientError {
    /// True for the errors that mean the stream's shard topology could not be read.
    pub fn is_missing_topology(&self) -> bool {
        matches!(
            self,
            ClientError::NilDescribeStreamResponse | ClientError::NilStreamDescription
        )
    }

    /// True for transient call-level failures worth resubmitting.
    ///
    /// Incomplete responses are retryable: the service contract is assumed
    /// reliable, so a malformed reply is treated like a dropped connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Service(..)
                | ClientError::Timeout(_)
                | ClientError::NilPutRecordsResponse
                | ClientError::NilFailedRecordCount
                | ClientError::OutcomeCountMismatch { .. }
        )
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(e: toml::de::Error) -> Self {
        ClientError::ConfigError(e.to_string())
    }
}

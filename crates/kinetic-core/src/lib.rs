//! Kinetic Core - shared data model
//!
//! Types exchanged between the producer side (`kinetic-client`) and the
//! consumer side (`kinetic-listener`):
//!
//! - [`Message`]: a single stream record plus its dispatch outcome
//! - [`Shard`]: one shard descriptor from a describe-stream call

pub mod error;
pub mod message;
pub mod shard;

pub use error::{Error, Result};
pub use message::Message;
pub use shard::Shard;

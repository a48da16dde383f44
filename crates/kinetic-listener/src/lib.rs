//! Kinetic Listener - consumer side of the kinetic stream client
//!
//! Bridges an external record-delivery daemon that speaks the multilang
//! protocol (newline-delimited JSON over stdin/stdout) into a bounded
//! delivery pipeline.
//!
//! - [`protocol`]: wire types and the line codec
//! - [`bridge`]: the handshake state machine with ack gating
//! - [`listener`]: the tasks that drive a bridge and hand messages to
//!   application code
//!
//! # Example
//!
//! ```ignore
//! use kinetic_listener::{Listener, ListenerConfig};
//!
//! let listener = Listener::stdio(&ListenerConfig::from(&config))?;
//! let cancel = CancellationToken::new();
//! listener.start(tokio::io::stdin(), cancel.clone()).await?;
//!
//! listener
//!     .listen(|message| async move { process(message).await }, &cancel)
//!     .await?;
//! listener.wait().await?;
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod listener;
pub mod protocol;

pub use bridge::{BridgeBuilder, BridgePhase, Callback, CallbackResult, ProtocolBridge};
pub use config::ListenerConfig;
pub use error::{ListenerError, Result};
pub use listener::Listener;
pub use protocol::{Action, ActionCodec, ActionMessage, KclRecord, StatusMessage};

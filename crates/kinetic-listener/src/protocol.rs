//! Multilang wire protocol
//!
//! The record-delivery daemon talks to this process over standard
//! input/output, one JSON object per line.
//!
//! Inbound (daemon → bridge):
//! ```text
//! {"action":"initialize","shardId":"shardId-000000000001"}
//! {"action":"processRecords","records":[{"data":"aGVsbG8=","partitionKey":"k","sequenceNumber":"1"}]}
//! {"action":"checkpoint","checkpoint":"1"}
//! {"action":"shutdown","reason":"TERMINATE"}
//! ```
//!
//! Outbound (bridge → daemon), one per handled action:
//! ```text
//! {"action":"status","responseFor":"processRecords"}
//! ```
//!
//! Framing is newline-delimited. [`ActionCodec`] decodes inbound lines and
//! encodes outbound status lines on top of `LinesCodec`. An undecodable line
//! is an error, never skipped: the handshake cannot resynchronise.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use kinetic_core::Message;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::error::{ListenerError, Result};

/// Default cap on one inbound line (16MB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Initialize,
    ProcessRecords,
    Checkpoint,
    Shutdown,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Initialize => "initialize",
            Action::ProcessRecords => "processRecords",
            Action::Checkpoint => "checkpoint",
            Action::Shutdown => "shutdown",
            Action::Status => "status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record as carried by a processRecords action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KclRecord {
    /// Base64-encoded payload
    pub data: String,

    #[serde(rename = "partitionKey", default)]
    pub partition_key: Option<String>,

    #[serde(rename = "sequenceNumber", default)]
    pub sequence_number: Option<String>,

    #[serde(rename = "subSequenceNumber", default)]
    pub sub_sequence_number: Option<i64>,

    /// Milliseconds since epoch
    #[serde(rename = "approximateArrivalTimestamp", default)]
    pub approximate_arrival_timestamp: Option<i64>,
}

impl KclRecord {
    /// Decode into a `Message`, attributing it to `shard_id` when known.
    pub fn into_message(self, shard_id: Option<&str>) -> kinetic_core::Result<Message> {
        let partition_key = self
            .partition_key
            .ok_or(kinetic_core::Error::MissingPartitionKey)?;
        let data = STANDARD.decode(self.data.as_bytes())?;

        let mut message = Message::new(partition_key, Bytes::from(data));
        message.sequence_number = self.sequence_number;
        message.sub_sequence_number = self.sub_sequence_number;
        message.approximate_arrival_timestamp = self.approximate_arrival_timestamp;
        message.shard_id = shard_id.map(str::to_string);
        Ok(message)
    }

    /// Encode a message the way the daemon would deliver it.
    pub fn from_message(message: &Message) -> Self {
        Self {
            data: STANDARD.encode(&message.data),
            partition_key: Some(message.partition_key.clone()),
            sequence_number: message.sequence_number.clone(),
            sub_sequence_number: message.sub_sequence_number,
            approximate_arrival_timestamp: message.approximate_arrival_timestamp,
        }
    }
}

/// Inbound action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActionMessage {
    Initialize {
        #[serde(rename = "shardId", default, skip_serializing_if = "Option::is_none")]
        shard_id: Option<String>,
    },
    ProcessRecords {
        #[serde(default)]
        records: Vec<KclRecord>,
    },
    Checkpoint {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checkpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Shutdown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ActionMessage {
    pub fn action(&self) -> Action {
        match self {
            ActionMessage::Initialize { .. } => Action::Initialize,
            ActionMessage::ProcessRecords { .. } => Action::ProcessRecords,
            ActionMessage::Checkpoint { .. } => Action::Checkpoint,
            ActionMessage::Shutdown { .. } => Action::Shutdown,
        }
    }

    /// Parse one protocol line.
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Outbound acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    action: Action,
    #[serde(rename = "responseFor")]
    pub response_for: Action,
}

impl StatusMessage {
    pub fn new(response_for: Action) -> Self {
        Self {
            action: Action::Status,
            response_for,
        }
    }
}

/// Newline-delimited JSON codec for the multilang protocol.
#[derive(Debug)]
pub struct ActionCodec {
    lines: LinesCodec,
}

impl Default for ActionCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionCodec {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_length),
        }
    }
}

impl Decoder for ActionCodec {
    type Item = ActionMessage;
    type Error = ListenerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ActionMessage>> {
        // Blank lines carry no action.
        while let Some(line) = self.lines.decode(src)? {
            if !line.trim().is_empty() {
                return ActionMessage::parse(&line).map(Some);
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<ActionMessage>> {
        while let Some(line) = self.lines.decode_eof(src)? {
            if !line.trim().is_empty() {
                return ActionMessage::parse(&line).map(Some);
            }
        }
        Ok(None)
    }
}

impl Encoder<StatusMessage> for ActionCodec {
    type Error = ListenerError;

    fn encode(&mut self, item: StatusMessage, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

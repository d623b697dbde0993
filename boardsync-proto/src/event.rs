//! Push channel frame format.
//!
//! Frames are JSON text on the wire. The server relay broadcasts a
//! message-create frame to every client subscribed to the board; the same
//! frame shape is used for client-to-relay publishes. The payload is a
//! partial projection: it carries no server id, and `created_at` may be
//! absent (the receiver then stamps a local receive time).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// A frame on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    /// A message was created on the board.
    Message {
        /// Message text.
        content: String,
        /// Author's user id.
        author_id: UserId,
        /// Author's display name.
        author_name: String,
        /// Creation time, if the sender supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created_at: Option<DateTime<Utc>>,
    },
}

/// Error returned when a frame fails to encode or decode.
#[derive(Debug, thiserror::Error)]
#[error("push frame codec error: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// Encodes a [`PushFrame`] as a JSON string.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode(frame: &PushFrame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decodes a [`PushFrame`] from JSON text.
///
/// # Errors
///
/// Returns [`CodecError`] for malformed or unrecognized frames.
pub fn decode(text: &str) -> Result<PushFrame, CodecError> {
    Ok(serde_json::from_str(text)?)
}

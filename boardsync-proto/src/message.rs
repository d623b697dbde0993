//! Message model for the shared feed.
//!
//! A single logical send can surface twice on a client: once as the
//! gateway's POST response and once as the push channel's broadcast echo.
//! The two carry no shared id, so identity is derived from a
//! [`Fingerprint`] of `(author, content, time bucket)` instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Maximum allowed message content size in bytes (64 KiB).
pub const MAX_CONTENT_SIZE: usize = 64 * 1024;

/// Width of one fingerprint time bucket in milliseconds.
///
/// Two representations whose `created_at` land in the same or adjacent
/// buckets are candidates for the same logical message, giving an
/// effective matching window of 2-4 seconds.
pub const FINGERPRINT_BUCKET_MS: i64 = 2_000;

/// Identifier for a message.
///
/// `Server` ids come from the persistence gateway. `Local` ids are a
/// monotonically increasing per-client sequence, used both for optimistic
/// sends awaiting confirmation and for push-delivered messages whose
/// server id is not yet known (the push payload carries none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageId {
    /// Server-assigned id of a persisted message.
    Server(i64),
    /// Client-local sequence number.
    Local(u64),
}

impl MessageId {
    /// Returns the server id, if this message has one.
    #[must_use]
    pub const fn server(&self) -> Option<i64> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Local(_) => None,
        }
    }

    /// Returns `true` for client-local sequence ids.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "#{id}"),
            Self::Local(seq) => write!(f, "local:{seq}"),
        }
    }
}

/// A message in the shared feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Dual-keyed identifier (see [`MessageId`]).
    pub id: MessageId,
    /// Message text. Never empty.
    pub content: String,
    /// Author's user id. Gates deletion.
    pub author_id: UserId,
    /// Author's display name at send time.
    pub author_name: String,
    /// When the message was created. The feed's sort key.
    pub created_at: DateTime<Utc>,
}

/// Error returned when message content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Content is empty.
    #[error("message content cannot be empty")]
    ContentEmpty,
    /// Content exceeds [`MAX_CONTENT_SIZE`] bytes.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates message content before any network call.
///
/// # Errors
///
/// Returns [`ValidationError::ContentEmpty`] for empty content, or
/// [`ValidationError::TooLarge`] past the byte limit.
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::ContentEmpty);
    }
    if content.len() > MAX_CONTENT_SIZE {
        return Err(ValidationError::TooLarge {
            size: content.len(),
            max: MAX_CONTENT_SIZE,
        });
    }
    Ok(())
}

/// Identity key for recognizing two payloads as the same logical message.
///
/// Derived from `(author_id, content, created_at bucket)`. Used as a hash
/// map key; lookups must also probe [`neighbors`](Self::neighbors) so that
/// timestamps falling just across a bucket boundary still match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Author of the message.
    pub author_id: UserId,
    /// Exact message content.
    pub content: String,
    /// `created_at` in milliseconds, quantized to [`FINGERPRINT_BUCKET_MS`].
    pub bucket: i64,
}

impl Fingerprint {
    /// Derives the fingerprint of a message representation.
    #[must_use]
    pub fn of(author_id: UserId, content: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            author_id,
            content: content.to_string(),
            bucket: created_at.timestamp_millis().div_euclid(FINGERPRINT_BUCKET_MS),
        }
    }

    /// The same key shifted into the two adjacent time buckets.
    #[must_use]
    pub fn neighbors(&self) -> [Self; 2] {
        [
            Self {
                author_id: self.author_id,
                content: self.content.clone(),
                bucket: self.bucket - 1,
            },
            Self {
                author_id: self.author_id,
                content: self.content.clone(),
                bucket: self.bucket + 1,
            },
        ]
    }

    /// Returns `true` if `other` could denote the same logical message:
    /// same author, same content, same or adjacent time bucket.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.author_id == other.author_id
            && self.content == other.content
            && (self.bucket - other.bucket).abs() <= 1
    }
}

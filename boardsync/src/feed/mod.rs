//! Message feed engine.
//!
//! Maintains the ordered, deduplicated message feed from two independent
//! sources: the persistence gateway (history and POST confirmations) and
//! the push channel (live broadcast frames). A single send is confirmed
//! by up to two arrivals; the identity fingerprint collapses them onto
//! one entry.

pub mod engine;

pub use engine::MessageSyncEngine;

use boardsync_proto::message::{MessageId, ValidationError};

use crate::gateway::GatewayError;

/// Errors that can occur during feed operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The content failed validation. Rejected before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Delete attempted by someone other than the author. Rejected
    /// locally, never sent to the gateway.
    #[error("only the author may delete message {id}")]
    NotAuthor {
        /// The message the requester tried to delete.
        id: MessageId,
    },

    /// A gateway request failed after an optimistic local change.
    #[error("gateway request failed: {0}")]
    Gateway(#[from] GatewayError),
}

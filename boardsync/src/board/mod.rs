//! Kanban board engine.
//!
//! Owns the task-status state machine and drag/drop reassignment
//! semantics, operating only on the entity store. Optimistic mutations
//! apply locally before the persistence gateway confirms them; a failed
//! move rolls back, a failed create removes the placeholder.

pub mod engine;

pub use engine::KanbanEngine;

use boardsync_proto::task::{TaskId, ValidationError};

use crate::gateway::GatewayError;

/// Errors that can occur during board operations.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// The draft failed validation. Rejected before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Delete attempted by someone other than the creator. Rejected
    /// locally, never sent to the gateway.
    #[error("only the creator may delete task {id}")]
    NotCreator {
        /// The task the requester tried to delete.
        id: TaskId,
    },

    /// A gateway request failed after an optimistic local change.
    #[error("gateway request failed: {0}")]
    Gateway(#[from] GatewayError),
}

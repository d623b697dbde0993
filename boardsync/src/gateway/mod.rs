//! Persistence gateway abstraction.
//!
//! Defines the [`Gateway`] trait the engines consume for durable CRUD on
//! tasks and messages. Concrete implementations:
//! - [`http::HttpGateway`] — JSON over HTTP against the board backend
//! - [`memory::InMemoryGateway`] — in-process double for testing
//!
//! The engines do not prescribe a transport; they only require
//! request/response pairing, with each mutating call resolving to the
//! confirmed entity (carrying server-assigned id and timestamps) or a
//! failure.

pub mod http;
pub mod memory;

use boardsync_proto::message::Message;
use boardsync_proto::task::{Task, TaskDraft, TaskStatus};

/// Errors that can occur during gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway could not be reached.
    #[error("gateway unreachable: {0}")]
    Unavailable(String),

    /// The gateway refused the request.
    #[error("gateway rejected the request: {code} {reason}")]
    Rejected {
        /// HTTP-style status code.
        code: u16,
        /// Human-readable reason.
        reason: String,
    },

    /// The gateway returned a record the engine refuses to store, such as
    /// a task with a status outside the three-column vocabulary.
    #[error("gateway returned an invalid record: {0}")]
    InvalidRecord(String),
}

/// Async CRUD over the `tasks` and `messages` collections.
///
/// Mutating calls return the confirmed entity so the caller can reconcile
/// it into the entity store. Implementations never return partially
/// validated records: an unrecognized status is an
/// [`GatewayError::InvalidRecord`], not a stored value.
pub trait Gateway: Send + Sync {
    /// Fetch all tasks on the board.
    fn fetch_tasks(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, GatewayError>> + Send;

    /// Create a task from a draft. The confirmed record carries the
    /// server-assigned id and the authenticated creator.
    fn create_task(
        &self,
        draft: &TaskDraft,
    ) -> impl std::future::Future<Output = Result<Task, GatewayError>> + Send;

    /// Update the status of a task by server id.
    fn update_task_status(
        &self,
        id: i64,
        status: TaskStatus,
    ) -> impl std::future::Future<Output = Result<Task, GatewayError>> + Send;

    /// Delete a task by server id.
    fn delete_task(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    /// Fetch the message history of the board.
    fn fetch_messages(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, GatewayError>> + Send;

    /// Persist a message. The confirmed record carries the server id,
    /// the authenticated author, and the server timestamp.
    fn create_message(
        &self,
        content: &str,
    ) -> impl std::future::Future<Output = Result<Message, GatewayError>> + Send;

    /// Delete a message by server id.
    fn delete_message(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;
}

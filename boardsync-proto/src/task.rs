//! Task model for the shared kanban board.
//!
//! A task is dual-keyed: while an optimistic create is in flight it is
//! addressed by a locally generated [`TaskId::Local`] placeholder, and once
//! the persistence gateway confirms the record it is re-keyed to the
//! server-assigned [`TaskId::Server`] integer id.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserId;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Identifier for a task.
///
/// `Server` ids come from the persistence gateway; `Local` ids are UUID v7
/// placeholders minted by the client for optimistic inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskId {
    /// Server-assigned id of a confirmed task record.
    Server(i64),
    /// Client-generated placeholder for a not-yet-confirmed task.
    Local(Uuid),
}

impl TaskId {
    /// Mints a fresh local placeholder id (UUID v7, time-ordered).
    #[must_use]
    pub fn fresh_local() -> Self {
        Self::Local(Uuid::now_v7())
    }

    /// Returns the server id, if this task has been confirmed.
    #[must_use]
    pub const fn server(&self) -> Option<i64> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Local(_) => None,
        }
    }

    /// Returns `true` for client-generated placeholder ids.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "#{id}"),
            Self::Local(uuid) => write!(f, "local:{uuid}"),
        }
    }
}

/// Kanban column a task currently occupies.
///
/// Any column accepts a drop from any other; there is no directionality
/// constraint on transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Actively being worked on.
    Doing,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// The fixed column order of the board.
    pub const COLUMNS: [Self; 3] = [Self::Todo, Self::Doing, Self::Done];
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::Doing => write!(f, "doing"),
            Self::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned when the gateway reports a status value outside the
/// three-column vocabulary. Such records are rejected, never stored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized task status: {0:?}")]
pub struct UnknownStatus(pub String);

/// Task priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority (the default for new drafts).
    Medium,
    /// High priority.
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A task on the shared board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Dual-keyed identifier (see [`TaskId`]).
    pub id: TaskId,
    /// Short title shown on the card. Never empty.
    pub title: String,
    /// Free-form description; may be empty.
    pub description: String,
    /// Column the task occupies.
    pub status: TaskStatus,
    /// Priority level.
    pub priority: Priority,
    /// User the task is assigned to.
    pub assigned_to: UserId,
    /// User who created the task. Immutable; gates deletion.
    pub created_by: UserId,
    /// Optional due date. No relational constraint is enforced.
    pub due_date: Option<NaiveDate>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last written. Reconciliation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Fields a user supplies when creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Title of the new task.
    pub title: String,
    /// Description; may be empty.
    pub description: String,
    /// Priority level.
    pub priority: Priority,
    /// Assignee.
    pub assigned_to: UserId,
    /// Optional due date.
    pub due_date: Option<NaiveDate>,
}

/// Error returned when a draft fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Title is empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Title exceeds [`MAX_TASK_TITLE_LENGTH`] characters.
    #[error("task title too long (max {MAX_TASK_TITLE_LENGTH} characters)")]
    TitleTooLong,
}

impl TaskDraft {
    /// Validates this draft before any network call.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TitleEmpty`] for an empty title, or
    /// [`ValidationError::TitleTooLong`] past the character limit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::TitleEmpty);
        }
        if self.title.chars().count() > MAX_TASK_TITLE_LENGTH {
            return Err(ValidationError::TitleTooLong);
        }
        Ok(())
    }
}

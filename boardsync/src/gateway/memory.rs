//! In-memory implementation of the persistence gateway for testing.
//!
//! Deterministic, failure-injectable double used by unit and integration
//! tests. Ids are assigned sequentially; the acting user plays the role
//! of the authenticated session. All data is lost when the value drops.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use boardsync_proto::message::{Message, MessageId};
use boardsync_proto::task::{Task, TaskDraft, TaskId, TaskStatus};
use boardsync_proto::user::UserId;

use super::{Gateway, GatewayError};

/// In-process gateway double.
pub struct InMemoryGateway {
    state: Mutex<State>,
    acting_user: UserId,
    acting_user_name: String,
    failing: AtomicBool,
    requests: AtomicUsize,
}

struct State {
    next_task_id: i64,
    next_message_id: i64,
    tasks: Vec<Task>,
    messages: Vec<Message>,
}

impl InMemoryGateway {
    /// Creates an empty gateway acting as the given user.
    #[must_use]
    pub fn new(acting_user: UserId, acting_user_name: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State {
                next_task_id: 1,
                next_message_id: 1,
                tasks: Vec::new(),
                messages: Vec::new(),
            }),
            acting_user,
            acting_user_name: acting_user_name.into(),
            failing: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    /// When failing, every request is refused with a 503 rejection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of requests received so far, including refused ones.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Seeds a confirmed task directly into the backing state.
    pub fn seed_task(&self, mut task: Task) -> TaskId {
        let mut state = self.state.lock();
        let id = state.next_task_id;
        state.next_task_id += 1;
        task.id = TaskId::Server(id);
        state.tasks.push(task);
        TaskId::Server(id)
    }

    /// Seeds a confirmed message directly into the backing state.
    pub fn seed_message(&self, mut message: Message) -> MessageId {
        let mut state = self.state.lock();
        let id = state.next_message_id;
        state.next_message_id += 1;
        message.id = MessageId::Server(id);
        state.messages.push(message);
        MessageId::Server(id)
    }

    fn guard(&self) -> Result<(), GatewayError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                code: 503,
                reason: "gateway offline".to_string(),
            });
        }
        Ok(())
    }
}

impl Gateway for InMemoryGateway {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, GatewayError> {
        self.guard()?;
        Ok(self.state.lock().tasks.clone())
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, GatewayError> {
        self.guard()?;
        let now = Utc::now();
        let mut state = self.state.lock();
        let id = state.next_task_id;
        state.next_task_id += 1;
        let task = Task {
            id: TaskId::Server(id),
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: TaskStatus::Todo,
            priority: draft.priority,
            assigned_to: draft.assigned_to,
            created_by: self.acting_user,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, GatewayError> {
        self.guard()?;
        let mut state = self.state.lock();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == TaskId::Server(id))
            .ok_or_else(|| GatewayError::Rejected {
                code: 404,
                reason: format!("task {id} not found"),
            })?;
        task.status = status;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn delete_task(&self, id: i64) -> Result<(), GatewayError> {
        self.guard()?;
        let mut state = self.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != TaskId::Server(id));
        if state.tasks.len() == before {
            return Err(GatewayError::Rejected {
                code: 404,
                reason: format!("task {id} not found"),
            });
        }
        Ok(())
    }

    async fn fetch_messages(&self) -> Result<Vec<Message>, GatewayError> {
        self.guard()?;
        let mut messages = self.state.lock().messages.clone();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn create_message(&self, content: &str) -> Result<Message, GatewayError> {
        self.guard()?;
        let mut state = self.state.lock();
        let id = state.next_message_id;
        state.next_message_id += 1;
        let message = Message {
            id: MessageId::Server(id),
            content: content.to_string(),
            author_id: self.acting_user,
            author_name: self.acting_user_name.clone(),
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn delete_message(&self, id: i64) -> Result<(), GatewayError> {
        self.guard()?;
        let mut state = self.state.lock();
        let before = state.messages.len();
        state.messages.retain(|m| m.id != MessageId::Server(id));
        if state.messages.len() == before {
            return Err(GatewayError::Rejected {
                code: 404,
                reason: format!("message {id} not found"),
            });
        }
        Ok(())
    }
}

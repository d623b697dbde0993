//! HTTP implementation of the persistence gateway.
//!
//! Speaks JSON against the board backend's `/planner/` and `/messages/`
//! collections. Wire records are private serde structs converted into
//! domain types; a record whose status falls outside the three-column
//! vocabulary is rejected with [`GatewayError::InvalidRecord`] rather
//! than stored.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use boardsync_proto::message::{Message, MessageId};
use boardsync_proto::task::{Priority, Task, TaskDraft, TaskId, TaskStatus};
use boardsync_proto::user::UserId;

use super::{Gateway, GatewayError};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-over-HTTP gateway client.
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Creates a gateway client for the given base URL with the default
    /// request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Creates a gateway client with an explicit per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the HTTP client cannot be
    /// constructed.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The base URL this gateway talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Checks the response status, mapping non-success codes to
    /// [`GatewayError::Rejected`].
    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let reason = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            code: status.as_u16(),
            reason,
        })
    }
}

fn send_error(e: &reqwest::Error) -> GatewayError {
    GatewayError::Unavailable(e.to_string())
}

fn decode_error(e: &reqwest::Error) -> GatewayError {
    GatewayError::InvalidRecord(e.to_string())
}

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TaskRecord {
    id: i64,
    title: String,
    #[serde(default)]
    description: String,
    status: String,
    priority: Priority,
    assigned_to_id: i64,
    created_by_id: i64,
    due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct TaskCreateBody<'a> {
    title: &'a str,
    description: &'a str,
    priority: Priority,
    assigned_to_id: i64,
    due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    id: i64,
    content: String,
    user_id: i64,
    username: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct MessageCreateBody<'a> {
    content: &'a str,
}

fn task_from_record(record: TaskRecord) -> Result<Task, GatewayError> {
    let status: TaskStatus = record
        .status
        .parse()
        .map_err(|e: boardsync_proto::task::UnknownStatus| {
            GatewayError::InvalidRecord(e.to_string())
        })?;
    Ok(Task {
        id: TaskId::Server(record.id),
        title: record.title,
        description: record.description,
        status,
        priority: record.priority,
        assigned_to: UserId::new(record.assigned_to_id),
        created_by: UserId::new(record.created_by_id),
        due_date: record.due_date,
        created_at: record.created_at,
        updated_at: record.updated_at.unwrap_or(record.created_at),
    })
}

fn message_from_record(record: MessageRecord) -> Message {
    Message {
        id: MessageId::Server(record.id),
        content: record.content,
        author_id: UserId::new(record.user_id),
        author_name: record.username,
        created_at: record.created_at,
    }
}

impl Gateway for HttpGateway {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, GatewayError> {
        let response = self
            .client
            .get(self.url("/planner/"))
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        let records: Vec<TaskRecord> = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(&e))?;
        records.into_iter().map(task_from_record).collect()
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, GatewayError> {
        let body = TaskCreateBody {
            title: &draft.title,
            description: &draft.description,
            priority: draft.priority,
            assigned_to_id: draft.assigned_to.get(),
            due_date: draft.due_date,
        };
        let response = self
            .client
            .post(self.url("/planner/"))
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        let record: TaskRecord = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(&e))?;
        task_from_record(record)
    }

    async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, GatewayError> {
        let response = self
            .client
            .patch(self.url(&format!("/planner/{id}/status")))
            .json(&status)
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        let record: TaskRecord = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(&e))?;
        task_from_record(record)
    }

    async fn delete_task(&self, id: i64) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.url(&format!("/planner/{id}")))
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        Self::checked(response).await.map(|_| ())
    }

    async fn fetch_messages(&self) -> Result<Vec<Message>, GatewayError> {
        let response = self
            .client
            .get(self.url("/messages/"))
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        let records: Vec<MessageRecord> = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(&e))?;
        Ok(records.into_iter().map(message_from_record).collect())
    }

    async fn create_message(&self, content: &str) -> Result<Message, GatewayError> {
        let response = self
            .client
            .post(self.url("/messages/"))
            .json(&MessageCreateBody { content })
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        let record: MessageRecord = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(&e))?;
        Ok(message_from_record(record))
    }

    async fn delete_message(&self, id: i64) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.url(&format!("/messages/{id}")))
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        Self::checked(response).await.map(|_| ())
    }
}

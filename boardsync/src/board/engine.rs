//! The kanban engine: task CRUD with optimistic application and rollback.

use std::sync::Arc;

use chrono::{Duration, Utc};

use boardsync_proto::task::{Task, TaskDraft, TaskId, TaskStatus};
use boardsync_proto::user::UserId;

use crate::gateway::Gateway;
use crate::reconcile::{Provenance, Source};
use crate::store::EntityStore;

use super::BoardError;

/// Task-status state machine and column partitioning over the entity
/// store and a persistence gateway.
pub struct KanbanEngine<G> {
    store: Arc<EntityStore>,
    gateway: Arc<G>,
    local_user: UserId,
}

impl<G: Gateway> KanbanEngine<G> {
    /// Creates an engine acting as the given local user.
    pub fn new(store: Arc<EntityStore>, gateway: Arc<G>, local_user: UserId) -> Self {
        Self {
            store,
            gateway,
            local_user,
        }
    }

    /// Fetches every task from the gateway and reconciles it into the
    /// store as confirmed state. Returns the number of records fetched.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] if the fetch fails; the store is
    /// left untouched in that case.
    pub async fn load_board(&self) -> Result<usize, BoardError> {
        let tasks = self.gateway.fetch_tasks().await?;
        let count = tasks.len();
        for task in tasks {
            self.store
                .upsert_task(task, Provenance::Confirmed, Source::Gateway);
        }
        tracing::debug!(count, "board loaded from gateway");
        Ok(count)
    }

    /// Creates a task: optimistic insert under a placeholder id, then a
    /// gateway create. On success the entry is re-keyed to the server id
    /// (keeping any column the user set in flight) and the confirmed id
    /// is returned. On failure the placeholder is removed and the task
    /// disappears from the board; there is no silent retry.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for an invalid draft (no
    /// network call is made), or [`BoardError::Gateway`] if the create
    /// request fails.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<TaskId, BoardError> {
        draft.validate()?;

        let now = Utc::now();
        let local_id = TaskId::fresh_local();
        let placeholder = Task {
            id: local_id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: TaskStatus::Todo,
            priority: draft.priority,
            assigned_to: draft.assigned_to,
            created_by: self.local_user,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
        };
        self.store
            .upsert_task(placeholder, Provenance::PendingLocal, Source::Local);

        match self.gateway.create_task(&draft).await {
            Ok(confirmed) => {
                let id = confirmed.id;
                self.store.reindex_task(&local_id, confirmed);
                tracing::debug!(%id, "task create confirmed");
                Ok(id)
            }
            Err(e) => {
                self.store.remove_task(&local_id);
                tracing::warn!(%local_id, error = %e, "task create failed, placeholder removed");
                Err(e.into())
            }
        }
    }

    /// Moves a task to the target column.
    ///
    /// Dropping onto the column the task already occupies is a no-op (no
    /// request is issued), and an unknown task id is ignored. Otherwise
    /// the status change applies optimistically and an update request is
    /// issued; on failure the prior state is restored, because an
    /// inconsistent board is worse than a momentary wrong position.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] if the update request fails (after
    /// the rollback has been applied).
    pub async fn move_task(&self, id: &TaskId, target: TaskStatus) -> Result<(), BoardError> {
        let Some(prior) = self.store.task_versioned(id) else {
            tracing::debug!(%id, "move ignored: unknown task");
            return Ok(());
        };
        if prior.entity.status == target {
            return Ok(());
        }

        let mut moved = prior.entity.clone();
        moved.status = target;
        // A local edit must be stamped strictly after the entry it
        // overlays, or the regression guard would discard it.
        moved.updated_at = Utc::now().max(prior.entity.updated_at + Duration::milliseconds(1));
        self.store
            .upsert_task(moved, Provenance::PendingLocal, Source::Local);

        let Some(server_id) = id.server() else {
            // Create still in flight: the column is kept locally and
            // preserved when the confirmation reindexes the placeholder.
            return Ok(());
        };

        match self.gateway.update_task_status(server_id, target).await {
            Ok(confirmed) => {
                self.store
                    .upsert_task(confirmed, Provenance::Confirmed, Source::Gateway);
                Ok(())
            }
            Err(e) => {
                if let Some(current) = self.store.task(id) {
                    self.store
                        .upsert_task(current, Provenance::RollingBack, Source::Local);
                }
                self.store
                    .upsert_task(prior.entity, prior.provenance, prior.source);
                tracing::warn!(%id, %target, error = %e, "move rejected by gateway, rolled back");
                Err(e.into())
            }
        }
    }

    /// Deletes a task. Only the creator may delete; the check happens
    /// locally and a refused request never reaches the gateway. The card
    /// is removed optimistically and is NOT restored if the gateway
    /// rejects the delete. Deleting an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotCreator`] when `requester` did not create
    /// the task, or [`BoardError::Gateway`] if the delete request fails.
    pub async fn delete_task(&self, id: &TaskId, requester: UserId) -> Result<(), BoardError> {
        let Some(task) = self.store.task(id) else {
            return Ok(());
        };
        if task.created_by != requester {
            return Err(BoardError::NotCreator { id: *id });
        }

        self.store.remove_task(id);

        let Some(server_id) = id.server() else {
            return Ok(());
        };
        if let Err(e) = self.gateway.delete_task(server_id).await {
            tracing::warn!(%id, error = %e, "task delete rejected by gateway; card stays removed");
            return Err(e.into());
        }
        Ok(())
    }

    /// The board partition: every column with its tasks in creation
    /// order. Derived from the store; a task appears in exactly one
    /// column.
    #[must_use]
    pub fn columns(&self) -> Vec<(TaskStatus, Vec<Task>)> {
        TaskStatus::COLUMNS
            .iter()
            .map(|status| (*status, self.store.tasks_by_status(*status)))
            .collect()
    }
}

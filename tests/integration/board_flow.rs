//! Integration tests for the kanban board flow: optimistic creates,
//! drag/drop moves with rollback, and creator-gated deletion, end to end
//! through the entity store and an in-memory gateway.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use boardsync::board::{BoardError, KanbanEngine};
use boardsync::gateway::memory::InMemoryGateway;
use boardsync::store::EntityStore;
use boardsync_proto::task::{Priority, TaskDraft, TaskStatus};
use boardsync_proto::user::UserId;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn make_draft(title: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: String::new(),
        priority: Priority::Medium,
        assigned_to: UserId::new(1),
        due_date: None,
    }
}

fn make_client(
    gateway: &Arc<InMemoryGateway>,
    user: UserId,
) -> (Arc<EntityStore>, KanbanEngine<InMemoryGateway>) {
    let store = Arc::new(EntityStore::new());
    let engine = KanbanEngine::new(Arc::clone(&store), Arc::clone(gateway), user);
    (store, engine)
}

/// Asserts that every task in the store appears in exactly one column.
fn assert_partition(store: &EntityStore) {
    let total: usize = TaskStatus::COLUMNS
        .iter()
        .map(|s| store.tasks_by_status(*s).len())
        .sum();
    assert_eq!(total, store.task_count(), "tasks must partition the board");
}

// ---------------------------------------------------------------------------
// Create / confirm round-trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_round_trip_leaves_single_confirmed_entry() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, engine) = make_client(&gateway, UserId::new(1));

    let id = engine
        .create_task(TaskDraft {
            title: "Write report".to_string(),
            priority: Priority::High,
            ..make_draft("")
        })
        .await
        .expect("create");

    // A single entry under the server id, in the todo column, with no
    // leftover placeholder.
    assert_eq!(store.task_count(), 1);
    assert!(id.server().is_some());
    let task = store.task(&id).expect("present");
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.title, "Write report");
    assert_eq!(task.priority, Priority::High);
    assert_partition(&store);
}

#[tokio::test]
async fn second_client_sees_confirmed_board() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (_store_a, engine_a) = make_client(&gateway, UserId::new(1));
    engine_a.create_task(make_draft("shared")).await.expect("create");

    let (store_b, engine_b) = make_client(&gateway, UserId::new(2));
    let count = engine_b.load_board().await.expect("load");
    assert_eq!(count, 1);
    assert_eq!(store_b.tasks_by_status(TaskStatus::Todo).len(), 1);
}

// ---------------------------------------------------------------------------
// Move sequences
// ---------------------------------------------------------------------------

#[tokio::test]
async fn any_move_sequence_keeps_each_task_in_one_column() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, engine) = make_client(&gateway, UserId::new(1));

    let a = engine.create_task(make_draft("a")).await.expect("create");
    let b = engine.create_task(make_draft("b")).await.expect("create");

    let moves = [
        (&a, TaskStatus::Doing),
        (&b, TaskStatus::Done),
        (&a, TaskStatus::Done),
        (&a, TaskStatus::Todo), // backwards moves are legal
        (&b, TaskStatus::Doing),
        (&b, TaskStatus::Doing), // same-column drop is a no-op
    ];
    for (id, target) in moves {
        engine.move_task(id, target).await.expect("move");
        assert_partition(&store);
    }

    assert_eq!(store.task(&a).expect("a").status, TaskStatus::Todo);
    assert_eq!(store.task(&b).expect("b").status, TaskStatus::Doing);
}

#[tokio::test]
async fn move_rollback_restores_original_column() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, engine) = make_client(&gateway, UserId::new(1));

    let id = engine.create_task(make_draft("t")).await.expect("create");
    engine.move_task(&id, TaskStatus::Doing).await.expect("move");

    gateway.set_failing(true);
    let err = engine.move_task(&id, TaskStatus::Done).await.unwrap_err();
    assert!(matches!(err, BoardError::Gateway(_)));

    // The board renders the task back in its original column.
    assert_eq!(store.task(&id).expect("t").status, TaskStatus::Doing);
    assert_eq!(store.tasks_by_status(TaskStatus::Done).len(), 0);
    assert_eq!(store.tasks_by_status(TaskStatus::Doing).len(), 1);
    assert_partition(&store);
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_is_gated_on_the_creator() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(5), "ana"));
    let (store, engine) = make_client(&gateway, UserId::new(5));
    let id = engine.create_task(make_draft("mine")).await.expect("create");

    // Requester 99 did not create the task.
    let err = engine.delete_task(&id, UserId::new(99)).await.unwrap_err();
    assert!(matches!(err, BoardError::NotCreator { .. }));
    assert!(store.task(&id).is_some());

    engine.delete_task(&id, UserId::new(5)).await.expect("delete");
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn double_delete_is_quietly_idempotent() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(5), "ana"));
    let (_store, engine) = make_client(&gateway, UserId::new(5));
    let id = engine.create_task(make_draft("t")).await.expect("create");

    engine.delete_task(&id, UserId::new(5)).await.expect("first");
    let requests = gateway.request_count();
    // Second delete: no error, no gateway traffic.
    engine.delete_task(&id, UserId::new(5)).await.expect("second");
    assert_eq!(gateway.request_count(), requests);
}

// A failed delete leaves the card removed, unlike a failed move which
// rolls back. The asymmetry is intentional.
#[tokio::test]
async fn failed_delete_keeps_the_card_removed() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(5), "ana"));
    let (store, engine) = make_client(&gateway, UserId::new(5));
    let id = engine.create_task(make_draft("t")).await.expect("create");

    gateway.set_failing(true);
    let err = engine.delete_task(&id, UserId::new(5)).await.unwrap_err();
    assert!(matches!(err, BoardError::Gateway(_)));
    assert_eq!(store.task_count(), 0);
}

// ---------------------------------------------------------------------------
// Failure during create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_create_disappears_from_the_board() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, engine) = make_client(&gateway, UserId::new(1));

    gateway.set_failing(true);
    let err = engine.create_task(make_draft("doomed")).await.unwrap_err();
    assert!(matches!(err, BoardError::Gateway(_)));
    assert_eq!(store.task_count(), 0);
    assert_partition(&store);
}

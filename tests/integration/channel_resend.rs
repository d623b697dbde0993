//! Integration tests for channel-outage handling: the bounded resend
//! queue, the terminal failed-send state past the retry ceiling, and the
//! explicit user-driven retry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use boardsync::channel::{ChannelError, PushChannel};
use boardsync::feed::MessageSyncEngine;
use boardsync::gateway::memory::InMemoryGateway;
use boardsync::gateway::{Gateway, GatewayError};
use boardsync::reconcile::Provenance;
use boardsync::store::EntityStore;
use boardsync_proto::event::PushFrame;
use boardsync_proto::message::{Message, MessageId};
use boardsync_proto::task::{Task, TaskDraft, TaskStatus};
use boardsync_proto::user::UserId;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// A push channel that can be switched between working and failing.
/// Published frames are discarded; only the outcome matters here.
struct FlakyChannel {
    failing: AtomicBool,
}

impl FlakyChannel {
    fn new(failing: bool) -> Self {
        Self {
            failing: AtomicBool::new(failing),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PushChannel for FlakyChannel {
    async fn publish(&self, _frame: &PushFrame) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ChannelError::Disconnected)
        } else {
            Ok(())
        }
    }

    async fn next_event(&self) -> Result<PushFrame, ChannelError> {
        // No frames ever arrive on this double.
        std::future::pending().await
    }

    fn is_connected(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}

/// A gateway whose `create_message` can be held open, keeping the
/// optimistic entry pending while the test exercises the resend queue.
struct StallableGateway {
    inner: InMemoryGateway,
    stalled: AtomicBool,
    release: Notify,
}

impl StallableGateway {
    fn new(user: UserId, name: &str) -> Self {
        Self {
            inner: InMemoryGateway::new(user, name),
            stalled: AtomicBool::new(false),
            release: Notify::new(),
        }
    }

    fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.stalled.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so a waiter that has not parked yet
        // still wakes.
        self.release.notify_one();
    }
}

impl Gateway for StallableGateway {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, GatewayError> {
        self.inner.fetch_tasks().await
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, GatewayError> {
        self.inner.create_task(draft).await
    }

    async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, GatewayError> {
        self.inner.update_task_status(id, status).await
    }

    async fn delete_task(&self, id: i64) -> Result<(), GatewayError> {
        self.inner.delete_task(id).await
    }

    async fn fetch_messages(&self) -> Result<Vec<Message>, GatewayError> {
        self.inner.fetch_messages().await
    }

    async fn create_message(&self, content: &str) -> Result<Message, GatewayError> {
        while self.stalled.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.inner.create_message(content).await
    }

    async fn delete_message(&self, id: i64) -> Result<(), GatewayError> {
        self.inner.delete_message(id).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type TestEngine = MessageSyncEngine<StallableGateway, FlakyChannel>;

fn make_engine(
    ceiling: u32,
) -> (
    Arc<EntityStore>,
    Arc<StallableGateway>,
    Arc<FlakyChannel>,
    Arc<TestEngine>,
) {
    let store = Arc::new(EntityStore::new());
    let gateway = Arc::new(StallableGateway::new(UserId::new(1), "ana"));
    let channel = Arc::new(FlakyChannel::new(true));
    let engine = Arc::new(
        MessageSyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&channel),
            UserId::new(1),
            "ana",
        )
        .with_resend_ceiling(ceiling),
    );
    (store, gateway, channel, engine)
}

/// Waits until the store holds a pending local entry and returns its id.
async fn wait_for_pending(store: &EntityStore) -> MessageId {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let pending = store
            .feed()
            .into_iter()
            .find(|m| store.message_provenance(&m.id) == Some(Provenance::PendingLocal));
        if let Some(message) = pending {
            return message.id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no pending entry appeared");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outage_queues_the_frame_and_flush_sends_it_later() {
    let (store, gateway, channel, engine) = make_engine(3);
    gateway.stall();

    let send_engine = Arc::clone(&engine);
    let send = tokio::spawn(async move { send_engine.send_message("buffered").await });

    let id = wait_for_pending(&store).await;
    assert_eq!(engine.pending_count().await, 1);

    // The channel comes back before the ceiling: the frame goes out and
    // the entry stays pending until a confirmation lands.
    channel.set_failing(false);
    assert_eq!(engine.flush_pending().await, 1);
    assert_eq!(engine.pending_count().await, 0);
    assert_eq!(store.message_provenance(&id), Some(Provenance::PendingLocal));

    gateway.release();
    let confirmed = send.await.expect("join").expect("send");
    assert!(confirmed.server().is_some());
    assert_eq!(
        store.message_provenance(&confirmed),
        Some(Provenance::Confirmed)
    );
}

#[tokio::test]
async fn resend_ceiling_marks_the_entry_terminally_failed() {
    let (store, gateway, _channel, engine) = make_engine(2);
    gateway.stall();

    let send_engine = Arc::clone(&engine);
    let send = tokio::spawn(async move { send_engine.send_message("unlucky").await });
    let id = wait_for_pending(&store).await;

    // Channel stays down: attempts 2 and 3 exceed the ceiling of 2.
    assert_eq!(engine.flush_pending().await, 0);
    assert_eq!(engine.pending_count().await, 1);
    assert_eq!(engine.flush_pending().await, 0);
    assert_eq!(engine.pending_count().await, 0);
    assert_eq!(store.message_provenance(&id), Some(Provenance::SendFailed));

    // The entry is terminal: further flushes ignore it.
    assert_eq!(engine.flush_pending().await, 0);
    assert_eq!(store.message_provenance(&id), Some(Provenance::SendFailed));

    send.abort();
}

#[tokio::test]
async fn explicit_resend_recovers_a_failed_message() {
    let (store, gateway, channel, engine) = make_engine(1);
    gateway.stall();

    let send_engine = Arc::clone(&engine);
    let send = tokio::spawn(async move { send_engine.send_message("try again").await });
    let id = wait_for_pending(&store).await;

    // Drive the entry to the terminal failed state, then abandon the
    // original (still stalled) send.
    assert_eq!(engine.flush_pending().await, 0);
    assert_eq!(store.message_provenance(&id), Some(Provenance::SendFailed));
    send.abort();

    // The user retries once connectivity is back.
    channel.set_failing(false);
    gateway.release();
    engine.resend(&id).await.expect("resend");

    assert_eq!(store.message_count(), 1);
    let feed = store.feed();
    assert_eq!(feed[0].content, "try again");
    assert_eq!(
        store.message_provenance(&feed[0].id),
        Some(Provenance::Confirmed)
    );
}

#[tokio::test]
async fn resend_of_a_healthy_message_is_a_noop() {
    let (store, _gateway, channel, engine) = make_engine(3);
    channel.set_failing(false);

    let id = engine.send_message("fine").await.expect("send");
    engine.resend(&id).await.expect("resend");
    assert_eq!(store.message_count(), 1);
}

#[tokio::test]
async fn gateway_confirmation_rescues_a_failed_entry() {
    let (store, gateway, _channel, engine) = make_engine(1);
    gateway.stall();

    let send_engine = Arc::clone(&engine);
    let send = tokio::spawn(async move { send_engine.send_message("slow lane").await });
    let id = wait_for_pending(&store).await;

    assert_eq!(engine.flush_pending().await, 0);
    assert_eq!(store.message_provenance(&id), Some(Provenance::SendFailed));

    // The stalled persist finally completes: the confirmation replaces
    // the failed entry.
    gateway.release();
    let confirmed = send.await.expect("join").expect("send");
    assert_eq!(store.message_count(), 1);
    assert_eq!(
        store.message_provenance(&confirmed),
        Some(Provenance::Confirmed)
    );
}

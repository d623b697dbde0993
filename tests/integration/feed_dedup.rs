//! Integration tests for the message feed: optimistic sends confirmed by
//! two independent sources, ordering under out-of-order arrival, and
//! author-gated idempotent deletion.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};

use boardsync::channel::PushChannel;
use boardsync::channel::loopback::LoopbackChannel;
use boardsync::feed::{FeedError, MessageSyncEngine};
use boardsync::gateway::memory::InMemoryGateway;
use boardsync::store::EntityStore;
use boardsync_proto::event::PushFrame;
use boardsync_proto::message::Message;
use boardsync_proto::message::MessageId;
use boardsync_proto::user::UserId;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

type TestEngine = MessageSyncEngine<InMemoryGateway, LoopbackChannel>;

/// A client engine plus the relay-side end of its push channel.
fn make_client(
    gateway: &Arc<InMemoryGateway>,
    user: UserId,
    name: &str,
) -> (Arc<EntityStore>, LoopbackChannel, TestEngine) {
    let store = Arc::new(EntityStore::new());
    let (client_end, relay_end) = LoopbackChannel::create_pair(16);
    let engine = MessageSyncEngine::new(
        Arc::clone(&store),
        Arc::clone(gateway),
        Arc::new(client_end),
        user,
        name,
    );
    (store, relay_end, engine)
}

// ---------------------------------------------------------------------------
// Dual-source confirmation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_is_one_entry_before_and_after_both_confirmations() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, relay, engine) = make_client(&gateway, UserId::new(1), "ana");

    let id = engine.send_message("release at noon").await.expect("send");
    assert_eq!(store.message_count(), 1);

    // The relay loops the sender's own frame back, exactly as it went out.
    let echo = relay.next_event().await.expect("frame");
    engine.on_push_event(echo);

    // Gateway response already arrived inside send_message; the echo is
    // the second confirmation. Still exactly one entry.
    assert_eq!(store.message_count(), 1);
    let message = store.message(&id).expect("present");
    assert_eq!(message.content, "release at noon");
}

#[tokio::test]
async fn fanout_reaches_a_second_client_once() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (_store_a, relay_a, engine_a) = make_client(&gateway, UserId::new(1), "ana");
    let (store_b, _relay_b, engine_b) = make_client(&gateway, UserId::new(2), "bo");

    engine_a.send_message("hello all").await.expect("send");

    // The relay forwards A's frame to B, and B also loads history from
    // the gateway. Both paths describe the same logical message.
    let frame = relay_a.next_event().await.expect("frame");
    engine_b.on_push_event(frame);
    assert_eq!(store_b.message_count(), 1);

    engine_b.load_history().await.expect("history");
    assert_eq!(store_b.message_count(), 1);
    let feed = store_b.feed();
    assert_eq!(feed[0].author_id, UserId::new(1));
    assert_eq!(feed[0].content, "hello all");
    // The history load attached the server id.
    assert!(feed[0].id.server().is_some());
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn push_ahead_of_history_still_renders_in_timestamp_order() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(2), "bo"));
    let t = Utc::now();

    // M1 (older) sits in gateway history; M2 (newer) arrives by push
    // before the history is loaded.
    gateway.seed_message(Message {
        id: MessageId::Server(0),
        content: "m1".to_string(),
        author_id: UserId::new(2),
        author_name: "bo".to_string(),
        created_at: t,
    });

    let (store, _relay, engine) = make_client(&gateway, UserId::new(1), "ana");
    engine.on_push_event(PushFrame::Message {
        content: "m2".to_string(),
        author_id: UserId::new(2),
        author_name: "bo".to_string(),
        created_at: Some(t + Duration::seconds(1)),
    });
    engine.load_history().await.expect("history");

    let feed = store.feed();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].content, "m1");
    assert_eq!(feed[1].content, "m2");
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_is_gated_on_the_author() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, _relay, engine) = make_client(&gateway, UserId::new(1), "ana");
    let id = engine.send_message("mine").await.expect("send");

    let err = engine.delete_message(&id, UserId::new(2)).await.unwrap_err();
    assert!(matches!(err, FeedError::NotAuthor { .. }));
    assert_eq!(store.message_count(), 1);
}

#[tokio::test]
async fn deleting_twice_produces_no_error_and_no_extra_requests() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, _relay, engine) = make_client(&gateway, UserId::new(1), "ana");
    let id = engine.send_message("bye").await.expect("send");

    engine.delete_message(&id, UserId::new(1)).await.expect("first");
    assert_eq!(store.message_count(), 0);

    let requests = gateway.request_count();
    engine.delete_message(&id, UserId::new(1)).await.expect("second");
    assert_eq!(gateway.request_count(), requests);
    assert_eq!(store.message_count(), 0);
}

#[tokio::test]
async fn late_echo_of_a_deleted_message_stays_deleted() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, relay, engine) = make_client(&gateway, UserId::new(1), "ana");

    let id = engine.send_message("short lived").await.expect("send");
    engine.delete_message(&id, UserId::new(1)).await.expect("delete");

    // The relay echo was already in flight when the delete happened.
    let echo = relay.next_event().await.expect("frame");
    engine.on_push_event(echo);
    assert_eq!(store.message_count(), 0);
}

// ---------------------------------------------------------------------------
// Degraded channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sends_keep_working_without_a_connected_channel() {
    let gateway = Arc::new(InMemoryGateway::new(UserId::new(1), "ana"));
    let (store, relay, engine) = make_client(&gateway, UserId::new(1), "ana");
    drop(relay); // the push link is gone

    let id = engine.send_message("still here").await.expect("send");
    assert!(id.server().is_some());
    assert_eq!(store.message_count(), 1);
    // The undeliverable frame waits in the resend queue.
    assert_eq!(engine.pending_count().await, 1);
}

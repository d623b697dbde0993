//! Wiring for a live sync client.
//!
//! Builds the entity store, the board and feed engines, the HTTP gateway,
//! and the board's single WebSocket push subscription, then spawns the
//! background tasks that keep them running: the push receive loop and the
//! periodic resend flush.
//!
//! The push endpoint being unreachable is a degraded mode, not an error:
//! the channel reconnects with backoff in the background and messages
//! keep flowing through the gateway. A failed initial gateway sync, on
//! the other hand, is surfaced — without it there is no source of truth
//! to reconcile against.

use std::sync::Arc;

use tokio::sync::mpsc;

use boardsync_proto::user::UserId;

use crate::board::{BoardError, KanbanEngine};
use crate::channel::ws::WsChannel;
use crate::config::ClientConfig;
use crate::feed::{FeedError, MessageSyncEngine};
use crate::gateway::GatewayError;
use crate::gateway::http::HttpGateway;
use crate::store::{EntityStore, StoreEvent};

/// Errors that can occur while connecting a sync client.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    /// The HTTP gateway client could not be built.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The initial board sync failed.
    #[error("initial board sync failed: {0}")]
    Board(#[from] BoardError),

    /// The initial feed sync failed.
    #[error("initial feed sync failed: {0}")]
    Feed(#[from] FeedError),
}

/// A connected sync client: the shared store plus the two engines.
pub struct SyncClient {
    /// The authoritative local state.
    pub store: Arc<EntityStore>,
    /// Task board operations.
    pub board: Arc<KanbanEngine<HttpGateway>>,
    /// Message feed operations.
    pub feed: Arc<MessageSyncEngine<HttpGateway, WsChannel>>,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient").finish_non_exhaustive()
    }
}

/// Connects a sync client from resolved configuration.
///
/// Performs the initial board and history sync, opens the push
/// subscription, and spawns the receive loop and the resend flush task.
/// Returns the client and a store event receiver for rendering.
///
/// # Errors
///
/// Returns [`ConnectError`] for missing configuration or a failed
/// initial gateway sync. An unreachable push endpoint is not an error.
pub async fn connect(
    config: &ClientConfig,
) -> Result<(SyncClient, mpsc::Receiver<StoreEvent>), ConnectError> {
    let gateway_url = config
        .gateway_url
        .as_deref()
        .ok_or(ConnectError::MissingConfig("gateway URL"))?;
    let channel_url = config
        .channel_url
        .as_deref()
        .ok_or(ConnectError::MissingConfig("channel URL"))?;
    let user_id = config
        .user_id
        .ok_or(ConnectError::MissingConfig("user id"))?;
    let user_name = config
        .user_name
        .as_deref()
        .ok_or(ConnectError::MissingConfig("user name"))?;

    let store = Arc::new(EntityStore::new());
    let events = store.subscribe(config.store_event_buffer);

    let gateway = Arc::new(HttpGateway::with_timeout(
        gateway_url,
        config.request_timeout,
    )?);
    let channel = Arc::new(WsChannel::open(
        channel_url,
        config.reconnect_policy(),
        config.event_buffer,
    ));

    let local_user = UserId::new(user_id);
    let board = Arc::new(KanbanEngine::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        local_user,
    ));
    let feed = Arc::new(
        MessageSyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            channel,
            local_user,
            user_name,
        )
        .with_resend_ceiling(config.resend_ceiling),
    );

    let tasks = board.load_board().await?;
    let messages = feed.load_history().await?;
    tracing::info!(tasks, messages, "initial sync complete");

    // Push receive loop: ingests broadcast frames until the channel is
    // permanently closed.
    let run_feed = Arc::clone(&feed);
    tokio::spawn(async move {
        run_feed.run().await;
    });
    let _flush_task = feed.spawn_flush_task(config.resend_interval);

    Ok((SyncClient { store, board, feed }, events))
}

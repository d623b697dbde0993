//! The message sync engine: optimistic sends, dual-source ingestion, and
//! the bounded resend queue for channel outages.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use boardsync_proto::event::PushFrame;
use boardsync_proto::message::{self, Message, MessageId};
use boardsync_proto::user::UserId;

use crate::channel::{ChannelError, PushChannel};
use crate::gateway::Gateway;
use crate::reconcile::{Provenance, Source};
use crate::store::EntityStore;

use super::FeedError;

/// Default number of channel publish attempts before a pending send is
/// marked terminally failed.
pub const DEFAULT_RESEND_CEILING: u32 = 3;

/// A channel frame that could not be published yet.
struct PendingSend {
    /// The local entry this frame belongs to.
    id: MessageId,
    /// The frame to publish.
    frame: PushFrame,
    /// Publish attempts so far.
    attempts: u32,
}

/// Feed engine over the entity store, a persistence gateway, and the
/// board's single long-lived push channel subscription.
pub struct MessageSyncEngine<G, P> {
    store: Arc<EntityStore>,
    gateway: Arc<G>,
    channel: Arc<P>,
    author: UserId,
    author_name: String,
    next_seq: AtomicU64,
    pending: Mutex<VecDeque<PendingSend>>,
    resend_ceiling: u32,
}

impl<G: Gateway, P: PushChannel> MessageSyncEngine<G, P> {
    /// Creates an engine sending as the given author.
    pub fn new(
        store: Arc<EntityStore>,
        gateway: Arc<G>,
        channel: Arc<P>,
        author: UserId,
        author_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            channel,
            author,
            author_name: author_name.into(),
            next_seq: AtomicU64::new(1),
            pending: Mutex::new(VecDeque::new()),
            resend_ceiling: DEFAULT_RESEND_CEILING,
        }
    }

    /// Overrides the resend ceiling (publish attempts before a pending
    /// send is marked terminally failed).
    #[must_use]
    pub fn with_resend_ceiling(mut self, ceiling: u32) -> Self {
        self.resend_ceiling = ceiling;
        self
    }

    /// Fetches the full message history from the gateway and reconciles
    /// it into the store as confirmed state, ascending by `created_at`.
    /// Returns the number of records fetched.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Gateway`] if the fetch fails.
    pub async fn load_history(&self) -> Result<usize, FeedError> {
        let mut messages = self.gateway.fetch_messages().await?;
        messages.sort_by_key(|m| m.created_at);
        let count = messages.len();
        for msg in messages {
            self.store
                .apply_message(msg, Provenance::Confirmed, Source::Gateway);
        }
        tracing::debug!(count, "message history loaded from gateway");
        Ok(count)
    }

    /// Sends a message.
    ///
    /// A pending entry appears in the feed immediately, the frame goes
    /// out over the push channel for fan-out, and the content is
    /// independently persisted through the gateway. The push echo and the
    /// gateway response both collapse onto the pending entry; whichever
    /// arrives first replaces it and the second is a no-op.
    ///
    /// A channel publish failure does not fail the send: the frame joins
    /// the resend queue and the gateway path continues. A gateway failure
    /// reverts the optimistic entry.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Validation`] for empty or oversized content
    /// (no network call is made), or [`FeedError::Gateway`] if the
    /// persist request fails.
    pub async fn send_message(&self, content: &str) -> Result<MessageId, FeedError> {
        message::validate_content(content)?;

        let now = Utc::now();
        let local_id = MessageId::Local(self.next_seq.fetch_add(1, Ordering::Relaxed));
        let msg = Message {
            id: local_id,
            content: content.to_string(),
            author_id: self.author,
            author_name: self.author_name.clone(),
            created_at: now,
        };
        self.store
            .apply_message(msg, Provenance::PendingLocal, Source::Local);

        let frame = PushFrame::Message {
            content: content.to_string(),
            author_id: self.author,
            author_name: self.author_name.clone(),
            created_at: Some(now),
        };
        if let Err(e) = self.channel.publish(&frame).await {
            tracing::info!(%local_id, error = %e, "channel publish failed, frame queued for resend");
            self.pending.lock().await.push_back(PendingSend {
                id: local_id,
                frame,
                attempts: 1,
            });
        }

        match self.gateway.create_message(content).await {
            Ok(confirmed) => {
                let id = confirmed.id;
                self.store.reindex_message(&local_id, confirmed);
                Ok(id)
            }
            Err(e) => {
                self.store.remove_message(&local_id);
                tracing::warn!(%local_id, error = %e, "message persist failed, optimistic entry reverted");
                Err(e.into())
            }
        }
    }

    /// Ingests one frame from the push channel.
    ///
    /// Push events are authoritative (they originate from the server
    /// relay, not the sender's optimistic guess), so the message is
    /// applied as confirmed. A frame without `created_at` is stamped with
    /// the local receive time. Frames with empty content are dropped.
    pub fn on_push_event(&self, frame: PushFrame) {
        let PushFrame::Message {
            content,
            author_id,
            author_name,
            created_at,
        } = frame;
        if message::validate_content(&content).is_err() {
            tracing::warn!("dropping push frame with invalid content");
            return;
        }
        let msg = Message {
            id: MessageId::Local(self.next_seq.fetch_add(1, Ordering::Relaxed)),
            content,
            author_id,
            author_name,
            created_at: created_at.unwrap_or_else(Utc::now),
        };
        self.store
            .apply_message(msg, Provenance::Confirmed, Source::Push);
    }

    /// Drives the push receive loop until the channel is permanently
    /// closed. Transient outages are handled inside the channel; feed
    /// operation degrades to gateway-only while the link is down.
    pub async fn run(&self) {
        loop {
            match self.channel.next_event().await {
                Ok(frame) => self.on_push_event(frame),
                Err(ChannelError::Disconnected) => {
                    tracing::info!("push channel closed, live fan-out stopped");
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "push channel receive error");
                }
            }
        }
    }

    /// Deletes a message. Only the author may delete; the check happens
    /// locally. The entry is removed optimistically and is NOT restored
    /// if the gateway rejects the delete (mirroring the task policy).
    /// Deleting an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::NotAuthor`] when `requester` is not the
    /// author, or [`FeedError::Gateway`] if the delete request fails.
    pub async fn delete_message(
        &self,
        id: &MessageId,
        requester: UserId,
    ) -> Result<(), FeedError> {
        let Some(msg) = self.store.message(id) else {
            return Ok(());
        };
        if msg.author_id != requester {
            return Err(FeedError::NotAuthor { id: *id });
        }

        self.store.remove_message(id);

        let Some(server_id) = id.server() else {
            return Ok(());
        };
        if let Err(e) = self.gateway.delete_message(server_id).await {
            tracing::warn!(%id, error = %e, "message delete rejected by gateway; entry stays removed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Retries queued channel frames.
    ///
    /// Frames whose message has since been confirmed or removed are
    /// dropped (the gateway already persisted or reverted them). A frame
    /// that keeps failing past the resend ceiling marks its entry
    /// terminally failed; it is only sent again through an explicit
    /// [`resend`](Self::resend).
    ///
    /// Returns the number of frames published.
    pub async fn flush_pending(&self) -> usize {
        let drained: Vec<PendingSend> = {
            let mut queue = self.pending.lock().await;
            queue.drain(..).collect()
        };

        let mut sent = 0;
        for mut item in drained {
            if self.store.message_provenance(&item.id) != Some(Provenance::PendingLocal) {
                continue;
            }
            match self.channel.publish(&item.frame).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    item.attempts += 1;
                    if item.attempts > self.resend_ceiling {
                        tracing::warn!(
                            id = %item.id,
                            attempts = item.attempts,
                            error = %e,
                            "resend ceiling reached, marking message failed"
                        );
                        self.store.mark_message_send_failed(&item.id);
                    } else {
                        self.pending.lock().await.push_back(item);
                    }
                }
            }
        }

        if sent > 0 {
            tracing::info!(sent, "flushed pending channel frames");
        }
        sent
    }

    /// Number of frames awaiting resend.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Explicitly retries a terminally failed message: the entry returns
    /// to pending, the frame is published (or queued), and the content is
    /// persisted through the gateway again. A no-op for entries that are
    /// not in the failed state.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Gateway`] if the persist request fails; the
    /// entry is reverted as in [`send_message`](Self::send_message).
    pub async fn resend(&self, id: &MessageId) -> Result<(), FeedError> {
        if self.store.message_provenance(id) != Some(Provenance::SendFailed) {
            return Ok(());
        }
        let Some(msg) = self.store.message(id) else {
            return Ok(());
        };

        self.store
            .apply_message(msg.clone(), Provenance::PendingLocal, Source::Local);

        let frame = PushFrame::Message {
            content: msg.content.clone(),
            author_id: msg.author_id,
            author_name: msg.author_name.clone(),
            created_at: Some(msg.created_at),
        };
        if let Err(e) = self.channel.publish(&frame).await {
            tracing::info!(%id, error = %e, "resend publish failed, frame queued");
            self.pending.lock().await.push_back(PendingSend {
                id: *id,
                frame,
                attempts: 1,
            });
        }

        match self.gateway.create_message(&msg.content).await {
            Ok(confirmed) => {
                self.store.reindex_message(id, confirmed);
                Ok(())
            }
            Err(e) => {
                self.store.remove_message(id);
                tracing::warn!(%id, error = %e, "resend persist failed, entry reverted");
                Err(e.into())
            }
        }
    }

    /// Spawns a background task that periodically retries queued frames.
    ///
    /// Runs every `interval`; stops when the returned
    /// [`tokio::task::JoinHandle`] is aborted or the runtime shuts down.
    pub fn spawn_flush_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        G: 'static,
        P: 'static,
    {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                if engine.pending_count().await > 0 && engine.channel.is_connected() {
                    engine.flush_pending().await;
                }
            }
        })
    }
}

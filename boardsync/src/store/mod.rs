//! The single authoritative in-memory copy of board state.
//!
//! [`EntityStore`] holds one collection per entity kind, addressable by id
//! and observable by UI subscribers. `upsert` / `remove` / reindexing are
//! the only write paths; every collision routes through the arbitration
//! policy in [`crate::reconcile`] and every mutation notifies subscribers.
//! Locks are held only for short synchronous sections, never across awaits.
//!
//! Messages are additionally indexed two ways:
//! - an ordered feed index, maintained by binary-search insertion on
//!   `(created_at, id)`, so out-of-order arrival lands at the correct
//!   sorted position rather than the tail;
//! - a fingerprint index used to collapse the gateway response and the
//!   push echo of one logical send onto a single entry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use boardsync_proto::message::{Fingerprint, Message, MessageId};
use boardsync_proto::task::{Task, TaskId, TaskStatus};

use crate::reconcile::{self, Provenance, Resolution, Source, Versioned};

/// Notification emitted to subscribers after every store mutation.
///
/// Events carry only ids; observers re-read the store for current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A task was inserted or replaced.
    TaskChanged {
        /// The affected task.
        id: TaskId,
    },
    /// A task was removed.
    TaskRemoved {
        /// The removed task.
        id: TaskId,
    },
    /// A pending task was re-keyed to its server id.
    TaskReindexed {
        /// The local placeholder id.
        old: TaskId,
        /// The server-assigned id.
        new: TaskId,
    },
    /// A message was inserted or replaced.
    MessageChanged {
        /// The affected message.
        id: MessageId,
    },
    /// A message was removed.
    MessageRemoved {
        /// The removed message.
        id: MessageId,
    },
    /// A pending message was re-keyed to its server id.
    MessageReindexed {
        /// The local sequence id.
        old: MessageId,
        /// The server-assigned id.
        new: MessageId,
    },
}

/// The shared entity store. Cheap to share via `Arc`; all methods take
/// `&self` and never block beyond a short in-memory lock.
pub struct EntityStore {
    inner: RwLock<Inner>,
}

struct Inner {
    tasks: HashMap<TaskId, Versioned<Task>>,
    task_tombstones: HashMap<TaskId, DateTime<Utc>>,
    messages: HashMap<MessageId, Versioned<Message>>,
    message_tombstones: HashMap<MessageId, DateTime<Utc>>,
    /// Identity fingerprint -> registered message ids, oldest first.
    fingerprints: HashMap<Fingerprint, Vec<MessageId>>,
    /// Feed presentation order: `(created_at, id)`, ascending.
    feed_order: Vec<(DateTime<Utc>, MessageId)>,
    subscribers: Vec<mpsc::Sender<StoreEvent>>,
}

impl Inner {
    /// Finds the entry a confirmed representation denotes by identity
    /// fingerprint. Prefers a live pending entry (the collapse target);
    /// otherwise returns any registered id, which may point at a
    /// confirmed entry or a tombstone.
    fn fingerprint_candidate(&self, fp: &Fingerprint) -> Option<MessageId> {
        let [left, right] = fp.neighbors();
        let keys = [fp.clone(), left, right];
        for key in &keys {
            if let Some(ids) = self.fingerprints.get(key) {
                for id in ids {
                    if self
                        .messages
                        .get(id)
                        .is_some_and(|v| v.provenance == Provenance::PendingLocal)
                    {
                        return Some(*id);
                    }
                }
            }
        }
        keys.iter()
            .find_map(|key| self.fingerprints.get(key).and_then(|ids| ids.first()))
            .copied()
    }
}

impl EntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                tasks: HashMap::new(),
                task_tombstones: HashMap::new(),
                messages: HashMap::new(),
                message_tombstones: HashMap::new(),
                fingerprints: HashMap::new(),
                feed_order: Vec::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Registers a UI observer. Events are delivered best-effort: a full
    /// buffer drops the event, a closed receiver drops the subscription.
    pub fn subscribe(&self, buffer: usize) -> mpsc::Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel(buffer);
        self.inner.write().subscribers.push(tx);
        rx
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }

    fn notify(inner: &mut Inner, event: &StoreEvent) {
        inner.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(?event, "slow store observer, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Inserts or replaces a task, arbitrated by the reconciliation
    /// policy. Returns `true` if the incoming representation was applied.
    pub fn upsert_task(&self, task: Task, provenance: Provenance, source: Source) -> bool {
        let mut inner = self.inner.write();
        let id = task.id;
        let now = Utc::now();
        let tomb = inner.task_tombstones.get(&id).copied();
        let incoming = Versioned {
            entity: task,
            provenance,
            source,
        };
        match reconcile::resolve(inner.tasks.get(&id), tomb, incoming, now) {
            Resolution::Apply(winner) => {
                inner.task_tombstones.remove(&id);
                inner.tasks.insert(id, winner);
                Self::notify(&mut inner, &StoreEvent::TaskChanged { id });
                true
            }
            Resolution::Discard => false,
        }
    }

    /// Removes a task and records a tombstone. Idempotent: removing an
    /// absent id is a no-op returning `false`.
    pub fn remove_task(&self, id: &TaskId) -> bool {
        let mut inner = self.inner.write();
        if inner.tasks.remove(id).is_none() {
            return false;
        }
        inner.task_tombstones.insert(*id, Utc::now());
        Self::notify(&mut inner, &StoreEvent::TaskRemoved { id: *id });
        true
    }

    /// Re-keys a pending task to its gateway-confirmed record, preserving
    /// a column the user set while the create was in flight.
    pub fn reindex_task(&self, old: &TaskId, confirmed: Task) -> bool {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let new_id = confirmed.id;
        let Some(local) = inner.tasks.remove(old) else {
            // Placeholder gone: the user deleted it while the create was
            // in flight. Arbitrate the confirmation against its tombstone.
            let tomb = inner.task_tombstones.get(old).copied();
            let incoming = Versioned {
                entity: confirmed,
                provenance: Provenance::Confirmed,
                source: Source::Gateway,
            };
            return match reconcile::resolve(None, tomb, incoming, now) {
                Resolution::Apply(winner) => {
                    inner.task_tombstones.remove(old);
                    inner.tasks.insert(new_id, winner);
                    Self::notify(&mut inner, &StoreEvent::TaskChanged { id: new_id });
                    true
                }
                Resolution::Discard => false,
            };
        };
        let mut entity = confirmed;
        entity.status = local.entity.status;
        inner.tasks.insert(
            new_id,
            Versioned {
                entity,
                provenance: Provenance::Confirmed,
                source: Source::Gateway,
            },
        );
        Self::notify(
            &mut inner,
            &StoreEvent::TaskReindexed {
                old: *old,
                new: new_id,
            },
        );
        true
    }

    /// Returns a task by id.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.inner.read().tasks.get(id).map(|v| v.entity.clone())
    }

    /// Returns a task together with its provenance and source tags.
    #[must_use]
    pub fn task_versioned(&self, id: &TaskId) -> Option<Versioned<Task>> {
        self.inner.read().tasks.get(id).cloned()
    }

    /// Returns the provenance tag of a task.
    #[must_use]
    pub fn task_provenance(&self, id: &TaskId) -> Option<Provenance> {
        self.inner.read().tasks.get(id).map(|v| v.provenance)
    }

    /// All tasks in the given column, ordered by creation time.
    #[must_use]
    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        let inner = self.inner.read();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|v| v.entity.status == status)
            .map(|v| v.entity.clone())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Total number of tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.read().tasks.len()
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Inserts, replaces, or collapses a message representation.
    ///
    /// Local writes address an entry by id only. Confirmed representations
    /// additionally match the identity fingerprint, so the gateway
    /// response and the push echo of one logical send land on the same
    /// entry: the first confirmation replaces the pending copy (re-keying
    /// it to the server id when one is known) and the second is a no-op.
    ///
    /// Returns `true` if the incoming representation was applied.
    pub fn apply_message(&self, message: Message, provenance: Provenance, source: Source) -> bool {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let incoming_id = message.id;
        let fp = Fingerprint::of(message.author_id, &message.content, message.created_at);
        let incoming = Versioned {
            entity: message,
            provenance,
            source,
        };

        let target = if inner.messages.contains_key(&incoming_id)
            || inner.message_tombstones.contains_key(&incoming_id)
        {
            Some(incoming_id)
        } else if provenance == Provenance::Confirmed {
            inner.fingerprint_candidate(&fp)
        } else {
            None
        };

        let Some(target_id) = target else {
            let Resolution::Apply(winner) = reconcile::resolve(None, None, incoming, now) else {
                return false;
            };
            Self::insert_message_entry(&mut inner, incoming_id, winner);
            Self::notify(&mut inner, &StoreEvent::MessageChanged { id: incoming_id });
            return true;
        };

        let tomb = inner.message_tombstones.get(&target_id).copied();
        let resolution = reconcile::resolve(inner.messages.get(&target_id), tomb, incoming, now);
        let Resolution::Apply(winner) = resolution else {
            return false;
        };

        // Prefer a server id for the final key, from whichever side has one.
        let final_id = match (winner.entity.id.server(), target_id.server()) {
            (Some(id), _) | (None, Some(id)) => MessageId::Server(id),
            (None, None) => target_id,
        };

        Self::evict_message_entry(&mut inner, &target_id);
        inner.message_tombstones.remove(&target_id);
        Self::insert_message_entry(&mut inner, final_id, winner);
        if final_id == target_id {
            Self::notify(&mut inner, &StoreEvent::MessageChanged { id: final_id });
        } else {
            Self::notify(
                &mut inner,
                &StoreEvent::MessageReindexed {
                    old: target_id,
                    new: final_id,
                },
            );
        }
        true
    }

    /// Re-keys a local message to its gateway-confirmed record.
    ///
    /// Used for the POST response, which correlates to the local entry by
    /// request/response pairing rather than by fingerprint. If the local
    /// entry is already gone (deleted mid-flight, or re-keyed by an
    /// earlier history load), the confirmation falls back to the normal
    /// arbitration path.
    pub fn reindex_message(&self, old: &MessageId, confirmed: Message) -> bool {
        let mut inner = self.inner.write();
        let new_id = confirmed.id;
        if let Some(previous) = inner.messages.get(old).map(|v| v.entity.clone()) {
            Self::evict_message_entry(&mut inner, old);
            Self::insert_message_entry(
                &mut inner,
                new_id,
                Versioned {
                    entity: confirmed,
                    provenance: Provenance::Confirmed,
                    source: Source::Gateway,
                },
            );
            // Keep the send-time fingerprint pointing at the confirmed
            // entry: the push echo carries the sender's timestamp, which
            // server clock skew may put outside the confirmed record's
            // bucket window.
            let send_fp =
                Fingerprint::of(previous.author_id, &previous.content, previous.created_at);
            let ids = inner.fingerprints.entry(send_fp).or_default();
            if !ids.contains(&new_id) {
                ids.push(new_id);
            }
            Self::notify(
                &mut inner,
                &StoreEvent::MessageReindexed {
                    old: *old,
                    new: new_id,
                },
            );
            return true;
        }
        drop(inner);
        self.apply_message(confirmed, Provenance::Confirmed, Source::Gateway)
    }

    /// Removes a message and records a tombstone. Idempotent.
    ///
    /// The fingerprint registration is kept so that a late duplicate of
    /// the deleted message resolves to the tombstone, not a fresh entry.
    pub fn remove_message(&self, id: &MessageId) -> bool {
        let mut inner = self.inner.write();
        let Some(removed) = inner.messages.remove(id) else {
            return false;
        };
        Self::feed_order_remove(&mut inner, removed.entity.created_at, id);
        inner.message_tombstones.insert(*id, Utc::now());
        Self::notify(&mut inner, &StoreEvent::MessageRemoved { id: *id });
        true
    }

    /// Marks a still-pending message as terminally failed. Returns `false`
    /// if the entry is absent or no longer pending.
    pub fn mark_message_send_failed(&self, id: &MessageId) -> bool {
        let entity = {
            let inner = self.inner.read();
            inner
                .messages
                .get(id)
                .filter(|v| v.provenance == Provenance::PendingLocal)
                .map(|v| v.entity.clone())
        };
        entity.is_some_and(|e| self.apply_message(e, Provenance::SendFailed, Source::Local))
    }

    /// Returns a message by id.
    #[must_use]
    pub fn message(&self, id: &MessageId) -> Option<Message> {
        self.inner.read().messages.get(id).map(|v| v.entity.clone())
    }

    /// Returns the provenance tag of a message.
    #[must_use]
    pub fn message_provenance(&self, id: &MessageId) -> Option<Provenance> {
        self.inner.read().messages.get(id).map(|v| v.provenance)
    }

    /// The feed in presentation order: ascending `created_at`.
    #[must_use]
    pub fn feed(&self) -> Vec<Message> {
        let inner = self.inner.read();
        inner
            .feed_order
            .iter()
            .filter_map(|(_, id)| inner.messages.get(id).map(|v| v.entity.clone()))
            .collect()
    }

    /// Total number of messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }

    fn insert_message_entry(inner: &mut Inner, id: MessageId, mut entry: Versioned<Message>) {
        if inner.messages.contains_key(&id) {
            Self::evict_message_entry(inner, &id);
        }
        entry.entity.id = id;
        let fp = Fingerprint::of(
            entry.entity.author_id,
            &entry.entity.content,
            entry.entity.created_at,
        );
        let ids = inner.fingerprints.entry(fp).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        Self::feed_order_insert(inner, entry.entity.created_at, id);
        inner.messages.insert(id, entry);
    }

    fn evict_message_entry(inner: &mut Inner, id: &MessageId) {
        let Some(entry) = inner.messages.remove(id) else {
            return;
        };
        Self::feed_order_remove(inner, entry.entity.created_at, id);
        let fp = Fingerprint::of(
            entry.entity.author_id,
            &entry.entity.content,
            entry.entity.created_at,
        );
        if let Some(ids) = inner.fingerprints.get_mut(&fp) {
            ids.retain(|registered| registered != id);
            if ids.is_empty() {
                inner.fingerprints.remove(&fp);
            }
        }
    }

    fn feed_order_insert(inner: &mut Inner, created_at: DateTime<Utc>, id: MessageId) {
        let key = (created_at, id);
        if let Err(pos) = inner.feed_order.binary_search(&key) {
            inner.feed_order.insert(pos, key);
        }
    }

    fn feed_order_remove(inner: &mut Inner, created_at: DateTime<Utc>, id: &MessageId) {
        if let Ok(pos) = inner.feed_order.binary_search(&(created_at, *id)) {
            inner.feed_order.remove(pos);
        }
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

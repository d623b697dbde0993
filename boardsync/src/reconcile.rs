//! Pure arbitration policy for colliding entity representations.
//!
//! Every [`EntityStore`](crate::store::EntityStore) upsert routes through
//! [`resolve`], which decides whether a locally optimistic change, a
//! gateway response, or a pushed event wins. The policy is a pure function
//! of (existing entry, tombstone, incoming entry, now) and keeps no state
//! of its own.
//!
//! Rules, in priority order:
//! 1. A confirmed representation beats a local one. A deliberate local
//!    edit (strictly newer than the confirmed entry it overlays) still
//!    applies; a stale local guess does not.
//! 2. Between two confirmed representations, the later timestamp wins;
//!    on a tie the gateway response beats the push projection.
//! 3. A delete tombstone absorbs updates for [`TOMBSTONE_GRACE_MS`];
//!    after the window an update is a re-creation.

use chrono::{DateTime, Duration, Utc};

use boardsync_proto::message::Message;
use boardsync_proto::task::Task;

/// How long a delete tombstone absorbs in-flight updates, in milliseconds.
pub const TOMBSTONE_GRACE_MS: i64 = 5_000;

/// Where an entity copy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// A local optimistic guess, awaiting confirmation.
    PendingLocal,
    /// Confirmed by an authoritative source.
    Confirmed,
    /// An optimistic change being reverted after a gateway rejection.
    RollingBack,
    /// A local send that exhausted its retry ceiling. Terminal until the
    /// user explicitly retries.
    SendFailed,
}

impl Provenance {
    /// Returns `true` for the locally originated states.
    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(self, Self::PendingLocal | Self::RollingBack | Self::SendFailed)
    }
}

/// Which collaborator produced a representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The local user's own engine.
    Local,
    /// The persistence gateway (authoritative field values).
    Gateway,
    /// The push channel (may be a partial projection).
    Push,
}

/// An entity copy tagged with its provenance and source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<E> {
    /// The entity payload.
    pub entity: E,
    /// Local-versus-confirmed state of this copy.
    pub provenance: Provenance,
    /// Who produced this copy.
    pub source: Source,
}

/// Entities the coordinator can arbitrate over.
pub trait Reconcilable {
    /// The timestamp used to order competing representations.
    fn written_at(&self) -> DateTime<Utc>;
}

impl Reconcilable for Task {
    fn written_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Reconcilable for Message {
    fn written_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Outcome of arbitrating an incoming representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<E> {
    /// The incoming representation wins and should replace the entry.
    Apply(Versioned<E>),
    /// The existing state wins; the incoming representation is dropped.
    Discard,
}

impl<E> Resolution<E> {
    /// Returns `true` if the incoming representation won.
    #[must_use]
    pub const fn is_apply(&self) -> bool {
        matches!(self, Self::Apply(_))
    }
}

/// Arbitrates an incoming representation against the existing entry.
#[must_use]
pub fn resolve<E: Reconcilable>(
    existing: Option<&Versioned<E>>,
    tombstoned_at: Option<DateTime<Utc>>,
    incoming: Versioned<E>,
    now: DateTime<Utc>,
) -> Resolution<E> {
    // Rule 3: a fresh tombstone absorbs anything still in flight.
    if let Some(deleted_at) = tombstoned_at
        && now - deleted_at <= Duration::milliseconds(TOMBSTONE_GRACE_MS)
    {
        return Resolution::Discard;
    }

    let Some(existing) = existing else {
        // Nothing to collide with (or an expired tombstone): re-creation.
        return Resolution::Apply(incoming);
    };

    match (existing.provenance, incoming.provenance) {
        // Rule 1: server truth never regresses to a local guess. Only a
        // local edit strictly newer than the confirmed entry applies.
        (Provenance::Confirmed, p) if p.is_local() => {
            if incoming.entity.written_at() > existing.entity.written_at() {
                Resolution::Apply(incoming)
            } else {
                Resolution::Discard
            }
        }
        // Rule 1, other direction: any confirmation replaces local state.
        (p, Provenance::Confirmed) if p.is_local() => Resolution::Apply(incoming),
        // Rule 2: confirmed vs confirmed.
        (Provenance::Confirmed, Provenance::Confirmed) => {
            match incoming
                .entity
                .written_at()
                .cmp(&existing.entity.written_at())
            {
                std::cmp::Ordering::Greater => Resolution::Apply(incoming),
                std::cmp::Ordering::Less => Resolution::Discard,
                std::cmp::Ordering::Equal => {
                    if incoming.source == Source::Gateway && existing.source != Source::Gateway {
                        Resolution::Apply(incoming)
                    } else {
                        Resolution::Discard
                    }
                }
            }
        }
        // Local over local: the latest local intent always wins.
        _ => Resolution::Apply(incoming),
    }
}

//! In-memory room membership.
//!
//! The registry maps a room id to the sessions currently connected to it.
//! Each room also owns a sequencer: an async mutex that callers hold while
//! they publish to the room, persist-then-publish, or join-then-replay, so
//! all members observe the same order and a newcomer sees every message
//! exactly once (either in its history or live).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use huddle_auth::Identity;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::CloseReason;

pub type SessionId = String;

/// A serialized outbound event, shared between every recipient of a publish.
pub type OutboundFrame = Arc<str>;

/// Why a frame could not be queued for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The session's outbound queue is full.
    Full,
    /// The session's writer is gone.
    Closed,
}

/// The part of a session other tasks may touch: push frames, request close.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: SessionId,
    identity: Identity,
    outbound: mpsc::Sender<OutboundFrame>,
    close: watch::Sender<Option<CloseReason>>,
}

impl SessionHandle {
    /// Create a handle plus the receiving ends the session's writer drains.
    pub fn new(
        identity: Identity,
        buffer: usize,
    ) -> (
        Self,
        mpsc::Receiver<OutboundFrame>,
        watch::Receiver<Option<CloseReason>>,
    ) {
        let (outbound, outbound_rx) = mpsc::channel(buffer.max(1));
        let (close, close_rx) = watch::channel(None);
        let handle = Self {
            inner: Arc::new(HandleInner {
                id: cuid2::create_id(),
                identity,
                outbound,
                close,
            }),
        };
        (handle, outbound_rx, close_rx)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, frame: OutboundFrame) -> Result<(), DeliveryError> {
        self.inner.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Ask the session to close. Only the first reason sticks.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.inner.close.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.inner.close.borrow()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("user_id", &self.inner.identity.user_id)
            .finish()
    }
}

struct RoomEntry {
    members: HashMap<SessionId, SessionHandle>,
    sequencer: Arc<Mutex<()>>,
}

impl RoomEntry {
    fn new() -> Self {
        Self {
            members: HashMap::new(),
            sequencer: Arc::new(Mutex::new(())),
        }
    }
}

/// Room id to connected sessions.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, RoomEntry>>,
    draining: AtomicBool,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a room. Joining again with the same session is a no-op.
    ///
    /// Once the registry is drained every join is refused and the session is
    /// told to close with `GoingAway`.
    pub fn join(&self, room_id: &str, session: SessionHandle) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        if self.draining.load(Ordering::Acquire) {
            drop(rooms);
            debug!(room_id, session_id = session.id(), "join refused, registry drained");
            session.close(CloseReason::GoingAway);
            return false;
        }

        let entry = rooms
            .entry(room_id.to_string())
            .or_insert_with(RoomEntry::new);

        if entry.members.contains_key(session.id()) {
            return false;
        }

        debug!(room_id, session_id = session.id(), "session joined room");
        entry.members.insert(session.id().to_string(), session);
        true
    }

    /// Remove a session from a room. Unknown rooms and sessions are ignored.
    pub fn leave(&self, room_id: &str, session_id: &str) -> bool {
        self.remove_member(room_id, session_id, None)
    }

    /// Snapshot of the sessions in a room; empty for unknown rooms.
    pub fn members(&self, room_id: &str) -> Vec<SessionHandle> {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms
            .get(room_id)
            .map(|entry| entry.members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.get(room_id).map_or(0, |entry| entry.members.len())
    }

    pub fn contains(&self, room_id: &str, session_id: &str) -> bool {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms
            .get(room_id)
            .is_some_and(|entry| entry.members.contains_key(session_id))
    }

    /// Number of rooms with live entries.
    pub fn room_count(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of live sessions across all rooms.
    pub fn session_count(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.members.len())
            .sum()
    }

    /// The room's ordering lock, creating the room entry if needed.
    pub fn sequencer(&self, room_id: &str) -> Arc<Mutex<()>> {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            &rooms
                .entry(room_id.to_string())
                .or_insert_with(RoomEntry::new)
                .sequencer,
        )
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Close every session with `GoingAway`, forget all rooms and refuse
    /// later joins.
    pub fn drain(&self) -> usize {
        let rooms = {
            let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
            self.draining.store(true, Ordering::Release);
            std::mem::take(&mut *rooms)
        };
        let mut drained = 0;
        for entry in rooms.into_values() {
            for session in entry.members.into_values() {
                session.close(CloseReason::GoingAway);
                drained += 1;
            }
        }
        info!(sessions = drained, "room registry drained");
        drained
    }

    /// Remove a member and drop the room entry once nobody uses it.
    ///
    /// `held` is the sequencer reference the caller itself still owns; any
    /// other outstanding reference belongs to a session that is about to
    /// join, so the entry must survive.
    fn remove_member(
        &self,
        room_id: &str,
        session_id: &str,
        held: Option<&Arc<Mutex<()>>>,
    ) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = rooms.get_mut(room_id) else {
            return false;
        };

        let removed = entry.members.remove(session_id).is_some();
        if removed {
            debug!(room_id, session_id, "session left room");
        }

        let held = usize::from(held.is_some_and(|held| Arc::ptr_eq(held, &entry.sequencer)));
        if entry.members.is_empty() && Arc::strong_count(&entry.sequencer) <= 1 + held {
            rooms.remove(room_id);
        }
        removed
    }
}

/// A session's place in a room. Leaves the room exactly once: on
/// [`Membership::release`] or, failing that, on drop.
pub struct Membership {
    registry: Arc<RoomRegistry>,
    room_id: String,
    session: SessionHandle,
    sequencer: Arc<Mutex<()>>,
    released: bool,
}

impl Membership {
    /// Reserve the room's sequencer for a session. Nothing is joined yet.
    pub fn reserve(registry: Arc<RoomRegistry>, room_id: &str, session: SessionHandle) -> Self {
        let sequencer = registry.sequencer(room_id);
        Self {
            registry,
            room_id: room_id.to_string(),
            session,
            sequencer,
            released: false,
        }
    }

    /// Lock the room's ordering sequencer.
    pub async fn ordered(&self) -> MutexGuard<'_, ()> {
        self.sequencer.lock().await
    }

    pub fn join(&self) -> bool {
        self.registry.join(&self.room_id, self.session.clone())
    }

    /// Leave the room. Returns false if this membership was already released.
    pub fn release(&mut self) -> bool {
        if std::mem::replace(&mut self.released, true) {
            return false;
        }
        self.registry
            .remove_member(&self.room_id, self.session.id(), Some(&self.sequencer));
        true
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.release();
    }
}

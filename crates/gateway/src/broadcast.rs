//! Fan-out of events to every session in a room.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::CloseReason;
use crate::registry::{DeliveryError, OutboundFrame, RoomRegistry, SessionHandle};

/// Delivers events to the members of a room.
///
/// Publishing never waits on a recipient: each member gets the frame queued
/// on its bounded outbound channel or, if that channel is full, is closed
/// with [`CloseReason::SlowConsumer`]. Callers that need room-wide ordering
/// publish while holding the room's sequencer.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Send `event` to every current member. Returns how many were reached.
    pub fn publish<E: Serialize>(&self, room_id: &str, event: &E) -> usize {
        self.fan_out(room_id, event, None)
    }

    /// Send `event` to every current member except `exclude`.
    pub fn publish_except<E: Serialize>(&self, room_id: &str, event: &E, exclude: &str) -> usize {
        self.fan_out(room_id, event, Some(exclude))
    }

    fn fan_out<E: Serialize>(&self, room_id: &str, event: &E, exclude: Option<&str>) -> usize {
        let frame: OutboundFrame = match serde_json::to_string(event) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!(room_id, error = %e, "failed to serialize room event");
                return 0;
            }
        };

        let members = self.registry.members(room_id);
        let mut reached = 0;
        for member in members
            .iter()
            .filter(|member| exclude != Some(member.id()))
        {
            if deliver(room_id, member, Arc::clone(&frame)) {
                reached += 1;
            }
        }

        debug!(room_id, reached, members = members.len(), "published room event");
        reached
    }
}

fn deliver(room_id: &str, member: &SessionHandle, frame: OutboundFrame) -> bool {
    match member.try_deliver(frame) {
        Ok(()) => true,
        Err(DeliveryError::Full) => {
            warn!(
                room_id,
                session_id = member.id(),
                user_id = %member.identity().user_id,
                "outbound queue full, disconnecting session"
            );
            member.close(CloseReason::SlowConsumer);
            false
        }
        Err(DeliveryError::Closed) => {
            // Writer already gone; the session is on its way out.
            debug!(room_id, session_id = member.id(), "skipped closed session");
            false
        }
    }
}

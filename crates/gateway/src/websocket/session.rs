//! Per-connection chat session.
//!
//! A session moves through `Admitting → Joining → Replaying → Active →
//! Closing → Closed`. Admission happens in the upgrade handler; by the time
//! [`run_session`] is called the identity and room are already known.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use huddle_auth::Identity;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::admission::Admission;
use crate::error::CloseReason;
use crate::registry::{DeliveryError, Membership, OutboundFrame, SessionHandle};
use crate::state::GatewayState;

use super::events::{parse_client_event, ClientEvent, InboundError, ServerEvent};

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Admitting,
    Joining,
    Replaying,
    Active,
    Closing,
    Closed,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed or the transport dropped.
    Disconnected,
    /// The server closed the connection.
    Closed(CloseReason),
}

struct ChatSession {
    gateway: GatewayState,
    handle: SessionHandle,
    room_id: String,
    state: SessionState,
}

impl ChatSession {
    fn transition(&mut self, next: SessionState) {
        debug!(
            session_id = self.handle.id(),
            room_id = %self.room_id,
            from = ?self.state,
            to = ?next,
            "session state change"
        );
        self.state = next;
    }

    fn identity(&self) -> &Identity {
        self.handle.identity()
    }

    /// Queue a frame for this session only.
    fn reply(&self, event: &ServerEvent) {
        let frame: OutboundFrame = match serde_json::to_string(event) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!(session_id = self.handle.id(), error = %e, "failed to serialize reply");
                return;
            }
        };

        if let Err(DeliveryError::Full) = self.handle.try_deliver(frame) {
            warn!(session_id = self.handle.id(), "outbound queue full, disconnecting session");
            self.handle.close(CloseReason::SlowConsumer);
        }
    }

    fn reply_error(&self, message: impl Into<String>) {
        self.reply(&ServerEvent::error(message));
    }

    /// Join the room and send its history, all under the room's sequencer.
    ///
    /// Frames the client sends meanwhile are kept in `pending`, up to the
    /// outbound buffer size; beyond that they stay in the transport. Returns
    /// `Err` if the connection ended before replay finished.
    async fn join_and_replay(
        &mut self,
        membership: &Membership,
        inbound: &mut SplitStream<WebSocket>,
        closed: &mut watch::Receiver<Option<CloseReason>>,
        pending: &mut VecDeque<Message>,
    ) -> Result<(), SessionEnd> {
        let _order = membership.ordered().await;
        if !membership.join() {
            if let Some(reason) = self.handle.close_reason() {
                return Err(SessionEnd::Closed(reason));
            }
        }
        self.transition(SessionState::Replaying);

        let messages = self.gateway.messages.clone();
        let limit = self.gateway.realtime.outbound_buffer;
        let history = tokio::select! {
            result = messages.history(&self.room_id) => result,
            end = buffer_inbound(inbound, pending, limit) => return Err(end),
            reason = wait_for_close(closed) => {
                return Err(reason.map_or(SessionEnd::Disconnected, SessionEnd::Closed));
            }
        };

        let history = match history {
            Ok(history) => history,
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "history query failed, sending empty history");
                Vec::new()
            }
        };

        debug!(room_id = %self.room_id, messages = history.len(), "replaying history");
        self.reply(&ServerEvent::history(&history));
        Ok(())
    }

    async fn handle_frame(&self, membership: &Membership, frame: Message) -> Option<SessionEnd> {
        match frame {
            Message::Text(text) => {
                self.handle_text(membership, &text).await;
                None
            }
            Message::Binary(_) => {
                self.reply_error(InboundError::Binary.to_string());
                None
            }
            Message::Close(_) => Some(SessionEnd::Disconnected),
            // Pings are answered by the transport.
            Message::Ping(_) | Message::Pong(_) => None,
        }
    }

    async fn handle_text(&self, membership: &Membership, text: &str) {
        let event = match parse_client_event(text, self.gateway.realtime.max_message_length) {
            Ok(event) => event,
            Err(e) => {
                debug!(session_id = self.handle.id(), error = %e, "rejected inbound frame");
                self.reply_error(e.to_string());
                return;
            }
        };

        match event {
            ClientEvent::Typing => {
                let _order = membership.ordered().await;
                self.gateway.broadcaster.publish_except(
                    &self.room_id,
                    &ServerEvent::typing(self.identity()),
                    self.handle.id(),
                );
            }
            ClientEvent::Chat(body) => {
                let order = membership.ordered().await;
                match self
                    .gateway
                    .messages
                    .append(&self.room_id, self.identity(), &body)
                    .await
                {
                    Ok(stored) => {
                        self.gateway
                            .broadcaster
                            .publish(&self.room_id, &ServerEvent::message(&stored));
                    }
                    Err(e) => {
                        drop(order);
                        error!(
                            room_id = %self.room_id,
                            user_id = %self.identity().user_id,
                            error = %e,
                            "failed to persist chat message"
                        );
                        self.reply_error("Message could not be saved");
                    }
                }
            }
        }
    }
}

/// Drive an admitted connection until it ends.
pub async fn run_session(socket: WebSocket, gateway: GatewayState, admission: Admission) -> SessionEnd {
    let Admission { identity, room_id } = admission;
    let (handle, outbound, closed) =
        SessionHandle::new(identity, gateway.realtime.outbound_buffer);
    let (sink, mut inbound) = socket.split();

    info!(
        session_id = handle.id(),
        user_id = %handle.identity().user_id,
        room_id = %room_id,
        "session started"
    );

    let mut writer: JoinHandle<Option<CloseReason>> =
        tokio::spawn(write_frames(sink, outbound, closed.clone()));

    let mut session = ChatSession {
        gateway: gateway.clone(),
        handle: handle.clone(),
        room_id: room_id.clone(),
        state: SessionState::Admitting,
    };
    session.transition(SessionState::Joining);

    let mut membership = Membership::reserve(gateway.registry.clone(), &room_id, handle.clone());
    let mut pending = VecDeque::new();
    let mut closed_rx = closed;

    let mut writer_done = false;
    let mut end = session
        .join_and_replay(&membership, &mut inbound, &mut closed_rx, &mut pending)
        .await
        .err();

    if end.is_none() {
        session.transition(SessionState::Active);
    }

    while end.is_none() {
        let frame = match pending.pop_front() {
            Some(frame) => Some(Ok(frame)),
            None => tokio::select! {
                frame = inbound.next() => frame,
                reason = &mut writer => {
                    writer_done = true;
                    end = Some(match reason {
                        Ok(Some(reason)) => SessionEnd::Closed(reason),
                        _ => SessionEnd::Disconnected,
                    });
                    break;
                }
            },
        };

        end = match frame {
            Some(Ok(frame)) => session.handle_frame(&membership, frame).await,
            Some(Err(e)) => {
                debug!(session_id = handle.id(), error = %e, "transport error");
                Some(SessionEnd::Disconnected)
            }
            None => Some(SessionEnd::Disconnected),
        };
    }

    session.transition(SessionState::Closing);
    membership.release();
    match end {
        // A server-side close still has a close frame to flush.
        Some(SessionEnd::Closed(_)) if !writer_done => {
            let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await;
        }
        // The transport answers a peer's close frame on the next read.
        Some(SessionEnd::Disconnected) | None => {
            let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, finish_inbound(&mut inbound)).await;
        }
        Some(SessionEnd::Closed(_)) => {}
    }
    if !writer_done {
        writer.abort();
    }
    session.transition(SessionState::Closed);

    let end = end.unwrap_or(SessionEnd::Disconnected);
    info!(
        session_id = handle.id(),
        room_id = %room_id,
        close_code = match end {
            SessionEnd::Closed(reason) => Some(reason.code()),
            SessionEnd::Disconnected => None,
        },
        "session ended"
    );
    end
}

/// Forward queued frames to the socket until the session is told to close.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    mut closed: watch::Receiver<Option<CloseReason>>,
) -> Option<CloseReason> {
    loop {
        tokio::select! {
            biased;
            reason = wait_for_close(&mut closed) => {
                if let Some(reason) = reason {
                    let _ = sink.send(Message::Close(Some(close_frame(reason)))).await;
                }
                return reason;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return None;
                };
                if sink.send(Message::Text(frame.to_string())).await.is_err() {
                    return None;
                }
            }
        }
    }
}

/// Resolve once a close reason is set. `None` if the handle is gone.
async fn wait_for_close(closed: &mut watch::Receiver<Option<CloseReason>>) -> Option<CloseReason> {
    match closed.wait_for(Option::is_some).await {
        Ok(reason) => *reason,
        Err(_) => None,
    }
}

/// Hold on to inbound frames until the transport ends. Stops reading once
/// `limit` frames are held.
async fn buffer_inbound<S, E>(inbound: &mut S, pending: &mut VecDeque<Message>, limit: usize) -> SessionEnd
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    loop {
        if pending.len() >= limit.max(1) {
            return std::future::pending().await;
        }
        match inbound.next().await {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return SessionEnd::Disconnected,
            Some(Ok(frame)) => pending.push_back(frame),
        }
    }
}

/// Read until the transport ends, discarding frames.
async fn finish_inbound<S, E>(inbound: &mut S)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    while let Some(Ok(_)) = inbound.next().await {}
}

pub fn close_frame(reason: CloseReason) -> CloseFrame<'static> {
    CloseFrame {
        code: reason.code(),
        reason: reason.description().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::convert::Infallible;

    fn text(body: &str) -> Result<Message, Infallible> {
        Ok(Message::Text(body.to_string()))
    }

    #[tokio::test]
    async fn buffering_stops_at_the_limit() {
        let mut inbound = stream::iter((0..10).map(|n| text(&n.to_string())));
        let mut pending = VecDeque::new();

        let buffered = tokio::time::timeout(
            Duration::from_millis(50),
            buffer_inbound(&mut inbound, &mut pending, 3),
        )
        .await;

        assert!(buffered.is_err());
        assert_eq!(pending.len(), 3);
        assert!(matches!(inbound.next().await, Some(Ok(Message::Text(body))) if body == "3"));
    }

    #[tokio::test]
    async fn buffering_ends_on_peer_close() {
        let frames = vec![text("a"), Ok(Message::Close(None)), text("b")];
        let mut inbound = stream::iter(frames);
        let mut pending = VecDeque::new();

        let end = buffer_inbound(&mut inbound, &mut pending, 8).await;

        assert_eq!(end, SessionEnd::Disconnected);
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn finish_inbound_reads_to_the_end() {
        let mut inbound = stream::iter(vec![text("a"), text("b")]);
        finish_inbound(&mut inbound).await;
        assert!(inbound.next().await.is_none());
    }
}

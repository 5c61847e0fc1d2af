//! Shared application state for the gateway

use std::sync::Arc;

use huddle_auth::CredentialValidator;
use huddle_config::RealtimeConfig;
use huddle_database::{MessageStore, RoomDirectory};

use crate::broadcast::Broadcaster;
use crate::registry::RoomRegistry;

/// Everything a connection needs, shared by all of them.
#[derive(Clone)]
pub struct GatewayState {
    /// Verifies bearer tokens
    pub validator: CredentialValidator,
    /// Durable message log
    pub messages: Arc<dyn MessageStore>,
    /// Room existence checks
    pub rooms: Arc<dyn RoomDirectory>,
    /// Live room membership
    pub registry: Arc<RoomRegistry>,
    /// Room fan-out
    pub broadcaster: Broadcaster,
    /// Session limits
    pub realtime: RealtimeConfig,
}

impl GatewayState {
    pub fn new(
        validator: CredentialValidator,
        messages: Arc<dyn MessageStore>,
        rooms: Arc<dyn RoomDirectory>,
        realtime: RealtimeConfig,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        Self {
            validator,
            messages,
            rooms,
            registry,
            broadcaster,
            realtime,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}

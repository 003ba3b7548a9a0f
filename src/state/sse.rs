use tokio::sync::{Mutex, broadcast};

use crate::dto::sse::ServerEvent;

/// SSE channels of one match.
pub struct MatchChannels {
    viewer: SseHub,
    controller: ControllerChannel,
}

impl MatchChannels {
    /// Build both hubs with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            viewer: SseHub::new(capacity),
            controller: ControllerChannel::new(capacity),
        }
    }

    /// Hub fanning out events every viewer of the match receives.
    pub fn viewer(&self) -> &SseHub {
        &self.viewer
    }

    /// Hub and lease of the controller stream.
    pub fn controller(&self) -> &ControllerChannel {
        &self.controller
    }

    /// Send an event to viewers and to the controller.
    pub fn broadcast_all(&self, event: ServerEvent) {
        self.viewer.broadcast(event.clone());
        self.controller.hub.broadcast(event);
    }
}

/// Controller hub plus the token identifying the single controller stream.
pub struct ControllerChannel {
    hub: SseHub,
    token: Mutex<Option<String>>,
}

impl ControllerChannel {
    fn new(capacity: usize) -> Self {
        Self {
            hub: SseHub::new(capacity),
            token: Mutex::new(None),
        }
    }

    /// Borrow the broadcast hub used for controller-only events.
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    /// Borrow the token mutex that coordinates the single controller connection.
    pub fn token(&self) -> &Mutex<Option<String>> {
        &self.token
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

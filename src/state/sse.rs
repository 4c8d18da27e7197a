use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard, broadcast};

use crate::dto::sse::ServerEvent;

/// Per-session broadcast hubs, created on first subscription or publish.
pub struct SessionHubs {
    hubs: DashMap<String, Arc<SseHub>>,
    capacity: usize,
}

impl SessionHubs {
    /// Build an empty registry whose hubs use `capacity`-sized channels.
    pub fn new(capacity: usize) -> Self {
        Self {
            hubs: DashMap::new(),
            capacity,
        }
    }

    /// Hub for `code`, creating it when missing.
    pub fn hub(&self, code: &str) -> Arc<SseHub> {
        self.hubs
            .entry(code.to_owned())
            .or_insert_with(|| Arc::new(SseHub::new(self.capacity)))
            .clone()
    }

    /// Hub for `code` only if someone is listening.
    pub fn active(&self, code: &str) -> Option<Arc<SseHub>> {
        self.hubs
            .get(code)
            .filter(|hub| hub.receiver_count() > 0)
            .map(|hub| hub.clone())
    }

    /// Every hub that currently has listeners.
    pub fn all_active(&self) -> Vec<Arc<SseHub>> {
        self.hubs
            .iter()
            .filter(|entry| entry.value().receiver_count() > 0)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Forget the hub of `code` once its last listener has gone.
    pub fn release_idle(&self, code: &str) {
        self.hubs.remove_if(code, |_, hub| hub.receiver_count() == 0);
    }

    /// Drop the hub of an abandoned session; open streams end once their receiver closes.
    pub fn remove(&self, code: &str) -> Option<Arc<SseHub>> {
        self.hubs.remove(code).map(|(_, hub)| hub)
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
    publishing: Mutex<()>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            sender,
            publishing: Mutex::new(()),
        }
    }

    /// Exclusive right to read and publish a snapshot, held across the store read.
    pub async fn publishing(&self) -> MutexGuard<'_, ()> {
        self.publishing.lock().await
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

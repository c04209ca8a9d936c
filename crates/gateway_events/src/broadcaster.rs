//! In-process fan-out of [`GatewayEvent`]s to the sessions of online characters.
//!
//! A session registers its character at login and receives the inbound half of a
//! bounded channel. Listeners for the event bus publish into the broadcaster by
//! character guid; publishing to a character that is not registered is a no-op.

use crate::events::GatewayEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

/// Capacity of each character's event queue.
pub const CHARACTER_EVENTS_CAPACITY: usize = 100;

/// Registry of per-character event queues.
///
/// Uses `RwLock<HashMap>` since publishing (reads) vastly outnumbers
/// registration changes (writes).
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    characters: Arc<RwLock<HashMap<u64, mpsc::Sender<GatewayEvent>>>>,
    capacity: usize,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(CHARACTER_EVENTS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            characters: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Registers `guid` and returns the receiving end of its event queue.
    ///
    /// Registering a guid twice replaces the previous queue; the old receiver
    /// observes a closed channel.
    pub async fn register_character(&self, guid: u64) -> mpsc::Receiver<GatewayEvent> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.characters.write().await.insert(guid, sender);
        debug!("📬 Registered event queue for character {}", guid);
        receiver
    }

    pub async fn unregister_character(&self, guid: u64) {
        if self.characters.write().await.remove(&guid).is_some() {
            debug!("📭 Unregistered event queue for character {}", guid);
        }
    }

    /// Delivers `event` to `guid`, waiting for queue space if it is full.
    ///
    /// # Returns
    ///
    /// `true` if the character was registered and the event was queued.
    pub async fn publish(&self, guid: u64, event: GatewayEvent) -> bool {
        let sender = self.characters.read().await.get(&guid).cloned();
        let Some(sender) = sender else {
            trace!("Dropping {} for offline character {}", event.kind(), guid);
            return false;
        };
        sender.send(event).await.is_ok()
    }

    pub async fn registered_count(&self) -> usize {
        self.characters.read().await.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

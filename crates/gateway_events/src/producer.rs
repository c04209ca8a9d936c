//! Outbound event contracts published by the gateway.
//!
//! The transport that carries these events between processes is not part of the
//! gateway; [`ChannelEventsProducer`] hands them to in-process subscribers (a bus
//! adapter, or the logging relay used by the standalone binary).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("No subscribers for outbound event {0}")]
    NoSubscribers(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterLoggedInPayload {
    pub realm_id: u32,
    pub gateway_id: String,
    pub guid: u64,
    pub name: String,
    pub race: u8,
    pub class: u8,
    pub gender: u8,
    pub level: u8,
    pub zone: u32,
    pub map: u32,
    pub position: [f32; 3],
    pub guild_id: u32,
    pub account_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterLoggedOutPayload {
    pub realm_id: u32,
    pub gateway_id: String,
    pub guid: u64,
    pub name: String,
    pub guild_id: u32,
    pub account_id: u32,
}

/// Accumulated changes for one character. `None` fields did not change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterUpdate {
    pub guid: u64,
    pub level: Option<u8>,
    pub map: Option<u32>,
    pub area: Option<u32>,
    pub zone: Option<u32>,
}

impl CharacterUpdate {
    /// Overlays the fields set in `newer` onto `self`.
    pub fn merge(&mut self, newer: CharacterUpdate) {
        if newer.level.is_some() {
            self.level = newer.level;
        }
        if newer.map.is_some() {
            self.map = newer.map;
        }
        if newer.area.is_some() {
            self.area = newer.area;
        }
        if newer.zone.is_some() {
            self.zone = newer.zone;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharactersUpdatedPayload {
    pub realm_id: u32,
    pub updates: Vec<CharacterUpdate>,
}

/// Everything the gateway publishes outward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum OutboundEvent {
    CharacterLoggedIn(CharacterLoggedInPayload),
    CharacterLoggedOut(CharacterLoggedOutPayload),
    CharactersUpdated(CharactersUpdatedPayload),
}

impl OutboundEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            OutboundEvent::CharacterLoggedIn(_) => "gw.character.logged_in",
            OutboundEvent::CharacterLoggedOut(_) => "gw.character.logged_out",
            OutboundEvent::CharactersUpdated(_) => "gw.characters.updated",
        }
    }
}

/// Publisher of gateway lifecycle events.
#[async_trait]
pub trait EventsProducer: Send + Sync {
    async fn character_logged_in(&self, payload: CharacterLoggedInPayload) -> Result<(), ProducerError>;
    async fn character_logged_out(&self, payload: CharacterLoggedOutPayload) -> Result<(), ProducerError>;
    async fn characters_updated(&self, payload: CharactersUpdatedPayload) -> Result<(), ProducerError>;
}

/// Producer backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct ChannelEventsProducer {
    sender: broadcast::Sender<OutboundEvent>,
}

impl ChannelEventsProducer {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, event: OutboundEvent) -> Result<(), ProducerError> {
        let subject = event.subject();
        self.sender
            .send(event)
            .map(|receivers| debug!("📤 Published {} to {} subscribers", subject, receivers))
            .map_err(|_| ProducerError::NoSubscribers(subject))
    }

    /// Spawns a subscriber that writes every outbound event to the log.
    ///
    /// Used when no bus adapter is attached, so that published events stay
    /// observable and publishing never fails for lack of subscribers.
    pub fn spawn_log_relay(&self) -> tokio::task::JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => info!("📣 {} {}", event.subject(), json),
                        Err(e) => info!("📣 {} (unserializable: {})", event.subject(), e),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Event log relay skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[async_trait]
impl EventsProducer for ChannelEventsProducer {
    async fn character_logged_in(&self, payload: CharacterLoggedInPayload) -> Result<(), ProducerError> {
        self.emit(OutboundEvent::CharacterLoggedIn(payload))
    }

    async fn character_logged_out(&self, payload: CharacterLoggedOutPayload) -> Result<(), ProducerError> {
        self.emit(OutboundEvent::CharacterLoggedOut(payload))
    }

    async fn characters_updated(&self, payload: CharactersUpdatedPayload) -> Result<(), ProducerError> {
        self.emit(OutboundEvent::CharactersUpdated(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut update = CharacterUpdate { guid: 1, level: Some(10), map: Some(0), ..Default::default() };
        update.merge(CharacterUpdate { guid: 1, map: Some(530), zone: Some(3430), ..Default::default() });

        assert_eq!(update.level, Some(10));
        assert_eq!(update.map, Some(530));
        assert_eq!(update.zone, Some(3430));
        assert_eq!(update.area, None);
    }

    #[tokio::test]
    async fn test_channel_producer_delivers_to_subscriber() {
        let producer = ChannelEventsProducer::new(8);
        let mut receiver = producer.subscribe();

        producer
            .character_logged_out(CharacterLoggedOutPayload {
                realm_id: 1,
                gateway_id: "gw-1".to_string(),
                guid: 9,
                name: "Arthas".to_string(),
                guild_id: 0,
                account_id: 3,
            })
            .await
            .expect("subscriber is attached");

        let event = receiver.recv().await.expect("event delivered");
        assert_eq!(event.subject(), "gw.character.logged_out");
    }

    #[tokio::test]
    async fn test_channel_producer_without_subscribers_fails() {
        let producer = ChannelEventsProducer::new(8);
        let result = producer
            .characters_updated(CharactersUpdatedPayload { realm_id: 1, updates: vec![] })
            .await;
        assert!(matches!(result, Err(ProducerError::NoSubscribers(_))));
    }
}

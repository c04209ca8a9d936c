//! # Gateway Events
//!
//! Inbound domain events delivered to a single character's session. Every event
//! is a variant of the closed [`GatewayEvent`] enum with exactly one payload
//! shape, and [`EventKind`] names the variant without its payload so dispatch
//! tables can be keyed by it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Discriminant of a [`GatewayEvent`], used as the key of event dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    IncomingWhisper,
    GroupUpdated,
    BattlegroundJoinedQueue,
    BattlegroundInvited,
    BattlegroundInviteExpired,
    BattlegroundStatusChanged,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::IncomingWhisper,
        EventKind::GroupUpdated,
        EventKind::BattlegroundJoinedQueue,
        EventKind::BattlegroundInvited,
        EventKind::BattlegroundInviteExpired,
        EventKind::BattlegroundStatusChanged,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::IncomingWhisper => "IncomingWhisper",
            EventKind::GroupUpdated => "GroupUpdated",
            EventKind::BattlegroundJoinedQueue => "BattlegroundJoinedQueue",
            EventKind::BattlegroundInvited => "BattlegroundInvited",
            EventKind::BattlegroundInviteExpired => "BattlegroundInviteExpired",
            EventKind::BattlegroundStatusChanged => "BattlegroundStatusChanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event addressed to one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GatewayEvent {
    /// A whisper routed through the chat service.
    IncomingWhisper(WhisperPayload),
    /// The character's group changed on the group service.
    GroupUpdated(GroupUpdatedPayload),
    /// Matchmaking accepted the character into a battleground queue.
    BattlegroundJoinedQueue(BattlegroundQueuedPayload),
    /// Matchmaking found a battleground for the character.
    BattlegroundInvited(BattlegroundInvitedPayload),
    /// The character did not accept the invite in time.
    BattlegroundInviteExpired(BattlegroundInviteExpiredPayload),
    /// Matchmaking changed the character's queue status.
    BattlegroundStatusChanged(BattlegroundStatusPayload),
}

impl GatewayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GatewayEvent::IncomingWhisper(_) => EventKind::IncomingWhisper,
            GatewayEvent::GroupUpdated(_) => EventKind::GroupUpdated,
            GatewayEvent::BattlegroundJoinedQueue(_) => EventKind::BattlegroundJoinedQueue,
            GatewayEvent::BattlegroundInvited(_) => EventKind::BattlegroundInvited,
            GatewayEvent::BattlegroundInviteExpired(_) => EventKind::BattlegroundInviteExpired,
            GatewayEvent::BattlegroundStatusChanged(_) => EventKind::BattlegroundStatusChanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperPayload {
    pub sender_guid: u64,
    pub sender_name: String,
    pub language: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUpdatedPayload {
    pub group_id: u32,
    pub members: Vec<u64>,
}

/// Queue parameters shared by the queued and invited events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlegroundQueueInfo {
    /// Client-side queue slot per player guid.
    pub queue_slot_by_player: HashMap<u64, u32>,
    pub arena_type: u8,
    pub type_id: u32,
    pub min_level: u8,
    pub max_level: u8,
    pub is_rated: bool,
}

impl BattlegroundQueueInfo {
    /// Queue slot of `guid`, or slot 0 when matchmaking did not assign one.
    pub fn slot_for(&self, guid: u64) -> u32 {
        self.queue_slot_by_player.get(&guid).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlegroundQueuedPayload {
    pub queue: BattlegroundQueueInfo,
    pub average_wait_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlegroundInvitedPayload {
    pub queue: BattlegroundQueueInfo,
    pub map_id: u32,
    pub time_to_accept_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlegroundInviteExpiredPayload {
    pub type_id: u32,
}

/// Battleground status as understood by the game client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum BattlegroundStatus {
    None = 0,
    InQueue = 1,
    Invited = 2,
    Playing = 3,
    Leaving = 4,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlegroundStatusPayload {
    pub type_id: u32,
    pub status: BattlegroundStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let event = GatewayEvent::BattlegroundInviteExpired(BattlegroundInviteExpiredPayload { type_id: 2 });
        assert_eq!(event.kind(), EventKind::BattlegroundInviteExpired);
        assert_eq!(event.kind().to_string(), "BattlegroundInviteExpired");
    }

    #[test]
    fn test_all_kinds_are_distinct() {
        let unique: std::collections::HashSet<_> = EventKind::ALL.iter().collect();
        assert_eq!(unique.len(), EventKind::ALL.len());
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = GatewayEvent::BattlegroundStatusChanged(BattlegroundStatusPayload {
            type_id: 7,
            status: BattlegroundStatus::Playing,
        });
        let json = serde_json::to_value(&event).expect("event serializes");
        assert_eq!(json["type"], "BattlegroundStatusChanged");
        assert_eq!(json["payload"]["type_id"], 7);

        let back: GatewayEvent = serde_json::from_value(json).expect("event deserializes");
        assert_eq!(back, event);
    }

    #[test]
    fn test_missing_queue_slot_defaults_to_zero() {
        let info = BattlegroundQueueInfo {
            queue_slot_by_player: HashMap::from([(10, 1)]),
            arena_type: 0,
            type_id: 2,
            min_level: 10,
            max_level: 19,
            is_rated: false,
        };
        assert_eq!(info.slot_for(10), 1);
        assert_eq!(info.slot_for(11), 0);
    }
}

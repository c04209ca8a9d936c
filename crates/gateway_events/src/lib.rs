//! # Gateway Events
//!
//! Event plumbing shared by the gateway's sessions and its process wiring:
//!
//! * [`events`] - the closed set of inbound per-character events
//! * [`broadcaster`] - in-process fan-out of inbound events to sessions
//! * [`producer`] - outbound lifecycle events and their publisher contract
//! * [`barrier`] - batching of character updates before publishing
//! * [`shutdown`] - shutdown coordination across components

pub mod barrier;
pub mod broadcaster;
pub mod events;
pub mod producer;
pub mod shutdown;

pub use barrier::{BarrierWorker, CharactersUpdatesBarrier};
pub use broadcaster::{EventBroadcaster, CHARACTER_EVENTS_CAPACITY};
pub use events::*;
pub use producer::{
    ChannelEventsProducer, CharacterLoggedInPayload, CharacterLoggedOutPayload, CharacterUpdate,
    CharactersUpdatedPayload, EventsProducer, OutboundEvent, ProducerError,
};
pub use shutdown::ShutdownState;

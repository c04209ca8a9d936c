//! Batching of character updates before they are published.
//!
//! Sessions report level, map and zone changes as they observe them in the
//! packet stream. The barrier merges changes per character and publishes them in
//! batches on a fixed interval instead of emitting one event per packet.

use crate::producer::{CharacterUpdate, CharactersUpdatedPayload, EventsProducer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const UPDATES_QUEUE_CAPACITY: usize = 1000;
const MAX_UPDATES_PER_BATCH: usize = 1000;

/// Cloneable handle used by sessions to report character changes.
#[derive(Debug, Clone)]
pub struct CharactersUpdatesBarrier {
    updates: mpsc::Sender<CharacterUpdate>,
}

/// Owns the pending updates and publishes them; run it with [`BarrierWorker::run`].
pub struct BarrierWorker {
    updates: mpsc::Receiver<CharacterUpdate>,
    producer: Arc<dyn EventsProducer>,
    realm_id: u32,
    flush_interval: Duration,
    pending: HashMap<u64, CharacterUpdate>,
}

impl CharactersUpdatesBarrier {
    pub fn new(
        producer: Arc<dyn EventsProducer>,
        realm_id: u32,
        flush_interval: Duration,
    ) -> (Self, BarrierWorker) {
        let (sender, receiver) = mpsc::channel(UPDATES_QUEUE_CAPACITY);
        let worker = BarrierWorker {
            updates: receiver,
            producer,
            realm_id,
            flush_interval,
            pending: HashMap::new(),
        };
        (Self { updates: sender }, worker)
    }

    pub async fn update_level(&self, guid: u64, level: u8) {
        self.push(CharacterUpdate { guid, level: Some(level), ..Default::default() }).await;
    }

    pub async fn update_map(&self, guid: u64, map: u32) {
        self.push(CharacterUpdate { guid, map: Some(map), ..Default::default() }).await;
    }

    pub async fn update_zone(&self, guid: u64, area: u32, zone: u32) {
        self.push(CharacterUpdate { guid, area: Some(area), zone: Some(zone), ..Default::default() })
            .await;
    }

    async fn push(&self, update: CharacterUpdate) {
        if self.updates.send(update).await.is_err() {
            warn!("Characters updates barrier is stopped, dropping update");
        }
    }
}

impl BarrierWorker {
    /// Merges incoming updates and publishes them every flush interval until
    /// `shutdown` is cancelled, then publishes whatever is still pending.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    // Failed batches stay pending and are retried on the next tick.
                    if let Err(e) = self.flush().await {
                        error!("❌ Can't publish characters updates: {}", e);
                    }
                }
                update = self.updates.recv() => match update {
                    Some(update) => self.merge(update),
                    None => break,
                },
            }
        }

        while let Ok(update) = self.updates.try_recv() {
            self.merge(update);
        }
        if let Err(e) = self.flush().await {
            error!("❌ Can't publish final characters updates: {}", e);
        }
        debug!("Characters updates barrier stopped");
    }

    fn merge(&mut self, update: CharacterUpdate) {
        match self.pending.get_mut(&update.guid) {
            Some(existing) => existing.merge(update),
            None => {
                self.pending.insert(update.guid, update);
            }
        }
    }

    async fn flush(&mut self) -> Result<(), crate::ProducerError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let updates: Vec<CharacterUpdate> = self.pending.values().cloned().collect();
        for batch in updates.chunks(MAX_UPDATES_PER_BATCH) {
            self.producer
                .characters_updated(CharactersUpdatedPayload {
                    realm_id: self.realm_id,
                    updates: batch.to_vec(),
                })
                .await?;
            for update in batch {
                self.pending.remove(&update.guid);
            }
        }
        debug!("📦 Published {} character updates", updates.len());
        Ok(())
    }
}

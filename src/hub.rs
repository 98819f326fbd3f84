//! Fan-out of published snapshots to live subscribers
//!
//! Each subscriber owns a bounded channel. Publishing never waits on a
//! subscriber: a full or closed channel removes that subscriber and
//! delivery to the rest continues.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::SnapshotCache;
use crate::metrics;
use crate::models::DashboardSnapshot;

const DEFAULT_CAPACITY: usize = 8;

/// Message pushed to subscribers, `{"type":"update","data":{...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum PushMessage {
    Update(Arc<DashboardSnapshot>),
}

/// Handle returned by [`BroadcastHub::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<PushMessage>,
}

/// Outcome of one publish
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: u64,
    pub dropped: u64,
}

pub struct BroadcastHub {
    subscribers: DashMap<Uuid, mpsc::Sender<PushMessage>>,
    cache: Arc<SnapshotCache>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self::with_capacity(cache, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(cache: Arc<SnapshotCache>, capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            cache,
            capacity: capacity.max(1),
        }
    }

    /// Register a subscriber; the current snapshot, if any, is queued at once
    ///
    /// The entry stays locked while the snapshot is queued, so a concurrent
    /// publish reaches this subscriber only afterwards. The newest snapshot
    /// may then arrive twice but is always the last one received.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();

        {
            let entry = self.subscribers.entry(id).or_insert(sender);
            if let Some(snapshot) = self.cache.current() {
                // Fresh channel with capacity >= 1, cannot be full
                let _ = entry.try_send(PushMessage::Update(snapshot));
            }
        }

        metrics::set_subscribers(self.subscribers.len());
        info!(subscriber = %id, total = self.subscribers.len(), "Subscriber connected");

        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.remove(&id).is_some() {
            metrics::set_subscribers(self.subscribers.len());
            info!(subscriber = %id, total = self.subscribers.len(), "Subscriber disconnected");
        }
    }

    /// Send `snapshot` to every live subscriber, pruning the ones that fail
    pub fn on_publish(&self, snapshot: Arc<DashboardSnapshot>) -> DeliveryReport {
        let message = PushMessage::Update(snapshot);
        let mut report = DeliveryReport::default();

        self.subscribers.retain(|id, sender| match sender.try_send(message.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(subscriber = %id, "Subscriber lagging, removing");
                report.dropped += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = %id, "Subscriber gone, removing");
                report.dropped += 1;
                false
            }
        });

        metrics::record_broadcast(report.delivered, report.dropped);
        metrics::set_subscribers(self.subscribers.len());
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

//! In-process publish/subscribe hub for live record and device updates.
//!
//! Every subscriber owns one bounded channel. Publishing never waits: when a
//! subscriber's buffer is full the event is dropped for that subscriber only
//! and counted in [`HubMetrics::dropped`]. Subscriptions end when the
//! caller's [`CancellationToken`] fires; there is no explicit unsubscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::{
    DeviceSyncStatus, FieldRecord, GateIntent, RecordId, RecordPayload, RecordStatus,
    VehicleInside,
};
use crate::util::normalize_device_id;

/// Default per-subscriber buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

/// Event stream a subscriber can follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// New and edited harvests; [`RecordEvent::change`] tells them apart
    HarvestCreated,
    HarvestApproved,
    HarvestRejected,
    VehicleEntry,
    VehicleExit,
    /// Vehicles still inside past the overstay threshold
    VehicleOverstay,
    /// Device-keyed; subscribe through [`Channel::Device`]
    DeviceSyncStatus,
}

impl Topic {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HarvestCreated => "harvest_created",
            Self::HarvestApproved => "harvest_approved",
            Self::HarvestRejected => "harvest_rejected",
            Self::VehicleEntry => "vehicle_entry",
            Self::VehicleExit => "vehicle_exit",
            Self::VehicleOverstay => "vehicle_overstay",
            Self::DeviceSyncStatus => "device_sync_status",
        }
    }
}

/// Registry key of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Topic(Topic),
    /// Sync status of one device, keyed by trimmed device id
    Device(String),
}

/// How a record event came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordChange {
    Created,
    Updated,
    Reviewed,
}

/// A record-level domain event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvent {
    pub topic: Topic,
    pub change: RecordChange,
    pub entity_id: RecordId,
    #[serde(flatten)]
    pub record: FieldRecord,
}

impl RecordEvent {
    /// Event for a freshly written record; the topic follows the record kind.
    ///
    /// Edits and retried creates stay on the kind's topic with
    /// [`RecordChange::Updated`].
    pub fn written(record: FieldRecord, change: RecordChange) -> Self {
        let topic = match &record.payload {
            RecordPayload::Harvest(_) => Topic::HarvestCreated,
            RecordPayload::GuestLog(guest) => match guest.intent {
                GateIntent::Entry => Topic::VehicleEntry,
                GateIntent::Exit => Topic::VehicleExit,
            },
        };
        Self {
            topic,
            change,
            entity_id: record.id,
            record,
        }
    }

    /// Event for a review decision; `None` for records still pending
    pub fn reviewed(record: FieldRecord) -> Option<Self> {
        let topic = match record.status {
            RecordStatus::Approved => Topic::HarvestApproved,
            RecordStatus::Rejected => Topic::HarvestRejected,
            RecordStatus::Pending => return None,
        };
        Some(Self {
            topic,
            change: RecordChange::Reviewed,
            entity_id: record.id,
            record,
        })
    }
}

/// Anything the hub can carry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Record(RecordEvent),
    DeviceStatus(DeviceSyncStatus),
    Overstay(VehicleInside),
}

impl DomainEvent {
    /// Channel the event is delivered on, `None` for an unroutable device id
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Self::Record(event) => Some(Channel::Topic(event.topic)),
            Self::DeviceStatus(status) => {
                normalize_device_id(&status.device_id).map(Channel::Device)
            }
            Self::Overstay(_) => Some(Channel::Topic(Topic::VehicleOverstay)),
        }
    }
}

/// Snapshot of hub counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubMetrics {
    /// Events handed to `publish`
    pub published: u64,
    /// Successful per-subscriber deliveries
    pub delivered: u64,
    /// Per-subscriber deliveries lost to a full buffer
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

type Registry = HashMap<Channel, HashMap<u64, mpsc::Sender<DomainEvent>>>;

/// Publish/subscribe broker shared by `Arc`
pub struct EventHub {
    buffer: usize,
    registry: Arc<RwLock<Registry>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl EventHub {
    /// Create a hub whose subscribers buffer up to `buffer` events (minimum 1)
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            registry: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Register a subscriber on `channel` until `token` is cancelled.
    ///
    /// Must be called from within a Tokio runtime. A device channel with a
    /// blank device id yields a receiver that is already closed.
    pub fn subscribe(
        &self,
        token: CancellationToken,
        channel: Channel,
    ) -> mpsc::Receiver<DomainEvent> {
        let (sender, receiver) = mpsc::channel(self.buffer);

        let channel = match channel {
            Channel::Device(device_id) => match normalize_device_id(&device_id) {
                Some(device_id) => Channel::Device(device_id),
                None => return receiver,
            },
            topic @ Channel::Topic(_) => topic,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.clone())
            .or_default()
            .insert(id, sender);
        tracing::debug!(?channel, subscriber = id, "Subscriber registered");

        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            token.cancelled().await;
            let mut registry = registry.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(subscribers) = registry.get_mut(&channel) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    registry.remove(&channel);
                }
            }
            tracing::debug!(?channel, subscriber = id, "Subscriber removed");
        });

        receiver
    }

    /// Fan an event out to every subscriber of its channel without blocking.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let Some(channel) = event.channel() else {
            return 0;
        };
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = registry.get(&channel) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, sender) in subscribers {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        ?channel,
                        subscriber = id,
                        "Subscriber buffer full, dropping event"
                    );
                }
                // Receiver gone; the cancellation watcher cleans up
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Number of live subscribers on a channel
    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, HashMap::len)
    }

    pub fn metrics(&self) -> HubMetrics {
        HubMetrics {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

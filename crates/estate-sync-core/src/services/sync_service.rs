//! Async facade over the sync engine, the event hub and notifications.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServiceConfig;
use crate::context::RequestContext;
use crate::db::{Database, NotificationRepository, SqliteNotificationRepository};
use crate::error::{Error, Result};
use crate::events::{Channel, DomainEvent, EventHub, HubMetrics, RecordEvent};
use crate::models::{
    ChangeCursor, DeviceSyncStatus, FieldRecord, Notification, OrgTarget, RecordId, SyncBatch,
    SyncResponse, VehicleInside,
};
use crate::notify::{dispatch_overstay, dispatch_record_event};
use crate::provision::{ImportSummary, OrgFixture};
use crate::query::{self, RecordQuery};
use crate::review::{review_record, ReviewDecision};
use crate::scope::{Scope, ScopeResolver};
use crate::sync::ReconciliationEngine;
use crate::util::now_millis;

/// Thread-safe entry point for every caller-facing operation.
///
/// Writes are serialized on one connection. Events are published once the
/// writing call has committed; notifications are persisted afterwards on a
/// tracked background task, see [`SyncService::flush`].
#[derive(Clone)]
pub struct SyncService {
    db: Arc<Mutex<Database>>,
    hub: Arc<EventHub>,
    config: ServiceConfig,
    tracker: TaskTracker,
    /// Entry records already announced as overstaying
    alerted: Arc<Mutex<HashSet<RecordId>>>,
}

impl SyncService {
    /// Open the database at `config.db_path`, creating parent directories.
    pub fn open(config: ServiceConfig) -> Result<Self> {
        let path = config
            .db_path
            .clone()
            .ok_or_else(|| Error::InvalidInput("db_path is required".into()))?;
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Opening estate-sync database");
        let db = Database::open(&path)?;
        Ok(Self::with_database(db, config))
    }

    /// In-memory service (primarily for tests).
    pub fn open_in_memory(config: ServiceConfig) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db, config))
    }

    fn with_database(db: Database, config: ServiceConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            hub: Arc::new(EventHub::new(config.subscriber_buffer)),
            config,
            tracker: TaskTracker::new(),
            alerted: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn hub_metrics(&self) -> HubMetrics {
        self.hub.metrics()
    }

    /// Load organization data, actors and assignments.
    pub async fn import_fixture(&self, fixture: &OrgFixture) -> Result<ImportSummary> {
        let db = self.db.lock().await;
        fixture.apply(db.connection())
    }

    /// Reconcile a batch from a device and fan out the resulting events.
    pub async fn sync(&self, ctx: &RequestContext, batch: &SyncBatch) -> Result<SyncResponse> {
        let report = {
            let db = self.db.lock().await;
            ReconciliationEngine::new(db.connection()).sync_records(ctx, batch)?
        };

        for event in &report.events {
            self.hub.publish(DomainEvent::Record(event.clone()));
        }
        if let Some(status) = report.device_status {
            self.hub.publish(DomainEvent::DeviceStatus(status));
        }
        self.spawn_notifications(report.events);

        Ok(report.response)
    }

    /// Approve or reject a pending harvest record.
    pub async fn review(
        &self,
        ctx: &RequestContext,
        id: &RecordId,
        decision: &ReviewDecision,
    ) -> Result<FieldRecord> {
        let (record, event) = {
            let db = self.db.lock().await;
            review_record(db.connection(), ctx, id, decision)?
        };

        self.hub.publish(DomainEvent::Record(event.clone()));
        self.spawn_notifications(vec![event]);
        Ok(record)
    }

    pub async fn list_records(
        &self,
        ctx: &RequestContext,
        query: &RecordQuery,
    ) -> Result<Vec<FieldRecord>> {
        let db = self.db.lock().await;
        query::list_records(db.connection(), ctx, query)
    }

    pub async fn records_since(
        &self,
        ctx: &RequestContext,
        cursor: &ChangeCursor,
        limit: usize,
    ) -> Result<Vec<FieldRecord>> {
        let db = self.db.lock().await;
        query::records_since(db.connection(), ctx, cursor, limit)
    }

    pub async fn device_status(&self, device_id: &str) -> Result<DeviceSyncStatus> {
        let db = self.db.lock().await;
        query::device_sync_status(db.connection(), device_id)
    }

    /// Resolve the caller's scope, optionally narrowed to one node.
    pub async fn resolve_scope(
        &self,
        ctx: &RequestContext,
        target: Option<&OrgTarget>,
    ) -> Result<Scope> {
        let db = self.db.lock().await;
        ctx.authenticate(db.connection())?;
        ScopeResolver::new(db.connection()).resolve(ctx, target)
    }

    /// The caller's notifications, newest first.
    pub async fn notifications_for(
        &self,
        ctx: &RequestContext,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let db = self.db.lock().await;
        ctx.authenticate(db.connection())?;
        SqliteNotificationRepository::new(db.connection()).list_for_recipient(&ctx.actor_id, limit)
    }

    /// Vehicles inside the caller's scope past the overstay threshold.
    pub async fn overstays(&self, ctx: &RequestContext) -> Result<Vec<VehicleInside>> {
        let db = self.db.lock().await;
        query::overstays_for(
            db.connection(),
            ctx,
            self.config.overstay_threshold_ms(),
            now_millis(),
        )
    }

    /// Announce vehicles that crossed the overstay threshold since the last
    /// check.
    pub async fn check_overstays(&self) -> Result<Vec<VehicleInside>> {
        self.check_overstays_at(now_millis()).await
    }

    /// Announce vehicles overstaying as of `now`.
    ///
    /// Each entry record is published on [`Topic::VehicleOverstay`] once while
    /// the vehicle stays inside, and managers over its estate are notified.
    /// Returns the newly announced vehicles.
    ///
    /// [`Topic::VehicleOverstay`]: crate::events::Topic::VehicleOverstay
    pub async fn check_overstays_at(&self, now: i64) -> Result<Vec<VehicleInside>> {
        let current = {
            let db = self.db.lock().await;
            query::overstayed_vehicles(db.connection(), self.config.overstay_threshold_ms(), now)?
        };

        let fresh: Vec<VehicleInside> = {
            let mut alerted = self.alerted.lock().await;
            let still_inside: HashSet<RecordId> =
                current.iter().map(|inside| inside.record_id).collect();
            alerted.retain(|id| still_inside.contains(id));
            current
                .into_iter()
                .filter(|inside| alerted.insert(inside.record_id))
                .collect()
        };

        for inside in &fresh {
            tracing::info!(
                record_id = %inside.record_id,
                plate = %inside.vehicle_plate,
                minutes = inside.duration_minutes,
                "Vehicle overstay detected"
            );
            self.hub.publish(DomainEvent::Overstay(inside.clone()));
        }
        self.spawn_overstay_notifications(fresh.clone());

        Ok(fresh)
    }

    /// Run [`SyncService::check_overstays`] every `period` until `token` is
    /// cancelled.
    pub fn spawn_overstay_monitor(
        &self,
        token: CancellationToken,
        period: Duration,
    ) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            tracing::info!(period_secs = period.as_secs(), "Overstay monitor started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(error) = service.check_overstays().await {
                            tracing::warn!(%error, "Overstay check failed");
                        }
                    }
                }
            }

            tracing::info!("Overstay monitor stopped");
        })
    }

    /// Subscribe to a channel until `token` is cancelled.
    pub fn subscribe(
        &self,
        token: CancellationToken,
        channel: Channel,
    ) -> mpsc::Receiver<DomainEvent> {
        self.hub.subscribe(token, channel)
    }

    /// Wait for every notification task spawned so far.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn spawn_overstay_notifications(&self, vehicles: Vec<VehicleInside>) {
        if !self.config.notifications_enabled || vehicles.is_empty() {
            return;
        }

        let db = Arc::clone(&self.db);
        self.tracker.spawn(async move {
            let db = db.lock().await;
            for inside in &vehicles {
                if let Err(error) = dispatch_overstay(db.connection(), inside) {
                    tracing::warn!(
                        record_id = %inside.record_id,
                        %error,
                        "Overstay notification failed"
                    );
                }
            }
        });
    }

    fn spawn_notifications(&self, events: Vec<RecordEvent>) {
        if !self.config.notifications_enabled || events.is_empty() {
            return;
        }

        let db = Arc::clone(&self.db);
        self.tracker.spawn(async move {
            let db = db.lock().await;
            for event in &events {
                if let Err(error) = dispatch_record_event(db.connection(), event) {
                    tracing::warn!(
                        entity_id = %event.entity_id,
                        topic = event.topic.as_str(),
                        %error,
                        "Notification dispatch failed"
                    );
                }
            }
        });
    }
}

//! Data models for estate-sync

mod actor;
mod gate;
mod notification;
mod org;
mod record;
mod sync_batch;
mod sync_status;

pub use actor::{Actor, Role};
pub use gate::VehicleInside;
pub use notification::{Notification, NotificationDraft, NotificationPriority, NotificationType};
pub use org::{Assignment, NodeKind, OrgPath, OrgRefs, OrgTarget};
pub use record::{
    ChangeCursor, FieldRecord, GateIntent, GuestLogPayload, HarvestPayload, RecordId, RecordKind,
    RecordPayload, RecordStatus,
};
pub use sync_batch::{
    RecordDelta, SyncBatch, SyncErrorKind, SyncOperation, SyncOutcome, SyncResponse,
    SyncSummary,
};
pub use sync_status::{DeviceSyncState, DeviceSyncStatus};

//! Core domain logic for activity-time tracking.
//!
//! This crate contains:
//! - The session ledger: per-user running/paused/idle state, banked time,
//!   pause limits and manual adjustments, persisted through [`RecordStore`]
//! - Hour milestones and the periodic [`MilestoneScanner`] that announces them
//! - Caller-side policy: tiers, time ceilings, credits and status labels
//! - The [`NotificationPort`] seam that delivery adapters implement

pub mod clock;
mod credits;
pub mod format;
pub mod ledger;
pub mod milestone;
pub mod notify;
pub mod policy;
pub mod record;
pub mod scanner;
mod status;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credits::credits;
pub use format::{format_duration, format_duration_human};
pub use ledger::{
    AUTO_CANCEL_PAUSES, LedgerError, MAX_ADJUST_MINUTES, MilestoneHit, PauseOutcome, SessionLedger,
};
pub use milestone::Sweep;
pub use notify::{
    Notification, NotificationEvent, NotificationKind, NotificationPort, NotifyError, deliver,
};
pub use policy::{CeilingPolicy, CeilingReached, StaticTiers, Tier, TierResolver};
pub use record::{ActivityState, SessionEntry, UserRecord};
pub use scanner::{MilestoneScanner, ScannerConfig, SweepReport, TickReport, settle_user};
pub use status::DisplayStatus;
pub use store::{MemoryStore, RecordStore, Snapshot, StoreError};
pub use types::{UserKey, ValidationError};

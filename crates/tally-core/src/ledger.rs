//! The session accounting state machine.
//!
//! # Concurrency
//!
//! Every operation takes one ledger-wide lock, loads the whole record set,
//! applies its change, and saves the whole set back before releasing the
//! lock. Command handlers and the milestone scanner therefore never
//! interleave on the same user (or on any user). At the expected scale of
//! tens of users the extra cross-user latency is negligible.
//!
//! Mutations run through [`RecordStore::update`], so stores shared between
//! processes (a CLI command next to `tally run`) also serialize there.
//!
//! # Failures
//!
//! Attempting an operation from the wrong state is not an error: mutators
//! return `Ok(false)` (or a "nothing happened" outcome). Store failures are
//! returned as [`LedgerError`]; since the change is only committed by a
//! successful save, the durable state is left as it was.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::milestone::{self, HOUR_SECS, MAX_TRACKED_HOURS, Sweep};
use crate::policy::Tier;
use crate::record::{ActivityState, UserRecord};
use crate::store::{RecordStore, Snapshot, StoreError};
use crate::types::UserKey;

/// Number of pauses that cancels a user's tracking outright.
pub const AUTO_CANCEL_PAUSES: u32 = 3;

/// Largest single manual adjustment, in minutes.
pub const MAX_ADJUST_MINUTES: i64 = MAX_TRACKED_HOURS * 60;

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Loading or saving records failed.
    #[error("record store failure: {0}")]
    Store(#[from] StoreError),
    /// The store returned without running the change.
    #[error("record store did not apply the change")]
    NotApplied,
}

/// Result of [`SessionLedger::pause`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseOutcome {
    /// The user had no running session; nothing changed.
    NotRunning,
    /// The session was folded into the bank and the user is paused.
    Paused {
        display_name: String,
        pause_count: u32,
        /// Length of the session that was just paused.
        session: TimeDelta,
        /// Banked total after the fold.
        total: TimeDelta,
    },
    /// The pause reached [`AUTO_CANCEL_PAUSES`] and the record was removed.
    AutoCancelled {
        display_name: String,
        pause_count: u32,
        /// Total that was discarded with the record.
        total: TimeDelta,
    },
}

/// A milestone applied by [`SessionLedger::apply_milestones`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneHit {
    pub key: UserKey,
    pub display_name: String,
    /// Highest threshold reached, in whole hours. This is the one to announce.
    pub hours: i64,
    /// Lower thresholds marked without being announced, in seconds.
    pub backfilled: Vec<i64>,
    pub total: TimeDelta,
    /// Whether a running session was stopped by this milestone.
    pub stopped_session: bool,
    pub at: DateTime<Utc>,
}

/// Owns all session state transitions.
pub struct SessionLedger<S, C = SystemClock> {
    store: S,
    clock: C,
    lock: Mutex<()>,
}

impl<S: RecordStore> SessionLedger<S> {
    /// Creates a ledger on the system clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: RecordStore, C: Clock> SessionLedger<S, C> {
    pub const fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs `f` against a freshly loaded snapshot, saving it afterwards if
    /// `f` reports a change. The store's own lock is held throughout.
    fn transact<T>(
        &self,
        f: impl FnOnce(&mut Snapshot, DateTime<Utc>) -> (T, bool),
    ) -> Result<T, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut f = Some(f);
        let mut value = None;
        self.store.update(&mut |records| {
            let Some(f) = f.take() else {
                return false;
            };
            let (result, changed) = f(records, self.clock.now());
            value = Some(result);
            changed
        })?;
        value.ok_or(LedgerError::NotApplied)
    }

    fn read<T>(&self, f: impl FnOnce(&Snapshot, DateTime<Utc>) -> T) -> Result<T, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let records = self.store.load()?;
        Ok(f(&records, self.clock.now()))
    }

    /// Starts a session, creating the record on first use.
    ///
    /// Returns `false` if the user is already running or paused; a paused
    /// user has to be resumed instead.
    pub fn start(&self, key: UserKey, display_name: &str) -> Result<bool, LedgerError> {
        self.transact(|records, now| {
            let record = records
                .entry(key)
                .or_insert_with(|| UserRecord::new(display_name));
            if record.activity != ActivityState::Idle {
                tracing::debug!(user = %key, "start ignored: session already open");
                return (false, false);
            }
            record.display_name = display_name.to_string();
            record.activity = ActivityState::Running { started_at: now };
            tracing::debug!(user = %key, "session started");
            (true, true)
        })
    }

    /// Stops a running session, banking its time and logging it.
    pub fn stop(&self, key: UserKey) -> Result<bool, LedgerError> {
        self.transact(|records, now| {
            let Some(record) = records.get_mut(&key) else {
                return (false, false);
            };
            let Some(entry) = record.fold(now) else {
                tracing::debug!(user = %key, "stop ignored: not running");
                return (false, false);
            };
            tracing::debug!(user = %key, duration_ms = entry.duration_ms, "session stopped");
            record.sessions.push(entry);
            (true, true)
        })
    }

    /// Pauses a running session.
    ///
    /// The session's time is banked the same way `stop` banks it. The pause
    /// that brings the count to [`AUTO_CANCEL_PAUSES`] removes the record in
    /// the same operation.
    pub fn pause(&self, key: UserKey) -> Result<PauseOutcome, LedgerError> {
        self.transact(|records, now| {
            let Some(record) = records.get_mut(&key) else {
                return (PauseOutcome::NotRunning, false);
            };
            let Some(entry) = record.fold(now) else {
                tracing::debug!(user = %key, "pause ignored: not running");
                return (PauseOutcome::NotRunning, false);
            };
            record.activity = ActivityState::Paused { paused_at: now };
            record.pause_count = record.pause_count.saturating_add(1);

            let display_name = record.display_name.clone();
            let pause_count = record.pause_count;
            let total = record.banked();

            if pause_count >= AUTO_CANCEL_PAUSES {
                records.remove(&key);
                tracing::info!(user = %key, pause_count, "pause limit reached; tracking cancelled");
                return (
                    PauseOutcome::AutoCancelled {
                        display_name,
                        pause_count,
                        total,
                    },
                    true,
                );
            }

            tracing::debug!(user = %key, pause_count, "session paused");
            (
                PauseOutcome::Paused {
                    display_name,
                    pause_count,
                    session: TimeDelta::milliseconds(entry.duration_ms),
                    total,
                },
                true,
            )
        })
    }

    /// Resumes a paused user. Time spent paused is never banked.
    pub fn resume(&self, key: UserKey) -> Result<bool, LedgerError> {
        self.transact(|records, now| {
            let Some(record) = records.get_mut(&key) else {
                return (false, false);
            };
            if !record.activity.is_paused() {
                tracing::debug!(user = %key, "resume ignored: not paused");
                return (false, false);
            }
            record.activity = ActivityState::Running { started_at: now };
            tracing::debug!(user = %key, "session resumed");
            (true, true)
        })
    }

    /// Banked time plus any running session. Zero for unknown users.
    pub fn total_time(&self, key: UserKey) -> Result<TimeDelta, LedgerError> {
        self.read(|records, now| {
            records
                .get(&key)
                .map_or_else(TimeDelta::zero, |record| record.total_at(now))
        })
    }

    /// How long the user has been paused; zero unless paused.
    pub fn paused_duration(&self, key: UserKey) -> Result<TimeDelta, LedgerError> {
        self.read(|records, now| {
            records
                .get(&key)
                .map_or_else(TimeDelta::zero, |record| record.paused_for(now))
        })
    }

    pub fn pause_count(&self, key: UserKey) -> Result<u32, LedgerError> {
        self.read(|records, _| records.get(&key).map_or(0, |record| record.pause_count))
    }

    /// A copy of the user's record, if tracked.
    pub fn user(&self, key: UserKey) -> Result<Option<UserRecord>, LedgerError> {
        self.read(|records, _| records.get(&key).cloned())
    }

    /// A copy of every record.
    pub fn all_users(&self) -> Result<Snapshot, LedgerError> {
        self.read(|records, _| records.clone())
    }

    /// Adds minutes to the bank, creating the record if needed.
    ///
    /// Non-positive amounts are ignored and return `false`. Amounts above
    /// [`MAX_ADJUST_MINUTES`] are clamped.
    pub fn add_minutes(
        &self,
        key: UserKey,
        display_name: &str,
        minutes: i64,
    ) -> Result<bool, LedgerError> {
        if minutes <= 0 {
            return Ok(false);
        }
        let minutes = minutes.min(MAX_ADJUST_MINUTES);
        self.transact(|records, _| {
            let record = records
                .entry(key)
                .or_insert_with(|| UserRecord::new(display_name));
            record.display_name = display_name.to_string();
            record.add_minutes(minutes);
            tracing::debug!(user = %key, minutes, "minutes added");
            (true, true)
        })
    }

    /// Removes minutes from the bank, flooring at zero.
    ///
    /// Returns `false` for unknown users and non-positive amounts.
    pub fn subtract_minutes(&self, key: UserKey, minutes: i64) -> Result<bool, LedgerError> {
        if minutes <= 0 {
            return Ok(false);
        }
        self.transact(|records, _| {
            let Some(record) = records.get_mut(&key) else {
                return (false, false);
            };
            record.subtract_minutes(minutes);
            tracing::debug!(user = %key, minutes, "minutes subtracted");
            (true, true)
        })
    }

    /// Zeroes a user's accounting and milestones, keeping the record.
    pub fn reset(&self, key: UserKey) -> Result<bool, LedgerError> {
        self.transact(|records, _| {
            let Some(record) = records.get_mut(&key) else {
                return (false, false);
            };
            record.reset();
            tracing::debug!(user = %key, "record reset");
            (true, true)
        })
    }

    /// Resets every record. Returns how many were reset.
    pub fn reset_all(&self) -> Result<usize, LedgerError> {
        self.transact(|records, _| {
            for record in records.values_mut() {
                record.reset();
            }
            let count = records.len();
            tracing::debug!(count, "all records reset");
            (count, count > 0)
        })
    }

    /// Removes a user's record entirely. This cannot be undone.
    pub fn cancel(&self, key: UserKey) -> Result<bool, LedgerError> {
        self.transact(|records, _| {
            let removed = records.remove(&key).is_some();
            if removed {
                tracing::debug!(user = %key, "record removed");
            }
            (removed, removed)
        })
    }

    /// Removes every record. Returns how many were removed.
    pub fn clear_all(&self) -> Result<usize, LedgerError> {
        self.transact(|records, _| {
            let count = records.len();
            records.clear();
            tracing::debug!(count, "all records removed");
            (count, true)
        })
    }

    /// Marks and applies any hour milestones the user has reached but not
    /// been told about.
    ///
    /// Every missing threshold is marked notified and the user is brought
    /// to idle (a running session is banked, a pause is closed) before this
    /// returns, so a concurrent scan cannot announce the same milestone
    /// twice. Only the highest missing threshold is reported back for
    /// announcement. Elevated users are additionally flagged as completed.
    ///
    /// A [`Sweep::Live`] pass only considers running sessions that have
    /// lasted at least an hour.
    pub fn apply_milestones(
        &self,
        key: UserKey,
        tier: Tier,
        sweep: Sweep,
    ) -> Result<Option<MilestoneHit>, LedgerError> {
        self.transact(|records, now| {
            let Some(record) = records.get_mut(&key) else {
                return (None, false);
            };
            if sweep == Sweep::Live {
                match record.session_elapsed(now) {
                    Some(elapsed) if elapsed >= TimeDelta::seconds(HOUR_SECS) => {}
                    _ => return (None, false),
                }
            }

            let total = record.total_at(now);
            let mut missing = milestone::missing_thresholds(total, &record.notified_milestones);
            let Some(highest) = missing.pop() else {
                return (None, false);
            };
            record.notified_milestones.extend(missing.iter().copied());
            record.notified_milestones.insert(highest);

            let stopped_session = match record.fold(now) {
                Some(entry) => {
                    record.sessions.push(entry);
                    true
                }
                None => {
                    record.activity = ActivityState::Idle;
                    false
                }
            };
            if tier.is_elevated() {
                record.milestone_completed = true;
            }

            tracing::info!(
                user = %key,
                hours = highest / HOUR_SECS,
                backfilled = missing.len(),
                ?sweep,
                "milestone reached"
            );
            let hit = MilestoneHit {
                key,
                display_name: record.display_name.clone(),
                hours: highest / HOUR_SECS,
                backfilled: missing,
                total,
                stopped_session,
                at: now,
            };
            (Some(hit), true)
        })
    }
}

//! Periodic milestone detection.
//!
//! Every tick runs a live sweep over running sessions; every
//! `catch_up_every` ticks (starting with the first) a catch-up sweep over
//! all users runs before it. All state changes go through
//! [`SessionLedger::apply_milestones`], which marks thresholds before any
//! notification is sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::ledger::{LedgerError, MilestoneHit, SessionLedger};
use crate::milestone::{HOUR_SECS, Sweep};
use crate::notify::{Notification, NotificationPort, deliver};
use crate::policy::{Tier, TierResolver};
use crate::store::RecordStore;
use crate::types::UserKey;

/// Scanner timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub tick_secs: u64,
    pub catch_up_every: u64,
    pub notify_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 5,
            catch_up_every: 12,
            notify_timeout_secs: 10,
        }
    }
}

impl ScannerConfig {
    pub const fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub const fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    /// Whether tick `n` (1-based) runs a catch-up sweep.
    pub const fn is_catch_up_tick(&self, n: u64) -> bool {
        self.catch_up_every <= 1 || n % self.catch_up_every == 1
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub milestones: usize,
    pub undelivered: usize,
    pub failures: usize,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub catch_up: Option<SweepReport>,
    pub live: SweepReport,
}

/// Applies pending milestones for one user and announces the highest.
///
/// The milestone is persisted before the notification goes out; a failed
/// or slow delivery is logged and does not undo it.
pub async fn settle_user<S, C, N>(
    ledger: &SessionLedger<S, C>,
    notifier: &N,
    key: UserKey,
    tier: Tier,
    sweep: Sweep,
    timeout: Duration,
) -> Result<Option<(MilestoneHit, bool)>, LedgerError>
where
    S: RecordStore,
    C: Clock,
    N: NotificationPort,
{
    let Some(hit) = ledger.apply_milestones(key, tier, sweep)? else {
        return Ok(None);
    };
    let delivered = deliver(notifier, &Notification::milestone(&hit), timeout).await;
    Ok(Some((hit, delivered)))
}

struct Inner<S, C, N, T> {
    ledger: Arc<SessionLedger<S, C>>,
    notifier: N,
    tiers: T,
    config: ScannerConfig,
}

impl<S, C, N, T> Inner<S, C, N, T>
where
    S: RecordStore,
    C: Clock,
    N: NotificationPort,
    T: TierResolver,
{
    async fn run_tick(&self, tick: u64) -> TickReport {
        let catch_up = if self.config.is_catch_up_tick(tick) {
            Some(self.sweep(Sweep::CatchUp).await)
        } else {
            None
        };
        let live = self.sweep(Sweep::Live).await;
        TickReport {
            tick,
            catch_up,
            live,
        }
    }

    async fn sweep(&self, sweep: Sweep) -> SweepReport {
        let mut report = SweepReport::default();
        let keys = match self.candidates(sweep) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::error!(?sweep, error = %err, "failed to read records for sweep");
                report.failures += 1;
                return report;
            }
        };

        for key in keys {
            report.checked += 1;
            let tier = self.tiers.tier(&key);
            let result = settle_user(
                &self.ledger,
                &self.notifier,
                key,
                tier,
                sweep,
                self.config.notify_timeout(),
            )
            .await;
            match result {
                Ok(Some((_, delivered))) => {
                    report.milestones += 1;
                    if !delivered {
                        report.undelivered += 1;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(user = %key, ?sweep, error = %err, "skipping user");
                    report.failures += 1;
                }
            }
        }
        report
    }

    /// Users worth checking. The ledger re-checks each one under its lock.
    fn candidates(&self, sweep: Sweep) -> Result<Vec<UserKey>, LedgerError> {
        let records = self.ledger.all_users()?;
        let now = self.ledger.clock().now();
        let hour = TimeDelta::seconds(HOUR_SECS);
        Ok(records
            .into_iter()
            .filter(|(_, record)| match sweep {
                Sweep::CatchUp => true,
                Sweep::Live => record.session_elapsed(now).is_some_and(|e| e >= hour),
            })
            .map(|(key, _)| key)
            .collect())
    }
}

/// The periodic milestone scanner.
pub struct MilestoneScanner<S, C, N, T> {
    inner: Arc<Inner<S, C, N, T>>,
    ticks: AtomicU64,
}

impl<S, C, N, T> MilestoneScanner<S, C, N, T>
where
    S: RecordStore + 'static,
    C: Clock + 'static,
    N: NotificationPort + 'static,
    T: TierResolver + 'static,
{
    pub fn new(
        ledger: Arc<SessionLedger<S, C>>,
        notifier: N,
        tiers: T,
        config: ScannerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                notifier,
                tiers,
                config,
            }),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.inner.config
    }

    /// Runs one tick.
    ///
    /// The tick body runs as its own task, so a panic inside it is logged
    /// and the scanner keeps going. Returns `None` in that case.
    pub async fn tick(&self) -> Option<TickReport> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.run_tick(tick).await }).await {
            Ok(report) => {
                if report.live.milestones > 0
                    || report.catch_up.is_some_and(|c| c.milestones > 0)
                {
                    tracing::debug!(?report, "scanner tick");
                }
                Some(report)
            }
            Err(err) => {
                tracing::error!(tick, error = %err, "scanner tick aborted");
                None
            }
        }
    }

    /// Ticks on the configured interval until `shutdown` turns true or its
    /// sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config().tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            tick_secs = self.config().tick_secs,
            catch_up_every = self.config().catch_up_every,
            "milestone scanner started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("milestone scanner stopped");
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

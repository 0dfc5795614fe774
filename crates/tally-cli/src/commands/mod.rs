//! CLI subcommand implementations.

pub mod adjust;
pub mod run;
pub mod status;
pub mod track;

use std::sync::Arc;

use anyhow::{Context, Result};
use tally_core::{
    Clock, Notification, RecordStore, SessionLedger, StaticTiers, SystemClock, Tier, TierResolver,
    UserKey, deliver,
};
use tally_notify::Notifier;

use crate::Config;

/// The ledger type the CLI works with.
pub type Ledger<C = SystemClock> = SessionLedger<Box<dyn RecordStore>, C>;

/// Everything a command needs.
pub struct App<C = SystemClock> {
    pub ledger: Arc<Ledger<C>>,
    pub notifier: Notifier,
    pub tiers: StaticTiers,
    pub config: Config,
    /// Who is running the command, for notifications.
    pub actor: Option<String>,
}

impl App {
    /// Opens the configured store and notifier.
    pub fn open(config: Config, actor: Option<String>) -> Result<Self> {
        let store = tally_store::open_store(config.store.backend, &config.store.path)
            .with_context(|| format!("failed to open store {}", config.store.path.display()))?;
        Self::with_ledger(SessionLedger::new(store), config, actor)
    }
}

impl<C: Clock> App<C> {
    pub fn with_ledger(ledger: Ledger<C>, config: Config, actor: Option<String>) -> Result<Self> {
        let notifier =
            Notifier::from_config(&config.webhook).context("invalid webhook configuration")?;
        Ok(Self {
            ledger: Arc::new(ledger),
            notifier,
            tiers: config.tiers(),
            config,
            actor,
        })
    }

    pub fn tier(&self, key: UserKey) -> Tier {
        self.tiers.tier(&key)
    }

    /// Sends a notification, tagged with the actor if there is one.
    ///
    /// Delivery problems are logged, never returned.
    pub async fn notify(&self, notification: Notification) {
        let notification = match &self.actor {
            Some(actor) => notification.with_actor(actor.clone()),
            None => notification,
        };
        deliver(&self.notifier, &notification, self.config.scanner.notify_timeout()).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use tally_core::{ManualClock, MemoryStore, RecordStore, SessionLedger};

    use super::App;
    use crate::Config;

    pub fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    /// An app over an in-memory store and a manual clock.
    pub fn app(elevated: &[u64]) -> (App<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(epoch()));
        let store: Box<dyn RecordStore> = Box::new(MemoryStore::new());
        let config = Config {
            elevated_users: elevated.to_vec(),
            ..Config::default()
        };
        let ledger = SessionLedger::with_clock(store, Arc::clone(&clock));
        let app = App::with_ledger(ledger, config, None).unwrap();
        (app, clock)
    }
}

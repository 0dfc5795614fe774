//! Long-running milestone scanner.

use std::future::Future;

use anyhow::{Context, Result};
use tally_core::{Clock, MilestoneScanner};
use tokio::sync::watch;

use super::App;

/// Runs the scanner until `shutdown` resolves, then waits for it to stop.
///
/// An error from `shutdown` still stops the scanner, and is returned.
pub async fn run_until<C, F>(app: App<C>, shutdown: F) -> Result<()>
where
    C: Clock + 'static,
    F: Future<Output = std::io::Result<()>>,
{
    let (tx, rx) = watch::channel(false);
    let scanner = MilestoneScanner::new(app.ledger, app.notifier, app.tiers, app.config.scanner);
    let handle = scanner.spawn(rx);

    let signal = shutdown.await;
    tracing::info!("shutdown requested");
    // the scanner may already be gone if it panicked
    let _ = tx.send(true);
    handle.await.context("milestone scanner task failed")?;
    signal.context("failed to listen for shutdown signal")
}

/// Runs the scanner until Ctrl-C.
pub async fn run<C: Clock + 'static>(app: App<C>) -> Result<()> {
    run_until(app, tokio::signal::ctrl_c()).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tally_core::UserKey;

    use super::*;
    use crate::commands::testing;

    #[tokio::test(start_paused = true)]
    async fn scanner_reconciles_then_stops() {
        let (app, _) = testing::app(&[]);
        let ledger = std::sync::Arc::clone(&app.ledger);
        ledger.add_minutes(UserKey::Known(5), "eve", 125).unwrap();

        run_until(app, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, std::io::Error>(())
        })
        .await
        .unwrap();

        let record = ledger.user(UserKey::Known(5)).unwrap().unwrap();
        assert_eq!(record.notified_milestones.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_failure_stops_the_scanner_and_fails() {
        let (app, _) = testing::app(&[]);
        let failed = async { Err::<(), _>(std::io::Error::other("no signal handler")) };
        let err = run_until(app, failed).await.unwrap_err();
        assert!(err.to_string().contains("shutdown signal"), "{err:#}");
    }
}

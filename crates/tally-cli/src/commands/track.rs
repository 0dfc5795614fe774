//! Session commands: start, stop, pause, resume, cancel.

use std::io::Write;

use anyhow::{Result, bail};
use tally_core::{
    AUTO_CANCEL_PAUSES, Clock, Notification, NotificationEvent, PauseOutcome, format_duration,
};

use super::App;
use crate::cli::UserArgs;

/// Starts a session, subject to the pause and ceiling rules.
pub fn start<C: Clock, W: Write>(app: &App<C>, user: &UserArgs, writer: &mut W) -> Result<()> {
    let key = user.key()?;
    let name = user.display_name();

    if let Some(record) = app.ledger.user(key)? {
        if record.activity.is_paused() {
            bail!("{name} is paused; resume instead of starting a new session");
        }
        if record.activity.is_running() {
            bail!("{name} already has a running session");
        }
    }

    let total = app.ledger.total_time(key)?;
    if let Err(reached) = app.config.ceilings.check(total, app.tier(key)) {
        bail!("cannot start {name}: {reached}");
    }

    if !app.ledger.start(key, &name)? {
        bail!("{name} already has an open session");
    }
    tracing::info!(user = %key, "session started");
    writeln!(writer, "Started {name}.")?;
    Ok(())
}

pub fn stop<C: Clock, W: Write>(app: &App<C>, user: &UserArgs, writer: &mut W) -> Result<()> {
    let key = user.key()?;
    if !app.ledger.stop(key)? {
        bail!("{} has no running session", user.display_name());
    }
    let total = app.ledger.total_time(key)?;
    let name = display_name(app, user)?;
    writeln!(writer, "Stopped {name}. Total: {}.", format_duration(total))?;
    Ok(())
}

pub async fn pause<C: Clock, W: Write>(
    app: &App<C>,
    user: &UserArgs,
    writer: &mut W,
) -> Result<()> {
    let key = user.key()?;
    let now = app.ledger.clock().now();
    match app.ledger.pause(key)? {
        PauseOutcome::NotRunning => bail!("{} has no running session", user.display_name()),
        PauseOutcome::Paused {
            display_name,
            pause_count,
            session,
            total,
        } => {
            writeln!(
                writer,
                "Paused {display_name} after {}. Total: {}. Pause {pause_count} of {}.",
                format_duration(session),
                format_duration(total),
                AUTO_CANCEL_PAUSES - 1
            )?;
            let event = NotificationEvent::PausedNotice {
                session_secs: session.num_seconds(),
                total_secs: total.num_seconds(),
                pause_count,
            };
            app.notify(Notification::new(key, display_name, now, event))
                .await;
        }
        PauseOutcome::AutoCancelled {
            display_name,
            pause_count,
            total,
        } => {
            writeln!(
                writer,
                "{display_name} paused {pause_count} times; tracking cancelled and {} discarded.",
                format_duration(total)
            )?;
            let event = NotificationEvent::AutoCancelled {
                total_secs: total.num_seconds(),
                pause_count,
            };
            app.notify(Notification::new(key, display_name, now, event))
                .await;
        }
    }
    Ok(())
}

pub async fn resume<C: Clock, W: Write>(
    app: &App<C>,
    user: &UserArgs,
    writer: &mut W,
) -> Result<()> {
    let key = user.key()?;
    let paused_for = app.ledger.paused_duration(key)?;
    if !app.ledger.resume(key)? {
        bail!("{} is not paused", user.display_name());
    }
    let total = app.ledger.total_time(key)?;
    let name = display_name(app, user)?;
    writeln!(
        writer,
        "Resumed {name} after {} paused. Total: {}.",
        format_duration(paused_for),
        format_duration(total)
    )?;

    let event = NotificationEvent::ResumedNotice {
        paused_secs: paused_for.num_seconds(),
        total_secs: total.num_seconds(),
    };
    app.notify(Notification::new(key, name, app.ledger.clock().now(), event))
        .await;
    Ok(())
}

pub async fn cancel<C: Clock, W: Write>(
    app: &App<C>,
    user: &UserArgs,
    writer: &mut W,
) -> Result<()> {
    let key = user.key()?;
    let Some(record) = app.ledger.user(key)? else {
        bail!("{} is not tracked", user.display_name());
    };
    let now = app.ledger.clock().now();
    let discarded = record.total_at(now);
    if !app.ledger.cancel(key)? {
        bail!("{} is not tracked", record.display_name);
    }
    writeln!(
        writer,
        "Cancelled {}. Discarded {}.",
        record.display_name,
        format_duration(discarded)
    )?;

    let event = NotificationEvent::CancelledNotice {
        cancelled_secs: discarded.num_seconds(),
    };
    app.notify(Notification::new(key, record.display_name, now, event))
        .await;
    Ok(())
}

/// The stored display name, falling back to the one on the command line.
pub(crate) fn display_name<C: Clock>(app: &App<C>, user: &UserArgs) -> Result<String> {
    let key = user.key()?;
    Ok(app
        .ledger
        .user(key)?
        .map_or_else(|| user.display_name(), |record| record.display_name))
}

//! Manual adjustments: add, subtract, reset, reset-all, clear.

use std::io::Write;

use anyhow::{Result, bail};
use tally_core::{Clock, Sweep, format_duration, settle_user};

use super::App;
use super::track::display_name;
use crate::cli::{AdjustArgs, UserArgs};

/// Adds minutes, then settles any milestone the new total reaches.
pub async fn add<C: Clock, W: Write>(
    app: &App<C>,
    args: &AdjustArgs,
    writer: &mut W,
) -> Result<()> {
    let key = args.user.key()?;
    let name = args.user.display_name();
    if !app.ledger.add_minutes(key, &name, args.minutes)? {
        bail!("minutes must be positive");
    }
    let total = app.ledger.total_time(key)?;
    writeln!(
        writer,
        "Added {} to {name}. Total: {}.",
        minutes(args.minutes),
        format_duration(total)
    )?;

    let settled = settle_user(
        app.ledger.as_ref(),
        &app.notifier,
        key,
        app.tier(key),
        Sweep::CatchUp,
        app.config.scanner.notify_timeout(),
    )
    .await?;
    if let Some((hit, _)) = settled {
        let unit = if hit.hours == 1 { "hour" } else { "hours" };
        writeln!(writer, "{name} reached {} {unit}; session closed.", hit.hours)?;
    }
    Ok(())
}

pub fn subtract<C: Clock, W: Write>(app: &App<C>, args: &AdjustArgs, writer: &mut W) -> Result<()> {
    let key = args.user.key()?;
    if !app.ledger.subtract_minutes(key, args.minutes)? {
        bail!("{} is not tracked", args.user.display_name());
    }
    let total = app.ledger.total_time(key)?;
    let name = display_name(app, &args.user)?;
    writeln!(
        writer,
        "Removed {} from {name}. Total: {}.",
        minutes(args.minutes),
        format_duration(total)
    )?;
    Ok(())
}

pub fn reset<C: Clock, W: Write>(app: &App<C>, user: &UserArgs, writer: &mut W) -> Result<()> {
    let key = user.key()?;
    if !app.ledger.reset(key)? {
        bail!("{} is not tracked", user.display_name());
    }
    writeln!(writer, "Reset {}.", display_name(app, user)?)?;
    Ok(())
}

pub fn reset_all<C: Clock, W: Write>(app: &App<C>, writer: &mut W) -> Result<()> {
    let count = app.ledger.reset_all()?;
    writeln!(writer, "Reset {count} {}.", users(count))?;
    Ok(())
}

pub fn clear<C: Clock, W: Write>(app: &App<C>, yes: bool, writer: &mut W) -> Result<()> {
    if !yes {
        bail!("refusing to remove every record without --yes");
    }
    let count = app.ledger.clear_all()?;
    tracing::info!(count, "all records cleared");
    writeln!(writer, "Removed {count} {}.", users(count))?;
    Ok(())
}

fn minutes(count: i64) -> String {
    if count == 1 {
        "1 minute".to_string()
    } else {
        format!("{count} minutes")
    }
}

const fn users(count: usize) -> &'static str {
    if count == 1 { "user" } else { "users" }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use tally_core::ActivityState;

    use super::*;
    use crate::commands::testing;
    use crate::commands::track;

    fn args(id: u64, minutes: i64) -> AdjustArgs {
        AdjustArgs {
            user: UserArgs {
                id: Some(id),
                external: None,
                name: Some("bob".to_string()),
            },
            minutes,
        }
    }

    #[tokio::test]
    async fn add_settles_reached_milestones() {
        let (app, clock) = testing::app(&[]);
        let bob = args(2, 30);
        track::start(&app, &bob.user, &mut Vec::new()).unwrap();
        clock.advance(TimeDelta::minutes(40));

        let mut out = Vec::new();
        add(&app, &bob, &mut out).await.unwrap();

        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        Added 30 minutes to bob. Total: 1 hour, 10 minutes.
        bob reached 1 hour; session closed.
        ");
        let record = app.ledger.user(bob.user.key().unwrap()).unwrap().unwrap();
        assert_eq!(record.activity, ActivityState::Idle);
        assert!(record.notified_milestones.contains(&3600));
        assert_eq!(record.banked(), TimeDelta::minutes(70));
    }

    #[tokio::test]
    async fn add_below_an_hour_only_banks() {
        let (app, _) = testing::app(&[]);
        let mut out = Vec::new();
        add(&app, &args(2, 1), &mut out).await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Added 1 minute to bob. Total: 1 minute.\n"
        );
    }

    #[tokio::test]
    async fn subtract_floors_at_zero() {
        let (app, _) = testing::app(&[]);
        add(&app, &args(2, 10), &mut Vec::new()).await.unwrap();

        let mut out = Vec::new();
        subtract(&app, &args(2, 25), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Removed 25 minutes from bob. Total: 0 seconds.\n"
        );
        assert!(subtract(&app, &args(3, 5), &mut Vec::new()).is_err());
    }

    #[tokio::test]
    async fn reset_and_clear() {
        let (app, _) = testing::app(&[]);
        add(&app, &args(2, 10), &mut Vec::new()).await.unwrap();
        add(&app, &args(3, 10), &mut Vec::new()).await.unwrap();

        let mut out = Vec::new();
        reset(&app, &args(2, 1).user, &mut out).unwrap();
        reset_all(&app, &mut out).unwrap();
        assert!(clear(&app, false, &mut out).is_err());
        clear(&app, true, &mut out).unwrap();

        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        Reset bob.
        Reset 2 users.
        Removed 2 users.
        ");
        assert!(app.ledger.all_users().unwrap().is_empty());
    }
}

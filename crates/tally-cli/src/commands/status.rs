//! Read-only views: one user, or everyone.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tally_core::{
    Clock, DisplayStatus, Snapshot, TierResolver, UserKey, UserRecord, credits, format_duration,
    milestone::HOUR_SECS,
};

use super::App;
use crate::cli::UserArgs;

/// One row of the status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub user: UserKey,
    pub display_name: String,
    pub status: DisplayStatus,
    pub total_secs: i64,
    pub pause_count: u32,
    pub credits: u32,
}

/// Builds listing rows, longest total first.
pub fn rows<T: TierResolver>(records: &Snapshot, tiers: &T, now: DateTime<Utc>) -> Vec<StatusRow> {
    let mut rows: Vec<StatusRow> = records
        .iter()
        .map(|(key, record)| {
            let tier = tiers.tier(key);
            let total = record.total_at(now);
            StatusRow {
                user: *key,
                display_name: record.display_name.clone(),
                status: DisplayStatus::of(record, tier, now),
                total_secs: total.num_seconds(),
                pause_count: record.pause_count,
                credits: credits(total, tier),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_secs
            .cmp(&a.total_secs)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    rows
}

pub fn list<C: Clock, W: Write>(app: &App<C>, json: bool, writer: &mut W) -> Result<()> {
    let records = app.ledger.all_users()?;
    let rows = rows(&records, &app.tiers, app.ledger.clock().now());
    if json {
        serde_json::to_writer_pretty(&mut *writer, &rows)?;
        writeln!(writer)?;
    } else {
        render_rows(writer, &rows)?;
    }
    Ok(())
}

pub fn render_rows<W: Write>(writer: &mut W, rows: &[StatusRow]) -> Result<()> {
    if rows.is_empty() {
        writeln!(writer, "No users tracked.")?;
        return Ok(());
    }
    for row in rows {
        writeln!(
            writer,
            "{:<20} {:<9} {:<32} {} credits",
            row.display_name,
            row.status.as_str(),
            format_duration(TimeDelta::seconds(row.total_secs)),
            row.credits
        )?;
    }
    Ok(())
}

pub fn show<C: Clock, W: Write>(app: &App<C>, user: &UserArgs, writer: &mut W) -> Result<()> {
    let key = user.key()?;
    let Some(record) = app.ledger.user(key)? else {
        bail!("{} is not tracked", user.display_name());
    };
    render_user(writer, key, &record, &app.tiers, app.ledger.clock().now())
}

pub fn render_user<T: TierResolver, W: Write>(
    writer: &mut W,
    key: UserKey,
    record: &UserRecord,
    tiers: &T,
    now: DateTime<Utc>,
) -> Result<()> {
    let tier = tiers.tier(&key);
    let total = record.total_at(now);

    writeln!(writer, "{} ({key})", record.display_name)?;
    writeln!(writer, "Status:     {}", DisplayStatus::of(record, tier, now))?;
    writeln!(writer, "Total:      {}", format_duration(total))?;
    if let Some(elapsed) = record.session_elapsed(now) {
        writeln!(writer, "Session:    {}", format_duration(elapsed))?;
    }
    if record.activity.is_paused() {
        writeln!(writer, "Paused for: {}", format_duration(record.paused_for(now)))?;
    }
    writeln!(writer, "Pauses:     {}", record.pause_count)?;
    let milestones: Vec<String> = record
        .notified_milestones
        .iter()
        .map(|secs| format!("{}h", secs / HOUR_SECS))
        .collect();
    if milestones.is_empty() {
        writeln!(writer, "Milestones: none")?;
    } else {
        writeln!(writer, "Milestones: {}", milestones.join(", "))?;
    }
    writeln!(writer, "Credits:    {}", credits(total, tier))?;
    Ok(())
}

//! Command-line argument definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tally_core::{MAX_ADJUST_MINUTES, UserKey};

/// Activity time tally.
///
/// Tracks running, paused and banked time per user and announces every
/// whole hour reached.
#[derive(Debug, Parser)]
#[command(name = "tally", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Who is running the command, shown in notifications.
    #[arg(long, global = true, value_name = "NAME")]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Identifies the user a command applies to.
#[derive(Debug, Clone, Args)]
pub struct UserArgs {
    /// Platform user id.
    #[arg(required_unless_present = "external", conflicts_with = "external")]
    pub id: Option<u64>,

    /// Track someone without a platform account, by name.
    #[arg(long, value_name = "NAME")]
    pub external: Option<String>,

    /// Display name. Defaults to the external name or the id.
    #[arg(long)]
    pub name: Option<String>,
}

impl UserArgs {
    pub fn key(&self) -> Result<UserKey> {
        match (self.id, &self.external) {
            (Some(id), _) => Ok(UserKey::Known(id)),
            (None, Some(name)) => {
                UserKey::external_from_name(name).context("invalid external user name")
            }
            (None, None) => anyhow::bail!("a user id or --external name is required"),
        }
    }

    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match (self.id, &self.external) {
            (_, Some(name)) => name.trim().to_string(),
            (Some(id), None) => id.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// A positive number of minutes, at most [`MAX_ADJUST_MINUTES`].
#[derive(Debug, Clone, Args)]
pub struct AdjustArgs {
    #[command(flatten)]
    pub user: UserArgs,

    /// Minutes to adjust by.
    #[arg(long, short, value_parser = clap::value_parser!(i64).range(1..=MAX_ADJUST_MINUTES))]
    pub minutes: i64,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a session.
    Start(UserArgs),

    /// Stop the running session and bank its time.
    Stop(UserArgs),

    /// Pause the running session. The third pause cancels tracking.
    Pause(UserArgs),

    /// Resume a paused session.
    Resume(UserArgs),

    /// Add minutes to a user's banked time.
    Add(AdjustArgs),

    /// Remove minutes from a user's banked time.
    Subtract(AdjustArgs),

    /// Zero a user's time, pauses and milestones.
    Reset(UserArgs),

    /// Reset every user.
    ResetAll,

    /// Stop tracking a user and discard their record.
    Cancel(UserArgs),

    /// Discard every record.
    Clear {
        /// Confirm removal of all records.
        #[arg(long)]
        yes: bool,
    },

    /// Show one user's record.
    Show(UserArgs),

    /// List every tracked user.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the milestone scanner until interrupted.
    Run,
}

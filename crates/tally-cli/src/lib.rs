//! Activity tally CLI library.
//!
//! This crate provides the command-line interface: configuration, the
//! session and adjustment commands, and the long-running scanner.

mod cli;
pub mod commands;
mod config;

pub use cli::{AdjustArgs, Cli, Commands, UserArgs};
pub use config::{Config, StoreConfig};

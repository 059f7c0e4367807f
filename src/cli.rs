//! Command-line surface
//!
//! `training-ledger` with no subcommand runs an incremental sync.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::sync::DEFAULT_LOOKBACK_DAYS;

#[derive(Parser, Debug)]
#[command(name = "training-ledger")]
#[command(about = "Reconcile Garmin and Strava activities and compute training metrics")]
#[command(version)]
pub struct Cli {
  /// Data directory holding the canonical store and raw caches
  /// (overrides TRAINER_DATA_DIR)
  #[arg(long, global = true, value_name = "DIR")]
  pub data_dir: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Fetch recent activities, merge them into the store, then enrich
  Sync {
    /// Lookback window in days
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
    days: u32,

    /// Run everything but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Recompute metrics for every run
    #[arg(long)]
    force: bool,

    /// Skip the enrichment pass
    #[arg(long)]
    skip_enrich: bool,
  },

  /// Recompute run and week metrics from the canonical store
  Enrich {
    /// Only recompute runs from the last N days (plus any never enriched)
    #[arg(long)]
    days: Option<u32>,

    /// Recompute every run
    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
  },

  /// Print the weekly consistency report
  Weekly {
    /// Restrict to one ISO year
    #[arg(long)]
    year: Option<i32>,
  },

  /// Rebuild the canonical store from the raw caches (destructive)
  Rebuild {
    /// Must be DISCARD-ENRICHMENTS
    #[arg(long, value_name = "TOKEN")]
    confirm: Option<String>,

    #[arg(long)]
    dry_run: bool,
  },
}

impl Cli {
  /// The subcommand to run; a bare invocation is a default sync
  pub fn command(&self) -> Command {
    self.command.clone().unwrap_or(Command::Sync {
      days: DEFAULT_LOOKBACK_DAYS,
      dry_run: false,
      force: false,
      skip_enrich: false,
    })
  }
}

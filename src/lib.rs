mod cli;
pub mod commands;
pub mod config;
pub mod insights;
pub mod metrics;
pub mod models;
pub mod plan;
pub mod reconcile;
pub mod sources;
pub mod store;
pub mod weekly;

#[cfg(test)]
mod test_utils;

use clap::Parser;
use std::process::ExitCode;

use cli::{Cli, Command};
use commands::enrich::run_enrich;
use commands::rebuild::run_rebuild;
use commands::sync::{run_sync, SyncOptions};
use commands::weekly::run_weekly;
use commands::{SyncContext, SyncError};
use config::AppConfig;
use insights::EnrichOptions;

pub fn run() -> ExitCode {
  // Load environment variables from .env file
  dotenvy::dotenv().ok();

  let cli = Cli::parse();
  match execute(&cli) {
    Ok(report) => {
      println!("{}", report);
      ExitCode::SUCCESS
    }
    Err(e) => {
      log::error!("{}", e);
      eprintln!("Error: {}", e);
      ExitCode::FAILURE
    }
  }
}

fn execute(cli: &Cli) -> Result<String, SyncError> {
  let mut config = AppConfig::from_env()?;
  if let Some(dir) = &cli.data_dir {
    config = config.with_data_dir(dir);
  }
  let ctx = SyncContext::new(config, chrono::Local::now().naive_local())?;
  log::debug!("[CONFIG] Data directory: {}", ctx.paths().data_dir.display());

  match cli.command() {
    Command::Sync {
      days,
      dry_run,
      force,
      skip_enrich,
    } => {
      let options = SyncOptions {
        days,
        dry_run,
        force,
        skip_enrich,
      };
      let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SyncError::Runtime(e.to_string()))?;
      let summary = runtime.block_on(run_sync(&ctx, options))?;
      Ok(summary.to_string())
    }
    Command::Enrich { days, force, dry_run } => {
      let report = run_enrich(&ctx, EnrichOptions { days, force }, dry_run)?;
      Ok(format!(
        "Enriched {} runs, {} weeks (streak {} weeks){}",
        report.runs,
        report.weeks,
        report.streak_weeks,
        if dry_run { " [dry run, nothing written]" } else { "" }
      ))
    }
    Command::Weekly { year } => Ok(run_weekly(&ctx, year)?.to_string()),
    Command::Rebuild { confirm, dry_run } => {
      Ok(run_rebuild(&ctx, confirm.as_deref(), dry_run)?.to_string())
    }
  }
}

//! `reconcile` binary.
//!
//! Reads `reconcile.toml` (or the path specified with `--config`), opens the
//! SQLite store and runs one subcommand. Results are printed as JSON on
//! stdout; logs go to stderr.
//!
//! ```text
//! reconcile run --label "2024-05 load" --staging batch.json
//! reconcile compare 3 4
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use scd_core::{
  session::{Fingerprint, StagingRow},
  store::SessionStore,
};
use scd_reconcile::{ReconcileConfig, compare::compare_versions, reconcile};
use scd_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Event session SCD2 reconciler")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "reconcile.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Reconcile the staging table under a new schedule version.
  Run {
    #[arg(short, long)]
    label:   String,
    /// JSON array of staging rows that replaces the staging table first.
    #[arg(short, long)]
    staging: Option<PathBuf>,
  },
  /// Show what changed between two schedule versions.
  Compare { from: i64, to: i64 },
  /// List schedule versions.
  Versions,
  /// Show the audit log written by one run.
  Audit { version: i64 },
  /// Show every physical record of one lineage.
  Lineage { fingerprint: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("SCD"))
    .build()
    .context("failed to read config file")?;

  let cfg: ReconcileConfig = settings
    .try_deserialize()
    .context("failed to deserialise ReconcileConfig")?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Run { label, staging } => {
      if let Some(path) = staging {
        let raw = std::fs::read_to_string(&path)
          .with_context(|| format!("failed to read {path:?}"))?;
        let rows: Vec<StagingRow> = serde_json::from_str(&raw)
          .with_context(|| format!("failed to parse staging rows in {path:?}"))?;
        let loaded = store.replace_staging(rows).await.context("failed to load staging")?;
        tracing::info!(rows = loaded, "staging table replaced");
      }

      let report = reconcile(&store, &label).await.context("reconciliation failed")?;
      print_json(&report)?;

      if cfg.strict && !report.is_clean() {
        anyhow::bail!(
          "{} rejected and {} failed rows in schedule version {}",
          report.rejected.len(),
          report.failed.len(),
          report.version.version_id
        );
      }
    }
    Command::Compare { from, to } => {
      let changes = compare_versions(&store, from, to).await?;
      print_json(&changes)?;
    }
    Command::Versions => {
      let versions = store.list_schedule_versions().await?;
      print_json(&versions)?;
    }
    Command::Audit { version } => {
      let entries = store.audit_entries(version).await?;
      print_json(&entries)?;
    }
    Command::Lineage { fingerprint } => {
      let records = store.lineage(&Fingerprint::new(fingerprint)).await?;
      print_json(&records)?;
    }
  }

  Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

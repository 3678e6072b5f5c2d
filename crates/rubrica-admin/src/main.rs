//! `rubrica`: operator tool for the Rubrica evaluation store.
//!
//! Reads `rubrica.toml` (or the path given with `--config`), opens the SQLite
//! store and runs one administrative command.
//!
//! ```
//! rubrica init
//! rubrica sync --json
//! rubrica add-user --username ana --role curador < password.txt
//! ```

mod settings;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::{Parser, Subcommand};
use rand_core::OsRng;
use rubrica_core::{
  principal::Role, roster::Group, sync::RunSummary, validate::ObservationPolicy,
};
use rubrica_store_sqlite::{Error as StoreError, SqliteStore};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{AdminConfig, load_definition};

#[derive(Parser)]
#[command(author, version, about = "Rubrica taxonomy and evaluation administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rubrica.toml")]
  config: PathBuf,

  /// Taxonomy definition file; overrides `definition_path` from the config.
  #[arg(short, long, value_name = "FILE")]
  definition: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the schema and, on an empty store, insert the definition.
  Init,
  /// Reconcile the store with the definition, then verify integrity.
  Sync {
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
  },
  /// Check referential integrity without changing anything.
  Verify,
  /// Create a user; the password is read from stdin.
  AddUser {
    #[arg(long)]
    username: String,
    /// `curador` or `comite`.
    #[arg(long)]
    role:     Role,
  },
  /// Upsert groups from a JSON array.
  ImportGroups { file: PathBuf },
  /// Attach a ficha to a group.
  AssignFicha { group: String, ficha: String },
  /// Remove every evaluation one curator recorded for one group.
  DeleteEvaluations {
    #[arg(long)]
    group:   String,
    #[arg(long)]
    curator: String,
  },
  /// Print recent audit entries.
  Logs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = AdminConfig::load(&cli.config)?;
  let definition_path = cli.definition.unwrap_or_else(|| cfg.definition_path.clone());

  let store = SqliteStore::open(&cfg.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.database_path))?
    .with_observation_policy(ObservationPolicy::with_min_chars(cfg.min_observation_chars));

  match cli.command {
    Command::Init => {
      let definition = load_definition(&definition_path)?;
      match store.initialize(&definition).await? {
        Some(summary) => print_summary(&summary),
        None => println!("taxonomy already present; run `rubrica sync` to reconcile"),
      }
    }

    Command::Sync { json } => {
      let definition = load_definition(&definition_path)?;
      match store.run(&definition).await {
        Ok(report) if json => println!("{}", serde_json::to_string_pretty(&report)?),
        Ok(report) => {
          print_summary(&report.summary);
          println!("integrity: {}", report.integrity);
        }
        Err(StoreError::IntegrityViolation(report)) => {
          if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
          } else {
            print_summary(&report.summary);
          }
          bail!("integrity violation: {}", report.integrity);
        }
        Err(e) => return Err(e).context("synchronization failed"),
      }
    }

    Command::Verify => {
      let report = store.verify_integrity().await?;
      println!("{report}");
      for id in &report.orphaned_evaluations {
        println!("  evaluation {id}: aspect missing");
      }
      for id in &report.orphaned_ficha_dimensions {
        println!("  ficha link {id}: ficha or dimension missing");
      }
      for code in &report.orphaned_group_fichas {
        println!("  group {code}: assigned ficha missing");
      }
      if !report.is_clean() {
        bail!("integrity check failed");
      }
    }

    Command::AddUser { username, role } => {
      let password = read_password()?;
      if password.is_empty() {
        bail!("empty password");
      }
      let salt = SaltString::generate(&mut OsRng);
      let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
        .to_string();
      let user_id = store
        .create_user(&username, &hash, role)
        .await
        .with_context(|| format!("failed to create user {username:?}"))?;
      println!("created {role} {username} (id {user_id})");
    }

    Command::ImportGroups { file } => {
      let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("reading roster {}", file.display()))?;
      let groups: Vec<Group> = serde_json::from_str(&raw).context("parsing roster JSON")?;
      let written = store.register_groups(&groups).await?;
      println!("{written} group(s) written");
    }

    Command::AssignFicha { group, ficha } => {
      store.assign_ficha(&group, &ficha).await?;
      println!("group {group} now uses ficha {ficha}");
    }

    Command::DeleteEvaluations { group, curator } => {
      let principal = store
        .principal(&curator)
        .await?
        .with_context(|| format!("no active user {curator:?}"))?;
      let deleted = store
        .delete_evaluations("rubrica-admin", principal.user_id, &group)
        .await?;
      println!("{deleted} evaluation(s) deleted");
    }

    Command::Logs { limit } => {
      for entry in store.recent_logs(limit).await? {
        println!(
          "{} {:<20} {:<14} {}",
          entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
          entry.action,
          entry.actor.as_deref().unwrap_or("-"),
          entry.detail.as_deref().unwrap_or("")
        );
      }
    }
  }

  Ok(())
}

fn print_summary(summary: &RunSummary) {
  println!("run {} (definition {})", summary.run_id, summary.fingerprint);
  println!("  dimensions:       {}", summary.dimensions);
  println!("  aspects:          {}", summary.aspects);
  println!("  fichas:           {}", summary.fichas);
  println!("  ficha dimensions: {}", summary.ficha_dimensions);
  for warning in &summary.warnings {
    println!("  warning: {warning}");
  }
}

/// Read a password from the first line of stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  eprint!("Password: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}

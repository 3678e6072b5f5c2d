//! Operator configuration and taxonomy definition loading.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rubrica_core::{taxonomy::TaxonomyDefinition, validate::MIN_OBSERVATION_CHARS};
use serde::Deserialize;

/// Settings read from `rubrica.toml` and `RUBRICA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdminConfig {
  #[serde(default = "default_database_path")]
  pub database_path:         PathBuf,
  #[serde(default = "default_definition_path")]
  pub definition_path:       PathBuf,
  #[serde(default = "default_min_observation_chars")]
  pub min_observation_chars: usize,
}

fn default_database_path() -> PathBuf { PathBuf::from("rubrica.db") }

fn default_definition_path() -> PathBuf { PathBuf::from("taxonomy.toml") }

fn default_min_observation_chars() -> usize { MIN_OBSERVATION_CHARS }

impl AdminConfig {
  /// Layer the optional file at `path` under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("RUBRICA"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise AdminConfig")?;
    cfg.database_path = expand_tilde(&cfg.database_path);
    cfg.definition_path = expand_tilde(&cfg.definition_path);
    if cfg.min_observation_chars < MIN_OBSERVATION_CHARS {
      tracing::warn!(
        configured = cfg.min_observation_chars,
        floor = MIN_OBSERVATION_CHARS,
        "min_observation_chars is below the storage floor; using the floor"
      );
      cfg.min_observation_chars = MIN_OBSERVATION_CHARS;
    }
    Ok(cfg)
  }
}

/// Read and parse a TOML taxonomy definition.
pub fn load_definition(path: &Path) -> anyhow::Result<TaxonomyDefinition> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading taxonomy definition {}", path.display()))?;
  parse_definition(&raw).with_context(|| format!("parsing taxonomy definition {}", path.display()))
}

fn parse_definition(raw: &str) -> anyhow::Result<TaxonomyDefinition> {
  let definition: TaxonomyDefinition = toml::from_str(raw)?;
  definition.validate()?;
  Ok(definition)
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

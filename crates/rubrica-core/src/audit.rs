//! Append-only audit trail (`logs_sistema`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor recorded for entries written by taxonomy synchronization.
pub const SYNC_ACTOR: &str = "rubrica-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
  EvaluationCreated,
  EvaluationPassCreated,
  EvaluationsDeleted,
  AspectDeleted,
  FichaLinkDeleted,
  TaxonomySynced,
}

impl LogAction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::EvaluationCreated => "EVALUATION_CREATED",
      Self::EvaluationPassCreated => "EVALUATION_PASS_CREATED",
      Self::EvaluationsDeleted => "EVALUATIONS_DELETED",
      Self::AspectDeleted => "ASPECT_DELETED",
      Self::FichaLinkDeleted => "FICHA_LINK_DELETED",
      Self::TaxonomySynced => "TAXONOMY_SYNCED",
    }
  }
}

impl fmt::Display for LogAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A stored audit entry. `action` is kept as text so entries written by older
/// tooling still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
  pub log_id:      i64,
  pub actor:       Option<String>,
  pub action:      String,
  pub detail:      Option<String>,
  pub recorded_at: DateTime<Utc>,
}

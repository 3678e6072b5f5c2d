//! Synchronization outcomes: run summaries, warnings and integrity reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Counts ──────────────────────────────────────────────────────────────────

/// What happened to the rows of one entity kind during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
  pub created:   usize,
  pub updated:   usize,
  pub unchanged: usize,
  /// Persisted, absent from the definition, and kept.
  pub retained:  usize,
  pub deleted:   usize,
}

impl EntityCounts {
  pub fn mutations(&self) -> usize { self.created + self.updated + self.deleted }
}

impl fmt::Display for EntityCounts {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} created, {} updated, {} unchanged, {} retained, {} deleted",
      self.created, self.updated, self.unchanged, self.retained, self.deleted
    )
  }
}

// ─── Warnings ────────────────────────────────────────────────────────────────

/// A discrepancy the run reported instead of resolving. None of these fail
/// the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
  /// Dropped from the definition but still scored by curators.
  AspectRetained {
    dimension_code: String,
    aspect_id:      i64,
    aspect:         String,
    evaluations:    u64,
  },
  /// Persisted dimension with no entry in the definition.
  DimensionNotDeclared { code: String },
  /// Persisted ficha with no entry in the definition. Fichas are never
  /// deleted by synchronization.
  FichaNotDeclared { code: String },
  /// The ficha/dimension mapping names a ficha that does not exist.
  UnknownFicha { ficha_code: String },
  /// The ficha/dimension mapping names a dimension that does not exist.
  UnknownDimension { ficha_code: String, dimension_code: String },
}

impl fmt::Display for SyncWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::AspectRetained { dimension_code, aspect, evaluations, .. } => write!(
        f,
        "aspect {aspect:?} of {dimension_code} kept because {evaluations} evaluation(s) reference it"
      ),
      Self::DimensionNotDeclared { code } => {
        write!(f, "dimension {code} is not in the definition and was kept")
      }
      Self::FichaNotDeclared { code } => {
        write!(f, "ficha {code} is not in the definition and was kept")
      }
      Self::UnknownFicha { ficha_code } => {
        write!(f, "ficha {ficha_code} not found; its dimension list was skipped")
      }
      Self::UnknownDimension { ficha_code, dimension_code } => write!(
        f,
        "dimension {dimension_code} listed on ficha {ficha_code} not found; link skipped"
      ),
    }
  }
}

// ─── Run summary ─────────────────────────────────────────────────────────────

/// Structured outcome of one synchronization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  pub run_id:           Uuid,
  /// Fingerprint of the definition the run converged to.
  pub fingerprint:      String,
  pub started_at:       DateTime<Utc>,
  pub finished_at:      Option<DateTime<Utc>>,
  pub dimensions:       EntityCounts,
  pub aspects:          EntityCounts,
  pub fichas:           EntityCounts,
  pub ficha_dimensions: EntityCounts,
  pub warnings:         Vec<SyncWarning>,
}

impl RunSummary {
  pub fn new(fingerprint: String) -> Self {
    Self {
      run_id: Uuid::new_v4(),
      fingerprint,
      started_at: Utc::now(),
      finished_at: None,
      dimensions: EntityCounts::default(),
      aspects: EntityCounts::default(),
      fichas: EntityCounts::default(),
      ficha_dimensions: EntityCounts::default(),
      warnings: vec![],
    }
  }

  pub fn finish(&mut self) { self.finished_at = Some(Utc::now()); }

  /// Total inserts, updates and deletes across all levels. Zero means the
  /// store already matched the definition.
  pub fn mutations(&self) -> usize {
    self.dimensions.mutations()
      + self.aspects.mutations()
      + self.fichas.mutations()
      + self.ficha_dimensions.mutations()
  }

  pub fn retained_aspects(&self) -> impl Iterator<Item = &SyncWarning> {
    self
      .warnings
      .iter()
      .filter(|w| matches!(w, SyncWarning::AspectRetained { .. }))
  }

  /// One-line form used for the audit entry.
  pub fn headline(&self) -> String {
    let short: String = self.fingerprint.chars().take(12).collect();
    format!(
      "run {} ({short}): dimensions [{}]; aspects [{}]; fichas [{}]; ficha links [{}]; {} warning(s)",
      self.run_id,
      self.dimensions,
      self.aspects,
      self.fichas,
      self.ficha_dimensions,
      self.warnings.len()
    )
  }
}

// ─── Integrity ───────────────────────────────────────────────────────────────

/// Result of the post-commit integrity pass. Every list must be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
  /// Evaluations whose aspect no longer exists.
  pub orphaned_evaluations:      Vec<i64>,
  /// Ficha/dimension links whose ficha or dimension no longer exists.
  pub orphaned_ficha_dimensions: Vec<i64>,
  /// Groups whose assigned ficha no longer exists.
  pub orphaned_group_fichas:     Vec<String>,
}

impl IntegrityReport {
  pub fn is_clean(&self) -> bool {
    self.orphaned_evaluations.is_empty()
      && self.orphaned_ficha_dimensions.is_empty()
      && self.orphaned_group_fichas.is_empty()
  }
}

impl fmt::Display for IntegrityReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} orphaned evaluation(s), {} orphaned ficha link(s), {} group(s) with a missing ficha",
      self.orphaned_evaluations.len(),
      self.orphaned_ficha_dimensions.len(),
      self.orphaned_group_fichas.len()
    )
  }
}

/// A committed run together with its integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
  pub summary:   RunSummary,
  pub integrity: IntegrityReport,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mutations_ignore_unchanged_and_retained() {
    let mut s = RunSummary::new("ab".repeat(32));
    s.aspects.unchanged = 4;
    s.aspects.retained = 1;
    assert_eq!(s.mutations(), 0);

    s.aspects.deleted = 1;
    s.fichas.created = 2;
    assert_eq!(s.mutations(), 3);
  }

  #[test]
  fn retained_aspects_filters_warnings() {
    let mut s = RunSummary::new(String::new());
    s.warnings.push(SyncWarning::FichaNotDeclared { code: "OLD".into() });
    s.warnings.push(SyncWarning::AspectRetained {
      dimension_code: "DIM1".into(),
      aspect_id:      3,
      aspect:         "A".into(),
      evaluations:    4,
    });
    assert_eq!(s.retained_aspects().count(), 1);
    assert!(s.headline().contains("2 warning(s)"));
  }

  #[test]
  fn headline_shortens_fingerprint_by_characters() {
    let s = RunSummary::new("0123456789abcdef".into());
    assert!(s.headline().contains("(0123456789ab)"));

    // Two-byte characters straddle byte offset 12.
    let s = RunSummary::new("ñ".repeat(20));
    assert!(s.headline().contains(&format!("({})", "ñ".repeat(12))));

    let s = RunSummary::new("abc".into());
    assert!(s.headline().contains("(abc)"));
  }

  #[test]
  fn warnings_serialize_tagged() {
    let w = SyncWarning::UnknownFicha { ficha_code: "X".into() };
    let json = serde_json::to_value(&w).unwrap();
    assert_eq!(json["kind"], "unknown_ficha");
    assert_eq!(json["ficha_code"], "X");
  }
}

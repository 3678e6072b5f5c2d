//! Evaluation types: one curator's score for one aspect of one group.
//!
//! Evaluations are written once and never updated. A curator gets at most
//! one evaluation per `(user, group, aspect)` triple; the store enforces this
//! with a UNIQUE constraint.
//!
//! A curator normally submits a whole [`NewEvaluationPass`]: one score for
//! every aspect of the group's rubric, written together or not at all.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  validate::{ObservationPolicy, normalize_group_code},
};

// ─── Score ───────────────────────────────────────────────────────────────────

/// The three-level result recorded for an aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Score {
  NotMet  = 0,
  Partial = 1,
  Met     = 2,
}

impl Score {
  pub fn code(self) -> i64 { self as i64 }

  pub fn from_code(code: i64) -> Result<Self> {
    match code {
      0 => Ok(Self::NotMet),
      1 => Ok(Self::Partial),
      2 => Ok(Self::Met),
      other => Err(Error::InvalidResult(other)),
    }
  }
}

impl From<Score> for i64 {
  fn from(score: Score) -> Self { score.code() }
}

impl TryFrom<i64> for Score {
  type Error = Error;

  fn try_from(code: i64) -> Result<Self> { Self::from_code(code) }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// A persisted evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
  pub evaluation_id: i64,
  pub user_id:       i64,
  pub group_code:    String,
  pub aspect_id:     i64,
  pub result:        Score,
  pub observation:   String,
  /// Store-assigned; never changes after creation.
  pub recorded_at:   DateTime<Utc>,
}

/// Input to [`crate::ledger::EvaluationLedger::create_evaluation`]. The
/// evaluator comes from the principal, not from this struct.
#[derive(Debug, Clone)]
pub struct NewEvaluation {
  pub group_code:  String,
  pub aspect_id:   i64,
  /// Raw result code as submitted; checked against [`Score`].
  pub result:      i64,
  pub observation: String,
}

/// A [`NewEvaluation`] that passed every input check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidEvaluation {
  /// Normalised (trimmed, upper-cased).
  pub group_code:  String,
  pub aspect_id:   i64,
  pub result:      Score,
  /// Trimmed.
  pub observation: String,
}

impl NewEvaluation {
  pub fn new(
    group_code: impl Into<String>,
    aspect_id: i64,
    result: i64,
    observation: impl Into<String>,
  ) -> Self {
    Self {
      group_code: group_code.into(),
      aspect_id,
      result,
      observation: observation.into(),
    }
  }

  /// Run every input check. Nothing is written if this fails.
  pub fn validate(&self, policy: &ObservationPolicy) -> Result<ValidEvaluation> {
    let group_code = normalize_group_code(&self.group_code)?;
    let result = Score::from_code(self.result)?;
    let observation = policy.check(&self.observation)?.to_owned();

    Ok(ValidEvaluation {
      group_code,
      aspect_id: self.aspect_id,
      result,
      observation,
    })
  }
}

// ─── Evaluation pass ─────────────────────────────────────────────────────────

/// One scored aspect inside a [`NewEvaluationPass`].
#[derive(Debug, Clone)]
pub struct ScoredAspect {
  pub aspect_id:   i64,
  pub result:      i64,
  pub observation: String,
}

/// Input to [`crate::ledger::EvaluationLedger::create_evaluation_pass`]:
/// every aspect of one group's rubric, scored by one curator.
#[derive(Debug, Clone)]
pub struct NewEvaluationPass {
  pub group_code: String,
  pub items:      Vec<ScoredAspect>,
}

/// A [`NewEvaluationPass`] whose every item passed the input checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidEvaluationPass {
  pub group_code: String,
  pub items:      Vec<ValidEvaluation>,
}

impl NewEvaluationPass {
  pub fn new(group_code: impl Into<String>) -> Self {
    Self { group_code: group_code.into(), items: vec![] }
  }

  pub fn score(mut self, aspect_id: i64, result: i64, observation: impl Into<String>) -> Self {
    self.items.push(ScoredAspect { aspect_id, result, observation: observation.into() });
    self
  }

  /// Check every item and the shape of the pass. Coverage of the rubric is
  /// left to the store, which knows the group's ficha.
  pub fn validate(&self, policy: &ObservationPolicy) -> Result<ValidEvaluationPass> {
    let group_code = normalize_group_code(&self.group_code)?;
    if self.items.is_empty() {
      return Err(Error::EmptyPass(group_code));
    }

    let mut seen = BTreeSet::new();
    let mut items = Vec::with_capacity(self.items.len());
    for item in &self.items {
      if !seen.insert(item.aspect_id) {
        return Err(Error::DuplicateAspect(item.aspect_id));
      }
      items.push(ValidEvaluation {
        group_code:  group_code.clone(),
        aspect_id:   item.aspect_id,
        result:      Score::from_code(item.result)?,
        observation: policy.check(&item.observation)?.to_owned(),
      });
    }

    Ok(ValidEvaluationPass { group_code, items })
  }
}

impl ValidEvaluationPass {
  pub fn aspect_ids(&self) -> BTreeSet<i64> { self.items.iter().map(|i| i.aspect_id).collect() }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// Filters for [`crate::ledger::EvaluationLedger::list_evaluations`].
#[derive(Debug, Clone, Default)]
pub struct EvaluationQuery {
  pub user_id:        Option<i64>,
  pub group_code:     Option<String>,
  pub dimension_code: Option<String>,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

/// An evaluation joined with its curator, group, dimension and aspect, as
/// consumed by the committee views and exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
  pub evaluation_id:  i64,
  pub user_id:        i64,
  pub curator:        String,
  pub group_code:     String,
  pub proposal_name:  String,
  pub dimension_code: String,
  pub dimension_name: String,
  pub aspect_id:      i64,
  pub aspect_name:    String,
  pub result:         Score,
  pub observation:    String,
  pub recorded_at:    DateTime<Utc>,
}

/// Per-dimension aggregate for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
  pub dimension_code: String,
  pub dimension_name: String,
  pub evaluations:    u64,
  /// Mean result code over all evaluations in the dimension.
  pub average:        f64,
}

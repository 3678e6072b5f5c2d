//! The `EvaluationLedger` trait.
//!
//! Implemented by storage backends (e.g. `rubrica-store-sqlite`). The views
//! and exports depend on this abstraction, not on a concrete backend.

use std::future::Future;

use crate::{
  evaluation::{Evaluation, EvaluationQuery, EvaluationRow, NewEvaluation, NewEvaluationPass},
  principal::Principal,
};

/// Records curator evaluations against the persisted taxonomy.
///
/// Evaluations are append-only: created once, never updated. All methods
/// return `Send` futures so the trait can be used from multi-threaded
/// runtimes.
pub trait EvaluationLedger: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether `user_id` has already scored any aspect of `group_code`. Used to
  /// stop a curator from starting a second pass over the same group.
  fn evaluation_exists<'a>(
    &'a self,
    user_id: i64,
    group_code: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Validate and record one evaluation on behalf of `principal`.
  ///
  /// Input problems (result code, observation text, group code) are rejected
  /// before any write. A second evaluation for the same
  /// `(user, group, aspect)` triple fails with a constraint violation and
  /// leaves the first one untouched.
  fn create_evaluation<'a>(
    &'a self,
    principal: &'a Principal,
    input: NewEvaluation,
  ) -> impl Future<Output = Result<Evaluation, Self::Error>> + Send + 'a;

  /// Validate and record a complete pass over one group's rubric.
  ///
  /// The scored aspects must be exactly the aspects of the dimensions linked
  /// to the group's ficha. All rows and one audit entry are written in a
  /// single transaction; if any row collides with an existing evaluation,
  /// nothing from the pass is kept.
  fn create_evaluation_pass<'a>(
    &'a self,
    principal: &'a Principal,
    pass: NewEvaluationPass,
  ) -> impl Future<Output = Result<Vec<Evaluation>, Self::Error>> + Send + 'a;

  /// Evaluations joined with curator, group, dimension and aspect.
  fn list_evaluations<'a>(
    &'a self,
    query: &'a EvaluationQuery,
  ) -> impl Future<Output = Result<Vec<EvaluationRow>, Self::Error>> + Send + 'a;
}

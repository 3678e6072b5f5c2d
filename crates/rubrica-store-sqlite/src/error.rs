//! Error type for `rubrica-store-sqlite`.

use rubrica_core::{principal::Role, sync::RunReport};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0}")]
  Core(#[from] rubrica_core::Error),

  /// A UNIQUE, CHECK or FOREIGN KEY constraint rejected the write. For
  /// evaluations this means a concurrent submission won the race.
  #[error("constraint violation: {0}")]
  ConstraintViolation(String),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  /// The run committed but the integrity pass found orphans. The data is
  /// left as-is for an operator to investigate.
  #[error("integrity violation after run {}: {}", .0.summary.run_id, .0.integrity)]
  IntegrityViolation(Box<RunReport>),

  #[error("user {user_id} with role {role} may not record evaluations")]
  NotPermitted { user_id: i64, role: Role },

  #[error("group not found: {0}")]
  GroupNotFound(String),

  #[error("aspect not found: {0}")]
  AspectNotFound(i64),

  #[error("ficha not found: {0}")]
  FichaNotFound(String),

  #[error("user not found: {0}")]
  UserNotFound(i64),

  #[error("group {0} has no ficha assigned")]
  NoFichaAssigned(String),

  /// The scored aspects of a pass differ from the group's rubric.
  #[error("pass for group {group_code} does not match its rubric: missing {missing:?}, unexpected {unexpected:?}")]
  IncompletePass { group_code: String, missing: Vec<i64>, unexpected: Vec<i64> },

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  /// Rejected input: nothing was written.
  pub fn is_validation(&self) -> bool {
    match self {
      Self::Core(e) => e.is_validation(),
      Self::NotPermitted { .. }
      | Self::GroupNotFound(_)
      | Self::AspectNotFound(_)
      | Self::FichaNotFound(_)
      | Self::UserNotFound(_)
      | Self::NoFichaAssigned(_)
      | Self::IncompletePass { .. } => true,
      _ => false,
    }
  }

  pub fn is_constraint_violation(&self) -> bool { matches!(self, Self::ConstraintViolation(_)) }
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, message))
        if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        Self::ConstraintViolation(message.unwrap_or_else(|| failure.to_string()))
      }
      other => Self::Database(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error types for `rubrica-core`.

use thiserror::Error;

use crate::validate::ObservationError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid observation: {0}")]
  InvalidObservation(#[from] ObservationError),

  #[error("invalid result code {0}: expected 0, 1 or 2")]
  InvalidResult(i64),

  #[error("invalid group code {code:?}: {reason}")]
  InvalidGroupCode { code: String, reason: &'static str },

  #[error("invalid taxonomy definition: {0}")]
  InvalidDefinition(String),

  #[error("evaluation pass for group {0} scores no aspects")]
  EmptyPass(String),

  #[error("aspect {0} is scored more than once in one pass")]
  DuplicateAspect(i64),

  #[error("unknown role: {0:?}")]
  UnknownRole(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// `true` for rejected caller input, as opposed to internal failures.
  pub fn is_validation(&self) -> bool { !matches!(self, Self::Serialization(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

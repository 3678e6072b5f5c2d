//! Input validation for curator submissions and roster codes.
//!
//! These checks run before anything touches the store, so a constraint
//! violation coming back from the database always means a genuine conflict
//! (usually two submissions racing for the same triple), never bad input.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Error, Result};

/// Storage-level floor for observation length; the `evaluaciones` table
/// carries the same value as a CHECK constraint.
pub const MIN_OBSERVATION_CHARS: usize = 20;

/// Minimum number of whitespace-separated words in an observation.
pub const MIN_OBSERVATION_WORDS: usize = 3;

pub const MAX_GROUP_CODE_LEN: usize = 50;

/// Stock phrases curators reach for when they have nothing to say.
pub const GENERIC_PHRASES: &[&str] = &[
  "bien",
  "ok",
  "regular",
  "malo",
  "bueno",
  "n/a",
  "na",
  "ninguna",
  "sin observaciones",
  "todo bien",
  "todo ok",
  "todo correcto",
];

// ─── Observation ─────────────────────────────────────────────────────────────

/// Why an observation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
  #[error("observation is empty")]
  Empty,

  #[error("observation must have at least {min} characters")]
  TooShort { min: usize },

  #[error("observation is too generic, be more specific")]
  Generic,

  #[error("observation must contain at least {min} words")]
  TooFewWords { min: usize },
}

/// Rules an observation must satisfy before it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationPolicy {
  /// Never effectively below [`MIN_OBSERVATION_CHARS`].
  pub min_chars: usize,
  pub min_words: usize,
  /// Compared case-insensitively against the whole trimmed text.
  pub deny_list: Vec<String>,
}

impl Default for ObservationPolicy {
  fn default() -> Self { Self::with_min_chars(MIN_OBSERVATION_CHARS) }
}

impl ObservationPolicy {
  /// A minimum below the storage floor is raised to it, so input the
  /// database would refuse is always rejected here first.
  pub fn with_min_chars(min_chars: usize) -> Self {
    Self {
      min_chars: min_chars.max(MIN_OBSERVATION_CHARS),
      min_words: MIN_OBSERVATION_WORDS,
      deny_list: GENERIC_PHRASES.iter().map(|p| (*p).to_owned()).collect(),
    }
  }

  /// Validate `text` and return it trimmed.
  pub fn check<'a>(&self, text: &'a str) -> Result<&'a str, ObservationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
      return Err(ObservationError::Empty);
    }

    let min = self.effective_min_chars();
    if trimmed.chars().count() < min {
      return Err(ObservationError::TooShort { min });
    }

    let lowered = trimmed.to_lowercase();
    if self.deny_list.iter().any(|p| p.to_lowercase() == lowered) {
      return Err(ObservationError::Generic);
    }

    if trimmed.split_whitespace().count() < self.min_words {
      return Err(ObservationError::TooFewWords { min: self.min_words });
    }

    Ok(trimmed)
  }

  pub fn effective_min_chars(&self) -> usize { self.min_chars.max(MIN_OBSERVATION_CHARS) }
}

// ─── Group codes ─────────────────────────────────────────────────────────────

/// Normalise a roster code: trimmed and upper-cased. Any format is accepted
/// as long as it carries at least one ASCII alphanumeric and fits the column.
pub fn normalize_group_code(code: &str) -> Result<String> {
  let cleaned = code.trim().to_uppercase();
  let reject = |reason| Error::InvalidGroupCode { code: code.to_owned(), reason };

  if cleaned.is_empty() {
    return Err(reject("code is empty"));
  }
  if !cleaned.chars().any(|c| c.is_ascii_alphanumeric()) {
    return Err(reject("code has no alphanumeric character"));
  }
  if cleaned.chars().count() > MAX_GROUP_CODE_LEN {
    return Err(reject("code is longer than 50 characters"));
  }

  Ok(cleaned)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_generic_and_sparse_observations_fail() {
    let policy = ObservationPolicy::default();
    assert_eq!(policy.check(""), Err(ObservationError::Empty));
    assert_eq!(policy.check("   \t "), Err(ObservationError::Empty));
    assert_eq!(policy.check("ok"), Err(ObservationError::TooShort { min: 20 }));
    assert_eq!(policy.check("bien"), Err(ObservationError::TooShort { min: 20 }));
    assert_eq!(policy.check("a b"), Err(ObservationError::TooShort { min: 20 }));
    assert_eq!(
      policy.check("Extraordinariamente_bien"),
      Err(ObservationError::TooFewWords { min: 3 })
    );
  }

  #[test]
  fn substantive_observation_passes_trimmed() {
    let policy = ObservationPolicy::default();
    let text = "  Vestuario tradicional completo y bien conservado \n";
    assert_eq!(
      policy.check(text),
      Ok("Vestuario tradicional completo y bien conservado")
    );
  }

  #[test]
  fn deny_list_is_case_insensitive() {
    let mut policy = ObservationPolicy::default();
    policy.deny_list.push("cumple con lo esperado".to_owned());
    assert_eq!(policy.check("Cumple Con Lo Esperado"), Err(ObservationError::Generic));
    assert_eq!(
      policy.check("cumple con lo esperado en vestuario"),
      Ok("cumple con lo esperado en vestuario")
    );
  }

  #[test]
  fn length_counts_characters_not_bytes() {
    let policy = ObservationPolicy::default();
    // Nineteen characters, thirty-eight bytes.
    let text = "ñ".repeat(19);
    assert_eq!(policy.check(&text), Err(ObservationError::TooShort { min: 20 }));
  }

  #[test]
  fn minimum_never_drops_below_the_storage_floor() {
    let policy = ObservationPolicy::with_min_chars(5);
    assert_eq!(policy.min_chars, MIN_OBSERVATION_CHARS);
    assert_eq!(
      policy.check("uno dos tres cuatro"),
      Err(ObservationError::TooShort { min: MIN_OBSERVATION_CHARS })
    );

    // A hand-built policy is held to the floor as well.
    let lowered = ObservationPolicy { min_chars: 3, ..ObservationPolicy::default() };
    assert_eq!(lowered.effective_min_chars(), MIN_OBSERVATION_CHARS);
    assert!(lowered.check("uno dos tres cuatro").is_err());

    assert_eq!(ObservationPolicy::with_min_chars(40).min_chars, 40);
  }

  #[test]
  fn group_codes_are_normalised() {
    assert_eq!(normalize_group_code(" p00012 ").unwrap(), "P00012");
    assert_eq!(normalize_group_code("115").unwrap(), "115");
    assert_eq!(normalize_group_code("grupo-a-001").unwrap(), "GRUPO-A-001");
  }

  #[test]
  fn bad_group_codes_are_rejected() {
    assert!(matches!(
      normalize_group_code("  "),
      Err(Error::InvalidGroupCode { .. })
    ));
    assert!(matches!(
      normalize_group_code("--"),
      Err(Error::InvalidGroupCode { .. })
    ));
    assert!(matches!(
      normalize_group_code(&"X".repeat(51)),
      Err(Error::InvalidGroupCode { .. })
    ));
  }
}

//! The authenticated caller, as handed over by the login layer.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
  /// Scores groups aspect by aspect.
  #[serde(rename = "curador")]
  Curator,
  /// Reads aggregated results.
  #[serde(rename = "comite")]
  Committee,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Curator => "curador",
      Self::Committee => "comite",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "curador" | "curator" => Ok(Self::Curator),
      "comite" | "comité" | "committee" => Ok(Self::Committee),
      other => Err(Error::UnknownRole(other.to_owned())),
    }
  }
}

/// An authenticated user. Authentication itself happens elsewhere; the store
/// only trusts what it is given here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub user_id:  i64,
  pub username: String,
  pub role:     Role,
}

impl Principal {
  pub fn can_evaluate(&self) -> bool { self.role == Role::Curator }
}

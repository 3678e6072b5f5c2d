//! Performance groups, as supplied by the external catalog.
//!
//! The roster is read-only from the evaluation side: groups are imported in
//! bulk and only their `code` matters for existence checks.

use serde::{Deserialize, Serialize};

/// One entry of the group catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub code:          String,
  pub proposal_name: String,
  pub modality:      String,
  #[serde(rename = "type")]
  pub kind:          String,
  #[serde(default)]
  pub size:          Option<String>,
  #[serde(default)]
  pub nature:        Option<String>,
  pub event_year:    i32,
}

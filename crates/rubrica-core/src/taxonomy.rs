//! The rubric taxonomy: the declared definition and its persisted shape.
//!
//! A [`TaxonomyDefinition`] is the desired state for one synchronization run.
//! It is loaded once, validated, and passed by reference to the store; nothing
//! mutates it while a run is in progress.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

// ─── Declared definition ─────────────────────────────────────────────────────

/// A top-level rubric category and its scoreable aspects, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionDef {
  /// Stable business key. Never reused for a different dimension.
  pub code:    String,
  pub name:    String,
  #[serde(default)]
  pub aspects: Vec<String>,
}

/// A named grouping of dimensions applied to a class of performance groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FichaDef {
  pub code:        String,
  pub name:        String,
  #[serde(default)]
  pub description: String,
}

/// The full desired taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyDefinition {
  #[serde(default)]
  pub dimensions:       Vec<DimensionDef>,
  #[serde(default)]
  pub fichas:           Vec<FichaDef>,
  /// Ficha code → dimension codes, in the order they appear on that ficha.
  #[serde(default)]
  pub ficha_dimensions: BTreeMap<String, Vec<String>>,
}

impl TaxonomyDefinition {
  pub fn new() -> Self { Self::default() }

  pub fn with_dimension<I, S>(mut self, code: &str, name: &str, aspects: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.dimensions.push(DimensionDef {
      code:    code.to_owned(),
      name:    name.to_owned(),
      aspects: aspects.into_iter().map(Into::into).collect(),
    });
    self
  }

  pub fn with_ficha(mut self, code: &str, name: &str, description: &str) -> Self {
    self.fichas.push(FichaDef {
      code:        code.to_owned(),
      name:        name.to_owned(),
      description: description.to_owned(),
    });
    self
  }

  pub fn with_ficha_dimensions<I, S>(mut self, ficha_code: &str, dimension_codes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.ficha_dimensions.insert(
      ficha_code.to_owned(),
      dimension_codes.into_iter().map(Into::into).collect(),
    );
    self
  }

  pub fn dimension(&self, code: &str) -> Option<&DimensionDef> {
    self.dimensions.iter().find(|d| d.code == code)
  }

  /// Reject definitions that could never be persisted consistently: blank
  /// keys or names, and duplicates within any uniqueness scope.
  pub fn validate(&self) -> Result<()> {
    let mut codes = HashSet::new();
    for dim in &self.dimensions {
      require_text("dimension code", &dim.code)?;
      require_text("dimension name", &dim.name)?;
      if !codes.insert(dim.code.as_str()) {
        return Err(invalid(format!("duplicate dimension code {:?}", dim.code)));
      }

      let mut names = HashSet::new();
      for aspect in &dim.aspects {
        require_text("aspect name", aspect)?;
        if !names.insert(aspect.as_str()) {
          return Err(invalid(format!(
            "duplicate aspect {aspect:?} in dimension {:?}",
            dim.code
          )));
        }
      }
    }

    let mut ficha_codes = HashSet::new();
    for ficha in &self.fichas {
      require_text("ficha code", &ficha.code)?;
      require_text("ficha name", &ficha.name)?;
      if !ficha_codes.insert(ficha.code.as_str()) {
        return Err(invalid(format!("duplicate ficha code {:?}", ficha.code)));
      }
    }

    for (ficha_code, dimension_codes) in &self.ficha_dimensions {
      require_text("ficha code", ficha_code)?;
      let mut seen = HashSet::new();
      for code in dimension_codes {
        require_text("dimension code", code)?;
        if !seen.insert(code.as_str()) {
          return Err(invalid(format!(
            "dimension {code:?} listed twice on ficha {ficha_code:?}"
          )));
        }
      }
    }

    Ok(())
  }

  /// SHA-256 over the canonical JSON form, hex-encoded. Two definitions with
  /// the same content always share a fingerprint.
  pub fn fingerprint(&self) -> Result<String> {
    let canonical = serde_json::to_vec(self)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
  }
}

fn require_text(what: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(invalid(format!("{what} must not be blank")));
  }
  Ok(())
}

fn invalid(msg: String) -> Error { Error::InvalidDefinition(msg) }

// ─── Persisted shape ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aspect {
  pub aspect_id:    i64,
  pub dimension_id: i64,
  pub name:         String,
  pub order:        i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
  pub dimension_id: i64,
  pub code:         String,
  pub name:         String,
  pub order:        i64,
  pub aspects:      Vec<Aspect>,
}

/// One ficha → dimension association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FichaDimension {
  pub link_id:        i64,
  pub ficha_id:       i64,
  pub dimension_id:   i64,
  pub dimension_code: String,
  pub order:          i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ficha {
  pub ficha_id:    i64,
  pub code:        String,
  pub name:        String,
  pub description: String,
  pub dimensions:  Vec<FichaDimension>,
}

/// Everything currently persisted, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomySnapshot {
  pub dimensions: Vec<Dimension>,
  pub fichas:     Vec<Ficha>,
}

impl TaxonomySnapshot {
  pub fn dimension(&self, code: &str) -> Option<&Dimension> {
    self.dimensions.iter().find(|d| d.code == code)
  }

  pub fn ficha(&self, code: &str) -> Option<&Ficha> {
    self.fichas.iter().find(|f| f.code == code)
  }
}

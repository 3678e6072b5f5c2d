//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps written by this crate are RFC 3339 strings. Rows written by the
//! older tooling carry SQLite's `CURRENT_TIMESTAMP` form
//! (`YYYY-MM-DD HH:MM:SS`, UTC); both decode.

use chrono::{DateTime, NaiveDateTime, Utc};
use rubrica_core::{
  audit::LogEntry,
  evaluation::{EvaluationRow, Score},
  principal::{Principal, Role},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|naive| naive.and_utc())
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Role ────────────────────────────────────────────────────────────────────

pub fn encode_role(role: Role) -> &'static str { role.as_str() }

pub fn decode_role(s: &str) -> Result<Role> { Ok(s.parse()?) }

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Joined evaluation row for the committee views.
pub struct RawEvaluationRow {
  pub evaluation_id:  i64,
  pub user_id:        i64,
  pub curator:        String,
  pub group_code:     String,
  pub proposal_name:  String,
  pub dimension_code: String,
  pub dimension_name: String,
  pub aspect_id:      i64,
  pub aspect_name:    String,
  pub result:         i64,
  pub observation:    String,
  pub recorded_at:    Option<String>,
}

impl RawEvaluationRow {
  pub fn into_row(self) -> Result<EvaluationRow> {
    Ok(EvaluationRow {
      evaluation_id:  self.evaluation_id,
      user_id:        self.user_id,
      curator:        self.curator,
      group_code:     self.group_code,
      proposal_name:  self.proposal_name,
      dimension_code: self.dimension_code,
      dimension_name: self.dimension_name,
      aspect_id:      self.aspect_id,
      aspect_name:    self.aspect_name,
      result:         Score::from_code(self.result)?,
      observation:    self.observation,
      recorded_at:    decode_recorded_at(self.recorded_at.as_deref())?,
    })
  }
}

pub struct RawPrincipal {
  pub user_id:  i64,
  pub username: String,
  pub role:     String,
}

impl RawPrincipal {
  pub fn into_principal(self) -> Result<Principal> {
    Ok(Principal {
      user_id:  self.user_id,
      username: self.username,
      role:     decode_role(&self.role)?,
    })
  }
}

pub struct RawLogEntry {
  pub log_id:      i64,
  pub actor:       Option<String>,
  pub action:      String,
  pub detail:      Option<String>,
  pub recorded_at: Option<String>,
}

impl RawLogEntry {
  pub fn into_entry(self) -> Result<LogEntry> {
    Ok(LogEntry {
      log_id:      self.log_id,
      actor:       self.actor,
      action:      self.action,
      detail:      self.detail,
      recorded_at: decode_recorded_at(self.recorded_at.as_deref())?,
    })
  }
}

/// Timestamp columns default to `CURRENT_TIMESTAMP` but are nullable in the
/// legacy schema.
fn decode_recorded_at(s: Option<&str>) -> Result<DateTime<Utc>> {
  match s {
    Some(s) => decode_dt(s),
    None => Err(Error::DateParse("missing timestamp".into())),
  }
}

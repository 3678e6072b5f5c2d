//! Audit trail writes and reads (`logs_sistema`).

use chrono::Utc;
use rubrica_core::audit::{LogAction, LogEntry};

use crate::{
  Result, SqliteStore,
  encode::{RawLogEntry, encode_dt},
};

/// Append one audit entry on `conn`. Called inside the caller's transaction
/// so the entry commits or rolls back with the change it describes.
pub(crate) fn append_log(
  conn: &rusqlite::Connection,
  actor: &str,
  action: LogAction,
  detail: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO logs_sistema (usuario, accion, detalle, fecha) VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![actor, action.as_str(), detail, encode_dt(Utc::now())],
  )?;
  Ok(())
}

impl SqliteStore {
  /// Most recent audit entries first.
  pub async fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
    let limit = limit as i64;

    let raws: Vec<RawLogEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, usuario, accion, detalle, fecha
           FROM logs_sistema
           ORDER BY id DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| {
            Ok(RawLogEntry {
              log_id:      row.get(0)?,
              actor:       row.get(1)?,
              action:      row.get(2)?,
              detail:      row.get(3)?,
              recorded_at: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLogEntry::into_entry).collect()
  }
}

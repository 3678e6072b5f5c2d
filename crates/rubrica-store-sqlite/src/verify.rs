//! Post-sync integrity pass. Read-only: it reports orphans, it never repairs
//! them.

use rusqlite::Connection;
use tracing::{info, warn};

use rubrica_core::sync::IntegrityReport;

use crate::{Result, SqliteStore};

impl SqliteStore {
  /// Scan for rows whose references no longer resolve.
  pub async fn verify_integrity(&self) -> Result<IntegrityReport> {
    let report = self.conn.call(|conn| Ok(check_integrity(conn)?)).await?;

    if report.is_clean() {
      info!("integrity check clean");
    } else {
      warn!(%report, "integrity check found orphans");
    }
    Ok(report)
  }
}

pub(crate) fn check_integrity(conn: &Connection) -> rusqlite::Result<IntegrityReport> {
  let orphaned_evaluations = ids(
    conn,
    "SELECT e.id
     FROM evaluaciones e
     LEFT JOIN aspectos a ON a.id = e.aspecto_id
     WHERE a.id IS NULL
     ORDER BY e.id",
  )?;

  let orphaned_ficha_dimensions = ids(
    conn,
    "SELECT fd.id
     FROM ficha_dimensiones fd
     LEFT JOIN fichas      f ON f.id = fd.ficha_id
     LEFT JOIN dimensiones d ON d.id = fd.dimension_id
     WHERE f.id IS NULL OR d.id IS NULL
     ORDER BY fd.id",
  )?;

  let orphaned_group_fichas = conn
    .prepare(
      "SELECT g.codigo
       FROM grupos g
       LEFT JOIN fichas f ON f.id = g.ficha_id
       WHERE g.ficha_id IS NOT NULL AND f.id IS NULL
       ORDER BY g.codigo",
    )?
    .query_map([], |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(IntegrityReport {
    orphaned_evaluations,
    orphaned_ficha_dimensions,
    orphaned_group_fichas,
  })
}

fn ids(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<i64>> {
  conn
    .prepare(sql)?
    .query_map([], |r| r.get::<_, i64>(0))?
    .collect()
}

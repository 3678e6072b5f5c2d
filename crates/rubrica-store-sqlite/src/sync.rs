//! Taxonomy synchronization: converge persisted rows to a
//! [`TaxonomyDefinition`].
//!
//! One run is one transaction. Levels are processed strictly in order
//! (dimensions, aspects, fichas, ficha links) because each level resolves ids
//! written by the one before. Any database error aborts the run and the
//! dropped transaction rolls everything back, including audit entries.
//!
//! Only unreferenced rows are ever deleted. An aspect that curators have
//! already scored stays in place and is reported; dimensions and fichas are
//! never deleted at all.

use std::{collections::HashMap, fmt::Display};

use rusqlite::{Connection, OptionalExtension as _, Transaction};
use tracing::{debug, error, info, warn};

use rubrica_core::{
  audit::{LogAction, SYNC_ACTOR},
  plan::{ExistingChild, plan_children, renumber_trailing},
  sync::{RunReport, RunSummary, SyncWarning},
  taxonomy::{DimensionDef, TaxonomyDefinition},
};

use crate::{Error, Result, SqliteStore, audit::append_log};

impl SqliteStore {
  /// Reconcile the store with `definition` in one transaction and return the
  /// run summary. Retained aspects and stale rows are warnings, not errors.
  pub async fn synchronize(&self, definition: &TaxonomyDefinition) -> Result<RunSummary> {
    let (summary, definition) = begin_run(definition)?;
    let run_id = summary.run_id;

    let summary = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        Ok(apply_run(tx, &definition, summary)?)
      })
      .await
      .map_err(|e| rolled_back(run_id, e))?;

    log_committed(&summary);
    Ok(summary)
  }

  /// First-time setup: insert `definition` if the store has no dimensions.
  /// Returns `None` when the taxonomy already exists.
  pub async fn initialize(&self, definition: &TaxonomyDefinition) -> Result<Option<RunSummary>> {
    let (summary, definition) = begin_run(definition)?;
    let run_id = summary.run_id;

    let summary = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM dimensiones", [], |r| r.get(0))?;
        if existing > 0 {
          info!(dimensions = existing, "taxonomy already initialised");
          return Ok(None);
        }
        Ok(Some(apply_run(tx, &definition, summary)?))
      })
      .await
      .map_err(|e| rolled_back(run_id, e))?;

    if let Some(s) = &summary {
      log_committed(s);
    }
    Ok(summary)
  }

  /// Synchronize, then run the integrity pass. Orphans found after commit
  /// fail the run with [`Error::IntegrityViolation`]; the committed data is
  /// not touched.
  pub async fn run(&self, definition: &TaxonomyDefinition) -> Result<RunReport> {
    let summary = self.synchronize(definition).await?;
    let integrity = self.verify_integrity().await?;

    let report = RunReport { summary, integrity };
    if !report.integrity.is_clean() {
      error!(
        run_id = %report.summary.run_id,
        orphaned_evaluations = report.integrity.orphaned_evaluations.len(),
        orphaned_ficha_dimensions = report.integrity.orphaned_ficha_dimensions.len(),
        orphaned_group_fichas = report.integrity.orphaned_group_fichas.len(),
        "integrity violation after synchronization"
      );
      return Err(Error::IntegrityViolation(Box::new(report)));
    }
    Ok(report)
  }
}

/// Validate and fingerprint `definition` before any write. The clone moves
/// into the connection thread.
fn begin_run(definition: &TaxonomyDefinition) -> Result<(RunSummary, TaxonomyDefinition)> {
  definition.validate()?;
  let summary = RunSummary::new(definition.fingerprint()?);

  info!(
    run_id = %summary.run_id,
    fingerprint = %summary.fingerprint,
    dimensions = definition.dimensions.len(),
    fichas = definition.fichas.len(),
    "taxonomy synchronization started"
  );
  Ok((summary, definition.clone()))
}

/// Reconcile every level on `tx`, audit the run if it changed anything, and
/// commit. Returning early drops `tx`, which rolls the run back.
fn apply_run(
  tx: Transaction<'_>,
  definition: &TaxonomyDefinition,
  mut summary: RunSummary,
) -> rusqlite::Result<RunSummary> {
  reconcile(&tx, definition, &mut summary)?;
  summary.finish();
  if summary.mutations() > 0 {
    append_log(&tx, SYNC_ACTOR, LogAction::TaxonomySynced, &summary.headline())?;
  }
  tx.commit()?;
  Ok(summary)
}

fn rolled_back(run_id: impl Display, e: tokio_rusqlite::Error) -> Error {
  error!(%run_id, error = %e, "taxonomy synchronization rolled back");
  e.into()
}

fn log_committed(s: &RunSummary) {
  info!(
    run_id = %s.run_id,
    dimensions = %s.dimensions,
    aspects = %s.aspects,
    fichas = %s.fichas,
    ficha_dimensions = %s.ficha_dimensions,
    warnings = s.warnings.len(),
    mutations = s.mutations(),
    "taxonomy synchronization committed"
  );
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Apply every level of `definition` on `conn`. The caller owns the
/// transaction.
pub(crate) fn reconcile(
  conn: &Connection,
  definition: &TaxonomyDefinition,
  summary: &mut RunSummary,
) -> rusqlite::Result<()> {
  let dimension_ids = reconcile_dimensions(conn, definition, summary)?;
  for dim in &definition.dimensions {
    if let Some(&dimension_id) = dimension_ids.get(&dim.code) {
      reconcile_aspects(conn, dimension_id, dim, summary)?;
    }
  }
  upsert_fichas(conn, definition, summary)?;
  reconcile_ficha_links(conn, definition, summary)?;
  Ok(())
}

struct DimensionRow {
  id:    i64,
  code:  String,
  name:  String,
  order: i64,
}

/// Upsert declared dimensions by code. Returns code → id for every declared
/// dimension.
fn reconcile_dimensions(
  conn: &Connection,
  definition: &TaxonomyDefinition,
  summary: &mut RunSummary,
) -> rusqlite::Result<HashMap<String, i64>> {
  let existing: Vec<DimensionRow> = conn
    .prepare("SELECT id, codigo, nombre, orden FROM dimensiones ORDER BY orden, id")?
    .query_map([], |row| {
      Ok(DimensionRow {
        id:    row.get(0)?,
        code:  row.get(1)?,
        name:  row.get(2)?,
        order: row.get(3)?,
      })
    })?
    .collect::<rusqlite::Result<_>>()?;
  let by_code: HashMap<&str, &DimensionRow> =
    existing.iter().map(|d| (d.code.as_str(), d)).collect();

  let mut ids = HashMap::with_capacity(definition.dimensions.len());
  for (idx, dim) in definition.dimensions.iter().enumerate() {
    let order = idx as i64 + 1;
    match by_code.get(dim.code.as_str()) {
      None => {
        conn.execute(
          "INSERT INTO dimensiones (codigo, nombre, orden) VALUES (?1, ?2, ?3)",
          rusqlite::params![dim.code, dim.name, order],
        )?;
        let id = conn.last_insert_rowid();
        info!(dimension = %dim.code, id, name = %dim.name, order, "dimension created");
        summary.dimensions.created += 1;
        ids.insert(dim.code.clone(), id);
      }
      Some(row) if row.name == dim.name && row.order == order => {
        debug!(dimension = %dim.code, id = row.id, "dimension unchanged");
        summary.dimensions.unchanged += 1;
        ids.insert(dim.code.clone(), row.id);
      }
      Some(row) => {
        conn.execute(
          "UPDATE dimensiones SET nombre = ?1, orden = ?2 WHERE id = ?3",
          rusqlite::params![dim.name, order, row.id],
        )?;
        info!(
          dimension = %dim.code,
          id = row.id,
          name_before = %row.name,
          name_after = %dim.name,
          order_before = row.order,
          order_after = order,
          "dimension updated"
        );
        summary.dimensions.updated += 1;
        ids.insert(dim.code.clone(), row.id);
      }
    }
  }

  let stale: Vec<ExistingChild<String>> = existing
    .iter()
    .filter(|d| definition.dimension(&d.code).is_none())
    .map(|d| ExistingChild { id: d.id, key: d.code.clone(), order: d.order })
    .collect();
  for dim in &stale {
    warn!(dimension = %dim.key, id = dim.id, "dimension not in definition, kept");
    summary.dimensions.retained += 1;
    summary
      .warnings
      .push(SyncWarning::DimensionNotDeclared { code: dim.key.clone() });
  }
  for (id, order) in renumber_trailing(definition.dimensions.len(), &stale) {
    conn.execute(
      "UPDATE dimensiones SET orden = ?1 WHERE id = ?2",
      rusqlite::params![order, id],
    )?;
    info!(id, order_after = order, "undeclared dimension renumbered");
    summary.dimensions.updated += 1;
  }

  Ok(ids)
}

/// Converge the aspects of one dimension. Aspects are keyed by name, so a
/// rename is a removal plus an insertion.
fn reconcile_aspects(
  conn: &Connection,
  dimension_id: i64,
  dim: &DimensionDef,
  summary: &mut RunSummary,
) -> rusqlite::Result<()> {
  let existing: Vec<ExistingChild<String>> = conn
    .prepare("SELECT id, nombre, orden FROM aspectos WHERE dimension_id = ?1 ORDER BY orden, id")?
    .query_map(rusqlite::params![dimension_id], |row| {
      Ok(ExistingChild { id: row.get(0)?, key: row.get(1)?, order: row.get(2)? })
    })?
    .collect::<rusqlite::Result<_>>()?;

  let plan = plan_children(&existing, &dim.aspects);

  for (name, order) in &plan.insert {
    conn.execute(
      "INSERT INTO aspectos (dimension_id, nombre, orden) VALUES (?1, ?2, ?3)",
      rusqlite::params![dimension_id, name, order],
    )?;
    let id = conn.last_insert_rowid();
    info!(dimension = %dim.code, aspect = %name, id, order, "aspect created");
    summary.aspects.created += 1;
  }

  for &(id, order) in &plan.reorder {
    conn.execute(
      "UPDATE aspectos SET orden = ?1 WHERE id = ?2",
      rusqlite::params![order, id],
    )?;
    info!(dimension = %dim.code, id, order_after = order, "aspect reordered");
    summary.aspects.updated += 1;
  }

  summary.aspects.unchanged += plan.unchanged.len();

  let mut kept = vec![];
  for child in plan.remove {
    let references: i64 = conn.query_row(
      "SELECT COUNT(*) FROM evaluaciones WHERE aspecto_id = ?1",
      rusqlite::params![child.id],
      |r| r.get(0),
    )?;

    if references == 0 {
      conn.execute("DELETE FROM aspectos WHERE id = ?1", rusqlite::params![child.id])?;
      append_log(
        conn,
        SYNC_ACTOR,
        LogAction::AspectDeleted,
        &format!("aspect {} {:?} removed from dimension {}", child.id, child.key, dim.code),
      )?;
      info!(dimension = %dim.code, aspect = %child.key, id = child.id, "aspect deleted");
      summary.aspects.deleted += 1;
    } else {
      warn!(
        dimension = %dim.code,
        aspect = %child.key,
        id = child.id,
        evaluations = references,
        "aspect not in definition but referenced by evaluations, kept"
      );
      summary.aspects.retained += 1;
      summary.warnings.push(SyncWarning::AspectRetained {
        dimension_code: dim.code.clone(),
        aspect_id:      child.id,
        aspect:         child.key.clone(),
        evaluations:    references as u64,
      });
      kept.push(child);
    }
  }

  for (id, order) in renumber_trailing(dim.aspects.len(), &kept) {
    conn.execute(
      "UPDATE aspectos SET orden = ?1 WHERE id = ?2",
      rusqlite::params![order, id],
    )?;
    info!(dimension = %dim.code, id, order_after = order, "retained aspect renumbered");
    summary.aspects.updated += 1;
  }

  Ok(())
}

/// Upsert declared fichas by code. Fichas missing from the definition are
/// reported and left alone; there is no deletion path.
fn upsert_fichas(
  conn: &Connection,
  definition: &TaxonomyDefinition,
  summary: &mut RunSummary,
) -> rusqlite::Result<()> {
  for ficha in &definition.fichas {
    let current: Option<(i64, String, Option<String>)> = conn
      .query_row(
        "SELECT id, nombre, descripcion FROM fichas WHERE codigo = ?1",
        rusqlite::params![ficha.code],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
      )
      .optional()?;

    match current {
      None => {
        conn.execute(
          "INSERT INTO fichas (codigo, nombre, descripcion) VALUES (?1, ?2, ?3)",
          rusqlite::params![ficha.code, ficha.name, ficha.description],
        )?;
        let id = conn.last_insert_rowid();
        info!(ficha = %ficha.code, id, name = %ficha.name, "ficha created");
        summary.fichas.created += 1;
      }
      Some((id, name, description))
        if name == ficha.name && description.as_deref().unwrap_or_default() == ficha.description =>
      {
        debug!(ficha = %ficha.code, id, "ficha unchanged");
        summary.fichas.unchanged += 1;
      }
      Some((id, name, _)) => {
        conn.execute(
          "UPDATE fichas SET nombre = ?1, descripcion = ?2 WHERE id = ?3",
          rusqlite::params![ficha.name, ficha.description, id],
        )?;
        info!(
          ficha = %ficha.code,
          id,
          name_before = %name,
          name_after = %ficha.name,
          "ficha updated"
        );
        summary.fichas.updated += 1;
      }
    }
  }

  let mut stmt = conn.prepare("SELECT codigo FROM fichas ORDER BY codigo")?;
  let codes = stmt
    .query_map([], |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  for code in codes {
    if !definition.fichas.iter().any(|f| f.code == code) {
      warn!(ficha = %code, "ficha not in definition, kept");
      summary.fichas.retained += 1;
      summary.warnings.push(SyncWarning::FichaNotDeclared { code });
    }
  }

  Ok(())
}

/// Converge each mapped ficha's dimension list. Links carry no evaluations,
/// so a link absent from the definition is always deleted. Codes resolve
/// against the store, which already reflects the dimension and ficha levels
/// of this run.
fn reconcile_ficha_links(
  conn: &Connection,
  definition: &TaxonomyDefinition,
  summary: &mut RunSummary,
) -> rusqlite::Result<()> {
  let ficha_ids = code_index(conn, "SELECT codigo, id FROM fichas")?;
  let dimension_ids = code_index(conn, "SELECT codigo, id FROM dimensiones")?;

  for (ficha_code, dimension_codes) in &definition.ficha_dimensions {
    let Some(&ficha_id) = ficha_ids.get(ficha_code) else {
      warn!(ficha = %ficha_code, "ficha in dimension map not found, skipped");
      summary
        .warnings
        .push(SyncWarning::UnknownFicha { ficha_code: ficha_code.clone() });
      continue;
    };

    let mut declared = Vec::with_capacity(dimension_codes.len());
    for code in dimension_codes {
      match dimension_ids.get(code) {
        Some(&id) => declared.push(id),
        None => {
          warn!(ficha = %ficha_code, dimension = %code, "dimension in ficha map not found, skipped");
          summary.warnings.push(SyncWarning::UnknownDimension {
            ficha_code:     ficha_code.clone(),
            dimension_code: code.clone(),
          });
        }
      }
    }

    let existing: Vec<ExistingChild<i64>> = conn
      .prepare(
        "SELECT id, dimension_id, orden FROM ficha_dimensiones WHERE ficha_id = ?1 ORDER BY orden, id",
      )?
      .query_map(rusqlite::params![ficha_id], |row| {
        Ok(ExistingChild { id: row.get(0)?, key: row.get(1)?, order: row.get(2)? })
      })?
      .collect::<rusqlite::Result<_>>()?;

    let plan = plan_children(&existing, &declared);

    for &(dimension_id, order) in &plan.insert {
      conn.execute(
        "INSERT INTO ficha_dimensiones (ficha_id, dimension_id, orden) VALUES (?1, ?2, ?3)",
        rusqlite::params![ficha_id, dimension_id, order],
      )?;
      info!(ficha = %ficha_code, ficha_id, dimension_id, order, "ficha link created");
      summary.ficha_dimensions.created += 1;
    }

    for &(id, order) in &plan.reorder {
      conn.execute(
        "UPDATE ficha_dimensiones SET orden = ?1 WHERE id = ?2",
        rusqlite::params![order, id],
      )?;
      info!(ficha = %ficha_code, id, order_after = order, "ficha link reordered");
      summary.ficha_dimensions.updated += 1;
    }

    summary.ficha_dimensions.unchanged += plan.unchanged.len();

    for link in plan.remove {
      conn.execute(
        "DELETE FROM ficha_dimensiones WHERE id = ?1",
        rusqlite::params![link.id],
      )?;
      append_log(
        conn,
        SYNC_ACTOR,
        LogAction::FichaLinkDeleted,
        &format!("link {} removed: ficha {ficha_code} no longer lists dimension {}", link.id, link.key),
      )?;
      info!(ficha = %ficha_code, id = link.id, dimension_id = link.key, "ficha link deleted");
      summary.ficha_dimensions.deleted += 1;
    }
  }

  Ok(())
}

fn code_index(conn: &Connection, sql: &str) -> rusqlite::Result<HashMap<String, i64>> {
  conn
    .prepare(sql)?
    .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
    .collect()
}

//! [`SqliteStore`]: connection handling, users, roster and taxonomy reads.
//!
//! Synchronization lives in `sync`, the integrity pass in `verify` and the
//! [`EvaluationLedger`](rubrica_core::ledger::EvaluationLedger) impl in
//! `ledger`.

use std::{path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::{info, warn};

use rubrica_core::{
  audit::LogAction,
  evaluation::DimensionScore,
  principal::{Principal, Role},
  roster::Group,
  taxonomy::{Aspect, Dimension, Ficha, FichaDimension, TaxonomySnapshot},
  validate::{ObservationPolicy, normalize_group_code},
};

use crate::{
  Error, Result,
  audit::append_log,
  encode::{RawPrincipal, encode_dt, encode_role},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rubrica store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:   tokio_rusqlite::Connection,
  pub(crate) policy: Arc<ObservationPolicy>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::from_connection(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::from_connection(conn).await
  }

  async fn from_connection(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self { conn, policy: Arc::new(ObservationPolicy::default()) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the observation rules applied by `create_evaluation`.
  pub fn with_observation_policy(mut self, policy: ObservationPolicy) -> Self {
    self.policy = Arc::new(policy);
    self
  }

  pub fn observation_policy(&self) -> &ObservationPolicy { &self.policy }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  /// Create an active user. `password_hash` is stored as given (a PHC string).
  /// A taken username is a constraint violation.
  pub async fn create_user(&self, username: &str, password_hash: &str, role: Role) -> Result<i64> {
    let name = username.trim().to_owned();
    let hash = password_hash.to_owned();
    let at = encode_dt(Utc::now());

    let user_id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO usuarios (username, password_hash, rol, activo, fecha_creacion)
           VALUES (?1, ?2, ?3, 1, ?4)",
          rusqlite::params![name, hash, encode_role(role), at],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    info!(user_id, username = username.trim(), %role, "user created");
    Ok(user_id)
  }

  /// Resolve an active user by name.
  pub async fn principal(&self, username: &str) -> Result<Option<Principal>> {
    let name = username.trim().to_owned();

    let raw: Option<RawPrincipal> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, username, rol FROM usuarios WHERE username = ?1 AND activo = 1",
              rusqlite::params![name],
              |row| {
                Ok(RawPrincipal {
                  user_id:  row.get(0)?,
                  username: row.get(1)?,
                  role:     row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPrincipal::into_principal).transpose()
  }

  // ── Roster ────────────────────────────────────────────────────────────────

  /// Upsert catalog entries by code. Returns the number of rows written.
  /// Ficha assignments are left alone.
  pub async fn register_groups(&self, groups: &[Group]) -> Result<usize> {
    let groups: Vec<Group> = groups
      .iter()
      .map(|g| -> Result<Group> {
        Ok(Group { code: normalize_group_code(&g.code)?, ..g.clone() })
      })
      .collect::<Result<_>>()?;

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO grupos
               (codigo, nombre_propuesta, modalidad, tipo, tamano, naturaleza, ano_evento)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(codigo) DO UPDATE SET
               nombre_propuesta = excluded.nombre_propuesta,
               modalidad        = excluded.modalidad,
               tipo             = excluded.tipo,
               tamano           = excluded.tamano,
               naturaleza       = excluded.naturaleza,
               ano_evento       = excluded.ano_evento",
          )?;
          for g in &groups {
            written += stmt.execute(rusqlite::params![
              g.code,
              g.proposal_name,
              g.modality,
              g.kind,
              g.size,
              g.nature,
              g.event_year,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    info!(groups = written, "roster registered");
    Ok(written)
  }

  pub async fn group_exists(&self, group_code: &str) -> Result<bool> {
    let code = normalize_group_code(group_code)?;
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(row_exists(
            conn,
            "SELECT 1 FROM grupos WHERE codigo = ?1",
            rusqlite::params![code],
          )?)
        })
        .await?,
    )
  }

  /// Attach a ficha to a group. Ficha codes match case-insensitively.
  pub async fn assign_ficha(&self, group_code: &str, ficha_code: &str) -> Result<()> {
    enum Assign {
      Done,
      NoGroup,
      NoFicha,
    }

    let code = normalize_group_code(group_code)?;
    let ficha = ficha_code.trim().to_owned();
    let (c, f) = (code.clone(), ficha.clone());

    let outcome = self
      .conn
      .call(move |conn| {
        let ficha_id: Option<i64> = conn
          .query_row(
            "SELECT id FROM fichas WHERE upper(codigo) = upper(?1)",
            rusqlite::params![f],
            |row| row.get(0),
          )
          .optional()?;
        let Some(ficha_id) = ficha_id else {
          return Ok(Assign::NoFicha);
        };
        let updated = conn.execute(
          "UPDATE grupos SET ficha_id = ?1 WHERE codigo = ?2",
          rusqlite::params![ficha_id, c],
        )?;
        Ok(if updated == 0 { Assign::NoGroup } else { Assign::Done })
      })
      .await?;

    match outcome {
      Assign::Done => {
        info!(group = %code, ficha = %ficha, "ficha assigned");
        Ok(())
      }
      Assign::NoGroup => Err(Error::GroupNotFound(code)),
      Assign::NoFicha => Err(Error::FichaNotFound(ficha)),
    }
  }

  // ── Taxonomy reads ────────────────────────────────────────────────────────

  /// Everything currently persisted, in display order.
  pub async fn load_taxonomy(&self) -> Result<TaxonomySnapshot> {
    Ok(self.conn.call(|conn| Ok(read_taxonomy(conn)?)).await?)
  }

  /// The dimensions (with aspects) a curator scores for `group_code`, in the
  /// order of the group's ficha.
  pub async fn rubric_for_group(&self, group_code: &str) -> Result<Vec<Dimension>> {
    enum Rubric {
      Found(Vec<Dimension>),
      NoGroup,
      NoFicha,
    }

    let code = normalize_group_code(group_code)?;
    let c = code.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        let ficha: Option<Option<i64>> = conn
          .query_row(
            "SELECT ficha_id FROM grupos WHERE codigo = ?1",
            rusqlite::params![c],
            |row| row.get(0),
          )
          .optional()?;
        let Some(ficha) = ficha else {
          return Ok(Rubric::NoGroup);
        };
        let Some(ficha_id) = ficha else {
          return Ok(Rubric::NoFicha);
        };

        let mut stmt = conn.prepare(
          "SELECT d.id, d.codigo, d.nombre, d.orden
           FROM ficha_dimensiones fd
           JOIN dimensiones d ON d.id = fd.dimension_id
           WHERE fd.ficha_id = ?1
           ORDER BY fd.orden, fd.id",
        )?;
        let mut dimensions = stmt
          .query_map(rusqlite::params![ficha_id], dimension_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for dim in &mut dimensions {
          dim.aspects = read_aspects(conn, dim.dimension_id)?;
        }
        Ok(Rubric::Found(dimensions))
      })
      .await?;

    match outcome {
      Rubric::Found(dimensions) => Ok(dimensions),
      Rubric::NoGroup => Err(Error::GroupNotFound(code)),
      Rubric::NoFicha => Err(Error::NoFichaAssigned(code)),
    }
  }

  // ── Evaluation administration ─────────────────────────────────────────────

  /// Delete every evaluation `user_id` recorded for `group_code`. This is the
  /// only deletion path for evaluations and is always audited under `actor`.
  pub async fn delete_evaluations(&self, actor: &str, user_id: i64, group_code: &str) -> Result<usize> {
    let code = normalize_group_code(group_code)?;
    let actor_name = actor.to_owned();
    let c = code.clone();

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let deleted = tx.execute(
          "DELETE FROM evaluaciones WHERE usuario_id = ?1 AND codigo_grupo = ?2",
          rusqlite::params![user_id, c],
        )?;
        if deleted > 0 {
          append_log(
            &tx,
            &actor_name,
            LogAction::EvaluationsDeleted,
            &format!("deleted {deleted} evaluation(s) of group {c} by user {user_id}"),
          )?;
        }
        tx.commit()?;
        Ok(deleted)
      })
      .await?;

    if deleted > 0 {
      warn!(actor, user_id, group = %code, deleted, "evaluations deleted");
    } else {
      info!(actor, user_id, group = %code, "no evaluations matched");
    }
    Ok(deleted)
  }

  /// Count and mean result per dimension for one group, in dimension order.
  pub async fn group_scores(&self, group_code: &str) -> Result<Vec<DimensionScore>> {
    let code = normalize_group_code(group_code)?;

    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT d.codigo, d.nombre, COUNT(e.id), AVG(e.resultado)
             FROM evaluaciones e
             JOIN aspectos    a ON a.id = e.aspecto_id
             JOIN dimensiones d ON d.id = a.dimension_id
             WHERE e.codigo_grupo = ?1
             GROUP BY d.id
             ORDER BY d.orden, d.id",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![code], |row| {
              Ok(DimensionScore {
                dimension_code: row.get(0)?,
                dimension_name: row.get(1)?,
                evaluations:    row.get::<_, i64>(2)? as u64,
                average:        row.get(3)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

pub(crate) fn row_exists<P: rusqlite::Params>(
  conn: &rusqlite::Connection,
  sql: &str,
  params: P,
) -> rusqlite::Result<bool> {
  Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}

fn dimension_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Dimension> {
  Ok(Dimension {
    dimension_id: row.get(0)?,
    code:         row.get(1)?,
    name:         row.get(2)?,
    order:        row.get(3)?,
    aspects:      vec![],
  })
}

fn read_aspects(conn: &rusqlite::Connection, dimension_id: i64) -> rusqlite::Result<Vec<Aspect>> {
  let mut stmt = conn.prepare(
    "SELECT id, dimension_id, nombre, orden
     FROM aspectos
     WHERE dimension_id = ?1
     ORDER BY orden, id",
  )?;
  stmt
    .query_map(rusqlite::params![dimension_id], |row| {
      Ok(Aspect {
        aspect_id:    row.get(0)?,
        dimension_id: row.get(1)?,
        name:         row.get(2)?,
        order:        row.get(3)?,
      })
    })?
    .collect()
}

pub(crate) fn read_taxonomy(conn: &rusqlite::Connection) -> rusqlite::Result<TaxonomySnapshot> {
  let mut stmt = conn.prepare("SELECT id, codigo, nombre, orden FROM dimensiones ORDER BY orden, id")?;
  let mut dimensions = stmt
    .query_map([], dimension_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  for dim in &mut dimensions {
    dim.aspects = read_aspects(conn, dim.dimension_id)?;
  }

  let mut stmt = conn.prepare("SELECT id, codigo, nombre, descripcion FROM fichas ORDER BY codigo")?;
  let mut fichas = stmt
    .query_map([], |row| {
      Ok(Ficha {
        ficha_id:    row.get(0)?,
        code:        row.get(1)?,
        name:        row.get(2)?,
        description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        dimensions:  vec![],
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut stmt = conn.prepare(
    "SELECT fd.id, fd.ficha_id, fd.dimension_id, d.codigo, fd.orden
     FROM ficha_dimensiones fd
     JOIN dimensiones d ON d.id = fd.dimension_id
     WHERE fd.ficha_id = ?1
     ORDER BY fd.orden, fd.id",
  )?;
  for ficha in &mut fichas {
    ficha.dimensions = stmt
      .query_map(rusqlite::params![ficha.ficha_id], |row| {
        Ok(FichaDimension {
          link_id:        row.get(0)?,
          ficha_id:       row.get(1)?,
          dimension_id:   row.get(2)?,
          dimension_code: row.get(3)?,
          order:          row.get(4)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
  }

  Ok(TaxonomySnapshot { dimensions, fichas })
}

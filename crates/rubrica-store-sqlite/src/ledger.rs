//! [`EvaluationLedger`] implementation for [`SqliteStore`].

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::{info, warn};

use rubrica_core::{
  audit::LogAction,
  evaluation::{Evaluation, EvaluationQuery, EvaluationRow, NewEvaluation, NewEvaluationPass},
  ledger::EvaluationLedger,
  principal::Principal,
  validate::normalize_group_code,
};

use crate::{
  Error, Result, SqliteStore,
  audit::append_log,
  encode::{RawEvaluationRow, encode_dt},
  store::row_exists,
};

impl EvaluationLedger for SqliteStore {
  type Error = Error;

  async fn evaluation_exists(&self, user_id: i64, group_code: &str) -> Result<bool> {
    let code = normalize_group_code(group_code)?;

    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(row_exists(
            conn,
            "SELECT 1 FROM evaluaciones WHERE usuario_id = ?1 AND codigo_grupo = ?2 LIMIT 1",
            rusqlite::params![user_id, code],
          )?)
        })
        .await?,
    )
  }

  async fn create_evaluation(&self, principal: &Principal, input: NewEvaluation) -> Result<Evaluation> {
    enum Create {
      Done(i64),
      NoUser,
      NoGroup,
      NoAspect,
    }

    if !principal.can_evaluate() {
      warn!(user_id = principal.user_id, role = %principal.role, "evaluation refused for role");
      return Err(Error::NotPermitted { user_id: principal.user_id, role: principal.role });
    }

    let valid = input.validate(&self.policy)?;
    let recorded_at = Utc::now();

    let user_id = principal.user_id;
    let actor = principal.username.clone();
    let (group_code, aspect_id, result, observation) = (
      valid.group_code.clone(),
      valid.aspect_id,
      valid.result.code(),
      valid.observation.clone(),
    );
    let at = encode_dt(recorded_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if !row_exists(
          &tx,
          "SELECT 1 FROM usuarios WHERE id = ?1 AND activo = 1",
          rusqlite::params![user_id],
        )? {
          return Ok(Create::NoUser);
        }
        if !row_exists(&tx, "SELECT 1 FROM grupos WHERE codigo = ?1", rusqlite::params![group_code])? {
          return Ok(Create::NoGroup);
        }
        if !row_exists(&tx, "SELECT 1 FROM aspectos WHERE id = ?1", rusqlite::params![aspect_id])? {
          return Ok(Create::NoAspect);
        }

        tx.execute(
          "INSERT INTO evaluaciones
             (usuario_id, codigo_grupo, aspecto_id, resultado, observacion, fecha_registro)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![user_id, group_code, aspect_id, result, observation, at],
        )?;
        let evaluation_id = tx.last_insert_rowid();
        append_log(
          &tx,
          &actor,
          LogAction::EvaluationCreated,
          &format!("group {group_code} aspect {aspect_id} result {result}"),
        )?;

        tx.commit()?;
        Ok(Create::Done(evaluation_id))
      })
      .await;

    let evaluation_id = match outcome {
      Ok(Create::Done(id)) => id,
      Ok(Create::NoUser) => return Err(Error::UserNotFound(user_id)),
      Ok(Create::NoGroup) => return Err(Error::GroupNotFound(valid.group_code)),
      Ok(Create::NoAspect) => return Err(Error::AspectNotFound(valid.aspect_id)),
      Err(e) => {
        let err = Error::from(e);
        if err.is_constraint_violation() {
          warn!(
            user_id,
            group = %valid.group_code,
            aspect_id = valid.aspect_id,
            error = %err,
            "evaluation rejected by constraint"
          );
        }
        return Err(err);
      }
    };

    info!(
      evaluation_id,
      user_id,
      group = %valid.group_code,
      aspect_id = valid.aspect_id,
      result = valid.result.code(),
      "evaluation recorded"
    );

    Ok(Evaluation {
      evaluation_id,
      user_id,
      group_code: valid.group_code,
      aspect_id: valid.aspect_id,
      result: valid.result,
      observation: valid.observation,
      recorded_at,
    })
  }

  async fn create_evaluation_pass(
    &self,
    principal: &Principal,
    pass: NewEvaluationPass,
  ) -> Result<Vec<Evaluation>> {
    enum Pass {
      Done(Vec<i64>),
      NoUser,
      NoGroup,
      NoFicha,
      Mismatch { missing: Vec<i64>, unexpected: Vec<i64> },
    }

    if !principal.can_evaluate() {
      warn!(user_id = principal.user_id, role = %principal.role, "evaluation pass refused for role");
      return Err(Error::NotPermitted { user_id: principal.user_id, role: principal.role });
    }

    let valid = pass.validate(&self.policy)?;
    let recorded_at = Utc::now();

    let user_id = principal.user_id;
    let actor = principal.username.clone();
    let group_code = valid.group_code.clone();
    let submitted = valid.aspect_ids();
    let rows: Vec<(i64, i64, String)> = valid
      .items
      .iter()
      .map(|i| (i.aspect_id, i.result.code(), i.observation.clone()))
      .collect();
    let at = encode_dt(recorded_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if !row_exists(
          &tx,
          "SELECT 1 FROM usuarios WHERE id = ?1 AND activo = 1",
          rusqlite::params![user_id],
        )? {
          return Ok(Pass::NoUser);
        }
        let ficha: Option<Option<i64>> = tx
          .query_row(
            "SELECT ficha_id FROM grupos WHERE codigo = ?1",
            rusqlite::params![group_code],
            |row| row.get(0),
          )
          .optional()?;
        let Some(ficha) = ficha else {
          return Ok(Pass::NoGroup);
        };
        let Some(ficha_id) = ficha else {
          return Ok(Pass::NoFicha);
        };

        let rubric: BTreeSet<i64> = tx
          .prepare(
            "SELECT a.id
             FROM ficha_dimensiones fd
             JOIN aspectos a ON a.dimension_id = fd.dimension_id
             WHERE fd.ficha_id = ?1",
          )?
          .query_map(rusqlite::params![ficha_id], |row| row.get(0))?
          .collect::<rusqlite::Result<_>>()?;
        if rubric != submitted {
          return Ok(Pass::Mismatch {
            missing:    rubric.difference(&submitted).copied().collect(),
            unexpected: submitted.difference(&rubric).copied().collect(),
          });
        }

        let mut ids = Vec::with_capacity(rows.len());
        {
          let mut insert = tx.prepare(
            "INSERT INTO evaluaciones
               (usuario_id, codigo_grupo, aspecto_id, resultado, observacion, fecha_registro)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for (aspect_id, result, observation) in &rows {
            insert.execute(rusqlite::params![user_id, group_code, aspect_id, result, observation, at])?;
            ids.push(tx.last_insert_rowid());
          }
        }
        append_log(
          &tx,
          &actor,
          LogAction::EvaluationPassCreated,
          &format!("group {group_code}: {} aspect(s) scored", rows.len()),
        )?;

        tx.commit()?;
        Ok(Pass::Done(ids))
      })
      .await;

    let ids = match outcome {
      Ok(Pass::Done(ids)) => ids,
      Ok(Pass::NoUser) => return Err(Error::UserNotFound(user_id)),
      Ok(Pass::NoGroup) => return Err(Error::GroupNotFound(valid.group_code)),
      Ok(Pass::NoFicha) => return Err(Error::NoFichaAssigned(valid.group_code)),
      Ok(Pass::Mismatch { missing, unexpected }) => {
        warn!(
          user_id,
          group = %valid.group_code,
          ?missing,
          ?unexpected,
          "evaluation pass does not cover the rubric"
        );
        return Err(Error::IncompletePass { group_code: valid.group_code, missing, unexpected });
      }
      Err(e) => {
        let err = Error::from(e);
        if err.is_constraint_violation() {
          warn!(user_id, group = %valid.group_code, error = %err, "evaluation pass rolled back");
        }
        return Err(err);
      }
    };

    info!(user_id, group = %valid.group_code, evaluations = ids.len(), "evaluation pass recorded");

    Ok(
      ids
        .into_iter()
        .zip(valid.items)
        .map(|(evaluation_id, item)| Evaluation {
          evaluation_id,
          user_id,
          group_code: item.group_code,
          aspect_id: item.aspect_id,
          result: item.result,
          observation: item.observation,
          recorded_at,
        })
        .collect(),
    )
  }

  async fn list_evaluations(&self, query: &EvaluationQuery) -> Result<Vec<EvaluationRow>> {
    let user_id = query.user_id;
    let group_code = query.group_code.as_deref().map(normalize_group_code).transpose()?;
    let dimension_code = query.dimension_code.clone();
    let limit = query.limit.map_or(-1, |l| l as i64);
    let offset = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawEvaluationRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT e.id, e.usuario_id, u.username, e.codigo_grupo, g.nombre_propuesta,
                  d.codigo, d.nombre, a.id, a.nombre, e.resultado, e.observacion,
                  e.fecha_registro
           FROM evaluaciones e
           JOIN usuarios    u ON u.id     = e.usuario_id
           JOIN grupos      g ON g.codigo = e.codigo_grupo
           JOIN aspectos    a ON a.id     = e.aspecto_id
           JOIN dimensiones d ON d.id     = a.dimension_id
           WHERE (?1 IS NULL OR e.usuario_id   = ?1)
             AND (?2 IS NULL OR e.codigo_grupo = ?2)
             AND (?3 IS NULL OR d.codigo       = ?3)
           ORDER BY e.codigo_grupo, u.username, d.orden, a.orden, e.id
           LIMIT ?4 OFFSET ?5",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![user_id, group_code, dimension_code, limit, offset],
            |row| {
              Ok(RawEvaluationRow {
                evaluation_id:  row.get(0)?,
                user_id:        row.get(1)?,
                curator:        row.get(2)?,
                group_code:     row.get(3)?,
                proposal_name:  row.get(4)?,
                dimension_code: row.get(5)?,
                dimension_name: row.get(6)?,
                aspect_id:      row.get(7)?,
                aspect_name:    row.get(8)?,
                result:         row.get(9)?,
                observation:    row.get(10)?,
                recorded_at:    row.get(11)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvaluationRow::into_row).collect()
  }
}

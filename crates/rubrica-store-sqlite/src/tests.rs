//! Integration tests for `SqliteStore` against an in-memory database.

use rubrica_core::{
  evaluation::{EvaluationQuery, NewEvaluation, NewEvaluationPass, Score},
  ledger::EvaluationLedger,
  principal::{Principal, Role},
  roster::Group,
  sync::SyncWarning,
  taxonomy::TaxonomyDefinition,
  validate::ObservationPolicy,
};

use crate::{Error, SqliteStore};

const OBSERVATION: &str = "Buena ejecución de los pasos básicos";

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn group(code: &str) -> Group {
  Group {
    code:          code.to_owned(),
    proposal_name: format!("Propuesta {code}"),
    modality:      "Danza".to_owned(),
    kind:          "Tradicional".to_owned(),
    size:          Some("Mediano".to_owned()),
    nature:        None,
    event_year:    2025,
  }
}

fn dim1(aspects: &[&str]) -> TaxonomyDefinition {
  TaxonomyDefinition::new().with_dimension("DIM1", "Técnica", aspects.iter().copied())
}

async fn curator(s: &SqliteStore, username: &str) -> Principal {
  s.create_user(username, "$argon2id$test", Role::Curator)
    .await
    .unwrap();
  s.principal(username).await.unwrap().expect("active user")
}

/// Store with DIM1 [A, B], one curator and group G-01.
async fn seeded() -> (SqliteStore, Principal) {
  let s = store().await;
  s.synchronize(&dim1(&["A", "B"])).await.unwrap();
  s.register_groups(&[group("G-01")]).await.unwrap();
  let p = curator(&s, "ana").await;
  (s, p)
}

async fn aspect_id(s: &SqliteStore, dimension: &str, name: &str) -> i64 {
  let snap = s.load_taxonomy().await.unwrap();
  snap
    .dimension(dimension)
    .and_then(|d| d.aspects.iter().find(|a| a.name == name))
    .map(|a| a.aspect_id)
    .expect("aspect present")
}

async fn aspect_orders(s: &SqliteStore, dimension: &str) -> Vec<(String, i64)> {
  let snap = s.load_taxonomy().await.unwrap();
  snap
    .dimension(dimension)
    .expect("dimension present")
    .aspects
    .iter()
    .map(|a| (a.name.clone(), a.order))
    .collect()
}

// ─── Synchronization ─────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_into_empty_store_creates_everything_in_order() {
  let s = store().await;

  let summary = s.synchronize(&dim1(&["A", "B"])).await.unwrap();
  assert_eq!(summary.dimensions.created, 1);
  assert_eq!(summary.aspects.created, 2);
  assert!(summary.warnings.is_empty());
  assert!(summary.finished_at.is_some());

  let snap = s.load_taxonomy().await.unwrap();
  assert_eq!(snap.dimensions.len(), 1);
  assert_eq!(snap.dimensions[0].order, 1);
  assert_eq!(aspect_orders(&s, "DIM1").await, vec![("A".into(), 1), ("B".into(), 2)]);

  assert!(s.verify_integrity().await.unwrap().is_clean());
}

#[tokio::test]
async fn second_run_with_same_definition_changes_nothing() {
  let s = store().await;
  let def = dim1(&["A", "B"])
    .with_dimension("DIM2", "Identidad", ["Su historia"])
    .with_ficha("F1", "Ficha uno", "")
    .with_ficha_dimensions("F1", ["DIM2", "DIM1"]);

  let first = s.synchronize(&def).await.unwrap();
  assert!(first.mutations() > 0);
  let before = s.load_taxonomy().await.unwrap();
  let logs_before = s.recent_logs(100).await.unwrap().len();

  let second = s.synchronize(&def).await.unwrap();
  assert_eq!(second.mutations(), 0);
  assert_eq!(second.aspects.unchanged, 3);
  assert_eq!(second.ficha_dimensions.unchanged, 2);
  assert_eq!(second.fingerprint, first.fingerprint);
  assert_eq!(s.load_taxonomy().await.unwrap(), before);
  // No-op runs leave no audit entry.
  assert_eq!(s.recent_logs(100).await.unwrap().len(), logs_before);
}

#[tokio::test]
async fn reordering_aspects_keeps_ids() {
  let s = store().await;
  s.synchronize(&dim1(&["A", "B", "C"])).await.unwrap();
  let a = aspect_id(&s, "DIM1", "A").await;
  let c = aspect_id(&s, "DIM1", "C").await;

  let summary = s.synchronize(&dim1(&["C", "A", "B"])).await.unwrap();
  assert_eq!(summary.aspects.updated, 3);
  assert_eq!(summary.aspects.created, 0);
  assert_eq!(summary.aspects.deleted, 0);

  assert_eq!(
    aspect_orders(&s, "DIM1").await,
    vec![("C".into(), 1), ("A".into(), 2), ("B".into(), 3)]
  );
  assert_eq!(aspect_id(&s, "DIM1", "A").await, a);
  assert_eq!(aspect_id(&s, "DIM1", "C").await, c);
}

#[tokio::test]
async fn dimension_rename_updates_in_place() {
  let s = store().await;
  s.synchronize(&dim1(&["A"])).await.unwrap();
  let before = s.load_taxonomy().await.unwrap().dimensions[0].dimension_id;

  let renamed = TaxonomyDefinition::new().with_dimension("DIM1", "Técnica dancística", ["A"]);
  let summary = s.synchronize(&renamed).await.unwrap();
  assert_eq!(summary.dimensions.updated, 1);

  let snap = s.load_taxonomy().await.unwrap();
  assert_eq!(snap.dimensions[0].dimension_id, before);
  assert_eq!(snap.dimensions[0].name, "Técnica dancística");
}

#[tokio::test]
async fn referenced_aspect_is_retained_with_warning() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;
  s.create_evaluation(&p, NewEvaluation::new("G-01", a, 2, OBSERVATION))
    .await
    .unwrap();

  let report = s.run(&dim1(&["B"])).await.unwrap();
  let summary = &report.summary;
  assert_eq!(summary.aspects.deleted, 0);
  assert_eq!(summary.aspects.retained, 1);
  assert_eq!(summary.retained_aspects().count(), 1);
  assert!(matches!(
    &summary.warnings[0],
    SyncWarning::AspectRetained { aspect, evaluations: 1, aspect_id: id, .. }
      if aspect == "A" && *id == a
  ));
  assert!(report.integrity.is_clean());

  // Declared aspects first, the retained one after them.
  assert_eq!(aspect_orders(&s, "DIM1").await, vec![("B".into(), 1), ("A".into(), 2)]);
  assert_eq!(aspect_id(&s, "DIM1", "A").await, a);

  let rows = s.list_evaluations(&EvaluationQuery::default()).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].aspect_name, "A");
}

#[tokio::test]
async fn retained_aspect_survives_repeated_runs() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;
  s.create_evaluation(&p, NewEvaluation::new("G-01", a, 2, OBSERVATION))
    .await
    .unwrap();

  let first = s.synchronize(&dim1(&["B", "C"])).await.unwrap();
  assert_eq!(first.aspects.retained, 1);
  let second = s.synchronize(&dim1(&["B", "C"])).await.unwrap();
  assert_eq!(second.mutations(), 0);
  assert_eq!(second.aspects.deleted, 0);

  assert_eq!(aspect_orders(&s, "DIM1").await, vec![
    ("B".into(), 1),
    ("C".into(), 2),
    ("A".into(), 3),
  ]);
  assert_eq!(aspect_id(&s, "DIM1", "A").await, a);

  let rows = s.list_evaluations(&EvaluationQuery::default()).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].aspect_name, "A");
  assert_eq!(rows[0].result, Score::Met);
  assert!(s.verify_integrity().await.unwrap().is_clean());
}

#[tokio::test]
async fn unreferenced_aspect_is_deleted_and_audited() {
  let s = store().await;
  s.synchronize(&dim1(&["A", "B"])).await.unwrap();

  let summary = s.synchronize(&dim1(&["B"])).await.unwrap();
  assert_eq!(summary.aspects.deleted, 1);
  assert!(summary.warnings.is_empty());
  assert_eq!(aspect_orders(&s, "DIM1").await, vec![("B".into(), 1)]);

  let logs = s.recent_logs(10).await.unwrap();
  assert!(logs.iter().any(|l| l.action == "ASPECT_DELETED"));
  assert_eq!(logs[0].action, "TAXONOMY_SYNCED");
}

#[tokio::test]
async fn aspect_rename_is_removal_plus_insert() {
  let s = store().await;
  s.synchronize(&dim1(&["A", "B"])).await.unwrap();

  let summary = s.synchronize(&dim1(&["A", "B2"])).await.unwrap();
  assert_eq!(summary.aspects.created, 1);
  assert_eq!(summary.aspects.deleted, 1);
  assert_eq!(summary.aspects.unchanged, 1);
  assert_eq!(aspect_orders(&s, "DIM1").await, vec![("A".into(), 1), ("B2".into(), 2)]);
}

#[tokio::test]
async fn undeclared_dimension_is_kept_and_moved_last() {
  let s = store().await;
  s.synchronize(&dim1(&["A"]).with_dimension("DIM2", "Identidad", ["X"]))
    .await
    .unwrap();

  let only_dim2 = TaxonomyDefinition::new().with_dimension("DIM2", "Identidad", ["X"]);
  let summary = s.synchronize(&only_dim2).await.unwrap();
  assert_eq!(summary.dimensions.retained, 1);
  assert_eq!(summary.dimensions.deleted, 0);
  assert!(
    summary
      .warnings
      .contains(&SyncWarning::DimensionNotDeclared { code: "DIM1".into() })
  );

  let snap = s.load_taxonomy().await.unwrap();
  let orders: Vec<_> = snap.dimensions.iter().map(|d| (d.code.as_str(), d.order)).collect();
  assert_eq!(orders, vec![("DIM2", 1), ("DIM1", 2)]);
  // Its aspects are untouched.
  assert_eq!(aspect_orders(&s, "DIM1").await, vec![("A".into(), 1)]);
}

#[tokio::test]
async fn undeclared_ficha_is_kept() {
  let s = store().await;
  s.synchronize(&dim1(&["A"]).with_ficha("F1", "Uno", "").with_ficha("F2", "Dos", ""))
    .await
    .unwrap();

  let summary = s
    .synchronize(&dim1(&["A"]).with_ficha("F1", "Uno", "nueva descripción"))
    .await
    .unwrap();
  assert_eq!(summary.fichas.updated, 1);
  assert_eq!(summary.fichas.retained, 1);
  assert!(
    summary
      .warnings
      .contains(&SyncWarning::FichaNotDeclared { code: "F2".into() })
  );

  let snap = s.load_taxonomy().await.unwrap();
  assert_eq!(snap.fichas.len(), 2);
  assert_eq!(snap.ficha("F1").unwrap().description, "nueva descripción");
}

#[tokio::test]
async fn ficha_links_follow_the_definition() {
  let s = store().await;
  let base = dim1(&["A"])
    .with_dimension("DIM2", "Identidad", ["X"])
    .with_dimension("DIM3", "Innovación", ["Y"])
    .with_ficha("F1", "Uno", "");

  s.synchronize(&base.clone().with_ficha_dimensions("F1", ["DIM1", "DIM2"]))
    .await
    .unwrap();

  let summary = s
    .synchronize(&base.with_ficha_dimensions("F1", ["DIM3", "DIM1"]))
    .await
    .unwrap();
  assert_eq!(summary.ficha_dimensions.created, 1);
  assert_eq!(summary.ficha_dimensions.updated, 1);
  assert_eq!(summary.ficha_dimensions.deleted, 1);

  let snap = s.load_taxonomy().await.unwrap();
  let links: Vec<_> = snap
    .ficha("F1")
    .unwrap()
    .dimensions
    .iter()
    .map(|l| (l.dimension_code.as_str(), l.order))
    .collect();
  assert_eq!(links, vec![("DIM3", 1), ("DIM1", 2)]);

  let logs = s.recent_logs(10).await.unwrap();
  assert!(logs.iter().any(|l| l.action == "FICHA_LINK_DELETED"));
}

#[tokio::test]
async fn unknown_ficha_map_references_are_warnings() {
  let s = store().await;
  let def = dim1(&["A"])
    .with_ficha("F1", "Uno", "")
    .with_ficha_dimensions("F1", ["NOPE", "DIM1"])
    .with_ficha_dimensions("F9", ["DIM1"]);

  let summary = s.synchronize(&def).await.unwrap();
  assert_eq!(summary.ficha_dimensions.created, 1);
  assert!(summary.warnings.contains(&SyncWarning::UnknownFicha { ficha_code: "F9".into() }));
  assert!(summary.warnings.contains(&SyncWarning::UnknownDimension {
    ficha_code:     "F1".into(),
    dimension_code: "NOPE".into(),
  }));

  let snap = s.load_taxonomy().await.unwrap();
  assert_eq!(snap.ficha("F1").unwrap().dimensions[0].order, 1);
}

#[tokio::test]
async fn failed_run_rolls_back_every_level() {
  let s = store().await;
  s.synchronize(&dim1(&["A", "B"])).await.unwrap();
  s.conn
    .call(|conn| {
      conn.execute_batch(
        "CREATE TRIGGER boom BEFORE INSERT ON aspectos
         WHEN NEW.nombre = 'BOOM'
         BEGIN SELECT RAISE(ABORT, 'boom'); END;",
      )?;
      Ok(())
    })
    .await
    .unwrap();
  let before = s.load_taxonomy().await.unwrap();
  let logs_before = s.recent_logs(100).await.unwrap().len();

  let def = TaxonomyDefinition::new()
    .with_dimension("DIM1", "Renombrada", ["B"])
    .with_dimension("DIM2", "Identidad", ["X", "BOOM"]);
  assert!(s.synchronize(&def).await.is_err());

  assert_eq!(s.load_taxonomy().await.unwrap(), before);
  assert_eq!(s.recent_logs(100).await.unwrap().len(), logs_before);
}

#[tokio::test]
async fn invalid_definition_is_rejected_before_any_write() {
  let s = store().await;
  let def = dim1(&["A", "A"]);

  let err = s.synchronize(&def).await.unwrap_err();
  assert!(err.is_validation());
  assert!(s.load_taxonomy().await.unwrap().dimensions.is_empty());

  // Duplicate codes never reach the UNIQUE constraints.
  let def = dim1(&["A"]).with_dimension("DIM1", "Otra", ["B"]);
  let err = s.initialize(&def).await.unwrap_err();
  assert!(err.is_validation(), "{err:?}");
  assert!(!err.is_constraint_violation(), "{err:?}");
  assert!(s.load_taxonomy().await.unwrap().dimensions.is_empty());
}

#[tokio::test]
async fn initialize_only_runs_on_an_empty_store() {
  let s = store().await;
  let first = s.initialize(&dim1(&["A"])).await.unwrap();
  assert!(first.is_some());

  let second = s.initialize(&dim1(&["A", "B"])).await.unwrap();
  assert!(second.is_none());
  assert_eq!(aspect_orders(&s, "DIM1").await, vec![("A".into(), 1)]);
}

#[tokio::test]
async fn run_reports_orphans_as_integrity_violation() {
  let (s, p) = seeded().await;
  s.conn
    .call(move |conn| {
      conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
      conn.execute(
        "INSERT INTO evaluaciones (usuario_id, codigo_grupo, aspecto_id, resultado, observacion)
         VALUES (?1, 'G-01', 9999, 1, 'Observación huérfana de prueba')",
        rusqlite::params![p.user_id],
      )?;
      conn.execute("UPDATE grupos SET ficha_id = 4242 WHERE codigo = 'G-01'", [])?;
      Ok(())
    })
    .await
    .unwrap();

  let report = s.verify_integrity().await.unwrap();
  assert_eq!(report.orphaned_evaluations.len(), 1);
  assert_eq!(report.orphaned_group_fichas, vec!["G-01".to_owned()]);

  match s.run(&dim1(&["A", "B"])).await {
    Err(Error::IntegrityViolation(report)) => {
      assert_eq!(report.summary.mutations(), 0);
      assert!(!report.integrity.is_clean());
    }
    other => panic!("expected integrity violation, got {other:?}"),
  }
}

// ─── Evaluations ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_evaluation_records_and_audits() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;

  let ev = s
    .create_evaluation(&p, NewEvaluation::new(" g-01 ", a, 1, format!("  {OBSERVATION}  ")))
    .await
    .unwrap();
  assert_eq!(ev.group_code, "G-01");
  assert_eq!(ev.result, Score::Partial);
  assert_eq!(ev.observation, OBSERVATION);
  assert_eq!(ev.user_id, p.user_id);

  assert!(s.evaluation_exists(p.user_id, "g-01").await.unwrap());
  let logs = s.recent_logs(1).await.unwrap();
  assert_eq!(logs[0].action, "EVALUATION_CREATED");
  assert_eq!(logs[0].actor.as_deref(), Some("ana"));
}

#[tokio::test]
async fn duplicate_evaluation_is_a_constraint_violation() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;

  s.create_evaluation(&p, NewEvaluation::new("G-01", a, 2, OBSERVATION))
    .await
    .unwrap();
  let err = s
    .create_evaluation(&p, NewEvaluation::new("G-01", a, 0, "Segunda observación distinta aquí"))
    .await
    .unwrap_err();
  assert!(err.is_constraint_violation(), "{err:?}");

  let rows = s.list_evaluations(&EvaluationQuery::default()).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].result, Score::Met);
}

#[tokio::test]
async fn invalid_input_writes_nothing() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;

  let bad = [
    NewEvaluation::new("G-01", a, 3, OBSERVATION),
    NewEvaluation::new("G-01", a, 1, "corta"),
    NewEvaluation::new("G-01", a, 1, "   "),
    NewEvaluation::new("G-01", a, 1, "sin observaciones"),
    NewEvaluation::new("---", a, 1, OBSERVATION),
  ];
  for input in bad {
    let err = s.create_evaluation(&p, input).await.unwrap_err();
    assert!(err.is_validation(), "{err:?}");
  }

  assert!(!s.evaluation_exists(p.user_id, "G-01").await.unwrap());
}

#[tokio::test]
async fn unknown_group_or_aspect_is_rejected() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;

  let err = s
    .create_evaluation(&p, NewEvaluation::new("G-99", a, 1, OBSERVATION))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::GroupNotFound(ref c) if c == "G-99"));

  let err = s
    .create_evaluation(&p, NewEvaluation::new("G-01", 9999, 1, OBSERVATION))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::AspectNotFound(9999)));
}

#[tokio::test]
async fn committee_members_cannot_evaluate() {
  let (s, _) = seeded().await;
  s.create_user("comite1", "$argon2id$test", Role::Committee)
    .await
    .unwrap();
  let member = s.principal("comite1").await.unwrap().unwrap();
  let a = aspect_id(&s, "DIM1", "A").await;

  let err = s
    .create_evaluation(&member, NewEvaluation::new("G-01", a, 1, OBSERVATION))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotPermitted { role: Role::Committee, .. }));
}

#[tokio::test]
async fn configured_minimum_applies_above_the_floor() {
  let (s, p) = seeded().await;
  let s = s.with_observation_policy(ObservationPolicy::with_min_chars(60));
  let a = aspect_id(&s, "DIM1", "A").await;

  let err = s
    .create_evaluation(&p, NewEvaluation::new("G-01", a, 1, OBSERVATION))
    .await
    .unwrap_err();
  assert!(err.is_validation());
}

#[tokio::test]
async fn configured_minimum_below_the_floor_is_raised() {
  let (s, p) = seeded().await;
  let s = s.with_observation_policy(ObservationPolicy::with_min_chars(5));
  let a = aspect_id(&s, "DIM1", "A").await;

  // Nineteen characters: the storage CHECK would refuse it too.
  let err = s
    .create_evaluation(&p, NewEvaluation::new("G-01", a, 1, "uno dos tres cuatro"))
    .await
    .unwrap_err();
  assert!(err.is_validation(), "{err:?}");
  assert!(!err.is_constraint_violation(), "{err:?}");
  assert!(!s.evaluation_exists(p.user_id, "G-01").await.unwrap());
}

#[tokio::test]
async fn list_evaluations_filters_and_orders() {
  let (s, ana) = seeded().await;
  let luis = curator(&s, "luis").await;
  s.register_groups(&[group("G-02")]).await.unwrap();
  let a = aspect_id(&s, "DIM1", "A").await;
  let b = aspect_id(&s, "DIM1", "B").await;

  for (p, g, asp) in [(&ana, "G-01", b), (&ana, "G-01", a), (&luis, "G-01", a), (&ana, "G-02", a)] {
    s.create_evaluation(p, NewEvaluation::new(g, asp, 2, OBSERVATION))
      .await
      .unwrap();
  }

  let all = s.list_evaluations(&EvaluationQuery::default()).await.unwrap();
  assert_eq!(all.len(), 4);
  let order: Vec<_> = all
    .iter()
    .map(|r| (r.group_code.as_str(), r.curator.as_str(), r.aspect_name.as_str()))
    .collect();
  assert_eq!(order, vec![
    ("G-01", "ana", "A"),
    ("G-01", "ana", "B"),
    ("G-01", "luis", "A"),
    ("G-02", "ana", "A"),
  ]);

  let q = EvaluationQuery { user_id: Some(ana.user_id), group_code: Some("g-01".into()), ..Default::default() };
  assert_eq!(s.list_evaluations(&q).await.unwrap().len(), 2);

  let q = EvaluationQuery { limit: Some(1), offset: Some(3), ..Default::default() };
  let page = s.list_evaluations(&q).await.unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].group_code, "G-02");

  let q = EvaluationQuery { dimension_code: Some("DIM9".into()), ..Default::default() };
  assert!(s.list_evaluations(&q).await.unwrap().is_empty());
}

#[tokio::test]
async fn group_scores_average_per_dimension() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;
  let b = aspect_id(&s, "DIM1", "B").await;
  s.create_evaluation(&p, NewEvaluation::new("G-01", a, 2, OBSERVATION)).await.unwrap();
  s.create_evaluation(&p, NewEvaluation::new("G-01", b, 1, OBSERVATION)).await.unwrap();

  let scores = s.group_scores("G-01").await.unwrap();
  assert_eq!(scores.len(), 1);
  assert_eq!(scores[0].dimension_code, "DIM1");
  assert_eq!(scores[0].evaluations, 2);
  assert!((scores[0].average - 1.5).abs() < f64::EPSILON);
}

// ── Passes ───────────────────────────────────────────────────────────────────

/// DIM1 [A, B] and DIM2 [X]; G-01 uses ficha DANZA, which lists only DIM1.
async fn seeded_with_ficha() -> (SqliteStore, Principal) {
  let s = store().await;
  let def = dim1(&["A", "B"])
    .with_dimension("DIM2", "Identidad", ["X"])
    .with_ficha("DANZA", "Danza tradicional", "")
    .with_ficha_dimensions("DANZA", ["DIM1"]);
  s.synchronize(&def).await.unwrap();
  s.register_groups(&[group("G-01")]).await.unwrap();
  s.assign_ficha("G-01", "DANZA").await.unwrap();
  let p = curator(&s, "ana").await;
  (s, p)
}

#[tokio::test]
async fn complete_pass_is_recorded_with_one_audit_entry() {
  let (s, p) = seeded_with_ficha().await;
  let a = aspect_id(&s, "DIM1", "A").await;
  let b = aspect_id(&s, "DIM1", "B").await;

  let pass = NewEvaluationPass::new("g-01")
    .score(a, 2, OBSERVATION)
    .score(b, 1, "Relación con la música algo irregular");
  let created = s.create_evaluation_pass(&p, pass).await.unwrap();
  assert_eq!(created.len(), 2);
  assert!(created.iter().all(|e| e.group_code == "G-01" && e.user_id == p.user_id));
  assert_eq!(created[1].result, Score::Partial);

  let rows = s.list_evaluations(&EvaluationQuery::default()).await.unwrap();
  assert_eq!(rows.len(), 2);

  let logs = s.recent_logs(10).await.unwrap();
  let pass_logs = logs.iter().filter(|l| l.action == "EVALUATION_PASS_CREATED").count();
  assert_eq!(pass_logs, 1);
  assert!(logs.iter().all(|l| l.action != "EVALUATION_CREATED"));
}

#[tokio::test]
async fn incomplete_pass_is_rejected() {
  let (s, p) = seeded_with_ficha().await;
  let a = aspect_id(&s, "DIM1", "A").await;
  let b = aspect_id(&s, "DIM1", "B").await;

  let err = s
    .create_evaluation_pass(&p, NewEvaluationPass::new("G-01").score(a, 2, OBSERVATION))
    .await
    .unwrap_err();
  assert!(err.is_validation(), "{err:?}");
  assert!(matches!(
    &err,
    Error::IncompletePass { missing, unexpected, .. } if *missing == vec![b] && unexpected.is_empty()
  ));
  assert!(!s.evaluation_exists(p.user_id, "G-01").await.unwrap());
}

#[tokio::test]
async fn pass_outside_the_rubric_is_rejected() {
  let (s, p) = seeded_with_ficha().await;
  let a = aspect_id(&s, "DIM1", "A").await;
  let b = aspect_id(&s, "DIM1", "B").await;
  let x = aspect_id(&s, "DIM2", "X").await;

  let pass = NewEvaluationPass::new("G-01")
    .score(a, 2, OBSERVATION)
    .score(b, 2, OBSERVATION)
    .score(x, 2, OBSERVATION);
  let err = s.create_evaluation_pass(&p, pass).await.unwrap_err();
  assert!(matches!(
    &err,
    Error::IncompletePass { missing, unexpected, .. } if missing.is_empty() && *unexpected == vec![x]
  ));
  assert!(!s.evaluation_exists(p.user_id, "G-01").await.unwrap());
}

#[tokio::test]
async fn pass_without_ficha_is_rejected() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;

  let err = s
    .create_evaluation_pass(&p, NewEvaluationPass::new("G-01").score(a, 2, OBSERVATION))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NoFichaAssigned(_)));
}

#[tokio::test]
async fn pass_colliding_with_an_existing_row_writes_nothing() {
  let (s, p) = seeded_with_ficha().await;
  let a = aspect_id(&s, "DIM1", "A").await;
  let b = aspect_id(&s, "DIM1", "B").await;
  s.create_evaluation(&p, NewEvaluation::new("G-01", a, 0, OBSERVATION))
    .await
    .unwrap();

  let pass = NewEvaluationPass::new("G-01")
    .score(b, 2, OBSERVATION)
    .score(a, 2, OBSERVATION);
  let err = s.create_evaluation_pass(&p, pass).await.unwrap_err();
  assert!(err.is_constraint_violation(), "{err:?}");

  // B was inserted before the collision and rolled back with it.
  let rows = s.list_evaluations(&EvaluationQuery::default()).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].aspect_id, a);
  assert_eq!(rows[0].result, Score::NotMet);

  let logs = s.recent_logs(10).await.unwrap();
  assert!(logs.iter().all(|l| l.action != "EVALUATION_PASS_CREATED"));
}

#[tokio::test]
async fn committee_members_cannot_submit_a_pass() {
  let (s, _) = seeded_with_ficha().await;
  s.create_user("comite1", "$argon2id$test", Role::Committee)
    .await
    .unwrap();
  let member = s.principal("comite1").await.unwrap().unwrap();
  let a = aspect_id(&s, "DIM1", "A").await;

  let err = s
    .create_evaluation_pass(&member, NewEvaluationPass::new("G-01").score(a, 2, OBSERVATION))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotPermitted { .. }));
}

// ── Administration ───────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_evaluations_is_audited() {
  let (s, p) = seeded().await;
  let a = aspect_id(&s, "DIM1", "A").await;
  s.create_evaluation(&p, NewEvaluation::new("G-01", a, 2, OBSERVATION)).await.unwrap();

  let deleted = s.delete_evaluations("admin", p.user_id, "G-01").await.unwrap();
  assert_eq!(deleted, 1);
  assert!(!s.evaluation_exists(p.user_id, "G-01").await.unwrap());

  let logs = s.recent_logs(1).await.unwrap();
  assert_eq!(logs[0].action, "EVALUATIONS_DELETED");
  assert_eq!(logs[0].actor.as_deref(), Some("admin"));

  // Once the evaluation is gone the aspect can be removed.
  let summary = s.synchronize(&dim1(&["B"])).await.unwrap();
  assert_eq!(summary.aspects.deleted, 1);
}

// ─── Users and roster ────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_username_is_a_constraint_violation() {
  let (s, _) = seeded().await;
  let err = s
    .create_user("ana", "$argon2id$other", Role::Committee)
    .await
    .unwrap_err();
  assert!(err.is_constraint_violation());
}

#[tokio::test]
async fn register_groups_upserts_by_normalised_code() {
  let s = store().await;
  assert_eq!(s.register_groups(&[group("g-01"), group("G-02")]).await.unwrap(), 2);

  let mut renamed = group("G-01");
  renamed.proposal_name = "Otra propuesta".into();
  s.register_groups(&[renamed]).await.unwrap();

  assert!(s.group_exists("g-01").await.unwrap());
  assert!(!s.group_exists("G-03").await.unwrap());
}

#[tokio::test]
async fn rubric_follows_the_assigned_ficha() {
  let s = store().await;
  let def = dim1(&["A", "B"])
    .with_dimension("DIM2", "Identidad", ["X"])
    .with_ficha("DANZA", "Danza tradicional", "")
    .with_ficha_dimensions("DANZA", ["DIM2", "DIM1"]);
  s.synchronize(&def).await.unwrap();
  s.register_groups(&[group("G-01")]).await.unwrap();

  assert!(matches!(
    s.rubric_for_group("G-01").await.unwrap_err(),
    Error::NoFichaAssigned(_)
  ));
  assert!(matches!(
    s.assign_ficha("G-01", "nope").await.unwrap_err(),
    Error::FichaNotFound(_)
  ));
  assert!(matches!(
    s.assign_ficha("G-99", "danza").await.unwrap_err(),
    Error::GroupNotFound(_)
  ));

  s.assign_ficha("g-01", "danza").await.unwrap();
  let rubric = s.rubric_for_group("G-01").await.unwrap();
  let codes: Vec<_> = rubric.iter().map(|d| d.code.as_str()).collect();
  assert_eq!(codes, vec!["DIM2", "DIM1"]);
  assert_eq!(rubric[1].aspects.len(), 2);
}

//! SQL schema for the Rubrica SQLite store.
//!
//! Executed once at connection startup. Table and column names match the
//! database the evaluation app already ships with, so an existing file opens
//! unchanged. Future migrations will be gated on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS usuarios (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    username       TEXT UNIQUE NOT NULL,
    password_hash  TEXT NOT NULL,
    rol            TEXT NOT NULL CHECK (rol IN ('curador', 'comite')),
    activo         INTEGER NOT NULL DEFAULT 1,
    fecha_creacion TEXT DEFAULT CURRENT_TIMESTAMP,
    CHECK (length(username) >= 3)
);

CREATE TABLE IF NOT EXISTS dimensiones (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    codigo      TEXT UNIQUE NOT NULL,   -- stable business key, never renamed
    nombre      TEXT NOT NULL,
    descripcion TEXT,
    orden       INTEGER NOT NULL,
    CHECK (orden > 0)
);

CREATE TABLE IF NOT EXISTS aspectos (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    dimension_id INTEGER NOT NULL REFERENCES dimensiones(id) ON DELETE CASCADE,
    nombre       TEXT NOT NULL,
    descripcion  TEXT,
    orden        INTEGER NOT NULL,
    UNIQUE (dimension_id, nombre),
    CHECK  (orden > 0)
);

CREATE TABLE IF NOT EXISTS fichas (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    codigo      TEXT UNIQUE NOT NULL,
    nombre      TEXT NOT NULL,
    descripcion TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS ficha_dimensiones (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    ficha_id     INTEGER NOT NULL REFERENCES fichas(id) ON DELETE CASCADE,
    dimension_id INTEGER NOT NULL REFERENCES dimensiones(id) ON DELETE CASCADE,
    orden        INTEGER NOT NULL,
    UNIQUE (ficha_id, dimension_id),
    CHECK  (orden > 0)
);

-- External roster; only `codigo` matters to evaluations.
CREATE TABLE IF NOT EXISTS grupos (
    codigo           TEXT PRIMARY KEY,
    nombre_propuesta TEXT NOT NULL,
    modalidad        TEXT NOT NULL,
    tipo             TEXT NOT NULL,
    tamano           TEXT,
    naturaleza       TEXT,
    ano_evento       INTEGER NOT NULL,
    ficha_id         INTEGER REFERENCES fichas(id),
    CHECK (length(codigo) > 0 AND length(codigo) <= 50),
    CHECK (length(nombre_propuesta) >= 3)
);

-- Evaluations are written once and never updated.
-- Aspects are RESTRICT so a bypassed retention check fails loudly instead of
-- cascading into evaluator work.
CREATE TABLE IF NOT EXISTS evaluaciones (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario_id     INTEGER NOT NULL REFERENCES usuarios(id) ON DELETE CASCADE,
    codigo_grupo   TEXT NOT NULL REFERENCES grupos(codigo) ON DELETE CASCADE,
    aspecto_id     INTEGER NOT NULL REFERENCES aspectos(id) ON DELETE RESTRICT,
    resultado      INTEGER NOT NULL CHECK (resultado IN (0, 1, 2)),
    observacion    TEXT NOT NULL,
    fecha_registro TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (usuario_id, codigo_grupo, aspecto_id),
    CHECK  (length(observacion) >= 20)
);

CREATE TABLE IF NOT EXISTS logs_sistema (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario TEXT,
    accion  TEXT NOT NULL,
    detalle TEXT,
    fecha   TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_usuarios_rol            ON usuarios(rol);
CREATE INDEX IF NOT EXISTS idx_dimensiones_orden       ON dimensiones(orden);
CREATE INDEX IF NOT EXISTS idx_aspectos_dimension      ON aspectos(dimension_id);
CREATE INDEX IF NOT EXISTS idx_ficha_dimensiones_ficha ON ficha_dimensiones(ficha_id);
CREATE INDEX IF NOT EXISTS idx_grupos_ficha            ON grupos(ficha_id);
CREATE INDEX IF NOT EXISTS idx_evaluaciones_aspecto    ON evaluaciones(aspecto_id);
CREATE INDEX IF NOT EXISTS idx_evaluaciones_grupo      ON evaluaciones(codigo_grupo);
CREATE INDEX IF NOT EXISTS idx_logs_fecha              ON logs_sistema(fecha);

PRAGMA user_version = 1;
";

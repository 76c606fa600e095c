//! Relational layout of one snapshot. One table per entity kind; edge tables are
//! keyed by both endpoints plus the source location so repeated call sites survive.

use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 1;

/// Tables cleared by a snapshot replacement, children before parents.
pub(crate) const SNAPSHOT_TABLES: &[&str] = &[
    "type_edges",
    "call_edges",
    "imports",
    "instances",
    "class_methods",
    "classes",
    "fields",
    "constructors",
    "types",
    "functions",
    "modules",
];

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot_meta (
    id             INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    generation     INTEGER NOT NULL DEFAULT 0,
    loaded_at_ms   INTEGER,
    source         TEXT,
    warning_count  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS modules (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    path TEXT
);

CREATE TABLE IF NOT EXISTS functions (
    id          INTEGER PRIMARY KEY,
    module_id   INTEGER NOT NULL REFERENCES modules(id),
    module      TEXT NOT NULL,
    name        TEXT NOT NULL,
    signature   TEXT,
    start_line  INTEGER,
    start_col   INTEGER,
    end_line    INTEGER,
    end_col     INTEGER,
    arity       INTEGER NOT NULL DEFAULT 0,
    branches    INTEGER NOT NULL DEFAULT 0,
    match_depth INTEGER NOT NULL DEFAULT 0,
    parent_id   INTEGER REFERENCES functions(id),
    UNIQUE (module, name)
);

CREATE TABLE IF NOT EXISTS types (
    id         INTEGER PRIMARY KEY,
    module_id  INTEGER NOT NULL REFERENCES modules(id),
    module     TEXT NOT NULL,
    name       TEXT NOT NULL,
    kind       TEXT NOT NULL,
    start_line INTEGER,
    start_col  INTEGER,
    end_line   INTEGER,
    end_col    INTEGER,
    UNIQUE (module, name)
);

CREATE TABLE IF NOT EXISTS constructors (
    type_id INTEGER NOT NULL REFERENCES types(id),
    ordinal INTEGER NOT NULL,
    name    TEXT NOT NULL,
    PRIMARY KEY (type_id, ordinal)
);

CREATE TABLE IF NOT EXISTS fields (
    type_id             INTEGER NOT NULL,
    constructor_ordinal INTEGER NOT NULL,
    ordinal             INTEGER NOT NULL,
    name                TEXT,
    type_module         TEXT NOT NULL,
    type_name           TEXT NOT NULL,
    target_id           INTEGER,
    PRIMARY KEY (type_id, constructor_ordinal, ordinal),
    FOREIGN KEY (type_id, constructor_ordinal) REFERENCES constructors(type_id, ordinal)
);

CREATE TABLE IF NOT EXISTS classes (
    id           INTEGER PRIMARY KEY,
    module_id    INTEGER NOT NULL REFERENCES modules(id),
    module       TEXT NOT NULL,
    name         TEXT NOT NULL,
    start_line   INTEGER,
    start_col    INTEGER,
    end_line     INTEGER,
    end_col      INTEGER,
    superclasses TEXT NOT NULL DEFAULT '[]',
    UNIQUE (module, name)
);

CREATE TABLE IF NOT EXISTS class_methods (
    class_id  INTEGER NOT NULL REFERENCES classes(id),
    ordinal   INTEGER NOT NULL,
    name      TEXT NOT NULL,
    signature TEXT,
    PRIMARY KEY (class_id, ordinal)
);

CREATE TABLE IF NOT EXISTS instances (
    id           INTEGER PRIMARY KEY,
    module_id    INTEGER NOT NULL REFERENCES modules(id),
    module       TEXT NOT NULL,
    class_module TEXT NOT NULL,
    class_name   TEXT NOT NULL,
    class_id     INTEGER,
    type_module  TEXT NOT NULL,
    type_name    TEXT NOT NULL,
    type_id      INTEGER,
    constraints  TEXT NOT NULL DEFAULT '[]',
    start_line   INTEGER,
    start_col    INTEGER,
    end_line     INTEGER,
    end_col      INTEGER
);

CREATE TABLE IF NOT EXISTS imports (
    id                 INTEGER PRIMARY KEY,
    module_id          INTEGER NOT NULL REFERENCES modules(id),
    module             TEXT NOT NULL,
    imported_module    TEXT NOT NULL,
    imported_module_id INTEGER,
    alias              TEXT,
    symbols            TEXT NOT NULL DEFAULT '[]',
    qualified          INTEGER NOT NULL DEFAULT 0,
    hiding             INTEGER NOT NULL DEFAULT 0,
    package            TEXT,
    line               INTEGER NOT NULL DEFAULT 0,
    col                INTEGER NOT NULL DEFAULT 0,
    UNIQUE (module_id, imported_module, line, col)
);

CREATE TABLE IF NOT EXISTS call_edges (
    caller_id     INTEGER NOT NULL REFERENCES functions(id),
    callee_id     INTEGER,
    callee_module TEXT NOT NULL,
    callee_name   TEXT NOT NULL,
    line          INTEGER NOT NULL,
    col           INTEGER NOT NULL,
    PRIMARY KEY (caller_id, callee_module, callee_name, line, col)
);

CREATE TABLE IF NOT EXISTS type_edges (
    source_kind   TEXT NOT NULL,
    source_id     INTEGER NOT NULL,
    target_id     INTEGER,
    target_module TEXT NOT NULL,
    target_name   TEXT NOT NULL,
    relation      TEXT NOT NULL,
    line          INTEGER NOT NULL,
    col           INTEGER NOT NULL,
    PRIMARY KEY (source_kind, source_id, target_module, target_name, relation, line, col)
);

CREATE INDEX IF NOT EXISTS idx_modules_name_nocase ON modules(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_functions_name_nocase ON functions(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_functions_module_id ON functions(module_id);
CREATE INDEX IF NOT EXISTS idx_functions_parent ON functions(parent_id) WHERE parent_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_types_name_nocase ON types(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_classes_name_nocase ON classes(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_instances_class ON instances(class_id);
CREATE INDEX IF NOT EXISTS idx_instances_type ON instances(type_id);
CREATE INDEX IF NOT EXISTS idx_imports_module ON imports(module_id);
CREATE INDEX IF NOT EXISTS idx_imports_imported ON imports(imported_module);
CREATE INDEX IF NOT EXISTS idx_call_edges_callee ON call_edges(callee_id);
CREATE INDEX IF NOT EXISTS idx_call_edges_callee_key ON call_edges(callee_module, callee_name);
CREATE INDEX IF NOT EXISTS idx_type_edges_target ON type_edges(target_id);
CREATE INDEX IF NOT EXISTS idx_type_edges_target_key ON type_edges(target_module, target_name);
"#;

/// Create every table and index if missing. Idempotent.
pub(crate) fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DDL)?;
    conn.execute(
        "INSERT OR IGNORE INTO snapshot_meta (id, schema_version, generation) VALUES (1, ?1, 0)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        let generation: i64 = conn
            .query_row("SELECT generation FROM snapshot_meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!(generation, 0);

        for table in SNAPSHOT_TABLES {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "{table}");
        }
    }
}

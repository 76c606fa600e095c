use crate::error::{Result, StoreError};
use crate::schema::{ensure_schema, SNAPSHOT_TABLES};
use crate::session::ReadSession;
use codefacts_facts::{Snapshot, Span};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bookkeeping stored next to a snapshot.
#[derive(Debug, Clone, Default)]
pub struct IngestMeta {
    pub source: Option<String>,
    pub warning_count: usize,
}

/// Row counts written by one successful replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceSummary {
    pub generation: i64,
    pub modules: usize,
    pub functions: usize,
    pub types: usize,
    pub classes: usize,
    pub instances: usize,
    pub imports: usize,
    pub call_edges: usize,
    pub type_edges: usize,
    pub time_ms: u64,
}

/// File-backed SQLite store holding exactly one snapshot at a time.
///
/// There is one writer connection guarded by a mutex. Every read goes through a
/// fresh [`ReadSession`], which in WAL mode keeps seeing the snapshot that was
/// committed when it started, whatever the writer does afterwards.
pub struct KnowledgeStore {
    path: PathBuf,
    writer: Mutex<Connection>,
    busy_timeout: Duration,
}

impl KnowledgeStore {
    /// Open (or create) the store at `path` and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |reason: String| StoreError::Unavailable {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| unavailable(format!("cannot create directory: {e}")))?;
        }

        let conn = Connection::open(&path)
            .map_err(|e| unavailable(format!("failed to open database: {e}")))?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| unavailable(format!("failed to set PRAGMA: {e}")))?;
        ensure_schema(&conn)?;

        log::debug!("Opened knowledge store at {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(conn),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a read session pinned to the currently committed snapshot.
    pub fn read(&self) -> Result<ReadSession> {
        ReadSession::begin(&self.path, self.busy_timeout)
    }

    /// Replace the whole snapshot in one transaction.
    ///
    /// Either every row of `snapshot` becomes visible together with a new
    /// generation number, or nothing changes.
    pub fn replace_snapshot(&self, snapshot: &Snapshot, meta: &IngestMeta) -> Result<ReplaceSummary> {
        let started = Instant::now();
        let mut conn = self.writer.lock().map_err(|_| StoreError::WriterPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for table in SNAPSHOT_TABLES {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        write_snapshot(&tx, snapshot)?;

        let loaded_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        tx.execute(
            "UPDATE snapshot_meta
             SET generation = generation + 1, loaded_at_ms = ?1, source = ?2, warning_count = ?3
             WHERE id = 1",
            params![loaded_at_ms, meta.source.as_deref(), meta.warning_count as i64],
        )?;
        let generation: i64 =
            tx.query_row("SELECT generation FROM snapshot_meta WHERE id = 1", [], |row| {
                row.get(0)
            })?;
        tx.commit()?;

        let summary = ReplaceSummary {
            generation,
            modules: snapshot.modules.len(),
            functions: snapshot.functions.len(),
            types: snapshot.types.len(),
            classes: snapshot.classes.len(),
            instances: snapshot.instances.len(),
            imports: snapshot.imports.len(),
            call_edges: snapshot.call_edges.len(),
            type_edges: snapshot.type_edges.len(),
            time_ms: started.elapsed().as_millis() as u64,
        };
        log::info!(
            "Committed snapshot generation {} ({} modules, {} functions, {} call edges) in {} ms",
            summary.generation,
            summary.modules,
            summary.functions,
            summary.call_edges,
            summary.time_ms
        );
        Ok(summary)
    }
}

fn span_params(span: Option<Span>) -> [Option<u32>; 4] {
    match span {
        Some(s) => [
            Some(s.start_line),
            Some(s.start_col),
            Some(s.end_line),
            Some(s.end_col),
        ],
        None => [None; 4],
    }
}

fn write_snapshot(tx: &Transaction<'_>, snapshot: &Snapshot) -> Result<()> {
    {
        let mut stmt = tx.prepare_cached("INSERT INTO modules (id, name, path) VALUES (?1, ?2, ?3)")?;
        for module in &snapshot.modules {
            stmt.execute(params![module.id, module.name, module.path])?;
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO functions (id, module_id, module, name, signature,
                 start_line, start_col, end_line, end_col, arity, branches, match_depth, parent_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for f in &snapshot.functions {
            let [sl, sc, el, ec] = span_params(f.span);
            stmt.execute(params![
                f.id,
                f.module_id,
                f.key.module,
                f.key.name,
                f.signature,
                sl,
                sc,
                el,
                ec,
                f.arity,
                f.branches,
                f.match_depth,
                f.parent_id
            ])?;
        }
    }

    {
        let mut types = tx.prepare_cached(
            "INSERT INTO types (id, module_id, module, name, kind, start_line, start_col, end_line, end_col)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        let mut constructors = tx.prepare_cached(
            "INSERT INTO constructors (type_id, ordinal, name) VALUES (?1, ?2, ?3)",
        )?;
        let mut fields = tx.prepare_cached(
            "INSERT INTO fields (type_id, constructor_ordinal, ordinal, name, type_module, type_name, target_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for ty in &snapshot.types {
            let [sl, sc, el, ec] = span_params(ty.span);
            types.execute(params![
                ty.id,
                ty.module_id,
                ty.key.module,
                ty.key.name,
                ty.kind.as_str(),
                sl,
                sc,
                el,
                ec
            ])?;
            for (c_idx, constructor) in ty.constructors.iter().enumerate() {
                constructors.execute(params![ty.id, c_idx as i64, constructor.name])?;
                for (f_idx, field) in constructor.fields.iter().enumerate() {
                    fields.execute(params![
                        ty.id,
                        c_idx as i64,
                        f_idx as i64,
                        field.name,
                        field.type_key.module,
                        field.type_key.name,
                        field.type_id
                    ])?;
                }
            }
        }
    }

    {
        let mut classes = tx.prepare_cached(
            "INSERT INTO classes (id, module_id, module, name, start_line, start_col, end_line, end_col, superclasses)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        let mut methods = tx.prepare_cached(
            "INSERT INTO class_methods (class_id, ordinal, name, signature) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for class in &snapshot.classes {
            let [sl, sc, el, ec] = span_params(class.span);
            classes.execute(params![
                class.id,
                class.module_id,
                class.key.module,
                class.key.name,
                sl,
                sc,
                el,
                ec,
                serde_json::to_string(&class.superclasses)?
            ])?;
            for (idx, method) in class.methods.iter().enumerate() {
                methods.execute(params![class.id, idx as i64, method.name, method.signature])?;
            }
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO instances (id, module_id, module, class_module, class_name, class_id,
                 type_module, type_name, type_id, constraints, start_line, start_col, end_line, end_col)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        for i in &snapshot.instances {
            let [sl, sc, el, ec] = span_params(i.span);
            stmt.execute(params![
                i.id,
                i.module_id,
                i.module,
                i.class_key.module,
                i.class_key.name,
                i.class_id,
                i.type_key.module,
                i.type_key.name,
                i.type_id,
                serde_json::to_string(&i.constraints)?,
                sl,
                sc,
                el,
                ec
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO imports (id, module_id, module, imported_module, imported_module_id, alias,
                 symbols, qualified, hiding, package, line, col)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for im in &snapshot.imports {
            stmt.execute(params![
                im.id,
                im.module_id,
                im.module,
                im.imported_module,
                im.imported_module_id,
                im.alias,
                serde_json::to_string(&im.symbols)?,
                im.qualified,
                im.hiding,
                im.package,
                im.location.line,
                im.location.col
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO call_edges (caller_id, callee_id, callee_module, callee_name, line, col)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for edge in &snapshot.call_edges {
            stmt.execute(params![
                edge.caller_id,
                edge.callee_id,
                edge.callee.module,
                edge.callee.name,
                edge.location.line,
                edge.location.col
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO type_edges (source_kind, source_id, target_id, target_module, target_name,
                 relation, line, col)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for edge in &snapshot.type_edges {
            stmt.execute(params![
                edge.source.as_str(),
                edge.source_id,
                edge.target_id,
                edge.target.module,
                edge.target.name,
                edge.relation.as_str(),
                edge.location.line,
                edge.location.col
            ])?;
        }
    }

    Ok(())
}

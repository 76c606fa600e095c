//! Row shapes returned by a [`ReadSession`](crate::ReadSession) and their column mappings.

use codefacts_facts::{
    Class, ClassMethod, Constructor, EdgeSource, EntityId, Function, Import, Instance, Location,
    Module, NaturalKey, Span, TypeDef, TypeKind, TypeRelation,
};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::Serialize;
use std::collections::BTreeSet;

/// A call site joined with its caller's natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub caller_id: EntityId,
    pub caller: NaturalKey,
    pub callee_id: Option<EntityId>,
    pub callee: NaturalKey,
    pub location: Location,
}

impl CallSite {
    pub fn is_dangling(&self) -> bool {
        self.callee_id.is_none()
    }
}

/// A type usage joined with the natural key of the using entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeUse {
    pub source: EdgeSource,
    pub source_id: EntityId,
    pub source_key: NaturalKey,
    pub target_id: Option<EntityId>,
    pub target: NaturalKey,
    pub relation: TypeRelation,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallCount {
    pub function: Function,
    pub calls: u64,
}

/// Call sites from functions of one module into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCallCount {
    pub caller_module: String,
    pub callee_module: String,
    pub calls: u64,
    /// Part of `calls` whose callee is not in the snapshot.
    pub dangling_calls: u64,
}

/// Base facts a complexity or similarity computation needs for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionFacts {
    pub function: Function,
    /// Outgoing call sites, dangling ones included.
    pub calls: u32,
    pub self_calls: u32,
    pub where_functions: u32,
    /// Distinct callee natural keys.
    pub callees: BTreeSet<NaturalKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeFacts {
    pub ty: TypeDef,
    pub self_referential: bool,
    pub outgoing: u32,
    pub incoming: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Function,
    Type,
    Class,
}

/// An entity whose span covers a source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedElement {
    pub kind: ElementKind,
    pub id: EntityId,
    pub key: NaturalKey,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCount {
    pub module: String,
    pub functions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub generation: i64,
    pub modules: u64,
    pub functions: u64,
    pub types: u64,
    pub classes: u64,
    pub instances: u64,
    pub imports: u64,
    pub call_edges: u64,
    pub dangling_call_edges: u64,
    pub type_edges: u64,
    pub dangling_type_edges: u64,
    pub top_modules: Vec<ModuleCount>,
}

/// Metadata of the snapshot a session is pinned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub generation: i64,
    pub loaded_at_ms: Option<i64>,
    pub source: Option<String>,
    pub warning_count: u64,
}

pub(crate) const MODULE_COLUMNS: &str = "m.id, m.name, m.path";

pub(crate) const FUNCTION_COLUMNS: &str = "f.id, f.module_id, f.module, f.name, f.signature, \
     f.start_line, f.start_col, f.end_line, f.end_col, f.arity, f.branches, f.match_depth, f.parent_id";
pub(crate) const FUNCTION_COLUMN_COUNT: usize = 13;

pub(crate) const TYPE_COLUMNS: &str =
    "t.id, t.module_id, t.module, t.name, t.kind, t.start_line, t.start_col, t.end_line, t.end_col";

pub(crate) const CLASS_COLUMNS: &str = "c.id, c.module_id, c.module, c.name, \
     c.start_line, c.start_col, c.end_line, c.end_col, c.superclasses";

pub(crate) const INSTANCE_COLUMNS: &str = "i.id, i.module_id, i.module, i.class_module, \
     i.class_name, i.class_id, i.type_module, i.type_name, i.type_id, i.constraints, \
     i.start_line, i.start_col, i.end_line, i.end_col";

pub(crate) const IMPORT_COLUMNS: &str = "im.id, im.module_id, im.module, im.imported_module, \
     im.imported_module_id, im.alias, im.symbols, im.qualified, im.hiding, im.package, im.line, im.col";

pub(crate) const CALL_SITE_SELECT: &str = "SELECT e.caller_id, c.module, c.name, e.callee_id, \
     e.callee_module, e.callee_name, e.line, e.col \
     FROM call_edges e JOIN functions c ON c.id = e.caller_id";

pub(crate) const TYPE_USE_SELECT: &str = "SELECT e.source_kind, e.source_id, \
     COALESCE(st.module, sf.module, ''), COALESCE(st.name, sf.name, ''), \
     e.target_id, e.target_module, e.target_name, e.relation, e.line, e.col \
     FROM type_edges e \
     LEFT JOIN types st ON e.source_kind = 'type' AND st.id = e.source_id \
     LEFT JOIN functions sf ON e.source_kind = 'function' AND sf.id = e.source_id";

pub(crate) fn span_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<Span>> {
    let start_line: Option<u32> = row.get(offset)?;
    let Some(start_line) = start_line else {
        return Ok(None);
    };
    Ok(Some(Span {
        start_line,
        start_col: row.get::<_, Option<u32>>(offset + 1)?.unwrap_or(0),
        end_line: row.get::<_, Option<u32>>(offset + 2)?.unwrap_or(start_line),
        end_col: row.get::<_, Option<u32>>(offset + 3)?.unwrap_or(0),
    }))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn module_from_row(row: &Row<'_>) -> rusqlite::Result<Module> {
    Ok(Module {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
    })
}

pub(crate) fn function_from_row_offset(row: &Row<'_>, offset: usize) -> rusqlite::Result<Function> {
    Ok(Function {
        id: row.get(offset)?,
        module_id: row.get(offset + 1)?,
        key: NaturalKey::new(row.get::<_, String>(offset + 2)?, row.get::<_, String>(offset + 3)?),
        signature: row.get(offset + 4)?,
        span: span_at(row, offset + 5)?,
        arity: row.get(offset + 9)?,
        branches: row.get(offset + 10)?,
        match_depth: row.get(offset + 11)?,
        parent_id: row.get(offset + 12)?,
    })
}

pub(crate) fn function_from_row(row: &Row<'_>) -> rusqlite::Result<Function> {
    function_from_row_offset(row, 0)
}

/// Constructors are loaded separately; see `ReadSession::attach_constructors`.
pub(crate) fn type_from_row(row: &Row<'_>) -> rusqlite::Result<TypeDef> {
    let kind: String = row.get(4)?;
    Ok(TypeDef {
        id: row.get(0)?,
        module_id: row.get(1)?,
        key: NaturalKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        kind: TypeKind::parse(&kind),
        span: span_at(row, 5)?,
        constructors: Vec::<Constructor>::new(),
    })
}

/// Methods are loaded separately; see `ReadSession::attach_methods`.
pub(crate) fn class_from_row(row: &Row<'_>) -> rusqlite::Result<Class> {
    Ok(Class {
        id: row.get(0)?,
        module_id: row.get(1)?,
        key: NaturalKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        span: span_at(row, 4)?,
        methods: Vec::<ClassMethod>::new(),
        superclasses: json_column(row, 8)?,
    })
}

pub(crate) fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<Instance> {
    Ok(Instance {
        id: row.get(0)?,
        module_id: row.get(1)?,
        module: row.get(2)?,
        class_key: NaturalKey::new(row.get::<_, String>(3)?, row.get::<_, String>(4)?),
        class_id: row.get(5)?,
        type_key: NaturalKey::new(row.get::<_, String>(6)?, row.get::<_, String>(7)?),
        type_id: row.get(8)?,
        constraints: json_column(row, 9)?,
        span: span_at(row, 10)?,
    })
}

pub(crate) fn import_from_row(row: &Row<'_>) -> rusqlite::Result<Import> {
    Ok(Import {
        id: row.get(0)?,
        module_id: row.get(1)?,
        module: row.get(2)?,
        imported_module: row.get(3)?,
        imported_module_id: row.get(4)?,
        alias: row.get(5)?,
        symbols: json_column(row, 6)?,
        qualified: row.get(7)?,
        hiding: row.get(8)?,
        package: row.get(9)?,
        location: Location::new(row.get(10)?, row.get(11)?),
    })
}

pub(crate) fn call_site_from_row(row: &Row<'_>) -> rusqlite::Result<CallSite> {
    Ok(CallSite {
        caller_id: row.get(0)?,
        caller: NaturalKey::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
        callee_id: row.get(3)?,
        callee: NaturalKey::new(row.get::<_, String>(4)?, row.get::<_, String>(5)?),
        location: Location::new(row.get(6)?, row.get(7)?),
    })
}

pub(crate) fn type_use_from_row(row: &Row<'_>) -> rusqlite::Result<TypeUse> {
    let source: String = row.get(0)?;
    let source = EdgeSource::parse(&source).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("unknown type edge source {source:?}").into(),
        )
    })?;
    let relation: String = row.get(7)?;
    Ok(TypeUse {
        source,
        source_id: row.get(1)?,
        source_key: NaturalKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        target_id: row.get(4)?,
        target: NaturalKey::new(row.get::<_, String>(5)?, row.get::<_, String>(6)?),
        relation: TypeRelation::parse(&relation),
        location: Location::new(row.get(8)?, row.get(9)?),
    })
}

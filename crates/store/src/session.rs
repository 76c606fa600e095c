use crate::error::{Result, StoreError};
use crate::records::*;
use crate::sql::{value_to_json, Conditions, NameFilter, RowSet, SqlParams};
use codefacts_facts::{
    Class, ClassMethod, Constructor, EdgeSource, EntityId, EntityRef, Field, Function, Import,
    Instance, Module, NaturalKey, TypeDef,
};
use codefacts_protocol::{Listing, NamePattern, Page};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

/// A read-only view of exactly one committed snapshot.
///
/// The session owns its own connection and keeps a read transaction open for
/// its whole lifetime, so every lookup made through it agrees on one generation
/// even if a replacement commits in between.
pub struct ReadSession {
    conn: Connection,
    info: SnapshotInfo,
}

impl ReadSession {
    pub(crate) fn begin(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let unavailable = |reason: String| StoreError::Unavailable {
            path: path.display().to_string(),
            reason,
        };
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| unavailable(format!("failed to open read session: {e}")))?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA query_only = ON; BEGIN DEFERRED;")?;

        // The first read pins the snapshot for the rest of the transaction.
        let info = conn
            .query_row(
                "SELECT generation, loaded_at_ms, source, warning_count FROM snapshot_meta WHERE id = 1",
                [],
                |row| {
                    Ok(SnapshotInfo {
                        generation: row.get(0)?,
                        loaded_at_ms: row.get(1)?,
                        source: row.get(2)?,
                        warning_count: row.get::<_, i64>(3)?.max(0) as u64,
                    })
                },
            )
            .map_err(|e| unavailable(format!("store has no snapshot metadata: {e}")))?;

        Ok(Self { conn, info })
    }

    pub fn generation(&self) -> i64 {
        self.info.generation
    }

    pub fn snapshot_info(&self) -> &SnapshotInfo {
        &self.info
    }

    fn collect<T>(
        &self,
        sql: &str,
        args: &[Value],
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn listing<T>(
        &self,
        select: &str,
        mut conditions: Conditions,
        order_by: &str,
        page: Page,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Listing<T>> {
        let mut sql = format!("{select}{} ORDER BY {order_by}", conditions.where_sql());
        sql.push_str(conditions.paginate(page));
        let items = self.collect(&sql, &conditions.args, map)?;
        Ok(Listing::from_probe(items, page))
    }

    // Modules

    pub fn module(&self, name: &str) -> Result<Option<Module>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {MODULE_COLUMNS} FROM modules m WHERE m.name = ?1"),
                [name],
                module_from_row,
            )
            .optional()?)
    }

    pub fn module_by_id(&self, id: EntityId) -> Result<Option<Module>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {MODULE_COLUMNS} FROM modules m WHERE m.id = ?1"),
                [id],
                module_from_row,
            )
            .optional()?)
    }

    pub fn modules(&self, filter: &NameFilter, page: Page) -> Result<Listing<Module>> {
        let mut conditions = Conditions::default();
        conditions.apply(filter, "m.name", "m.name");
        self.listing(
            &format!("SELECT {MODULE_COLUMNS} FROM modules m"),
            conditions,
            "m.name",
            page,
            module_from_row,
        )
    }

    // Functions

    pub fn function(&self, key: &NaturalKey) -> Result<Option<Function>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {FUNCTION_COLUMNS} FROM functions f WHERE f.module = ?1 AND f.name = ?2"),
                params![key.module, key.name],
                function_from_row,
            )
            .optional()?)
    }

    pub fn function_by_id(&self, id: EntityId) -> Result<Option<Function>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {FUNCTION_COLUMNS} FROM functions f WHERE f.id = ?1"),
                [id],
                function_from_row,
            )
            .optional()?)
    }

    /// `where`-bound helpers declared directly inside `parent_id`.
    pub fn where_helpers(&self, parent_id: EntityId) -> Result<Vec<Function>> {
        self.collect(
            &format!("SELECT {FUNCTION_COLUMNS} FROM functions f WHERE f.parent_id = ?1 ORDER BY f.name"),
            &[Value::Integer(parent_id)],
            function_from_row,
        )
    }

    pub fn function_ref(&self, reference: &EntityRef) -> Result<Option<Function>> {
        match reference {
            EntityRef::Id(id) => self.function_by_id(*id),
            EntityRef::Key(key) => self.function(key),
        }
    }

    pub fn functions(&self, filter: &NameFilter, page: Page) -> Result<Listing<Function>> {
        let mut conditions = Conditions::default();
        conditions.apply(filter, "f.module", "f.name");
        self.listing(
            &format!("SELECT {FUNCTION_COLUMNS} FROM functions f"),
            conditions,
            "f.module, f.name",
            page,
            function_from_row,
        )
    }

    // Types

    pub fn type_def(&self, key: &NaturalKey) -> Result<Option<TypeDef>> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT {TYPE_COLUMNS} FROM types t WHERE t.module = ?1 AND t.name = ?2"),
                params![key.module, key.name],
                type_from_row,
            )
            .optional()?;
        self.with_constructors(found)
    }

    pub fn type_by_id(&self, id: EntityId) -> Result<Option<TypeDef>> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT {TYPE_COLUMNS} FROM types t WHERE t.id = ?1"),
                [id],
                type_from_row,
            )
            .optional()?;
        self.with_constructors(found)
    }

    pub fn type_ref(&self, reference: &EntityRef) -> Result<Option<TypeDef>> {
        match reference {
            EntityRef::Id(id) => self.type_by_id(*id),
            EntityRef::Key(key) => self.type_def(key),
        }
    }

    pub fn types(&self, filter: &NameFilter, page: Page) -> Result<Listing<TypeDef>> {
        let mut conditions = Conditions::default();
        conditions.apply(filter, "t.module", "t.name");
        let mut listing = self.listing(
            &format!("SELECT {TYPE_COLUMNS} FROM types t"),
            conditions,
            "t.module, t.name",
            page,
            type_from_row,
        )?;
        self.attach_constructors(&mut listing.items)?;
        Ok(listing)
    }

    fn with_constructors(&self, found: Option<TypeDef>) -> Result<Option<TypeDef>> {
        let Some(ty) = found else {
            return Ok(None);
        };
        let mut one = [ty];
        self.attach_constructors(&mut one)?;
        let [ty] = one;
        Ok(Some(ty))
    }

    fn attach_constructors(&self, types: &mut [TypeDef]) -> Result<()> {
        for ty in types.iter_mut() {
            let mut constructors: Vec<Constructor> = self.collect(
                "SELECT name FROM constructors WHERE type_id = ?1 ORDER BY ordinal",
                &[Value::Integer(ty.id)],
                |row| {
                    Ok(Constructor {
                        name: row.get(0)?,
                        fields: Vec::new(),
                    })
                },
            )?;
            let fields = self.collect(
                "SELECT constructor_ordinal, name, type_module, type_name, target_id
                 FROM fields WHERE type_id = ?1 ORDER BY constructor_ordinal, ordinal",
                &[Value::Integer(ty.id)],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        Field {
                            name: row.get(1)?,
                            type_key: NaturalKey::new(
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                            ),
                            type_id: row.get(4)?,
                        },
                    ))
                },
            )?;
            for (ordinal, field) in fields {
                if let Some(constructor) = constructors.get_mut(ordinal as usize) {
                    constructor.fields.push(field);
                }
            }
            ty.constructors = constructors;
        }
        Ok(())
    }

    // Classes and instances

    pub fn class(&self, key: &NaturalKey) -> Result<Option<Class>> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT {CLASS_COLUMNS} FROM classes c WHERE c.module = ?1 AND c.name = ?2"),
                params![key.module, key.name],
                class_from_row,
            )
            .optional()?;
        match found {
            Some(mut class) => {
                self.attach_methods(std::slice::from_mut(&mut class))?;
                Ok(Some(class))
            }
            None => Ok(None),
        }
    }

    pub fn classes(&self, filter: &NameFilter, page: Page) -> Result<Listing<Class>> {
        let mut conditions = Conditions::default();
        conditions.apply(filter, "c.module", "c.name");
        let mut listing = self.listing(
            &format!("SELECT {CLASS_COLUMNS} FROM classes c"),
            conditions,
            "c.module, c.name",
            page,
            class_from_row,
        )?;
        self.attach_methods(&mut listing.items)?;
        Ok(listing)
    }

    fn attach_methods(&self, classes: &mut [Class]) -> Result<()> {
        for class in classes.iter_mut() {
            class.methods = self.collect(
                "SELECT name, signature FROM class_methods WHERE class_id = ?1 ORDER BY ordinal",
                &[Value::Integer(class.id)],
                |row| {
                    Ok(ClassMethod {
                        name: row.get(0)?,
                        signature: row.get(1)?,
                    })
                },
            )?;
        }
        Ok(())
    }

    /// Instances, optionally restricted to one class and to declaring modules.
    pub fn instances(
        &self,
        class: Option<&NaturalKey>,
        module: Option<&NamePattern>,
        page: Page,
    ) -> Result<Listing<Instance>> {
        let mut conditions = Conditions::default();
        if let Some(class) = class {
            conditions.push(
                "i.class_module = ? AND i.class_name = ?",
                [
                    Value::Text(class.module.clone()),
                    Value::Text(class.name.clone()),
                ],
            );
        }
        if let Some(module) = module {
            conditions.scope("i.module", module);
        }
        self.listing(
            &format!("SELECT {INSTANCE_COLUMNS} FROM instances i"),
            conditions,
            "i.module, i.class_module, i.class_name, i.type_module, i.type_name",
            page,
            instance_from_row,
        )
    }

    pub fn modules_with_instances(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .collect("SELECT DISTINCT module FROM instances", &[], |row| {
                row.get::<_, String>(0)
            })?
            .into_iter()
            .collect())
    }

    // Imports

    /// `filter.name` matches the imported module, `filter.module` the importing one.
    pub fn imports(&self, filter: &NameFilter, page: Page) -> Result<Listing<Import>> {
        let mut conditions = Conditions::default();
        conditions.apply(filter, "im.module", "im.imported_module");
        self.listing(
            &format!("SELECT {IMPORT_COLUMNS} FROM imports im"),
            conditions,
            "im.module, im.imported_module, im.line, im.col",
            page,
            import_from_row,
        )
    }

    pub fn imports_of(&self, module: &str) -> Result<Vec<Import>> {
        self.collect(
            &format!(
                "SELECT {IMPORT_COLUMNS} FROM imports im WHERE im.module = ?1
                 ORDER BY im.imported_module, im.line, im.col"
            ),
            &[Value::Text(module.to_string())],
            import_from_row,
        )
    }

    pub fn importers_of(&self, module: &str) -> Result<Vec<Import>> {
        self.collect(
            &format!(
                "SELECT {IMPORT_COLUMNS} FROM imports im WHERE im.imported_module = ?1
                 ORDER BY im.module, im.line, im.col"
            ),
            &[Value::Text(module.to_string())],
            import_from_row,
        )
    }

    /// Every import declared by the modules in `scope`, unpaginated.
    pub fn imports_in(&self, scope: Option<&NamePattern>) -> Result<Vec<Import>> {
        let mut conditions = Conditions::default();
        if let Some(scope) = scope {
            conditions.scope("im.module", scope);
        }
        self.collect(
            &format!(
                "SELECT {IMPORT_COLUMNS} FROM imports im{} ORDER BY im.module, im.imported_module, im.line, im.col",
                conditions.where_sql()
            ),
            &conditions.args,
            import_from_row,
        )
    }

    // Call edges

    pub fn callees_of(&self, function_id: EntityId) -> Result<Vec<CallSite>> {
        self.collect(
            &format!(
                "{CALL_SITE_SELECT} WHERE e.caller_id = ?1
                 ORDER BY e.callee_module, e.callee_name, e.line, e.col"
            ),
            &[Value::Integer(function_id)],
            call_site_from_row,
        )
    }

    pub fn callers_of(&self, function_id: EntityId) -> Result<Vec<CallSite>> {
        self.collect(
            &format!(
                "{CALL_SITE_SELECT} WHERE e.callee_id = ?1
                 ORDER BY c.module, c.name, e.line, e.col"
            ),
            &[Value::Integer(function_id)],
            call_site_from_row,
        )
    }

    pub fn callees(&self, function_id: EntityId, page: Page) -> Result<Listing<CallSite>> {
        let mut conditions = Conditions::default();
        conditions.push("e.caller_id = ?", [Value::Integer(function_id)]);
        self.listing(
            CALL_SITE_SELECT,
            conditions,
            "e.callee_module, e.callee_name, e.line, e.col",
            page,
            call_site_from_row,
        )
    }

    pub fn callers(&self, function_id: EntityId, page: Page) -> Result<Listing<CallSite>> {
        let mut conditions = Conditions::default();
        conditions.push("e.callee_id = ?", [Value::Integer(function_id)]);
        self.listing(
            CALL_SITE_SELECT,
            conditions,
            "c.module, c.name, e.line, e.col",
            page,
            call_site_from_row,
        )
    }

    /// Call sites leaving the modules matched by `source` into those matched by `target`.
    ///
    /// Calls inside one module are never cross-module, even when both patterns match it.
    pub fn cross_module_calls(
        &self,
        source: &NamePattern,
        target: &NamePattern,
        page: Page,
    ) -> Result<Listing<CallSite>> {
        let mut conditions = Conditions::default();
        conditions.scope("c.module", source);
        conditions.scope("e.callee_module", target);
        conditions.push("c.module <> e.callee_module", []);
        self.listing(
            CALL_SITE_SELECT,
            conditions,
            "c.module, c.name, e.callee_module, e.callee_name, e.line, e.col",
            page,
            call_site_from_row,
        )
    }

    /// Call sites whose qualified caller and callee names match the patterns.
    pub fn call_sites_matching(
        &self,
        caller: &NamePattern,
        callee: &NamePattern,
        page: Page,
    ) -> Result<Listing<CallSite>> {
        let mut conditions = Conditions::default();
        conditions.search("(c.module || '.' || c.name)", caller);
        conditions.search(
            "(CASE WHEN e.callee_module = '' THEN e.callee_name \
              ELSE e.callee_module || '.' || e.callee_name END)",
            callee,
        );
        self.listing(
            CALL_SITE_SELECT,
            conditions,
            "c.module, c.name, e.callee_module, e.callee_name, e.line, e.col",
            page,
            call_site_from_row,
        )
    }

    /// Functions ranked by incoming resolved call sites, ties by natural key.
    pub fn most_called(&self, module: Option<&NamePattern>, page: Page) -> Result<Listing<CallCount>> {
        let mut conditions = Conditions::default();
        if let Some(module) = module {
            conditions.scope("f.module", module);
        }
        let mut sql = format!(
            "SELECT {FUNCTION_COLUMNS}, COUNT(*) AS calls
             FROM call_edges e JOIN functions f ON f.id = e.callee_id{}
             GROUP BY f.id ORDER BY calls DESC, f.module, f.name",
            conditions.where_sql()
        );
        sql.push_str(conditions.paginate(page));
        let items = self.collect(&sql, &conditions.args, |row| {
            Ok(CallCount {
                function: function_from_row(row)?,
                calls: row.get::<_, i64>(FUNCTION_COLUMN_COUNT)?.max(0) as u64,
            })
        })?;
        Ok(Listing::from_probe(items, page))
    }

    /// Call counts per (caller module, callee module) pair, same-module calls and
    /// unqualified dangling callees excluded. Ordered by caller then callee module.
    pub fn module_call_counts(&self) -> Result<Vec<ModuleCallCount>> {
        self.collect(
            "SELECT c.module, e.callee_module, COUNT(*), SUM(e.callee_id IS NULL)
               FROM call_edges e JOIN functions c ON c.id = e.caller_id
              WHERE e.callee_module <> '' AND c.module <> e.callee_module
              GROUP BY c.module, e.callee_module
              ORDER BY c.module, e.callee_module",
            &[],
            |row| {
                Ok(ModuleCallCount {
                    caller_module: row.get(0)?,
                    callee_module: row.get(1)?,
                    calls: row.get::<_, i64>(2)?.max(0) as u64,
                    dangling_calls: row.get::<_, i64>(3)?.max(0) as u64,
                })
            },
        )
    }

    // Type edges

    pub fn type_uses_from(&self, source: EdgeSource, source_id: EntityId) -> Result<Vec<TypeUse>> {
        self.collect(
            &format!(
                "{TYPE_USE_SELECT} WHERE e.source_kind = ?1 AND e.source_id = ?2
                 ORDER BY e.target_module, e.target_name, e.relation, e.line, e.col"
            ),
            &[
                Value::Text(source.as_str().to_string()),
                Value::Integer(source_id),
            ],
            type_use_from_row,
        )
    }

    /// Edges pointing at a type, from types and functions alike.
    pub fn type_uses_to(&self, type_id: EntityId) -> Result<Vec<TypeUse>> {
        self.collect(
            &format!(
                "{TYPE_USE_SELECT} WHERE e.target_id = ?1
                 ORDER BY COALESCE(st.module, sf.module), COALESCE(st.name, sf.name),
                          e.source_kind, e.relation, e.line, e.col"
            ),
            &[Value::Integer(type_id)],
            type_use_from_row,
        )
    }

    // Derived facts for analysis

    pub fn function_facts(&self, module: Option<&NamePattern>) -> Result<Vec<FunctionFacts>> {
        let mut conditions = Conditions::default();
        if let Some(module) = module {
            conditions.scope("f.module", module);
        }
        self.facts_where(conditions)
    }

    pub fn function_facts_for(&self, function_id: EntityId) -> Result<Option<FunctionFacts>> {
        let mut conditions = Conditions::default();
        conditions.push("f.id = ?", [Value::Integer(function_id)]);
        Ok(self.facts_where(conditions)?.into_iter().next())
    }

    fn facts_where(&self, conditions: Conditions) -> Result<Vec<FunctionFacts>> {
        let where_sql = conditions.where_sql();
        let functions = self.collect(
            &format!("SELECT {FUNCTION_COLUMNS} FROM functions f{where_sql} ORDER BY f.module, f.name"),
            &conditions.args,
            function_from_row,
        )?;
        let edges = self.collect(
            &format!(
                "SELECT e.caller_id, e.callee_id, e.callee_module, e.callee_name
                 FROM call_edges e JOIN functions f ON f.id = e.caller_id{where_sql}"
            ),
            &conditions.args,
            |row| {
                Ok((
                    row.get::<_, EntityId>(0)?,
                    row.get::<_, Option<EntityId>>(1)?,
                    NaturalKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
                ))
            },
        )?;
        let children: HashMap<EntityId, u32> = self
            .collect(
                "SELECT parent_id, COUNT(*) FROM functions WHERE parent_id IS NOT NULL GROUP BY parent_id",
                &[],
                |row| Ok((row.get::<_, EntityId>(0)?, row.get::<_, u32>(1)?)),
            )?
            .into_iter()
            .collect();

        let mut facts: Vec<FunctionFacts> = functions
            .into_iter()
            .map(|function| FunctionFacts {
                where_functions: children.get(&function.id).copied().unwrap_or(0),
                function,
                calls: 0,
                self_calls: 0,
                callees: BTreeSet::new(),
            })
            .collect();
        let index: HashMap<EntityId, usize> = facts
            .iter()
            .enumerate()
            .map(|(i, f)| (f.function.id, i))
            .collect();
        for (caller_id, callee_id, callee) in edges {
            let Some(&i) = index.get(&caller_id) else {
                continue;
            };
            let entry = &mut facts[i];
            entry.calls += 1;
            if callee_id == Some(caller_id) {
                entry.self_calls += 1;
            }
            entry.callees.insert(callee);
        }
        Ok(facts)
    }

    pub fn type_facts(&self, module: Option<&NamePattern>) -> Result<Vec<TypeFacts>> {
        let mut conditions = Conditions::default();
        if let Some(module) = module {
            conditions.scope("t.module", module);
        }
        let mut types = self.collect(
            &format!(
                "SELECT {TYPE_COLUMNS} FROM types t{} ORDER BY t.module, t.name",
                conditions.where_sql()
            ),
            &conditions.args,
            type_from_row,
        )?;
        self.attach_constructors(&mut types)?;

        let self_referential: BTreeSet<EntityId> = self
            .collect(
                "SELECT DISTINCT source_id FROM type_edges
                 WHERE source_kind = 'type' AND target_id = source_id",
                &[],
                |row| row.get::<_, EntityId>(0),
            )?
            .into_iter()
            .collect();
        let outgoing: HashMap<EntityId, u32> = self
            .collect(
                "SELECT source_id, COUNT(*) FROM type_edges WHERE source_kind = 'type' GROUP BY source_id",
                &[],
                |row| Ok((row.get::<_, EntityId>(0)?, row.get::<_, u32>(1)?)),
            )?
            .into_iter()
            .collect();
        let incoming: HashMap<EntityId, u32> = self
            .collect(
                "SELECT target_id, COUNT(*) FROM type_edges WHERE target_id IS NOT NULL GROUP BY target_id",
                &[],
                |row| Ok((row.get::<_, EntityId>(0)?, row.get::<_, u32>(1)?)),
            )?
            .into_iter()
            .collect();

        Ok(types
            .into_iter()
            .map(|ty| TypeFacts {
                self_referential: self_referential.contains(&ty.id),
                outgoing: outgoing.get(&ty.id).copied().unwrap_or(0),
                incoming: incoming.get(&ty.id).copied().unwrap_or(0),
                ty,
            })
            .collect())
    }

    /// Every distinct entity a module refers to through calls, type edges or instances.
    /// Dangling references keep whatever module they were recorded with.
    pub fn module_references(&self, module: &str) -> Result<Vec<NaturalKey>> {
        self.collect(
            "SELECT e.callee_module, e.callee_name
               FROM call_edges e JOIN functions f ON f.id = e.caller_id WHERE f.module = ?1
             UNION
             SELECT t.target_module, t.target_name
               FROM type_edges t
               LEFT JOIN types st ON t.source_kind = 'type' AND st.id = t.source_id
               LEFT JOIN functions sf ON t.source_kind = 'function' AND sf.id = t.source_id
              WHERE COALESCE(st.module, sf.module) = ?1
             UNION
             SELECT class_module, class_name FROM instances WHERE module = ?1
             UNION
             SELECT type_module, type_name FROM instances WHERE module = ?1
             ORDER BY 1, 2",
            &[Value::Text(module.to_string())],
            |row| Ok(NaturalKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
    }

    /// Functions, types and classes of `module` whose span covers the position,
    /// innermost first.
    pub fn elements_at(&self, module: &str, line: u32, col: Option<u32>) -> Result<Vec<LocatedElement>> {
        let mut found = Vec::new();
        for (kind, table) in [
            (ElementKind::Function, "functions"),
            (ElementKind::Type, "types"),
            (ElementKind::Class, "classes"),
        ] {
            let rows = self.collect(
                &format!(
                    "SELECT id, module, name, start_line, start_col, end_line, end_col FROM {table}
                     WHERE module = ?1 AND start_line <= ?2 AND end_line >= ?2"
                ),
                &[Value::Text(module.to_string()), Value::Integer(i64::from(line))],
                |row| {
                    Ok((
                        row.get::<_, EntityId>(0)?,
                        NaturalKey::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
                        span_at(row, 3)?,
                    ))
                },
            )?;
            for (id, key, span) in rows {
                if let Some(span) = span.filter(|s| s.contains(line, col)) {
                    found.push(LocatedElement { kind, id, key, span });
                }
            }
        }
        found.sort_by(|a, b| {
            a.span
                .line_extent()
                .cmp(&b.span.line_extent())
                .then(b.span.start().line.cmp(&a.span.start().line))
                .then(b.span.start_col.cmp(&a.span.start_col))
                .then(a.key.cmp(&b.key))
        });
        Ok(found)
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        };
        let top_modules = self.collect(
            "SELECT m.name, COUNT(f.id) AS n FROM modules m LEFT JOIN functions f ON f.module_id = m.id
             GROUP BY m.id ORDER BY n DESC, m.name LIMIT 10",
            &[],
            |row| {
                Ok(ModuleCount {
                    module: row.get(0)?,
                    functions: row.get::<_, i64>(1)?.max(0) as u64,
                })
            },
        )?;
        Ok(Statistics {
            generation: self.info.generation,
            modules: count("SELECT COUNT(*) FROM modules")?,
            functions: count("SELECT COUNT(*) FROM functions")?,
            types: count("SELECT COUNT(*) FROM types")?,
            classes: count("SELECT COUNT(*) FROM classes")?,
            instances: count("SELECT COUNT(*) FROM instances")?,
            imports: count("SELECT COUNT(*) FROM imports")?,
            call_edges: count("SELECT COUNT(*) FROM call_edges")?,
            dangling_call_edges: count("SELECT COUNT(*) FROM call_edges WHERE callee_id IS NULL")?,
            type_edges: count("SELECT COUNT(*) FROM type_edges")?,
            dangling_type_edges: count("SELECT COUNT(*) FROM type_edges WHERE target_id IS NULL")?,
            top_modules,
        })
    }

    // Ad-hoc statements

    /// Run one statement and return at most `page.limit` rows after `page.offset`.
    ///
    /// The statement must be read-only according to SQLite itself; the session
    /// connection is `query_only` as well.
    pub fn query_rows(&self, sql: &str, params: &SqlParams, page: Page) -> Result<RowSet> {
        let mut stmt = self.conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(StoreError::Rejected(
                "statement would modify the database".to_string(),
            ));
        }
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let expected = stmt.parameter_count();
        match params {
            SqlParams::None if expected > 0 => {
                return Err(StoreError::Rejected(format!(
                    "statement expects {expected} parameter(s), none given"
                )));
            }
            SqlParams::None => {}
            SqlParams::Positional(values) => {
                if values.len() != expected {
                    return Err(StoreError::Rejected(format!(
                        "statement expects {expected} parameter(s), {} given",
                        values.len()
                    )));
                }
                for (idx, value) in values.iter().enumerate() {
                    stmt.raw_bind_parameter(idx + 1, value)?;
                }
            }
            SqlParams::Named(values) => {
                if values.len() != expected {
                    return Err(StoreError::Rejected(format!(
                        "statement expects {expected} parameter(s), {} given",
                        values.len()
                    )));
                }
                for (name, value) in values {
                    let idx = stmt
                        .parameter_index(name)?
                        .ok_or_else(|| StoreError::Rejected(format!("unknown parameter {name}")))?;
                    stmt.raw_bind_parameter(idx, value)?;
                }
            }
        }

        let mut rows = stmt.raw_query();
        let mut items = Vec::new();
        let mut skipped = 0usize;
        while let Some(row) = rows.next()? {
            if skipped < page.offset {
                skipped += 1;
                continue;
            }
            let mut object = serde_json::Map::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                object.insert(name.clone(), value_to_json(row.get_ref(idx)?));
            }
            items.push(serde_json::Value::Object(object));
            if items.len() >= page.probe_len() {
                break;
            }
        }

        Ok(RowSet {
            columns,
            rows: Listing::from_probe(items, page),
        })
    }
}

impl Drop for ReadSession {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            log::debug!("Read session rollback failed: {e}");
        }
    }
}

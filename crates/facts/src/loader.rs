use crate::dump::{RawFunction, RawModule, RawSpan, RawSymbolRef};
use crate::error::{FactsError, Result};
use crate::model::*;
use crate::resolve::{resolve, ImportScope, SymbolIndex, LOCAL_SEPARATOR};
use crate::scanner::DumpScanner;
use crate::signature;
use codefacts_protocol::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Non-fatal problem recorded while loading a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestWarning {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub message: String,
}

impl IngestWarning {
    fn new(file: Option<&str>, module: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::IngestionPartialWarning,
            file: file.map(str::to_string),
            module: module.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Outcome of loading a dump: the normalized snapshot and everything that was skipped.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub snapshot: Snapshot,
    pub warnings: Vec<IngestWarning>,
    pub files_scanned: usize,
    pub time_ms: u64,
}

/// One parsed module file, before normalization.
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub file: Option<String>,
    pub raw: RawModule,
}

impl From<RawModule> for SourceModule {
    fn from(raw: RawModule) -> Self {
        Self { file: None, raw }
    }
}

/// Reads a fact dump directory into a validated [`Snapshot`].
pub struct FactLoader {
    root: PathBuf,
}

impl FactLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<LoadReport> {
        let started = Instant::now();
        if !self.root.is_dir() {
            return Err(FactsError::InvalidPath(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let scan = DumpScanner::new(&self.root).scan();
        let mut warnings: Vec<IngestWarning> = scan
            .skipped
            .iter()
            .map(|(path, reason)| {
                IngestWarning::new(Some(&path.display().to_string()), None, reason.clone())
            })
            .collect();

        let mut sources = Vec::with_capacity(scan.files.len());
        for path in &scan.files {
            let display = path.display().to_string();
            match Self::parse_file(path) {
                Ok(raw) => sources.push(SourceModule {
                    file: Some(display),
                    raw,
                }),
                Err(reason) => {
                    log::warn!("Skipping fact file {display}: {reason}");
                    warnings.push(IngestWarning::new(Some(&display), None, reason));
                }
            }
        }

        let mut report = Self::normalize(sources, warnings, &self.root.display().to_string())?;
        report.files_scanned = scan.files.len() + scan.skipped.len();
        report.time_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "Loaded {} modules, {} functions, {} types ({} warnings) in {} ms",
            report.snapshot.modules.len(),
            report.snapshot.functions.len(),
            report.snapshot.types.len(),
            report.warnings.len(),
            report.time_ms
        );
        Ok(report)
    }

    /// Normalize modules that were produced in memory rather than read from disk.
    pub fn from_modules(modules: Vec<RawModule>) -> Result<LoadReport> {
        let sources = modules.into_iter().map(SourceModule::from).collect();
        Self::normalize(sources, Vec::new(), "<memory>")
    }

    fn parse_file(path: &Path) -> std::result::Result<RawModule, String> {
        let bytes = std::fs::read(path).map_err(|e| format!("read failed: {e}"))?;
        serde_json::from_slice::<RawModule>(&bytes).map_err(|e| format!("malformed fact file: {e}"))
    }

    fn normalize(
        sources: Vec<SourceModule>,
        mut warnings: Vec<IngestWarning>,
        root: &str,
    ) -> Result<LoadReport> {
        let accepted = accept_modules(sources, &mut warnings);
        if accepted.is_empty() {
            return Err(FactsError::NoModules {
                root: root.to_string(),
                failures: warnings.len(),
            });
        }

        let snapshot = Normalizer::new(&accepted, &mut warnings).run();
        Ok(LoadReport {
            snapshot,
            warnings,
            files_scanned: accepted.len(),
            time_ms: 0,
        })
    }
}

fn accept_modules(
    sources: Vec<SourceModule>,
    warnings: &mut Vec<IngestWarning>,
) -> Vec<SourceModule> {
    let mut seen: HashMap<String, Option<String>> = HashMap::new();
    let mut accepted = Vec::with_capacity(sources.len());
    for mut source in sources {
        let name = source.raw.module.trim().to_string();
        if name.is_empty() {
            warnings.push(IngestWarning::new(
                source.file.as_deref(),
                None,
                "module name is empty",
            ));
            continue;
        }
        if let Some(first) = seen.get(&name) {
            warnings.push(IngestWarning::new(
                source.file.as_deref(),
                Some(&name),
                format!(
                    "duplicate module {name} (first loaded from {})",
                    first.as_deref().unwrap_or("<memory>")
                ),
            ));
            continue;
        }
        seen.insert(name.clone(), source.file.clone());
        source.raw.module = name;
        accepted.push(source);
    }
    accepted.sort_by(|a, b| a.raw.module.cmp(&b.raw.module));
    accepted
}

fn to_span(
    raw: Option<RawSpan>,
    file: Option<&str>,
    module: &str,
    what: &str,
    warnings: &mut Vec<IngestWarning>,
) -> Option<Span> {
    let raw = raw?;
    let reversed = raw.end_line < raw.start_line
        || (raw.end_line == raw.start_line && raw.end_col > 0 && raw.end_col < raw.start_col);
    if reversed {
        warnings.push(IngestWarning::new(
            file,
            Some(module),
            format!("{what}: span ends before it starts, span dropped"),
        ));
        return None;
    }
    Some(Span {
        start_line: raw.start_line,
        start_col: raw.start_col,
        end_line: raw.end_line,
        end_col: raw.end_col,
    })
}

/// A function flattened out of its module, `where` helpers included.
struct PendingFunction<'a> {
    module_idx: usize,
    key: NaturalKey,
    parent: Option<String>,
    raw: &'a RawFunction,
}

struct Normalizer<'a> {
    sources: &'a [SourceModule],
    warnings: &'a mut Vec<IngestWarning>,
    module_ids: Vec<EntityId>,
    modules_by_name: HashMap<String, EntityId>,
    functions: SymbolIndex,
    types: SymbolIndex,
    classes: SymbolIndex,
    imports: ImportScope,
}

impl<'a> Normalizer<'a> {
    fn new(sources: &'a [SourceModule], warnings: &'a mut Vec<IngestWarning>) -> Self {
        let module_ids: Vec<EntityId> = (1..=sources.len() as EntityId).collect();
        let modules_by_name = sources
            .iter()
            .zip(module_ids.iter())
            .map(|(s, id)| (s.raw.module.clone(), *id))
            .collect();
        Self {
            sources,
            warnings,
            module_ids,
            modules_by_name,
            functions: SymbolIndex::default(),
            types: SymbolIndex::default(),
            classes: SymbolIndex::default(),
            imports: ImportScope::default(),
        }
    }

    fn file(&self, module_idx: usize) -> Option<&'a str> {
        self.sources[module_idx].file.as_deref()
    }

    fn warn(&mut self, module_idx: usize, message: impl Into<String>) {
        let source = &self.sources[module_idx];
        self.warnings.push(IngestWarning::new(
            source.file.as_deref(),
            Some(&source.raw.module),
            message,
        ));
    }

    fn run(mut self) -> Snapshot {
        let modules = self
            .sources
            .iter()
            .zip(self.module_ids.iter())
            .map(|(s, id)| Module {
                id: *id,
                name: s.raw.module.clone(),
                path: s.raw.path.clone(),
            })
            .collect();

        let imports = self.collect_imports();
        let pending = self.collect_functions();
        let functions = self.assign_functions(&pending);
        let mut types = self.collect_types();
        let classes = self.collect_classes();
        let instances = self.collect_instances();

        let call_edges = self.resolve_calls(&pending, &functions);
        let mut type_edges = self.resolve_type_fields(&mut types);
        type_edges.extend(self.resolve_function_type_refs(&pending, &functions));
        type_edges.sort_by(|a, b| {
            (a.source.as_str(), a.source_id, &a.target, a.relation.as_str(), a.location.line, a.location.col)
                .cmp(&(b.source.as_str(), b.source_id, &b.target, b.relation.as_str(), b.location.line, b.location.col))
        });
        type_edges.dedup_by(|a, b| {
            a.source == b.source
                && a.source_id == b.source_id
                && a.target == b.target
                && a.relation == b.relation
                && a.location == b.location
        });

        Snapshot {
            modules,
            functions,
            types,
            classes,
            instances,
            imports,
            call_edges,
            type_edges,
        }
    }

    fn collect_imports(&mut self) -> Vec<Import> {
        let mut out = Vec::new();
        for (idx, source) in self.sources.iter().enumerate() {
            let module = &source.raw.module;
            for raw in &source.raw.imports {
                let imported = raw.module.trim();
                if imported.is_empty() {
                    self.warnings.push(IngestWarning::new(
                        source.file.as_deref(),
                        Some(module),
                        "import without module name skipped",
                    ));
                    continue;
                }
                self.imports.add(module, imported, raw.alias.as_deref());
                let location = raw.span.map(|s| Location::new(s.start_line, s.start_col));
                out.push(Import {
                    id: 0,
                    module_id: self.module_ids[idx],
                    module: module.clone(),
                    imported_module: imported.to_string(),
                    imported_module_id: self.modules_by_name.get(imported).copied(),
                    alias: raw.alias.clone().filter(|a| !a.is_empty()),
                    symbols: raw.symbols.clone(),
                    qualified: raw.qualified,
                    hiding: raw.hiding,
                    package: raw.package.clone(),
                    location: location.unwrap_or_default(),
                });
            }
        }
        out.sort_by(|a, b| {
            (&a.module, &a.imported_module, a.location.line, a.location.col)
                .cmp(&(&b.module, &b.imported_module, b.location.line, b.location.col))
        });
        out.dedup_by(|a, b| {
            a.module == b.module && a.imported_module == b.imported_module && a.location == b.location
        });
        for (i, import) in out.iter_mut().enumerate() {
            import.id = i as EntityId + 1;
        }
        out
    }

    fn collect_functions(&mut self) -> Vec<PendingFunction<'a>> {
        let mut pending = Vec::new();
        let sources = self.sources;
        for (idx, source) in sources.iter().enumerate() {
            let mut seen = HashSet::new();
            for raw in &source.raw.functions {
                self.flatten_function(idx, None, raw, &mut seen, &mut pending);
            }
        }
        pending.sort_by(|a, b| a.key.cmp(&b.key));
        pending
    }

    fn flatten_function(
        &mut self,
        module_idx: usize,
        parent: Option<&str>,
        raw: &'a RawFunction,
        seen: &mut HashSet<String>,
        out: &mut Vec<PendingFunction<'a>>,
    ) {
        let local = raw.name.trim();
        if local.is_empty() {
            self.warn(module_idx, "function with empty name skipped");
            return;
        }
        let name = match parent {
            Some(parent) => format!("{parent}{LOCAL_SEPARATOR}{local}"),
            None => local.to_string(),
        };
        if !seen.insert(name.clone()) {
            self.warn(module_idx, format!("duplicate function {name} skipped"));
            return;
        }
        let module = self.sources[module_idx].raw.module.clone();
        out.push(PendingFunction {
            module_idx,
            key: NaturalKey::new(module, name.clone()),
            parent: parent.map(str::to_string),
            raw,
        });
        for child in &raw.where_functions {
            self.flatten_function(module_idx, Some(&name), child, seen, out);
        }
    }

    fn assign_functions(&mut self, pending: &[PendingFunction<'a>]) -> Vec<Function> {
        for (i, p) in pending.iter().enumerate() {
            self.functions.insert(p.key.clone(), i as EntityId + 1);
        }
        let mut out = Vec::with_capacity(pending.len());
        for (i, p) in pending.iter().enumerate() {
            let signature = p
                .raw
                .signature
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let arity = p
                .raw
                .arity
                .or_else(|| signature.as_deref().map(signature::arity))
                .unwrap_or(0);
            let what = format!("function {}", p.key.name);
            let span = to_span(
                p.raw.span,
                self.file(p.module_idx),
                &p.key.module,
                &what,
                self.warnings,
            );
            let parent_id = p.parent.as_ref().and_then(|parent| {
                self.functions
                    .get(&NaturalKey::new(p.key.module.as_str(), parent.as_str()))
            });
            out.push(Function {
                id: i as EntityId + 1,
                module_id: self.module_ids[p.module_idx],
                key: p.key.clone(),
                signature,
                span,
                arity,
                branches: p.raw.branches,
                match_depth: p.raw.match_depth,
                parent_id,
            });
        }
        out
    }

    fn collect_types(&mut self) -> Vec<TypeDef> {
        let mut out = Vec::new();
        let sources = self.sources;
        for (idx, source) in sources.iter().enumerate() {
            let mut seen = HashSet::new();
            for raw in &source.raw.types {
                let name = raw.name.trim();
                if name.is_empty() {
                    self.warn(idx, "type with empty name skipped");
                    continue;
                }
                if !seen.insert(name.to_string()) {
                    self.warn(idx, format!("duplicate type {name} skipped"));
                    continue;
                }
                let span = to_span(
                    raw.span,
                    source.file.as_deref(),
                    &source.raw.module,
                    &format!("type {name}"),
                    self.warnings,
                );
                let constructors = raw
                    .constructors
                    .iter()
                    .map(|c| Constructor {
                        name: c.name.clone(),
                        fields: c
                            .fields
                            .iter()
                            .map(|f| Field {
                                name: f.name.clone().filter(|n| !n.is_empty()),
                                type_key: NaturalKey::new(
                                    f.type_ref.module.clone().unwrap_or_default(),
                                    f.type_ref.name.clone(),
                                ),
                                type_id: None,
                            })
                            .collect(),
                    })
                    .collect();
                out.push(TypeDef {
                    id: 0,
                    module_id: self.module_ids[idx],
                    key: NaturalKey::new(source.raw.module.as_str(), name),
                    kind: raw.kind.as_deref().map(TypeKind::parse).unwrap_or(TypeKind::Data),
                    span,
                    constructors,
                });
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        for (i, ty) in out.iter_mut().enumerate() {
            ty.id = i as EntityId + 1;
            self.types.insert(ty.key.clone(), ty.id);
        }
        out
    }

    fn collect_classes(&mut self) -> Vec<Class> {
        let mut out = Vec::new();
        let sources = self.sources;
        for (idx, source) in sources.iter().enumerate() {
            let mut seen = HashSet::new();
            for raw in &source.raw.classes {
                let name = raw.name.trim();
                if name.is_empty() || !seen.insert(name.to_string()) {
                    self.warn(idx, format!("class {name:?} skipped (empty or duplicate name)"));
                    continue;
                }
                let span = to_span(
                    raw.span,
                    source.file.as_deref(),
                    &source.raw.module,
                    &format!("class {name}"),
                    self.warnings,
                );
                out.push(Class {
                    id: 0,
                    module_id: self.module_ids[idx],
                    key: NaturalKey::new(source.raw.module.as_str(), name),
                    span,
                    methods: raw
                        .methods
                        .iter()
                        .map(|m| ClassMethod {
                            name: m.name.clone(),
                            signature: m.signature.clone(),
                        })
                        .collect(),
                    superclasses: Vec::new(),
                });
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        for (i, class) in out.iter_mut().enumerate() {
            class.id = i as EntityId + 1;
            self.classes.insert(class.key.clone(), class.id);
        }

        // Superclasses resolve against the finished class index.
        for class in out.iter_mut() {
            let Some(source) = self.sources.iter().find(|s| s.raw.module == class.key.module) else {
                continue;
            };
            if let Some(raw) = source.raw.classes.iter().find(|c| c.name.trim() == class.key.name) {
                class.superclasses = raw
                    .superclasses
                    .iter()
                    .map(|r| self.resolve_class(&class.key.module, r).0)
                    .collect();
            }
        }
        out
    }

    fn resolve_class(&self, from: &str, raw: &RawSymbolRef) -> (NaturalKey, Option<EntityId>) {
        resolve(&self.classes, &self.imports, from, raw.module.as_deref(), &raw.name, &[])
    }

    fn resolve_type(&self, from: &str, raw: &RawSymbolRef) -> (NaturalKey, Option<EntityId>) {
        resolve(&self.types, &self.imports, from, raw.module.as_deref(), &raw.name, &[])
    }

    fn collect_instances(&self) -> Vec<Instance> {
        let mut out = Vec::new();
        for (idx, source) in self.sources.iter().enumerate() {
            let module = &source.raw.module;
            for raw in &source.raw.instances {
                let (class_key, class_id) = self.resolve_class(module, &raw.class);
                let (type_key, type_id) = self.resolve_type(module, &raw.type_ref);
                out.push(Instance {
                    id: 0,
                    module_id: self.module_ids[idx],
                    module: module.clone(),
                    class_key,
                    class_id,
                    type_key,
                    type_id,
                    constraints: raw
                        .constraints
                        .iter()
                        .map(|c| self.resolve_class(module, c).0)
                        .collect(),
                    span: raw.span.map(|s| Span {
                        start_line: s.start_line,
                        start_col: s.start_col,
                        end_line: s.end_line.max(s.start_line),
                        end_col: s.end_col,
                    }),
                });
            }
        }
        out.sort_by(|a, b| {
            (&a.module, &a.class_key, &a.type_key).cmp(&(&b.module, &b.class_key, &b.type_key))
        });
        for (i, instance) in out.iter_mut().enumerate() {
            instance.id = i as EntityId + 1;
        }
        out
    }

    fn resolve_calls(&self, pending: &[PendingFunction<'a>], functions: &[Function]) -> Vec<CallEdge> {
        let mut edges = BTreeSet::new();
        for (p, function) in pending.iter().zip(functions.iter()) {
            let scopes = local_scopes(&p.key.name);
            for call in &p.raw.calls {
                let name = call.name.trim();
                if name.is_empty() {
                    continue;
                }
                let (callee, callee_id) = resolve(
                    &self.functions,
                    &self.imports,
                    &p.key.module,
                    call.module.as_deref(),
                    name,
                    &scopes,
                );
                edges.insert((
                    function.id,
                    callee,
                    call.line,
                    call.col,
                    callee_id,
                ));
            }
        }
        edges
            .into_iter()
            .map(|(caller_id, callee, line, col, callee_id)| CallEdge {
                caller_id,
                callee_id,
                callee,
                location: Location::new(line, col),
            })
            .collect()
    }

    fn resolve_type_fields(&self, types: &mut [TypeDef]) -> Vec<TypeEdge> {
        let mut edges = Vec::new();
        for ty in types.iter_mut() {
            let location = ty.span.map(|s| s.start()).unwrap_or_default();
            let from = ty.key.module.clone();
            for constructor in ty.constructors.iter_mut() {
                for field in constructor.fields.iter_mut() {
                    let raw = RawSymbolRef {
                        module: Some(field.type_key.module.clone()).filter(|m| !m.is_empty()),
                        name: field.type_key.name.clone(),
                    };
                    let (target, target_id) = self.resolve_type(&from, &raw);
                    field.type_key = target.clone();
                    field.type_id = target_id;
                    edges.push(TypeEdge {
                        source: EdgeSource::Type,
                        source_id: ty.id,
                        target_id,
                        target,
                        relation: if field.name.is_some() {
                            TypeRelation::FieldOf
                        } else {
                            TypeRelation::ConstructorArgOf
                        },
                        location,
                    });
                }
            }

            let Some(source) = self.sources.iter().find(|s| s.raw.module == ty.key.module) else {
                continue;
            };
            let Some(raw) = source.raw.types.iter().find(|t| t.name.trim() == ty.key.name) else {
                continue;
            };
            for reference in &raw.references {
                let (target, target_id) = self.resolve_type(&from, reference);
                edges.push(TypeEdge {
                    source: EdgeSource::Type,
                    source_id: ty.id,
                    target_id,
                    target,
                    relation: TypeRelation::Contains,
                    location,
                });
            }
        }
        edges
    }

    fn resolve_function_type_refs(
        &self,
        pending: &[PendingFunction<'a>],
        functions: &[Function],
    ) -> Vec<TypeEdge> {
        let mut edges = Vec::new();
        for (p, function) in pending.iter().zip(functions.iter()) {
            let fallback = function.span.map(|s| s.start()).unwrap_or_default();
            for type_ref in &p.raw.type_refs {
                let name = type_ref.name.trim();
                if name.is_empty() {
                    continue;
                }
                let raw = RawSymbolRef {
                    module: type_ref.module.clone(),
                    name: name.to_string(),
                };
                let (target, target_id) = self.resolve_type(&p.key.module, &raw);
                let location = if type_ref.line > 0 {
                    Location::new(type_ref.line, type_ref.col)
                } else {
                    fallback
                };
                edges.push(TypeEdge {
                    source: EdgeSource::Function,
                    source_id: function.id,
                    target_id,
                    target,
                    relation: type_ref
                        .relation
                        .as_deref()
                        .map(TypeRelation::parse)
                        .unwrap_or(TypeRelation::Uses),
                    location,
                });
            }
        }
        edges
    }
}

/// Enclosing `where` scopes of a flattened function name, outermost first.
fn local_scopes(name: &str) -> Vec<String> {
    let parts: Vec<&str> = name.split(LOCAL_SEPARATOR).collect();
    (1..=parts.len())
        .map(|n| parts[..n].join(LOCAL_SEPARATOR))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn loads_two_module_dump_and_resolves_cross_module_call() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "A.json",
            r#"{"module":"A","imports":[{"module":"B"}],
                "functions":[{"name":"f","signature":"Int -> Int",
                              "calls":[{"module":"B","name":"g","line":3,"col":7}]}]}"#,
        );
        write(temp.path(), "B.json", r#"{"module":"B","functions":[{"name":"g"}]}"#);

        let report = FactLoader::new(temp.path()).load().unwrap();
        let snapshot = &report.snapshot;

        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(snapshot.modules.len(), 2);
        assert_eq!(snapshot.functions.len(), 2);
        assert_eq!(snapshot.call_edges.len(), 1);

        let edge = &snapshot.call_edges[0];
        let callee = snapshot.functions.iter().find(|f| f.key.name == "g").unwrap();
        assert_eq!(edge.callee_id, Some(callee.id));
        assert_eq!(edge.location, Location::new(3, 7));

        let import = &snapshot.imports[0];
        assert_eq!(import.imported_module_id, Some(2));
    }

    #[test]
    fn malformed_file_is_skipped_with_warning() {
        let temp = tempdir().unwrap();
        write(temp.path(), "A.json", r#"{"module":"A"}"#);
        write(temp.path(), "Broken.json", r#"{"module": "#);
        write(temp.path(), "NoName.json", r#"{"functions":[]}"#);

        let report = FactLoader::new(temp.path()).load().unwrap();

        assert_eq!(report.snapshot.modules.len(), 1);
        assert_eq!(report.warnings.len(), 2);
        assert!(report
            .warnings
            .iter()
            .all(|w| w.kind == ErrorKind::IngestionPartialWarning));
        assert_eq!(report.files_scanned, 3);
    }

    #[test]
    fn zero_parsable_modules_is_fatal() {
        let temp = tempdir().unwrap();
        write(temp.path(), "Broken.json", "not json");

        let err = FactLoader::new(temp.path()).load().unwrap_err();
        assert!(matches!(err, FactsError::NoModules { failures: 1, .. }));
    }

    #[test]
    fn missing_root_is_invalid_path() {
        let temp = tempdir().unwrap();
        let err = FactLoader::new(temp.path().join("nope")).load().unwrap_err();
        assert!(matches!(err, FactsError::InvalidPath(_)));
    }

    #[test]
    fn duplicate_module_keeps_first_file() {
        let temp = tempdir().unwrap();
        write(temp.path(), "a1.json", r#"{"module":"A","functions":[{"name":"first"}]}"#);
        write(temp.path(), "a2.json", r#"{"module":"A","functions":[{"name":"second"}]}"#);

        let report = FactLoader::new(temp.path()).load().unwrap();

        assert_eq!(report.snapshot.modules.len(), 1);
        assert_eq!(report.snapshot.functions[0].key.name, "first");
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn unresolved_calls_become_dangling_edges() {
        let mut a = RawModule::new("A");
        a.functions.push(RawFunction {
            name: "f".into(),
            calls: vec![crate::dump::RawCall {
                module: Some("Data.List".into()),
                name: "sortOn".into(),
                line: 1,
                col: 1,
            }],
            ..Default::default()
        });

        let report = FactLoader::from_modules(vec![a]).unwrap();
        let edge = &report.snapshot.call_edges[0];

        assert_eq!(edge.callee_id, None);
        assert_eq!(edge.callee, NaturalKey::new("Data.List", "sortOn"));
        assert_eq!(report.snapshot.dangling_call_edges(), 1);
    }

    #[test]
    fn where_functions_are_flattened_and_linked() {
        let raw: RawModule = serde_json::from_str(
            r#"{"module":"A","functions":[{"name":"f","calls":[{"name":"go"}],
                 "where_functions":[{"name":"go","calls":[{"name":"go"}]}]}]}"#,
        )
        .unwrap();

        let report = FactLoader::from_modules(vec![raw]).unwrap();
        let snapshot = report.snapshot;
        let f = snapshot.functions.iter().find(|f| f.key.name == "f").unwrap();
        let go = snapshot
            .functions
            .iter()
            .find(|f| f.key.name == "f::go")
            .unwrap();

        assert_eq!(go.parent_id, Some(f.id));
        // f -> go and the recursive go -> go both resolve to the helper.
        assert!(snapshot
            .call_edges
            .iter()
            .all(|e| e.callee_id == Some(go.id)));
        assert_eq!(snapshot.call_edges.len(), 2);
    }

    #[test]
    fn self_referential_type_produces_self_edge() {
        let raw: RawModule = serde_json::from_str(
            r#"{"module":"M","types":[{"name":"T","kind":"data",
                 "constructors":[{"name":"T","fields":[{"name":"next","type":"T"}]}]}]}"#,
        )
        .unwrap();

        let snapshot = FactLoader::from_modules(vec![raw]).unwrap().snapshot;

        assert_eq!(snapshot.type_edges.len(), 1);
        let edge = &snapshot.type_edges[0];
        assert_eq!(edge.source_id, snapshot.types[0].id);
        assert_eq!(edge.target_id, Some(snapshot.types[0].id));
        assert_eq!(edge.relation, TypeRelation::FieldOf);
        assert_eq!(snapshot.types[0].constructors[0].fields[0].type_id, Some(1));
    }

    #[test]
    fn ids_are_deterministic_across_loads() {
        let build = || {
            let mut b = RawModule::new("B");
            b.functions.push(RawFunction {
                name: "z".into(),
                ..Default::default()
            });
            let mut a = RawModule::new("A");
            a.functions.push(RawFunction {
                name: "y".into(),
                ..Default::default()
            });
            vec![b, a]
        };
        let first = FactLoader::from_modules(build()).unwrap().snapshot;
        let second = FactLoader::from_modules(build()).unwrap().snapshot;

        assert_eq!(first, second);
        assert_eq!(first.modules[0].name, "A");
        assert_eq!(first.functions[0].key, NaturalKey::new("A", "y"));
    }

    #[test]
    fn reversed_span_is_dropped_with_warning() {
        let raw: RawModule = serde_json::from_str(
            r#"{"module":"A","functions":[{"name":"f",
                 "span":{"start_line":9,"start_col":1,"end_line":3,"end_col":1}}]}"#,
        )
        .unwrap();

        let report = FactLoader::from_modules(vec![raw]).unwrap();

        assert_eq!(report.snapshot.functions[0].span, None);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn local_scopes_are_outermost_first() {
        assert_eq!(
            local_scopes("f::go::loop"),
            vec!["f".to_string(), "f::go".to_string(), "f::go::loop".to_string()]
        );
    }
}

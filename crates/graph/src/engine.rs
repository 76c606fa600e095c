use crate::error::Result;
use crate::traversal::{Step, Traversal};
use crate::types::{
    ContextEntry, CrossModuleDependencies, CrossModuleEdges, Direction, EdgeKind, FunctionContext,
    ModuleCoupling, ModuleDependencies, NodeKind, NodeRef, Subgraph,
};
use codefacts_facts::{EdgeSource, EntityId, EntityRef, NaturalKey};
use codefacts_protocol::{Limits, Listing, NamePattern, NotFound, Page};
use codefacts_store::{CallCount, CallSite, ModuleCallCount, ReadSession};
use std::collections::{BTreeMap, BTreeSet};

/// Default hop count for type graphs when the caller does not pass one.
pub const DEFAULT_TYPE_DEPTH: usize = 3;

/// Graph operations over one read session.
pub struct GraphEngine<'s> {
    session: &'s ReadSession,
    limits: Limits,
}

impl<'s> GraphEngine<'s> {
    pub fn new(session: &'s ReadSession, limits: Limits) -> Self {
        Self { session, limits }
    }

    fn traversal(&self, depth: usize) -> Traversal {
        let (depth, depth_clamped) = self.limits.depth(depth);
        Traversal {
            depth,
            depth_clamped,
            max_nodes: self.limits.max_results,
        }
    }

    /// Functions reachable from `root` within `depth` call hops.
    pub fn call_graph(&self, root: &EntityRef, depth: usize, direction: Direction) -> Result<Subgraph> {
        let traversal = self.traversal(depth);
        let Some(function) = self.session.function_ref(root)? else {
            return Ok(Subgraph::not_found(
                root.to_string(),
                traversal.depth,
                NotFound::new("function", root.to_string()),
            ));
        };

        let session = self.session;
        traversal.run(NodeRef::function(function.key), function.id, |_, id| {
            let mut steps = Vec::new();
            if direction.forward() {
                steps.extend(session.callees_of(id)?.into_iter().map(|site| Step {
                    node: NodeRef::function(site.callee),
                    id: site.callee_id,
                    kind: EdgeKind::Calls,
                    location: Some(site.location),
                    outgoing: true,
                }));
            }
            if direction.backward() {
                steps.extend(session.callers_of(id)?.into_iter().map(|site| Step {
                    node: NodeRef::function(site.caller),
                    id: Some(site.caller_id),
                    kind: EdgeKind::Calls,
                    location: Some(site.location),
                    outgoing: false,
                }));
            }
            Ok(steps)
        })
    }

    /// Types `root` depends on, plus the types and functions depending on it
    /// when `include_dependents` is set. Function nodes are never expanded.
    pub fn type_dependency_graph(
        &self,
        root: &EntityRef,
        include_dependents: bool,
        depth: Option<usize>,
    ) -> Result<Subgraph> {
        let traversal = self.traversal(depth.unwrap_or(DEFAULT_TYPE_DEPTH));
        let Some(ty) = self.session.type_ref(root)? else {
            return Ok(Subgraph::not_found(
                root.to_string(),
                traversal.depth,
                NotFound::new("type", root.to_string()),
            ));
        };

        let session = self.session;
        traversal.run(NodeRef::type_def(ty.key), ty.id, |current, id| {
            if current.kind != NodeKind::Type {
                return Ok(Vec::new());
            }
            let mut steps: Vec<Step> = session
                .type_uses_from(EdgeSource::Type, id)?
                .into_iter()
                .map(|edge| Step {
                    node: NodeRef::type_def(edge.target),
                    id: edge.target_id,
                    kind: edge.relation.into(),
                    location: Some(edge.location),
                    outgoing: true,
                })
                .collect();
            if include_dependents {
                steps.extend(session.type_uses_to(id)?.into_iter().map(|edge| {
                    let node = match edge.source {
                        EdgeSource::Type => NodeRef::type_def(edge.source_key),
                        EdgeSource::Function => NodeRef::function(edge.source_key),
                    };
                    Step {
                        node,
                        id: Some(edge.source_id),
                        kind: edge.relation.into(),
                        location: Some(edge.location),
                        outgoing: false,
                    }
                }));
            }
            Ok(steps)
        })
    }

    /// Modules reachable over import edges. Imports of modules outside the
    /// snapshot show up as dangling leaves.
    pub fn import_graph(&self, root_module: &str, depth: usize, direction: Direction) -> Result<Subgraph> {
        let traversal = self.traversal(depth);
        let Some(module) = self.session.module(root_module)? else {
            return Ok(Subgraph::not_found(
                root_module.to_string(),
                traversal.depth,
                NotFound::new("module", root_module),
            ));
        };

        let session = self.session;
        traversal.run(NodeRef::module(module.name), module.id, |current, _| {
            let name = &current.key.module;
            let mut steps = Vec::new();
            if direction.forward() {
                steps.extend(session.imports_of(name)?.into_iter().map(|import| Step {
                    node: NodeRef::module(import.imported_module),
                    id: import.imported_module_id,
                    kind: EdgeKind::Imports,
                    location: Some(import.location),
                    outgoing: true,
                }));
            }
            if direction.backward() {
                steps.extend(session.importers_of(name)?.into_iter().map(|import| Step {
                    node: NodeRef::module(import.module),
                    id: Some(import.module_id),
                    kind: EdgeKind::Imports,
                    location: Some(import.location),
                    outgoing: false,
                }));
            }
            Ok(steps)
        })
    }

    /// Call edges from functions owned by `source` into functions owned by `target`.
    ///
    /// Names without `*` must match a module exactly; a missing module on either
    /// end yields a not-found marker instead of an empty list. Calls that stay
    /// inside one module are never reported, so a pair of patterns that both
    /// match only the same module always comes back empty.
    pub fn cross_module_closure(
        &self,
        source: &NamePattern,
        target: &NamePattern,
        page: Page,
    ) -> Result<CrossModuleEdges> {
        let mut edges = self.session.cross_module_calls(source, target, page)?;
        if edges.is_empty() {
            for pattern in [source, target] {
                if !pattern.has_wildcard() && self.session.module(pattern.as_str())?.is_none() {
                    edges = Listing::not_found(page, NotFound::new("module", pattern.as_str()));
                    break;
                }
            }
        }
        Ok(CrossModuleEdges {
            source: source.as_str().to_string(),
            target: target.as_str().to_string(),
            edges,
        })
    }

    pub fn callers(&self, root: &EntityRef, page: Page) -> Result<Listing<CallSite>> {
        match self.resolve(root)? {
            Some(id) => Ok(self.session.callers(id, page)?),
            None => Ok(Listing::not_found(page, NotFound::new("function", root.to_string()))),
        }
    }

    pub fn callees(&self, root: &EntityRef, page: Page) -> Result<Listing<CallSite>> {
        match self.resolve(root)? {
            Some(id) => Ok(self.session.callees(id, page)?),
            None => Ok(Listing::not_found(page, NotFound::new("function", root.to_string()))),
        }
    }

    pub fn most_called(&self, module: Option<&NamePattern>, page: Page) -> Result<Listing<CallCount>> {
        Ok(self.session.most_called(module, page)?)
    }

    /// Direct imports and direct importers of one module.
    pub fn module_dependencies(&self, module: &str) -> Result<ModuleDependencies> {
        let not_found = match self.session.module(module)? {
            Some(_) => None,
            None => Some(NotFound::new("module", module)),
        };
        let (imports, imported_by) = if not_found.is_some() {
            (Vec::new(), Vec::new())
        } else {
            (self.session.imports_of(module)?, self.session.importers_of(module)?)
        };
        Ok(ModuleDependencies {
            module: module.to_string(),
            imports,
            imported_by,
            not_found,
        })
    }

    /// Module-to-module call volume plus per-module coupling.
    ///
    /// `module` keeps pairs where either end matches and metrics for matching
    /// modules; `threshold` drops pairs and modules with fewer calls. The
    /// snapshot-wide totals ignore both filters.
    pub fn cross_module_dependencies(
        &self,
        module: Option<&NamePattern>,
        threshold: u64,
        page: Page,
    ) -> Result<CrossModuleDependencies> {
        let counts = self.session.module_call_counts()?;
        let matches = |name: &str| module.map_or(true, |pattern| pattern.matches(name));

        let mut metrics: BTreeMap<&str, ModuleCoupling> = BTreeMap::new();
        for count in &counts {
            let caller = metrics
                .entry(count.caller_module.as_str())
                .or_insert_with(|| coupling(&count.caller_module));
            caller.outgoing += count.calls;
            caller.total += count.calls;
            let callee = metrics
                .entry(count.callee_module.as_str())
                .or_insert_with(|| coupling(&count.callee_module));
            callee.incoming += count.calls;
            callee.total += count.calls;
        }
        let module_count = metrics.len();
        let total_cross_module_calls = counts.iter().map(|c| c.calls).sum();

        let mut coupled: Vec<ModuleCoupling> = metrics
            .into_values()
            .filter(|m| m.total >= threshold && matches(m.module.as_str()))
            .collect();
        coupled.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.module.cmp(&b.module)));

        let mut dependencies: Vec<ModuleCallCount> = counts
            .into_iter()
            .filter(|c| {
                c.calls >= threshold
                    && (matches(c.caller_module.as_str()) || matches(c.callee_module.as_str()))
            })
            .collect();
        dependencies.sort_by(|a, b| {
            b.calls
                .cmp(&a.calls)
                .then_with(|| a.caller_module.cmp(&b.caller_module))
                .then_with(|| a.callee_module.cmp(&b.callee_module))
        });

        Ok(CrossModuleDependencies {
            threshold,
            module_count,
            total_cross_module_calls,
            dependencies: Listing::paginate(dependencies, page),
            coupling: Listing::paginate(coupled, page),
        })
    }

    /// The functions and types `root` refers to, split into its own module and
    /// the rest. `where` helpers count as local.
    pub fn function_context(
        &self,
        root: &EntityRef,
        include_local: bool,
        include_external: bool,
    ) -> Result<FunctionContext> {
        let Some(function) = self.session.function_ref(root)? else {
            return Ok(FunctionContext {
                function: root.to_string(),
                definition: None,
                local_functions: Vec::new(),
                external_functions: Vec::new(),
                local_types: Vec::new(),
                external_types: Vec::new(),
                truncated: false,
                not_found: Some(NotFound::new("function", root.to_string())),
            });
        };
        let home = function.key.module.clone();
        let wanted = |key: &NaturalKey| {
            if key.module == home {
                include_local
            } else {
                include_external
            }
        };

        let mut functions: BTreeMap<NaturalKey, ContextEntry> = BTreeMap::new();
        for site in self.session.callees_of(function.id)? {
            if site.callee == function.key || !wanted(&site.callee) {
                continue;
            }
            match functions.get_mut(&site.callee) {
                Some(entry) => entry.sites += 1,
                None => {
                    let signature = match site.callee_id {
                        Some(id) => self.session.function_by_id(id)?.and_then(|f| f.signature),
                        None => None,
                    };
                    functions.insert(
                        site.callee.clone(),
                        ContextEntry {
                            key: site.callee,
                            id: site.callee_id,
                            signature,
                            type_kind: None,
                            sites: 1,
                        },
                    );
                }
            }
        }

        let mut types: BTreeMap<NaturalKey, ContextEntry> = BTreeMap::new();
        for edge in self.session.type_uses_from(EdgeSource::Function, function.id)? {
            if !wanted(&edge.target) {
                continue;
            }
            match types.get_mut(&edge.target) {
                Some(entry) => entry.sites += 1,
                None => {
                    let type_kind = match edge.target_id {
                        Some(id) => self.session.type_by_id(id)?.map(|t| t.kind),
                        None => None,
                    };
                    types.insert(
                        edge.target.clone(),
                        ContextEntry {
                            key: edge.target,
                            id: edge.target_id,
                            signature: None,
                            type_kind,
                            sites: 1,
                        },
                    );
                }
            }
        }

        let cap = self.limits.max_results;
        let mut truncated = false;
        let mut split = |entries: BTreeMap<NaturalKey, ContextEntry>| {
            let (mut local, mut external): (Vec<_>, Vec<_>) =
                entries.into_values().partition(|e| e.key.module == home);
            for section in [&mut local, &mut external] {
                if section.len() > cap {
                    section.truncate(cap);
                    truncated = true;
                }
            }
            (local, external)
        };
        let (local_functions, external_functions) = split(functions);
        let (local_types, external_types) = split(types);

        let referenced: BTreeSet<&str> = external_functions
            .iter()
            .chain(&external_types)
            .map(|e| e.key.module.as_str())
            .collect();
        log::debug!(
            "{} refers to {} local and {} external entities across {} module(s)",
            function.key,
            local_functions.len() + local_types.len(),
            external_functions.len() + external_types.len(),
            referenced.len()
        );

        Ok(FunctionContext {
            function: function.key.to_string(),
            definition: Some(function),
            local_functions,
            external_functions,
            local_types,
            external_types,
            truncated,
            not_found: None,
        })
    }

    fn resolve(&self, root: &EntityRef) -> Result<Option<EntityId>> {
        Ok(self.session.function_ref(root)?.map(|f| f.id))
    }
}


fn coupling(module: &str) -> ModuleCoupling {
    ModuleCoupling {
        module: module.to_string(),
        incoming: 0,
        outgoing: 0,
        total: 0,
    }
}

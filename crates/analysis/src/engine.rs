use crate::complexity::{ComplexityCache, ComplexityScore};
use crate::error::Result;
use crate::imports::{
    check_import, import_statement, required_modules, ImportedModule, RequiredImport, UnusedImport,
};
use crate::patterns::{PatternSpec, PatternTarget};
use crate::similarity::{self, FunctionProfile, SimilarityGroup, SimilarityMatch};
use codefacts_facts::{EdgeSource, EntityId, EntityRef, NaturalKey, TypeDef};
use codefacts_protocol::{Limits, Listing, NamePattern, NotFound, Page};
use codefacts_store::{CallSite, LocatedElement, ReadSession, Statistics};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<NotFound>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarFunctions {
    pub function: String,
    pub threshold: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub threshold_clamped: bool,
    pub matches: Listing<SimilarityMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityGroups {
    pub threshold: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub threshold_clamped: bool,
    pub min_group_size: usize,
    /// Functions actually compared.
    pub candidates: usize,
    /// Set when the scope held more than `max_results` functions and only the
    /// first `max_results` (by module, then name) were compared.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub candidates_truncated: bool,
    pub groups: Listing<SimilarityGroup>,
}

/// One hit of `find_patterns`; which field is set depends on the target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum PatternMatch {
    Function {
        id: EntityId,
        key: NaturalKey,
        arity: u32,
        calls: u32,
        complexity: u32,
    },
    Type {
        #[serde(flatten)]
        ty: TypeDef,
        self_referential: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementAt {
    pub module: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
    /// Innermost element first.
    pub elements: Vec<LocatedElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<NotFound>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionImports {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// One entry per module, in module order.
    pub imports: Vec<RequiredImport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<NotFound>,
}

/// Pattern, similarity and metric operations over one read session.
pub struct AnalysisEngine<'s> {
    session: &'s ReadSession,
    limits: Limits,
    cache: &'s ComplexityCache,
}

impl<'s> AnalysisEngine<'s> {
    pub fn new(session: &'s ReadSession, limits: Limits, cache: &'s ComplexityCache) -> Self {
        Self {
            session,
            limits,
            cache,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn complexity(&self, function: &EntityRef) -> Result<ComplexityResult> {
        let generation = self.session.generation();
        let id = match function {
            EntityRef::Id(id) => Some(*id),
            EntityRef::Key(key) => self.session.function(key)?.map(|f| f.id),
        };
        if let Some(hit) = id.and_then(|id| self.cache.get(generation, id)) {
            return Ok(ComplexityResult {
                complexity: Some(hit),
                not_found: None,
            });
        }

        let facts = match id {
            Some(id) => self.session.function_facts_for(id)?,
            None => None,
        };
        Ok(match facts {
            Some(facts) => {
                let score = ComplexityScore::from_facts(&facts);
                self.cache.insert(generation, &score);
                ComplexityResult {
                    complexity: Some(score),
                    not_found: None,
                }
            }
            None => ComplexityResult {
                complexity: None,
                not_found: Some(NotFound::new("function", function.to_string())),
            },
        })
    }

    /// Functions at or above `min_complexity`, highest score first.
    pub fn complexity_report(
        &self,
        scope: Option<&NamePattern>,
        min_complexity: u32,
        page: Page,
    ) -> Result<Listing<ComplexityScore>> {
        let generation = self.session.generation();
        let mut scores: Vec<ComplexityScore> = self
            .session
            .function_facts(scope)?
            .iter()
            .map(|facts| {
                let score = ComplexityScore::from_facts(facts);
                self.cache.insert(generation, &score);
                score
            })
            .filter(|s| s.score >= min_complexity)
            .collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        Ok(Listing::paginate(scores, page))
    }

    /// Every other function scoring at least `threshold` against `function`.
    /// The function itself is never part of its own result.
    pub fn similar_functions(
        &self,
        function: &EntityRef,
        threshold: f64,
        page: Page,
    ) -> Result<SimilarFunctions> {
        let (threshold, threshold_clamped) = similarity::clamp_threshold(threshold);
        let target = match self.session.function_ref(function)? {
            Some(f) => self.session.function_facts_for(f.id)?,
            None => None,
        };
        let Some(target) = target else {
            return Ok(SimilarFunctions {
                function: function.to_string(),
                threshold,
                threshold_clamped,
                matches: Listing::not_found(page, NotFound::new("function", function.to_string())),
            });
        };

        let target = FunctionProfile::from_facts(&target);
        let candidates: Vec<FunctionProfile> = self
            .session
            .function_facts(None)?
            .iter()
            .map(FunctionProfile::from_facts)
            .collect();
        let matches = similarity::matches_for(&target, &candidates, threshold);
        log::debug!(
            "{} of {} functions within {threshold} of {}",
            matches.len(),
            candidates.len(),
            target.key
        );
        Ok(SimilarFunctions {
            function: target.key.to_string(),
            threshold,
            threshold_clamped,
            matches: Listing::paginate(matches, page),
        })
    }

    /// Grouping compares every pair, so the candidate set is capped at
    /// `max_results` functions to keep the work bounded.
    pub fn group_similar_functions(
        &self,
        scope: Option<&NamePattern>,
        threshold: f64,
        min_group_size: usize,
        page: Page,
    ) -> Result<SimilarityGroups> {
        let (threshold, threshold_clamped) = similarity::clamp_threshold(threshold);
        let min_group_size = min_group_size.max(2);
        let mut facts = self.session.function_facts(scope)?;
        let candidates_truncated = facts.len() > self.limits.max_results;
        if candidates_truncated {
            log::warn!(
                "grouping the first {} of {} functions; narrow the module scope to cover the rest",
                self.limits.max_results,
                facts.len()
            );
            facts.truncate(self.limits.max_results);
        }
        let profiles: Vec<FunctionProfile> = facts.iter().map(FunctionProfile::from_facts).collect();
        let groups = similarity::group(&profiles, threshold, min_group_size);
        Ok(SimilarityGroups {
            threshold,
            threshold_clamped,
            min_group_size,
            candidates: profiles.len(),
            candidates_truncated,
            groups: Listing::paginate(groups, page),
        })
    }

    pub fn find_patterns(
        &self,
        scope: Option<&NamePattern>,
        spec: &PatternSpec,
        page: Page,
    ) -> Result<Listing<PatternMatch>> {
        spec.validate()?;
        let hits: Vec<PatternMatch> = match spec.target {
            PatternTarget::Function => self
                .session
                .function_facts(scope)?
                .into_iter()
                .filter(|facts| spec.matches_function(facts))
                .map(|facts| {
                    let score = ComplexityScore::from_facts(&facts);
                    PatternMatch::Function {
                        id: facts.function.id,
                        key: facts.function.key,
                        arity: facts.function.arity,
                        calls: facts.calls,
                        complexity: score.score,
                    }
                })
                .collect(),
            PatternTarget::Type => self
                .session
                .type_facts(scope)?
                .into_iter()
                .filter(|facts| spec.matches_type(facts))
                .map(|facts| PatternMatch::Type {
                    ty: facts.ty,
                    self_referential: facts.self_referential,
                })
                .collect(),
        };
        Ok(Listing::paginate(hits, page))
    }

    pub fn find_unused_imports(
        &self,
        scope: Option<&NamePattern>,
        page: Page,
    ) -> Result<Listing<UnusedImport>> {
        let with_instances = self.session.modules_with_instances()?;
        let mut references: BTreeMap<String, Vec<NaturalKey>> = BTreeMap::new();
        let mut known: BTreeMap<String, bool> = BTreeMap::new();
        let mut unused = Vec::new();

        for import in self.session.imports_in(scope)? {
            if !references.contains_key(&import.module) {
                let refs = self.session.module_references(&import.module)?;
                references.insert(import.module.clone(), refs);
            }
            let in_snapshot = match known.get(&import.imported_module) {
                Some(known) => *known,
                None => {
                    let found = import.imported_module_id.is_some()
                        || self.session.module(&import.imported_module)?.is_some();
                    known.insert(import.imported_module.clone(), found);
                    found
                }
            };
            let imported = ImportedModule {
                in_snapshot,
                declares_instances: with_instances.contains(&import.imported_module),
            };
            let refs = references
                .get(&import.module)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if let Some(reason) = check_import(&import, refs, imported) {
                unused.push(UnusedImport { import, reason });
            }
        }

        let modules: BTreeSet<&str> = unused.iter().map(|u| u.import.module.as_str()).collect();
        log::debug!(
            "{} unused import(s) across {} module(s)",
            unused.len(),
            modules.len()
        );
        Ok(Listing::paginate(unused, page))
    }

    pub fn match_call_pattern(
        &self,
        caller: &NamePattern,
        callee: &NamePattern,
        page: Page,
    ) -> Result<Listing<CallSite>> {
        Ok(self.session.call_sites_matching(caller, callee, page)?)
    }

    pub fn element_at(&self, module: &str, line: u32, col: Option<u32>) -> Result<ElementAt> {
        let elements = self.session.elements_at(module, line, col)?;
        let not_found = if elements.is_empty() {
            let key = match col {
                Some(col) => format!("{module}:{line}:{col}"),
                None => format!("{module}:{line}"),
            };
            Some(NotFound::new("element", key))
        } else {
            None
        };
        Ok(ElementAt {
            module: module.to_string(),
            line,
            col,
            elements,
            not_found,
        })
    }

    /// Modules a function (its `where` helpers included) needs imported for the
    /// functions and types it refers to, ready-made import statements included.
    pub fn function_imports(&self, function: &EntityRef) -> Result<FunctionImports> {
        let Some(root) = self.session.function_ref(function)? else {
            return Ok(FunctionImports {
                function: function.to_string(),
                module: None,
                imports: Vec::new(),
                not_found: Some(NotFound::new("function", function.to_string())),
            });
        };
        let home = root.key.module.clone();

        let mut references: Vec<NaturalKey> = Vec::new();
        let mut visited: BTreeSet<EntityId> = BTreeSet::new();
        let mut pending = vec![root.id];
        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            references.extend(self.session.callees_of(id)?.into_iter().map(|site| site.callee));
            references.extend(
                self.session
                    .type_uses_from(EdgeSource::Function, id)?
                    .into_iter()
                    .map(|edge| edge.target),
            );
            pending.extend(self.session.where_helpers(id)?.into_iter().map(|helper| helper.id));
        }

        let present: BTreeSet<String> = self
            .session
            .imports_of(&home)?
            .into_iter()
            .filter(|import| !import.hiding)
            .map(|import| import.imported_module)
            .collect();
        let mut imports = Vec::new();
        for (module, symbols) in required_modules(&home, &references) {
            let in_snapshot = self.session.module(&module)?.is_some();
            let statement = import_statement(&module, symbols.iter().map(String::as_str));
            imports.push(RequiredImport {
                already_imported: present.contains(&module),
                statement,
                symbols: symbols.into_iter().collect(),
                in_snapshot,
                module,
            });
        }
        Ok(FunctionImports {
            function: root.key.to_string(),
            module: Some(home),
            imports,
            not_found: None,
        })
    }

    pub fn code_statistics(&self) -> Result<Statistics> {
        Ok(self.session.statistics()?)
    }
}

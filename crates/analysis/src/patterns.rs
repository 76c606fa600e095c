//! Structural predicates evaluated against normalized facts.

use crate::complexity::ComplexityInputs;
use crate::error::{AnalysisError, Result};
use codefacts_facts::{TypeKind, LOCAL_SEPARATOR};
use codefacts_protocol::NamePattern;
use codefacts_store::{FunctionFacts, TypeFacts};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTarget {
    #[default]
    Function,
    Type,
}

/// A closed set of predicates, all of which must hold. Unknown keys are
/// rejected when the pattern is parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSpec {
    #[serde(default)]
    pub target: PatternTarget,
    /// Local name pattern; `*` is a wildcard, otherwise substring.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub no_outgoing_calls: Option<bool>,
    #[serde(default)]
    pub min_arity: Option<u32>,
    #[serde(default)]
    pub max_arity: Option<u32>,
    #[serde(default)]
    pub min_calls: Option<u32>,
    #[serde(default)]
    pub max_calls: Option<u32>,
    #[serde(default)]
    pub has_where_functions: Option<bool>,
    #[serde(default)]
    pub min_complexity: Option<u32>,
    #[serde(default)]
    pub recursive: Option<bool>,
    /// Include `where` helpers (`parent::local`). Off unless asked for.
    #[serde(default)]
    pub include_local: bool,

    #[serde(default)]
    pub kind: Option<TypeKind>,
    #[serde(default)]
    pub self_referential: Option<bool>,
    #[serde(default)]
    pub min_constructors: Option<u32>,
}

impl PatternSpec {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let spec: Self = serde_json::from_value(value)
            .map_err(|e| AnalysisError::InvalidPattern(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        let function_only = [
            ("no_outgoing_calls", self.no_outgoing_calls.is_some()),
            ("min_arity", self.min_arity.is_some()),
            ("max_arity", self.max_arity.is_some()),
            ("min_calls", self.min_calls.is_some()),
            ("max_calls", self.max_calls.is_some()),
            ("has_where_functions", self.has_where_functions.is_some()),
            ("min_complexity", self.min_complexity.is_some()),
            ("recursive", self.recursive.is_some()),
            ("include_local", self.include_local),
        ];
        let type_only = [
            ("kind", self.kind.is_some()),
            ("self_referential", self.self_referential.is_some()),
            ("min_constructors", self.min_constructors.is_some()),
        ];
        let (foreign, target) = match self.target {
            PatternTarget::Function => (&type_only[..], "function"),
            PatternTarget::Type => (&function_only[..], "type"),
        };
        if let Some((name, _)) = foreign.iter().find(|(_, set)| *set) {
            return Err(AnalysisError::InvalidPattern(format!(
                "predicate `{name}` does not apply to target `{target}`"
            )));
        }
        for (label, min, max) in [
            ("arity", self.min_arity, self.max_arity),
            ("calls", self.min_calls, self.max_calls),
        ] {
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(AnalysisError::InvalidPattern(format!(
                        "min_{label} ({min}) is greater than max_{label} ({max})"
                    )));
                }
            }
        }
        Ok(())
    }

    fn name_pattern(&self) -> Option<NamePattern> {
        self.name.as_deref().map(NamePattern::new).filter(|p| !p.is_empty())
    }

    pub fn matches_function(&self, facts: &FunctionFacts) -> bool {
        let function = &facts.function;
        if !self.include_local && function.key.name.contains(LOCAL_SEPARATOR) {
            return false;
        }
        if let Some(pattern) = self.name_pattern() {
            if !pattern.matches(&function.key.name) {
                return false;
            }
        }
        let checks = [
            self.no_outgoing_calls.map(|want| (facts.calls == 0) == want),
            self.min_arity.map(|n| function.arity >= n),
            self.max_arity.map(|n| function.arity <= n),
            self.min_calls.map(|n| facts.calls >= n),
            self.max_calls.map(|n| facts.calls <= n),
            self.has_where_functions.map(|want| (facts.where_functions > 0) == want),
            self.min_complexity
                .map(|n| ComplexityInputs::from_facts(facts).score() >= n),
            self.recursive.map(|want| (facts.self_calls > 0) == want),
        ];
        checks.into_iter().flatten().all(|ok| ok)
    }

    pub fn matches_type(&self, facts: &TypeFacts) -> bool {
        if let Some(pattern) = self.name_pattern() {
            if !pattern.matches(&facts.ty.key.name) {
                return false;
            }
        }
        let checks = [
            self.kind.map(|kind| facts.ty.kind == kind),
            self.self_referential.map(|want| facts.self_referential == want),
            self.min_constructors
                .map(|n| facts.ty.constructors.len() as u32 >= n),
        ];
        checks.into_iter().flatten().all(|ok| ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codefacts_facts::{Function, NaturalKey};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn facts(name: &str, arity: u32, calls: u32, self_calls: u32) -> FunctionFacts {
        FunctionFacts {
            function: Function {
                id: 1,
                module_id: 1,
                key: NaturalKey::new("M", name),
                signature: None,
                span: None,
                arity,
                branches: 0,
                match_depth: 0,
                parent_id: None,
            },
            calls,
            self_calls,
            where_functions: 0,
            callees: BTreeSet::new(),
        }
    }

    #[test]
    fn unknown_predicates_are_rejected() {
        let err = PatternSpec::from_json(json!({"no_outgoing_calls": true, "lines_of_code": 3}))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPattern(_)));
    }

    #[test]
    fn predicates_must_fit_the_target() {
        let err = PatternSpec::from_json(json!({"target": "type", "min_arity": 1})).unwrap_err();
        assert!(err.to_string().contains("min_arity"));
        assert!(PatternSpec::from_json(json!({"self_referential": true})).is_err());
        assert!(PatternSpec::from_json(json!({"min_calls": 4, "max_calls": 1})).is_err());
    }

    #[test]
    fn predicates_are_anded() {
        let spec = PatternSpec::from_json(json!({"no_outgoing_calls": true, "min_arity": 2})).unwrap();
        assert!(spec.matches_function(&facts("leaf", 2, 0, 0)));
        assert!(!spec.matches_function(&facts("leaf", 1, 0, 0)));
        assert!(!spec.matches_function(&facts("busy", 3, 1, 0)));
    }

    #[test]
    fn local_helpers_are_skipped_by_default() {
        let spec = PatternSpec::from_json(json!({"recursive": true})).unwrap();
        assert!(spec.matches_function(&facts("go", 1, 2, 1)));
        assert!(!spec.matches_function(&facts("outer::go", 1, 2, 1)));

        let with_local = PatternSpec::from_json(json!({"recursive": true, "include_local": true})).unwrap();
        assert!(with_local.matches_function(&facts("outer::go", 1, 2, 1)));
    }

    #[test]
    fn name_pattern_uses_wildcards() {
        let spec = PatternSpec::from_json(json!({"name": "parse*"})).unwrap();
        assert!(spec.matches_function(&facts("parseHeader", 0, 0, 0)));
        assert!(!spec.matches_function(&facts("runParser", 0, 0, 0)));
    }
}

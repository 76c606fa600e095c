//! Conservative unused-import detection.
//!
//! An import is only reported when nothing the importing module refers to can
//! have come from it. Hiding imports and imports of modules that declare
//! instances are never reported.

use codefacts_facts::{Import, NaturalKey};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnusedReason {
    /// None of the explicitly imported names is referenced.
    NoListedSymbolUsed { symbols: Vec<String> },
    /// Nothing in the importing module refers into the imported module.
    NoReferenceIntoModule,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnusedImport {
    pub import: Import,
    #[serde(flatten)]
    pub reason: UnusedReason,
}

/// What is known about the imported module.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportedModule {
    pub in_snapshot: bool,
    pub declares_instances: bool,
}

/// A module one function needs in scope and the names it uses from there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredImport {
    pub module: String,
    pub symbols: Vec<String>,
    pub in_snapshot: bool,
    /// The function's module already has a non-hiding import of it.
    pub already_imported: bool,
    pub statement: String,
}

fn is_operator(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| !(c.is_alphanumeric() || c == '_'))
}

/// `import Data.Map (insert, lookup, (!))`, symbols in the given order.
pub fn import_statement<'a>(module: &str, symbols: impl IntoIterator<Item = &'a str>) -> String {
    let listed: Vec<String> = symbols
        .into_iter()
        .map(|name| {
            if is_operator(name) {
                format!("({name})")
            } else {
                name.to_string()
            }
        })
        .collect();
    if listed.is_empty() {
        format!("import {module}")
    } else {
        format!("import {module} ({})", listed.join(", "))
    }
}

/// Group referenced keys by module, skipping `home` and unqualified names.
pub fn required_modules(home: &str, references: &[NaturalKey]) -> Vec<(String, BTreeSet<String>)> {
    let mut grouped: Vec<(String, BTreeSet<String>)> = Vec::new();
    let mut sorted: Vec<&NaturalKey> = references
        .iter()
        .filter(|key| !key.module.is_empty() && key.module != home)
        .collect();
    sorted.sort();
    for key in sorted {
        match grouped.last_mut() {
            Some((module, names)) if *module == key.module => {
                names.insert(key.name.clone());
            }
            _ => grouped.push((key.module.clone(), BTreeSet::from([key.name.clone()]))),
        }
    }
    grouped
}

/// Names brought into scope by one import-list entry: `Map`, `Maybe(Just, Nothing)`,
/// `Foldable(..)`, `(<>)`.
fn listed_names(entry: &str) -> Vec<String> {
    let entry = entry.trim();
    if let Some(op) = entry.strip_prefix('(').and_then(|e| e.strip_suffix(')')) {
        return vec![op.trim().to_string()];
    }
    match entry.split_once('(') {
        Some((head, rest)) => {
            let mut names = vec![head.trim().to_string()];
            names.extend(
                rest.trim_end_matches(')')
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty() && *n != "..")
                    .map(String::from),
            );
            names
        }
        None => vec![entry.to_string()],
    }
}

/// `references` are the natural keys of every call, type and instance
/// reference leaving the importing module, dangling ones included.
pub fn check_import(
    import: &Import,
    references: &[NaturalKey],
    imported: ImportedModule,
) -> Option<UnusedReason> {
    if import.hiding || imported.declares_instances {
        return None;
    }
    let target = import.imported_module.as_str();

    if !import.symbols.is_empty() {
        let names: Vec<String> = import.symbols.iter().flat_map(|s| listed_names(s)).collect();
        let used = references.iter().any(|r| {
            (r.module == target || r.module.is_empty()) && names.iter().any(|n| *n == r.name)
        });
        return (!used).then(|| UnusedReason::NoListedSymbolUsed {
            symbols: import.symbols.clone(),
        });
    }

    let used = references.iter().any(|r| r.module == target)
        || (!imported.in_snapshot && references.iter().any(|r| r.module.is_empty()));
    (!used).then_some(UnusedReason::NoReferenceIntoModule)
}

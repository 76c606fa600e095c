//! Cross-reference resolution from raw `(module?, name)` references to entity ids.

use crate::model::{EntityId, NaturalKey};
use std::collections::{BTreeSet, HashMap};

/// Separator between an enclosing function and its `where`-bound helper.
pub const LOCAL_SEPARATOR: &str = "::";

#[derive(Debug, Default)]
pub(crate) struct SymbolIndex {
    by_key: HashMap<NaturalKey, EntityId>,
    by_local: HashMap<String, Vec<NaturalKey>>,
}

impl SymbolIndex {
    pub(crate) fn insert(&mut self, key: NaturalKey, id: EntityId) {
        if !key.name.contains(LOCAL_SEPARATOR) {
            self.by_local
                .entry(key.name.clone())
                .or_default()
                .push(key.clone());
        }
        self.by_key.insert(key, id);
    }

    pub(crate) fn get(&self, key: &NaturalKey) -> Option<EntityId> {
        self.by_key.get(key).copied()
    }

    fn unique_local(&self, name: &str) -> Option<&NaturalKey> {
        match self.by_local.get(name).map(Vec::as_slice) {
            Some([only]) => Some(only),
            _ => None,
        }
    }
}

/// What each module imports, used to disambiguate unqualified references.
#[derive(Debug, Default)]
pub(crate) struct ImportScope {
    imported: HashMap<String, BTreeSet<String>>,
    aliases: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

impl ImportScope {
    pub(crate) fn add(&mut self, module: &str, imported: &str, alias: Option<&str>) {
        self.imported
            .entry(module.to_string())
            .or_default()
            .insert(imported.to_string());
        if let Some(alias) = alias.filter(|a| !a.is_empty()) {
            self.aliases
                .entry(module.to_string())
                .or_default()
                .entry(alias.to_string())
                .or_default()
                .insert(imported.to_string());
        }
    }

    fn imported_by(&self, module: &str) -> impl Iterator<Item = &String> {
        self.imported.get(module).into_iter().flatten()
    }

    fn alias_targets(&self, module: &str, alias: &str) -> Vec<&String> {
        self.aliases
            .get(module)
            .and_then(|aliases| aliases.get(alias))
            .map(|targets| targets.iter().collect())
            .unwrap_or_default()
    }
}

/// Resolve a reference made from `from_module`.
///
/// Order: explicit module (or import alias), enclosing `where` scopes, the
/// owning module, a unique match among imported modules, a unique match in the
/// whole snapshot. Anything else is dangling and keeps the best key we know.
pub(crate) fn resolve(
    index: &SymbolIndex,
    imports: &ImportScope,
    from_module: &str,
    module: Option<&str>,
    name: &str,
    local_scopes: &[String],
) -> (NaturalKey, Option<EntityId>) {
    if let Some(module) = module.map(str::trim).filter(|m| !m.is_empty()) {
        let direct = NaturalKey::new(module, name);
        if let Some(id) = index.get(&direct) {
            return (direct, Some(id));
        }
        let targets = imports.alias_targets(from_module, module);
        for target in &targets {
            let key = NaturalKey::new(target.as_str(), name);
            if let Some(id) = index.get(&key) {
                return (key, Some(id));
            }
        }
        if let [only] = targets.as_slice() {
            return (NaturalKey::new(only.as_str(), name), None);
        }
        return (direct, None);
    }

    for scope in local_scopes.iter().rev() {
        let key = NaturalKey::new(from_module, format!("{scope}{LOCAL_SEPARATOR}{name}"));
        if let Some(id) = index.get(&key) {
            return (key, Some(id));
        }
    }

    let own = NaturalKey::new(from_module, name);
    if let Some(id) = index.get(&own) {
        return (own, Some(id));
    }

    let mut via_imports: Vec<(NaturalKey, EntityId)> = imports
        .imported_by(from_module)
        .filter_map(|m| {
            let key = NaturalKey::new(m.as_str(), name);
            index.get(&key).map(|id| (key, id))
        })
        .collect();
    if via_imports.len() == 1 {
        if let Some((key, id)) = via_imports.pop() {
            return (key, Some(id));
        }
    }

    if let Some(key) = index.unique_local(name) {
        return (key.clone(), index.get(key));
    }

    (NaturalKey::new("", name), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index() -> SymbolIndex {
        let mut index = SymbolIndex::default();
        index.insert(NaturalKey::new("A", "f"), 1);
        index.insert(NaturalKey::new("A", "f::go"), 2);
        index.insert(NaturalKey::new("B", "g"), 3);
        index.insert(NaturalKey::new("C", "g"), 4);
        index.insert(NaturalKey::new("C", "h"), 5);
        index
    }

    #[test]
    fn prefers_local_scope_then_own_module() {
        let index = index();
        let imports = ImportScope::default();
        let (key, id) = resolve(&index, &imports, "A", None, "go", &["f".to_string()]);
        assert_eq!(key, NaturalKey::new("A", "f::go"));
        assert_eq!(id, Some(2));

        let (_, id) = resolve(&index, &imports, "A", None, "f", &[]);
        assert_eq!(id, Some(1));
    }

    #[test]
    fn imports_disambiguate_unqualified_names() {
        let index = index();
        let mut imports = ImportScope::default();
        imports.add("A", "B", None);
        let (key, id) = resolve(&index, &imports, "A", None, "g", &[]);
        assert_eq!(key, NaturalKey::new("B", "g"));
        assert_eq!(id, Some(3));

        // Ambiguous without imports: dangling.
        let (key, id) = resolve(&index, &ImportScope::default(), "A", None, "g", &[]);
        assert_eq!(key, NaturalKey::new("", "g"));
        assert_eq!(id, None);
    }

    #[test]
    fn aliases_map_to_imported_module() {
        let index = index();
        let mut imports = ImportScope::default();
        imports.add("A", "C", Some("Q"));
        imports.add("A", "Data.List", Some("L"));

        let (key, id) = resolve(&index, &imports, "A", Some("Q"), "h", &[]);
        assert_eq!(key, NaturalKey::new("C", "h"));
        assert_eq!(id, Some(5));

        let (key, id) = resolve(&index, &imports, "A", Some("L"), "reverse", &[]);
        assert_eq!(key, NaturalKey::new("Data.List", "reverse"));
        assert_eq!(id, None);
    }

    #[test]
    fn unique_global_name_resolves() {
        let index = index();
        let (key, id) = resolve(&index, &ImportScope::default(), "Z", None, "h", &[]);
        assert_eq!(key, NaturalKey::new("C", "h"));
        assert_eq!(id, Some(5));
    }
}

// Reference registry for named alias definitions
//
// Holds every `[name]: target` declaration found in the corpus, grouped by normalized name, and
// picks a winner when several documents declare the same name.

use parking_lot::Mutex;
use std::{cmp::Ordering, collections::BTreeMap, collections::HashMap};

use crate::{paths::parent_dir, properties::ReferenceDefinition};

/// Lookup key for reference names: trimmed, lower-cased, inner whitespace collapsed to one space.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

type CacheKey = (String, Option<String>);

/// Registry of competing named-reference definitions.
///
/// The registry is a plain value owned by whoever needs it (normally the
/// [IndexStore](crate::index::IndexStore)); there is no process-wide instance.
#[derive(Debug, Default)]
pub struct ReferenceRegistry {
    definitions: BTreeMap<String, Vec<ReferenceDefinition>>,
    cache: Mutex<HashMap<CacheKey, Option<ReferenceDefinition>>>,
}

impl Clone for ReferenceRegistry {
    fn clone(&self) -> Self {
        ReferenceRegistry {
            definitions: self.definitions.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl PartialEq for ReferenceRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.definitions == other.definitions
    }
}

impl ReferenceRegistry {
    pub fn new() -> ReferenceRegistry {
        ReferenceRegistry::default()
    }

    /// Insert `def` under its name. A definition from the same declaring document with the same
    /// target is replaced and returned; definitions from other documents are never touched.
    pub fn add_definition(&mut self, def: ReferenceDefinition) -> Option<ReferenceDefinition> {
        let key = normalize_name(&def.name);
        if key.is_empty() {
            tracing::debug!(
                "[ReferenceRegistry::add_definition] ignoring blank reference name from {}",
                def.source
            );
            return None;
        }
        self.invalidate(&key);
        let entries = self.definitions.entry(key).or_default();
        match entries
            .iter_mut()
            .find(|existing| existing.source == def.source && existing.target == def.target)
        {
            Some(existing) => Some(std::mem::replace(existing, def)),
            None => {
                entries.push(def);
                None
            }
        }
    }

    /// Remove every definition declared by `source`. Names left without definitions are dropped.
    /// Returns the removed definitions.
    pub fn remove_definitions_from(&mut self, source: &str) -> Vec<ReferenceDefinition> {
        let mut removed = Vec::new();
        let mut touched = Vec::new();
        for (name, entries) in self.definitions.iter_mut() {
            let before = entries.len();
            entries.retain(|def| {
                if def.source == source {
                    removed.push(def.clone());
                    false
                } else {
                    true
                }
            });
            if entries.len() != before {
                touched.push(name.clone());
            }
        }
        for name in touched.iter() {
            self.invalidate(name);
            if self
                .definitions
                .get(name)
                .is_some_and(|entries| entries.is_empty())
            {
                self.definitions.remove(name);
            }
        }
        if !removed.is_empty() {
            tracing::debug!(
                "[ReferenceRegistry::remove_definitions_from] removed {} definitions declared by {}",
                removed.len(),
                source
            );
        }
        removed
    }

    /// Replace everything `source` declares with `defs`.
    pub fn replace_definitions_from(&mut self, source: &str, defs: &[ReferenceDefinition]) {
        self.remove_definitions_from(source);
        for def in defs.iter() {
            self.add_definition(def.clone());
        }
    }

    /// Pick the definition a lookup of `name` from document `context` should use.
    ///
    /// Order: declared in the same directory as `context`, then higher priority (default 0), then
    /// lexicographically smaller declaring document, then smaller target.
    pub fn get_best_match(&self, name: &str, context: Option<&str>) -> Option<ReferenceDefinition> {
        let key = normalize_name(name);
        let cache_key = (key.clone(), context.map(str::to_string));
        if let Some(hit) = self.cache.lock().get(&cache_key) {
            return hit.clone();
        }
        let best = self.definitions.get(&key).and_then(|entries| {
            entries
                .iter()
                .min_by(|a, b| Self::compare_for(context, a, b))
                .cloned()
        });
        self.cache.lock().insert(cache_key, best.clone());
        best
    }

    fn compare_for(
        context: Option<&str>,
        a: &ReferenceDefinition,
        b: &ReferenceDefinition,
    ) -> Ordering {
        let same_dir = |def: &ReferenceDefinition| {
            context.is_some_and(|ctx| parent_dir(&def.source) == parent_dir(ctx))
        };
        same_dir(b)
            .cmp(&same_dir(a))
            .then_with(|| b.effective_priority().cmp(&a.effective_priority()))
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.target.cmp(&b.target))
    }

    /// All definitions of `name` in insertion order.
    pub fn get_definitions(&self, name: &str) -> &[ReferenceDefinition] {
        self.definitions
            .get(&normalize_name(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(&normalize_name(name))
    }

    pub fn definitions_from<'a>(
        &'a self,
        source: &'a str,
    ) -> impl Iterator<Item = &'a ReferenceDefinition> + 'a {
        self.definitions
            .values()
            .flatten()
            .filter(move |def| def.source == source)
    }

    /// Normalized names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.definitions.keys()
    }

    /// Number of definitions across all names.
    pub fn len(&self) -> usize {
        self.definitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn clear(&mut self) {
        self.definitions.clear();
        self.clear_cache();
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn invalidate(&self, key: &str) {
        self.cache.lock().retain(|(name, _), _| name != key);
    }

    #[cfg(test)]
    pub(crate) fn cached_lookups(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, target: &str, source: &str) -> ReferenceDefinition {
        ReferenceDefinition::new(name, target, source)
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("  Shared   Ref "), "shared ref");
        let mut registry = ReferenceRegistry::new();
        registry.add_definition(def("Shared  Ref", "a.md", "x.md"));
        assert!(registry.contains("shared ref"));
        assert_eq!(registry.get_definitions("SHARED REF").len(), 1);
    }

    #[test]
    fn add_replaces_only_same_source_and_target() {
        let mut registry = ReferenceRegistry::new();
        assert!(registry.add_definition(def("n", "a.md", "x.md")).is_none());
        assert!(registry.add_definition(def("n", "b.md", "x.md")).is_none());
        assert!(registry.add_definition(def("n", "a.md", "y.md")).is_none());
        let replaced = registry.add_definition(def("n", "a.md", "x.md").with_priority(3));
        assert_eq!(replaced, Some(def("n", "a.md", "x.md")));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get_definitions("n")[0].priority, Some(3));
    }

    #[test]
    fn remove_is_scoped_by_source() {
        let mut registry = ReferenceRegistry::new();
        registry.add_definition(def("shared", "a.md", "x.md"));
        registry.add_definition(def("shared", "b.md", "y.md"));
        registry.add_definition(def("solo", "c.md", "x.md"));
        let removed = registry.remove_definitions_from("x.md");
        assert_eq!(removed.len(), 2);
        assert!(!registry.contains("solo"));
        assert_eq!(registry.get_definitions("shared"), &[def("shared", "b.md", "y.md")]);
    }

    #[test]
    fn best_match_prefers_same_directory() {
        let mut registry = ReferenceRegistry::new();
        registry.add_definition(def("shared", "far.md", "elsewhere/defs.md").with_priority(10));
        registry.add_definition(def("shared", "near.md", "notes/defs.md"));
        let best = registry.get_best_match("shared", Some("notes/query.md")).unwrap();
        assert_eq!(best.target, "near.md");
        // Without context the priority decides.
        let best = registry.get_best_match("shared", None).unwrap();
        assert_eq!(best.target, "far.md");
    }

    #[test]
    fn best_match_priority_then_path() {
        let mut registry = ReferenceRegistry::new();
        registry.add_definition(def("n", "z.md", "b.md"));
        registry.add_definition(def("n", "y.md", "a.md"));
        assert_eq!(registry.get_best_match("n", Some("q.md")).unwrap().target, "y.md");
        registry.add_definition(def("n", "w.md", "c.md").with_priority(1));
        assert_eq!(registry.get_best_match("n", Some("q.md")).unwrap().target, "w.md");
    }

    #[test]
    fn best_match_is_deterministic() {
        let mut registry = ReferenceRegistry::new();
        registry.add_definition(def("n", "b.md", "dir/two.md"));
        registry.add_definition(def("n", "a.md", "dir/one.md"));
        let first = registry.get_best_match("n", Some("dir/q.md"));
        let second = registry.get_best_match("n", Some("dir/q.md"));
        assert_eq!(first, second);
        assert_eq!(first.unwrap().source, "dir/one.md");
        assert!(registry.get_best_match("unknown", None).is_none());
    }

    #[test]
    fn cache_is_invalidated_per_name() {
        let mut registry = ReferenceRegistry::new();
        registry.add_definition(def("a", "1.md", "x.md"));
        registry.add_definition(def("b", "2.md", "x.md"));
        registry.get_best_match("a", None);
        registry.get_best_match("b", None);
        assert_eq!(registry.cached_lookups(), 2);

        registry.add_definition(def("a", "3.md", "y.md").with_priority(5));
        assert_eq!(registry.cached_lookups(), 1);
        assert_eq!(registry.get_best_match("a", None).unwrap().target, "3.md");

        registry.clear_cache();
        assert_eq!(registry.cached_lookups(), 0);
    }
}

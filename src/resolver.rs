//! Mention resolution.
//!
//! A [Resolver] maps the raw target of a [Mention] to a document id. Named reference definitions
//! (see [ReferenceRegistry]) take precedence; everything else goes through tiered filename
//! matching against the document catalog:
//!
//! 1. [MatchTier::Exact]: the raw target (default extension appended, case kept) equals a
//!    document id or file name.
//! 2. [MatchTier::CaseInsensitive]: the canonical forms (see [canonical_target]) are equal.
//! 3. [MatchTier::Fuzzy]: canonical stems are within `fuzzy_max_distance` edits.
//! 4. [MatchTier::Substring]: a document stem contains the target stem. A single hit resolves;
//!    several are only offered as alternatives.
//!
//! Path-qualified targets (`notes/idea`, `../idea`) are tried relative to the mentioning document
//! first, then from the corpus root. Within the exact tiers a document in the mentioning
//! document's directory wins over one elsewhere.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::{
    config::IndexConfig,
    index::Index,
    paths::{
        canonical_stem, canonical_target, file_name, parent_dir, resolve_relative,
        with_default_extension,
    },
    properties::Mention,
    registry::ReferenceRegistry,
};

/// How a target was matched. Ordered from strongest to weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchTier {
    /// Through a named reference definition.
    Registry,
    Exact,
    CaseInsensitive,
    Fuzzy,
    Substring,
}

/// A document a raw target could plausibly mean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub tier: MatchTier,
    /// Edit distance for fuzzy candidates, length difference for substring candidates, 0 otherwise.
    pub distance: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    /// The input mention with `target` and `exists` filled.
    pub mention: Mention,
    pub target: Option<String>,
    pub exists: bool,
    /// Tier that produced `target`; `None` when unresolved.
    pub tier: Option<MatchTier>,
    /// Ranked alternatives excluding `target`, at most `max_candidates` long.
    pub alternatives: Vec<Candidate>,
}

impl ResolutionResult {
    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Outcome {
    target: Option<String>,
    tier: Option<MatchTier>,
    alternatives: Vec<Candidate>,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    id: String,
    dir: String,
    stem_path: String,
    stem_name: String,
}

/// Precomputed lookup tables over the document id set.
#[derive(Debug, Clone, Default)]
struct Catalog {
    entries: Vec<CatalogEntry>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
    by_canonical_id: HashMap<String, Vec<usize>>,
    by_canonical_name: HashMap<String, Vec<usize>>,
}

impl Catalog {
    fn new<'a, I: IntoIterator<Item = &'a str>>(ids: I, default_ext: &str) -> Catalog {
        let mut ids: Vec<&str> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let mut catalog = Catalog::default();
        for (idx, id) in ids.into_iter().enumerate() {
            let name = file_name(id);
            catalog.by_id.insert(id.to_string(), idx);
            catalog.by_name.entry(name.to_string()).or_default().push(idx);
            catalog
                .by_canonical_id
                .entry(canonical_target(id, default_ext))
                .or_default()
                .push(idx);
            catalog
                .by_canonical_name
                .entry(canonical_target(name, default_ext))
                .or_default()
                .push(idx);
            catalog.entries.push(CatalogEntry {
                id: id.to_string(),
                dir: parent_dir(id).to_string(),
                stem_path: canonical_stem(id, default_ext),
                stem_name: canonical_stem(name, default_ext),
            });
        }
        catalog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    tier: MatchTier,
    distance: usize,
    /// 0 for a relative or same-directory match, 1 otherwise.
    proximity: u8,
}

/// Edit distance between `a` and `b`, or `None` once it is certain to exceed `max`.
pub fn edit_distance(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for j in 1..=b.len() {
            let cost = usize::from(*ca != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            row_min = row_min.min(curr[j]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let distance = prev[b.len()];
    (distance <= max).then_some(distance)
}

/// Tiered mention resolver over one document set.
///
/// The resolver caches outcomes per `(raw target, mentioning document)`. The cache must be
/// cleared whenever the document set or the registry changes; [Resolver::set_documents] does so
/// itself and the index store calls [Resolver::clear_cache] after every mutation.
#[derive(Debug)]
pub struct Resolver {
    default_extension: String,
    fuzzy_max_distance: usize,
    max_candidates: usize,
    catalog: Catalog,
    cache: Mutex<HashMap<(String, String), Outcome>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new(&IndexConfig::default())
    }
}

impl Clone for Resolver {
    fn clone(&self) -> Self {
        Resolver {
            default_extension: self.default_extension.clone(),
            fuzzy_max_distance: self.fuzzy_max_distance,
            max_candidates: self.max_candidates,
            catalog: self.catalog.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Resolver {
    pub fn new(config: &IndexConfig) -> Resolver {
        Resolver {
            default_extension: config.default_extension.clone(),
            fuzzy_max_distance: config.fuzzy_max_distance,
            max_candidates: config.max_candidates,
            catalog: Catalog::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the document set resolution matches against.
    pub fn set_documents<'a, I: IntoIterator<Item = &'a str>>(&mut self, ids: I) {
        self.catalog = Catalog::new(ids, &self.default_extension);
        self.clear_cache();
        tracing::trace!(
            "[Resolver::set_documents] catalog holds {} documents",
            self.catalog.entries.len()
        );
    }

    pub fn document_count(&self) -> usize {
        self.catalog.entries.len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Resolve `mention` as written in document `source`.
    pub fn resolve(
        &self,
        mention: &Mention,
        source: &str,
        registry: &ReferenceRegistry,
    ) -> ResolutionResult {
        let key = (mention.raw.trim().to_string(), source.to_string());
        let cached = self.cache.lock().get(&key).cloned();
        let outcome = match cached {
            Some(outcome) => outcome,
            None => {
                let outcome = self.compute(&mention.raw, source, registry);
                self.cache.lock().insert(key, outcome.clone());
                outcome
            }
        };
        let mut mention = mention.clone();
        mention.target = outcome.target.clone();
        mention.exists = outcome.target.is_some();
        ResolutionResult {
            exists: mention.exists,
            target: outcome.target,
            tier: outcome.tier,
            alternatives: outcome.alternatives,
            mention,
        }
    }

    /// Ranked documents `raw` could mean, best first, including the one resolution would pick.
    /// `limit` defaults to `max_candidates`. Named reference definitions are not consulted.
    pub fn get_candidates(&self, raw: &str, limit: Option<usize>) -> Vec<Candidate> {
        self.rank(raw, None, true)
            .into_iter()
            .take(limit.unwrap_or(self.max_candidates))
            .map(|(idx, rank)| self.candidate(idx, rank))
            .collect()
    }

    /// Whether document `a` has a resolved mention of `b`.
    pub fn is_linked(index: &Index, a: &str, b: &str) -> bool {
        index
            .document(a)
            .is_some_and(|record| record.mentions.iter().any(|m| m.targets(b)))
    }

    /// The first resolved mention of `b` in document `a`.
    pub fn get_mention(index: &Index, a: &str, b: &str) -> Option<Mention> {
        index
            .document(a)?
            .mentions
            .iter()
            .find(|m| m.targets(b))
            .cloned()
    }

    fn compute(&self, raw: &str, source: &str, registry: &ReferenceRegistry) -> Outcome {
        let ranked = self.rank(raw, Some(source), true);

        if let Some(def) = registry.get_best_match(raw, Some(source)) {
            let target = self
                .rank(&def.target, Some(&def.source), false)
                .first()
                .map(|(idx, _)| self.catalog.entries[*idx].id.clone());
            tracing::trace!(
                "[Resolver::compute] '{raw}' in {source} names reference '{}' declared in {} -> {:?}",
                def.name,
                def.source,
                target
            );
            let alternatives = self.alternatives(&ranked, target.as_deref());
            return Outcome {
                tier: target.as_ref().map(|_| MatchTier::Registry),
                target,
                alternatives,
            };
        }

        let substring_hits = ranked
            .iter()
            .filter(|(_, rank)| rank.tier == MatchTier::Substring)
            .count();
        let winner = ranked.first().and_then(|(idx, rank)| {
            if rank.tier == MatchTier::Substring && substring_hits > 1 {
                None
            } else {
                Some((self.catalog.entries[*idx].id.clone(), rank.tier))
            }
        });
        let alternatives = self.alternatives(&ranked, winner.as_ref().map(|(id, _)| id.as_str()));
        match winner {
            Some((target, tier)) => Outcome {
                target: Some(target),
                tier: Some(tier),
                alternatives,
            },
            None => {
                tracing::trace!("[Resolver::compute] '{raw}' in {source} is unresolved");
                Outcome {
                    target: None,
                    tier: None,
                    alternatives,
                }
            }
        }
    }

    fn candidate(&self, idx: usize, rank: Rank) -> Candidate {
        Candidate {
            id: self.catalog.entries[idx].id.clone(),
            tier: rank.tier,
            distance: rank.distance,
        }
    }

    fn alternatives(&self, ranked: &[(usize, Rank)], target: Option<&str>) -> Vec<Candidate> {
        ranked
            .iter()
            .filter(|(idx, _)| Some(self.catalog.entries[*idx].id.as_str()) != target)
            .take(self.max_candidates)
            .map(|(idx, rank)| self.candidate(*idx, *rank))
            .collect()
    }

    /// Every catalog entry `raw` matches in any tier, best rank per entry, sorted best first.
    /// `approximate == false` restricts matching to the exact and case-insensitive tiers.
    fn rank(&self, raw: &str, source: Option<&str>, approximate: bool) -> Vec<(usize, Rank)> {
        let raw = raw.trim().replace('\\', "/");
        let mut best: BTreeMap<usize, Rank> = BTreeMap::new();
        if canonical_target(&raw, &self.default_extension).is_empty() {
            return Vec::new();
        }
        let mut offer = |idx: usize, rank: Rank| {
            best.entry(idx)
                .and_modify(|existing| {
                    if rank < *existing {
                        *existing = rank
                    }
                })
                .or_insert(rank);
        };
        let ext = self.default_extension.as_str();
        let catalog = &self.catalog;
        let qualified = raw.contains('/');
        let relative = source
            .filter(|_| qualified && !raw.starts_with('/'))
            .and_then(|src| resolve_relative(src, &raw));

        // (form, proximity) pairs; the relative reading of a path goes first.
        let mut forms: Vec<(&str, u8)> = Vec::new();
        if let Some(rel) = relative.as_deref() {
            forms.push((rel, 0));
        }
        forms.push((raw.as_str(), 1));

        for (form, proximity) in forms.iter().copied() {
            let exact = with_default_extension(form, ext);
            let canonical = canonical_target(form, ext);
            let exact_hits = catalog.by_id.get(&exact).into_iter().copied();
            let canonical_hits = catalog
                .by_canonical_id
                .get(&canonical)
                .into_iter()
                .flatten()
                .copied();
            if qualified {
                for idx in exact_hits {
                    offer(idx, Rank { tier: MatchTier::Exact, distance: 0, proximity });
                }
                for idx in canonical_hits {
                    offer(idx, Rank { tier: MatchTier::CaseInsensitive, distance: 0, proximity });
                }
            } else {
                let near = |idx: usize| -> u8 {
                    let same_dir =
                        source.is_some_and(|src| parent_dir(src) == catalog.entries[idx].dir);
                    if same_dir {
                        0
                    } else {
                        1
                    }
                };
                let name_hits = catalog.by_name.get(&exact).into_iter().flatten().copied();
                for idx in exact_hits.chain(name_hits) {
                    offer(idx, Rank { tier: MatchTier::Exact, distance: 0, proximity: near(idx) });
                }
                let canonical_name_hits = catalog
                    .by_canonical_name
                    .get(&canonical)
                    .into_iter()
                    .flatten()
                    .copied();
                for idx in canonical_hits.chain(canonical_name_hits) {
                    offer(
                        idx,
                        Rank { tier: MatchTier::CaseInsensitive, distance: 0, proximity: near(idx) },
                    );
                }
            }
        }

        if approximate {
            let stems: Vec<String> = forms
                .iter()
                .map(|(form, _)| canonical_stem(form, ext))
                .filter(|stem| !stem.is_empty())
                .collect();
            for (idx, entry) in catalog.entries.iter().enumerate() {
                let entry_stem = if qualified { &entry.stem_path } else { &entry.stem_name };
                for stem in stems.iter() {
                    let stem_len = stem.chars().count();
                    if stem_len > self.fuzzy_max_distance {
                        if let Some(distance) =
                            edit_distance(stem, entry_stem, self.fuzzy_max_distance)
                        {
                            offer(idx, Rank { tier: MatchTier::Fuzzy, distance, proximity: 0 });
                        }
                    }
                    if entry_stem.contains(stem.as_str()) {
                        let distance = entry_stem.chars().count() - stem_len;
                        offer(idx, Rank { tier: MatchTier::Substring, distance, proximity: 0 });
                    }
                }
            }
        }

        let mut ranked: Vec<(usize, Rank)> = best.into_iter().collect();
        ranked.sort_by(|(a_idx, a), (b_idx, b)| {
            a.cmp(b)
                .then_with(|| catalog.entries[*a_idx].id.cmp(&catalog.entries[*b_idx].id))
        });
        ranked
    }
}

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::properties::{now_ms, DocumentRecord, Mention};

/// Summary block of an [Index] snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub document_count: usize,
    pub mention_count: usize,
    pub built_at_ms: u64,
    /// Incremented on every committed mutation of the owning store.
    pub generation: u64,
}

/// The corpus-wide link index.
///
/// `documents` is the flat id-keyed table every other map is derived from. `backlinks` maps a
/// target id to the ids of documents with a resolved mention of it, `tags` maps a folded tag to
/// the documents carrying it. Both derived maps are only changed through the record operations
/// below, which keep them in step with the records.
///
/// Callers receive snapshots as `Arc<Index>` and cannot mutate them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    documents: BTreeMap<String, DocumentRecord>,
    backlinks: BTreeMap<String, BTreeSet<String>>,
    tags: BTreeMap<String, BTreeSet<String>>,
    summary: IndexSummary,
}

impl Index {
    pub fn empty() -> Index {
        Index::default()
    }

    /// Assemble an index from finished records, deriving backlinks and tags.
    pub fn from_records<I: IntoIterator<Item = DocumentRecord>>(records: I, generation: u64) -> Index {
        let mut index = Index::default();
        for record in records {
            index.documents.insert(record.id.clone(), record);
        }
        let ids: Vec<String> = index.documents.keys().cloned().collect();
        for id in ids.iter() {
            index.add_contributions(id);
        }
        index.refresh_summary(generation);
        index
    }

    pub fn documents(&self) -> &BTreeMap<String, DocumentRecord> {
        &self.documents
    }

    pub fn document(&self, id: &str) -> Option<&DocumentRecord> {
        self.documents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn backlinks(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.backlinks
    }

    pub fn backlinks_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.backlinks.get(id)
    }

    pub fn tags(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.tags
    }

    pub fn documents_with_tag(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.tags.get(tag)
    }

    pub fn summary(&self) -> &IndexSummary {
        &self.summary
    }

    pub fn mention_count(&self) -> usize {
        self.documents.values().map(|r| r.mentions.len()).sum()
    }

    /// Insert or replace a record, moving its tag and backlink contributions along with it.
    pub(crate) fn insert_record(&mut self, record: DocumentRecord) -> Option<DocumentRecord> {
        let id = record.id.clone();
        let old = self.remove_record(&id);
        self.documents.insert(id.clone(), record);
        self.add_contributions(&id);
        old
    }

    /// Remove a record and everything it contributed to the derived maps.
    pub(crate) fn remove_record(&mut self, id: &str) -> Option<DocumentRecord> {
        self.strip_contributions(id);
        self.documents.remove(id)
    }

    /// Replace the mentions of `id` (normally with freshly resolved ones), updating backlinks.
    pub(crate) fn set_mentions(&mut self, id: &str, mentions: Vec<Mention>) {
        if !self.documents.contains_key(id) {
            return;
        }
        self.strip_backlinks_from(id);
        if let Some(record) = self.documents.get_mut(id) {
            record.mentions = mentions;
        }
        self.add_backlinks_from(id);
    }

    pub(crate) fn refresh_summary(&mut self, generation: u64) {
        self.summary = IndexSummary {
            document_count: self.documents.len(),
            mention_count: self.mention_count(),
            built_at_ms: now_ms(),
            generation,
        };
    }

    fn add_contributions(&mut self, id: &str) {
        self.add_backlinks_from(id);
        if let Some(record) = self.documents.get(id) {
            for tag in record.tags.iter() {
                self.tags
                    .entry(tag.clone())
                    .or_default()
                    .insert(id.to_string());
            }
        }
    }

    fn strip_contributions(&mut self, id: &str) {
        self.strip_backlinks_from(id);
        let Some(record) = self.documents.get(id) else {
            return;
        };
        for tag in record.tags.iter() {
            if let Some(ids) = self.tags.get_mut(tag) {
                ids.remove(id);
                if ids.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    fn add_backlinks_from(&mut self, id: &str) {
        let Some(record) = self.documents.get(id) else {
            return;
        };
        for target in record.targets() {
            self.backlinks
                .entry(target.to_string())
                .or_default()
                .insert(id.to_string());
        }
    }

    fn strip_backlinks_from(&mut self, id: &str) {
        let Some(record) = self.documents.get(id) else {
            return;
        };
        for target in record.targets() {
            if let Some(sources) = self.backlinks.get_mut(target) {
                sources.remove(id);
                if sources.is_empty() {
                    self.backlinks.remove(target);
                }
            }
        }
    }

    /// Backlinks and tags exactly as the records imply them.
    fn expected_maps(
        &self,
    ) -> (
        BTreeMap<String, BTreeSet<String>>,
        BTreeMap<String, BTreeSet<String>>,
    ) {
        let mut backlinks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut tags: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (id, record) in self.documents.iter() {
            for target in record.targets() {
                backlinks
                    .entry(target.to_string())
                    .or_default()
                    .insert(id.clone());
            }
            for tag in record.tags.iter() {
                tags.entry(tag.clone()).or_default().insert(id.clone());
            }
        }
        (backlinks, tags)
    }

    /// Check the laws tying the derived maps to the records. Returns one line per violation; an
    /// empty result means the index is consistent.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let (expected_backlinks, expected_tags) = self.expected_maps();

        for (id, record) in self.documents.iter() {
            if *id != record.id {
                errors.push(format!(
                    "[Index::check_invariants] record keyed {id} carries id {}",
                    record.id
                ));
            }
            for mention in record.mentions.iter() {
                if mention.exists != mention.target.is_some() {
                    errors.push(format!(
                        "[Index::check_invariants] {mention} has exists={} but target {:?}",
                        mention.exists, mention.target
                    ));
                }
                if let Some(target) = mention.target.as_deref() {
                    if !self.documents.contains_key(target) {
                        errors.push(format!(
                            "[Index::check_invariants] {mention} targets missing document {target}"
                        ));
                    }
                    let claimed = self
                        .backlinks
                        .get(target)
                        .is_some_and(|sources| sources.contains(id));
                    if !claimed {
                        errors.push(format!(
                            "[Index::check_invariants] {id} -> {target} has no backlink entry"
                        ));
                    }
                }
            }
        }

        for (target, sources) in self.backlinks.iter() {
            if sources.is_empty() {
                errors.push(format!(
                    "[Index::check_invariants] empty backlink set for {target}"
                ));
            }
            for source in sources.iter() {
                let claimed = expected_backlinks
                    .get(target)
                    .is_some_and(|expected| expected.contains(source));
                if !claimed {
                    errors.push(format!(
                        "[Index::check_invariants] backlink {target} <- {source} is not claimed by any mention"
                    ));
                }
            }
        }

        if self.tags != expected_tags {
            for (tag, ids) in self.tags.iter() {
                if ids.is_empty() {
                    errors.push(format!("[Index::check_invariants] empty tag bucket {tag}"));
                } else if expected_tags.get(tag) != Some(ids) {
                    errors.push(format!(
                        "[Index::check_invariants] tag {tag} lists {ids:?}, records imply {:?}",
                        expected_tags.get(tag)
                    ));
                }
            }
            for tag in expected_tags.keys() {
                if !self.tags.contains_key(tag) {
                    errors.push(format!("[Index::check_invariants] tag {tag} is missing"));
                }
            }
        }

        if self.summary.document_count != self.documents.len() {
            errors.push(format!(
                "[Index::check_invariants] summary counts {} documents, index holds {}",
                self.summary.document_count,
                self.documents.len()
            ));
        }
        errors
    }

    /// Repair inconsistencies instead of failing on them: mentions pointing at documents that no
    /// longer exist are marked unresolved, orphaned or missing backlink entries are rewritten and
    /// empty tag buckets are dropped. Returns a description of every repair made.
    pub fn repair(&mut self) -> Vec<String> {
        let mut repairs = Vec::new();

        let ids: BTreeSet<String> = self.documents.keys().cloned().collect();
        for record in self.documents.values_mut() {
            for mention in record.mentions.iter_mut() {
                let stale = mention
                    .target
                    .as_deref()
                    .is_some_and(|target| !ids.contains(target));
                if stale || mention.exists != mention.target.is_some() {
                    repairs.push(format!(
                        "unresolved {mention} (target {:?} is not indexed)",
                        mention.target
                    ));
                    if stale {
                        mention.target = None;
                    }
                    mention.exists = mention.target.is_some();
                }
            }
        }

        let (expected_backlinks, expected_tags) = self.expected_maps();
        for (target, sources) in self.backlinks.iter() {
            match expected_backlinks.get(target) {
                None => repairs.push(format!("dropped orphaned backlinks of {target}")),
                Some(expected) => {
                    for stale in sources.difference(expected) {
                        repairs.push(format!("dropped backlink {target} <- {stale}"));
                    }
                }
            }
        }
        for (target, expected) in expected_backlinks.iter() {
            let current = self.backlinks.get(target);
            for missing in expected.iter() {
                if !current.is_some_and(|sources| sources.contains(missing)) {
                    repairs.push(format!("restored backlink {target} <- {missing}"));
                }
            }
        }
        for (tag, ids) in self.tags.iter() {
            if ids.is_empty() {
                repairs.push(format!("dropped empty tag bucket {tag}"));
            } else if expected_tags.get(tag) != Some(ids) {
                repairs.push(format!("rewrote tag bucket {tag}"));
            }
        }
        for tag in expected_tags.keys() {
            if !self.tags.contains_key(tag) {
                repairs.push(format!("restored tag bucket {tag}"));
            }
        }

        if !repairs.is_empty() {
            for repair in repairs.iter() {
                tracing::warn!("[Index::repair] {repair}");
            }
            self.backlinks = expected_backlinks;
            self.tags = expected_tags;
            self.summary.document_count = self.documents.len();
            self.summary.mention_count = self.mention_count();
        }
        repairs
    }

    #[cfg(test)]
    pub(crate) fn backlinks_mut(&mut self) -> &mut BTreeMap<String, BTreeSet<String>> {
        &mut self.backlinks
    }

    #[cfg(test)]
    pub(crate) fn tags_mut(&mut self) -> &mut BTreeMap<String, BTreeSet<String>> {
        &mut self.tags
    }
}

use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    codec::{fingerprint, MentionParser, ParseDiagnostic, ParsedDocument},
    config::IndexConfig,
    error::LinkIndexError,
    event::{IndexEvent, IndexEventKind},
    index::Index,
    paths::file_stem,
    properties::{now_ms, DocumentMetadata, DocumentRecord, Mention, ReferenceDefinition},
    query::GraphQuery,
    registry::ReferenceRegistry,
    resolver::{Candidate, ResolutionResult, Resolver},
    source::DocumentSource,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub document_count: usize,
    pub mention_count: usize,
    pub tag_count: usize,
    pub last_build_duration_ms: u64,
}

/// Everything a full rebuild produced besides the index itself.
#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub index: Arc<Index>,
    /// Documents that could not be read, with the reason. They are absent from `index`.
    pub failures: Vec<(String, LinkIndexError)>,
    /// Parse diagnostics of documents that had any.
    pub diagnostics: BTreeMap<String, Vec<ParseDiagnostic>>,
    /// Repairs made by the validation pass after the rebuild.
    pub repaired: Vec<String>,
}

/// Changes that arrived while a rebuild was running, applied once it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingChange {
    Update(String),
    Remove,
}

#[derive(Debug)]
struct StoreState {
    index: Arc<Index>,
    registry: ReferenceRegistry,
    resolver: Resolver,
    graph: Arc<GraphQuery>,
    diagnostics: BTreeMap<String, Vec<ParseDiagnostic>>,
    last_build_duration_ms: u64,
}

/// Drains queued changes and resets the build flag when a rebuild leaves, including on error.
struct BuildGuard<'a>(&'a IndexStore);

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_build();
    }
}

/// Owner of the link index.
///
/// Reads ([IndexStore::get_index], [IndexStore::graph], resolution) never block on a running
/// mutation: they see the last committed snapshot. Mutations are serialized. A second
/// [IndexStore::rebuild] while one runs fails with [LinkIndexError::BuildInProgress]; updates and
/// removals issued during a rebuild are queued and applied after it, the last change per
/// document winning.
pub struct IndexStore {
    source: Box<dyn DocumentSource + Send + Sync>,
    config: IndexConfig,
    parser: MentionParser,
    state: RwLock<StoreState>,
    write_lock: Mutex<()>,
    building: AtomicBool,
    pending: Mutex<BTreeMap<String, PendingChange>>,
    subscribers: Mutex<Vec<UnboundedSender<IndexEvent>>>,
}

impl IndexStore {
    pub fn new(
        source: Box<dyn DocumentSource + Send + Sync>,
        registry: ReferenceRegistry,
        config: IndexConfig,
    ) -> IndexStore {
        let index = Arc::new(Index::empty());
        IndexStore {
            source,
            parser: MentionParser::new(&config),
            state: RwLock::new(StoreState {
                graph: Arc::new(GraphQuery::new(index.clone())),
                index,
                registry,
                resolver: Resolver::new(&config),
                diagnostics: BTreeMap::new(),
                last_build_duration_ms: 0,
            }),
            config,
            write_lock: Mutex::new(()),
            building: AtomicBool::new(false),
            pending: Mutex::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn source(&self) -> &(dyn DocumentSource + Send + Sync) {
        self.source.as_ref()
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::SeqCst)
    }

    /// The current snapshot.
    pub fn get_index(&self) -> Arc<Index> {
        self.state.read().index.clone()
    }

    /// Graph queries over the current snapshot.
    pub fn graph(&self) -> Arc<GraphQuery> {
        self.state.read().graph.clone()
    }

    pub fn get_stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            document_count: state.index.len(),
            mention_count: state.index.summary().mention_count,
            tag_count: state.index.tags().len(),
            last_build_duration_ms: state.last_build_duration_ms,
        }
    }

    /// Diagnostics of the last parse of `id`.
    pub fn get_diagnostics(&self, id: &str) -> Vec<ParseDiagnostic> {
        self.state
            .read()
            .diagnostics
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Receive an [IndexEvent] after every committed mutation. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> UnboundedReceiver<IndexEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn resolve(&self, mention: &Mention, source: &str) -> ResolutionResult {
        let state = self.state.read();
        state.resolver.resolve(mention, source, &state.registry)
    }

    pub fn get_candidates(&self, raw: &str, limit: Option<usize>) -> Vec<Candidate> {
        self.state.read().resolver.get_candidates(raw, limit)
    }

    pub fn is_linked(&self, a: &str, b: &str) -> bool {
        Resolver::is_linked(&self.get_index(), a, b)
    }

    pub fn get_mention(&self, a: &str, b: &str) -> Option<Mention> {
        Resolver::get_mention(&self.get_index(), a, b)
    }

    pub fn get_best_match(&self, name: &str, context: Option<&str>) -> Option<ReferenceDefinition> {
        self.state.read().registry.get_best_match(name, context)
    }

    /// A copy of the registry as of the last committed mutation.
    pub fn registry(&self) -> ReferenceRegistry {
        self.state.read().registry.clone()
    }

    /// Full two-pass rebuild from the document source.
    pub fn rebuild(&self, show_progress: bool) -> Result<Arc<Index>, LinkIndexError> {
        Ok(self.run_rebuild(show_progress)?.index)
    }

    pub fn rebuild_with_report(&self) -> Result<RebuildReport, LinkIndexError> {
        self.run_rebuild(false)
    }

    fn run_rebuild(&self, show_progress: bool) -> Result<RebuildReport, LinkIndexError> {
        if self
            .building
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("[IndexStore::rebuild] rejected, a rebuild is already running");
            return Err(LinkIndexError::BuildInProgress);
        }
        let _guard = BuildGuard(self);
        let _write = self.write_lock.lock();
        self.rebuild_locked(show_progress)
    }

    fn rebuild_locked(&self, show_progress: bool) -> Result<RebuildReport, LinkIndexError> {
        let started = Instant::now();
        let entries = self.source.entries()?;
        let total = entries.len();
        let progress_interval = self.config.progress_interval.max(1);
        tracing::debug!("[IndexStore::rebuild] indexing {total} documents");

        let (previous, mut registry, generation) = {
            let state = self.state.read();
            (
                state.index.clone(),
                state.registry.clone(),
                state.index.summary().generation + 1,
            )
        };
        for id in previous.ids() {
            registry.remove_definitions_from(id);
        }

        // Pass 1: parse everything. Mentions stay unresolved until every document is known.
        let mut records: BTreeMap<String, DocumentRecord> = BTreeMap::new();
        let mut failures = Vec::new();
        let mut diagnostics = BTreeMap::new();
        for (n, entry) in entries.iter().enumerate() {
            match self.source.read(&entry.id) {
                Ok(text) => {
                    let parsed = self.parser.parse(&entry.id, &text);
                    if !parsed.diagnostics.is_empty() {
                        diagnostics.insert(entry.id.clone(), parsed.diagnostics.clone());
                    }
                    registry.replace_definitions_from(&entry.id, &parsed.definitions);
                    records.insert(entry.id.clone(), record_from(parsed, entry.modified_ms));
                }
                Err(e) => {
                    tracing::warn!("[IndexStore::rebuild] skipping {}: {e}", entry.id);
                    failures.push((entry.id.clone(), e));
                }
            }
            if show_progress && (n + 1) % progress_interval == 0 {
                tracing::info!("[IndexStore::rebuild] parsed {}/{} documents", n + 1, total);
            }
        }

        // Pass 2: resolve against the complete document set, then derive backlinks.
        let mut resolver = Resolver::new(&self.config);
        resolver.set_documents(records.keys().map(String::as_str));
        for (id, record) in records.iter_mut() {
            record.mentions = record
                .mentions
                .iter()
                .map(|m| resolver.resolve(m, id, &registry).mention)
                .collect();
        }
        let mut index = Index::from_records(records.into_values(), generation);

        let repaired = index.repair();
        let duration_ms = started.elapsed().as_millis() as u64;
        if show_progress {
            tracing::info!(
                "[IndexStore::rebuild] indexed {} documents ({} mentions, {} failures) in {duration_ms}ms",
                index.len(),
                index.summary().mention_count,
                failures.len()
            );
        }

        let index = self.commit(index, registry, resolver, Some(diagnostics.clone()), |state| {
            state.last_build_duration_ms = duration_ms;
        });
        self.notify(IndexEvent::new(IndexEventKind::Rebuilt, index.clone()));
        if !repaired.is_empty() {
            self.notify(IndexEvent::new(IndexEventKind::Repaired, index.clone()));
        }
        Ok(RebuildReport {
            index,
            failures,
            diagnostics,
            repaired,
        })
    }

    /// Index new content for `id`, inserting the document if it is unknown. Unchanged content is
    /// a no-op.
    pub fn update(&self, id: &str, text: &str) -> Result<(), LinkIndexError> {
        if self.enqueue_if_building(id, || PendingChange::Update(text.to_string())) {
            tracing::debug!("[IndexStore::update] rebuild running, queued {id}");
            return Ok(());
        }
        let _write = self.write_lock.lock();
        self.update_locked(id, text)
    }

    fn update_locked(&self, id: &str, text: &str) -> Result<(), LinkIndexError> {
        let (mut index, mut registry, mut resolver, old_definitions) = {
            let state = self.state.read();
            let old = state.index.document(id);
            if old.is_some_and(|record| record.fingerprint == fingerprint(text)) {
                tracing::debug!("[IndexStore::update] {id} is unchanged");
                return Ok(());
            }
            (
                (*state.index).clone(),
                state.registry.clone(),
                state.resolver.clone(),
                old.map(|record| record.definitions.clone()),
            )
        };

        let parsed = self.parser.parse(id, text);
        let diagnostics = parsed.diagnostics.clone();
        let is_new = old_definitions.is_none();
        let definitions_changed = old_definitions.as_deref() != Some(parsed.definitions.as_slice());
        if definitions_changed {
            registry.replace_definitions_from(id, &parsed.definitions);
        }
        index.insert_record(record_from(parsed, now_ms()));

        if is_new {
            resolver.set_documents(index.ids());
        }
        if is_new || definitions_changed {
            // The candidate set or the registry changed: any document may now resolve differently.
            resolve_all(&mut index, &resolver, &registry);
        } else {
            resolve_document(&mut index, id, &resolver, &registry);
        }
        index.refresh_summary(index.summary().generation + 1);
        tracing::debug!(
            "[IndexStore::update] indexed {id} (new: {is_new}, definitions changed: {definitions_changed})"
        );

        let index = self.commit(index, registry, resolver, None, |state| {
            if diagnostics.is_empty() {
                state.diagnostics.remove(id);
            } else {
                state.diagnostics.insert(id.to_string(), diagnostics);
            }
        });
        self.notify(IndexEvent::new(
            IndexEventKind::DocumentUpdated(id.to_string()),
            index,
        ));
        Ok(())
    }

    /// Drop `id` from the index. Unknown ids are a no-op.
    pub fn remove(&self, id: &str) -> Result<(), LinkIndexError> {
        if self.enqueue_if_building(id, || PendingChange::Remove) {
            tracing::debug!("[IndexStore::remove] rebuild running, queued {id}");
            return Ok(());
        }
        let _write = self.write_lock.lock();
        self.remove_locked(id)
    }

    fn remove_locked(&self, id: &str) -> Result<(), LinkIndexError> {
        let (mut index, mut registry, mut resolver) = {
            let state = self.state.read();
            if !state.index.contains(id) {
                tracing::debug!("[IndexStore::remove] {id} is not indexed");
                return Ok(());
            }
            (
                (*state.index).clone(),
                state.registry.clone(),
                state.resolver.clone(),
            )
        };

        index.remove_record(id);
        registry.remove_definitions_from(id);
        resolver.set_documents(index.ids());
        resolve_all(&mut index, &resolver, &registry);
        index.refresh_summary(index.summary().generation + 1);
        tracing::debug!("[IndexStore::remove] removed {id}");

        let index = self.commit(index, registry, resolver, None, |state| {
            state.diagnostics.remove(id);
        });
        self.notify(IndexEvent::new(
            IndexEventKind::DocumentRemoved(id.to_string()),
            index,
        ));
        Ok(())
    }

    /// Run the validation pass on the current snapshot, committing a repaired index if anything
    /// was inconsistent.
    pub fn repair(&self) -> Vec<String> {
        let _write = self.write_lock.lock();
        let (mut index, registry, resolver) = {
            let state = self.state.read();
            (
                (*state.index).clone(),
                state.registry.clone(),
                state.resolver.clone(),
            )
        };
        let repaired = index.repair();
        if !repaired.is_empty() {
            index.refresh_summary(index.summary().generation + 1);
            let index = self.commit(index, registry, resolver, None, |_| {});
            self.notify(IndexEvent::new(IndexEventKind::Repaired, index));
        }
        repaired
    }

    /// Queue `change` for `id` when a rebuild is running. The flag is read under the queue lock,
    /// which [IndexStore::finish_build] also holds when it clears the flag, so a queued change is
    /// always drained.
    fn enqueue_if_building<F: FnOnce() -> PendingChange>(&self, id: &str, change: F) -> bool {
        let mut pending = self.pending.lock();
        if !self.is_building() {
            return false;
        }
        pending.insert(id.to_string(), change());
        true
    }

    /// Apply changes queued during a rebuild until none are left, then clear the build flag.
    fn finish_build(&self) {
        let _write = self.write_lock.lock();
        loop {
            let batch = {
                let mut pending = self.pending.lock();
                if pending.is_empty() {
                    self.building.store(false, Ordering::SeqCst);
                    return;
                }
                std::mem::take(&mut *pending)
            };
            tracing::debug!(
                "[IndexStore::finish_build] applying {} changes queued during rebuild",
                batch.len()
            );
            for (id, change) in batch {
                let result = match change {
                    PendingChange::Update(text) => self.update_locked(&id, &text),
                    PendingChange::Remove => self.remove_locked(&id),
                };
                if let Err(e) = result {
                    tracing::warn!("[IndexStore::finish_build] queued change to {id} failed: {e}");
                }
            }
        }
    }

    /// Swap in a new snapshot. Every cache keyed on the old snapshot is dropped: the resolver and
    /// registry caches are cleared and a fresh [GraphQuery] replaces the old one.
    fn commit<F: FnOnce(&mut StoreState)>(
        &self,
        index: Index,
        registry: ReferenceRegistry,
        resolver: Resolver,
        diagnostics: Option<BTreeMap<String, Vec<ParseDiagnostic>>>,
        finish: F,
    ) -> Arc<Index> {
        let index = Arc::new(index);
        resolver.clear_cache();
        registry.clear_cache();
        let mut state = self.state.write();
        state.graph = Arc::new(GraphQuery::new(index.clone()));
        state.index = index.clone();
        state.registry = registry;
        state.resolver = resolver;
        if let Some(diagnostics) = diagnostics {
            state.diagnostics = diagnostics;
        }
        finish(&mut state);
        index
    }

    fn notify(&self, event: IndexEvent) {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() != before {
            tracing::debug!(
                "[IndexStore::notify] pruned {} closed subscribers",
                before - subscribers.len()
            );
        }
    }
}

fn record_from(parsed: ParsedDocument, modified_ms: u64) -> DocumentRecord {
    DocumentRecord {
        name: file_stem(&parsed.id).to_string(),
        id: parsed.id,
        fingerprint: parsed.fingerprint,
        indexed_at_ms: now_ms(),
        mentions: parsed.mentions,
        tags: parsed.tags,
        definitions: parsed.definitions,
        metadata: DocumentMetadata {
            title: parsed.title,
            size: parsed.size,
            modified_ms,
        },
    }
}

fn resolve_document(index: &mut Index, id: &str, resolver: &Resolver, registry: &ReferenceRegistry) {
    let Some(record) = index.document(id) else {
        return;
    };
    let mentions = record
        .mentions
        .iter()
        .map(|m| resolver.resolve(m, id, registry).mention)
        .collect();
    index.set_mentions(id, mentions);
}

fn resolve_all(index: &mut Index, resolver: &Resolver, registry: &ReferenceRegistry) {
    let ids: Vec<String> = index.ids().map(str::to_string).collect();
    for id in ids.iter() {
        resolve_document(index, id, resolver, registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use test_log::test;

    fn idle_store() -> IndexStore {
        IndexStore::new(
            Box::new(MemorySource::new()),
            ReferenceRegistry::new(),
            IndexConfig::default(),
        )
    }

    #[test]
    fn queued_changes_are_drained_before_the_flag_clears() {
        let store = idle_store();
        store.building.store(true, Ordering::SeqCst);

        store.update("a.md", "[[b]]").unwrap();
        store.update("b.md", "").unwrap();
        store.remove("b.md").unwrap();
        assert!(store.get_index().is_empty());
        assert_eq!(store.pending.lock().len(), 2);

        store.finish_build();
        assert!(!store.is_building());
        assert!(store.pending.lock().is_empty());
        let index = store.get_index();
        assert!(index.contains("a.md"));
        assert!(!index.contains("b.md"));
    }

    #[test]
    fn changes_after_the_flag_clears_apply_directly() {
        let store = idle_store();
        store.building.store(true, Ordering::SeqCst);
        store.finish_build();

        assert!(!store.enqueue_if_building("a.md", || PendingChange::Remove));
        store.update("a.md", "#t").unwrap();
        assert!(store.pending.lock().is_empty());
        assert_eq!(store.graph().documents_with_tag("t"), vec!["a.md"]);
    }
}

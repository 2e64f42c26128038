//! Tests for Index and IndexStore functionality

use super::*;
use crate::{
    config::IndexConfig,
    error::LinkIndexError,
    event::IndexEventKind,
    registry::ReferenceRegistry,
    source::{DocumentEntry, DocumentSource, MemorySource},
    tests::helpers::{assert_consistent, built_store, init_logging, shape, store_with},
};
use parking_lot::Mutex;
use std::{
    sync::{mpsc, Arc},
    thread,
};
use test_log::test;

#[test]
fn rebuild_populates_records_backlinks_and_tags() {
    let store = built_store(&[
        ("a.md", "# Alpha\nSee [[B]] and [[c]] #Project"),
        ("b.md", "Back to [alpha](a.md) #project #draft"),
        ("c.md", "no links"),
    ]);
    let index = store.get_index();
    assert_consistent(&index);
    assert_eq!(index.len(), 3);
    assert_eq!(index.summary().mention_count, 3);
    assert_eq!(index.summary().generation, 1);
    assert_eq!(index.document("a.md").unwrap().metadata.title, "Alpha");
    assert_eq!(index.document("c.md").unwrap().name, "c");
    assert_eq!(
        index.backlinks_of("b.md").unwrap().iter().collect::<Vec<_>>(),
        vec!["a.md"]
    );
    assert_eq!(index.documents_with_tag("project").unwrap().len(), 2);
    assert_eq!(index.documents_with_tag("draft").unwrap().len(), 1);

    let stats = store.get_stats();
    assert_eq!(stats.document_count, 3);
    assert_eq!(stats.mention_count, 3);
    assert_eq!(stats.tag_count, 2);
}

#[test]
fn rebuild_is_idempotent() {
    let store = built_store(&[
        ("a.md", "[[b]] [[c]] #x"),
        ("b.md", "[[a]] [[nowhere]] #y"),
        ("c.md", "[[b]]"),
    ]);
    let first = store.get_index();
    let second = store.rebuild(false).unwrap();
    assert_eq!(shape(&first), shape(&second));
    assert_eq!(second.summary().generation, first.summary().generation + 1);
    assert_consistent(&second);
}

#[test]
fn update_short_circuits_on_unchanged_content() {
    let store = built_store(&[("a.md", "[[b]]"), ("b.md", "")]);
    let mut events = store.subscribe();
    let before = store.get_index();
    store.update("a.md", "[[b]]").unwrap();
    assert!(Arc::ptr_eq(&before, &store.get_index()));
    assert!(events.try_recv().is_err());
}

#[test]
fn update_moves_backlinks_and_tags() {
    let store = built_store(&[("a.md", "[[b]] #old"), ("b.md", ""), ("c.md", "")]);
    store.update("a.md", "[[c]] #new").unwrap();
    let index = store.get_index();
    assert_consistent(&index);
    assert!(index.backlinks_of("b.md").is_none());
    assert!(index.backlinks_of("c.md").unwrap().contains("a.md"));
    assert!(index.documents_with_tag("old").is_none());
    assert!(index.documents_with_tag("new").unwrap().contains("a.md"));
}

#[test]
fn new_document_resolves_earlier_broken_mentions() {
    let store = built_store(&[("a.md", "[[later]]")]);
    assert_eq!(store.graph().validate_all().broken, 1);
    store.update("later.md", "# Later").unwrap();
    let index = store.get_index();
    assert_consistent(&index);
    assert!(store.is_linked("a.md", "later.md"));
    assert_eq!(store.graph().backlinks_of("later.md"), vec!["a.md"]);
}

#[test]
fn removal_strips_every_contribution() {
    let store = built_store(&[
        ("a.md", "[[b]] [[c]] #shared"),
        ("b.md", "[[c]] #shared"),
        ("c.md", "[[a]]"),
    ]);
    store.remove("a.md").unwrap();
    let index = store.get_index();
    assert_consistent(&index);
    assert!(!index.contains("a.md"));
    for sources in index.backlinks().values() {
        assert!(!sources.contains("a.md"));
    }
    // c's mention of a is now broken and no longer counts as a link.
    let c = index.document("c.md").unwrap();
    assert!(!c.mentions[0].exists);
    assert!(index.backlinks_of("a.md").is_none());
    assert_eq!(
        index.documents_with_tag("shared").unwrap().iter().collect::<Vec<_>>(),
        vec!["b.md"]
    );
    // Removing an unknown document is a no-op.
    store.remove("a.md").unwrap();
    assert_eq!(store.get_index().summary().generation, index.summary().generation);
}

#[test]
fn removal_drops_empty_tag_buckets() {
    let store = built_store(&[("a.md", "#solo"), ("b.md", "")]);
    store.remove("a.md").unwrap();
    assert!(store.get_index().tags().is_empty());
}

#[test]
fn events_follow_every_mutation() {
    let store = store_with(&[("a.md", "[[b]]"), ("b.md", "")]);
    let mut events = store.subscribe();
    let dropped = store.subscribe();
    drop(dropped);

    store.rebuild(false).unwrap();
    store.update("c.md", "[[a]]").unwrap();
    store.remove("b.md").unwrap();

    let kinds: Vec<IndexEventKind> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            IndexEventKind::Rebuilt,
            IndexEventKind::DocumentUpdated("c.md".to_string()),
            IndexEventKind::DocumentRemoved("b.md".to_string()),
        ]
    );
}

#[test]
fn event_carries_the_committed_snapshot() {
    let store = built_store(&[("a.md", "")]);
    let mut events = store.subscribe();
    store.update("b.md", "[[a]]").unwrap();
    let event = events.try_recv().unwrap();
    assert_eq!(event.document(), Some("b.md"));
    assert!(Arc::ptr_eq(&event.index, &store.get_index()));
}

#[test]
fn registry_definitions_follow_their_document() {
    let store = built_store(&[
        ("defs.md", "[shared]: target.md\n"),
        ("other/defs.md", "[shared]: other/elsewhere.md\n"),
        ("user.md", "[[shared]]"),
        ("target.md", ""),
        ("other/elsewhere.md", ""),
    ]);
    assert_eq!(store.get_mention("user.md", "target.md").unwrap().raw, "shared");

    store.remove("defs.md").unwrap();
    let registry = store.registry();
    assert_eq!(registry.get_definitions("shared").len(), 1);
    assert_eq!(registry.get_definitions("shared")[0].source, "other/defs.md");
    // With the same-directory definition gone the mention follows the surviving one.
    assert!(store.is_linked("user.md", "other/elsewhere.md"));
    assert_consistent(&store.get_index());
}

#[test]
fn changed_definitions_reresolve_other_documents() {
    let store = built_store(&[
        ("defs.md", "[ref]: one.md\n"),
        ("user.md", "[[ref]]"),
        ("one.md", ""),
        ("two.md", ""),
    ]);
    assert!(store.is_linked("user.md", "one.md"));
    store.update("defs.md", "[ref]: two.md\n").unwrap();
    assert!(store.is_linked("user.md", "two.md"));
    assert!(!store.is_linked("user.md", "one.md"));
    assert_consistent(&store.get_index());
}

#[test]
fn read_failures_are_reported_not_fatal() {
    struct FlakySource(MemorySource);

    impl DocumentSource for FlakySource {
        fn entries(&self) -> Result<Vec<DocumentEntry>, LinkIndexError> {
            let mut entries = self.0.entries()?;
            entries.push(DocumentEntry {
                id: "unreadable.md".to_string(),
                modified_ms: 0,
            });
            Ok(entries)
        }

        fn read(&self, id: &str) -> Result<String, LinkIndexError> {
            if id == "unreadable.md" {
                Err(LinkIndexError::PermissionDenied)
            } else {
                self.0.read(id)
            }
        }
    }

    init_logging();
    let source = FlakySource(MemorySource::with_documents([("a.md", "[[b]]"), ("b.md", "[[")]));
    let store = IndexStore::new(Box::new(source), ReferenceRegistry::new(), IndexConfig::default());
    let report = store.rebuild_with_report().unwrap();
    assert_eq!(report.index.len(), 2);
    assert_eq!(
        report.failures,
        vec![("unreadable.md".to_string(), LinkIndexError::PermissionDenied)]
    );
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.diagnostics.contains_key("b.md"));
    assert!(report.repaired.is_empty());
    assert_eq!(store.get_diagnostics("b.md").len(), 1);
}

#[test]
fn repair_fixes_corrupted_snapshots() {
    let store = built_store(&[("a.md", "[[b]] #t"), ("b.md", "")]);
    let mut index = (*store.get_index()).clone();
    index
        .backlinks_mut()
        .entry("ghost.md".to_string())
        .or_default()
        .insert("a.md".to_string());
    index.backlinks_mut().remove("b.md");
    index.tags_mut().insert("empty".to_string(), Default::default());
    assert!(!index.check_invariants().is_empty());

    let repairs = index.repair();
    assert_eq!(repairs.len(), 3, "{repairs:?}");
    assert_consistent(&index);
    assert!(index.repair().is_empty());
}

#[test]
fn store_repair_is_a_no_op_on_a_consistent_index() {
    let store = built_store(&[("a.md", "[[b]]"), ("b.md", "")]);
    let generation = store.get_index().summary().generation;
    assert!(store.repair().is_empty());
    assert_eq!(store.get_index().summary().generation, generation);
}

/// A source whose enumeration blocks until the test releases it.
struct GatedSource {
    inner: MemorySource,
    started: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl DocumentSource for GatedSource {
    fn entries(&self) -> Result<Vec<DocumentEntry>, LinkIndexError> {
        self.started.lock().send(()).ok();
        self.release.lock().recv().ok();
        self.inner.entries()
    }

    fn read(&self, id: &str) -> Result<String, LinkIndexError> {
        self.inner.read(id)
    }
}

#[test]
fn concurrent_rebuild_is_rejected_and_updates_are_queued() {
    init_logging();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let source = GatedSource {
        inner: MemorySource::with_documents([("a.md", "[[b]]"), ("b.md", "")]),
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    };
    let store = Arc::new(IndexStore::new(
        Box::new(source),
        ReferenceRegistry::new(),
        IndexConfig::default(),
    ));

    let builder = {
        let store = store.clone();
        thread::spawn(move || store.rebuild(true))
    };
    started_rx.recv().unwrap();
    assert!(store.is_building());
    assert_eq!(store.rebuild(false), Err(LinkIndexError::BuildInProgress));

    store.update("c.md", "first").unwrap();
    store.update("c.md", "[[a]]").unwrap();
    store.remove("b.md").unwrap();
    assert!(store.get_index().is_empty());

    release_tx.send(()).unwrap();
    builder.join().unwrap().unwrap();

    assert!(!store.is_building());
    let index = store.get_index();
    assert_consistent(&index);
    assert!(!index.contains("b.md"));
    assert!(store.is_linked("c.md", "a.md"));
    assert_eq!(index.document("c.md").unwrap().mentions.len(), 1);
}

#[test]
fn failed_enumeration_releases_the_build_flag() {
    struct BrokenSource;

    impl DocumentSource for BrokenSource {
        fn entries(&self) -> Result<Vec<DocumentEntry>, LinkIndexError> {
            Err(LinkIndexError::Io("disk on fire".to_string()))
        }

        fn read(&self, id: &str) -> Result<String, LinkIndexError> {
            Err(LinkIndexError::NotFound(id.to_string()))
        }
    }

    let store = IndexStore::new(
        Box::new(BrokenSource),
        ReferenceRegistry::new(),
        IndexConfig::default(),
    );
    assert!(matches!(store.rebuild(false), Err(LinkIndexError::Io(_))));
    assert!(!store.is_building());
}

/// Shares one in-memory corpus between the host (the test) and the store.
struct SharedSource(Arc<MemorySource>);

impl DocumentSource for SharedSource {
    fn entries(&self) -> Result<Vec<DocumentEntry>, LinkIndexError> {
        self.0.entries()
    }

    fn read(&self, id: &str) -> Result<String, LinkIndexError> {
        self.0.read(id)
    }
}

#[test]
fn updates_racing_rebuilds_are_never_lost() {
    init_logging();
    let corpus = Arc::new(MemorySource::with_documents([("hub.md", "")]));
    let store = Arc::new(IndexStore::new(
        Box::new(SharedSource(corpus.clone())),
        ReferenceRegistry::new(),
        IndexConfig::default(),
    ));

    let rebuilder = {
        let store = store.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                // Rejections are expected while another rebuild holds the flag.
                let _ = store.rebuild(false);
            }
        })
    };
    let writers: Vec<_> = (0..4)
        .map(|w| {
            let store = store.clone();
            let corpus = corpus.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let id = format!("w{w}/note-{i}.md");
                    corpus.insert(id.as_str(), "[[hub]]");
                    store.update(&id, "[[hub]]").unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    rebuilder.join().unwrap();

    assert!(!store.is_building());
    let index = store.get_index();
    assert_eq!(index.len(), 101);
    assert_eq!(store.graph().backlinks_of("hub.md").len(), 100);
    assert_consistent(&index);
}

#[test]
fn zero_progress_interval_does_not_abort_a_rebuild() {
    let source = MemorySource::with_documents([("a.md", "[[b]]"), ("b.md", "")]);
    let config = IndexConfig {
        progress_interval: 0,
        ..IndexConfig::default()
    };
    let store = IndexStore::new(Box::new(source), ReferenceRegistry::new(), config);
    let index = store.rebuild(true).unwrap();
    assert_eq!(index.len(), 2);
    assert!(store.is_linked("a.md", "b.md"));
}

#[test]
fn index_serializes_in_id_order() {
    let store = built_store(&[("b.md", "[[a]]"), ("a.md", "#t")]);
    let json = serde_json::to_value(&*store.get_index()).unwrap();
    let ids: Vec<&String> = json["documents"].as_object().unwrap().keys().collect();
    assert_eq!(ids, vec!["a.md", "b.md"]);
    assert_eq!(json["backlinks"]["a.md"], serde_json::json!(["b.md"]));
    assert_eq!(json["tags"]["t"], serde_json::json!(["a.md"]));
    let back: Index = serde_json::from_value(json).unwrap();
    assert_eq!(back, *store.get_index());
}

//! Shared test utilities for index testing

use crate::{
    config::IndexConfig,
    index::{Index, IndexStore},
    registry::ReferenceRegistry,
    source::MemorySource,
};
use std::collections::{BTreeMap, BTreeSet};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A store over an in-memory corpus, not yet built.
pub fn store_with(docs: &[(&str, &str)]) -> IndexStore {
    init_logging();
    IndexStore::new(
        Box::new(MemorySource::with_documents(docs.iter().copied())),
        ReferenceRegistry::new(),
        IndexConfig::default(),
    )
}

/// A store over an in-memory corpus after one full rebuild.
pub fn built_store(docs: &[(&str, &str)]) -> IndexStore {
    let store = store_with(docs);
    store.rebuild(false).expect("rebuild of in-memory corpus succeeds");
    store
}

/// Fail with every violated law when the index is inconsistent.
pub fn assert_consistent(index: &Index) {
    let errors = index.check_invariants();
    assert!(errors.is_empty(), "index is inconsistent:\n- {}", errors.join("\n- "));
    // The consistency law stated directly: T is a resolved target of D iff D backlinks to T.
    for (id, record) in index.documents() {
        for target in record.targets() {
            assert!(
                index.backlinks_of(target).is_some_and(|s| s.contains(id)),
                "{id} -> {target} missing from backlinks"
            );
        }
    }
    for (target, sources) in index.backlinks() {
        for source in sources {
            assert!(
                index
                    .document(source)
                    .is_some_and(|r| r.targets().contains(target.as_str())),
                "backlink {target} <- {source} not claimed"
            );
        }
    }
}

/// The parts of an index that must be identical across rebuilds of unchanged content.
pub fn shape(
    index: &Index,
) -> (
    Vec<String>,
    BTreeMap<String, BTreeSet<String>>,
    BTreeMap<String, BTreeSet<String>>,
) {
    (
        index.ids().map(str::to_string).collect(),
        index.backlinks().clone(),
        index.tags().clone(),
    )
}

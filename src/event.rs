use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::index::Index;

/// What kind of mutation produced an [IndexEvent].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexEventKind {
    /// A full rebuild finished.
    Rebuilt,
    /// A document was inserted or its content changed.
    DocumentUpdated(String),
    /// A document was removed from the index.
    DocumentRemoved(String),
    /// The validation pass repaired inconsistencies (orphaned backlinks, empty tag buckets).
    Repaired,
}

/// Change notification published by [crate::index::IndexStore] after every successful mutation.
///
/// Carries the snapshot that resulted from the mutation, so subscribers never need to call back
/// into the store to see the new state.
#[derive(Debug, Clone)]
pub struct IndexEvent {
    pub kind: IndexEventKind,
    pub index: Arc<Index>,
}

impl IndexEvent {
    pub fn new(kind: IndexEventKind, index: Arc<Index>) -> IndexEvent {
        IndexEvent { kind, index }
    }

    /// The document id this event concerns, if it concerns exactly one.
    pub fn document(&self) -> Option<&str> {
        match &self.kind {
            IndexEventKind::DocumentUpdated(id) | IndexEventKind::DocumentRemoved(id) => Some(id),
            IndexEventKind::Rebuilt | IndexEventKind::Repaired => None,
        }
    }
}

impl PartialEq for IndexEvent {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.index.summary().generation == other.index.summary().generation
    }
}

impl Eq for IndexEvent {}

impl Display for IndexEventKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            IndexEventKind::Rebuilt => write!(f, "Rebuilt"),
            IndexEventKind::DocumentUpdated(id) => write!(f, "DocumentUpdated({id})"),
            IndexEventKind::DocumentRemoved(id) => write!(f, "DocumentRemoved({id})"),
            IndexEventKind::Repaired => write!(f, "Repaired"),
        }
    }
}

impl Display for IndexEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} (generation {}, {} documents)",
            self.kind,
            self.index.summary().generation,
            self.index.summary().document_count
        )
    }
}

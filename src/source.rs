//! Document sources: where the index reads the corpus from.
//!
//! The index never touches the file system directly. A host hands the
//! [IndexStore](crate::index::IndexStore) a [DocumentSource]; `rebuild` enumerates it and reads
//! every entry. Incremental updates bypass the source entirely: the host pushes new text through
//! `IndexStore::update`.

use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use walkdir::{DirEntry, WalkDir};

use crate::{
    config::IndexConfig,
    error::LinkIndexError,
    paths::os_path_to_string,
    properties::{now_ms, system_time_ms},
};

/// One enumerable corpus entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocumentEntry {
    pub id: String,
    pub modified_ms: u64,
}

/// The host-side collaborator that enumerates and reads documents.
pub trait DocumentSource {
    /// All documents currently in the corpus, in id order.
    fn entries(&self) -> Result<Vec<DocumentEntry>, LinkIndexError>;

    /// Current text of one document.
    fn read(&self, id: &str) -> Result<String, LinkIndexError>;
}

/// In-memory corpus. Used by tests and by hosts that already hold document text.
#[derive(Debug, Default)]
pub struct MemorySource {
    docs: RwLock<BTreeMap<String, (String, u64)>>,
}

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    /// Build a source from `(id, text)` pairs.
    pub fn with_documents<I, K, V>(docs: I) -> MemorySource
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source = MemorySource::new();
        for (id, text) in docs {
            source.insert(id, text);
        }
        source
    }

    pub fn insert(&self, id: impl Into<String>, text: impl Into<String>) {
        self.docs.write().insert(id.into(), (text.into(), now_ms()));
    }

    pub fn remove(&self, id: &str) -> Option<String> {
        self.docs.write().remove(id).map(|(text, _)| text)
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

impl DocumentSource for MemorySource {
    fn entries(&self) -> Result<Vec<DocumentEntry>, LinkIndexError> {
        Ok(self
            .docs
            .read()
            .iter()
            .map(|(id, (_, modified_ms))| DocumentEntry {
                id: id.clone(),
                modified_ms: *modified_ms,
            })
            .collect())
    }

    fn read(&self, id: &str) -> Result<String, LinkIndexError> {
        self.docs
            .read()
            .get(id)
            .map(|(text, _)| text.clone())
            .ok_or_else(|| LinkIndexError::NotFound(format!("no document '{id}' in memory source")))
    }
}

/// A directory of documents on disk. Document ids are `/`-separated paths relative to the root.
///
/// Dot-files and dot-directories are skipped. Only files carrying one of
/// [IndexConfig::extensions] are documents.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
    config: IndexConfig,
}

impl FsSource {
    pub fn new<P: AsRef<Path>>(root: P, config: IndexConfig) -> Result<FsSource, LinkIndexError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(LinkIndexError::NotFound(format!(
                "document root {root:?} is not a directory"
            )));
        }
        Ok(FsSource { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of document `id`.
    pub fn path_of(&self, id: &str) -> PathBuf {
        id.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

impl DocumentSource for FsSource {
    fn entries(&self) -> Result<Vec<DocumentEntry>, LinkIndexError> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !is_hidden(e) || e.path() == self.root)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[FsSource::entries] skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let id = os_path_to_string(entry.path().strip_prefix(&self.root)?);
            if !self.config.is_document_path(&id) {
                continue;
            }
            let modified_ms = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(system_time_ms)
                .unwrap_or(0);
            entries.push(DocumentEntry { id, modified_ms });
        }
        entries.sort();
        tracing::debug!(
            "[FsSource::entries] found {} documents under {:?}",
            entries.len(),
            self.root
        );
        Ok(entries)
    }

    fn read(&self, id: &str) -> Result<String, LinkIndexError> {
        Ok(fs::read_to_string(self.path_of(id))?)
    }
}

//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Write `content` to `root/rel`, creating parent directories.
#[allow(dead_code)]
pub fn write_doc(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Create a small notes vault:
///
/// ```text
/// vault/
///   index.md             -> [[Projects/Roadmap]], [[journal]], #home
///   journal.md           -> [[index]], [[Roadmap]]
///   projects/roadmap.md  -> [the index](../index.md), [[Ideas Inbox]] (broken), #planning
///   projects/refs.md     -> [roadmap]: roadmap.md
///   ideas/seed.md        -> [[roadmap]] (named reference from another directory), #planning
///   .obsidian/cache.md   -> hidden, never indexed
///   assets/logo.png      -> not a document
/// ```
#[allow(dead_code)]
pub fn create_test_vault(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("vault");
    std::fs::create_dir(&root).unwrap();

    write_doc(
        &root,
        "index.md",
        "---\ntitle: Home\ntags: [home]\n---\n# Welcome\n\nStart at [[Projects/Roadmap]] or the [[journal]].\n",
    );
    write_doc(
        &root,
        "journal.md",
        "# Journal\n\nBack to [[index]]. Working on the [[Roadmap|plan]].\n\n```\n[[not a link]]\n```\n",
    );
    write_doc(
        &root,
        "projects/roadmap.md",
        "# Roadmap\n\nSee [the index](../index.md) and [[Ideas Inbox]]. #planning\n",
    );
    write_doc(&root, "projects/refs.md", "[roadmap]: roadmap.md \"The Roadmap\"\n");
    write_doc(&root, "ideas/seed.md", "Grows into the [[roadmap]]. #planning\n");
    write_doc(&root, ".obsidian/cache.md", "[[index]]\n");
    write_doc(&root, "assets/logo.png", "not markdown");
    root
}

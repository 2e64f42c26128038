//! # noet-links
//!
//! A Rust library that indexes a corpus of interlinked text documents and answers bidirectional
//! link queries over it.
//!
//! ## Overview
//!
//! noet-links reads Markdown notes that reference each other through wiki links (`[[target]]`),
//! inline links (`[text](target.md)`) and hashtags. It resolves every mention to a concrete
//! document and keeps a backlink map that always mirrors the forward links, through full rebuilds
//! as well as per-document updates and removals.
//!
//! ### Key Features
//!
//! - **Two-pass rebuild**: parse every document first, then resolve against the complete set
//! - **Tiered resolution**: exact, case-insensitive, fuzzy (bounded edit distance) and substring
//!   matching, with ranked alternatives for disambiguation
//! - **Named references**: `[name]: target` definitions with deterministic conflict resolution
//! - **Incremental updates**: fingerprint-gated re-parsing, immutable `Arc` snapshots
//! - **Graph queries**: backlinks, forward links, shortest distance, neighborhoods, broken links
//! - **Error tolerance**: malformed syntax becomes diagnostics, unreadable documents are skipped
//!
//! ## Architecture
//!
//! - **[`codec`]**: Mention parsing (`MentionParser`, `ParseDiagnostic`, `LineIndex`)
//! - **[`index`]**: The `Index` aggregate and its owner `IndexStore`
//! - **[`registry`]**: Named reference definitions (`ReferenceRegistry`)
//! - **[`resolver`]**: Tiered mention resolution (`Resolver`)
//! - **[`query`]**: Graph queries over one snapshot (`GraphQuery`)
//! - **[`properties`]**: Data model (`Mention`, `DocumentRecord`, `ReferenceDefinition`)
//! - **[`paths`]**: Target canonicalization and relative path resolution
//! - **[`source`]**: Where documents come from (`MemorySource`, `FsSource`)
//! - **[`event`]**: Change notifications
//!
//! ## Quick Start
//!
//! ```rust
//! use noet_links::{
//!     config::IndexConfig, index::IndexStore, registry::ReferenceRegistry, source::MemorySource,
//! };
//!
//! let source = MemorySource::with_documents([
//!     ("notes/a.md", "# A\nSee [[B]] and [[Missing]]. #draft"),
//!     ("notes/b.md", "# B\nBack to [A](a.md)."),
//! ]);
//! let store = IndexStore::new(Box::new(source), ReferenceRegistry::new(), IndexConfig::default());
//! store.rebuild(false)?;
//!
//! let graph = store.graph();
//! assert_eq!(graph.backlinks_of("notes/b.md"), vec!["notes/a.md"]);
//! assert_eq!(graph.distance("notes/a.md", "notes/b.md"), Some(1));
//!
//! let report = graph.validate_all();
//! assert_eq!((report.valid, report.broken), (2, 1));
//!
//! // Incremental update: new content is parsed, resolved and published as a new snapshot.
//! store.update("notes/missing.md", "# Missing")?;
//! assert!(store.graph().validate_all().is_clean());
//! # Ok::<(), noet_links::LinkIndexError>(())
//! ```
//!
//! ### Watching for Changes
//!
//! The library performs no file watching or debouncing. A host observes changes itself and
//! forwards them; `update` is cheap to call redundantly because unchanged content short-circuits
//! on its fingerprint. Subscribers receive every committed snapshot:
//!
//! ```rust
//! # use noet_links::{config::IndexConfig, index::IndexStore, registry::ReferenceRegistry, source::MemorySource};
//! # let store = IndexStore::new(Box::new(MemorySource::new()), ReferenceRegistry::new(), IndexConfig::default());
//! let mut events = store.subscribe();
//! store.update("a.md", "[[b]]")?;
//! let event = events.try_recv().expect("update publishes an event");
//! assert_eq!(event.document(), Some("a.md"));
//! # Ok::<(), noet_links::LinkIndexError>(())
//! ```
//!
//! ## Features
//!
//! - **default**: The library
//! - **bin**: The `noet-links` command-line tool (`check`, `backlinks`, `distance`, `neighbors`,
//!   `stats`)

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod index;
pub mod paths;
pub mod properties;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod source;
#[cfg(test)]
mod tests;

pub use error::*;

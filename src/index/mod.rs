//! Index module: the corpus-wide link index and its owner.
//!
//! # Module Organization
//!
//! - [`base`]: the [`Index`] aggregate (document records plus derived backlink and tag maps)
//! - [`store`]: [`IndexStore`], which rebuilds, updates and publishes index snapshots
//!
//! ```rust
//! use noet_links::{
//!     config::IndexConfig, index::IndexStore, registry::ReferenceRegistry, source::MemorySource,
//! };
//!
//! let source = MemorySource::with_documents([
//!     ("a.md", "See [[Target]]"),
//!     ("target.md", "# Target"),
//! ]);
//! let store = IndexStore::new(Box::new(source), ReferenceRegistry::new(), IndexConfig::default());
//! store.rebuild(false).unwrap();
//! assert_eq!(store.graph().backlinks_of("target.md"), vec!["a.md"]);
//! ```

mod base;
mod store;

#[cfg(test)]
mod tests;

pub use base::{Index, IndexSummary};
pub use store::{IndexStats, IndexStore, RebuildReport};

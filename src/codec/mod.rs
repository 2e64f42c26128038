//! Document parsing.
//!
//! Converts the text of one Markdown document into a [`ParsedDocument`]: its unresolved
//! [`Mention`](crate::properties::Mention)s, tags, reference definitions, title and content
//! fingerprint. Parsing is a pure function of `(id, text)`; resolution happens later in
//! [`crate::resolver`].
//!
//! ## Key Components
//!
//! - [`MentionParser`] - configured parser (default extension, code exclusion)
//! - [`parse_document`] - parse with default configuration
//! - [`ParseDiagnostic`] - constructs that were skipped, with their position
//! - [`LineIndex`] - byte offset to line/column mapping, tolerant of `\n`, `\r\n` and `\r`
//!
//! ```rust
//! use noet_links::codec::parse_document;
//!
//! let doc = parse_document("notes/a.md", "# Alpha\nSee [[Beta|the beta note]] #draft\n");
//! assert_eq!(doc.title, "Alpha");
//! assert_eq!(doc.mentions[0].raw, "Beta");
//! assert_eq!(doc.mentions[0].display, "the beta note");
//! assert_eq!(doc.tags, vec!["draft"]);
//! ```

use sha2::{Digest, Sha256};

pub mod diagnostic;
pub mod md;
pub mod position;

pub use diagnostic::ParseDiagnostic;
pub use md::{parse_document, MentionParser, ParsedDocument};
pub use position::LineIndex;

/// Hex-encoded sha256 of `text`. Equal texts always produce equal fingerprints.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

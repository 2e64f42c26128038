//! Core value types of the link index: mentions, document records and reference definitions.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    ops::Range,
    time::{SystemTime, UNIX_EPOCH},
};

/// Milliseconds since the unix epoch, saturating to 0 for clocks set before 1970.
pub fn now_ms() -> u64 {
    system_time_ms(SystemTime::now())
}

pub fn system_time_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Syntactic form of a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkForm {
    /// `[[target]]` or `[[target|display]]`
    Wiki,
    /// `[display](target)`
    Inline,
}

impl Display for LinkForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkForm::Wiki => write!(f, "wiki"),
            LinkForm::Inline => write!(f, "inline"),
        }
    }
}

/// Zero-based line and column. Columns count unicode scalar values, not bytes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// One inline reference from a document to another.
///
/// The parser creates mentions with `target == None` and `exists == false`. The resolver fills
/// both exactly once; after that the mention is only replaced when its document is re-parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Target text as written, with any `#anchor` and `|display` removed.
    pub raw: String,
    /// Human-readable text: the alias, the inline link text, or `raw`.
    pub display: String,
    /// Id of the document containing the mention.
    pub source: String,
    /// Resolved document id.
    pub target: Option<String>,
    /// `Heading` in `[[note#Heading]]`.
    pub anchor: Option<String>,
    /// Byte range of the whole construct in the source text.
    pub range: Range<usize>,
    pub start: Position,
    pub end: Position,
    pub form: LinkForm,
    pub exists: bool,
}

impl Mention {
    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }

    /// Whether this mention claims `doc` as its target.
    pub fn targets(&self, doc: &str) -> bool {
        self.target.as_deref() == Some(doc)
    }

    /// Copy of this mention with resolution state cleared, as the parser produced it.
    pub fn unresolved(&self) -> Mention {
        Mention {
            target: None,
            exists: false,
            ..self.clone()
        }
    }
}

impl Display for Mention {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.form {
            LinkForm::Wiki => write!(f, "[[{}]]", self.raw)?,
            LinkForm::Inline => write!(f, "[{}]({})", self.display, self.raw)?,
        }
        write!(f, " at {}:{}", self.source, self.start)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    /// Content length in bytes.
    pub size: usize,
    /// Last modification reported by the document source, in ms since the epoch.
    pub modified_ms: u64,
}

/// One corpus entry. Exactly one record exists per document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    /// File stem, used as the short display name.
    pub name: String,
    /// Hex sha256 of the full text; changes iff the text changes.
    pub fingerprint: String,
    pub indexed_at_ms: u64,
    /// Outgoing mentions in source order.
    pub mentions: Vec<Mention>,
    /// Sorted, de-duplicated, case-folded.
    pub tags: Vec<String>,
    /// Reference definitions declared by this document.
    pub definitions: Vec<ReferenceDefinition>,
    pub metadata: DocumentMetadata,
}

impl DocumentRecord {
    /// Resolved targets of this document's mentions, de-duplicated.
    pub fn targets(&self) -> std::collections::BTreeSet<&str> {
        self.mentions
            .iter()
            .filter_map(|m| m.target.as_deref())
            .collect()
    }

    pub fn broken_mentions(&self) -> impl Iterator<Item = &Mention> {
        self.mentions.iter().filter(|m| !m.exists)
    }
}

/// A named alias declaration: `[name]: target "Title" {priority=N}`.
///
/// Several documents may declare the same name; the
/// [ReferenceRegistry](crate::registry::ReferenceRegistry) keeps all of them and picks one per
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceDefinition {
    pub name: String,
    /// Target path as written in the declaration.
    pub target: String,
    pub title: Option<String>,
    /// Id of the declaring document.
    pub source: String,
    pub priority: Option<i64>,
}

impl ReferenceDefinition {
    pub fn new(name: impl Into<String>, target: impl Into<String>, source: impl Into<String>) -> Self {
        ReferenceDefinition {
            name: name.into(),
            target: target.into(),
            title: None,
            source: source.into(),
            priority: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or(0)
    }
}

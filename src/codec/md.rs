//! Markdown mention extraction.
//!
//! Recognized constructs:
//!
//! - wiki links: `[[target]]`, `[[target|display]]`, `[[target#anchor|display]]`
//! - inline links: `[display](target)`, `[display](target.md#anchor "title")`
//! - tags: `#word` at line start or after whitespace
//! - reference definitions: `[name]: target "Title" {priority=N}`
//! - YAML frontmatter `title` and `tags`
//!
//! Code blocks and inline code are skipped. Everything else that looks like a link but cannot be
//! read is reported as a [ParseDiagnostic] and skipped.

use once_cell::sync::Lazy;
use pulldown_cmark::{Event as MdEvent, Options, Parser as MdParser, Tag as MdTag};
use regex::Regex;
use serde_yaml::Value as YamlValue;
use std::{collections::BTreeSet, ops::Range};

use crate::{
    codec::{diagnostic::ParseDiagnostic, fingerprint, position::LineIndex},
    config::IndexConfig,
    error::LinkIndexError,
    paths::{canonical_target, file_stem},
    properties::{LinkForm, Mention, ReferenceDefinition},
};

static WIKILINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]\n]*)\]\]").expect("wikilink regex is valid"));

static INLINE_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(!?)\[([^\[\]\n]*)\]\(\s*(<[^<>\n]*>|[^()\s]*)(?:\s+(?:"[^"\n]*"|'[^'\n]*'))?\s*\)"#,
    )
    .expect("inline link regex is valid")
});

static DEFINITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^ {0,3}\[([^\[\]\n]+)\]:[ \t]*(<[^<>\n]*>|\S+)(?:[ \t]+"([^"\n]*)")?(?:[ \t]+\{priority=([^}\n]*)\})?[ \t]*\r?$"#,
    )
    .expect("definition regex is valid")
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(?:^|\s)#([\p{L}\p{N}_\-/]+)").expect("tag regex is valid"));

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^ {0,3}#{1,6}[ \t]+(.+?)[ \t#]*\r?$").expect("heading regex is valid")
});

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("scheme regex is valid"));

/// Output of parsing one document. Every mention is unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub id: String,
    pub fingerprint: String,
    pub title: String,
    pub size: usize,
    pub mentions: Vec<Mention>,
    /// Sorted, de-duplicated, lower-cased.
    pub tags: Vec<String>,
    pub definitions: Vec<ReferenceDefinition>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Stateless mention parser. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct MentionParser {
    default_extension: String,
    exclude_code: bool,
}

impl Default for MentionParser {
    fn default() -> Self {
        MentionParser::new(&IndexConfig::default())
    }
}

impl MentionParser {
    pub fn new(config: &IndexConfig) -> MentionParser {
        MentionParser {
            default_extension: config.default_extension.clone(),
            exclude_code: config.exclude_code,
        }
    }

    /// Canonical identifier for a raw mention target. See [crate::paths::canonical_target].
    pub fn canonicalize(&self, raw: &str) -> String {
        canonical_target(raw, &self.default_extension)
    }

    pub fn parse(&self, id: &str, text: &str) -> ParsedDocument {
        let lines = LineIndex::new(text);
        let mut diagnostics = Vec::new();

        let (frontmatter, body_start) = split_frontmatter(text);
        let mut excluded: Vec<Range<usize>> = Vec::new();
        if body_start > 0 {
            excluded.push(0..body_start);
        }
        if self.exclude_code {
            excluded.extend(code_ranges(&text[body_start..], body_start));
        }

        let mut fm_title = None;
        let mut tags = BTreeSet::new();
        if let Some(yaml) = frontmatter {
            match read_frontmatter(yaml) {
                Ok((title, fm_tags)) => {
                    fm_title = title;
                    tags.extend(fm_tags);
                }
                Err(e) => diagnostics.push(ParseDiagnostic::Warning(format!(
                    "{id}: unreadable frontmatter, ignoring it ({e})"
                ))),
            }
        }

        let mut mentions = Vec::new();
        let mut wiki_ranges: Vec<Range<usize>> = Vec::new();

        for cap in WIKILINK_RE.captures_iter(text) {
            let Some(whole) = cap.get(0) else { continue };
            let range = whole.range();
            if is_excluded(range.start, &excluded) {
                continue;
            }
            wiki_ranges.push(range.clone());
            let content = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            let (target_part, alias) = match content.split_once('|') {
                Some((target, alias)) => (target, Some(alias.trim())),
                None => (content, None),
            };
            let (raw, anchor) = split_anchor(target_part);
            if raw.is_empty() {
                if anchor.is_some() {
                    // `[[#Heading]]` points inside the current document.
                    continue;
                }
                diagnostics.push(ParseDiagnostic::malformed(
                    "empty wiki link target",
                    range.clone(),
                    lines.position(range.start),
                ));
                continue;
            }
            let display = alias
                .filter(|alias| !alias.is_empty())
                .unwrap_or(raw)
                .to_string();
            mentions.push(self.mention(id, raw, display, anchor, range, LinkForm::Wiki, &lines));
        }

        for (offset, _) in text.match_indices("[[") {
            let inside_link = wiki_ranges
                .iter()
                .any(|r| offset >= r.start && offset < r.end);
            if inside_link || is_excluded(offset, &excluded) {
                continue;
            }
            let line_end = text[offset..]
                .find(['\n', '\r'])
                .map(|idx| offset + idx)
                .unwrap_or(text.len());
            // Unterminated when the line has no `]]`, or another `[[` opens before it.
            let rest = &text[offset + 2..line_end];
            let reopen = rest.find("[[");
            let unterminated = match rest.find("]]") {
                Some(close) => reopen.is_some_and(|r| r < close),
                None => true,
            };
            if unterminated {
                let end = reopen.map(|r| offset + 2 + r).unwrap_or(line_end);
                diagnostics.push(ParseDiagnostic::malformed(
                    "unterminated wiki link",
                    offset..end,
                    lines.position(offset),
                ));
            }
        }

        for cap in INLINE_LINK_RE.captures_iter(text) {
            let Some(whole) = cap.get(0) else { continue };
            let range = whole.range();
            let overlaps_wiki = wiki_ranges
                .iter()
                .any(|r| range.start < r.end && r.start < range.end);
            if overlaps_wiki || is_excluded(range.start, &excluded) {
                continue;
            }
            if cap.get(1).is_some_and(|bang| !bang.as_str().is_empty()) {
                continue;
            }
            let text_part = cap.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            let dest = cap.get(3).map(|m| m.as_str()).unwrap_or_default();
            let dest = dest
                .strip_prefix('<')
                .and_then(|d| d.strip_suffix('>'))
                .unwrap_or(dest)
                .trim();
            if dest.is_empty() {
                diagnostics.push(ParseDiagnostic::malformed(
                    "empty inline link target",
                    range.clone(),
                    lines.position(range.start),
                ));
                continue;
            }
            if SCHEME_RE.is_match(dest) || dest.starts_with('#') {
                continue;
            }
            let decoded = dest.replace("%20", " ");
            let (raw, anchor) = split_anchor(&decoded);
            if raw.is_empty() {
                continue;
            }
            let display = if text_part.is_empty() {
                raw.to_string()
            } else {
                text_part.to_string()
            };
            mentions.push(self.mention(id, raw, display, anchor, range, LinkForm::Inline, &lines));
        }
        mentions.sort_by_key(|m| m.range.start);

        let mut definitions: Vec<ReferenceDefinition> = Vec::new();
        for cap in DEFINITION_RE.captures_iter(text) {
            let Some(whole) = cap.get(0) else { continue };
            if is_excluded(whole.start(), &excluded) {
                continue;
            }
            let name = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let target = cap.get(2).map(|m| m.as_str()).unwrap_or_default();
            let target = target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .unwrap_or(target)
                .trim();
            if name.is_empty() || target.is_empty() || name.starts_with('^') {
                continue;
            }
            let mut def = ReferenceDefinition::new(name, target.replace("%20", " "), id);
            if let Some(title) = cap.get(3) {
                def = def.with_title(title.as_str());
            }
            if let Some(priority) = cap.get(4) {
                match priority.as_str().trim().parse::<i64>() {
                    Ok(p) => def = def.with_priority(p),
                    Err(_) => diagnostics.push(ParseDiagnostic::Warning(format!(
                        "{id}:{}: reference '{name}' has a non-numeric priority '{}', using 0",
                        lines.position(whole.start()),
                        priority.as_str()
                    ))),
                }
            }
            // Later declarations of the same (name, target) in one document replace earlier ones.
            definitions.retain(|d| !(d.name == def.name && d.target == def.target));
            definitions.push(def);
        }

        let mention_ranges: Vec<Range<usize>> = mentions.iter().map(|m| m.range.clone()).collect();
        for cap in TAG_RE.captures_iter(text) {
            let Some(word) = cap.get(1) else { continue };
            let hash_offset = word.start() - 1;
            if is_excluded(hash_offset, &excluded) || is_excluded(hash_offset, &mention_ranges) {
                continue;
            }
            let tag = word.as_str().trim_end_matches(['/', '-']).to_lowercase();
            if tag.chars().any(char::is_alphabetic) {
                tags.insert(tag);
            }
        }

        let title = fm_title
            .or_else(|| {
                HEADING_RE
                    .captures_iter(text)
                    .find(|cap| {
                        cap.get(0)
                            .is_some_and(|m| !is_excluded(m.start(), &excluded))
                    })
                    .and_then(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
            })
            .unwrap_or_else(|| file_stem(id).to_string());

        tracing::trace!(
            "[MentionParser::parse] {id}: {} mentions, {} tags, {} definitions, {} diagnostics",
            mentions.len(),
            tags.len(),
            definitions.len(),
            diagnostics.len()
        );

        ParsedDocument {
            id: id.to_string(),
            fingerprint: fingerprint(text),
            title,
            size: text.len(),
            mentions,
            tags: tags.into_iter().collect(),
            definitions,
            diagnostics,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn mention(
        &self,
        source: &str,
        raw: &str,
        display: String,
        anchor: Option<&str>,
        range: Range<usize>,
        form: LinkForm,
        lines: &LineIndex<'_>,
    ) -> Mention {
        Mention {
            raw: raw.to_string(),
            display,
            source: source.to_string(),
            target: None,
            anchor: anchor.map(str::to_string),
            start: lines.position(range.start),
            end: lines.position(range.end),
            range,
            form,
            exists: false,
        }
    }
}

/// Split `target#anchor`; empty anchors become `None`.
fn split_anchor(target: &str) -> (&str, Option<&str>) {
    match target.split_once('#') {
        Some((path, anchor)) => {
            let anchor = anchor.trim();
            (path.trim(), (!anchor.is_empty()).then_some(anchor))
        }
        None => (target.trim(), None),
    }
}

/// Returns true if the byte offset falls within any excluded range.
fn is_excluded(offset: usize, excluded: &[Range<usize>]) -> bool {
    excluded.iter().any(|r| r.contains(&offset))
}

/// Byte ranges of code blocks and inline code spans, shifted by `base`.
fn code_ranges(text: &str, base: usize) -> Vec<Range<usize>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    MdParser::new_ext(text, options)
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            MdEvent::Start(MdTag::CodeBlock(_)) | MdEvent::Code(_) => {
                Some(range.start + base..range.end + base)
            }
            _ => None,
        })
        .collect()
}

/// Find a leading `---` YAML block. Returns the YAML text and the byte offset where the body
/// starts (0 when there is no frontmatter).
fn split_frontmatter(text: &str) -> (Option<&str>, usize) {
    let first_line_end = match text.find('\n') {
        Some(idx) => idx,
        None => return (None, 0),
    };
    if text[..first_line_end].trim_end() != "---" {
        return (None, 0);
    }
    let yaml_start = first_line_end + 1;
    let mut offset = yaml_start;
    for line in text[yaml_start..].split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return (Some(&text[yaml_start..offset]), offset + line.len());
        }
        offset += line.len();
    }
    (None, 0)
}

fn read_frontmatter(yaml: &str) -> Result<(Option<String>, Vec<String>), LinkIndexError> {
    if yaml.trim().is_empty() {
        return Ok((None, Vec::new()));
    }
    let value: YamlValue = serde_yaml::from_str(yaml)?;
    let YamlValue::Mapping(map) = value else {
        return Err(LinkIndexError::Serialization(
            "frontmatter is not a mapping".to_string(),
        ));
    };
    let title = map
        .get("title")
        .and_then(YamlValue::as_str)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let tags = match map.get("tags") {
        Some(YamlValue::Sequence(seq)) => seq
            .iter()
            .filter_map(YamlValue::as_str)
            .map(str::to_string)
            .collect(),
        Some(YamlValue::String(s)) => s
            .split([',', ' '])
            .map(str::to_string)
            .collect::<Vec<String>>(),
        _ => Vec::new(),
    };
    let tags = tags
        .into_iter()
        .map(|t| t.trim().trim_start_matches('#').to_lowercase())
        .filter(|t| t.chars().any(char::is_alphabetic))
        .collect();
    Ok((title, tags))
}

/// Parse with default configuration.
pub fn parse_document(id: &str, text: &str) -> ParsedDocument {
    MentionParser::default().parse(id, text)
}

use std::{
    borrow::Cow,
    path::{Component, Path},
};
use unicode_normalization::UnicodeNormalization;

/// Separator used when collapsing whitespace and underscore runs inside a path segment.
pub const SEGMENT_SEPARATOR: char = '-';

/// Utility function to replace separators and convert to unicode (via to_string_lossy) on os path.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    let res = os_path_ref
        .as_ref()
        .components()
        .filter_map(|c| match c {
            Component::RootDir | Component::Prefix(_) => None,
            Component::CurDir => None,
            _ => Some(c.as_os_str().to_string_lossy()),
        })
        .collect::<Vec<Cow<'_, str>>>()
        .join("/");
    tracing::trace!(
        "os_path_to_string: turned {:?} into {}",
        os_path_ref.as_ref(),
        res
    );
    res
}

/// Last `/`-separated segment of `path`.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Everything before the last `/`, or `""` for a root-level path.
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|idx| &path[..idx]).unwrap_or("")
}

/// Extension of the last path segment, without the dot. Empty when there is none.
///
/// Only a short alphanumeric suffix that contains a letter counts as an extension, so a title
/// like `Release 1.5` is not mistaken for a file with extension `5`. Hidden files (`.env`) have
/// no extension.
pub fn extension(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => {
            let ext = &name[idx + 1..];
            let looks_like_ext = !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic());
            if looks_like_ext {
                ext
            } else {
                ""
            }
        }
    }
}

/// `path` without its extension (see [extension]).
pub fn strip_extension(path: &str) -> &str {
    let ext = extension(path);
    if ext.is_empty() {
        path
    } else {
        &path[..path.len() - ext.len() - 1]
    }
}

/// File name of `path` without its extension.
pub fn file_stem(path: &str) -> &str {
    strip_extension(file_name(path))
}

/// Trim `raw` and append `.{default_ext}` when it has no extension. Case is preserved; this is
/// the form compared by the exact (case-sensitive) resolution tier.
pub fn with_default_extension(raw: &str, default_ext: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('/');
    if trimmed.is_empty() || !extension(trimmed).is_empty() {
        trimmed.to_string()
    } else {
        format!("{trimmed}.{default_ext}")
    }
}

fn canonical_segment(segment: &str) -> String {
    if segment == "." || segment == ".." {
        return segment.to_string();
    }
    let mut out = String::with_capacity(segment.len());
    let mut pending_sep = false;
    for c in segment.chars() {
        if c.is_whitespace() || c == '_' || c == SEGMENT_SEPARATOR {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push(SEGMENT_SEPARATOR);
        }
        pending_sep = false;
        out.push(c);
    }
    out
}

/// Canonicalize a raw mention target (or a document id) into a filesystem-like identifier.
///
/// Steps: unicode NFC normalization, trim, lower-case, `\` to `/`, collapse runs of whitespace,
/// `_` and `-` inside each segment into a single `-`, drop separators at segment edges, drop
/// empty segments, and append `.{default_ext}` when the last segment has no extension.
///
/// The parser and the resolver both use this function; it is the single source of truth for
/// what "the same target" means.
///
/// ```
/// use noet_links::paths::canonical_target;
/// assert_eq!(canonical_target("  My  Note__draft ", "md"), "my-note-draft.md");
/// assert_eq!(canonical_target("Projects//Big_Plan-", "md"), "projects/big-plan.md");
/// assert_eq!(canonical_target("Target.MD", "md"), "target.md");
/// ```
pub fn canonical_target(raw: &str, default_ext: &str) -> String {
    let normalized: String = raw.trim().nfc().collect::<String>().to_lowercase();
    let segments = normalized
        .replace('\\', "/")
        .split('/')
        .map(canonical_segment)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<String>>();
    if segments.is_empty() {
        return String::new();
    }
    let joined = segments.join("/");
    let last = segments.last().map(String::as_str).unwrap_or_default();
    if last == "." || last == ".." || !extension(&joined).is_empty() {
        joined
    } else {
        format!("{joined}.{}", default_ext.to_lowercase())
    }
}

/// The canonical form without its extension, used for edit-distance and substring comparison.
pub fn canonical_stem(raw: &str, default_ext: &str) -> String {
    strip_extension(&canonical_target(raw, default_ext)).to_string()
}

/// Resolve `target` against the directory containing `source`, honoring `.` and `..`.
///
/// Returns `None` when `target` walks above the corpus root.
///
/// Example: `resolve_relative("notes/source.md", "../ideas")` -> `Some("ideas")`
pub fn resolve_relative(source: &str, target: &str) -> Option<String> {
    let mut segments: Vec<&str> = parent_dir(source)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    for part in target.split('/') {
        match part {
            ".." => {
                segments.pop()?;
            }
            "." | "" => {}
            _ => segments.push(part),
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_collapses_separator_runs() {
        assert_eq!(canonical_target("My Note", "md"), "my-note.md");
        assert_eq!(canonical_target("my__note", "md"), "my-note.md");
        assert_eq!(canonical_target("my \t _ note", "md"), "my-note.md");
        assert_eq!(canonical_target("--my--note--", "md"), "my-note.md");
    }

    #[test]
    fn canonical_keeps_existing_extension() {
        assert_eq!(canonical_target("Report.TXT", "md"), "report.txt");
        assert_eq!(canonical_target("Release 1.5", "md"), "release-1.5.md");
    }

    #[test]
    fn canonical_normalizes_directories() {
        assert_eq!(canonical_target("/Notes//Sub Dir/Idea", "md"), "notes/sub-dir/idea.md");
        assert_eq!(canonical_target("notes\\idea", "md"), "notes/idea.md");
        assert_eq!(canonical_target("../Ideas", "md"), "../ideas.md");
    }

    #[test]
    fn canonical_is_deterministic_and_idempotent() {
        let once = canonical_target(" Déjà  Vu ", "md");
        assert_eq!(once, canonical_target(" Déjà  Vu ", "md"));
        assert_eq!(once, canonical_target(&once, "md"));
        // Decomposed and precomposed forms canonicalize identically.
        assert_eq!(canonical_target("Cafe\u{301}", "md"), canonical_target("Café", "md"));
    }

    #[test]
    fn canonical_of_blank_is_empty() {
        assert_eq!(canonical_target("   ", "md"), "");
        assert_eq!(canonical_target("_ _", "md"), "");
    }

    #[test]
    fn path_parts() {
        assert_eq!(file_name("a/b/c.md"), "c.md");
        assert_eq!(parent_dir("a/b/c.md"), "a/b");
        assert_eq!(parent_dir("c.md"), "");
        assert_eq!(file_stem("a/b/c.md"), "c");
        assert_eq!(extension(".hidden"), "");
        assert_eq!(strip_extension("a/b.md"), "a/b");
    }

    #[test]
    fn default_extension_preserves_case() {
        assert_eq!(with_default_extension(" Target ", "md"), "Target.md");
        assert_eq!(with_default_extension("Target.md", "md"), "Target.md");
    }

    #[test]
    fn relative_resolution() {
        assert_eq!(
            resolve_relative("notes/source.md", "../ideas"),
            Some("ideas".to_string())
        );
        assert_eq!(
            resolve_relative("notes/source.md", "./sub/ideas"),
            Some("notes/sub/ideas".to_string())
        );
        assert_eq!(resolve_relative("source.md", "../ideas"), None);
    }
}

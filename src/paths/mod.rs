//! Path canonicalization shared by the mention parser and the resolver.
//!
//! Document ids are `/`-separated paths relative to the corpus root (`notes/idea.md`). Mention
//! targets are free text typed by a person (`[[Notes/Big Idea]]`). [canonical_target] maps both
//! onto the same identifier space.

pub mod path;

pub use path::{
    canonical_stem, canonical_target, extension, file_name, file_stem, os_path_to_string,
    parent_dir, resolve_relative, strip_extension, with_default_extension,
};

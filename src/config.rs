use crate::error::LinkIndexError;
use serde::{Deserialize, Serialize};
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

/// Tunables for parsing, resolution and rebuild reporting.
///
/// Every field has a default, so a partial (or absent) TOML file is valid:
///
/// ```toml
/// fuzzy_max_distance = 2
/// extensions = ["md", "markdown"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Extension appended to mention targets that have none.
    pub default_extension: String,
    /// File extensions [crate::source::FsSource] treats as documents.
    pub extensions: Vec<String>,
    /// Inclusive edit-distance bound of the fuzzy resolution tier.
    pub fuzzy_max_distance: usize,
    /// Maximum number of alternative candidates returned with a resolution.
    pub max_candidates: usize,
    /// Number of documents between two progress lines when a rebuild reports progress.
    pub progress_interval: usize,
    /// Ignore mentions and tags inside code blocks and inline code spans.
    pub exclude_code: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            default_extension: "md".to_string(),
            extensions: vec!["md".to_string()],
            fuzzy_max_distance: 3,
            max_candidates: 5,
            progress_interval: 100,
            exclude_code: true,
        }
    }
}

impl IndexConfig {
    pub fn from_toml_str(content: &str) -> Result<IndexConfig, LinkIndexError> {
        let config: IndexConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<IndexConfig, LinkIndexError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        tracing::debug!("Attempting to read index config from: {:?}", &path);
        if !path.exists() {
            tracing::debug!("Config file not found, using default index config.");
            return Ok(IndexConfig::default());
        }
        let content = read_to_string(&path)?;
        IndexConfig::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, LinkIndexError> {
        Ok(toml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), LinkIndexError> {
        if self.default_extension.trim().is_empty() || self.default_extension.contains('/') {
            return Err(LinkIndexError::Config(format!(
                "default_extension must be a bare extension, got '{}'",
                self.default_extension
            )));
        }
        if self.extensions.is_empty() {
            return Err(LinkIndexError::Config(
                "extensions must list at least one document extension".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(LinkIndexError::Config(
                "progress_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `path` carries one of the configured document extensions.
    pub fn is_document_path(&self, path: &str) -> bool {
        let ext = crate::paths::extension(path);
        !ext.is_empty()
            && self
                .extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
    }
}

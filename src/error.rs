use std::{io, path::StripPrefixError};

use serde::{Deserialize, Serialize};
use serde_yaml::Error as YamlError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum LinkIndexError {
    /// A full rebuild was requested while another one is running. This is an expected condition
    /// the host should handle (retry later or drop the request), not a fault.
    #[error("A rebuild is already in progress")]
    BuildInProgress,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl From<StripPrefixError> for LinkIndexError {
    fn from(src: StripPrefixError) -> LinkIndexError {
        LinkIndexError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for LinkIndexError {
    fn from(src: toml::de::Error) -> LinkIndexError {
        LinkIndexError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for LinkIndexError {
    fn from(src: toml::ser::Error) -> LinkIndexError {
        LinkIndexError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<YamlError> for LinkIndexError {
    fn from(src: YamlError) -> LinkIndexError {
        LinkIndexError::Serialization(format!("YAML frontmatter error: {src}"))
    }
}

impl From<io::Error> for LinkIndexError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => LinkIndexError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => LinkIndexError::PermissionDenied,
            io::ErrorKind::InvalidData => {
                LinkIndexError::Serialization(format!("Document is not valid UTF-8: {x}"))
            }
            _ => LinkIndexError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for LinkIndexError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_error) => io_error.into(),
            None => LinkIndexError::Io("Directory walk hit a filesystem loop".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_by_kind() {
        let missing: LinkIndexError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(missing, LinkIndexError::NotFound(_)));
        let denied: LinkIndexError = io::Error::new(io::ErrorKind::PermissionDenied, "no").into();
        assert_eq!(denied, LinkIndexError::PermissionDenied);
        let binary: LinkIndexError = io::Error::new(io::ErrorKind::InvalidData, "utf8").into();
        assert!(matches!(binary, LinkIndexError::Serialization(_)));
        let other: LinkIndexError = io::Error::new(io::ErrorKind::Interrupted, "eintr").into();
        assert!(matches!(other, LinkIndexError::Io(_)));
    }

    #[test]
    fn toml_errors_are_config_errors() {
        let err = toml::from_str::<toml::Value>("a = ").unwrap_err();
        assert!(matches!(LinkIndexError::from(err), LinkIndexError::Config(_)));
    }
}

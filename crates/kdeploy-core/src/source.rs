//! Kubeware source URIs and local fetching.
//!
//! Only local packages can be fetched; remote schemes are recognized so
//! the error message can name them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::package::METADATA_FILE;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SourceUri {
    /// HTTPS archive: https://releases.example.com/guestbook.tar.gz
    Https { url: String },
    /// Git: git://github.com/org/kubeware.git#ref
    Git { url: String, reference: String },
    /// Local directory: file:///srv/kubeware/guestbook or ./guestbook
    File { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported kubeware source scheme '{0}' (only local packages can be fetched)")]
    UnsupportedScheme(String),
    #[error("invalid kubeware source: {0}")]
    InvalidUri(String),
    #[error("no kubeware package at {} (missing kubeware.toml)", .path.display())]
    NotFound { path: PathBuf },
}

impl SourceUri {
    pub fn parse(uri: &str) -> Result<Self, SourceError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(SourceError::InvalidUri("empty kubeware identifier".into()));
        }

        if let Some(path) = uri.strip_prefix("file://") {
            Ok(SourceUri::File { path: PathBuf::from(path) })
        } else if uri.starts_with("https://") || uri.starts_with("http://") {
            Ok(SourceUri::Https { url: uri.to_string() })
        } else if uri.starts_with("git://") {
            let (url, reference) = uri.rsplit_once('#').unwrap_or((uri, "master"));
            Ok(SourceUri::Git {
                url: url.to_string(),
                reference: reference.to_string(),
            })
        } else if let Some((scheme, _)) = uri.split_once("://") {
            Err(SourceError::UnsupportedScheme(scheme.to_string()))
        } else {
            Ok(SourceUri::File { path: PathBuf::from(uri) })
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            SourceUri::Https { .. } => "https",
            SourceUri::Git { .. } => "git",
            SourceUri::File { .. } => "file",
        }
    }
}

/// Resolve a kubeware identifier to a local package directory.
///
/// A path to the metadata file itself is accepted and resolved to its
/// directory.
pub fn fetch(identifier: &str) -> Result<PathBuf, SourceError> {
    let path = match SourceUri::parse(identifier)? {
        SourceUri::File { path } => path,
        other => return Err(SourceError::UnsupportedScheme(other.scheme().to_string())),
    };

    let dir = if path.file_name().is_some_and(|n| n == METADATA_FILE) {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        path
    };

    if !dir.join(METADATA_FILE).is_file() {
        return Err(SourceError::NotFound { path: dir });
    }

    debug!(path = %dir.display(), "kubeware fetched from local directory");
    Ok(dir)
}

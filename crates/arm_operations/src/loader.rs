// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sources of per-provider operation metadata.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{Level, event};

use crate::MetadataObject;

/// Produces the operation metadata of one resource provider.
///
/// Implementations typically parse the provider's specification document. They
/// are only ever invoked from inside the metadata cache, at most once at a time
/// per provider, so they need not deduplicate work themselves.
pub trait SpecLoader: Send + Sync + 'static {
    /// Loads the operations of `provider`.
    fn load(&self, provider: &str) -> impl Future<Output = Result<Vec<MetadataObject>, SpecError>> + Send;
}

/// A provider's specification could not be turned into metadata.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// No specification document exists for the provider.
    #[error("no specification document for provider `{0}`")]
    NotFound(String),

    /// The document exists but could not be parsed.
    #[error("specification document for provider `{provider}` is malformed: {reason}")]
    Malformed {
        /// Provider whose document was rejected.
        provider: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// Reading the document failed.
    #[error("reading the specification document for provider `{provider}` failed")]
    Io {
        /// Provider whose document could not be read.
        provider: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Loads pre-parsed metadata from `<root>/<provider>.json`.
///
/// Each file holds a JSON array of [`MetadataObject`]. Provider names are
/// lower-cased to form the file name, so lookups ignore case the same way the
/// cache does.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    /// Creates a loader reading from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory documents are read from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, provider: &str) -> PathBuf {
        self.root.join(format!("{}.json", provider.to_ascii_lowercase()))
    }
}

impl SpecLoader for DirectoryLoader {
    async fn load(&self, provider: &str) -> Result<Vec<MetadataObject>, SpecError> {
        if provider.is_empty() || provider.contains(['/', '\\']) || provider.starts_with('.') {
            return Err(SpecError::NotFound(provider.to_string()));
        }

        let path = self.document_path(provider);
        event!(Level::DEBUG, provider, path = %path.display(), "reading specification document");

        let document = match tokio::fs::read(&path).await {
            Ok(document) => document,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Err(SpecError::NotFound(provider.to_string())),
            Err(source) => {
                return Err(SpecError::Io {
                    provider: provider.to_string(),
                    source,
                });
            }
        };

        serde_json::from_slice(&document).map_err(|error| SpecError::Malformed {
            provider: provider.to_string(),
            reason: error.to_string(),
        })
    }
}

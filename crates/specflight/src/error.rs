// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{any::Any, error::Error as StdError, sync::Arc};

type Cause = Arc<dyn StdError + Send + Sync>;

/// A failed load, shared by every caller that waited on the same flight.
///
/// The error is cheap to clone. The entry that produced it has already been
/// evicted by the time any caller observes it, so requesting the same key again
/// starts a fresh load.
#[derive(Debug, Clone, thiserror::Error)]
#[error("loading `{key}` failed: {cause}")]
pub struct LoadError {
    key: String,
    panicked: bool,
    #[source]
    cause: Cause,
}

impl LoadError {
    /// Creates an error for a loader of `key` that returned `cause`.
    pub fn new(key: impl Into<String>, cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            key: key.into(),
            panicked: false,
            cause: Arc::from(cause.into()),
        }
    }

    pub(crate) fn from_panic(key: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "loader panicked".to_string());

        Self {
            key: key.into(),
            panicked: true,
            cause: Arc::from(Box::<dyn StdError + Send + Sync>::from(message)),
        }
    }

    /// The key whose load failed.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the loader panicked rather than returning an error.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn display_names_key_and_cause() {
        let error = LoadError::new("Microsoft.Compute", "document not found");
        assert_eq!(error.to_string(), "loading `Microsoft.Compute` failed: document not found");
        assert_eq!(error.key(), "Microsoft.Compute");
        assert!(!error.is_panic());
    }

    #[test]
    fn source_is_the_cause() {
        let error = LoadError::new("Microsoft.Sql", std::io::Error::other("disk on fire"));
        let source = error.source().expect("cause should be exposed as source");
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let error = LoadError::from_panic("A", &"static message");
        assert!(error.is_panic());
        assert!(error.to_string().contains("static message"));

        let error = LoadError::from_panic("B", &String::from("owned message"));
        assert!(error.to_string().contains("owned message"));

        let error = LoadError::from_panic("C", &42_u32);
        assert!(error.to_string().contains("loader panicked"));
    }

    #[test]
    fn clones_share_the_cause() {
        let error = LoadError::new("Microsoft.Web", "boom");
        let clone = error.clone();
        assert!(Arc::ptr_eq(&error.cause, &clone.cause));
    }
}

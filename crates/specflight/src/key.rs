// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Case-insensitive identifier of a resource provider, such as `Microsoft.Compute`.
///
/// Two keys that differ only in ASCII case compare equal and hash identically, so
/// `Microsoft.Compute` and `MICROSOFT.COMPUTE` address the same cache entry. The
/// spelling the key was created with is preserved for display.
///
/// # Example
///
/// ```
/// use specflight::ProviderKey;
///
/// let a = ProviderKey::from("Microsoft.Compute");
/// let b = ProviderKey::from("MICROSOFT.COMPUTE");
///
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "Microsoft.Compute");
/// ```
#[derive(Clone)]
pub struct ProviderKey {
    name: Arc<str>,
}

impl ProviderKey {
    /// Creates a key from a provider name.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the provider name as originally spelled.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Returns the upper-cased form used for comparisons.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.name.to_ascii_uppercase()
    }
}

impl PartialEq for ProviderKey {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for ProviderKey {}

impl Hash for ProviderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.name.bytes() {
            state.write_u8(byte.to_ascii_uppercase());
        }
        // Terminator, same as `str` hashing, so that adjacent fields cannot collide.
        state.write_u8(0xff);
    }
}

impl Display for ProviderKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Debug for ProviderKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderKey").field(&&*self.name).finish()
    }
}

impl AsRef<str> for ProviderKey {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl From<&str> for ProviderKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ProviderKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

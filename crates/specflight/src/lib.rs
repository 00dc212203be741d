// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Single-flight memoizing cache for per-provider operation metadata.
//!
//! [`SpecFlight`] maps a key to the sequence produced by an expensive loader, such
//! as parsing a provider's specification document. It guarantees that:
//!
//! - **At most one loader runs per key at any instant.** The first caller for a
//!   key registers a flight; every caller that arrives while it is running waits
//!   on that flight instead of starting another.
//! - **Success is memoized.** Once a loader succeeds, its values are shared by all
//!   later callers for the remaining lifetime of the cache. No loader runs again
//!   for that key.
//! - **Failure is never cached.** A failed (or panicking) loader evicts its entry
//!   before any waiter sees the outcome. The waiters observe the failure, and the
//!   next call for the key starts a fresh load.
//!
//! Per key the state moves `absent → pending → {resolved | absent}`.
//!
//! # Example
//!
//! ```
//! use specflight::{ProviderKey, SpecFlight};
//!
//! # futures_util::FutureExt::now_or_never(async {
//! let cache: SpecFlight<ProviderKey, String> = SpecFlight::new();
//!
//! // Fails: the entry is evicted and `get` returns an empty sequence.
//! let ops = cache
//!     .get(ProviderKey::from("Microsoft.Web"), || async {
//!         Err::<Vec<String>, _>(std::io::Error::other("document unreachable"))
//!     })
//!     .await;
//! assert!(ops.is_empty());
//! assert!(cache.is_empty());
//!
//! // A later call retries with its own loader.
//! let ops = cache
//!     .get(ProviderKey::from("MICROSOFT.WEB"), || async {
//!         Ok::<_, std::io::Error>(vec!["sites/list".to_string()])
//!     })
//!     .await;
//! assert_eq!(ops.len(), 1);
//! # }).unwrap();
//! ```
//!
//! # Observing failures
//!
//! [`SpecFlight::get`] reports a failed load as an empty sequence, which callers
//! cannot tell apart from a provider with no operations. [`SpecFlight::try_get`]
//! follows the same protocol but returns the shared [`LoadError`] instead.
//!
//! # Growth
//!
//! Resolved entries are never evicted. The cache is meant for a bounded,
//! slowly-changing key space such as the set of resource providers.
//!
//! # Thread Safety
//!
//! [`SpecFlight`] is `Send` and `Sync`. Share one instance between request
//! handlers through an `Arc`.

mod error;
mod flight;
mod key;

pub use error::LoadError;
pub use flight::SpecFlight;
pub use key::ProviderKey;

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    error::Error as StdError,
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures_util::{
    FutureExt,
    future::{self, BoxFuture, Either, Shared},
};
use tokio::runtime::Handle;
use tracing::{Level, event};

use crate::LoadError;

type Outcome<T> = Result<Arc<[T]>, LoadError>;
type Flight<T> = Shared<BoxFuture<'static, Outcome<T>>>;
type Mapping<K, T> = DashMap<K, Slot<T>>;

/// State of one key. A key with no slot has never been loaded or its last load failed.
enum Slot<T> {
    /// A loader is running. Every caller for the key awaits this flight.
    Pending { generation: u64, flight: Flight<T> },
    /// Terminal for the lifetime of the cache.
    Resolved(Arc<[T]>),
}

impl<T> Slot<T> {
    fn is_flight(&self, generation: u64) -> bool {
        matches!(self, Self::Pending { generation: g, .. } if *g == generation)
    }
}

impl<T> Debug for Slot<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending { generation, .. } => f.debug_struct("Pending").field("generation", generation).finish_non_exhaustive(),
            Self::Resolved(values) => f.debug_tuple("Resolved").field(&values.len()).finish(),
        }
    }
}

/// Memoizes the output of an expensive per-key loader, running at most one
/// loader per key at any instant.
///
/// See the [crate documentation](crate) for the full contract.
pub struct SpecFlight<K, T> {
    mapping: Arc<Mapping<K, T>>,
    next_generation: AtomicU64,
}

impl<K, T> Default for SpecFlight<K, T>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self {
            mapping: Arc::default(),
            next_generation: AtomicU64::new(0),
        }
    }
}

impl<K, T> Debug for SpecFlight<K, T>
where
    K: Hash + Eq + Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecFlight").field("mapping", &self.mapping).finish_non_exhaustive()
    }
}

impl<K, T> SpecFlight<K, T>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the values for `key`, loading them with `loader` if no other caller
    /// has done so yet.
    ///
    /// A failed load yields an empty sequence. The failure is logged and the entry
    /// is evicted, so the next call for `key` runs a fresh loader. Use
    /// [`try_get`](Self::try_get) to observe the failure instead.
    ///
    /// # Example
    ///
    /// ```
    /// use specflight::{ProviderKey, SpecFlight};
    ///
    /// # futures_util::FutureExt::now_or_never(async {
    /// let cache: SpecFlight<ProviderKey, &str> = SpecFlight::new();
    ///
    /// let first = cache
    ///     .get("Microsoft.Sql".into(), || async { Ok::<_, std::io::Error>(vec!["servers/list"]) })
    ///     .await;
    ///
    /// // Already resolved, so this loader never runs.
    /// let second = cache
    ///     .get("MICROSOFT.SQL".into(), || async { Ok::<_, std::io::Error>(vec![]) })
    ///     .await;
    ///
    /// assert_eq!(*first, ["servers/list"]);
    /// assert_eq!(first, second);
    /// # }).unwrap();
    /// ```
    pub fn get<F, Fut, E>(&self, key: K, loader: F) -> impl Future<Output = Arc<[T]>> + Send
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
    {
        self.try_get(key, loader).map(|outcome| outcome.unwrap_or_else(|_| Vec::new().into()))
    }

    /// Returns the values for `key`, loading them with `loader` if no other caller
    /// has done so yet, and reports a failed load as [`LoadError`].
    ///
    /// The check for an existing entry and the registration of a new flight happen
    /// in one step when this method is called, not when the returned future is
    /// first polled. `loader` is only invoked when this call created the flight;
    /// otherwise it is dropped unused.
    ///
    /// Every caller that joins a flight observes its outcome: the same shared
    /// values on success, or a clone of the same [`LoadError`] on failure. A panic
    /// inside the loader is reported as a [`LoadError`] for which
    /// [`LoadError::is_panic`] returns `true`.
    ///
    /// Inside a Tokio runtime the flight runs on a task of its own, so once it
    /// starts it runs to completion or failure even if every caller drops its
    /// future. Outside a runtime the flight is driven by whoever awaits it.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, wrapped in [`LoadError`], to every caller that
    /// waited on the failed flight.
    pub fn try_get<F, Fut, E>(&self, key: K, loader: F) -> impl Future<Output = Result<Arc<[T]>, LoadError>> + Send
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
    {
        let flight = match self.mapping.entry(key) {
            Entry::Occupied(occupied) => match occupied.get() {
                Slot::Resolved(values) => return Either::Left(future::ready(Ok(Arc::clone(values)))),
                Slot::Pending { generation, flight } => {
                    event!(Level::TRACE, key = %occupied.key(), generation, "specflight: joining flight");
                    flight.clone()
                }
            },
            Entry::Vacant(vacant) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let flight = launch(Arc::downgrade(&self.mapping), vacant.key().clone(), generation, loader);
                vacant.insert(Slot::Pending {
                    generation,
                    flight: flight.clone(),
                });
                flight
            }
        };

        Either::Right(flight)
    }
}

impl<K, T> SpecFlight<K, T>
where
    K: Hash + Eq,
{
    /// Returns the values for `key` if a load has already succeeded.
    ///
    /// Never starts a load and never waits for one.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<Arc<[T]>> {
        self.mapping.get(key).and_then(|slot| match &*slot {
            Slot::Resolved(values) => Some(Arc::clone(values)),
            Slot::Pending { .. } => None,
        })
    }

    /// Whether a load for `key` is in flight.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.mapping.get(key).is_some_and(|slot| matches!(*slot, Slot::Pending { .. }))
    }

    /// Number of keys that are either resolved or in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether no key is resolved or in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

fn launch<K, T, F, Fut, E>(mapping: Weak<Mapping<K, T>>, key: K, generation: u64, loader: F) -> Flight<T>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    T: Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        return load(mapping, key, generation, loader).boxed().shared();
    };

    let task = runtime.spawn(load(Weak::clone(&mapping), key.clone(), generation, loader));
    async move {
        match task.await {
            Ok(outcome) => outcome,
            // Only reachable when the runtime shuts down under the task.
            Err(join_error) => {
                let outcome = Err(LoadError::new(key.to_string(), join_error));
                settle(&mapping, &key, generation, &outcome);
                outcome
            }
        }
    }
    .boxed()
    .shared()
}

async fn load<K, T, F, Fut, E>(mapping: Weak<Mapping<K, T>>, key: K, generation: u64, loader: F) -> Outcome<T>
where
    K: Hash + Eq + Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    event!(Level::DEBUG, key = %key, generation, "specflight: load started");

    let outcome = match AssertUnwindSafe(async move { loader().await }).catch_unwind().await {
        Ok(Ok(values)) => Ok(Arc::<[T]>::from(values)),
        Ok(Err(cause)) => Err(LoadError::new(key.to_string(), cause)),
        Err(payload) => Err(LoadError::from_panic(key.to_string(), &*payload)),
    };

    // Runs before the outcome is published to any waiter, so nobody can
    // observe a failed flight that is still registered.
    settle(&mapping, &key, generation, &outcome);
    outcome
}

fn settle<K, T>(mapping: &Weak<Mapping<K, T>>, key: &K, generation: u64, outcome: &Outcome<T>)
where
    K: Hash + Eq + Display,
{
    let Some(mapping) = mapping.upgrade() else {
        return;
    };

    match outcome {
        Ok(values) => {
            if let Some(mut slot) = mapping.get_mut(key)
                && slot.is_flight(generation)
            {
                *slot = Slot::Resolved(Arc::clone(values));
            }
            event!(Level::DEBUG, key = %key, generation, entries = values.len(), "specflight: load resolved");
        }
        Err(error) => {
            mapping.remove_if(key, |_, slot| slot.is_flight(generation));
            event!(
                Level::WARN,
                key = %key,
                generation,
                panicked = error.is_panic(),
                error = %error,
                "specflight: load failed, entry evicted"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderKey;

    static_assertions::assert_impl_all!(SpecFlight<ProviderKey, String>: Send, Sync, Debug, Default);

    #[test]
    fn slot_matches_only_its_own_generation() {
        let flight: Flight<u8> = async { Ok::<_, LoadError>(Arc::<[u8]>::from(vec![])) }.boxed().shared();
        let slot = Slot::Pending { generation: 7, flight };
        assert!(slot.is_flight(7));
        assert!(!slot.is_flight(8));
        assert!(!Slot::Resolved(Arc::<[u8]>::from(vec![1])).is_flight(7));
    }

    #[test]
    fn debug_lists_slots() {
        let cache: SpecFlight<ProviderKey, u8> = SpecFlight::new();
        cache
            .mapping
            .insert(ProviderKey::from("Microsoft.Web"), Slot::Resolved(Arc::from(vec![1, 2])));

        let debug = format!("{cache:?}");
        assert!(debug.contains("SpecFlight"), "{debug}");
        assert!(debug.contains("Resolved(2)"), "{debug}");
    }

    #[test]
    fn settle_ignores_a_superseded_flight() {
        let cache: SpecFlight<ProviderKey, u8> = SpecFlight::new();
        let key = ProviderKey::from("Microsoft.Compute");
        let flight: Flight<u8> = future::pending::<Outcome<u8>>().boxed().shared();
        cache.mapping.insert(key.clone(), Slot::Pending { generation: 2, flight });

        let stale = Err(LoadError::new("Microsoft.Compute", "stale"));
        settle(&Arc::downgrade(&cache.mapping), &key, 1, &stale);
        assert!(cache.is_pending(&key));

        settle(&Arc::downgrade(&cache.mapping), &key, 1, &Ok(Arc::from(vec![9])));
        assert!(cache.is_pending(&key));
        assert!(cache.peek(&key).is_none());
    }

    #[test]
    fn settle_after_cache_dropped_is_a_no_op() {
        let cache: SpecFlight<ProviderKey, u8> = SpecFlight::new();
        let weak = Arc::downgrade(&cache.mapping);
        drop(cache);

        settle(&weak, &ProviderKey::from("Microsoft.Sql"), 0, &Ok(Arc::from(vec![1])));
    }
}

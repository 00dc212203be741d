// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use futures_util::future::join_all;
use specflight::{LoadError, ProviderKey, SpecFlight};
use tracing::{Level, event};

use crate::{MetadataObject, Operations, SpecLoader};

/// The process-wide metadata cache, keyed by provider.
pub type MetadataCache = SpecFlight<ProviderKey, MetadataObject>;

/// Merges the metadata of several providers behind one shared cache.
///
/// The result always starts with the baseline (provider-independent)
/// operations, followed by each requested provider's operations in request
/// order. Duplicate provider names contribute their operations once per
/// occurrence. A provider whose metadata fails to load contributes nothing to
/// that call and is retried on the next one.
#[derive(Debug)]
pub struct ProviderAggregator<L> {
    cache: Arc<MetadataCache>,
    loader: Arc<L>,
    baseline: Arc<[MetadataObject]>,
}

impl<L> Clone for ProviderAggregator<L> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            loader: Arc::clone(&self.loader),
            baseline: Arc::clone(&self.baseline),
        }
    }
}

/// Outcome of loading one provider during [`ProviderAggregator::aggregate_detailed`].
#[derive(Debug, Clone)]
pub enum ProviderStatus {
    /// Metadata was available; `operations` entries were contributed.
    Loaded {
        /// Number of operations the provider contributed.
        operations: usize,
    },
    /// The load failed; the provider contributed nothing and will be retried.
    Failed(LoadError),
}

impl ProviderStatus {
    /// Whether the provider's metadata was available.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

/// Merged operations together with the per-provider outcome.
#[derive(Debug, Clone)]
pub struct AggregateReport {
    /// Baseline followed by every loaded provider's operations.
    pub operations: Operations,
    /// One entry per requested provider, in request order.
    pub providers: Vec<(String, ProviderStatus)>,
}

impl<L: SpecLoader> ProviderAggregator<L> {
    /// Creates an aggregator with its own, empty cache.
    pub fn new(loader: Arc<L>, baseline: impl Into<Arc<[MetadataObject]>>) -> Self {
        Self::with_cache(Arc::new(MetadataCache::new()), loader, baseline)
    }

    /// Creates an aggregator that shares `cache` with other components.
    pub fn with_cache(cache: Arc<MetadataCache>, loader: Arc<L>, baseline: impl Into<Arc<[MetadataObject]>>) -> Self {
        Self {
            cache,
            loader,
            baseline: baseline.into(),
        }
    }

    /// The cache shared by every call.
    #[must_use]
    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// The provider-independent operations every aggregate starts with.
    #[must_use]
    pub fn baseline(&self) -> &[MetadataObject] {
        &self.baseline
    }

    /// Returns the operations of one provider, loading them on first use.
    ///
    /// A failed load yields an empty sequence.
    pub async fn provider(&self, name: &str) -> Arc<[MetadataObject]> {
        self.load(name).await.unwrap_or_else(|_| Vec::new().into())
    }

    /// Returns the baseline followed by the operations of `providers`, in order.
    ///
    /// `None` and an empty list both yield just the baseline.
    pub async fn aggregate<S: AsRef<str>>(&self, providers: Option<&[S]>) -> Operations {
        self.aggregate_detailed(providers).await.operations
    }

    /// Like [`aggregate`](Self::aggregate), but also reports which providers
    /// failed to load so callers can tell "no operations" from "load failed".
    pub async fn aggregate_detailed<S: AsRef<str>>(&self, providers: Option<&[S]>) -> AggregateReport {
        let providers = providers.unwrap_or_default();

        let outcomes = join_all(providers.iter().map(|name| self.load(name.as_ref()))).await;

        let mut operations = Operations::with_capacity(providers.len() + 1);
        operations.push(Arc::clone(&self.baseline));

        let mut statuses = Vec::with_capacity(providers.len());
        for (name, outcome) in providers.iter().zip(outcomes) {
            let status = match outcome {
                Ok(segment) => {
                    let status = ProviderStatus::Loaded {
                        operations: segment.len(),
                    };
                    operations.push(segment);
                    status
                }
                Err(error) => ProviderStatus::Failed(error),
            };
            statuses.push((name.as_ref().to_string(), status));
        }

        event!(
            Level::DEBUG,
            providers = providers.len(),
            failed = statuses.iter().filter(|(_, status)| !status.is_loaded()).count(),
            operations = operations.len(),
            "aggregated provider metadata"
        );

        AggregateReport {
            operations,
            providers: statuses,
        }
    }

    fn load(&self, name: &str) -> impl Future<Output = Result<Arc<[MetadataObject]>, LoadError>> + Send {
        let loader = Arc::clone(&self.loader);
        let provider = name.to_string();
        self.cache
            .try_get(ProviderKey::from(name), move || async move { loader.load(&provider).await })
    }
}

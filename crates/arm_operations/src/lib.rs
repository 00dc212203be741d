// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Operation metadata and request relaying for the resource-management API.
//!
//! The crate sits between a browsing client and the management API:
//!
//! - [`ProviderAggregator`] merges the operation metadata of several resource
//!   providers. Each provider's metadata is loaded through a [`SpecLoader`] at
//!   most once at a time and kept for the lifetime of the shared
//!   [`MetadataCache`]. Failed loads are retried on the next request.
//! - [`RequestGateway`] turns client requests into [`http`] responses: the
//!   providers visible to a [`Principal`], merged metadata with the time the
//!   merge took, and arbitrary calls relayed through an [`ArmRepository`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use arm_operations::{DirectoryLoader, GatewayConfig, ProviderAggregator};
//!
//! # futures_util::FutureExt::now_or_never(async {
//! let config = GatewayConfig::for_host("resources.azure.com");
//! let aggregator = ProviderAggregator::new(Arc::new(DirectoryLoader::new("specs")), config.baseline());
//!
//! // Without providers, only the provider-independent operations are returned.
//! let operations = aggregator.aggregate::<String>(None).await;
//! assert_eq!(operations.len(), config.baseline().len());
//! # }).unwrap();
//! ```
//!
//! # Observing failures
//!
//! A provider whose metadata cannot be loaded contributes no operations, which
//! looks the same as a provider without operations. Use
//! [`ProviderAggregator::aggregate_detailed`] to tell the two apart.
//!
//! # Testing
//!
//! Enable the `test-util` feature for in-memory fakes of the collaborators in
//! the `testing` module.

mod aggregator;
mod config;
mod error;
mod gateway;
mod loader;
mod metadata;
mod repository;
mod specless;
#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;

pub use aggregator::{AggregateReport, MetadataCache, ProviderAggregator, ProviderStatus};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{OperationInfo, RequestGateway};
pub use loader::{DirectoryLoader, SpecError, SpecLoader};
pub use metadata::{Iter, MetadataObject, Operations};
pub use repository::{ArmRepository, Principal, RepositoryError};
pub use specflight::{LoadError, ProviderKey};
pub use specless::specless_operations;

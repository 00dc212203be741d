// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory fakes of the gateway's collaborators.
//!
//! [`MockSpecLoader`] serves configured metadata per provider and records every
//! load. [`MockArmRepository`] serves configured subscriptions and records
//! every relayed request. Both support failure injection for testing error
//! paths.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::{ArmRepository, MetadataObject, Principal, RepositoryError, SpecError, SpecLoader};

/// A [`SpecLoader`] serving configured metadata.
///
/// Providers are matched ignoring case. A provider with nothing configured is
/// reported as [`SpecError::NotFound`].
///
/// # Examples
///
/// ```
/// use arm_operations::testing::MockSpecLoader;
/// use arm_operations::{MetadataObject, SpecLoader};
///
/// # futures_util::FutureExt::now_or_never(async {
/// let loader = MockSpecLoader::new();
/// loader.respond("Microsoft.Web", vec![MetadataObject::new("Sites.List", "GET", "/sites", "2023-12-01")]);
///
/// assert_eq!(loader.load("microsoft.web").await.unwrap().len(), 1);
/// assert!(loader.load("Microsoft.Sql").await.is_err());
/// assert_eq!(loader.calls(), ["microsoft.web", "Microsoft.Sql"]);
/// # }).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MockSpecLoader {
    responses: Mutex<HashMap<String, Result<Vec<MetadataObject>, String>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockSpecLoader {
    /// Creates a loader with nothing configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every load wait for `delay` before completing.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serves `operations` for `provider` from now on.
    pub fn respond(&self, provider: &str, operations: Vec<MetadataObject>) {
        self.responses.lock().insert(provider.to_ascii_uppercase(), Ok(operations));
    }

    /// Fails loads of `provider` as malformed from now on.
    pub fn fail(&self, provider: &str, reason: impl Into<String>) {
        self.responses.lock().insert(provider.to_ascii_uppercase(), Err(reason.into()));
    }

    /// The provider names passed to [`SpecLoader::load`], in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl SpecLoader for MockSpecLoader {
    async fn load(&self, provider: &str) -> Result<Vec<MetadataObject>, SpecError> {
        self.calls.lock().push(provider.to_string());
        let response = self.responses.lock().get(&provider.to_ascii_uppercase()).cloned();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            Some(Ok(operations)) => Ok(operations),
            Some(Err(reason)) => Err(SpecError::Malformed {
                provider: provider.to_string(),
                reason,
            }),
            None => Err(SpecError::NotFound(provider.to_string())),
        }
    }
}

#[derive(Debug)]
struct Upstream {
    subscriptions: Vec<(String, Vec<String>)>,
    discovery_failure: Option<String>,
    invoke_failure: Option<String>,
    reply: (StatusCode, Bytes),
    requests: Vec<Request<Bytes>>,
}

/// An [`ArmRepository`] serving configured subscriptions.
///
/// Relayed requests are recorded and answered with a configurable reply,
/// `200` with an empty body by default.
///
/// # Examples
///
/// ```
/// use arm_operations::testing::MockArmRepository;
/// use arm_operations::{ArmRepository, Principal};
///
/// # futures_util::FutureExt::now_or_never(async {
/// let repository = MockArmRepository::new();
/// repository.add_subscription("sub-1", ["Microsoft.Web"]);
///
/// let principal = Principal::new("alice", "Bearer token");
/// assert_eq!(repository.subscription_ids(&principal).await.unwrap(), ["sub-1"]);
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct MockArmRepository {
    upstream: Mutex<Upstream>,
}

impl Default for MockArmRepository {
    fn default() -> Self {
        Self {
            upstream: Mutex::new(Upstream {
                subscriptions: Vec::new(),
                discovery_failure: None,
                invoke_failure: None,
                reply: (StatusCode::OK, Bytes::new()),
                requests: Vec::new(),
            }),
        }
    }
}

impl MockArmRepository {
    /// Creates a repository with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription with the given registered providers.
    pub fn add_subscription<I>(&self, id: &str, providers: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.upstream
            .lock()
            .subscriptions
            .push((id.to_string(), providers.into_iter().map(Into::into).collect()));
    }

    /// Fails every discovery call from now on.
    pub fn fail_discovery(&self, reason: impl Into<String>) {
        self.upstream.lock().discovery_failure = Some(reason.into());
    }

    /// Fails every relayed request from now on, without a response.
    pub fn fail_invoke(&self, reason: impl Into<String>) {
        self.upstream.lock().invoke_failure = Some(reason.into());
    }

    /// Answers relayed requests with `status` and `body` from now on.
    pub fn reply(&self, status: StatusCode, body: impl Into<Bytes>) {
        self.upstream.lock().reply = (status, body.into());
    }

    /// Copies of the requests relayed so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request<Bytes>> {
        self.upstream
            .lock()
            .requests
            .iter()
            .map(|request| {
                let mut copy = Request::new(request.body().clone());
                *copy.method_mut() = request.method().clone();
                *copy.uri_mut() = request.uri().clone();
                *copy.headers_mut() = request.headers().clone();
                copy
            })
            .collect()
    }

    fn providers_of(&self, operation: &'static str, subscription_id: &str) -> Result<Vec<String>, RepositoryError> {
        let upstream = self.upstream.lock();
        if let Some(reason) = &upstream.discovery_failure {
            return Err(RepositoryError::new(operation, reason.clone()));
        }

        upstream
            .subscriptions
            .iter()
            .find(|(id, _)| id == subscription_id)
            .map(|(_, providers)| providers.clone())
            .ok_or_else(|| RepositoryError::new(operation, format!("unknown subscription `{subscription_id}`")))
    }
}

impl ArmRepository for MockArmRepository {
    async fn subscription_ids(&self, _principal: &Principal) -> Result<Vec<String>, RepositoryError> {
        let upstream = self.upstream.lock();
        if let Some(reason) = &upstream.discovery_failure {
            return Err(RepositoryError::new("list subscriptions", reason.clone()));
        }

        Ok(upstream.subscriptions.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn provider_names_for(&self, _principal: &Principal, subscription_id: &str) -> Result<Vec<String>, RepositoryError> {
        self.providers_of("list provider names", subscription_id)
    }

    async fn providers_for(&self, _principal: &Principal, subscription_id: &str) -> Result<Value, RepositoryError> {
        let providers = self.providers_of("list providers", subscription_id)?;
        Ok(providers.into_iter().map(|namespace| json!({ "namespace": namespace })).collect())
    }

    async fn invoke(&self, _principal: &Principal, request: Request<Bytes>) -> Result<Response<Bytes>, RepositoryError> {
        let mut upstream = self.upstream.lock();
        upstream.requests.push(request);
        if let Some(reason) = &upstream.invoke_failure {
            return Err(RepositoryError::new("invoke", reason.clone()));
        }

        let (status, body) = upstream.reply.clone();
        let mut response = Response::new(body);
        *response.status_mut() = status;
        Ok(response)
    }
}

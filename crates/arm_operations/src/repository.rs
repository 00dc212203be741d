// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use serde_json::Value;

/// The authenticated caller on whose behalf the management API is queried.
///
/// The gateway never inspects the credential. It is handed to the
/// [`ArmRepository`] as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    name: Arc<str>,
    authorization: Arc<str>,
}

impl Principal {
    /// Creates a principal from a display name and the value of its
    /// `Authorization` header.
    pub fn new(name: impl Into<Arc<str>>, authorization: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            authorization: authorization.into(),
        }
    }

    /// The caller's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The credential to forward upstream.
    #[must_use]
    pub fn authorization(&self) -> &str {
        &self.authorization
    }
}

impl Debug for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("name", &self.name)
            .field("authorization", &"<redacted>")
            .finish()
    }
}

/// A call to the management API failed before a response was received.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed")]
pub struct RepositoryError {
    operation: &'static str,
    #[source]
    cause: Box<dyn std::error::Error + Send + Sync>,
}

impl RepositoryError {
    /// Creates an error for `operation` caused by `cause`.
    pub fn new(operation: &'static str, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            operation,
            cause: cause.into(),
        }
    }

    /// The repository operation that failed.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

/// Subscription discovery and the outbound relay to the management API.
pub trait ArmRepository: Send + Sync + 'static {
    /// Lists the ids of the subscriptions visible to `principal`.
    fn subscription_ids(&self, principal: &Principal) -> impl Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    /// Lists the namespaces of the providers registered in one subscription.
    fn provider_names_for(
        &self,
        principal: &Principal,
        subscription_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    /// Returns the raw provider listing of one subscription.
    fn providers_for(&self, principal: &Principal, subscription_id: &str) -> impl Future<Output = Result<Value, RepositoryError>> + Send;

    /// Sends `request` upstream with the principal's credential attached and
    /// returns the response, whatever its status.
    fn invoke(
        &self,
        principal: &Principal,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>, RepositoryError>> + Send;
}

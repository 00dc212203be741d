// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Response, StatusCode};

use crate::RepositoryError;

/// A gateway request could not be served.
///
/// Failures of individual providers' metadata are not errors here; they are
/// absorbed by the cache and reported through
/// [`ProviderAggregator::aggregate_detailed`](crate::ProviderAggregator::aggregate_detailed).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Listing subscriptions or providers failed.
    #[error("provider discovery failed")]
    Discovery(#[source] RepositoryError),

    /// Relaying a call to the management API failed before a response arrived.
    #[error("relaying the request upstream failed")]
    Upstream(#[source] RepositoryError),

    /// The operation to invoke is not a valid HTTP request.
    #[error("invalid operation: {0}")]
    InvalidRequest(String),

    /// A response body could not be serialized.
    #[error("serializing the response failed")]
    Serialization(#[from] serde_json::Error),

    /// The gateway configuration is unusable.
    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// The status code reported to the client.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Discovery(_) | Self::Serialization(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts the error into a response with a generic JSON body.
    ///
    /// Only client errors echo their message; server-side causes are kept out
    /// of the response.
    #[must_use]
    pub fn into_response(self) -> Response<Bytes> {
        let status = self.status();
        let message = if status.is_client_error() {
            self.to_string()
        } else {
            status.canonical_reason().unwrap_or("error").to_string()
        };

        let body = serde_json::json!({ "error": { "code": status.as_u16(), "message": message } });
        let mut response = Response::new(Bytes::from(body.to_string()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

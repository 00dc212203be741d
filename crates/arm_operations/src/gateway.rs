// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::try_join_all;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use specflight::ProviderKey;
use tokio::time::Instant;
use tracing::{Level, event};

use crate::{ArmRepository, GatewayConfig, GatewayError, Operations, Principal, ProviderAggregator, SpecLoader};

const JSON: &str = "application/json; charset=utf-8";

/// A call to relay to the management API, as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationInfo {
    /// HTTP method, such as `GET`.
    pub http_method: String,
    /// Absolute URL. A `#` is escaped before the call is sent.
    pub url: String,
    /// Appended as `api-version` unless the URL already carries one.
    pub api_version: String,
    /// Appended to the URL verbatim, including its leading `&`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    /// Sent as the JSON request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
}

impl OperationInfo {
    /// Creates a call without a body or extra query string.
    pub fn new(http_method: impl Into<String>, url: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            http_method: http_method.into(),
            url: url.into(),
            api_version: api_version.into(),
            query_string: None,
            request_body: None,
        }
    }

    /// Sets the extra query string.
    #[must_use]
    pub fn with_query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    /// Sets the JSON request body.
    #[must_use]
    pub fn with_request_body(mut self, body: Value) -> Self {
        self.request_body = Some(body);
        self
    }

    /// The URL the call is sent to.
    ///
    /// `#` becomes `%23`, `api-version` is added when the URL has no such query
    /// parameter, and the extra query string is appended last.
    #[must_use]
    pub fn relay_url(&self) -> String {
        let mut url = self.url.replace('#', "%23");

        if !has_api_version(&url) {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str("api-version=");
            url.push_str(&self.api_version);
        }

        if let Some(query) = &self.query_string {
            url.push_str(query);
        }

        url
    }

    /// Builds the request to relay upstream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the method or the resulting
    /// URL is not valid HTTP.
    pub fn relay_request(&self) -> Result<Request<Bytes>, GatewayError> {
        let method = Method::from_bytes(self.http_method.as_bytes())
            .map_err(|_| GatewayError::InvalidRequest(format!("unsupported HTTP method `{}`", self.http_method)))?;
        let url = self.relay_url();
        let uri: Uri = url
            .parse()
            .map_err(|error| GatewayError::InvalidRequest(format!("invalid URL `{url}`: {error}")))?;

        let mut builder = Request::builder().method(method).uri(uri);
        let body = match &self.request_body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, JSON);
                Bytes::from(body.to_string())
            }
            None => Bytes::new(),
        };

        builder
            .body(body)
            .map_err(|error| GatewayError::InvalidRequest(error.to_string()))
    }
}

fn has_api_version(url: &str) -> bool {
    url.split_once('?').is_some_and(|(_, query)| {
        query
            .split('&')
            .any(|pair| pair.split('=').next().is_some_and(|name| name.eq_ignore_ascii_case("api-version")))
    })
}

/// Translates client requests into provider discovery, metadata aggregation and
/// relayed management calls.
///
/// The gateway produces [`http`] responses; binding it to a server and
/// authenticating callers is left to the host application.
#[derive(Debug)]
pub struct RequestGateway<R, L> {
    repository: Arc<R>,
    aggregator: ProviderAggregator<L>,
    elapsed_header: HeaderName,
    always_included_provider: ProviderKey,
}

impl<R: ArmRepository, L: SpecLoader> RequestGateway<R, L> {
    /// Creates a gateway.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the configured elapsed header is not
    /// a valid header name.
    pub fn new(config: &GatewayConfig, repository: Arc<R>, aggregator: ProviderAggregator<L>) -> Result<Self, GatewayError> {
        let elapsed_header = HeaderName::from_bytes(config.elapsed_header().as_bytes())
            .map_err(|_| GatewayError::Config(format!("`{}` is not a valid header name", config.elapsed_header())))?;

        Ok(Self {
            repository,
            aggregator,
            elapsed_header,
            always_included_provider: ProviderKey::from(config.always_included_provider()),
        })
    }

    /// The aggregator serving metadata requests.
    #[must_use]
    pub fn aggregator(&self) -> &ProviderAggregator<L> {
        &self.aggregator
    }

    /// Lists every provider registered in any subscription of `principal`.
    ///
    /// Names are deduplicated ignoring case, keeping the first spelling seen,
    /// and the always-included provider is added. The response is a JSON array
    /// sorted case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Discovery`] if any listing fails.
    pub async fn all_providers(&self, principal: &Principal) -> Result<Response<Bytes>, GatewayError> {
        let subscriptions = self
            .repository
            .subscription_ids(principal)
            .await
            .map_err(GatewayError::Discovery)?;

        let listings = try_join_all(
            subscriptions
                .iter()
                .map(|subscription| self.repository.provider_names_for(principal, subscription)),
        )
        .await
        .map_err(GatewayError::Discovery)?;

        let mut providers: HashSet<ProviderKey> = listings.into_iter().flatten().map(ProviderKey::from).collect();
        providers.insert(self.always_included_provider.clone());

        let mut providers: Vec<_> = providers.into_iter().collect();
        providers.sort_by_cached_key(ProviderKey::normalized);

        event!(
            Level::DEBUG,
            principal = principal.name(),
            subscriptions = subscriptions.len(),
            providers = providers.len(),
            "listed providers"
        );

        let names: Vec<&str> = providers.iter().map(ProviderKey::as_str).collect();
        json_response(StatusCode::OK, &names)
    }

    /// Returns the raw provider listing of one subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Discovery`] if the listing fails.
    pub async fn providers_for(&self, principal: &Principal, subscription_id: &str) -> Result<Response<Bytes>, GatewayError> {
        let providers = self
            .repository
            .providers_for(principal, subscription_id)
            .await
            .map_err(GatewayError::Discovery)?;

        json_response(StatusCode::OK, &providers)
    }

    /// Aggregates the metadata of `providers` and measures how long it took.
    pub async fn fetch_operations<S: AsRef<str> + Sync>(&self, providers: &[S]) -> (Operations, Duration) {
        let started = Instant::now();
        let operations = self.aggregator.aggregate(Some(providers)).await;
        (operations, started.elapsed())
    }

    /// Serves a metadata request.
    ///
    /// Without a provider list the response is `204 No Content`. Otherwise it
    /// is `200` with the baseline and the providers' operations as a JSON
    /// array, plus the elapsed-time header.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if the operations cannot be
    /// serialized.
    pub async fn operations_response<S: AsRef<str> + Sync>(&self, providers: Option<&[S]>) -> Result<Response<Bytes>, GatewayError> {
        let Some(providers) = providers else {
            return Ok(empty_response(StatusCode::NO_CONTENT));
        };

        let (operations, elapsed) = self.fetch_operations(providers).await;
        event!(
            Level::INFO,
            providers = providers.len(),
            operations = operations.len(),
            elapsed_ms = elapsed.as_millis(),
            "served operation metadata"
        );

        let mut response = json_response(StatusCode::OK, &operations)?;
        if let Ok(value) = HeaderValue::try_from(format!("{}ms", elapsed.as_millis())) {
            response.headers_mut().insert(self.elapsed_header.clone(), value);
        }
        Ok(response)
    }

    /// Relays `operation` to the management API and returns the upstream
    /// response verbatim, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the operation is not a valid
    /// request, or [`GatewayError::Upstream`] if no response was received.
    pub async fn invoke(&self, principal: &Principal, operation: &OperationInfo) -> Result<Response<Bytes>, GatewayError> {
        let request = operation.relay_request()?;
        event!(
            Level::DEBUG,
            principal = principal.name(),
            method = %request.method(),
            uri = %request.uri(),
            "relaying operation"
        );

        let response = self
            .repository
            .invoke(principal, request)
            .await
            .map_err(|error| {
                event!(Level::WARN, principal = principal.name(), error = %error, "relay failed");
                GatewayError::Upstream(error)
            })?;

        event!(Level::DEBUG, status = response.status().as_u16(), "relayed operation");
        Ok(response)
    }
}

fn empty_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

fn json_response(status: StatusCode, body: &impl Serialize) -> Result<Response<Bytes>, GatewayError> {
    let mut response = empty_response(status);
    *response.body_mut() = Bytes::from(serde_json::to_vec(body)?);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::MetadataObject;
    use crate::testing::{MockArmRepository, MockSpecLoader};

    static_assertions::assert_impl_all!(RequestGateway<MockArmRepository, MockSpecLoader>: Send, Sync, std::fmt::Debug);
    static_assertions::assert_impl_all!(OperationInfo: Send, Sync, Clone);

    fn gateway(repository: MockArmRepository, loader: MockSpecLoader) -> RequestGateway<MockArmRepository, MockSpecLoader> {
        let aggregator = ProviderAggregator::new(
            Arc::new(loader),
            vec![MetadataObject::new("Subscriptions.List", "GET", "/subscriptions", "2022-12-01")],
        );
        RequestGateway::new(&GatewayConfig::default(), Arc::new(repository), aggregator).unwrap()
    }

    fn principal() -> Principal {
        Principal::new("alice", "Bearer token")
    }

    fn json_body(response: &Response<Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn relay_url_escapes_and_appends_api_version() {
        let info = OperationInfo::new("GET", "https://management.azure.com/subscriptions/1/resourceGroups/a#b", "2021-04-01");
        assert_eq!(
            info.relay_url(),
            "https://management.azure.com/subscriptions/1/resourceGroups/a%23b?api-version=2021-04-01"
        );
    }

    #[test]
    fn relay_url_keeps_existing_api_version() {
        let info = OperationInfo::new("GET", "https://management.azure.com/x?API-Version=2020-01-01", "2021-04-01")
            .with_query_string("&$top=5");
        assert_eq!(info.relay_url(), "https://management.azure.com/x?API-Version=2020-01-01&$top=5");
    }

    #[test]
    fn relay_url_joins_other_query_parameters() {
        let info = OperationInfo::new("GET", "https://management.azure.com/x?$filter=a", "2021-04-01");
        assert_eq!(info.relay_url(), "https://management.azure.com/x?$filter=a&api-version=2021-04-01");
    }

    #[test]
    fn relay_request_attaches_json_body() {
        let request = OperationInfo::new("PUT", "https://management.azure.com/rg", "1")
            .with_request_body(json!({ "location": "westus" }))
            .relay_request()
            .unwrap();

        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.uri(), "https://management.azure.com/rg?api-version=1");
        assert_eq!(request.headers()[CONTENT_TYPE], JSON);
        assert_eq!(request.body(), &Bytes::from(r#"{"location":"westus"}"#));
    }

    #[test]
    fn relay_request_rejects_bad_method() {
        let error = OperationInfo::new("G T", "https://management.azure.com/", "1")
            .relay_request()
            .unwrap_err();
        assert!(matches!(error, GatewayError::InvalidRequest(_)), "{error:?}");
    }

    #[test]
    fn operation_info_uses_pascal_case() {
        let info: OperationInfo = serde_json::from_value(json!({
            "HttpMethod": "POST",
            "Url": "https://management.azure.com/x",
            "ApiVersion": "1",
            "QueryString": "&a=b",
        }))
        .unwrap();

        assert_eq!(info, OperationInfo::new("POST", "https://management.azure.com/x", "1").with_query_string("&a=b"));
    }

    #[test]
    fn invalid_elapsed_header_is_rejected() {
        let aggregator = ProviderAggregator::new(Arc::new(MockSpecLoader::new()), Vec::new());
        let config = GatewayConfig::default().with_elapsed_header("not a header");

        let error = RequestGateway::new(&config, Arc::new(MockArmRepository::new()), aggregator).unwrap_err();
        assert!(matches!(error, GatewayError::Config(_)), "{error:?}");
    }

    #[tokio::test]
    async fn all_providers_unions_ignoring_case() {
        let repository = MockArmRepository::new();
        repository.add_subscription("sub-1", ["Microsoft.Compute", "Microsoft.Web"]);
        repository.add_subscription("sub-2", ["MICROSOFT.COMPUTE", "Microsoft.Storage"]);
        let gateway = gateway(repository, MockSpecLoader::new());

        let response = gateway.all_providers(&principal()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(&response),
            json!(["Microsoft.Compute", "MICROSOFT.RESOURCES", "Microsoft.Storage", "Microsoft.Web"])
        );
    }

    #[tokio::test]
    async fn all_providers_without_subscriptions_lists_resources() {
        let gateway = gateway(MockArmRepository::new(), MockSpecLoader::new());

        let response = gateway.all_providers(&principal()).await.unwrap();
        assert_eq!(json_body(&response), json!(["MICROSOFT.RESOURCES"]));
    }

    #[tokio::test]
    async fn all_providers_reports_discovery_failure() {
        let repository = MockArmRepository::new();
        repository.fail_discovery("subscriptions unavailable");
        let gateway = gateway(repository, MockSpecLoader::new());

        let error = gateway.all_providers(&principal()).await.unwrap_err();
        assert!(matches!(error, GatewayError::Discovery(_)), "{error:?}");
        assert_eq!(error.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn providers_for_returns_listing() {
        let repository = MockArmRepository::new();
        repository.add_subscription("sub-1", ["Microsoft.Web"]);
        let gateway = gateway(repository, MockSpecLoader::new());

        let response = gateway.providers_for(&principal(), "sub-1").await.unwrap();
        assert_eq!(json_body(&response), json!([{ "namespace": "Microsoft.Web" }]));
    }

    #[tokio::test]
    async fn missing_provider_list_is_no_content() {
        let gateway = gateway(MockArmRepository::new(), MockSpecLoader::new());

        let response = gateway.operations_response::<String>(None).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
        assert!(response.headers().get("x-ms-ellapsed").is_none());
    }

    #[tokio::test]
    async fn operations_response_carries_elapsed_header() {
        let loader = MockSpecLoader::new();
        loader.respond("Microsoft.Web", vec![MetadataObject::new("Sites.List", "GET", "/sites", "2023-12-01")]);
        let gateway = gateway(MockArmRepository::new(), loader);

        let response = gateway.operations_response(Some(&["Microsoft.Web"])).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], JSON);
        let elapsed = response.headers()["x-ms-ellapsed"].to_str().unwrap();
        assert!(elapsed.ends_with("ms"), "{elapsed}");
        assert!(elapsed.trim_end_matches("ms").parse::<u128>().is_ok(), "{elapsed}");

        let names: Vec<_> = json_body(&response)
            .as_array()
            .unwrap()
            .iter()
            .map(|op| op["MethodName"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["Subscriptions.List", "Sites.List"]);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_header_covers_the_aggregation() {
        let loader = MockSpecLoader::new().with_delay(Duration::from_millis(50));
        loader.respond("Microsoft.Sql", vec![MetadataObject::new("Servers.List", "GET", "/servers", "2023-08-01")]);
        let gateway = gateway(MockArmRepository::new(), loader);

        let response = gateway.operations_response(Some(&["Microsoft.Sql"])).await.unwrap();

        let elapsed: u128 = response.headers()["x-ms-ellapsed"]
            .to_str()
            .unwrap()
            .trim_end_matches("ms")
            .parse()
            .unwrap();
        assert!(elapsed >= 50, "{elapsed}ms");

        // Cached now, so the second request does not wait for the loader.
        let (_, elapsed) = gateway.fetch_operations(&["Microsoft.Sql"]).await;
        assert!(elapsed < Duration::from_millis(50), "{elapsed:?}");
    }

    #[tokio::test]
    async fn empty_provider_list_is_baseline() {
        let gateway = gateway(MockArmRepository::new(), MockSpecLoader::new());

        let (operations, _) = gateway.fetch_operations::<String>(&[]).await;
        assert_eq!(operations.len(), 1);
    }

    #[tokio::test]
    async fn invoke_relays_verbatim() {
        let repository = MockArmRepository::new();
        repository.reply(StatusCode::CONFLICT, r#"{"error":"busy"}"#);
        let gateway = gateway(repository, MockSpecLoader::new());
        let info = OperationInfo::new("DELETE", "https://management.azure.com/rg/a#1", "2021-04-01");

        let response = gateway.invoke(&principal(), &info).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.body(), &Bytes::from(r#"{"error":"busy"}"#));

        let sent = gateway.repository.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method(), Method::DELETE);
        assert_eq!(sent[0].uri(), "https://management.azure.com/rg/a%231?api-version=2021-04-01");
    }

    #[tokio::test]
    async fn invoke_surfaces_transport_failure() {
        let repository = MockArmRepository::new();
        repository.fail_invoke("connection reset");
        let gateway = gateway(repository, MockSpecLoader::new());

        let error = gateway
            .invoke(&principal(), &OperationInfo::new("GET", "https://management.azure.com/x", "1"))
            .await
            .unwrap_err();

        assert!(matches!(error, GatewayError::Upstream(ref e) if e.operation() == "invoke"), "{error:?}");
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Deserialize;

use crate::{MetadataObject, specless_operations};

const PUBLIC_CLOUD_ENDPOINT: &str = "https://management.azure.com";

/// Settings of a [`RequestGateway`](crate::RequestGateway).
///
/// Every field has a default, so host applications can deserialize a partial
/// document:
///
/// ```
/// use arm_operations::GatewayConfig;
///
/// let config: GatewayConfig = serde_json::from_str(r#"{ "elapsed-header": "x-elapsed" }"#).unwrap();
///
/// assert_eq!(config.elapsed_header(), "x-elapsed");
/// assert_eq!(config.management_endpoint(), "https://management.azure.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct GatewayConfig {
    management_endpoint: String,
    elapsed_header: String,
    always_included_provider: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            management_endpoint: PUBLIC_CLOUD_ENDPOINT.to_string(),
            elapsed_header: "x-ms-ellapsed".to_string(),
            always_included_provider: "MICROSOFT.RESOURCES".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Defaults, with the management endpoint of the cloud that serves `host`.
    ///
    /// Hosts in a national cloud get that cloud's endpoint; anything else gets
    /// the public cloud.
    #[must_use]
    pub fn for_host(host: &str) -> Self {
        Self::default().with_management_endpoint(management_endpoint_for(host))
    }

    /// Sets the root URL of the management API.
    #[must_use]
    pub fn with_management_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.management_endpoint = endpoint.into();
        self
    }

    /// Sets the name of the response header carrying the aggregation time.
    #[must_use]
    pub fn with_elapsed_header(mut self, name: impl Into<String>) -> Self {
        self.elapsed_header = name.into();
        self
    }

    /// Sets the provider that is listed for every principal.
    #[must_use]
    pub fn with_always_included_provider(mut self, name: impl Into<String>) -> Self {
        self.always_included_provider = name.into();
        self
    }

    /// Root URL of the management API.
    #[must_use]
    pub fn management_endpoint(&self) -> &str {
        &self.management_endpoint
    }

    /// Name of the response header carrying the aggregation time.
    #[must_use]
    pub fn elapsed_header(&self) -> &str {
        &self.elapsed_header
    }

    /// Provider that is listed for every principal.
    #[must_use]
    pub fn always_included_provider(&self) -> &str {
        &self.always_included_provider
    }

    /// The provider-independent operations, rooted at the management endpoint.
    #[must_use]
    pub fn baseline(&self) -> Vec<MetadataObject> {
        specless_operations(&self.management_endpoint)
    }
}

fn management_endpoint_for(host: &str) -> &'static str {
    let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();

    [
        (".chinacloudapi.cn", "https://management.chinacloudapi.cn"),
        (".azure.cn", "https://management.chinacloudapi.cn"),
        (".usgovcloudapi.net", "https://management.usgovcloudapi.net"),
        (".azure.us", "https://management.usgovcloudapi.net"),
    ]
    .into_iter()
    .find(|(suffix, _)| host.ends_with(suffix))
    .map_or(PUBLIC_CLOUD_ENDPOINT, |(_, endpoint)| endpoint)
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde_json::json;

use crate::MetadataObject;

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const RESOURCES_API_VERSION: &str = "2021-04-01";

/// Provider-independent management operations that no specification document
/// describes, rooted at `endpoint` (for example `https://management.azure.com`).
///
/// These are always part of aggregated metadata, ahead of any provider's
/// operations.
#[must_use]
pub fn specless_operations(endpoint: &str) -> Vec<MetadataObject> {
    let endpoint = endpoint.trim_end_matches('/');
    let subscription = format!("{endpoint}/subscriptions/{{subscriptionId}}");
    let resource_group = format!("{subscription}/resourceGroups/{{resourceGroupName}}");

    vec![
        MetadataObject::new("Subscriptions.List", "GET", format!("{endpoint}/subscriptions"), SUBSCRIPTIONS_API_VERSION),
        MetadataObject::new("Subscriptions.Get", "GET", subscription.clone(), SUBSCRIPTIONS_API_VERSION),
        MetadataObject::new(
            "Subscriptions.ListLocations",
            "GET",
            format!("{subscription}/locations"),
            SUBSCRIPTIONS_API_VERSION,
        ),
        MetadataObject::new("Providers.List", "GET", format!("{subscription}/providers"), RESOURCES_API_VERSION),
        MetadataObject::new(
            "Providers.Get",
            "GET",
            format!("{subscription}/providers/{{resourceProviderNamespace}}"),
            RESOURCES_API_VERSION,
        ),
        MetadataObject::new(
            "ResourceGroups.List",
            "GET",
            format!("{subscription}/resourceGroups"),
            RESOURCES_API_VERSION,
        ),
        MetadataObject::new("ResourceGroups.Get", "GET", resource_group.clone(), RESOURCES_API_VERSION),
        MetadataObject::new("ResourceGroups.CreateOrUpdate", "PUT", resource_group.clone(), RESOURCES_API_VERSION)
            .with_request_body(json!({ "location": "", "tags": {} })),
        MetadataObject::new("ResourceGroups.Delete", "DELETE", resource_group.clone(), RESOURCES_API_VERSION),
        MetadataObject::new(
            "Resources.ListByResourceGroup",
            "GET",
            format!("{resource_group}/resources"),
            RESOURCES_API_VERSION,
        ),
    ]
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::iter::FlatMap;
use std::slice;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Describes one operation of the resource-management API.
///
/// The cache treats these as opaque payloads. The field names are serialized in
/// `PascalCase`, and absent optional fields are left out of the JSON entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataObject {
    /// Operation name, such as `VirtualMachines.List`.
    pub method_name: String,
    /// HTTP method, upper-case.
    pub http_method: String,
    /// URL template, with `{placeholders}` for path parameters.
    pub url: String,
    /// API version the operation is described for.
    pub api_version: String,
    /// Example request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    /// Documentation for the request body's properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_doc: Option<Value>,
    /// Example response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    /// Documentation for the response body's properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_doc: Option<Value>,
    /// Extra query string, including the leading `&`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl MetadataObject {
    /// Creates an operation with no bodies and no extra query string.
    pub fn new(
        method_name: impl Into<String>,
        http_method: impl Into<String>,
        url: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            method_name: method_name.into(),
            http_method: http_method.into(),
            url: url.into(),
            api_version: api_version.into(),
            request_body: None,
            request_body_doc: None,
            response_body: None,
            response_body_doc: None,
            query: None,
        }
    }

    /// Sets the example request body.
    #[must_use]
    pub fn with_request_body(mut self, body: Value) -> Self {
        self.request_body = Some(body);
        self
    }

    /// Sets the example response body.
    #[must_use]
    pub fn with_response_body(mut self, body: Value) -> Self {
        self.response_body = Some(body);
        self
    }

    /// Sets the extra query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// An ordered sequence of operations assembled from shared segments.
///
/// Each provider's metadata is held once by the cache. Aggregating several
/// providers chains the shared segments rather than copying them, and
/// serializing the result produces one flat JSON array.
#[derive(Debug, Clone, Default)]
pub struct Operations {
    segments: Vec<Arc<[MetadataObject]>>,
}

impl Operations {
    pub(crate) fn with_capacity(segments: usize) -> Self {
        Self {
            segments: Vec::with_capacity(segments),
        }
    }

    pub(crate) fn push(&mut self, segment: Arc<[MetadataObject]>) {
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }

    /// Iterates the operations in order.
    pub fn iter(&self) -> Iter<'_> {
        self.into_iter()
    }

    /// Total number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.len()).sum()
    }

    /// Whether there are no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Copies the operations into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<MetadataObject> {
        self.iter().cloned().collect()
    }
}

/// Iterator over [`Operations`].
pub type Iter<'a> = FlatMap<
    slice::Iter<'a, Arc<[MetadataObject]>>,
    slice::Iter<'a, MetadataObject>,
    fn(&'a Arc<[MetadataObject]>) -> slice::Iter<'a, MetadataObject>,
>;

impl<'a> IntoIterator for &'a Operations {
    type Item = &'a MetadataObject;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        fn segment_iter(segment: &Arc<[MetadataObject]>) -> slice::Iter<'_, MetadataObject> {
            segment.iter()
        }

        self.segments
            .iter()
            .flat_map(segment_iter as fn(&'a Arc<[MetadataObject]>) -> slice::Iter<'a, MetadataObject>)
    }
}

impl Serialize for Operations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_pascal_case_and_skips_absent_fields() {
        let op = MetadataObject::new(
            "VirtualMachines.List",
            "GET",
            "https://management.azure.com/subscriptions/{subscriptionId}/providers/Microsoft.Compute/virtualMachines",
            "2024-07-01",
        );

        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({
                "MethodName": "VirtualMachines.List",
                "HttpMethod": "GET",
                "Url": "https://management.azure.com/subscriptions/{subscriptionId}/providers/Microsoft.Compute/virtualMachines",
                "ApiVersion": "2024-07-01",
            })
        );
    }

    #[test]
    fn deserializes_with_optional_fields() {
        let op: MetadataObject = serde_json::from_value(json!({
            "MethodName": "Sites.CreateOrUpdate",
            "HttpMethod": "PUT",
            "Url": "https://management.azure.com/sites/{name}",
            "ApiVersion": "2023-12-01",
            "RequestBody": { "location": "" },
            "Query": "&$expand=properties",
        }))
        .unwrap();

        assert_eq!(
            op,
            MetadataObject::new("Sites.CreateOrUpdate", "PUT", "https://management.azure.com/sites/{name}", "2023-12-01")
                .with_request_body(json!({ "location": "" }))
                .with_query("&$expand=properties")
        );
    }

    #[test]
    fn operations_flatten_segments_in_order() {
        let a: Arc<[MetadataObject]> = vec![MetadataObject::new("A.1", "GET", "/a/1", "1"), MetadataObject::new("A.2", "GET", "/a/2", "1")].into();
        let b: Arc<[MetadataObject]> = vec![MetadataObject::new("B.1", "GET", "/b/1", "1")].into();

        let mut ops = Operations::with_capacity(3);
        ops.push(Arc::clone(&a));
        ops.push(Vec::new().into());
        ops.push(Arc::clone(&b));

        let names: Vec<_> = ops.iter().map(|op| op.method_name.as_str()).collect();
        assert_eq!(names, ["A.1", "A.2", "B.1"]);
        assert_eq!(ops.len(), 3);
        assert!(!ops.is_empty());
        assert_eq!((&ops).into_iter().count(), 3);

        let json = serde_json::to_value(&ops).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(3));
        assert_eq!(json[2]["MethodName"], "B.1");
    }

    #[test]
    fn empty_operations_serialize_as_empty_array() {
        let ops = Operations::default();
        assert!(ops.is_empty());
        assert_eq!(serde_json::to_string(&ops).unwrap(), "[]");
        assert!(ops.to_vec().is_empty());
    }
}

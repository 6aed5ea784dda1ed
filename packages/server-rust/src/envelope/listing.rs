//! Catalog listing returned when no operation is selected.

use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use dataservice_core::Parameters;

use crate::catalog::OperationCatalog;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingEntry<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Parameters,
    operation_type: &'a str,
    assembly: &'a str,
    operation_url: String,
}

#[derive(Serialize)]
struct Listing<'a> {
    operations: Vec<ListingEntry<'a>>,
}

/// Builds the listing model: one entry per catalogued operation, in
/// registration order. `operationUrl` is `endpoint_url` with the selector
/// set to the operation name.
#[must_use]
pub fn listing_model(catalog: &OperationCatalog, endpoint_url: &str, selector: &str) -> Value {
    let operations = catalog
        .list()
        .iter()
        .map(|op| ListingEntry {
            name: &op.name,
            description: &op.description,
            parameters: &op.parameters,
            operation_type: &op.coordinates.type_name,
            assembly: &op.coordinates.module_identity,
            operation_url: format!(
                "{endpoint_url}?{}",
                form_urlencoded::Serializer::new(String::new())
                    .append_pair(selector, &op.name)
                    .finish()
            ),
        })
        .collect();

    serde_json::to_value(Listing { operations }).unwrap_or(Value::Null)
}

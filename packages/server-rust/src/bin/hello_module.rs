//! Demo operation module. Deploy it into the module directory under a name
//! matching the module pattern (e.g. `hello-module`).

use std::process::ExitCode;

use dataservice_core::operation::now_rfc3339;
use dataservice_core::{
    async_trait, run_module, ExecutionContext, ModuleDefinition, Operation, OperationFault,
    OperationOutput, Parameters,
};
use serde_json::{json, Map, Value};

const DEFAULT_PAGE_SIZE: i64 = 8;

const SAMPLE_ITEMS: [&str; 20] = [
    "Anchor", "Beacon", "Compass", "Drift", "Ember", "Fathom", "Gale", "Harbor", "Isle", "Jetty",
    "Keel", "Lantern", "Mast", "Nautilus", "Outrigger", "Pier", "Quay", "Rudder", "Sextant",
    "Tide",
];

#[derive(Default)]
struct ShowHelloWorld;

#[async_trait]
impl Operation for ShowHelloWorld {
    fn name(&self) -> &str {
        "ShowHelloWorld"
    }

    fn description(&self) -> &str {
        "Greets the caller."
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with("Name", "string, who to greet (default World)")
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<OperationOutput, OperationFault> {
        let name = ctx.params.get_non_blank("Name").unwrap_or("World");
        Ok(OperationOutput::new(json!({
            "message": format!("Hello {name}!"),
            "data": ["Hello", name],
            "timeStamp": now_rfc3339(),
        })))
    }
}

#[derive(Default)]
struct GetSampleItemsPaged;

#[async_trait]
impl Operation for GetSampleItemsPaged {
    fn name(&self) -> &str {
        "GetSampleItemsPaged"
    }

    fn description(&self) -> &str {
        "Returns one page of the sample items."
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
            .with("PageIndex", "int, zero-based page (default 0)")
            .with("PageSize", "int, items per page (default 8)")
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<OperationOutput, OperationFault> {
        let page_size = ctx
            .params
            .parse_or("PageSize", DEFAULT_PAGE_SIZE)
            .map_err(|raw| not_an_integer("PageSize", &raw))?;
        if page_size <= 0 {
            return Err(OperationFault::invalid_parameter(
                "PageSize",
                &page_size.to_string(),
                "must be greater than zero",
            ));
        }
        let requested = ctx
            .params
            .parse_or("PageIndex", 0_i64)
            .map_err(|raw| not_an_integer("PageIndex", &raw))?;

        let (page_index, items) = page(&SAMPLE_ITEMS, requested, page_size);
        Ok(OperationOutput::new(json!({ "items": items }))
            .with_extra("PageIndex", page_index)
            .with_extra("PageSize", page_size)
            .with_extra("TotalCount", SAMPLE_ITEMS.len()))
    }
}

fn not_an_integer(name: &str, raw: &str) -> OperationFault {
    OperationFault::invalid_parameter(name, raw, "must be an integer")
}

/// Returns the clamped page index and its items.
fn page<'a>(items: &[&'a str], requested: i64, page_size: i64) -> (i64, Vec<&'a str>) {
    let total = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let last_page = if total == 0 { 0 } else { (total - 1) / page_size };
    let page_index = requested.clamp(0, last_page);

    let start = usize::try_from(page_index * page_size).unwrap_or(usize::MAX);
    let size = usize::try_from(page_size).unwrap_or(usize::MAX);
    let slice = items.iter().skip(start).take(size).copied().collect();
    (page_index, slice)
}

#[derive(Default)]
struct DescribeRequest;

#[async_trait]
impl Operation for DescribeRequest {
    fn name(&self) -> &str {
        "DescribeRequest"
    }

    fn description(&self) -> &str {
        "Echoes the received parameters without the response envelope."
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<OperationOutput, OperationFault> {
        let params: Map<String, Value> = ctx
            .params
            .distinct_keys()
            .into_iter()
            .filter_map(|key| {
                let value = ctx.params.value(key)?;
                Some((key.to_string(), Value::String(value)))
            })
            .collect();
        Ok(OperationOutput::model_only(json!({
            "requestId": ctx.request_id,
            "endpointUrl": ctx.endpoint_url,
            "parameters": params,
        })))
    }
}

fn definition() -> ModuleDefinition {
    ModuleDefinition::new("hello-module", env!("CARGO_PKG_VERSION"))
        .export::<ShowHelloWorld>()
        .export::<GetSampleItemsPaged>()
        .export::<DescribeRequest>()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    run_module(&definition()).await
}

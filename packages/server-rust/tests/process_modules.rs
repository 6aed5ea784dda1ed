//! Dispatch through real child-process modules built from this package.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dataservice_core::{ExecutionContext, RequestParams};
use dataservice_server::envelope::OperationStatus;
use dataservice_server::loader::{BoundaryTracker, ProcessModuleHost};
use dataservice_server::{OperationService, ServerConfig};
use serde_json::{json, Value};
use tempfile::TempDir;

const ENDPOINT: &str = "http://localhost:8080/dataservice";

/// Deploys the demo module under `name`. A symlink avoids spawning a file
/// that another test thread may still hold open for writing.
fn deploy(dir: &Path, name: &str) -> PathBuf {
    let target = dir.join(name);
    std::os::unix::fs::symlink(env!("CARGO_BIN_EXE_hello-module"), &target).unwrap();
    target
}

async fn service(dir: &TempDir) -> OperationService {
    let config = ServerConfig {
        module_dir: dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let host = Arc::new(ProcessModuleHost::new(BoundaryTracker::default()));
    OperationService::start(config, host).await.unwrap()
}

async fn call(service: &OperationService, pairs: &[(&str, &str)]) -> (OperationStatus, Value) {
    let params: RequestParams = pairs.iter().copied().collect();
    let response = service
        .handle(ExecutionContext::new("it", params, ENDPOINT))
        .await;
    (response.status, response.body)
}

#[tokio::test]
async fn lists_deployed_operations() {
    let dir = TempDir::new().unwrap();
    deploy(dir.path(), "hello-module");
    std::fs::write(dir.path().join("README.txt"), "not a module").unwrap();
    let service = service(&dir).await;

    let (status, body) = call(&service, &[]).await;
    assert_eq!(status, OperationStatus::Succeeded);
    let names: Vec<&str> = body["operations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["ShowHelloWorld", "GetSampleItemsPaged", "DescribeRequest"]
    );
    assert_eq!(
        body["operations"][0]["operationUrl"],
        format!("{ENDPOINT}?op=ShowHelloWorld")
    );
}

#[tokio::test]
async fn hello_world_round_trip() {
    let dir = TempDir::new().unwrap();
    deploy(dir.path(), "hello-module");
    let service = service(&dir).await;

    let (status, body) = call(&service, &[("op", "showhelloworld"), ("Name", "Ferris")]).await;
    assert_eq!(status, OperationStatus::Succeeded);
    assert_eq!(body["model"]["data"], json!(["Hello", "Ferris"]));
    assert_eq!(body["serviceStatus"]["status"], "Succeeded");
    assert_eq!(service.open_boundaries(), 0);
}

#[tokio::test]
async fn paging_sets_extras_and_merges_request_extras() {
    let dir = TempDir::new().unwrap();
    deploy(dir.path(), "hello-module");
    let service = service(&dir).await;

    let (_, body) = call(
        &service,
        &[("op", "GetSampleItemsPaged"), ("PageIndex", "50"), ("_PageIndex", "x")],
    )
    .await;
    assert_eq!(body["extras"]["PageIndex"], 2);
    assert_eq!(body["extras"]["PageIndex_"], "50");
    assert_eq!(body["extras"]["PageIndex__"], "x");
    assert_eq!(body["extras"]["TotalCount"], 20);
    assert_eq!(body["model"]["items"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn fault_renders_failed_envelope() {
    let dir = TempDir::new().unwrap();
    deploy(dir.path(), "hello-module");
    let service = service(&dir).await;

    let (status, body) = call(
        &service,
        &[("op", "GetSampleItemsPaged"), ("PageSize", "-1")],
    )
    .await;
    assert_eq!(status, OperationStatus::Failed);
    assert_eq!(body["model"], Value::Null);
    let message = body["serviceStatus"]["message"].as_str().unwrap();
    assert!(message.contains("InvalidParameter"));
    assert!(message.contains(r#""value":"-1""#));
}

#[tokio::test]
async fn model_only_operation_skips_envelope() {
    let dir = TempDir::new().unwrap();
    deploy(dir.path(), "hello-module");
    let service = service(&dir).await;

    let (_, body) = call(
        &service,
        &[("op", "DescribeRequest"), ("Tag", "a"), ("tag", "b")],
    )
    .await;
    assert!(body.get("serviceStatus").is_none());
    assert_eq!(body["requestId"], "it");
    assert_eq!(body["parameters"]["Tag"], "a,b");
}

#[tokio::test]
async fn duplicate_module_copy_keeps_first_path() {
    let dir = TempDir::new().unwrap();
    let first = deploy(dir.path(), "a-hello-module");
    deploy(dir.path(), "b-hello-module");
    let service = service(&dir).await;

    let catalog = service.catalog();
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.duplicates().len(), 3);
    assert_eq!(
        catalog.lookup("ShowHelloWorld").unwrap().coordinates.path,
        first
    );
}

#[tokio::test]
async fn deleted_module_fails_then_recovers() {
    let dir = TempDir::new().unwrap();
    let path = deploy(dir.path(), "hello-module");
    let service = service(&dir).await;

    std::fs::remove_file(&path).unwrap();
    let (status, _) = call(&service, &[("op", "ShowHelloWorld")]).await;
    assert_eq!(status, OperationStatus::Failed);

    deploy(dir.path(), "hello-module");
    let (status, _) = call(&service, &[("op", "ShowHelloWorld")]).await;
    assert_eq!(status, OperationStatus::Succeeded);
    assert_eq!(service.open_boundaries(), 0);
}

#[tokio::test]
async fn concurrent_calls_release_every_boundary() {
    let dir = TempDir::new().unwrap();
    deploy(dir.path(), "hello-module");
    let service = Arc::new(service(&dir).await);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let page = i.to_string();
                let pairs = [("op", "GetSampleItemsPaged"), ("PageIndex", page.as_str())];
                call(&service, &pairs).await
            })
        })
        .collect();
    for task in tasks {
        let (status, _) = task.await.unwrap();
        assert_eq!(status, OperationStatus::Succeeded);
    }
    assert_eq!(service.open_boundaries(), 0);
}

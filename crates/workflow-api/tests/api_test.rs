//! End-to-end router tests over an in-memory store: submit a workflow,
//! start a run, and observe it reach a terminal status through the
//! public routes only.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use workflow_engine::{ActionRegistry, RunExecutor, SimulatedTaskRunner};
use workflow_storage::memory::InMemoryStore;
use workflow_storage::WorkflowStore;

fn test_app() -> (axum::Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let store_dyn: Arc<dyn WorkflowStore> = store.clone();
    let run_executor = Arc::new(RunExecutor::new(
        store_dyn.clone(),
        Arc::new(SimulatedTaskRunner),
        Arc::new(ActionRegistry::new()),
    ));
    (workflow_api::build_app(store_dyn, run_executor), store)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (app, _store) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_workflow_then_list_it() {
    let (app, _store) = test_app();

    let definition = json!({
        "name": "demo",
        "steps": [
            {"id": "a", "type": "task", "config": {"action": "", "duration_seconds": 0.0, "fail_probability": 0.0, "max_retries": 0}, "depends_on": []}
        ]
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/workflows")
                .header("content-type", "application/json")
                .body(Body::from(definition.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert!(created["id"].is_string());

    let response = app
        .oneshot(Request::builder().uri("/workflows").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["name"], "demo");
    assert!(data[0].get("definition").is_none());
}

#[tokio::test]
async fn rejects_a_cyclic_definition() {
    let (app, _store) = test_app();

    let definition = json!({
        "name": "bad",
        "steps": [
            {"id": "a", "type": "task", "config": {"action": "", "duration_seconds": 0.0, "fail_probability": 0.0, "max_retries": 0}, "depends_on": ["b"]},
            {"id": "b", "type": "task", "config": {"action": "", "duration_seconds": 0.0, "fail_probability": 0.0, "max_retries": 0}, "depends_on": ["a"]}
        ]
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/workflows")
                .header("content-type", "application/json")
                .body(Body::from(definition.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn starting_a_run_completes_it_in_the_background() {
    let (app, store) = test_app();

    let definition = json!({
        "name": "demo",
        "steps": [
            {"id": "a", "type": "task", "config": {"action": "", "duration_seconds": 0.0, "fail_probability": 0.0, "max_retries": 0}, "depends_on": []}
        ]
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/workflows")
                .header("content-type", "application/json")
                .body(Body::from(definition.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let created = body_json(response).await;
    let workflow_id = created["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/workflows/{workflow_id}/runs"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let created_run = body_json(response).await;
    let run_id: uuid::Uuid = created_run["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(created_run["status"], "pending");
    assert!(created_run["steps"].as_array().unwrap().len() == 1);

    for _ in 0..50 {
        if store.get_run(run_id).await.unwrap().status
            == workflow_model::RunStatus::Completed
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        store.get_run(run_id).await.unwrap().status,
        workflow_model::RunStatus::Completed
    );
}

//! Job lifecycle against a mock REST server

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::{json, Value};
use wiremock::matchers::{any, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use veeam_common::{Error, JobId, JobType, Operation, ResourceSpec};
use veeam_provider::client::{Credential, ExecutionContext, HttpTransport, JobGateway};
use veeam_provider::provider::VeeamProvider;
use veeam_provider::resources::{JobReconciler, ReadOutcome};
use veeam_provider::state::{job_id_from_state, DynamicValue};

fn gateway(server: &MockServer) -> JobGateway {
    let context = ExecutionContext::new(
        Url::parse(&server.uri()).unwrap(),
        Credential::new("token-123"),
        "1.2-rev0",
    );
    let transport = HttpTransport::new(Duration::from_secs(5), false).unwrap();
    JobGateway::new(Arc::new(transport), context)
}

fn nightly() -> ResourceSpec {
    let mut spec = ResourceSpec::new("nightly", JobType::Backup, "d");
    spec.virtual_machines.includes = vec![json!({"hostName": "vc01", "name": "vm-01"})];
    spec
}

fn job_body(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "type": "Backup",
        "description": "d",
        "isHighPriority": false,
        "virtualMachines": {"includes": [{"hostName": "vc01", "name": "vm-01"}]},
        "schedule": {"runAutomatically": false}
    })
}

#[tokio::test]
async fn create_then_read_returns_server_state() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/jobs"))
        .and(header("x-api-version", "1.2-rev0"))
        .and(header("authorization", "Bearer token-123"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "name": "nightly",
            "type": "Backup",
            "description": "d",
            "isHighPriority": false
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "job-42", "name": "nightly"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/job-42"))
        .and(header("x-api-version", "1.2-rev0"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-42", "nightly")))
        .mount(&server)
        .await;

    let mut reconciler = JobReconciler::new(gateway(&server));
    let remote = reconciler.create(&nightly()).await.unwrap();
    assert_eq!(remote.id.as_str(), "job-42");
    assert_eq!(remote.name, "nightly");

    let first = reconciler.read().await.unwrap().present().unwrap();
    let second = reconciler.read().await.unwrap().present().unwrap();
    assert_eq!(first.id, remote.id);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[tokio::test]
async fn create_without_id_in_response_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/jobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "nightly"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut reconciler = JobReconciler::new(gateway(&server));
    let err = reconciler.create(&nightly()).await.unwrap_err();
    assert!(matches!(err, Error::Protocol { op: Operation::Create, .. }));
    assert!(reconciler.id().is_none());
}

#[tokio::test]
async fn invalid_type_never_reaches_the_server() {
    let server = MockServer::start().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let provider = VeeamProvider::new(gateway(&server));
    let planned: DynamicValue = serde_json::from_value(json!({
        "name": "nightly",
        "type": "NotAJobType",
        "description": "d",
        "virtual_machines": {"includes": []}
    }))
    .unwrap();

    let response = provider.apply_resource_change(None, Some(&planned)).await;
    assert!(response.has_errors());
    assert!(response.diagnostics[0].detail.contains("Invalid job configuration"));
}

#[tokio::test]
async fn update_embeds_id_and_refreshes() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/jobs/job-42"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({"id": "job-42", "name": "nightly-v2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-42"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-42", "nightly-v2")))
        .expect(1)
        .mount(&server)
        .await;

    let mut reconciler = JobReconciler::with_id(gateway(&server), JobId::new("job-42").unwrap());
    let mut spec = nightly();
    spec.name = "nightly-v2".to_string();

    let remote = reconciler.update(&spec).await.unwrap();
    assert_eq!(remote.name, "nightly-v2");
    assert_eq!(reconciler.id().unwrap().as_str(), "job-42");
}

#[tokio::test]
async fn read_of_deleted_job_is_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(404).set_body_string("job not found"))
        .mount(&server)
        .await;

    let reconciler = JobReconciler::with_id(gateway(&server), JobId::new("job-42").unwrap());
    assert_eq!(reconciler.read().await.unwrap(), ReadOutcome::Absent);
    assert_eq!(reconciler.id().unwrap().as_str(), "job-42");
}

#[tokio::test]
async fn remote_drift_is_reported_not_reverted() {
    let server = MockServer::start().await;

    let mut drifted = job_body("job-42", "renamed-in-console");
    drifted["isHighPriority"] = json!(true);
    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(drifted))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let reconciler = JobReconciler::with_id(gateway(&server), JobId::new("job-42").unwrap());
    let remote = reconciler.read().await.unwrap().present().unwrap();
    assert_eq!(remote.name, "renamed-in-console");
    assert!(remote.is_high_priority);
}

#[tokio::test]
async fn delete_success_clears_id() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/jobs/job-42"))
        .and(header("x-api-version", "1.2-rev0"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut reconciler = JobReconciler::with_id(gateway(&server), JobId::new("job-42").unwrap());
    reconciler.delete().await.unwrap();
    assert!(reconciler.id().is_none());
}

#[tokio::test]
async fn delete_not_found_is_protocol_error_and_keeps_id() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut reconciler = JobReconciler::with_id(gateway(&server), JobId::new("job-42").unwrap());
    let err = reconciler.delete().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol { op: Operation::Delete, status: Some(404), .. }
    ));
    assert_eq!(err.job_id(), Some("job-42"));
    assert_eq!(reconciler.id().unwrap().as_str(), "job-42");
}

#[tokio::test]
async fn read_with_non_json_body_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>session expired</html>"))
        .mount(&server)
        .await;

    let reconciler = JobReconciler::with_id(gateway(&server), JobId::new("job-42").unwrap());
    let err = reconciler.read().await.unwrap_err();
    assert!(matches!(err, Error::Protocol { op: Operation::Read, status: Some(200), .. }));
    assert!(err.to_string().contains("invalid JSON"));
    assert_eq!(reconciler.id().unwrap().as_str(), "job-42");
}

#[tokio::test]
async fn read_without_id_in_body_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "nightly"})))
        .mount(&server)
        .await;

    let reconciler = JobReconciler::with_id(gateway(&server), JobId::new("job-42").unwrap());
    let err = reconciler.read().await.unwrap_err();
    assert!(matches!(err, Error::Protocol { op: Operation::Read, status: Some(200), .. }));
    assert_eq!(reconciler.id().unwrap().as_str(), "job-42");
}

#[tokio::test]
async fn conflicts_on_update_and_delete_keep_id() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(409).set_body_string("job is running"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(409).set_body_string("job is running"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut reconciler = JobReconciler::with_id(gateway(&server), JobId::new("job-42").unwrap());

    let err = reconciler.update(&nightly()).await.unwrap_err();
    assert!(matches!(err, Error::Protocol { op: Operation::Update, status: Some(409), .. }));
    assert_eq!(err.job_id(), Some("job-42"));

    let err = reconciler.delete().await.unwrap_err();
    assert!(matches!(err, Error::Protocol { op: Operation::Delete, status: Some(409), .. }));
    assert_eq!(reconciler.id().unwrap().as_str(), "job-42");
}

#[tokio::test]
async fn update_with_failed_read_back_keeps_prior_state() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/job-42"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = VeeamProvider::new(gateway(&server));
    let prior: DynamicValue = serde_json::from_value(json!({
        "id": "job-42",
        "name": "nightly",
        "type": "Backup",
        "description": "d",
        "virtual_machines": {"includes": [{"hostName": "vc01", "name": "vm-01"}]}
    }))
    .unwrap();
    let planned: DynamicValue = serde_json::from_value(json!({
        "name": "nightly-v2",
        "type": "Backup",
        "description": "d",
        "virtual_machines": {"includes": [{"hostName": "vc01", "name": "vm-01"}]}
    }))
    .unwrap();

    let response = provider.apply_resource_change(Some(&prior), Some(&planned)).await;
    assert!(response.has_errors());
    assert!(response.diagnostics[0].detail.contains("500"));
    assert_eq!(response.new_state, Some(prior));
}

#[tokio::test]
async fn provider_full_lifecycle() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/jobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "job-7"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/job-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-7", "nightly")))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/jobs/job-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let provider = VeeamProvider::new(gateway(&server));
    let desired: DynamicValue = serde_json::from_value(json!({
        "name": "nightly",
        "type": "Backup",
        "description": "d",
        "virtual_machines": {"includes": [{"hostName": "vc01", "name": "vm-01"}]}
    }))
    .unwrap();

    let created = provider.apply_resource_change(None, Some(&desired)).await;
    assert!(!created.has_errors(), "{:?}", created.diagnostics);
    let state = created.new_state.unwrap();
    assert_eq!(job_id_from_state(&state).unwrap().as_str(), "job-7");

    let refreshed = provider.read_resource(&state).await;
    assert_eq!(refreshed.new_state.as_ref(), Some(&state));

    let deleted = provider.apply_resource_change(Some(&state), None).await;
    assert!(!deleted.has_errors());
    assert!(deleted.new_state.is_none());
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let context = ExecutionContext::new(
        Url::parse(&format!("http://{}", addr)).unwrap(),
        Credential::new("token-123"),
        "1.2-rev0",
    );
    let transport = HttpTransport::new(Duration::from_secs(5), false).unwrap();
    let gateway = JobGateway::new(Arc::new(transport), context);

    let reconciler = JobReconciler::with_id(gateway, JobId::new("job-42").unwrap());
    let err = reconciler.read().await.unwrap_err();
    assert!(matches!(err, Error::Transport { op: Operation::Read, .. }));
    assert_eq!(reconciler.id().unwrap().as_str(), "job-42");
}

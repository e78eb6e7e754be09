//! ArmClient against a mock management endpoint

use driftwood_arm::{ArmClient, ArmConfig, ArmError};
use driftwood_core::{
    Lookup, ManagementClient, OnConflict, OperationHandle, OperationStatus, PollConfig,
    ProviderScope, ReconcileError, Reconciler, Submission,
};
use driftwood_resources::{ResourceGroup, ResourceGroupConfig};
use serde_json::json;
use serial_test::serial;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RG_PATH: &str = "/subscriptions/sub-1/resourceGroups/rg-1";
const API_VERSION: &str = "2020-06-01";
const TOKEN: &str = "test-token";

fn client(server: &MockServer) -> ArmClient {
    ArmClient::new(ArmConfig::new(server.uri(), TOKEN)).unwrap()
}

#[tokio::test]
async fn test_get_sends_api_version_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .and(query_param("api-version", API_VERSION))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "rg-1", "location": "westeurope"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let found = client(&server).get(RG_PATH, API_VERSION).await.unwrap();
    assert_eq!(found, Lookup::Found(json!({"name": "rg-1", "location": "westeurope"})));
}

#[tokio::test]
async fn test_get_not_found_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "ResourceGroupNotFound", "message": "Resource group 'rg-1' could not be found."}
        })))
        .mount(&server)
        .await;

    assert_eq!(client(&server).get(RG_PATH, API_VERSION).await.unwrap(), Lookup::NotFound);
}

#[tokio::test]
async fn test_error_body_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": "AuthorizationFailed", "message": "The client does not have authorization"}
        })))
        .mount(&server)
        .await;

    let err = client(&server).get(RG_PATH, API_VERSION).await.unwrap_err();
    assert_eq!(err.status, 403);
    assert_eq!(err.code, "AuthorizationFailed");
    assert_eq!(err.message, "The client does not have authorization");
}

#[tokio::test]
async fn test_put_accepted_with_async_operation() {
    let server = MockServer::start().await;
    let operation = format!("{}/providers/Microsoft.Resources/operations/op-1", server.uri());
    Mock::given(method("PUT"))
        .and(path(RG_PATH))
        .and(body_partial_json(json!({"location": "westeurope"})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Azure-AsyncOperation", operation.as_str())
                .insert_header("Retry-After", "7")
                .set_body_json(json!({"properties": {"provisioningState": "Accepted"}})),
        )
        .mount(&server)
        .await;

    let submission = client(&server)
        .put(RG_PATH, API_VERSION, &json!({"location": "westeurope"}))
        .await
        .unwrap();

    match submission {
        Submission::Accepted(handle) => {
            assert_eq!(handle.status_url(), operation);
            assert_eq!(handle.retry_after(), Some(Duration::from_secs(7)));
        }
        other => panic!("unexpected submission: {other:?}"),
    }
}

#[tokio::test]
async fn test_put_completed_synchronously() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"location": "westeurope"})))
        .mount(&server)
        .await;

    let submission = client(&server)
        .put(RG_PATH, API_VERSION, &json!({"location": "westeurope"}))
        .await
        .unwrap();
    assert_eq!(submission, Submission::Done(Some(json!({"location": "westeurope"}))));
}

#[tokio::test]
async fn test_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.delete(RG_PATH, API_VERSION).await.unwrap(), Submission::Done(None));
    assert_eq!(client.delete(RG_PATH, API_VERSION).await.unwrap(), Submission::NotFound);
}

#[tokio::test]
async fn test_operation_status_documents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/operations/running"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Retry-After", "3")
                .set_body_json(json!({"status": "InProgress"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/failed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Failed",
            "error": {"code": "Conflict", "message": "Operation 'write' is not allowed on a resource group being deleted"}
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let running = OperationHandle::new("running", format!("{}/operations/running", server.uri()));
    assert_eq!(
        client.operation_status(&running).await.unwrap(),
        OperationStatus::InProgress {
            retry_after: Some(Duration::from_secs(3))
        }
    );

    let failed = OperationHandle::new("failed", format!("{}/operations/failed", server.uri()));
    assert_eq!(
        client.operation_status(&failed).await.unwrap(),
        OperationStatus::Failed {
            code: "Conflict".to_string(),
            message: "Operation 'write' is not allowed on a resource group being deleted".to_string(),
        }
    );
}

#[tokio::test]
async fn test_create_resource_group_end_to_end() {
    let server = MockServer::start().await;
    let operation = format!("{}/operations/create-rg", server.uri());

    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": RG_PATH,
            "name": "rg-1",
            "location": "westeurope",
            "tags": {"env": "prod"},
            "properties": {"provisioningState": "Succeeded"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(RG_PATH))
        .and(query_param("api-version", API_VERSION))
        .and(body_partial_json(json!({"location": "westeurope", "tags": {"env": "prod"}})))
        .respond_with(ResponseTemplate::new(201).insert_header("Azure-AsyncOperation", operation.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/create-rg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/create-rg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;

    let rec = Reconciler::new(Arc::new(client(&server)), ProviderScope::new("sub-1"))
        .with_poll_config(PollConfig::fixed(Duration::from_millis(10)));
    let config = ResourceGroupConfig {
        name: "rg-1".to_string(),
        location: "West Europe".to_string(),
        tags: BTreeMap::from([("env".to_string(), "prod".to_string())]),
    };

    let created = rec
        .standalone::<ResourceGroup>()
        .create(&config, OnConflict::Fail)
        .await
        .unwrap();
    assert_eq!(created.attributes.location, "westeurope");
    assert_eq!(created.attributes.tags["env"], "prod");
}

#[tokio::test]
async fn test_conflicting_resource_group_is_not_written() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"location": "westeurope"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let rec = Reconciler::new(Arc::new(client(&server)), ProviderScope::new("sub-1"));
    let config = ResourceGroupConfig {
        name: "rg-1".to_string(),
        location: "westeurope".to_string(),
        tags: BTreeMap::new(),
    };
    let err = rec
        .standalone::<ResourceGroup>()
        .create(&config, OnConflict::Fail)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::AlreadyExists { .. }));
}

#[test]
fn test_empty_token_is_rejected() {
    let err = ArmClient::new(ArmConfig::new("https://management.azure.com", "")).unwrap_err();
    assert!(matches!(err, ArmError::InvalidConfig(_)));
}

#[test]
#[serial]
fn test_config_from_env() {
    temp_env::with_vars(
        [
            ("DRIFTWOOD_TOKEN", Some("env-token")),
            ("DRIFTWOOD_ENDPOINT", Some("https://arm.example.test/")),
        ],
        || {
            let config = ArmConfig::from_env().unwrap();
            assert_eq!(config.token, "env-token");
            let client = ArmClient::new(config).unwrap();
            assert_eq!(client.endpoint(), "https://arm.example.test");
        },
    );

    temp_env::with_vars([("DRIFTWOOD_TOKEN", None::<&str>)], || {
        assert!(matches!(ArmConfig::from_env(), Err(ArmError::MissingEnvVar(_))));
    });
}

//! IoT Hub routes are members of the hub document

use driftwood_core::{
    ApiError, CallKind, MemoryClient, OnConflict, PollConfig, ProviderScope, ReconcileError,
    Reconciler, ResourceIdentifier,
};
use driftwood_resources::{IotHubRoute, IotHubRouteConfig, IotHubRouteId, RouteSource};
use futures_util::future::join_all;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const RG: &str = "/subscriptions/sub-1/resourceGroups/rg-1";
const HUB: &str = "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Devices/IotHubs/hub-1";

fn seeded(client: MemoryClient) -> Arc<MemoryClient> {
    client.insert(RG, json!({"location": "westeurope"}));
    client.insert(
        HUB,
        json!({
            "location": "westeurope",
            "sku": {"name": "S1", "capacity": 1},
            "properties": {
                "eventHubEndpoints": {"events": {"partitionCount": 2}},
                "routing": {
                    "endpoints": {"eventHubs": [{"name": "archive"}]},
                    "routes": [{
                        "name": "existing",
                        "source": "DeviceMessages",
                        "condition": "true",
                        "endpointNames": ["archive"],
                        "isEnabled": true
                    }]
                }
            }
        }),
    );
    Arc::new(client)
}

fn reconciler(client: Arc<MemoryClient>) -> Reconciler {
    Reconciler::new(client, ProviderScope::new("sub-1"))
        .with_poll_config(PollConfig::fixed(Duration::from_millis(10)))
}

fn route(name: &str) -> IotHubRouteConfig {
    IotHubRouteConfig {
        resource_group_name: "rg-1".to_string(),
        iothub_name: "hub-1".to_string(),
        name: name.to_string(),
        source: RouteSource::DeviceMessages,
        condition: "true".to_string(),
        endpoint_names: vec!["archive".to_string()],
        enabled: true,
    }
}

fn route_names(client: &MemoryClient) -> Vec<String> {
    let hub = client.object(HUB).unwrap();
    hub["properties"]["routing"]["routes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|route| route["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_create_appends_and_keeps_hub_fields() {
    let client = seeded(MemoryClient::new());
    let rec = reconciler(client.clone());

    let created = rec
        .member::<IotHubRoute>()
        .create(&route("telemetry"), OnConflict::Fail)
        .await
        .unwrap();

    assert_eq!(created.id.encode(), format!("{HUB}/Routes/telemetry"));
    assert_eq!(created.attributes.source, "DeviceMessages");
    assert_eq!(route_names(&client), vec!["existing", "telemetry"]);

    let hub = client.object(HUB).unwrap();
    assert_eq!(hub["sku"], json!({"name": "S1", "capacity": 1}));
    assert_eq!(hub["properties"]["eventHubEndpoints"]["events"]["partitionCount"], json!(2));
    assert_eq!(hub["properties"]["routing"]["endpoints"]["eventHubs"][0]["name"], json!("archive"));
}

#[tokio::test]
async fn test_existing_route_name_conflicts_ignoring_case() {
    let client = seeded(MemoryClient::new());
    let rec = reconciler(client.clone());

    let err = rec
        .member::<IotHubRoute>()
        .create(&route("EXISTING"), OnConflict::Fail)
        .await
        .unwrap_err();

    match &err {
        ReconcileError::AlreadyExists { resource_type, id } => {
            assert_eq!(*resource_type, "azurerm_iothub_route");
            assert_eq!(id, &format!("{HUB}/Routes/EXISTING"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.calls(CallKind::Put), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_creates_lose_no_route() {
    let client = seeded(MemoryClient::new().with_latency(Duration::from_millis(20)));
    let rec = reconciler(client.clone());
    let configs: Vec<_> = (0..6).map(|i| route(&format!("route-{i}"))).collect();

    let ops = rec.member::<IotHubRoute>();
    let results = join_all(configs.iter().map(|config| ops.create(config, OnConflict::Fail))).await;

    for result in results {
        result.unwrap();
    }
    let mut names = route_names(&client);
    names.sort();
    assert_eq!(
        names,
        vec!["existing", "route-0", "route-1", "route-2", "route-3", "route-4", "route-5"]
    );
    assert!(rec.locks().is_empty());
}

#[tokio::test]
async fn test_update_in_place() {
    let client = seeded(MemoryClient::new());
    let rec = reconciler(client.clone());
    let ops = rec.member::<IotHubRoute>();
    let created = ops.create(&route("telemetry"), OnConflict::Fail).await.unwrap();

    let mut changed = route("telemetry");
    changed.condition = "$body.level = 'critical'".to_string();
    changed.enabled = false;
    let updated = ops.update(&created, &changed).await.unwrap();

    assert_eq!(updated.attributes.condition, "$body.level = 'critical'");
    assert!(!updated.attributes.enabled);
    assert_eq!(route_names(&client), vec!["existing", "telemetry"]);
}

#[tokio::test]
async fn test_renaming_requires_replacement() {
    let client = seeded(MemoryClient::new());
    let rec = reconciler(client.clone());
    let ops = rec.member::<IotHubRoute>();
    let created = ops.create(&route("telemetry"), OnConflict::Fail).await.unwrap();

    let err = ops.update(&created, &route("renamed")).await.unwrap_err();
    assert!(matches!(err, ReconcileError::RequiresReplacement { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_hub_names_differing_in_case_share_the_lock() {
    let client = seeded(MemoryClient::new().with_latency(Duration::from_millis(20)));
    let rec = reconciler(client.clone());
    let ops = rec.member::<IotHubRoute>();

    let lower = route("a");
    let mut upper = route("b");
    upper.iothub_name = "HUB-1".to_string();

    let (a, b) = tokio::join!(
        ops.create(&lower, OnConflict::Fail),
        ops.create(&upper, OnConflict::Fail)
    );
    a.unwrap();
    b.unwrap();

    let mut names = route_names(&client);
    names.sort();
    assert_eq!(names, vec!["a", "b", "existing"]);
    assert!(rec.locks().is_empty());
}

#[tokio::test]
async fn test_update_after_import_of_lowercased_id() {
    let client = seeded(MemoryClient::new());
    let rec = reconciler(client.clone());
    let ops = rec.member::<IotHubRoute>();

    let imported = ops
        .import("/subscriptions/sub-1/resourcegroups/rg-1/providers/microsoft.devices/iothubs/hub-1/routes/existing")
        .await
        .unwrap();
    assert_eq!(imported.id.encode(), format!("{HUB}/Routes/existing"));

    let mut changed = route("existing");
    changed.enabled = false;
    let updated = ops.update(&imported, &changed).await.unwrap();
    assert!(!updated.attributes.enabled);
    assert_eq!(route_names(&client), vec!["existing"]);
}

#[tokio::test]
async fn test_delete_removes_only_this_route() {
    let client = seeded(MemoryClient::new());
    let rec = reconciler(client.clone());
    let ops = rec.member::<IotHubRoute>();
    let created = ops.create(&route("telemetry"), OnConflict::Fail).await.unwrap();

    ops.delete(&created.id).await.unwrap();
    assert_eq!(route_names(&client), vec!["existing"]);

    let puts = client.calls(CallKind::Put);
    ops.delete(&created.id).await.unwrap();
    assert_eq!(client.calls(CallKind::Put), puts, "absent route must not rewrite the hub");
}

#[tokio::test]
async fn test_missing_hub() {
    let client = Arc::new(MemoryClient::new());
    client.insert(RG, json!({"location": "westeurope"}));
    let rec = reconciler(client);
    let ops = rec.member::<IotHubRoute>();

    let err = ops.create(&route("telemetry"), OnConflict::Fail).await.unwrap_err();
    match err {
        ReconcileError::ParentNotFound { parent, .. } => assert!(parent.contains("IotHubs/hub-1")),
        other => panic!("unexpected error: {other:?}"),
    }

    let id = IotHubRouteId::decode(&format!("{HUB}/Routes/telemetry")).unwrap();
    assert!(ops.read(&id).await.unwrap().is_none());
    ops.delete(&id).await.unwrap();
}

#[tokio::test]
async fn test_throttled_hub_read_is_an_error() {
    let client = seeded(MemoryClient::new());
    client.fail_next(CallKind::Get, ApiError::new(429, "TooManyRequests", "slow down"));
    let rec = reconciler(client);
    let id = IotHubRouteId::decode(&format!("{HUB}/Routes/existing")).unwrap();

    let err = rec.member::<IotHubRoute>().read(&id).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Remote { .. }));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_handler_round_trip() {
    let client = seeded(MemoryClient::new());
    let provider = driftwood_resources::provider(Arc::new(reconciler(client.clone())));
    let handler = provider.handler("azurerm_iothub_route").unwrap();

    let created = handler
        .create(
            json!({
                "resource_group_name": "rg-1",
                "iothub_name": "hub-1",
                "name": "twin",
                "source": "TwinChangeEvents",
                "endpoint_names": ["archive"],
                "enabled": true
            }),
            OnConflict::Fail,
        )
        .await
        .unwrap();
    assert_eq!(created.attributes["condition"], Value::from("true"));

    let imported = handler.import(&created.id).await.unwrap();
    assert_eq!(imported, created);

    let err = handler
        .create(json!({"name": "twin", "source": "Nope"}), OnConflict::Fail)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidConfig(_)));
}

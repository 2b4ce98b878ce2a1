//! HTTP API tests
//!
//! Each test starts the real router on an ephemeral port and talks to it
//! with reqwest. Background actions are awaited through the conductor
//! handle so assertions never race the fake backend.

use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use provisiond::api;
use provisiond::backend::{DriverRegistry, FakeConfig};
use provisiond::conductor::{Conductor, ConductorSettings};
use provisiond::version::{MAX_VERSION_HEADER, MIN_VERSION_HEADER, VERSION_HEADER};

// =============================================================================
// Harness
// =============================================================================

struct TestServer {
    base: String,
    conductor: Conductor,
    client: Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(FakeConfig::default()).await
    }

    async fn start_with(fake: FakeConfig) -> Self {
        let drivers = DriverRegistry::from_names(&["fake".to_string()], fake).unwrap();
        let conductor = Conductor::new(ConductorSettings::default(), drivers);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = conductor.clone();
        tokio::spawn(async move {
            api::serve(listener, serving, std::future::pending()).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            conductor,
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str, version: Option<&str>) -> Response {
        let mut req = self.client.get(self.url(path));
        if let Some(version) = version {
            req = req.header(VERSION_HEADER, version);
        }
        req.send().await.unwrap()
    }

    async fn send(&self, method: reqwest::Method, path: &str, version: &str, body: Option<Value>) -> Response {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header(VERSION_HEADER, version);
        if let Some(body) = body {
            req = req.json(&body);
        }
        req.send().await.unwrap()
    }

    async fn create(&self, version: &str, body: Value) -> Value {
        let resp = self.send(reqwest::Method::POST, "/v1/nodes", version, Some(body)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    /// Fire a provision action and wait for its background work.
    async fn provision(&self, uuid: &str, target: &str) -> Response {
        let resp = self
            .send(
                reqwest::Method::PUT,
                &format!("/v1/nodes/{}/states/provision", uuid),
                "latest",
                Some(json!({ "target": target })),
            )
            .await;
        self.conductor.wait_for(uuid.parse::<Uuid>().unwrap()).await;
        resp
    }

    async fn states(&self, uuid: &str) -> Value {
        self.get(&format!("/v1/nodes/{}/states", uuid), Some("latest"))
            .await
            .json()
            .await
            .unwrap()
    }
}

fn header<'a>(resp: &'a Response, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

fn assert_range_headers(resp: &Response) {
    assert_eq!(header(resp, MIN_VERSION_HEADER), Some("1.1"));
    assert_eq!(header(resp, MAX_VERSION_HEADER), Some("1.11"));
}

async fn fault(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    (status, body["error_message"].clone())
}

// =============================================================================
// Discovery and version negotiation
// =============================================================================

#[tokio::test]
async fn test_root_document() {
    let server = TestServer::start().await;
    let resp = server.get("/", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_range_headers(&resp);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["default_version"]["id"], json!("v1"));
    assert_eq!(body["default_version"]["min_version"], json!("1.1"));
    assert_eq!(body["default_version"]["version"], json!("1.11"));
}

#[tokio::test]
async fn test_root_ignores_bad_version_header() {
    let server = TestServer::start().await;
    let resp = server.get("/", Some("9.9")).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_v1_document_links() {
    let server = TestServer::start().await;
    let resp = server.get("/v1", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    for collection in ["chassis", "nodes", "ports", "drivers"] {
        assert!(body[collection][0]["href"].is_string(), "{} link missing", collection);
    }
}

#[tokio::test]
async fn test_missing_header_negotiates_minimum() {
    let server = TestServer::start().await;
    let resp = server.get("/v1/nodes", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_range_headers(&resp);
    assert_eq!(header(&resp, VERSION_HEADER), Some("1.1"));
}

#[tokio::test]
async fn test_latest_negotiates_maximum() {
    let server = TestServer::start().await;
    let resp = server.get("/v1/nodes", Some("latest")).await;
    assert_eq!(header(&resp, VERSION_HEADER), Some("1.11"));

    let resp = server.get("/v1/nodes", Some("1.7")).await;
    assert_eq!(header(&resp, VERSION_HEADER), Some("1.7"));
}

#[tokio::test]
async fn test_malformed_version_is_bad_request() {
    let server = TestServer::start().await;
    let resp = server.get("/v1/nodes", Some("one.two")).await;
    assert_range_headers(&resp);
    let (status, error) = fault(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["faultcode"], json!("Client"));
    assert_eq!(error["debuginfo"], Value::Null);
}

#[tokio::test]
async fn test_unsupported_versions_are_not_acceptable() {
    let server = TestServer::start().await;
    for requested in ["2.1", "1.0", "1.12"] {
        let resp = server.get("/v1/nodes", Some(requested)).await;
        assert_range_headers(&resp);
        let (status, error) = fault(resp).await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE, "{}", requested);
        assert!(error["faultstring"].as_str().unwrap().contains("[1.1, 1.11]"));
    }
}

#[tokio::test]
async fn test_unknown_route_carries_range_headers() {
    let server = TestServer::start().await;
    let resp = server.get("/v1/chassis", Some("latest")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_range_headers(&resp);
}

// =============================================================================
// Enrollment and rendering
// =============================================================================

#[tokio::test]
async fn test_initial_state_follows_version() {
    let server = TestServer::start().await;

    let node = server.create("1.11", json!({"driver": "fake"})).await;
    assert_eq!(node["provision_state"], json!("enroll"));

    let node = server.create("1.10", json!({"driver": "fake"})).await;
    assert_eq!(node["provision_state"], json!("available"));

    let node = server.create("1.1", json!({"driver": "fake"})).await;
    assert_eq!(node["provision_state"], Value::Null);
    let uuid = node["uuid"].as_str().unwrap();

    let resp = server.get(&format!("/v1/nodes/{}", uuid), Some("1.2")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["provision_state"], json!("available"));
}

#[tokio::test]
async fn test_create_rejects_unknown_driver() {
    let server = TestServer::start().await;
    let resp = server
        .send(reqwest::Method::POST, "/v1/nodes", "latest", Some(json!({"driver": "ipmi"})))
        .await;
    let (status, _) = fault(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_rejects_bad_body() {
    let server = TestServer::start().await;
    let resp = server
        .send(reqwest::Method::POST, "/v1/nodes", "latest", Some(json!({"name": "no-driver"})))
        .await;
    let (status, error) = fault(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["faultcode"], json!("Client"));
}

#[tokio::test]
async fn test_logical_names() {
    let server = TestServer::start().await;

    let resp = server
        .send(
            reqwest::Method::POST,
            "/v1/nodes",
            "1.4",
            Some(json!({"driver": "fake", "name": "node-1"})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);

    let node = server
        .create("1.5", json!({"driver": "fake", "name": "node-1"}))
        .await;
    let uuid = node["uuid"].as_str().unwrap().to_string();

    let resp = server.get("/v1/nodes/node-1", Some("1.5")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["uuid"], json!(uuid));

    let resp = server.get(&format!("/v1/nodes/{}", uuid), Some("1.4")).await;
    let body: Value = resp.json().await.unwrap();
    assert!(body.get("name").is_none());

    let resp = server
        .send(
            reqwest::Method::POST,
            "/v1/nodes",
            "1.5",
            Some(json!({"driver": "fake", "name": "node-1"})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = server
        .send(
            reqwest::Method::POST,
            "/v1/nodes",
            "1.9",
            Some(json!({"driver": "fake", "name": "Node_2"})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server
        .create("1.10", json!({"driver": "fake", "name": "Node_2"}))
        .await;
}

#[tokio::test]
async fn test_fields_selection() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap();

    let resp = server
        .get(&format!("/v1/nodes/{}?fields=uuid,power_state", uuid), Some("1.8"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 3, "{:?}", keys);

    let resp = server
        .get(&format!("/v1/nodes/{}?fields=power_state", uuid), Some("1.8"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["uuid"], json!(uuid));
    assert!(body.as_object().unwrap().contains_key("power_state"));
    assert!(body.get("driver").is_none());

    let resp = server.get("/v1/nodes?fields=power_state", Some("1.8")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["nodes"][0]["uuid"], json!(uuid));

    let resp = server
        .get(&format!("/v1/nodes/{}?fields=uuid", uuid), Some("1.7"))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);

    let resp = server
        .get(&format!("/v1/nodes/{}?fields=bogus", uuid), Some("1.8"))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_filters() {
    let server = TestServer::start().await;
    let a = server.create("latest", json!({"driver": "fake"})).await;
    server.create("1.10", json!({"driver": "fake"})).await;

    let resp = server.get("/v1/nodes?provision_state=enroll", Some("1.9")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["nodes"].as_array().unwrap().len(), 1);
    assert_eq!(body["nodes"][0]["uuid"], a["uuid"]);

    let resp = server.get("/v1/nodes?provision_state=enroll", Some("1.8")).await;
    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);

    let resp = server.get("/v1/nodes?maintenance=true", Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert!(body["nodes"].as_array().unwrap().is_empty());

    let resp = server.get("/v1/nodes/detail", Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["nodes"].as_array().unwrap().len(), 2);
    assert!(body["nodes"][0]["driver_info"].is_object());
}

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let server = TestServer::start().await;
    let resp = server
        .get(&format!("/v1/nodes/{}", Uuid::new_v4()), Some("latest"))
        .await;
    let (status, error) = fault(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["faultcode"], json!("Client"));
}

// =============================================================================
// Provisioning over HTTP
// =============================================================================

#[tokio::test]
async fn test_full_lifecycle() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();

    let resp = server.provision(&uuid, "manage").await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert!(header(&resp, "location").unwrap().ends_with("/states"));
    assert_eq!(server.states(&uuid).await["provision_state"], json!("manageable"));

    server.provision(&uuid, "inspect").await;
    let resp = server.get(&format!("/v1/nodes/{}", uuid), Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["provision_state"], json!("manageable"));
    assert_eq!(body["properties"]["cpu_arch"], json!("x86_64"));
    assert!(body["inspection_finished_at"].is_string());

    server.provision(&uuid, "provide").await;
    let states = server.states(&uuid).await;
    assert_eq!(states["provision_state"], json!("available"));
    assert_eq!(states["target_provision_state"], Value::Null);

    let resp = server
        .send(
            reqwest::Method::PATCH,
            &format!("/v1/nodes/{}", uuid),
            "latest",
            Some(json!([{"op": "add", "path": "/instance_info/image_source", "value": "http://images/ubuntu.qcow2"}])),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    server.provision(&uuid, "active").await;
    let states = server.states(&uuid).await;
    assert_eq!(states["provision_state"], json!("active"));
    assert_eq!(states["power_state"], json!("power on"));

    server.provision(&uuid, "deleted").await;
    let resp = server.get(&format!("/v1/nodes/{}", uuid), Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["provision_state"], json!("available"));
    assert_eq!(body["instance_info"], json!({}));
    assert_eq!(body["clean_step"], json!({}));
}

#[tokio::test]
async fn test_failed_manage_reports_last_error() {
    let server = TestServer::start().await;
    let node = server
        .create("latest", json!({"driver": "fake", "driver_info": {"fake_fail": "verify"}}))
        .await;
    let uuid = node["uuid"].as_str().unwrap().to_string();

    let resp = server.provision(&uuid, "manage").await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let states = server.states(&uuid).await;
    assert_eq!(states["provision_state"], json!("enroll"));
    assert!(states["last_error"].as_str().unwrap().contains("verify"));
}

#[tokio::test]
async fn test_inspect_in_wrong_state_is_conflict() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();

    let resp = server.provision(&uuid, "inspect").await;
    let (status, error) = fault(resp).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["faultstring"].as_str().unwrap().contains("enroll"));
    assert_eq!(server.states(&uuid).await["provision_state"], json!("enroll"));
}

#[tokio::test]
async fn test_unknown_action_is_bad_request() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();
    let resp = server.provision(&uuid, "explode").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gated_actions_are_not_acceptable() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap();
    let resp = server
        .send(
            reqwest::Method::PUT,
            &format!("/v1/nodes/{}/states/provision", uuid),
            "1.3",
            Some(json!({"target": "manage"})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_maintenance_blocks_provide() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();
    server.provision(&uuid, "manage").await;

    let resp = server
        .send(
            reqwest::Method::PUT,
            &format!("/v1/nodes/{}/maintenance", uuid),
            "latest",
            Some(json!({"reason": "fan failure"})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = server.get(&format!("/v1/nodes/{}", uuid), Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["maintenance"], json!(true));
    assert_eq!(body["maintenance_reason"], json!("fan failure"));

    let resp = server.provision(&uuid, "provide").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .send(reqwest::Method::DELETE, &format!("/v1/nodes/{}/maintenance", uuid), "latest", None)
        .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = server.provision(&uuid, "provide").await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(server.states(&uuid).await["provision_state"], json!("available"));
}

#[tokio::test]
async fn test_locked_node_rejects_second_action() {
    let server = TestServer::start_with(FakeConfig { step_delay_ms: 300 }).await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();
    let path = format!("/v1/nodes/{}/states/provision", uuid);

    let first = server
        .send(reqwest::Method::PUT, &path, "latest", Some(json!({"target": "manage"})))
        .await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = server
        .send(reqwest::Method::PUT, &path, "latest", Some(json!({"target": "manage"})))
        .await;
    let (status, error) = fault(second).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["faultstring"].as_str().unwrap().contains("locked"));

    server.conductor.wait_for(uuid.parse().unwrap()).await;
    assert_eq!(server.states(&uuid).await["provision_state"], json!("manageable"));
}

#[tokio::test]
async fn test_power_requests() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();

    let resp = server
        .send(
            reqwest::Method::PUT,
            &format!("/v1/nodes/{}/states/power", uuid),
            "latest",
            Some(json!({"target": "power on"})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    server.conductor.wait_for(uuid.parse().unwrap()).await;
    let states = server.states(&uuid).await;
    assert_eq!(states["power_state"], json!("power on"));
    assert_eq!(states["target_power_state"], Value::Null);

    let resp = server
        .send(
            reqwest::Method::PUT,
            &format!("/v1/nodes/{}/states/power", uuid),
            "latest",
            Some(json!({"target": "hibernate"})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_boot_device_endpoints() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();
    let path = format!("/v1/nodes/{}/management/boot_device", uuid);

    let resp = server.get(&format!("{}/supported", path), Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert!(body["supported_boot_devices"]
        .as_array()
        .unwrap()
        .contains(&json!("pxe")));

    let resp = server
        .send(
            reqwest::Method::PUT,
            &path,
            "latest",
            Some(json!({"boot_device": "pxe", "persistent": true})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = server.get(&path, Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"boot_device": "pxe", "persistent": true}));

    let resp = server
        .send(reqwest::Method::PUT, &path, "latest", Some(json!({"boot_device": "floppy"})))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_rules() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();
    let path = format!("/v1/nodes/{}", uuid);

    let resp = server
        .send(
            reqwest::Method::PATCH,
            &path,
            "latest",
            Some(json!([{"op": "replace", "path": "/provision_state", "value": "active"}])),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .send(
            reqwest::Method::PATCH,
            &path,
            "latest",
            Some(json!([
                {"op": "add", "path": "/name", "value": "patched"},
                {"op": "add", "path": "/extra/owner", "value": "team-a"}
            ])),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["name"], json!("patched"));
    assert_eq!(body["extra"]["owner"], json!("team-a"));
}

#[tokio::test]
async fn test_delete_node() {
    let server = TestServer::start().await;
    let node = server.create("latest", json!({"driver": "fake"})).await;
    let uuid = node["uuid"].as_str().unwrap().to_string();
    let path = format!("/v1/nodes/{}", uuid);

    let resp = server.send(reqwest::Method::DELETE, &path, "latest", None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = server.get(&path, Some("latest")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Drivers
// =============================================================================

#[tokio::test]
async fn test_drivers() {
    let server = TestServer::start().await;
    server.create("latest", json!({"driver": "fake"})).await;

    let resp = server.get("/v1/drivers", Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["drivers"][0]["name"], json!("fake"));
    assert_eq!(body["drivers"][0]["hosts"], json!(["localhost"]));
    assert_eq!(body["drivers"][0]["nodes"], json!(1));

    let resp = server.get("/v1/drivers/fake", Some("latest")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["nodes"], json!(1));

    let resp = server.get("/v1/drivers/ipmi", Some("latest")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

//! End-to-end tests for mock servers served over real sockets.

use mockport::{MemoryStore, MockDefinition, ServerManager, ServerStatus, Store};
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn manager() -> (ServerManager, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    (ServerManager::new(Arc::clone(&store)), store)
}

fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn mock(yaml: &str) -> MockDefinition {
    MockDefinition::from_yaml(yaml).unwrap()
}

fn port_of(url: &str) -> u16 {
    url.rsplit(':').next().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_hello_world_end_to_end() {
    let (manager, _) = manager();
    let state = manager
        .new_mock_server(mock(
            r#"
id: hello
routes:
  - method: GET
    path: /hello
    responses:
      - status: 200
        body: world
"#,
        ))
        .await
        .unwrap();

    let client = client();
    let response = client
        .get(format!("{}/hello", state.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "world");

    let response = client
        .get(format!("{}/missing", state.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_ephemeral_port_released_after_stop() {
    let (manager, _) = manager();
    let state = manager
        .new_mock_server(mock(
            "id: eph\nport: ''\nroutes:\n  - path: /x\n    responses:\n      - body: x\n",
        ))
        .await
        .unwrap();
    let port = port_of(&state.url);
    assert_ne!(port, 0);
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .is_ok());

    let stopped = manager.stop_mock_server("eph").await.unwrap();
    assert_eq!(stopped.status, ServerStatus::Stopped);
    assert!(stopped.url.is_empty());

    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .is_err());

    // Stopping again is harmless
    assert!(manager.stop_mock_server("eph").await.is_ok());
}

#[tokio::test]
async fn test_sequential_responses_cycle_over_http() {
    let (manager, store) = manager();
    let definition = mock(
        r#"
id: seq
routes:
  - path: /next
    response_mode: sequential
    responses:
      - id: R1
        body: one
      - id: R2
        body: two
      - id: R3
        body: three
"#,
    );
    store.set_active_session("seq", "session-a").await.unwrap();
    let state = manager.new_mock_server(definition).await.unwrap();

    let client = client();
    let mut bodies = Vec::new();
    for _ in 0..4 {
        let body = client
            .get(format!("{}/next", state.url))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        bodies.push(body);
    }
    assert_eq!(bodies, vec!["one", "two", "three", "one"]);

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_random_mode_returns_several_responses() {
    let (manager, _) = manager();
    let state = manager
        .new_mock_server(mock(
            r#"
id: rnd
routes:
  - path: /pick
    response_mode: random
    responses:
      - body: a
      - body: b
"#,
        ))
        .await
        .unwrap();

    let client = client();
    let mut seen = HashSet::new();
    for _ in 0..100 {
        let body = client
            .get(format!("{}/pick", state.url))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        seen.insert(body);
    }
    assert!(seen.len() >= 2);

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_pause_returns_503_until_resumed() {
    let (manager, _) = manager();
    let state = manager
        .new_mock_server(mock(
            "id: p\nroutes:\n  - path: /ping\n    responses:\n      - body: pong\n",
        ))
        .await
        .unwrap();
    let client = client();
    let url = format!("{}/ping", state.url);

    manager.pause_mock_server("p").unwrap();
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().await.unwrap(), "Mock server is paused");

    manager.resume_mock_server("p").unwrap();
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "pong");

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_tls_with_default_certificate() {
    let (manager, _) = manager();
    let state = manager
        .new_mock_server(mock(
            r#"
id: secure
tls:
  enabled: true
routes:
  - path: /secure
    responses:
      - body: encrypted
"#,
        ))
        .await
        .unwrap();
    assert!(state.url.starts_with("https://127.0.0.1:"));

    let client = Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let response = client
        .get(format!("{}/secure", state.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "encrypted");

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_rule_gated_responses_over_http() {
    let (manager, _) = manager();
    let state = manager
        .new_mock_server(mock(
            r#"
id: rules
routes:
  - method: POST
    path: /orders/:id
    responses:
      - status: 201
        body: vip
        rules:
          - target: body
            modifier: .customer
            value: '{"tier": "gold", "id": 7}'
            operator: equal
          - target: route_param
            modifier: id
            value: "^[0-9]+$"
            operator: regex
      - status: 200
        body: regular
"#,
        ))
        .await
        .unwrap();
    let client = client();

    let vip = client
        .post(format!("{}/orders/42", state.url))
        .json(&serde_json::json!({"customer": {"id": 7, "tier": "gold"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(vip.status(), StatusCode::CREATED);
    assert_eq!(vip.text().await.unwrap(), "vip");

    let regular = client
        .post(format!("{}/orders/abc", state.url))
        .json(&serde_json::json!({"customer": {"id": 7, "tier": "gold"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(regular.status(), StatusCode::OK);
    assert_eq!(regular.text().await.unwrap(), "regular");

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_unmatched_requests_are_proxied_upstream() {
    let (manager, _) = manager();
    let upstream = manager
        .new_mock_server(mock(
            r#"
id: upstream
routes:
  - path: /api/items
    responses:
      - body: '{"items":[1,2]}'
        headers:
          Content-Type: application/json
        rules:
          - target: header
            modifier: X-Proxied-By
            value: mockport
            operator: equal
          - target: query_string
            modifier: page
            value: "2"
            operator: equal
"#,
        ))
        .await
        .unwrap();

    let front = manager
        .new_mock_server(mock(&format!(
            r#"
id: front
proxy:
  enabled: true
  host: "{}/"
  request_headers:
    X-Proxied-By: mockport
  response_headers:
    X-Served-By: front
routes:
  - path: /local
    responses:
      - body: local
"#,
            upstream.url
        )))
        .await
        .unwrap();

    let client = client();
    let local = client
        .get(format!("{}/local", front.url))
        .send()
        .await
        .unwrap();
    assert_eq!(local.text().await.unwrap(), "local");

    let proxied = client
        .get(format!("{}/api/items?page=2", front.url))
        .send()
        .await
        .unwrap();
    assert_eq!(proxied.status(), StatusCode::OK);
    assert_eq!(proxied.headers()["x-served-by"], "front");
    assert_eq!(proxied.headers()["content-type"], "application/json");
    let body: serde_json::Value = proxied.json().await.unwrap();
    assert_json_diff::assert_json_eq!(body, serde_json::json!({"items": [1, 2]}));

    // Upstream answers 404 for what it does not know, and that is relayed as is
    let relayed = client
        .get(format!("{}/api/other", front.url))
        .send()
        .await
        .unwrap();
    assert_eq!(relayed.status(), StatusCode::NOT_FOUND);

    // With the upstream gone the request degrades to the local 404
    manager.stop_mock_server("upstream").await.unwrap();
    let degraded = client
        .get(format!("{}/api/items?page=2", front.url))
        .send()
        .await
        .unwrap();
    assert_eq!(degraded.status(), StatusCode::NOT_FOUND);
    assert_eq!(degraded.text().await.unwrap(), "No route matched");

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_request_number_over_http() {
    let (manager, store) = manager();
    store.set_active_session("counted", "s").await.unwrap();
    let state = manager
        .new_mock_server(mock(
            r#"
id: counted
routes:
  - path: /login
    responses:
      - status: 429
        body: slow down
        rules:
          - target: request_number
            value: "^([3-9]|[1-9][0-9]+)$"
            operator: regex
      - body: welcome
"#,
        ))
        .await
        .unwrap();

    let client = client();
    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = client
            .get(format!("{}/login", state.url))
            .send()
            .await
            .unwrap();
        statuses.push(response.status().as_u16());
    }
    assert_eq!(statuses, vec![200, 200, 429]);

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_static_file_served_from_definition_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("logo.png"), b"\x89PNG\r\n\x1a\nfake-image").unwrap();
    let definition = dir.path().join("files.yml");
    std::fs::write(
        &definition,
        "id: files\nroutes:\n  - path: /logo\n    responses:\n      - file_path: logo.png\n",
    )
    .unwrap();

    let (manager, _) = manager();
    let state = manager
        .new_mock_server(MockDefinition::from_file(&definition).unwrap())
        .await
        .unwrap();

    let response = client()
        .get(format!("{}/logo", state.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.headers()["content-length"], "18");
    assert_eq!(
        response.bytes().await.unwrap().as_ref(),
        b"\x89PNG\r\n\x1a\nfake-image"
    );

    manager.stop_all_servers().await;
}

#[tokio::test]
async fn test_large_upstream_body_streams_through_proxy() {
    let dir = tempfile::tempdir().unwrap();
    let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    std::fs::write(dir.path().join("blob.bin"), &payload).unwrap();
    let definition = dir.path().join("blob.yml");
    std::fs::write(
        &definition,
        "id: blob\nroutes:\n  - path: /blob\n    responses:\n      - file_path: blob.bin\n",
    )
    .unwrap();

    let (manager, _) = manager();
    let upstream = manager
        .new_mock_server(MockDefinition::from_file(&definition).unwrap())
        .await
        .unwrap();
    let front = manager
        .new_mock_server(mock(&format!(
            "id: relay\nproxy:\n  enabled: true\n  host: {}\nroutes:\n  - path: /local\n    responses:\n      - body: local\n",
            upstream.url
        )))
        .await
        .unwrap();

    let response = client()
        .get(format!("{}/blob", front.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("transfer-encoding").is_some());
    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), payload.len());
    assert!(body.as_ref() == payload.as_slice());

    manager.stop_all_servers().await;
}

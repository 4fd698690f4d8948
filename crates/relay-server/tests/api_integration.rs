//! HTTP API integration tests. Exercise the endpoints against a relay whose
//! system connection is played by the test.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use relay_config::ServerConfig;
use relay_core::{Packet, PacketType};
use relay_server::mock::MockSink;
use relay_server::{Connection, Relay, RelaySettings, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn setup(settings: RelaySettings) -> (axum::Router, Arc<Relay>) {
    let relay = Relay::new_for_test(settings);
    let router = build_router(ServerConfig::default(), Arc::clone(&relay));
    (router, relay)
}

/// Helper to read the full body as JSON.
async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Wait for the next packet the relay queued for the system connection.
async fn next_system_packet(relay: &Relay) -> Packet {
    for _ in 0..200 {
        if let Some(packet) = relay.with_state(|s| s.system_queue.pop_front()) {
            return packet;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no packet reached the system queue");
}

fn system_socket(relay: &Relay) -> Connection {
    Connection::new(relay.next_connection_id(), MockSink::new())
}

fn reply(packet_type: &str, data: Value) -> String {
    json!({
        "packet_type": packet_type,
        "sender_id": "mephisto",
        "receiver_id": "mephisto_server",
        "data": data
    })
    .to_string()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── Immediate endpoints ────────────────────────────────────────

#[tokio::test]
async fn test_is_alive_without_system_connection() {
    let (app, _relay) = setup(RelaySettings::default());
    let req = Request::get("/is_alive").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"status": "Alive!"}));
}

#[tokio::test]
async fn test_get_timestamp() {
    let (app, _relay) = setup(RelaySettings::default());
    let before = chrono::Utc::now().timestamp_millis();
    let req = Request::get("/get_timestamp").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ts = body_json(resp).await["timestamp"].as_i64().unwrap();
    assert!(ts >= before);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _relay) = setup(RelaySettings::default());
    let req = Request::get("/metrics").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(ct.contains("text/plain"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("relay_pending_requests 0"));
    assert!(body.contains("relay_system_connected 0"));
}

// ── Bridged endpoints ──────────────────────────────────────────

#[tokio::test]
async fn test_request_agent_round_trip() {
    let (app, relay) = setup(RelaySettings::default());
    let system = system_socket(&relay);
    relay.route(&system, &reply("alive", json!({})));

    let call = tokio::spawn(
        app.oneshot(post_json("/request_agent", json!({"provider_data": {"a": 1}}))),
    );

    let request = next_system_packet(&relay).await;
    assert_eq!(request.packet_type(), PacketType::RegisterAgent);
    assert_eq!(request.sender_id(), "mephisto_server");
    assert_eq!(request.receiver_id(), "mephisto");
    assert_eq!(request.data()["provider_data"], json!({"a": 1}));
    let request_id = request.request_id().unwrap().to_string();

    relay.route(
        &system,
        &reply("provider_details", json!({"request_id": request_id, "ok": true})),
    );
    let resp = call.await.unwrap().unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"ok": true}));

    // A duplicate reply is discarded without disturbing anything
    relay.route(
        &system,
        &reply("provider_details", json!({"request_id": request_id, "ok": false})),
    );
    assert_eq!(relay.metrics().orphan_replies(), 1);
    relay.with_state(|s| assert!(s.pending.is_empty()));
}

#[tokio::test]
async fn test_each_endpoint_sends_its_packet_type() {
    let cases = [
        ("/initial_task_data", PacketType::InitDataRequest),
        ("/register_worker", PacketType::RegisterWorker),
        ("/request_agent", PacketType::RegisterAgent),
        ("/submit_onboarding", PacketType::SubmitOnboarding),
    ];
    for (uri, expected) in cases {
        let (app, relay) = setup(RelaySettings::default());
        let system = system_socket(&relay);
        let call = tokio::spawn(app.oneshot(post_json(uri, json!({"provider_data": {}}))));

        let request = next_system_packet(&relay).await;
        assert_eq!(request.packet_type(), expected, "endpoint {uri}");
        relay.route(
            &system,
            &reply(
                "provider_details",
                json!({"request_id": request.request_id().unwrap(), "endpoint": uri}),
            ),
        );
        let resp = call.await.unwrap().unwrap();
        assert_eq!(body_json(resp).await["endpoint"], uri);
    }
}

#[tokio::test]
async fn test_init_data_reply_falls_back_to_receiver_id() {
    let (app, relay) = setup(RelaySettings::default());
    let system = system_socket(&relay);
    let call = tokio::spawn(app.oneshot(post_json(
        "/initial_task_data",
        json!({"provider_data": {"worker": "w1"}}),
    )));

    let request = next_system_packet(&relay).await;
    let request_id = request.request_id().unwrap().to_string();
    relay.route(
        &system,
        &json!({
            "packet_type": "initial_data_send",
            "sender_id": "mephisto",
            "receiver_id": request_id,
            "data": {"init_data": [1, 2, 3]}
        })
        .to_string(),
    );

    let resp = call.await.unwrap().unwrap();
    assert_eq!(body_json(resp).await, json!({"init_data": [1, 2, 3]}));
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let settings = RelaySettings {
        request_timeout: Some(Duration::from_millis(50)),
        ..RelaySettings::default()
    };
    let (app, relay) = setup(settings);

    let resp = app
        .oneshot(post_json("/register_worker", json!({"provider_data": {}})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "upstream timeout");
    assert!(body["request_id"].is_string());
    assert_eq!(relay.metrics().requests_timed_out(), 1);
    relay.with_state(|s| assert!(s.pending.is_empty()));
}

#[tokio::test]
async fn test_bridge_rejects_non_json_body() {
    let (app, _relay) = setup(RelaySettings::default());
    let req = Request::post("/request_agent")
        .header("content-type", "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert!(resp.status().is_client_error());
}

// ── Task submission ────────────────────────────────────────────

fn multipart_request(parts: &[(&str, Option<(&str, &str)>, &str)]) -> Request<Body> {
    let boundary = "relay-test-boundary";
    let mut body = String::new();
    for (name, file, content) in parts {
        body.push_str(&format!("--{boundary}\r\n"));
        match file {
            Some((filename, content_type)) => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                ));
                body.push_str(&format!("Content-Type: {content_type}\r\n\r\n"));
            }
            None => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                ));
            }
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    Request::post("/submit_task")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_submit_task_acknowledges_and_forwards() {
    let (app, relay) = setup(RelaySettings::default());
    let req = multipart_request(&[
        ("USED_AGENT_ID", None, "a1"),
        ("answer", None, r#"{"choice": 2}"#),
        ("comment", None, "looks fine"),
        ("zip", None, "12345"),
        ("flag", None, "true"),
        ("upload", Some(("notes.txt", "text/plain")), "hello"),
    ]);
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"status": "Submitted!"}));

    let packet = relay
        .with_state(|s| s.system_queue.pop_front())
        .expect("submission queued for system");
    assert_eq!(packet.packet_type(), PacketType::AgentAction);
    assert_eq!(packet.sender_id(), "a1");
    assert_eq!(packet.receiver_id(), "mephisto");

    let data = packet.data();
    assert_eq!(data["MEPHISTO_is_submit"], true);
    // Text fields arrive exactly as submitted
    assert_eq!(data["task_data"]["answer"], r#"{"choice": 2}"#);
    assert_eq!(data["task_data"]["comment"], "looks fine");
    assert_eq!(data["task_data"]["zip"], "12345");
    assert_eq!(data["task_data"]["flag"], "true");
    assert!(data["task_data"].get("USED_AGENT_ID").is_none());

    let file = &data["files"][0];
    assert_eq!(file["filename"], "notes.txt");
    assert_eq!(file["content_type"], "text/plain");
    assert_eq!(file["size"], 5);
    assert_eq!(file["data"], "aGVsbG8=");
}

#[tokio::test]
async fn test_submit_task_requires_agent_id() {
    let (app, relay) = setup(RelaySettings::default());
    let req = multipart_request(&[("answer", None, "42")]);
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["error"]
        .as_str()
        .unwrap()
        .contains("USED_AGENT_ID"));
    relay.with_state(|s| assert!(s.system_queue.is_empty()));
}

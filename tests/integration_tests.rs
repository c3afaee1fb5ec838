//! End-to-end integration tests: WebSocket connection and full
//! request/response cycle through a running server composed like the
//! binary composes it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use repl_server::Router;
use repl_services::{
    CompletionExtension, CompletionStrategies, DescribeExtension, InNsExtension, NamespaceIndex,
};
use repl_transport::{TransportConfig, TransportServer};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a server on a random port.
async fn start_test_server() -> (u16, Router, TransportServer) {
    let index = Arc::new(NamespaceIndex::core());
    let router = Router::builder()
        .extension(
            "completion",
            CompletionExtension::new(index.clone(), CompletionStrategies::builtin()),
        )
        .extension("namespace", InNsExtension::new(index))
        .extension("describe", DescribeExtension::new())
        .build()
        .unwrap();

    let config = TransportConfig {
        port: 0, // OS-assigned
        hostname: "127.0.0.1".into(),
        max_connections: Some(16),
    };

    let transport = TransportServer::start(config, router.clone()).await.unwrap();
    (transport.port(), router, transport)
}

async fn connect(port: u16) -> Ws {
    let url = format!("ws://127.0.0.1:{port}/ws");
    let (ws, _) = connect_async(&url).await.expect("Failed to connect");
    ws
}

async fn send(ws: &mut Ws, message: Value) {
    ws.send(Message::Text(serde_json::to_string(&message).unwrap().into()))
        .await
        .unwrap();
}

async fn recv(ws: &mut Ws) -> Value {
    let msg = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("Timeout waiting for response")
        .expect("Stream ended")
        .expect("WebSocket error");
    serde_json::from_str(&msg.into_text().unwrap()).unwrap()
}

/// Read frames until one for `id` carries `done`.
async fn recv_until_done(ws: &mut Ws, id: &str) -> Vec<Value> {
    let mut responses = Vec::new();
    loop {
        let response = recv(ws).await;
        if response["id"] != id {
            continue;
        }
        let done = response["status"]
            .as_array()
            .is_some_and(|s| s.contains(&json!("done")));
        responses.push(response);
        if done {
            return responses;
        }
    }
}

#[tokio::test]
async fn clone_then_complete_over_websocket() {
    let (port, _router, mut transport) = start_test_server().await;
    let mut ws = connect(port).await;

    send(&mut ws, json!({"id": "1", "op": "clone"})).await;
    let cloned = recv(&mut ws).await;
    assert_eq!(cloned["id"], "1");
    assert_eq!(cloned["status"], json!(["done"]));
    let session = cloned["new-session"].as_str().unwrap().to_string();

    send(
        &mut ws,
        json!({"id": "2", "op": "completions", "session": session, "prefix": "map", "ns": "core"}),
    )
    .await;
    let completed = recv(&mut ws).await;
    assert_eq!(completed["id"], "2");
    assert_eq!(completed["session"], json!(session));
    assert_eq!(completed["status"], json!(["done"]));
    let candidates: Vec<&str> = completed["completions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["candidate"].as_str().unwrap())
        .collect();
    assert_eq!(candidates, vec!["map", "map-indexed", "mapcat", "mapv"]);

    transport.stop().await;
}

#[tokio::test]
async fn error_statuses_over_websocket() {
    let (port, _router, mut transport) = start_test_server().await;
    let mut ws = connect(port).await;

    send(&mut ws, json!({"id": "a", "op": "completions", "prefix": "ma"})).await;
    let response = recv(&mut ws).await;
    assert_eq!(
        response["status"],
        json!(["completion-error", "done", "namespace-not-found"])
    );

    send(&mut ws, json!({"id": "b", "op": "bogus-op"})).await;
    let response = recv(&mut ws).await;
    assert_eq!(response["status"], json!(["error", "unknown-op"]));

    send(&mut ws, json!({"id": "c", "op": "completions", "session": "ghost"})).await;
    let response = recv(&mut ws).await;
    assert_eq!(response["status"], json!(["error", "unknown-session"]));

    ws.send(Message::Text(r#"{"id": "d"}"#.into())).await.unwrap();
    let response = recv(&mut ws).await;
    assert_eq!(response["id"], "d");
    assert_eq!(response["status"], json!(["error", "malformed-message"]));

    transport.stop().await;
}

#[tokio::test]
async fn sessions_are_shared_across_connections() {
    let (port, router, mut transport) = start_test_server().await;
    let mut first = connect(port).await;
    let mut second = connect(port).await;

    send(&mut first, json!({"id": "1", "op": "clone"})).await;
    let session = recv(&mut first).await["new-session"].as_str().unwrap().to_string();

    send(&mut first, json!({"id": "2", "op": "in-ns", "session": session, "ns": "core"})).await;
    recv_until_done(&mut first, "2").await;

    send(&mut second, json!({"id": "3", "op": "completions", "session": session, "prefix": "red"})).await;
    let response = recv(&mut second).await;
    assert_eq!(response["completions"][0]["candidate"], "reduce");

    send(&mut second, json!({"id": "4", "op": "ls-sessions"})).await;
    let listed = recv(&mut second).await;
    assert_eq!(listed["sessions"], json!([session]));

    send(&mut second, json!({"id": "5", "op": "close", "session": session})).await;
    recv_until_done(&mut second, "5").await;
    assert!(router.sessions().is_empty());

    transport.stop().await;
}

#[tokio::test]
async fn describe_over_websocket() {
    let (port, _router, mut transport) = start_test_server().await;
    let mut ws = connect(port).await;

    send(&mut ws, json!({"id": "d", "op": "describe", "verbose?": true})).await;
    let response = recv(&mut ws).await;
    assert_eq!(response["status"], json!(["done"]));
    assert!(response["ops"]["completions"]["requires"]["prefix"].is_string());
    assert!(response["versions"]["ultra-repl"]["version-string"].is_string());

    transport.stop().await;
}

#[tokio::test]
async fn health_endpoint() {
    let (port, _router, mut transport) = start_test_server().await;

    let body: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clients"], 0);

    transport.stop().await;
}

//! HTTP binding integration tests

use std::sync::Arc;
use std::time::Duration;

use servient::content::Content;
use servient::protocols::http::{HttpClient, HttpClientConfig, HttpServer};
use servient::resource::{AssetResourceListener, PropertyResourceListener};
use servient::{ContentSerdes, Error, Form, Operation, ProtocolClient, ProtocolServer, ServerState};

mod common;
use common::{LOCALHOST, TestResourceListener, base_url, http_server};

fn client() -> HttpClient {
    HttpClient::new(&HttpClientConfig::default()).unwrap()
}

#[tokio::test]
async fn test_read_returns_listener_content() {
    let server = http_server();
    let listener = TestResourceListener::new();
    server.add_resource("/", listener.clone());
    server.start().await.unwrap();

    let url = format!("{}/", base_url("http", server.port()));
    let content = client().read_resource(&Form::new(url)).await.unwrap();
    assert_eq!(&content.body[..], b"TEST");
    assert_eq!(content.media_type, "text/plain");
    assert_eq!(listener.last_operation(), Some(Operation::Read));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_every_verb_reaches_its_operation() {
    let server = http_server();
    let listener = TestResourceListener::new();
    server.add_resource("/thing", listener.clone());
    server.start().await.unwrap();

    let form = Form::new(format!("{}/thing", base_url("http", server.port())));
    let client = client();

    client
        .write_resource(&form, Content::new("text/plain", "x"))
        .await
        .unwrap();
    assert_eq!(listener.last_operation(), Some(Operation::Write));

    client.invoke_resource(&form, None).await.unwrap();
    assert_eq!(listener.last_operation(), Some(Operation::Invoke));

    client.unlink_resource(&form).await.unwrap();
    assert_eq!(listener.last_operation(), Some(Operation::Unlink));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_method_override_is_routed_by_verb_received() {
    let server = http_server();
    let listener = TestResourceListener::new();
    server.add_resource("/", listener.clone());
    server.start().await.unwrap();

    let form = Form::new(format!("{}/", base_url("http", server.port()))).with_method_name("POST");
    let content = client().read_resource(&form).await.unwrap();
    assert_eq!(&content.body[..], b"TEST");
    assert_eq!(listener.last_operation(), Some(Operation::Invoke));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_error_statuses_map_back_to_error_kinds() {
    let server = http_server();
    server.add_resource("/asset", Arc::new(AssetResourceListener::new("1")));
    server.start().await.unwrap();
    let base = base_url("http", server.port());
    let client = client();

    let err = client
        .read_resource(&Form::new(format!("{base}/missing")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = client
        .unlink_resource(&Form::new(format!("{base}/asset")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotImplemented(Operation::Unlink)));

    let err = client
        .write_resource(
            &Form::new(format!("{base}/asset")),
            Content::new("application/x-unknown", "?"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMediaType(_)));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_accept_selects_response_codec() {
    let serdes = Arc::new(ContentSerdes::new());
    let server = Arc::new(
        HttpServer::new(0)
            .with_address(LOCALHOST)
            .with_serdes(serdes.clone()),
    );
    server.add_resource(
        "/temperature",
        Arc::new(PropertyResourceListener::new(serdes.clone(), serde_json::json!(21.5))),
    );
    server.start().await.unwrap();

    let form = Form::new(format!("{}/temperature", base_url("http", server.port())))
        .with_content_type("application/cbor");
    let content = client().read_resource(&form).await.unwrap();
    assert_eq!(content.media_type, "application/cbor");
    assert_eq!(serdes.deserialize(&content).unwrap(), serde_json::json!(21.5));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_responses_carry_open_cors_header() {
    let server = http_server();
    server.add_resource("/", TestResourceListener::new());
    server.start().await.unwrap();

    let response = reqwest::Client::new()
        .get(format!("{}/", base_url("http", server.port())))
        .header("Origin", "http://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_port_in_use_leaves_first_server_serving() {
    let first = http_server();
    first.add_resource("/", TestResourceListener::new());
    first.start().await.unwrap();
    let port = first.port();

    let second = HttpServer::new(u16::try_from(port).unwrap()).with_address(LOCALHOST);
    let err = second.start().await.unwrap_err();
    assert!(matches!(err, Error::AddressInUse(_)));
    assert_eq!(second.port(), -1);
    assert_eq!(second.state(), ServerState::Stopped);

    let content = client()
        .read_resource(&Form::new(format!("{}/", base_url("http", port))))
        .await
        .unwrap();
    assert_eq!(&content.body[..], b"TEST");

    first.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_lets_in_flight_request_finish() {
    let server = http_server();
    server.add_resource("/slow", TestResourceListener::slow(Duration::from_millis(500)));
    server.start().await.unwrap();
    let url = format!("{}/slow", base_url("http", server.port()));

    let in_flight = {
        let form = Form::new(url.clone());
        tokio::spawn(async move { client().read_resource(&form).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stopping = {
        let server = server.clone();
        tokio::spawn(async move { server.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.state(), ServerState::Stopping);
    assert_eq!(server.port(), -1);

    stopping.await.unwrap().unwrap();
    assert_eq!(server.port(), -1);
    assert_eq!(server.state(), ServerState::Stopped);

    let content = in_flight.await.unwrap().unwrap();
    assert_eq!(&content.body[..], b"TEST");

    let err = client().read_resource(&Form::new(url)).await.unwrap_err();
    assert!(matches!(err, Error::Http(e) if e.is_connect()));
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let server = http_server();
    server.start().await.unwrap();
    let port = server.port();
    server.start().await.unwrap();
    assert_eq!(server.port(), port);

    server.stop().await.unwrap();
    server.stop().await.unwrap();
    assert_eq!(server.port(), -1);
}

//! End-to-end tests: both protocol engines paired over the loopback
//! transport, with a live HTTP origin bound to a random local port.
//!
//! The central goes through its full path - scan, connect, discover,
//! subscribe, write sequence, notification rendezvous, response reads -
//! and the gateway proxies real HTTP traffic through ureq.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;

use hps_proxy::central::{ClientConfig, HpsClient, HpsRequest};
use hps_proxy::peripheral::{ProxySession, UreqOrigin};
use hps_proxy::protocol::schema;
use hps_proxy::protocol::Method;
use hps_proxy::transport::loopback::LoopbackRadio;
use hps_proxy::transport::{AttError, GattHandlers};
use hps_proxy::HpsError;

/// Start the test origin on a random port.
async fn spawn_origin() -> SocketAddr {
    let app = Router::new()
        .route(
            "/hello.txt",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hello\n") }),
        )
        .route(
            "/method",
            post(|body: String| async move {
                (
                    StatusCode::CREATED,
                    format!("You sent a POST, with body {body}"),
                )
            }),
        )
        .route(
            "/auth",
            get(|headers: HeaderMap| async move {
                match headers.get("x-api-key") {
                    Some(key) => (StatusCode::OK, format!("key={}", key.to_str().unwrap())),
                    None => (StatusCode::UNAUTHORIZED, "no key".to_string()),
                }
            }),
        )
        .route("/large", get(|| async { vec![0x61u8; 1024] }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A gateway session fetching through ureq with the given origin timeout.
fn gateway_session(origin_timeout: Duration) -> Arc<ProxySession> {
    Arc::new(ProxySession::new(Arc::new(UreqOrigin::new(origin_timeout))))
}

/// A client whose radio sees exactly one gateway, advertising the
/// default device name.
fn loopback_client(
    session: Arc<ProxySession>,
    response_timeout: Duration,
) -> HpsClient<LoopbackRadio> {
    let mut radio = LoopbackRadio::new();
    radio.attach(schema::DEVICE_NAME, session);
    HpsClient::with_config(
        radio,
        ClientConfig {
            device_name: schema::DEVICE_NAME.to_string(),
            connect_timeout: Duration::from_secs(2),
            response_timeout,
        },
    )
}

#[tokio::test]
async fn test_get_small_file() {
    let origin = spawn_origin().await;
    let session = gateway_session(Duration::from_secs(3));
    let client = loopback_client(session, Duration::from_secs(3));

    let request = HpsRequest::new(&format!("http://{origin}/hello.txt"), Method::Get).unwrap();
    let response = client.fetch(&request).await.unwrap();

    assert_eq!(response.status.status_code, 200);
    assert!(response.status.headers_received);
    assert!(!response.status.headers_truncated);
    assert!(response.status.body_received);
    assert!(!response.status.body_truncated);
    assert_eq!(response.body, b"hello\n");
    assert!(response
        .headers
        .get("content-type")
        .unwrap()
        .starts_with("text/plain"));
}

#[tokio::test]
async fn test_post_with_body() {
    let origin = spawn_origin().await;
    let session = gateway_session(Duration::from_secs(3));
    let client = loopback_client(session, Duration::from_secs(3));

    let request = HpsRequest::new(&format!("http://{origin}/method"), Method::Post)
        .unwrap()
        .body("payload");
    let response = client.fetch(&request).await.unwrap();

    assert_eq!(response.status.status_code, 201);
    assert_eq!(response.body, b"You sent a POST, with body payload");
}

#[tokio::test]
async fn test_request_headers_reach_the_origin() {
    let origin = spawn_origin().await;
    let session = gateway_session(Duration::from_secs(3));
    let client = loopback_client(session, Duration::from_secs(3));

    let request = HpsRequest::new(&format!("http://{origin}/auth"), Method::Get)
        .unwrap()
        .header("X-Api-Key", "xyzabc");
    let response = client.fetch(&request).await.unwrap();

    assert_eq!(response.status.status_code, 200);
    assert_eq!(response.body, b"key=xyzabc");
}

#[tokio::test]
async fn test_large_body_is_truncated_at_the_ceiling() {
    let origin = spawn_origin().await;
    let session = gateway_session(Duration::from_secs(3));
    let client = loopback_client(session, Duration::from_secs(3));

    let request = HpsRequest::new(&format!("http://{origin}/large"), Method::Get).unwrap();
    let response = client.fetch(&request).await.unwrap();

    assert_eq!(response.status.status_code, 200);
    assert!(response.status.body_received);
    assert!(response.status.body_truncated);
    assert_eq!(response.body.len(), schema::BODY_MAX_OCTETS);
}

#[tokio::test]
async fn test_unreachable_origin_synthesizes_bad_gateway() {
    // Reserve a port, then close it again.
    let unreachable = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let session = gateway_session(Duration::from_secs(2));
    let client = loopback_client(session, Duration::from_secs(3));

    let request = HpsRequest::new(&format!("http://{unreachable}/x"), Method::Get).unwrap();
    let response = client.fetch(&request).await.unwrap();

    assert_eq!(response.status.status_code, 502);
    assert!(!response.status.headers_received);
    assert!(!response.status.headers_truncated);
    assert!(!response.status.body_received);
    assert!(!response.status.body_truncated);
    assert!(response.body.is_empty());
    assert!(response.headers.is_empty());
}

#[tokio::test]
async fn test_blocked_origin_times_the_central_out() {
    let origin = spawn_origin().await;
    // The origin call outlives the central's patience.
    let session = gateway_session(Duration::from_secs(3));
    let client = loopback_client(session, Duration::from_secs(1));

    let request = HpsRequest::new(&format!("http://{origin}/slow"), Method::Get).unwrap();
    let err = client.fetch(&request).await.unwrap_err();

    assert!(matches!(err, HpsError::ResponseTimeout));
}

#[tokio::test]
async fn test_invalid_opcode_is_rejected_without_notification() {
    let session = gateway_session(Duration::from_secs(2));

    session
        .handle_write(schema::HTTP_URI, b"example.com/x")
        .await
        .unwrap();
    let err = session
        .handle_write(schema::HTTP_CONTROL, &[0x0f])
        .await
        .unwrap_err();
    assert_eq!(err, AttError::UnexpectedError);

    // No notification follows, and the slot is clean for the next request.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), session.next_notification())
            .await
            .is_err()
    );
    assert!(session.is_idle().await);
}

#[tokio::test]
async fn test_absent_gateway_times_the_connect_out() {
    let radio = LoopbackRadio::new();
    let client = HpsClient::with_config(
        radio,
        ClientConfig {
            device_name: schema::DEVICE_NAME.to_string(),
            connect_timeout: Duration::from_millis(300),
            response_timeout: Duration::from_secs(1),
        },
    );

    let request = HpsRequest::new("http://127.0.0.1:8100/hello.txt", Method::Get).unwrap();
    let err = client.fetch(&request).await.unwrap_err();
    assert!(matches!(err, HpsError::ConnectTimeout));
}

#[tokio::test]
async fn test_gateway_with_other_name_is_skipped() {
    let session = gateway_session(Duration::from_secs(2));
    let mut radio = LoopbackRadio::new();
    radio.attach("someone/else", session);
    let client = HpsClient::with_config(
        radio,
        ClientConfig {
            device_name: schema::DEVICE_NAME.to_string(),
            connect_timeout: Duration::from_millis(300),
            response_timeout: Duration::from_secs(1),
        },
    );

    let request = HpsRequest::new("http://127.0.0.1:8100/hello.txt", Method::Get).unwrap();
    let err = client.fetch(&request).await.unwrap_err();
    assert!(matches!(err, HpsError::ConnectTimeout));
}

#[tokio::test]
async fn test_back_to_back_requests_on_one_gateway() {
    let origin = spawn_origin().await;
    let session = gateway_session(Duration::from_secs(3));
    let client = loopback_client(session, Duration::from_secs(3));

    let first = HpsRequest::new(&format!("http://{origin}/hello.txt"), Method::Get).unwrap();
    let second = HpsRequest::new(&format!("http://{origin}/method"), Method::Post)
        .unwrap()
        .body("again");

    let response = client.fetch(&first).await.unwrap();
    assert_eq!(response.status.status_code, 200);

    let response = client.fetch(&second).await.unwrap();
    assert_eq!(response.status.status_code, 201);
    assert_eq!(response.body, b"You sent a POST, with body again");
}

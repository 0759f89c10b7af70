//! Per-connection gateway session.
//!
//! Owns the two protocol slots: the request slot that characteristic
//! writes accumulate into, and the response slot that the HTTP dispatch
//! publishes. A control-point write snapshots the request slot, clears it
//! for the next request, and spawns the outbound call as a detached task;
//! the notify pump picks the published response up exactly once.
//!
//! All slot access goes through one mutex, and response publication is
//! signaled to the pump through a [`Notify`], so the pump never observes a
//! half-written response.

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::dispatch::{OriginClient, OriginRequest, OriginResponse};
use crate::error::HpsError;
use crate::protocol::schema::{self, BODY_MAX_OCTETS};
use crate::protocol::{Headers, Method, NotifyStatus, Opcode, Scheme};
use crate::transport::{AttError, AttResult, GattHandlers};

/// Accumulates the components of the next proxied request.
#[derive(Debug, Clone, Default)]
struct RequestSlot {
    uri: String,
    headers: String,
    body: Vec<u8>,
}

impl RequestSlot {
    fn is_empty(&self) -> bool {
        self.uri.is_empty() && self.headers.is_empty() && self.body.is_empty()
    }
}

/// A completed (or synthesized) response awaiting pickup by the central.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// Status code and data flags, as notified.
    pub status: NotifyStatus,
    /// Encoded header block served on Headers reads.
    pub headers: Bytes,
    /// Body octets served on Body reads, already capped.
    pub body: Bytes,
    /// Set once the status notification went out; blocks re-notification.
    notified: bool,
}

impl GatewayResponse {
    fn from_origin(origin: OriginResponse) -> Self {
        let (header_bytes, headers_truncated) = origin.headers.encode();
        let body_received = !origin.body.is_empty();
        let body_truncated = origin.body.len() > BODY_MAX_OCTETS;
        let mut body = origin.body;
        body.truncate(BODY_MAX_OCTETS);

        Self {
            status: NotifyStatus {
                status_code: origin.status,
                headers_received: true,
                headers_truncated,
                body_received,
                body_truncated,
            },
            headers: Bytes::from(header_bytes),
            body: Bytes::from(body),
            notified: false,
        }
    }

    /// Failure stand-in: bare status code, no data, all flags clear.
    fn synthetic(status_code: u16) -> Self {
        Self {
            status: NotifyStatus {
                status_code,
                ..Default::default()
            },
            headers: Bytes::new(),
            body: Bytes::new(),
            notified: false,
        }
    }
}

#[derive(Default)]
struct SessionState {
    request: RequestSlot,
    response: Option<GatewayResponse>,
    dispatch: Option<JoinHandle<()>>,
}

/// The peripheral-side protocol engine for one connection.
///
/// Implements [`GattHandlers`]; a server binding (bluer, loopback) routes
/// characteristic traffic here and pumps [`ProxySession::next_notification`]
/// into the status subscription.
pub struct ProxySession {
    state: Arc<Mutex<SessionState>>,
    response_ready: Arc<Notify>,
    origin: Arc<dyn OriginClient>,
}

impl ProxySession {
    /// Create a session dispatching through `origin`.
    pub fn new(origin: Arc<dyn OriginClient>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            response_ready: Arc::new(Notify::new()),
            origin,
        }
    }

    /// True when no request components are stored and no dispatch is
    /// running. Diagnostic hook, also used by the tests.
    pub async fn is_idle(&self) -> bool {
        let state = self.state.lock().await;
        let dispatching = state
            .dispatch
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false);
        state.request.is_empty() && !dispatching
    }

    async fn write_control(&self, value: &[u8]) -> AttResult<()> {
        let mut state = self.state.lock().await;

        let Some(&byte) = value.first() else {
            tracing::error!("empty control-point write");
            state.request = RequestSlot::default();
            return Err(AttError::UnexpectedError);
        };

        match Opcode::decode(byte) {
            Err(err) => {
                tracing::error!(%err, "control-point write rejected");
                state.request = RequestSlot::default();
                Err(AttError::UnexpectedError)
            }
            Ok(Opcode::Cancel) => {
                tracing::info!("request cancelled");
                if let Some(task) = state.dispatch.take() {
                    task.abort();
                }
                state.request = RequestSlot::default();
                state.response = None;
                Ok(())
            }
            Ok(Opcode::Request { method, scheme }) => {
                tracing::debug!(%method, %scheme, "control-point write, dispatching");

                // Snapshot and reset, so writes for the next request can
                // start while this one is in flight.
                let slot = mem::take(&mut state.request);
                state.response = None;
                if let Some(task) = state.dispatch.take() {
                    task.abort();
                }

                let origin = self.origin.clone();
                let shared = self.state.clone();
                let ready = self.response_ready.clone();
                state.dispatch = Some(tokio::spawn(async move {
                    dispatch(origin, shared, ready, method, scheme, slot).await;
                }));
                Ok(())
            }
        }
    }
}

/// Run the outbound call and publish the outcome into the response slot.
async fn dispatch(
    origin: Arc<dyn OriginClient>,
    state: Arc<Mutex<SessionState>>,
    ready: Arc<Notify>,
    method: Method,
    scheme: Scheme,
    slot: RequestSlot,
) {
    let request = OriginRequest {
        method,
        scheme,
        uri: slot.uri,
        headers: Headers::decode(slot.headers.as_bytes()),
        body: slot.body,
    };

    let response = match origin.fetch(request).await {
        Ok(origin_response) => GatewayResponse::from_origin(origin_response),
        Err(HpsError::UpstreamBody(err)) => {
            tracing::error!(%err, "reading origin response body failed");
            GatewayResponse::synthetic(500)
        }
        Err(err) => {
            tracing::error!(%err, "origin call failed");
            GatewayResponse::synthetic(502)
        }
    };

    tracing::debug!(
        status = response.status.status_code,
        "response ready, waking notify pump"
    );
    let mut guard = state.lock().await;
    guard.response = Some(response);
    drop(guard);
    ready.notify_one();
}

#[async_trait]
impl GattHandlers for ProxySession {
    async fn handle_write(&self, characteristic: Uuid, value: &[u8]) -> AttResult<()> {
        if characteristic == schema::HTTP_URI {
            let mut state = self.state.lock().await;
            state.request.uri = String::from_utf8_lossy(value).into_owned();
            tracing::debug!(uri = %state.request.uri, "write URI");
            Ok(())
        } else if characteristic == schema::HTTP_HEADERS {
            let mut state = self.state.lock().await;
            state.request.headers = String::from_utf8_lossy(value).into_owned();
            tracing::debug!(headers = %state.request.headers, "write headers");
            Ok(())
        } else if characteristic == schema::HTTP_BODY {
            let mut state = self.state.lock().await;
            state.request.body = value.to_vec();
            tracing::debug!(len = value.len(), "write body");
            Ok(())
        } else if characteristic == schema::HTTP_CONTROL {
            self.write_control(value).await
        } else {
            tracing::warn!(%characteristic, "write to unhandled characteristic");
            Err(AttError::WriteNotPermitted)
        }
    }

    async fn handle_read(&self, characteristic: Uuid) -> AttResult<Vec<u8>> {
        let state = self.state.lock().await;
        if characteristic == schema::HTTP_HEADERS {
            match &state.response {
                Some(response) => Ok(response.headers.to_vec()),
                None => {
                    tracing::warn!("read of response headers before response received");
                    Ok(Vec::new())
                }
            }
        } else if characteristic == schema::HTTP_BODY {
            match &state.response {
                Some(response) => Ok(response.body.to_vec()),
                None => {
                    tracing::warn!("read of response body before response received");
                    Ok(Vec::new())
                }
            }
        } else {
            tracing::warn!(%characteristic, "read of unhandled characteristic");
            Err(AttError::ReadNotPermitted)
        }
    }

    async fn next_notification(&self) -> (Uuid, Vec<u8>) {
        loop {
            let pending = self.response_ready.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(response) = state.response.as_mut() {
                    if !response.notified {
                        response.notified = true;
                        tracing::debug!(
                            status = response.status.status_code,
                            "emitting status notification"
                        );
                        return (schema::HTTP_STATUS, response.status.encode().to_vec());
                    }
                }
            }
            pending.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Origin client that replays a scripted outcome and records what it
    /// was asked to fetch.
    struct ScriptedOrigin {
        outcome: Mutex<Option<crate::error::Result<OriginResponse>>>,
        delay: Duration,
        requests: Mutex<Vec<OriginRequest>>,
    }

    impl ScriptedOrigin {
        fn ok(response: OriginResponse) -> Arc<Self> {
            Self::with_outcome(Ok(response), Duration::ZERO)
        }

        fn err(err: HpsError) -> Arc<Self> {
            Self::with_outcome(Err(err), Duration::ZERO)
        }

        fn with_outcome(
            outcome: crate::error::Result<OriginResponse>,
            delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(outcome)),
                delay,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OriginClient for ScriptedOrigin {
        async fn fetch(&self, request: OriginRequest) -> crate::error::Result<OriginResponse> {
            self.requests.lock().await.push(request);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome
                .lock()
                .await
                .take()
                .unwrap_or_else(|| Err(HpsError::Upstream("script exhausted".into())))
        }
    }

    fn ok_response() -> OriginResponse {
        OriginResponse {
            status: 200,
            headers: [("Content-Type", "text/plain")].into_iter().collect(),
            body: b"hello\n".to_vec(),
        }
    }

    async fn next_status(session: &ProxySession) -> NotifyStatus {
        let (characteristic, payload) = timeout(
            Duration::from_secs(1),
            session.next_notification(),
        )
        .await
        .expect("notification expected");
        assert_eq!(characteristic, schema::HTTP_STATUS);
        NotifyStatus::decode(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_full_request_cycle() {
        let origin = ScriptedOrigin::ok(ok_response());
        let session = ProxySession::new(origin.clone());

        session
            .handle_write(schema::HTTP_URI, b"example.com/hello.txt")
            .await
            .unwrap();
        session
            .handle_write(schema::HTTP_HEADERS, b"Accept=text/plain")
            .await
            .unwrap();
        session.handle_write(schema::HTTP_BODY, b"").await.unwrap();
        session
            .handle_write(schema::HTTP_CONTROL, &[0x01])
            .await
            .unwrap();

        let status = next_status(&session).await;
        assert_eq!(status.status_code, 200);
        assert!(status.headers_received);
        assert!(!status.headers_truncated);
        assert!(status.body_received);
        assert!(!status.body_truncated);

        assert_eq!(
            session.handle_read(schema::HTTP_BODY).await.unwrap(),
            b"hello\n"
        );
        let headers =
            Headers::decode(&session.handle_read(schema::HTTP_HEADERS).await.unwrap());
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));

        let requests = origin.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].scheme, Scheme::Http);
        assert_eq!(requests[0].uri, "example.com/hello.txt");
        assert_eq!(requests[0].headers.get("Accept"), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_slot_resets_after_control_write() {
        let origin = ScriptedOrigin::ok(ok_response());
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_URI, b"example.com/a")
            .await
            .unwrap();
        session
            .handle_write(schema::HTTP_CONTROL, &[0x01])
            .await
            .unwrap();

        // The slot belongs to the next request now.
        next_status(&session).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.is_idle().await);
    }

    #[tokio::test]
    async fn test_transport_failure_synthesizes_502() {
        let origin = ScriptedOrigin::err(HpsError::Upstream("connection refused".into()));
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_URI, b"127.0.0.1:1/closed")
            .await
            .unwrap();
        session
            .handle_write(schema::HTTP_CONTROL, &[0x01])
            .await
            .unwrap();

        let status = next_status(&session).await;
        assert_eq!(status.status_code, 502);
        assert!(!status.headers_received);
        assert!(!status.headers_truncated);
        assert!(!status.body_received);
        assert!(!status.body_truncated);
        assert!(session
            .handle_read(schema::HTTP_BODY)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_body_read_failure_synthesizes_500() {
        let origin = ScriptedOrigin::err(HpsError::UpstreamBody("reset mid-body".into()));
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_CONTROL, &[0x01])
            .await
            .unwrap();

        let status = next_status(&session).await;
        assert_eq!(status.status_code, 500);
        assert_eq!(status.data_status(), 0);
    }

    #[tokio::test]
    async fn test_body_truncated_to_ceiling() {
        let origin = ScriptedOrigin::ok(OriginResponse {
            status: 200,
            headers: Headers::new(),
            body: vec![0x61; BODY_MAX_OCTETS + 1],
        });
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_CONTROL, &[0x01])
            .await
            .unwrap();

        let status = next_status(&session).await;
        assert!(status.body_received);
        assert!(status.body_truncated);
        assert_eq!(
            session.handle_read(schema::HTTP_BODY).await.unwrap().len(),
            BODY_MAX_OCTETS
        );
    }

    #[tokio::test]
    async fn test_truncated_implies_received() {
        let big_value = "v".repeat(schema::HEADER_MAX_OCTETS);
        let origin = ScriptedOrigin::ok(OriginResponse {
            status: 200,
            headers: [("X-Big", big_value.as_str())].into_iter().collect(),
            body: vec![0x61; BODY_MAX_OCTETS * 2],
        });
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_CONTROL, &[0x06])
            .await
            .unwrap();

        let status = next_status(&session).await;
        assert!(status.headers_truncated);
        assert!(status.headers_received);
        assert!(status.body_truncated);
        assert!(status.body_received);
    }

    #[tokio::test]
    async fn test_empty_body_is_not_received() {
        let origin = ScriptedOrigin::ok(OriginResponse {
            status: 204,
            headers: Headers::new(),
            body: Vec::new(),
        });
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_CONTROL, &[0x02])
            .await
            .unwrap();

        let status = next_status(&session).await;
        assert_eq!(status.status_code, 204);
        assert!(status.headers_received);
        assert!(!status.body_received);
        assert!(!status.body_truncated);
    }

    #[tokio::test]
    async fn test_invalid_opcode_rejected_and_slot_cleared() {
        let origin = ScriptedOrigin::ok(ok_response());
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_URI, b"example.com/x")
            .await
            .unwrap();

        for byte in [0x00u8, 0x0c, 0x0f] {
            let err = session
                .handle_write(schema::HTTP_CONTROL, &[byte])
                .await
                .unwrap_err();
            assert_eq!(err, AttError::UnexpectedError);
        }
        assert!(session.is_idle().await);

        // No notification may follow a rejected control write.
        assert!(timeout(Duration::from_millis(100), session.next_notification())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_control_write_rejected() {
        let origin = ScriptedOrigin::ok(ok_response());
        let session = ProxySession::new(origin);

        let err = session
            .handle_write(schema::HTTP_CONTROL, &[])
            .await
            .unwrap_err();
        assert_eq!(err, AttError::UnexpectedError);
    }

    #[tokio::test]
    async fn test_cancel_aborts_dispatch() {
        let origin =
            ScriptedOrigin::with_outcome(Ok(ok_response()), Duration::from_secs(30));
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_URI, b"example.com/slow")
            .await
            .unwrap();
        session
            .handle_write(schema::HTTP_CONTROL, &[0x01])
            .await
            .unwrap();
        session
            .handle_write(schema::HTTP_CONTROL, &[0x0b])
            .await
            .unwrap();

        assert!(timeout(Duration::from_millis(100), session.next_notification())
            .await
            .is_err());
        assert!(session.is_idle().await);
    }

    #[tokio::test]
    async fn test_read_before_response_serves_empty_payload() {
        let origin = ScriptedOrigin::ok(ok_response());
        let session = ProxySession::new(origin);

        assert!(session
            .handle_read(schema::HTTP_HEADERS)
            .await
            .unwrap()
            .is_empty());
        assert!(session
            .handle_read(schema::HTTP_BODY)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reads_of_write_only_characteristics_rejected() {
        let origin = ScriptedOrigin::ok(ok_response());
        let session = ProxySession::new(origin);

        for characteristic in [schema::HTTP_URI, schema::HTTP_CONTROL, schema::HTTP_STATUS] {
            let err = session.handle_read(characteristic).await.unwrap_err();
            assert_eq!(err, AttError::ReadNotPermitted);
        }
    }

    #[tokio::test]
    async fn test_notification_emitted_once_per_response() {
        let origin = ScriptedOrigin::ok(ok_response());
        let session = ProxySession::new(origin);

        session
            .handle_write(schema::HTTP_CONTROL, &[0x01])
            .await
            .unwrap();

        next_status(&session).await;
        assert!(timeout(Duration::from_millis(100), session.next_notification())
            .await
            .is_err());
    }
}

//! Central module - the client side of the proxy.
//!
//! [`HpsClient`] drives one proxied request over any
//! [`CentralRadio`]: scan until the named gateway appears, connect,
//! discover the service, subscribe to status notifications, perform the
//! URI → Headers → Body → Control write sequence, await the notification,
//! then read the response back.
//!
//! # Example
//!
//! ```ignore
//! use hps_proxy::central::{HpsClient, HpsRequest};
//! use hps_proxy::protocol::Method;
//! use hps_proxy::transport::btle::BtleplugRadio;
//!
//! #[tokio::main]
//! async fn main() -> hps_proxy::Result<()> {
//!     let radio = BtleplugRadio::new().await?;
//!     let client = HpsClient::new(radio);
//!     let request = HpsRequest::new("http://127.0.0.1:8100/hello.txt", Method::Get)?;
//!     let response = client.fetch(&request).await?;
//!     println!("{}", response.status.status_code);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{HpsError, Result};
use crate::protocol::schema::{self, REQUESTED_MTU};
use crate::protocol::{Headers, Method, NotifyStatus, Opcode, Scheme};
use crate::transport::{CentralRadio, PeripheralLink, RemoteCharacteristic, WriteKind};

/// Cadence of discovery polls while scanning for the gateway.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Advertised local name the scan matches exactly.
    pub device_name: String,
    /// Budget from scan start to established connection.
    pub connect_timeout: Duration,
    /// Budget from the control-point write to the status notification.
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_name: schema::DEVICE_NAME.to_string(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
        }
    }
}

/// A request ready to be written into the gateway's characteristics.
#[derive(Debug, Clone)]
pub struct HpsRequest {
    method: Method,
    scheme: Scheme,
    /// Host plus escaped path; the scheme travels in the control opcode.
    target: String,
    headers: Headers,
    body: Vec<u8>,
}

impl HpsRequest {
    /// Parse and validate `url`, rejecting anything the opcode table
    /// cannot carry before any radio traffic happens.
    pub fn new(url: &str, method: Method) -> Result<Self> {
        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            HpsError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        let scheme: Scheme = match uri.scheme_str() {
            Some(s) => s.parse()?,
            None => {
                return Err(HpsError::InvalidUrl {
                    url: url.to_string(),
                    reason: "missing scheme".into(),
                })
            }
        };
        let authority = uri.authority().ok_or_else(|| HpsError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".into(),
        })?;
        let target = format!("{}{}", authority, uri.path());

        Ok(Self {
            method,
            scheme,
            target,
            headers: Headers::new(),
            body: Vec::new(),
        })
    }

    /// Add a request header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Host plus path, as written to the URI characteristic.
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// The assembled result of one proxied request.
#[derive(Debug, Clone)]
pub struct HpsResponse {
    /// Status code and data flags from the notification.
    pub status: NotifyStatus,
    /// Decoded response headers.
    pub headers: Headers,
    /// Raw header block as read from the characteristic.
    pub raw_headers: Vec<u8>,
    /// Response body octets.
    pub body: Vec<u8>,
}

/// Log what discovery produced (descriptors included) and verify every
/// characteristic the schema requires is present.
fn check_characteristics(discovered: &[RemoteCharacteristic]) -> Result<()> {
    for characteristic in discovered {
        match schema::spec_for(characteristic.uuid) {
            Some(spec) => tracing::debug!(
                name = spec.name,
                uuid = %characteristic.uuid,
                descriptors = characteristic.descriptors.len(),
                "discovered characteristic"
            ),
            None => tracing::debug!(
                uuid = %characteristic.uuid,
                "discovered characteristic outside the service schema"
            ),
        }
        for descriptor in &characteristic.descriptors {
            tracing::debug!(%descriptor, "discovered descriptor");
        }
    }
    for spec in &schema::CHARACTERISTICS {
        if !discovered.iter().any(|c| c.uuid == spec.uuid) {
            return Err(HpsError::CharacteristicNotFound(spec.name));
        }
    }
    Ok(())
}

/// HPS central client over an abstract radio.
pub struct HpsClient<R: CentralRadio> {
    radio: R,
    config: ClientConfig,
}

impl<R: CentralRadio> HpsClient<R> {
    /// Client with default configuration.
    pub fn new(radio: R) -> Self {
        Self::with_config(radio, ClientConfig::default())
    }

    /// Client with explicit configuration.
    pub fn with_config(radio: R, config: ClientConfig) -> Self {
        Self { radio, config }
    }

    /// Execute one proxied request: locate the gateway, run the write
    /// sequence, await the status notification, read the response.
    ///
    /// The connection is torn down before returning, on success and on
    /// failure alike.
    pub async fn fetch(&self, request: &HpsRequest) -> Result<HpsResponse> {
        let link = self.locate_gateway().await?;
        let outcome = self.call(&link, request).await;
        if let Err(err) = link.disconnect().await {
            tracing::debug!(%err, "disconnect failed");
        }
        outcome
    }

    /// Scan until a peripheral advertising the configured name shows up,
    /// or the connect timeout expires.
    async fn locate_gateway(&self) -> Result<R::Link> {
        tracing::debug!(name = %self.config.device_name, "start periodic scan");
        let deadline = Instant::now() + self.config.connect_timeout;
        self.radio.start_scan().await?;

        let found = 'scan: loop {
            if Instant::now() >= deadline {
                let _ = self.radio.stop_scan().await;
                tracing::debug!("connect timeout expired, stopping scan");
                return Err(HpsError::ConnectTimeout);
            }
            for link in self.radio.discovered().await? {
                match link.local_name().await? {
                    Some(name) if name == self.config.device_name => {
                        tracing::info!(%name, "found gateway");
                        break 'scan link;
                    }
                    other => {
                        tracing::debug!(name = ?other, "skipping peripheral");
                    }
                }
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        };

        self.radio.stop_scan().await?;
        Ok(found)
    }

    async fn call(&self, link: &R::Link, request: &HpsRequest) -> Result<HpsResponse> {
        link.connect().await?;
        tracing::debug!("connected");
        link.request_mtu(REQUESTED_MTU).await?;

        let discovered = link.discover_service(schema::SERVICE_UUID).await?;
        if discovered.is_empty() {
            return Err(HpsError::ServiceNotFound);
        }
        check_characteristics(&discovered)?;

        // Subscribe before writing so the notification cannot race the
        // control write.
        let mut notifications = link.subscribe(schema::HTTP_STATUS).await?;
        let (status_tx, mut status_rx) = mpsc::channel::<Result<NotifyStatus>>(1);
        let watcher = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.characteristic != schema::HTTP_STATUS {
                    tracing::warn!(
                        characteristic = %notification.characteristic,
                        "notification from unknown characteristic"
                    );
                    continue;
                }
                let decoded = NotifyStatus::decode(&notification.value);
                if let Err(err) = &decoded {
                    tracing::error!(%err, "decoding status notification failed");
                }
                if status_tx.try_send(decoded).is_err() {
                    tracing::debug!("late notification discarded");
                }
            }
        });

        let outcome = self.transact(link, request, &mut status_rx).await;
        watcher.abort();
        let _ = link.unsubscribe(schema::HTTP_STATUS).await;
        outcome
    }

    /// The write sequence, the notification rendezvous, and the response
    /// reads.
    async fn transact(
        &self,
        link: &R::Link,
        request: &HpsRequest,
        status_rx: &mut mpsc::Receiver<Result<NotifyStatus>>,
    ) -> Result<HpsResponse> {
        tracing::debug!(uri = %request.target, method = %request.method, "write URI");
        link.write(
            schema::HTTP_URI,
            request.target.as_bytes(),
            WriteKind::WithResponse,
        )
        .await?;

        let (header_bytes, truncated) = request.headers.encode();
        if truncated {
            tracing::warn!("request headers exceed the block ceiling, sending a prefix");
        }
        tracing::debug!(len = header_bytes.len(), "write headers");
        link.write(schema::HTTP_HEADERS, &header_bytes, WriteKind::WithResponse)
            .await?;

        tracing::debug!(len = request.body.len(), "write body");
        link.write(schema::HTTP_BODY, &request.body, WriteKind::WithResponse)
            .await?;

        let opcode = Opcode::Request {
            method: request.method,
            scheme: request.scheme,
        }
        .encode();
        tracing::debug!(opcode, "write control point");
        link.write(schema::HTTP_CONTROL, &[opcode], WriteKind::WithoutResponse)
            .await?;

        tracing::debug!(
            timeout = ?self.config.response_timeout,
            "awaiting status notification"
        );
        let status = match tokio::time::timeout(self.config.response_timeout, status_rx.recv())
            .await
        {
            Err(_) => {
                tracing::warn!("response timeout expired, no notification received");
                return Err(HpsError::ResponseTimeout);
            }
            Ok(None) => return Err(HpsError::Disconnected),
            Ok(Some(decoded)) => decoded?,
        };
        tracing::debug!(
            status = status.status_code,
            headers_received = status.headers_received,
            headers_truncated = status.headers_truncated,
            body_received = status.body_received,
            body_truncated = status.body_truncated,
            "notification received"
        );

        let body = link.read(schema::HTTP_BODY).await?;
        tracing::debug!(len = body.len(), "read body");
        let raw_headers = link.read(schema::HTTP_HEADERS).await?;
        tracing::debug!(len = raw_headers.len(), "read headers");

        Ok(HpsResponse {
            status,
            headers: Headers::decode(&raw_headers),
            raw_headers,
            body,
        })
    }
}

//! Outbound HTTP dispatch for the gateway.
//!
//! The session snapshots a proxied request into an [`OriginRequest`] and
//! hands it to an [`OriginClient`]. The trait keeps the engine independent
//! of any particular HTTP library; [`UreqOrigin`] is the stock
//! implementation, and tests substitute scripted clients.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{HpsError, Result};
use crate::protocol::{Headers, Method, Scheme};

/// A proxied request, snapshotted from the characteristic slots.
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub method: Method,
    pub scheme: Scheme,
    /// Host plus escaped path, exactly as written to the URI
    /// characteristic. The scheme travels in the control opcode instead.
    pub uri: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl OriginRequest {
    /// Full URL for the outbound call.
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.uri)
    }
}

/// What the origin answered.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// An HTTP client capable of executing one proxied request.
///
/// Failures are split in two: [`HpsError::Upstream`] when no response was
/// obtained at all (the gateway synthesizes a 502) and
/// [`HpsError::UpstreamBody`] when the response arrived but its body could
/// not be read (synthesized 500).
#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn fetch(&self, request: OriginRequest) -> Result<OriginResponse>;
}

/// [`OriginClient`] backed by a blocking `ureq` agent.
///
/// Each fetch runs on the blocking thread pool so the GATT callbacks never
/// wait on the network. Non-2xx statuses are data, not errors; the status
/// code travels back to the central as-is.
#[derive(Clone)]
pub struct UreqOrigin {
    agent: ureq::Agent,
}

impl UreqOrigin {
    /// Create an agent with a global timeout, which should match the
    /// central's response timeout.
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.new_agent(),
        }
    }
}

#[async_trait]
impl OriginClient for UreqOrigin {
    async fn fetch(&self, request: OriginRequest) -> Result<OriginResponse> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &request))
            .await
            .map_err(|e| HpsError::Upstream(e.to_string()))?
    }
}

fn fetch_blocking(agent: &ureq::Agent, request: &OriginRequest) -> Result<OriginResponse> {
    let url = request.url();
    tracing::debug!(method = %request.method, %url, "proxying request");

    let mut response = match request.method {
        Method::Get => apply_headers(agent.get(&url), &request.headers).call(),
        Method::Head => apply_headers(agent.head(&url), &request.headers).call(),
        Method::Delete => apply_headers(agent.delete(&url), &request.headers).call(),
        Method::Post => {
            apply_headers(agent.post(&url), &request.headers).send(&request.body[..])
        }
        Method::Put => apply_headers(agent.put(&url), &request.headers).send(&request.body[..]),
    }
    .map_err(|e| HpsError::Upstream(e.to_string()))?;

    let status = response.status().as_u16();
    let mut headers = Headers::new();
    for (name, value) in response.headers() {
        headers.append(name.as_str(), value.to_str().unwrap_or_default());
    }
    let body = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| HpsError::UpstreamBody(e.to_string()))?;

    tracing::debug!(status, body_len = body.len(), "origin responded");
    Ok(OriginResponse {
        status,
        headers,
        body,
    })
}

fn apply_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &Headers,
) -> ureq::RequestBuilder<B> {
    for (name, values) in headers.iter() {
        for value in values {
            builder = builder.header(name, value);
        }
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_combines_scheme_and_uri() {
        let request = OriginRequest {
            method: Method::Get,
            scheme: Scheme::Https,
            uri: "example.com/a/b.txt".into(),
            headers: Headers::new(),
            body: Vec::new(),
        };
        assert_eq!(request.url(), "https://example.com/a/b.txt");
    }
}

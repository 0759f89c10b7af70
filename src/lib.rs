//! # hps-proxy
//!
//! Rust implementation of the Bluetooth HTTP Proxy Service (HPS),
//! service UUID `0136bd82-ba81-48c6-b608-df7aa274338a`.
//!
//! A resource-constrained central writes the pieces of an HTTP request
//! into GATT characteristics on a nearby gateway peripheral and triggers
//! the call with a one-octet control-point write; the gateway performs
//! the HTTP fetch, notifies the status, and serves the response headers
//! and body on read.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): pure wire codecs (control opcode,
//!   header block, status notification) and the service schema.
//! - **Transport** ([`transport`]): the minimal capability surface
//!   required from a BLE stack, with btleplug, bluer, and in-memory
//!   loopback bindings.
//! - **Peripheral** ([`peripheral`]): the gateway engine - request and
//!   response slots, HTTP dispatch, status notify pump.
//! - **Central** ([`central`]): the client engine - scan, connect,
//!   discover, write sequence, notification rendezvous, response reads.
//!
//! ## Example
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
//!     std::io::Write::write_all(&mut std::io::stdout(), &response.body)?;
//!     Ok(())
//! }
//! ```

pub mod central;
pub mod error;
pub mod peripheral;
pub mod protocol;
pub mod transport;

pub use central::{ClientConfig, HpsClient, HpsRequest, HpsResponse};
pub use error::{HpsError, Result};
pub use peripheral::{OriginClient, ProxySession, UreqOrigin};
pub use protocol::{Headers, Method, NotifyStatus, Opcode, Scheme};

//! Peripheral module - the gateway side of the proxy.
//!
//! Provides:
//! - [`ProxySession`] - per-connection slot state, characteristic
//!   handlers, and the status notify pump
//! - [`OriginClient`] / [`UreqOrigin`] - the outbound HTTP seam
//!
//! A GATT server binding (see [`crate::transport::bluez`], or the
//! loopback pair in tests) owns the radio; the session owns the protocol.

mod dispatch;
mod session;

pub use dispatch::{OriginClient, OriginRequest, OriginResponse, UreqOrigin};
pub use session::{GatewayResponse, ProxySession};

//! Transport module - the capability surface required from a BLE stack.
//!
//! The protocol engines never talk to a radio directly. The central
//! compiles against [`CentralRadio`] + [`PeripheralLink`] (scan, connect,
//! discover, read, write, subscribe); the peripheral engine implements
//! [`GattHandlers`] and a server binding drives it (characteristic writes
//! and reads in, status notifications out).
//!
//! Bindings provided:
//! - [`loopback`] - in-memory pair, used by the integration tests
//! - [`btle`] - btleplug-backed central radio
//! - [`bluez`] - bluer-backed peripheral server and advertiser

pub mod bluez;
pub mod btle;
pub mod loopback;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use uuid::Uuid;

use crate::error::Result;

/// ATT-level errors a GATT server may return to a client operation.
///
/// Carries the protocol error codes so bindings can put the exact octet
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttError {
    /// ATT 0x02 - the attribute cannot be read.
    #[error("read not permitted")]
    ReadNotPermitted,
    /// ATT 0x03 - the attribute cannot be written.
    #[error("write not permitted")]
    WriteNotPermitted,
    /// ATT 0x0E - request understood but could not be processed.
    #[error("unexpected error")]
    UnexpectedError,
}

impl AttError {
    /// Protocol error code.
    pub fn code(&self) -> u8 {
        match self {
            AttError::ReadNotPermitted => 0x02,
            AttError::WriteNotPermitted => 0x03,
            AttError::UnexpectedError => 0x0E,
        }
    }
}

/// Result type for GATT server handler callbacks.
pub type AttResult<T> = std::result::Result<T, AttError>;

/// Whether a characteristic write expects an ATT response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    WithResponse,
    WithoutResponse,
}

/// A value pushed by the peripheral on a subscribed characteristic.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Source characteristic.
    pub characteristic: Uuid,
    /// Notified payload.
    pub value: Vec<u8>,
}

/// Stream of notifications from one subscription.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

/// A characteristic discovered on a remote service.
#[derive(Debug, Clone)]
pub struct RemoteCharacteristic {
    pub uuid: Uuid,
    /// Property bits from [`crate::protocol::schema::props`].
    pub properties: u8,
    /// Descriptor UUIDs, surfaced for diagnostics only.
    pub descriptors: Vec<Uuid>,
}

/// Central-role radio: GAP scanning and link enumeration.
#[async_trait]
pub trait CentralRadio: Send + Sync {
    type Link: PeripheralLink + Send + Sync + 'static;

    /// Start (or restart) a GAP scan.
    async fn start_scan(&self) -> Result<()>;

    /// Stop an active scan. Idempotent.
    async fn stop_scan(&self) -> Result<()>;

    /// Links for every peripheral seen so far in the current scan.
    async fn discovered(&self) -> Result<Vec<Self::Link>>;
}

/// A link to one remote peripheral, from the central's perspective.
#[async_trait]
pub trait PeripheralLink: Send + Sync {
    /// Advertised local name, if any.
    async fn local_name(&self) -> Result<Option<String>>;

    /// Establish the connection. A no-op if already connected.
    async fn connect(&self) -> Result<()>;

    /// Tear the connection down. Best-effort.
    async fn disconnect(&self) -> Result<()>;

    /// Request an ATT MTU for this link. Stacks that negotiate on their
    /// own may treat this as advisory.
    async fn request_mtu(&self, mtu: u16) -> Result<()>;

    /// Enumerate the characteristics of `service`. An empty result means
    /// the service is not present.
    async fn discover_service(&self, service: Uuid) -> Result<Vec<RemoteCharacteristic>>;

    /// Read a characteristic value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value.
    async fn write(&self, characteristic: Uuid, value: &[u8], kind: WriteKind) -> Result<()>;

    /// Subscribe to notifications on a characteristic.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream>;

    /// End a subscription. Best-effort.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;
}

/// Peripheral-role service logic, as seen by a GATT server binding.
///
/// The binding routes incoming ATT operations into `handle_write` /
/// `handle_read` and runs a pump per status subscription that forwards
/// whatever `next_notification` yields.
#[async_trait]
pub trait GattHandlers: Send + Sync {
    /// A central wrote `value` to `characteristic`.
    async fn handle_write(&self, characteristic: Uuid, value: &[u8]) -> AttResult<()>;

    /// A central reads `characteristic`.
    async fn handle_read(&self, characteristic: Uuid) -> AttResult<Vec<u8>>;

    /// Pends until a notification is due, then yields the source
    /// characteristic and payload. Each payload is yielded exactly once.
    async fn next_notification(&self) -> (Uuid, Vec<u8>);
}

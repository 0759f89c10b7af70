//! btleplug-backed central radio.
//!
//! Wraps the first platform Bluetooth adapter behind the
//! [`CentralRadio`] / [`PeripheralLink`] traits. btleplug drives BlueZ on
//! Linux and the native stacks elsewhere, so the central binary runs
//! wherever btleplug does.

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use uuid::Uuid;

use super::{
    CentralRadio, Notification, NotificationStream, PeripheralLink, RemoteCharacteristic,
    WriteKind,
};
use crate::error::{HpsError, Result};
use crate::protocol::schema::props;

impl From<btleplug::Error> for HpsError {
    fn from(err: btleplug::Error) -> Self {
        HpsError::Transport(err.to_string())
    }
}

/// Central radio over the first available platform adapter.
pub struct BtleplugRadio {
    adapter: Adapter,
}

impl BtleplugRadio {
    /// Open the platform Bluetooth manager and grab the first adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HpsError::Transport("no Bluetooth adapter found".into()))?;
        Ok(Self { adapter })
    }
}

#[async_trait]
impl CentralRadio for BtleplugRadio {
    type Link = BtleplugLink;

    async fn start_scan(&self) -> Result<()> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn discovered(&self) -> Result<Vec<BtleplugLink>> {
        let peripherals = self.adapter.peripherals().await?;
        Ok(peripherals
            .into_iter()
            .map(|peripheral| BtleplugLink { peripheral })
            .collect())
    }
}

/// One peripheral seen by the scan.
pub struct BtleplugLink {
    peripheral: Peripheral,
}

impl BtleplugLink {
    /// Look a characteristic up by UUID on the connected peripheral.
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| HpsError::Transport(format!("characteristic {uuid} not bound")))
    }
}

fn map_properties(flags: CharPropFlags) -> u8 {
    let mut bits = 0;
    if flags.contains(CharPropFlags::READ) {
        bits |= props::READ;
    }
    if flags.contains(CharPropFlags::WRITE) {
        bits |= props::WRITE;
    }
    if flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        bits |= props::WRITE_WITHOUT_RESPONSE;
    }
    if flags.contains(CharPropFlags::NOTIFY) {
        bits |= props::NOTIFY;
    }
    bits
}

#[async_trait]
impl PeripheralLink for BtleplugLink {
    async fn local_name(&self) -> Result<Option<String>> {
        let properties = self.peripheral.properties().await?;
        Ok(properties.and_then(|p| p.local_name))
    }

    async fn connect(&self) -> Result<()> {
        if !self.peripheral.is_connected().await? {
            self.peripheral.connect().await?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn request_mtu(&self, mtu: u16) -> Result<()> {
        // btleplug leaves ATT MTU exchange to the platform stack; the
        // request is recorded for the log only.
        tracing::debug!(mtu, "MTU negotiation delegated to the platform stack");
        Ok(())
    }

    async fn discover_service(&self, service: Uuid) -> Result<Vec<RemoteCharacteristic>> {
        self.peripheral.discover_services().await?;
        let found = self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service);
        let Some(found) = found else {
            return Ok(Vec::new());
        };
        Ok(found
            .characteristics
            .into_iter()
            .map(|c| RemoteCharacteristic {
                uuid: c.uuid,
                properties: map_properties(c.properties),
                descriptors: c.descriptors.into_iter().map(|d| d.uuid).collect(),
            })
            .collect())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(characteristic)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn write(&self, characteristic: Uuid, value: &[u8], kind: WriteKind) -> Result<()> {
        let characteristic = self.characteristic(characteristic)?;
        let write_type = match kind {
            WriteKind::WithResponse => WriteType::WithResponse,
            WriteKind::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(&characteristic, value, write_type)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        let target = self.characteristic(characteristic)?;
        self.peripheral.subscribe(&target).await?;
        let stream = self.peripheral.notifications().await?;
        Ok(Box::pin(stream.map(|n| Notification {
            characteristic: n.uuid,
            value: n.value,
        })))
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }
}

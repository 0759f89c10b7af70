//! In-memory central/peripheral pair.
//!
//! Wires a [`CentralRadio`] directly to a set of [`GattHandlers`] with no
//! radio underneath: writes and reads invoke the handlers inline, and each
//! subscription runs a small pump task that forwards notifications into a
//! stream. Used by the integration tests to exercise both protocol
//! engines end to end, and useful for demos on machines without Bluetooth
//! hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    AttError, CentralRadio, GattHandlers, Notification, NotificationStream, PeripheralLink,
    RemoteCharacteristic, WriteKind,
};
use crate::error::{HpsError, Result};
use crate::protocol::schema;

/// In-memory radio holding zero or more attached peripherals.
pub struct LoopbackRadio {
    scanning: Arc<AtomicBool>,
    links: Vec<LoopbackLink>,
}

impl LoopbackRadio {
    /// Create a radio with no peripherals in range.
    pub fn new() -> Self {
        Self {
            scanning: Arc::new(AtomicBool::new(false)),
            links: Vec::new(),
        }
    }

    /// Put a peripheral "in range", advertising `name` and backed by
    /// `handlers`.
    pub fn attach(&mut self, name: &str, handlers: Arc<dyn GattHandlers>) {
        self.links.push(LoopbackLink {
            shared: Arc::new(LinkShared {
                name: name.to_string(),
                handlers,
                connected: AtomicBool::new(false),
                mtu: AtomicU16::new(23),
                pumps: Mutex::new(HashMap::new()),
            }),
        });
    }
}

impl Default for LoopbackRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CentralRadio for LoopbackRadio {
    type Link = LoopbackLink;

    async fn start_scan(&self) -> Result<()> {
        self.scanning.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scanning.store(false, Ordering::Release);
        Ok(())
    }

    async fn discovered(&self) -> Result<Vec<LoopbackLink>> {
        if self.scanning.load(Ordering::Acquire) {
            Ok(self.links.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

struct LinkShared {
    name: String,
    handlers: Arc<dyn GattHandlers>,
    connected: AtomicBool,
    mtu: AtomicU16,
    /// Pump task per subscribed characteristic.
    pumps: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

/// One attached in-memory peripheral.
#[derive(Clone)]
pub struct LoopbackLink {
    shared: Arc<LinkShared>,
}

impl LoopbackLink {
    /// The ATT MTU last requested over this link.
    pub fn negotiated_mtu(&self) -> u16 {
        self.shared.mtu.load(Ordering::Acquire)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.shared.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(HpsError::Transport("link not connected".into()))
        }
    }
}

fn att_to_transport(err: AttError) -> HpsError {
    HpsError::Transport(format!("ATT error 0x{:02x}: {}", err.code(), err))
}

#[async_trait]
impl PeripheralLink for LoopbackLink {
    async fn local_name(&self) -> Result<Option<String>> {
        Ok(Some(self.shared.name.clone()))
    }

    async fn connect(&self) -> Result<()> {
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.shared.connected.store(false, Ordering::Release);
        let mut pumps = self.shared.pumps.lock().await;
        for (_, pump) in pumps.drain() {
            pump.abort();
        }
        Ok(())
    }

    async fn request_mtu(&self, mtu: u16) -> Result<()> {
        self.ensure_connected()?;
        self.shared.mtu.store(mtu, Ordering::Release);
        Ok(())
    }

    async fn discover_service(&self, service: Uuid) -> Result<Vec<RemoteCharacteristic>> {
        self.ensure_connected()?;
        if service != schema::SERVICE_UUID {
            return Ok(Vec::new());
        }
        Ok(schema::CHARACTERISTICS
            .iter()
            .map(|spec| RemoteCharacteristic {
                uuid: spec.uuid,
                properties: spec.properties,
                descriptors: if spec.uuid == schema::HTTP_STATUS {
                    vec![schema::CCC_DESCRIPTOR]
                } else {
                    Vec::new()
                },
            })
            .collect())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        self.shared
            .handlers
            .handle_read(characteristic)
            .await
            .map_err(att_to_transport)
    }

    async fn write(&self, characteristic: Uuid, value: &[u8], kind: WriteKind) -> Result<()> {
        self.ensure_connected()?;
        let outcome = self.shared.handlers.handle_write(characteristic, value).await;
        match kind {
            WriteKind::WithResponse => outcome.map_err(att_to_transport),
            WriteKind::WithoutResponse => {
                // No ATT response travels back for this write kind; the
                // server-side error stays server-side.
                if let Err(err) = outcome {
                    tracing::debug!(%characteristic, %err, "unacknowledged write rejected");
                }
                Ok(())
            }
        }
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        self.ensure_connected()?;
        let (tx, rx) = mpsc::channel::<Notification>(8);
        let handlers = self.shared.handlers.clone();
        let pump = tokio::spawn(async move {
            loop {
                let (source, value) = handlers.next_notification().await;
                if source != characteristic {
                    continue;
                }
                if tx
                    .send(Notification {
                        characteristic: source,
                        value,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        self.shared.pumps.lock().await.insert(characteristic, pump);

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async {
            rx.recv().await.map(|n| (n, rx))
        })))
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        if let Some(pump) = self.shared.pumps.lock().await.remove(&characteristic) {
            pump.abort();
        }
        Ok(())
    }
}

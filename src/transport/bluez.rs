//! bluer-backed GATT server and advertiser for the gateway.
//!
//! Registers the HPS application with BlueZ, routes characteristic
//! traffic into a [`GattHandlers`] implementation, and keeps the
//! advertisement alive across adapter power cycles. Linux only, like the
//! original Raspberry Pi deployment.

use std::sync::Arc;
use std::time::Duration;

use bluer::adv::{Advertisement, AdvertisementHandle, Type as AdvertisementType};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicWrite,
    CharacteristicWriteMethod, ReqError, Service,
};
use futures::FutureExt;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{AttError, GattHandlers};
use crate::error::{HpsError, Result};
use crate::protocol::schema;

/// Cadence of the power-state checks in the advertising loop.
const ADVERTISE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl From<bluer::Error> for HpsError {
    fn from(err: bluer::Error) -> Self {
        HpsError::Transport(err.to_string())
    }
}

fn att_to_req(err: AttError) -> ReqError {
    match err {
        AttError::ReadNotPermitted | AttError::WriteNotPermitted => ReqError::NotPermitted,
        AttError::UnexpectedError => ReqError::Failed,
    }
}

/// Gateway-side radio over the default BlueZ adapter.
pub struct BluezPeripheral {
    adapter: bluer::Adapter,
}

impl BluezPeripheral {
    /// Open a BlueZ session and power the default adapter on.
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        tracing::info!(adapter = adapter.name(), "adapter powered on");
        Ok(Self { adapter })
    }

    /// Register the HPS application and start advertising `name`.
    ///
    /// The returned handle keeps both alive; dropping it unregisters the
    /// application and stops the advertiser.
    pub async fn serve(
        &self,
        name: &str,
        handlers: Arc<dyn GattHandlers>,
    ) -> Result<GatewayHandle> {
        let application = self
            .adapter
            .serve_gatt_application(build_application(handlers))
            .await?;
        tracing::info!(service = %schema::SERVICE_UUID, "GATT application registered");

        let advertiser = tokio::spawn(advertise_loop(self.adapter.clone(), name.to_string()));

        Ok(GatewayHandle {
            _application: application,
            advertiser,
        })
    }
}

/// Keeps the served application and its advertiser running.
pub struct GatewayHandle {
    _application: ApplicationHandle,
    advertiser: JoinHandle<()>,
}

impl Drop for GatewayHandle {
    fn drop(&mut self) {
        self.advertiser.abort();
    }
}

/// Advertise continuously while the adapter is powered, re-registering
/// after power cycles, stopping while powered off.
async fn advertise_loop(adapter: bluer::Adapter, name: String) {
    tracing::info!(%name, "start advertising");
    let mut handle: Option<AdvertisementHandle> = None;
    loop {
        let powered = adapter.is_powered().await.unwrap_or(false);
        if powered && handle.is_none() {
            let advertisement = Advertisement {
                advertisement_type: AdvertisementType::Peripheral,
                service_uuids: vec![schema::SERVICE_UUID].into_iter().collect(),
                discoverable: Some(true),
                local_name: Some(name.clone()),
                ..Default::default()
            };
            match adapter.advertise(advertisement).await {
                Ok(h) => {
                    tracing::info!("advertisement registered");
                    handle = Some(h);
                }
                Err(err) => tracing::warn!(%err, "advertising failed, will retry"),
            }
        } else if !powered && handle.is_some() {
            tracing::info!("adapter powered off, stop advertising");
            handle = None;
        }
        tokio::time::sleep(ADVERTISE_POLL_INTERVAL).await;
    }
}

fn build_application(handlers: Arc<dyn GattHandlers>) -> Application {
    Application {
        services: vec![Service {
            uuid: schema::SERVICE_UUID,
            primary: true,
            characteristics: vec![
                Characteristic {
                    uuid: schema::HTTP_URI,
                    write: Some(write_handler(schema::HTTP_URI, handlers.clone(), false)),
                    ..Default::default()
                },
                Characteristic {
                    uuid: schema::HTTP_HEADERS,
                    write: Some(write_handler(schema::HTTP_HEADERS, handlers.clone(), false)),
                    read: Some(read_handler(schema::HTTP_HEADERS, handlers.clone())),
                    ..Default::default()
                },
                Characteristic {
                    uuid: schema::HTTP_STATUS,
                    notify: Some(notify_handler(handlers.clone())),
                    ..Default::default()
                },
                Characteristic {
                    uuid: schema::HTTP_BODY,
                    write: Some(write_handler(schema::HTTP_BODY, handlers.clone(), false)),
                    read: Some(read_handler(schema::HTTP_BODY, handlers.clone())),
                    ..Default::default()
                },
                Characteristic {
                    uuid: schema::HTTP_CONTROL,
                    write: Some(write_handler(schema::HTTP_CONTROL, handlers, true)),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn write_handler(
    uuid: Uuid,
    handlers: Arc<dyn GattHandlers>,
    without_response: bool,
) -> CharacteristicWrite {
    CharacteristicWrite {
        write: true,
        write_without_response: without_response,
        method: CharacteristicWriteMethod::Fun(Box::new(move |value, _req| {
            let handlers = handlers.clone();
            async move {
                handlers
                    .handle_write(uuid, &value)
                    .await
                    .map_err(att_to_req)
            }
            .boxed()
        })),
        ..Default::default()
    }
}

fn read_handler(uuid: Uuid, handlers: Arc<dyn GattHandlers>) -> CharacteristicRead {
    CharacteristicRead {
        read: true,
        fun: Box::new(move |_req| {
            let handlers = handlers.clone();
            async move { handlers.handle_read(uuid).await.map_err(att_to_req) }.boxed()
        }),
        ..Default::default()
    }
}

fn notify_handler(handlers: Arc<dyn GattHandlers>) -> CharacteristicNotify {
    CharacteristicNotify {
        notify: true,
        method: CharacteristicNotifyMethod::Fun(Box::new(move |mut notifier| {
            let handlers = handlers.clone();
            async move {
                tracing::info!("status subscription started");
                while !notifier.is_stopped() {
                    let (_, payload) = handlers.next_notification().await;
                    if let Err(err) = notifier.notify(payload).await {
                        tracing::warn!(%err, "status notification failed");
                        break;
                    }
                }
                tracing::info!("status subscription ended");
            }
            .boxed()
        })),
        ..Default::default()
    }
}

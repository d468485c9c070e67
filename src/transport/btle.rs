//! `btleplug` backend for the platform primitive.
//!
//! "Device selection" here is a scan filtered by service UUID; the first
//! peripheral advertising the service wins. An empty scan window counts as an
//! aborted selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::transport::error::{TransportError, TransportResult};
use crate::transport::platform::BlePlatform;
use crate::transport::types::{NotificationStream, WriteMode};

type Routes = Arc<Mutex<HashMap<Uuid, mpsc::UnboundedSender<Bytes>>>>;

struct Link {
    peripheral: Peripheral,
    characteristics: Vec<Characteristic>,
    pump: JoinHandle<()>,
}

pub struct BtlePlatform {
    scan_window: Duration,
    link: Mutex<Option<Arc<Link>>>,
    routes: Routes,
}

impl BtlePlatform {
    pub fn new(scan_window: Duration) -> Self {
        Self {
            scan_window,
            link: Mutex::new(None),
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn link(&self) -> TransportResult<Arc<Link>> {
        self.link.lock().clone().ok_or(TransportError::NotConnected)
    }

    fn find(link: &Link, uuid: Uuid) -> TransportResult<Characteristic> {
        link.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }

    async fn select(&self, service: Uuid) -> TransportResult<(Peripheral, String)> {
        let manager = Manager::new().await.map_err(connect_failed)?;
        let central = manager
            .adapters()
            .await
            .map_err(connect_failed)?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::ConnectFailed("no Bluetooth adapter".into()))?;

        central
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await
            .map_err(connect_failed)?;
        tokio::time::sleep(self.scan_window).await;
        let peripherals = central.peripherals().await.map_err(connect_failed)?;
        let _ = central.stop_scan().await;

        for peripheral in peripherals {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            if properties.services.contains(&service) {
                let name = properties.local_name.unwrap_or_else(|| "LapTimer".into());
                return Ok((peripheral, name));
            }
        }
        Err(TransportError::NoDeviceSelected)
    }
}

fn connect_failed(e: btleplug::Error) -> TransportError {
    TransportError::ConnectFailed(e.to_string())
}

impl BlePlatform for BtlePlatform {
    async fn connect(&self, service: Uuid) -> TransportResult<String> {
        let (peripheral, name) = self.select(service).await?;
        peripheral.connect().await.map_err(connect_failed)?;
        peripheral.discover_services().await.map_err(connect_failed)?;
        let characteristics = peripheral.characteristics().into_iter().collect();

        let mut notifications = peripheral.notifications().await.map_err(connect_failed)?;
        let routes = self.routes.clone();
        let pump = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let tx = routes.lock().get(&notification.uuid).cloned();
                if let Some(tx) = tx {
                    let _ = tx.send(Bytes::from(notification.value));
                }
            }
            // Stream ended: the link is gone, close every subscriber.
            routes.lock().clear();
        });

        *self.link.lock() = Some(Arc::new(Link {
            peripheral,
            characteristics,
            pump,
        }));
        Ok(name)
    }

    async fn write(
        &self,
        characteristic: Uuid,
        payload: Bytes,
        mode: WriteMode,
    ) -> TransportResult<()> {
        let link = self.link()?;
        let target = Self::find(&link, characteristic)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        link.peripheral
            .write(&target, &payload, write_type)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn subscribe(&self, characteristic: Uuid) -> TransportResult<NotificationStream> {
        let link = self.link()?;
        let target = Self::find(&link, characteristic)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(characteristic, tx);
        link.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
        Ok(rx)
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> TransportResult<()> {
        self.routes.lock().remove(&characteristic);
        let link = self.link()?;
        let target = Self::find(&link, characteristic)?;
        link.peripheral
            .unsubscribe(&target)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
    }

    async fn disconnect(&self) -> TransportResult<()> {
        let link = self.link.lock().take();
        self.routes.lock().clear();
        if let Some(link) = link {
            link.pump.abort();
            link.peripheral
                .disconnect()
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        }
        Ok(())
    }
}

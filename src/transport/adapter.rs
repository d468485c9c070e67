use bytes::Bytes;
use parking_lot::RwLock;

use crate::config::ServiceIds;
use crate::transport::error::{TransportError, TransportResult};
use crate::transport::platform::BlePlatform;
use crate::transport::types::{Channel, ConnectionHandle, NotificationStream, WriteMode};

/// Byte-level gateway over the platform primitive.
///
/// Maps the two logical channels onto their characteristics and refuses
/// every operation outside an active connection. It never looks inside
/// the bytes it moves.
pub struct TransportAdapter<P: BlePlatform> {
    platform: P,
    ids: ServiceIds,
    connection: RwLock<Option<ConnectionHandle>>,
}

impl<P: BlePlatform> TransportAdapter<P> {
    pub fn new(platform: P, ids: ServiceIds) -> Self {
        Self {
            platform,
            ids,
            connection: RwLock::new(None),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn service_ids(&self) -> &ServiceIds {
        &self.ids
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.connection.read().clone()
    }

    /// Connect to a device exposing the lap timer service. An existing
    /// connection is torn down first.
    pub async fn connect(&self) -> TransportResult<ConnectionHandle> {
        if self.is_connected() {
            self.disconnect().await?;
        }

        let device_name = self.platform.connect(self.ids.service).await?;
        let handle = ConnectionHandle {
            service: self.ids.service,
            device_name,
            connected_at: chrono::Utc::now(),
        };
        tracing::info!("Connected to {}", handle.device_name);
        *self.connection.write() = Some(handle.clone());
        Ok(handle)
    }

    pub async fn write_control(&self, payload: &[u8]) -> TransportResult<()> {
        self.write(Channel::Control, payload, WriteMode::WithResponse)
            .await
    }

    /// Write a payload chunk. `no_response` selects the unacknowledged mode.
    pub async fn write_data(&self, payload: &[u8], no_response: bool) -> TransportResult<()> {
        let mode = if no_response {
            WriteMode::WithoutResponse
        } else {
            WriteMode::WithResponse
        };
        self.write(Channel::Data, payload, mode).await
    }

    pub async fn subscribe_control(&self) -> TransportResult<NotificationStream> {
        self.subscribe(Channel::Control).await
    }

    pub async fn subscribe_data(&self) -> TransportResult<NotificationStream> {
        self.subscribe(Channel::Data).await
    }

    pub async fn unsubscribe_data(&self) -> TransportResult<()> {
        self.ensure_connected()?;
        self.platform.unsubscribe(self.ids.data).await
    }

    /// Drop the connection. Calling this while disconnected is a no-op.
    pub async fn disconnect(&self) -> TransportResult<()> {
        let Some(handle) = self.connection.write().take() else {
            return Ok(());
        };
        tracing::info!("Disconnecting from {}", handle.device_name);
        self.platform.disconnect().await
    }

    /// Forget the connection after the platform reported the link gone.
    pub fn mark_link_lost(&self) {
        if let Some(handle) = self.connection.write().take() {
            tracing::warn!("Link to {} lost", handle.device_name);
        }
    }

    async fn write(&self, channel: Channel, payload: &[u8], mode: WriteMode) -> TransportResult<()> {
        self.ensure_connected()?;
        self.platform
            .write(self.characteristic(channel), Bytes::copy_from_slice(payload), mode)
            .await
    }

    async fn subscribe(&self, channel: Channel) -> TransportResult<NotificationStream> {
        self.ensure_connected()?;
        self.platform.subscribe(self.characteristic(channel)).await
    }

    fn characteristic(&self, channel: Channel) -> uuid::Uuid {
        match channel {
            Channel::Control => self.ids.control,
            Channel::Data => self.ids.data,
        }
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

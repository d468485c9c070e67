use std::future::Future;

use bytes::Bytes;
use uuid::Uuid;

use crate::transport::error::TransportResult;
use crate::transport::types::{NotificationStream, WriteMode};

/// The platform's wireless primitive.
///
/// Implementations own radio access, device selection and GATT discovery.
/// Nothing above this trait knows which backend is in use.
pub trait BlePlatform: Send + Sync + 'static {
    /// Select a device advertising `service`, connect to it and discover its
    /// characteristics. Resolves to the device's display name.
    ///
    /// Fails with `NoDeviceSelected` when the selection is aborted and with
    /// `ConnectFailed` on link-level errors.
    fn connect(&self, service: Uuid) -> impl Future<Output = TransportResult<String>> + Send;

    fn write(
        &self,
        characteristic: Uuid,
        payload: Bytes,
        mode: WriteMode,
    ) -> impl Future<Output = TransportResult<()>> + Send;

    /// Start notifications on `characteristic`. Payloads are delivered in
    /// arrival order; the stream ends when the link drops.
    fn subscribe(
        &self,
        characteristic: Uuid,
    ) -> impl Future<Output = TransportResult<NotificationStream>> + Send;

    fn unsubscribe(&self, characteristic: Uuid) -> impl Future<Output = TransportResult<()>> + Send;

    fn disconnect(&self) -> impl Future<Output = TransportResult<()>> + Send;
}

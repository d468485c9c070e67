use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

use crate::client::error::{ClientError, ClientResult};
use crate::config::ClientConfig;
use crate::engine::{DownloadTarget, EngineError, TransferEngine, TransferProgress};
use crate::protocol::RemoteFile;
use crate::records::{decode_session, decode_tracks, encode_device_tracks, Session, Track};
use crate::status::{LinkStatus, StatusEvent, StatusProjector};
use crate::transport::{BlePlatform, TransportAdapter};

/// Snapshot of everything presentation renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    pub connected: bool,
    pub session_files: Vec<RemoteFile>,
    pub loading_file: bool,
    pub loading_name: Option<String>,
    pub progress: Option<u8>,
    pub status: LinkStatus,
}

/// Lap timer client
///
/// Runs engine operations and keeps the status projector in step with them.
/// Every failure moves the status to `error`, except a cancelled device
/// selection, which returns to `idle`.
pub struct LapTimerClient<P: BlePlatform> {
    engine: TransferEngine<P>,
    projector: Arc<StatusProjector>,
    config: ClientConfig,
    session_files: RwLock<Vec<RemoteFile>>,
    loading: RwLock<Option<String>>,
}

impl<P: BlePlatform> LapTimerClient<P> {
    pub fn new(platform: P, config: ClientConfig) -> Self {
        let adapter = TransportAdapter::new(platform, config.service);
        let engine = TransferEngine::new(adapter, config.engine.clone());
        Self {
            engine,
            projector: Arc::new(StatusProjector::new()),
            config,
            session_files: RwLock::new(Vec::new()),
            loading: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> &TransferEngine<P> {
        &self.engine
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn status(&self) -> LinkStatus {
        self.projector.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LinkStatus> {
        self.projector.subscribe()
    }

    pub fn state(&self) -> ClientState {
        let status = self.projector.current();
        let loading_name = self.loading.read().clone();
        ClientState {
            connected: self.engine.is_connected(),
            session_files: self.session_files.read().clone(),
            loading_file: loading_name.is_some(),
            loading_name,
            progress: status.progress,
            status,
        }
    }

    /// Connect, list the device's sessions and, if enabled, download the
    /// newest one.
    ///
    /// Returns `Ok(None)` when the user backs out of device selection, when
    /// the device has no sessions, or when auto-download is off.
    pub async fn connect(&self) -> ClientResult<Option<Session>> {
        self.projector.transition(StatusEvent::ConnectRequested)?;

        let handle = match self.engine.connect().await {
            Ok(handle) => handle,
            Err(e) if e.is_no_device_selected() => {
                tracing::info!("Device selection cancelled");
                self.projector.transition(StatusEvent::SelectionCancelled)?;
                return Ok(None);
            }
            Err(e) => return Err(self.fail(e)),
        };
        tracing::info!("Connected to {}", handle.device_name);
        self.projector.transition(StatusEvent::DeviceAcquired {
            device_name: handle.device_name,
        })?;

        let files = self.list().await?;
        let newest = match files.first() {
            Some(file) if self.config.auto_download_newest => file.name.clone(),
            _ => {
                self.projector.transition(StatusEvent::Completed)?;
                return Ok(None);
            }
        };
        self.download_session(&newest).await.map(Some)
    }

    /// Drop the connection. Safe to call at any time, any number of times.
    pub async fn disconnect(&self) -> ClientResult<()> {
        self.teardown().await;
        self.projector.transition(StatusEvent::Disconnected)?;
        Ok(())
    }

    /// Leave the `error` state and tear the connection down.
    pub async fn dismiss_error(&self) -> ClientResult<()> {
        if !self.projector.current().is_error() {
            return Ok(());
        }
        self.teardown().await;
        self.projector.transition(StatusEvent::Dismissed)?;
        Ok(())
    }

    /// Re-read the device's session list.
    pub async fn refresh_sessions(&self) -> ClientResult<Vec<RemoteFile>> {
        let files = self.list().await?;
        self.projector.transition(StatusEvent::Completed)?;
        Ok(files)
    }

    pub async fn load_session(&self, name: &str) -> ClientResult<Session> {
        self.download_session(name).await
    }

    /// Download the track-definitions file as text.
    pub async fn load_tracks_csv(&self) -> ClientResult<String> {
        self.download(&DownloadTarget::Tracks).await
    }

    pub async fn load_tracks(&self) -> ClientResult<Vec<Track>> {
        let text = self.load_tracks_csv().await?;
        Ok(decode_tracks(&text))
    }

    /// Replace the track-definitions file on the device.
    pub async fn upload_tracks_text(&self, csv: &str) -> ClientResult<()> {
        match self.engine.upload(csv.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn upload_tracks(&self, tracks: &[Track]) -> ClientResult<()> {
        self.upload_tracks_text(&encode_device_tracks(tracks)).await
    }

    async fn list(&self) -> ClientResult<Vec<RemoteFile>> {
        self.projector.transition(StatusEvent::ListingStarted)?;
        match self.engine.list_sessions().await {
            Ok(files) => {
                *self.session_files.write() = files.clone();
                Ok(files)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn download_session(&self, name: &str) -> ClientResult<Session> {
        let target = DownloadTarget::Session(name.to_string());
        let text = self.download(&target).await?;
        let session = decode_session(&text, name);
        tracing::info!("Session {} has {} laps", session.name, session.laps.len());
        Ok(session)
    }

    async fn download(&self, target: &DownloadTarget) -> ClientResult<String> {
        self.projector.transition(StatusEvent::DownloadStarted {
            file_name: target.file_name().to_string(),
        })?;
        *self.loading.write() = Some(target.file_name().to_string());

        let projector = &self.projector;
        let result = self
            .engine
            .download(target, |progress: &TransferProgress| {
                let _ = projector.transition(StatusEvent::Progress {
                    percent: progress.percent,
                });
            })
            .await;
        *self.loading.write() = None;

        match result {
            Ok(text) => {
                let done = self.projector.transition(StatusEvent::Completed)?;
                self.schedule_settle(done.generation);
                Ok(text)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Return from `done` to `idle` after the display delay, unless another
    /// operation has started in the meantime.
    fn schedule_settle(&self, generation: u64) {
        let projector = self.projector.clone();
        let delay = self.config.done_display_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = projector.transition(StatusEvent::Settled { generation });
        });
    }

    fn fail(&self, err: EngineError) -> ClientError {
        // A local disconnect already reset the status to idle.
        if err == EngineError::Disconnected {
            tracing::debug!("Operation ended by disconnect");
            return err.into();
        }
        tracing::warn!("Operation failed: {}", err);
        let _ = self.projector.transition(StatusEvent::Failed {
            message: err.to_string(),
        });
        err.into()
    }

    async fn teardown(&self) {
        if let Err(e) = self.engine.disconnect().await {
            tracing::warn!("Disconnect failed: {}", e);
        }
        self.session_files.write().clear();
        *self.loading.write() = None;
    }
}

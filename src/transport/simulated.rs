//! In-process lap timer emulator
//!
//! Implements [`BlePlatform`] by playing the device side of the protocol:
//! it answers listings in either shape, streams files over the data
//! characteristic in notification-sized pieces and accepts track uploads.
//! Link imperfections seen on real hardware (padded final chunk, DONE racing
//! the last notification, arbitrary chunking) can be switched on per profile.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ServiceIds;
use crate::protocol::{Command, ControlEvent, DoneDirection, RemoteFile, SizeTarget};
use crate::transport::error::{TransportError, TransportResult};
use crate::transport::platform::BlePlatform;
use crate::transport::types::{NotificationStream, WriteMode};

/// How the emulator answers `CMD=LIST;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape {
    /// One `CMD=LIST;DIR=SESSIONS;FILES=...` event.
    SingleShot,
    /// `ITEM;...` events followed by `CMD=LIST;END=1;`.
    Streaming,
}

/// What happens when the client asks to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    UserCancels,
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub ids: ServiceIds,
    pub list_shape: ListShape,
    /// Largest data notification payload.
    pub notify_size: usize,
    /// Split data notifications at random sizes (seeded) instead of `notify_size`.
    pub random_split_seed: Option<u64>,
    /// Send `CMD=GET;SIZE=n;` before streaming a file.
    pub announce_size: bool,
    /// Pad the final notification with NUL bytes up to `notify_size`.
    pub pad_final_chunk: bool,
    /// Deliver the final notification this long after `DONE;DIR=TX`.
    pub tail_after_done: Option<Duration>,
    /// Accept commands but never answer them.
    pub silent: bool,
    pub connect: ConnectBehavior,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            name: "LapTimer".into(),
            ids: ServiceIds::default(),
            list_shape: ListShape::SingleShot,
            notify_size: 160,
            random_split_seed: None,
            announce_size: true,
            pad_final_chunk: false,
            tail_after_done: None,
            silent: false,
            connect: ConnectBehavior::Accept,
        }
    }
}

impl DeviceProfile {
    /// Older firmware: single-shot listing, padded final chunk.
    pub fn legacy_firmware() -> Self {
        Self {
            list_shape: ListShape::SingleShot,
            pad_final_chunk: true,
            ..Default::default()
        }
    }

    /// Current firmware: streamed listing, DONE may overtake the last chunk.
    pub fn streaming_firmware() -> Self {
        Self {
            list_shape: ListShape::Streaming,
            tail_after_done: Some(Duration::from_millis(20)),
            ..Default::default()
        }
    }

    pub fn with_list_shape(mut self, shape: ListShape) -> Self {
        self.list_shape = shape;
        self
    }

    pub fn with_random_split(mut self, seed: u64) -> Self {
        self.random_split_seed = Some(seed);
        self
    }

    pub fn without_size_announcement(mut self) -> Self {
        self.announce_size = false;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_connect(mut self, behavior: ConnectBehavior) -> Self {
        self.connect = behavior;
        self
    }
}

#[derive(Debug, Default)]
struct UploadState {
    expected: usize,
    received: Vec<u8>,
}

#[derive(Debug, Default)]
struct DeviceState {
    connected: bool,
    sessions: BTreeMap<String, Vec<u8>>,
    tracks: Vec<u8>,
    control_tx: Option<mpsc::UnboundedSender<Bytes>>,
    data_tx: Option<mpsc::UnboundedSender<Bytes>>,
    upload: Option<UploadState>,
    commands: Vec<Command>,
    data_writes: Vec<(usize, WriteMode)>,
    connect_attempts: u32,
}

/// Emulated lap timer. Clones share the same device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    profile: Arc<DeviceProfile>,
    state: Arc<Mutex<DeviceState>>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(DeviceProfile::default())
    }
}

impl SimulatedDevice {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile: Arc::new(profile),
            state: Arc::new(Mutex::new(DeviceState::default())),
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Store a lap log on the emulated SD card.
    pub fn add_session(&self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .sessions
            .insert(name.into(), contents.into());
    }

    pub fn set_tracks(&self, contents: impl Into<Vec<u8>>) {
        self.state.lock().tracks = contents.into();
    }

    /// Current contents of the track-definitions file.
    pub fn tracks(&self) -> Vec<u8> {
        self.state.lock().tracks.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    /// Size and mode of every write to the data characteristic.
    pub fn data_writes(&self) -> Vec<(usize, WriteMode)> {
        self.state.lock().data_writes.clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    /// Emit an arbitrary control line, as if the firmware had sent it.
    pub fn push_control(&self, line: &str) {
        let state = self.state.lock();
        send(&state.control_tx, Bytes::copy_from_slice(line.as_bytes()));
    }

    /// Drop the link from the device side. Open notification streams end.
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.control_tx = None;
        state.data_tx = None;
        state.upload = None;
    }

    fn handle_command(&self, raw: &[u8]) {
        let command = match Command::parse(raw) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!("Emulator ignoring control write: {}", e);
                return;
            }
        };

        let mut state = self.state.lock();
        state.commands.push(command.clone());
        if self.profile.silent {
            return;
        }

        match command {
            Command::List => {
                let files: Vec<RemoteFile> = state
                    .sessions
                    .iter()
                    .map(|(name, data)| RemoteFile::new(name, data.len() as u64))
                    .collect();
                match self.profile.list_shape {
                    ListShape::SingleShot => {
                        send_event(&state.control_tx, &ControlEvent::ListSingleShot { files });
                    }
                    ListShape::Streaming => {
                        for file in files {
                            send_event(&state.control_tx, &ControlEvent::ListItem(file));
                        }
                        send_event(&state.control_tx, &ControlEvent::ListEnd);
                    }
                }
            }
            Command::Get { name } => {
                let contents = state.sessions.get(&name).cloned().unwrap_or_default();
                self.stream_file(&state, SizeTarget::Session, contents);
            }
            Command::GetTracks => {
                let contents = state.tracks.clone();
                self.stream_file(&state, SizeTarget::Tracks, contents);
            }
            Command::PutTracks { size } => {
                state.upload = Some(UploadState {
                    expected: size,
                    received: Vec::with_capacity(size),
                });
            }
            Command::Done => {
                if let Some(mut upload) = state.upload.take() {
                    upload.received.truncate(upload.expected);
                    state.tracks = upload.received;
                    send_event(&state.control_tx, &ControlEvent::Done(DoneDirection::Rx));
                }
            }
        }
    }

    fn stream_file(&self, state: &DeviceState, target: SizeTarget, contents: Vec<u8>) {
        if self.profile.announce_size {
            send_event(
                &state.control_tx,
                &ControlEvent::TransferSize {
                    target,
                    size: contents.len() as u64,
                },
            );
        }

        let mut chunks = self.split(&contents);
        if self.profile.pad_final_chunk {
            if let Some(last) = chunks.last_mut() {
                last.resize(self.profile.notify_size.max(last.len()), 0);
            }
        }

        let tail = match self.profile.tail_after_done {
            Some(delay) if !chunks.is_empty() => chunks.pop().map(|last| (delay, last)),
            _ => None,
        };

        for chunk in chunks {
            send(&state.data_tx, Bytes::from(chunk));
        }
        send_event(&state.control_tx, &ControlEvent::Done(DoneDirection::Tx));

        if let Some((delay, last)) = tail {
            let data_tx = state.data_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                send(&data_tx, Bytes::from(last));
            });
        }
    }

    fn split(&self, contents: &[u8]) -> Vec<Vec<u8>> {
        let max = self.profile.notify_size.max(1);
        let mut rng = self.profile.random_split_seed.map(StdRng::seed_from_u64);
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < contents.len() {
            let len = match rng.as_mut() {
                Some(rng) => rng.gen_range(1..=max),
                None => max,
            };
            let end = (offset + len).min(contents.len());
            chunks.push(contents[offset..end].to_vec());
            offset = end;
        }
        chunks
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

fn send(tx: &Option<mpsc::UnboundedSender<Bytes>>, payload: Bytes) {
    if let Some(tx) = tx {
        let _ = tx.send(payload);
    }
}

fn send_event(tx: &Option<mpsc::UnboundedSender<Bytes>>, event: &ControlEvent) {
    send(tx, Bytes::from(event.encode()));
}

impl BlePlatform for SimulatedDevice {
    async fn connect(&self, service: Uuid) -> TransportResult<String> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        match &self.profile.connect {
            ConnectBehavior::UserCancels => return Err(TransportError::NoDeviceSelected),
            ConnectBehavior::Fail(reason) => {
                return Err(TransportError::ConnectFailed(reason.clone()))
            }
            ConnectBehavior::Accept => {}
        }
        if service != self.profile.ids.service {
            return Err(TransportError::NoDeviceSelected);
        }
        state.connected = true;
        Ok(self.profile.name.clone())
    }

    async fn write(
        &self,
        characteristic: Uuid,
        payload: Bytes,
        mode: WriteMode,
    ) -> TransportResult<()> {
        self.ensure_connected()?;
        if characteristic == self.profile.ids.control {
            self.handle_command(&payload);
            Ok(())
        } else if characteristic == self.profile.ids.data {
            let mut state = self.state.lock();
            state.data_writes.push((payload.len(), mode));
            if let Some(upload) = state.upload.as_mut() {
                upload.received.extend_from_slice(&payload);
            }
            Ok(())
        } else {
            Err(TransportError::CharacteristicNotFound(characteristic))
        }
    }

    async fn subscribe(&self, characteristic: Uuid) -> TransportResult<NotificationStream> {
        self.ensure_connected()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        if characteristic == self.profile.ids.control {
            state.control_tx = Some(tx);
        } else if characteristic == self.profile.ids.data {
            state.data_tx = Some(tx);
        } else {
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        Ok(rx)
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> TransportResult<()> {
        let mut state = self.state.lock();
        if characteristic == self.profile.ids.control {
            state.control_tx = None;
        } else if characteristic == self.profile.ids.data {
            state.data_tx = None;
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.drop_link();
        Ok(())
    }
}

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

use crate::config::EngineConfig;
use crate::engine::download::TransferSession;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::listing::ListingCollector;
use crate::engine::types::{DownloadTarget, TransferProgress};
use crate::metrics::{record_malformed_event, TransferMetrics};
use crate::protocol::{Command, ControlEvent, DoneDirection, RemoteFile};
use crate::transport::{BlePlatform, ConnectionHandle, NotificationStream, TransportAdapter};

/// Command protocol over the transport adapter.
///
/// One operation runs at a time: every operation holds the control stream
/// for its whole duration, so a second list/download/upload waits for the
/// first to finish.
pub struct TransferEngine<P: BlePlatform> {
    adapter: TransportAdapter<P>,
    config: EngineConfig,
    control: Mutex<Option<NotificationStream>>,
    upload_pacer: Option<DefaultDirectRateLimiter>,
}

impl<P: BlePlatform> TransferEngine<P> {
    pub fn new(adapter: TransportAdapter<P>, config: EngineConfig) -> Self {
        // Evenly spaced writes, no initial burst.
        let upload_pacer = NonZeroU32::new(config.upload_chunks_per_second).map(|rate| {
            RateLimiter::direct(Quota::per_second(rate).allow_burst(NonZeroU32::MIN))
        });
        Self {
            adapter,
            config,
            control: Mutex::new(None),
            upload_pacer,
        }
    }

    pub fn adapter(&self) -> &TransportAdapter<P> {
        &self.adapter
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    /// Connect and start listening on the control channel.
    pub async fn connect(&self) -> EngineResult<ConnectionHandle> {
        let handle = self.adapter.connect().await?;
        let stream = match self.adapter.subscribe_control().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = self.adapter.disconnect().await;
                return Err(e.into());
            }
        };
        *self.control.lock().await = Some(stream);
        Ok(handle)
    }

    /// Drop the connection. In-flight operations end with `Disconnected`.
    pub async fn disconnect(&self) -> EngineResult<()> {
        let result = self.adapter.disconnect().await;
        *self.control.lock().await = None;
        result.map_err(Into::into)
    }

    /// List session files on the device, newest first.
    pub async fn list_sessions(&self) -> EngineResult<Vec<RemoteFile>> {
        let mut guard = self.control.lock().await;
        let result = match self.active_control(&mut guard) {
            Ok(control) => self.run_listing(control).await,
            Err(e) => Err(e),
        };
        release_on_link_failure(&mut guard, &result);
        result
    }

    /// Download a file and decode it as text.
    ///
    /// `on_progress` is called whenever the received byte count or the
    /// percentage changes, and once more on completion.
    pub async fn download<F>(&self, target: &DownloadTarget, mut on_progress: F) -> EngineResult<String>
    where
        F: FnMut(&TransferProgress),
    {
        let mut guard = self.control.lock().await;
        let result = match self.active_control(&mut guard) {
            Ok(control) => {
                let metrics = TransferMetrics::start("download");
                let outcome = self.run_download(control, target, &mut on_progress).await;
                match &outcome {
                    Ok((_, bytes)) => metrics.complete(*bytes),
                    Err(e) => metrics.fail(failure_reason(e)),
                }
                outcome.map(|(text, _)| text)
            }
            Err(e) => Err(e),
        };
        release_on_link_failure(&mut guard, &result);
        result
    }

    /// Upload the track-definitions file and wait for the device to accept it.
    pub async fn upload(&self, payload: &[u8]) -> EngineResult<()> {
        let mut guard = self.control.lock().await;
        let result = match self.active_control(&mut guard) {
            Ok(control) => {
                let metrics = TransferMetrics::start("upload");
                let outcome = self.run_upload(control, payload).await;
                match &outcome {
                    Ok(()) => metrics.complete(payload.len() as u64),
                    Err(e) => metrics.fail(failure_reason(e)),
                }
                outcome
            }
            Err(e) => Err(e),
        };
        release_on_link_failure(&mut guard, &result);
        result
    }

    fn active_control<'a>(
        &self,
        guard: &'a mut Option<NotificationStream>,
    ) -> EngineResult<&'a mut NotificationStream> {
        if !self.adapter.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let control = guard.as_mut().ok_or(EngineError::NotConnected)?;
        drain_stale(control);
        Ok(control)
    }

    async fn send(&self, command: Command) -> EngineResult<()> {
        tracing::debug!("-> {}", command);
        self.adapter.write_control(&command.to_bytes()).await?;
        Ok(())
    }

    async fn run_listing(&self, control: &mut NotificationStream) -> EngineResult<Vec<RemoteFile>> {
        self.send(Command::List).await?;

        let deadline = Instant::now() + self.config.list_timeout;
        let mut listing = ListingCollector::new();
        loop {
            let event = self
                .next_event(control, Some(deadline), "listing")
                .await?;
            if listing.observe(&event) {
                let files = listing.into_files().unwrap_or_default();
                tracing::info!("Device lists {} session files", files.len());
                return Ok(files);
            }
        }
    }

    async fn run_download<F>(
        &self,
        control: &mut NotificationStream,
        target: &DownloadTarget,
        on_progress: &mut F,
    ) -> EngineResult<(String, u64)>
    where
        F: FnMut(&TransferProgress),
    {
        let mut data = self.adapter.subscribe_data().await?;
        let result = self
            .receive_file(control, &mut data, target, on_progress)
            .await;
        drop(data);
        if self.adapter.is_connected() {
            if let Err(e) = self.adapter.unsubscribe_data().await {
                tracing::debug!("Unsubscribe from data channel failed: {}", e);
            }
        }

        let session = result?;
        let received = session.received_bytes();
        tracing::info!(
            "Downloaded {} ({} bytes in {} notifications)",
            target.file_name(),
            received,
            session.chunk_count()
        );
        Ok((session.into_text(), received))
    }

    async fn receive_file<F>(
        &self,
        control: &mut NotificationStream,
        data: &mut NotificationStream,
        target: &DownloadTarget,
        on_progress: &mut F,
    ) -> EngineResult<TransferSession>
    where
        F: FnMut(&TransferProgress),
    {
        let mut session = TransferSession::new();
        let mut last_report: Option<TransferProgress> = None;
        let mut report = |session: &mut TransferSession, on_progress: &mut F| {
            let progress = TransferProgress {
                file_name: target.file_name().to_string(),
                received_bytes: session.received_bytes(),
                expected_size: session.expected_size(),
                percent: session.progress(),
            };
            if last_report.as_ref() != Some(&progress) {
                on_progress(&progress);
                last_report = Some(progress);
            }
        };

        self.send(target.command()).await?;

        let ceiling = self.config.transfer_timeout.map(|t| Instant::now() + t);
        let deadline = wait_until(ceiling);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                chunk = data.recv() => match chunk {
                    Some(chunk) => {
                        session.push(chunk);
                        report(&mut session, on_progress);
                    }
                    None => return Err(self.link_error()),
                },
                raw = control.recv() => {
                    let Some(raw) = raw else {
                        return Err(self.link_error());
                    };
                    match ControlEvent::parse(&raw) {
                        Ok(ControlEvent::TransferSize { target: announced, size }) => {
                            if announced == target.size_target() {
                                tracing::debug!("{} is {} bytes", target.file_name(), size);
                                session.set_expected_size(size);
                                report(&mut session, on_progress);
                            } else {
                                tracing::debug!("Ignoring size announcement for {:?}", announced);
                            }
                        }
                        Ok(ControlEvent::Done(DoneDirection::Tx)) => break,
                        Ok(other) => tracing::debug!("Ignoring control event during download: {:?}", other),
                        Err(e) => {
                            tracing::warn!("{}", e);
                            record_malformed_event();
                        }
                    }
                }
                _ = &mut deadline => {
                    return Err(self.timeout("download", self.config.transfer_timeout));
                }
            }
        }

        // DONE may overtake the last notifications; keep draining briefly.
        let settle = time::sleep(self.config.settle_delay);
        tokio::pin!(settle);
        loop {
            tokio::select! {
                biased;
                chunk = data.recv() => match chunk {
                    Some(chunk) => {
                        session.push(chunk);
                        report(&mut session, on_progress);
                    }
                    None => break,
                },
                _ = &mut settle => break,
            }
        }

        if session.expected_size().is_some() {
            let received = session.received_bytes();
            let progress = TransferProgress {
                file_name: target.file_name().to_string(),
                received_bytes: received,
                expected_size: session.expected_size(),
                percent: Some(100),
            };
            if last_report.as_ref() != Some(&progress) {
                on_progress(&progress);
            }
        }
        Ok(session)
    }

    async fn run_upload(&self, control: &mut NotificationStream, payload: &[u8]) -> EngineResult<()> {
        self.send(Command::PutTracks {
            size: payload.len(),
        })
        .await?;

        let chunk_size = self.config.chunk_size.max(1);
        for chunk in payload.chunks(chunk_size) {
            if let Some(pacer) = &self.upload_pacer {
                pacer.until_ready().await;
            }
            self.adapter.write_data(chunk, true).await?;
        }
        tracing::debug!(
            "Wrote {} bytes in {} chunks",
            payload.len(),
            payload.len().div_ceil(chunk_size)
        );

        self.send(Command::Done).await?;

        let ceiling = self.config.transfer_timeout.map(|t| Instant::now() + t);
        loop {
            match self.next_event(control, ceiling, "upload").await? {
                ControlEvent::Done(DoneDirection::Rx) => {
                    tracing::info!("Device accepted {} byte upload", payload.len());
                    return Ok(());
                }
                other => tracing::debug!("Ignoring control event during upload: {:?}", other),
            }
        }
    }

    /// Next well-formed control event. Malformed lines are logged and
    /// skipped, so an operation fed only garbage ends in a timeout.
    async fn next_event(
        &self,
        control: &mut NotificationStream,
        deadline: Option<Instant>,
        operation: &'static str,
    ) -> EngineResult<ControlEvent> {
        loop {
            let raw = match deadline {
                Some(deadline) => match time::timeout_at(deadline, control.recv()).await {
                    Ok(raw) => raw,
                    Err(_) => {
                        let limit = match operation {
                            "listing" => Some(self.config.list_timeout),
                            _ => self.config.transfer_timeout,
                        };
                        return Err(self.timeout(operation, limit));
                    }
                },
                None => control.recv().await,
            };
            let Some(raw) = raw else {
                return Err(self.link_error());
            };
            match ControlEvent::parse(&raw) {
                Ok(event) => return Ok(event),
                Err(e) => {
                    tracing::warn!("{}", e);
                    record_malformed_event();
                }
            }
        }
    }

    fn timeout(&self, operation: &'static str, after: Option<std::time::Duration>) -> EngineError {
        tracing::warn!("{} timed out", operation);
        EngineError::Timeout {
            operation,
            after: after.unwrap_or_default(),
        }
    }

    /// A notification stream ended: either we disconnected or the link died.
    fn link_error(&self) -> EngineError {
        if self.adapter.is_connected() {
            self.adapter.mark_link_lost();
            EngineError::LinkLost
        } else {
            EngineError::Disconnected
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Discard control events left over from an earlier operation.
fn drain_stale(control: &mut NotificationStream) {
    while let Ok(raw) = control.try_recv() {
        tracing::debug!(
            "Discarding stale control event {:?}",
            String::from_utf8_lossy(&raw)
        );
    }
}

fn release_on_link_failure<T>(guard: &mut Option<NotificationStream>, result: &EngineResult<T>) {
    if matches!(result, Err(EngineError::LinkLost | EngineError::Disconnected)) {
        *guard = None;
    }
}

fn failure_reason(err: &EngineError) -> &'static str {
    match err {
        EngineError::NotConnected => "not_connected",
        EngineError::Timeout { .. } => "timeout",
        EngineError::Disconnected => "disconnected",
        EngineError::LinkLost => "link_lost",
        EngineError::Transport(_) => "transport",
    }
}

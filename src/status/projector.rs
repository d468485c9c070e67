use tokio::sync::watch;

use crate::status::error::{StatusError, StatusResult};
use crate::status::types::{LinkStatus, Phase, StatusEvent};

/// Projects engine activity onto one [`LinkStatus`].
///
/// Every transition replaces the whole status under the channel's lock, so
/// observers never see a half-applied update.
pub struct StatusProjector {
    tx: watch::Sender<LinkStatus>,
}

impl Default for StatusProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusProjector {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LinkStatus::default());
        Self { tx }
    }

    /// Get current status
    pub fn current(&self) -> LinkStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.tx.subscribe()
    }

    /// Apply an event and publish the resulting status.
    pub fn transition(&self, event: StatusEvent) -> StatusResult<LinkStatus> {
        let mut outcome = Err(StatusError::InvalidTransition(String::new()));
        self.tx.send_if_modified(|status| match next_status(status, &event) {
            Ok(next) => {
                let changed = *status != next;
                *status = next.clone();
                outcome = Ok(next);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}

fn next_status(current: &LinkStatus, event: &StatusEvent) -> StatusResult<LinkStatus> {
    let mut next = current.clone();

    match (current.phase, event) {
        (_, StatusEvent::Disconnected) => return Ok(LinkStatus {
            generation: current.generation,
            ..LinkStatus::default()
        }),

        (_, StatusEvent::Failed { message }) => {
            next.phase = Phase::Error;
            next.error_msg = message.clone();
        }

        (Phase::Error, StatusEvent::Dismissed) => return Ok(LinkStatus {
            generation: current.generation,
            ..LinkStatus::default()
        }),

        (Phase::Error, _) => {
            return Err(invalid(current, event));
        }

        (_, StatusEvent::ConnectRequested) => {
            next = LinkStatus {
                phase: Phase::Connecting,
                generation: current.generation + 1,
                ..LinkStatus::default()
            };
        }

        (Phase::Connecting, StatusEvent::DeviceAcquired { device_name }) => {
            next.device_name = device_name.clone();
        }

        (Phase::Connecting, StatusEvent::SelectionCancelled) => {
            next.phase = Phase::Idle;
            next.progress = None;
        }

        (Phase::Connecting | Phase::Idle | Phase::Done, StatusEvent::ListingStarted) => {
            next.phase = Phase::Listing;
            next.generation += 1;
        }

        (_, StatusEvent::DownloadStarted { file_name }) if current.phase != Phase::Connecting => {
            next.phase = Phase::Downloading;
            next.file_name = file_name.clone();
            next.progress = None;
            next.generation += 1;
        }

        (Phase::Downloading, StatusEvent::Progress { percent }) => {
            next.progress = match (current.progress, percent) {
                (Some(prev), Some(p)) => Some(prev.max(*p)),
                (_, p) => p.or(current.progress),
            };
        }

        (Phase::Downloading, StatusEvent::Completed) => {
            next.phase = Phase::Done;
            next.progress = Some(100);
        }

        (Phase::Listing, StatusEvent::Completed) => {
            next.phase = Phase::Idle;
        }

        (Phase::Done, StatusEvent::Settled { generation }) if *generation == current.generation => {
            next.phase = Phase::Idle;
            next.file_name.clear();
            next.progress = None;
        }

        // A stale settle timer from an earlier operation.
        (_, StatusEvent::Settled { .. }) => {}

        _ => return Err(invalid(current, event)),
    }

    Ok(next)
}

fn invalid(current: &LinkStatus, event: &StatusEvent) -> StatusError {
    StatusError::InvalidTransition(format!(
        "Cannot handle {:?} in phase {:?}",
        event, current.phase
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projector_in(events: Vec<StatusEvent>) -> StatusProjector {
        let projector = StatusProjector::new();
        for event in events {
            projector.transition(event).unwrap();
        }
        projector
    }

    #[test]
    fn test_projector_creation() {
        let projector = StatusProjector::new();
        assert_eq!(projector.current().phase, Phase::Idle);
        assert_eq!(projector.current().progress, None);
    }

    #[test]
    fn test_connect_flow_to_done_and_idle() {
        let projector = projector_in(vec![
            StatusEvent::ConnectRequested,
            StatusEvent::DeviceAcquired {
                device_name: "LapTimer".into(),
            },
        ]);
        let status = projector.current();
        assert_eq!(status.phase, Phase::Connecting);
        assert_eq!(status.device_name, "LapTimer");

        projector.transition(StatusEvent::ListingStarted).unwrap();
        let status = projector
            .transition(StatusEvent::DownloadStarted {
                file_name: "20250815_0843.csv".into(),
            })
            .unwrap();
        assert_eq!(status.phase, Phase::Downloading);
        assert_eq!(status.progress, None);

        projector
            .transition(StatusEvent::Progress { percent: Some(40) })
            .unwrap();
        let done = projector.transition(StatusEvent::Completed).unwrap();
        assert_eq!(done.phase, Phase::Done);
        assert_eq!(done.progress, Some(100));
        assert_eq!(done.device_name, "LapTimer");

        let idle = projector
            .transition(StatusEvent::Settled {
                generation: done.generation,
            })
            .unwrap();
        assert_eq!(idle.phase, Phase::Idle);
        assert_eq!(idle.progress, None);
        assert!(idle.file_name.is_empty());
    }

    #[test]
    fn test_progress_never_decreases() {
        let projector = projector_in(vec![StatusEvent::DownloadStarted {
            file_name: "a.csv".into(),
        }]);
        projector
            .transition(StatusEvent::Progress { percent: Some(60) })
            .unwrap();
        let status = projector
            .transition(StatusEvent::Progress { percent: Some(30) })
            .unwrap();
        assert_eq!(status.progress, Some(60));
    }

    #[test]
    fn test_stale_settle_is_ignored() {
        let projector = projector_in(vec![
            StatusEvent::DownloadStarted {
                file_name: "a.csv".into(),
            },
            StatusEvent::Completed,
        ]);
        let first = projector.current().generation;
        projector
            .transition(StatusEvent::DownloadStarted {
                file_name: "b.csv".into(),
            })
            .unwrap();
        projector.transition(StatusEvent::Completed).unwrap();

        let status = projector
            .transition(StatusEvent::Settled { generation: first })
            .unwrap();
        assert_eq!(status.phase, Phase::Done);
        assert_eq!(status.file_name, "b.csv");
    }

    #[test]
    fn test_error_sticks_until_dismissed() {
        let projector = projector_in(vec![
            StatusEvent::ConnectRequested,
            StatusEvent::Failed {
                message: "link lost".into(),
            },
        ]);
        assert!(projector.current().is_error());
        assert_eq!(projector.current().error_msg, "link lost");

        assert!(projector.transition(StatusEvent::ListingStarted).is_err());
        assert!(projector
            .transition(StatusEvent::Settled { generation: 1 })
            .is_err());
        assert!(projector.current().is_error());

        let status = projector.transition(StatusEvent::Dismissed).unwrap();
        assert_eq!(status.phase, Phase::Idle);
        assert!(status.error_msg.is_empty());
    }

    #[test]
    fn test_selection_cancelled_returns_to_idle() {
        let projector = projector_in(vec![StatusEvent::ConnectRequested]);
        let status = projector
            .transition(StatusEvent::SelectionCancelled)
            .unwrap();
        assert_eq!(status.phase, Phase::Idle);
        assert!(!status.is_error());
    }

    #[test]
    fn test_invalid_transition() {
        let projector = StatusProjector::new();
        assert!(projector.transition(StatusEvent::Completed).is_err());
        assert!(projector.transition(StatusEvent::Dismissed).is_err());
        assert!(projector
            .transition(StatusEvent::DeviceAcquired {
                device_name: "x".into()
            })
            .is_err());
    }

    #[test]
    fn test_disconnect_twice_stays_idle() {
        let projector = projector_in(vec![StatusEvent::ConnectRequested]);
        for _ in 0..2 {
            let status = projector.transition(StatusEvent::Disconnected).unwrap();
            assert_eq!(status.phase, Phase::Idle);
        }
    }

    #[tokio::test]
    async fn test_observers_see_whole_updates() {
        let projector = StatusProjector::new();
        let mut rx = projector.subscribe();

        projector
            .transition(StatusEvent::DownloadStarted {
                file_name: "a.csv".into(),
            })
            .unwrap();
        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.phase, Phase::Downloading);
        assert_eq!(seen.file_name, "a.csv");
    }
}

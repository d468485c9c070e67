mod common;

use std::time::Duration;

use common::{client_for, lap_log, sample_tracks, stocked_device, NEWEST, OLDER};
use laplink::config::ClientConfig;
use laplink::engine::{DownloadTarget, EngineError};
use laplink::records::decode_session;
use laplink::status::Phase;
use laplink::transport::{ConnectBehavior, DeviceProfile, ListShape, SimulatedDevice};
use laplink::{ClientError, LapTimerClient};

/// Connect against both listing shapes and get the same newest session
#[tokio::test]
async fn test_connect_with_either_listing_shape() {
    let expected = decode_session(&lap_log("Tor Poznan", 40), NEWEST);

    for shape in [ListShape::SingleShot, ListShape::Streaming] {
        let device = stocked_device(DeviceProfile::default().with_list_shape(shape));
        let client = client_for(&device);

        let session = client.connect().await.unwrap().unwrap();
        println!("✓ {:?}: {} laps from {}", shape, session.laps.len(), session.name);

        assert_eq!(session.name, "20250815_0911");
        assert_eq!(session.track_name, "Tor Poznan");
        assert_eq!(session.laps, expected.laps);

        let files = client.state().session_files;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, NEWEST);
        assert_eq!(files[1].name, OLDER);
    }
}

/// Reassembly does not depend on how the link chunks the payload
#[tokio::test]
async fn test_chunking_does_not_change_payload() {
    let fixed = stocked_device(DeviceProfile::default());
    let baseline = client_for(&fixed).connect().await.unwrap().unwrap();

    for seed in [1, 2, 3, 42] {
        let device = stocked_device(DeviceProfile::default().with_random_split(seed));
        let session = client_for(&device).connect().await.unwrap().unwrap();
        assert_eq!(session.laps, baseline.laps, "seed {seed}");
    }
}

/// The last notification may arrive after `DONE;DIR=TX`, and the final one
/// may be NUL padded; neither shows up in the decoded text.
#[tokio::test]
async fn test_late_and_padded_final_chunk() {
    let log = lap_log("Tor Poznan", 40);
    for profile in [
        DeviceProfile::streaming_firmware(),
        DeviceProfile::legacy_firmware(),
    ] {
        let device = stocked_device(profile);
        let client = client_for(&device);
        client.connect().await.unwrap();

        let text = client
            .engine()
            .download(&DownloadTarget::Session(NEWEST.into()), |_| {})
            .await
            .unwrap();
        assert_eq!(text, log);
    }
}

/// Observers see the download finish and settle, with progress that never drops
#[tokio::test]
async fn test_status_walk_during_connect() {
    let device = stocked_device(DeviceProfile::default().with_random_split(9));
    let client = client_for(&device);

    let mut rx = client.subscribe_status();
    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            let settled = status.phase == Phase::Idle
                && seen.iter().any(|s: &laplink::status::LinkStatus| s.phase == Phase::Done);
            seen.push(status);
            if settled {
                break;
            }
        }
        seen
    });

    client.connect().await.unwrap();
    tokio::time::sleep(client.config().done_display_delay + Duration::from_millis(200)).await;
    let seen = watcher.await.unwrap();

    let phases: Vec<Phase> = seen.iter().map(|s| s.phase).collect();
    println!("✓ Phases: {:?}", phases);
    assert!(phases.contains(&Phase::Downloading));
    assert!(phases.contains(&Phase::Done));
    assert_eq!(phases.last(), Some(&Phase::Idle));

    let progress: Vec<u8> = seen
        .iter()
        .filter(|s| s.phase == Phase::Downloading)
        .filter_map(|s| s.progress)
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    let done = seen.iter().find(|s| s.phase == Phase::Done).unwrap();
    assert_eq!(done.progress, Some(100));
    assert_eq!(done.file_name, NEWEST);
}

/// Without a size announcement progress stays unknown, not zero
#[tokio::test]
async fn test_progress_unknown_without_size() {
    let device = stocked_device(DeviceProfile::default().without_size_announcement());
    let client = client_for(&device);
    client.connect().await.unwrap();

    let mut reports = Vec::new();
    client
        .engine()
        .download(&DownloadTarget::Session(OLDER.into()), |p| {
            reports.push(p.clone())
        })
        .await
        .unwrap();

    assert!(!reports.is_empty());
    assert!(reports.iter().all(|p| p.percent.is_none()));
    assert!(reports.iter().all(|p| p.expected_size.is_none()));
}

/// A device that never answers fails the listing, and the error sticks
#[tokio::test(start_paused = true)]
async fn test_silent_device_times_out() {
    let device = stocked_device(DeviceProfile::default().silent());
    let client = client_for(&device);

    let err = client.connect().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Engine(EngineError::Timeout {
            operation: "listing",
            ..
        })
    ));

    let status = client.status();
    assert_eq!(status.phase, Phase::Error);
    assert!(!status.error_msg.is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(client.status().phase, Phase::Error);

    client.dismiss_error().await.unwrap();
    assert_eq!(client.status().phase, Phase::Idle);
    assert!(!device.is_connected());
}

/// Events left over between operations do not leak into the next one
#[tokio::test]
async fn test_stale_control_events_are_discarded() {
    let device = stocked_device(DeviceProfile::default());
    let config = ClientConfig {
        auto_download_newest: false,
        ..ClientConfig::default()
    };
    let client = LapTimerClient::new(device.clone(), config);
    client.connect().await.unwrap();

    device.push_control("CMD=GET;SIZE=lots;");
    device.push_control("CMD=DONE;DIR=TX;");
    let session = client.load_session(OLDER).await.unwrap();
    assert_eq!(session.laps.len(), 3);
}

#[tokio::test]
async fn test_cancelled_selection_stays_quiet() {
    let device =
        SimulatedDevice::new(DeviceProfile::default().with_connect(ConnectBehavior::UserCancels));
    let client = client_for(&device);

    assert!(client.connect().await.unwrap().is_none());
    let state = client.state();
    assert!(!state.connected);
    assert_eq!(state.status.phase, Phase::Idle);
    assert!(state.status.error_msg.is_empty());
    assert_eq!(device.connect_attempts(), 1);
}

#[tokio::test]
async fn test_link_failure_surfaces_error() {
    let device = SimulatedDevice::new(
        DeviceProfile::default().with_connect(ConnectBehavior::Fail("out of range".into())),
    );
    let client = client_for(&device);

    assert!(client.connect().await.is_err());
    assert!(client.status().error_msg.contains("out of range"));

    client.dismiss_error().await.unwrap();
    assert_eq!(client.status().phase, Phase::Idle);
}

/// Tracks uploaded from records come back unchanged
#[tokio::test]
async fn test_track_upload_round_trip() {
    let device = SimulatedDevice::default();
    let client = client_for(&device);
    client.connect().await.unwrap();

    let tracks = sample_tracks();
    client.upload_tracks(&tracks).await.unwrap();

    let stored = String::from_utf8(device.tracks()).unwrap();
    assert!(stored.starts_with("1;Suzuka;348431000;1365410000;"));

    assert!(stored.contains("\n3;Monza;456156000;9281100;456158000;9281300"));

    let loaded = client.load_tracks().await.unwrap();
    assert_eq!(loaded.len(), tracks.len());
    for (got, sent) in loaded.iter().zip(&tracks) {
        assert_eq!(got.name, sent.name);
        for (a, b) in [
            (got.finish_line_point1, sent.finish_line_point1),
            (got.finish_line_point2, sent.finish_line_point2),
        ] {
            assert!((a.lat - b.lat).abs() < 1e-6, "{}: {:?} != {:?}", got.name, a, b);
            assert!((a.lng - b.lng).abs() < 1e-6, "{}: {:?} != {:?}", got.name, a, b);
        }
        println!("✓ {} round trip", got.name);
    }

    let raw = client.load_tracks_csv().await.unwrap();
    assert_eq!(raw, stored);
}

/// Large uploads go out in chunks no bigger than the configured size
#[tokio::test]
async fn test_upload_is_chunked() {
    let device = SimulatedDevice::default();
    let client = client_for(&device);
    client.connect().await.unwrap();

    let csv: String = (1..=20)
        .map(|i| format!("{i};Track {i};523948000;16796300;523951000;16796800\n"))
        .collect();
    client.upload_tracks_text(&csv).await.unwrap();

    let writes = device.data_writes();
    let total: usize = writes.iter().map(|(len, _)| len).sum();
    assert_eq!(total, csv.len());
    assert!(writes.iter().all(|(len, _)| *len <= 160));
    assert_eq!(device.tracks(), csv.as_bytes());
}

#[tokio::test]
async fn test_refresh_and_disconnect_twice() {
    let device = stocked_device(DeviceProfile::streaming_firmware());
    let client = client_for(&device);
    client.connect().await.unwrap();

    device.add_session("20250816_0800.csv", lap_log("Tor Poznan", 2));
    tokio::time::sleep(client.config().done_display_delay + Duration::from_millis(100)).await;
    let files = client.refresh_sessions().await.unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(files[0].name, "20250816_0800.csv");

    for _ in 0..2 {
        client.disconnect().await.unwrap();
        assert_eq!(client.status().phase, Phase::Idle);
        assert!(!client.state().connected);
    }

    let err = client.refresh_sessions().await.unwrap_err();
    assert_eq!(err, ClientError::Engine(EngineError::NotConnected));
}

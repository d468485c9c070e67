#![allow(dead_code)]

use laplink::config::ClientConfig;
use laplink::records::{Coordinate, Track};
use laplink::transport::{DeviceProfile, SimulatedDevice};
use laplink::LapTimerClient;

pub const NEWEST: &str = "20250815_0911.csv";
pub const OLDER: &str = "20250814_1702.csv";

/// A device lap log with `laps` rows, long enough to span many notifications.
pub fn lap_log(track: &str, laps: u32) -> String {
    let mut out = format!(
        "track;{track}\nlap_no;lap_start_date;lap_start_time;lap_time_ms;lap_time\n"
    );
    for lap in 1..=laps {
        let ms = 63_000 + (lap * 137) % 2_500;
        out.push_str(&format!(
            "{lap};2025-08-15;09:{:02}:{:02};{ms};{}:{:02}.{:03}\n",
            10 + lap / 60,
            lap % 60,
            ms / 60_000,
            (ms % 60_000) / 1000,
            ms % 1000
        ));
    }
    out
}

pub fn stocked_device(profile: DeviceProfile) -> SimulatedDevice {
    let device = SimulatedDevice::new(profile);
    device.add_session(OLDER, lap_log("Tor Kielce", 3));
    device.add_session(NEWEST, lap_log("Tor Poznan", 40));
    device
}

pub fn client_for(device: &SimulatedDevice) -> LapTimerClient<SimulatedDevice> {
    LapTimerClient::new(device.clone(), ClientConfig::default())
}

/// Real circuits, including longitudes close to the prime meridian.
pub fn sample_tracks() -> Vec<Track> {
    vec![
        Track::new(
            "Suzuka",
            Coordinate::new(34.8431, 136.5410),
            Coordinate::new(34.8433, 136.5414),
        ),
        Track::new(
            "Tor Poznan",
            Coordinate::new(52.3948, 16.7963),
            Coordinate::new(52.3951, 16.7968),
        ),
        Track::new(
            "Monza",
            Coordinate::new(45.6156, 9.2811),
            Coordinate::new(45.6158, 9.2813),
        ),
        Track::new(
            "Circuit of the Americas",
            Coordinate::new(30.1346, -97.6411),
            Coordinate::new(30.1348, -97.6413),
        ),
    ]
}

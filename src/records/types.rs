use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One lap from a session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    pub lap_number: u32,
    pub time_ms: u64,
    /// `M:SS.mmm`
    pub time_text: String,
    pub session_name: String,
    pub track_name: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
}

impl LapRecord {
    /// Signed difference to `reference` in milliseconds; positive means slower.
    pub fn delta_to(&self, reference: &LapRecord) -> i64 {
        self.time_ms as i64 - reference.time_ms as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub date: String,
    pub track_name: String,
    /// In file order, which is lap order.
    pub laps: Vec<LapRecord>,
}

impl Session {
    /// Fastest lap; the earliest one wins a tie.
    pub fn best_lap(&self) -> Option<&LapRecord> {
        self.laps.iter().reduce(|best, lap| {
            if lap.time_ms < best.time_ms {
                lap
            } else {
                best
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A track is identified by its finish line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    pub finish_line_point1: Coordinate,
    pub finish_line_point2: Coordinate,
}

impl Track {
    pub fn new(name: impl Into<String>, point1: Coordinate, point2: Coordinate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            finish_line_point1: point1,
            finish_line_point2: point2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap(n: u32, ms: u64) -> LapRecord {
        LapRecord {
            lap_number: n,
            time_ms: ms,
            time_text: String::new(),
            session_name: "s".into(),
            track_name: String::new(),
            date: "2025-08-15".into(),
            start_time: "09:00".into(),
        }
    }

    #[test]
    fn test_best_lap_first_on_tie() {
        let session = Session {
            id: "x".into(),
            name: "s".into(),
            date: "2025-08-15".into(),
            track_name: String::new(),
            laps: vec![lap(1, 62000), lap(2, 60500), lap(3, 60500), lap(4, 61000)],
        };
        let best = session.best_lap().unwrap();
        assert_eq!(best.lap_number, 2);
        assert_eq!(session.laps[3].delta_to(best), 500);
        assert_eq!(lap(9, 60000).delta_to(best), -500);
    }

    #[test]
    fn test_best_lap_empty_session() {
        let session = Session {
            id: "x".into(),
            name: "s".into(),
            date: "2025-08-15".into(),
            track_name: String::new(),
            laps: vec![],
        };
        assert!(session.best_lap().is_none());
    }

    #[test]
    fn test_track_ids_are_unique() {
        let p = Coordinate::new(52.0, 16.0);
        assert_ne!(Track::new("a", p, p).id, Track::new("a", p, p).id);
    }

    #[test]
    fn test_json_field_names() {
        let track = Track::new("Poznan", Coordinate::new(52.4, 16.8), Coordinate::new(52.5, 16.9));
        let json = serde_json::to_value(&track).unwrap();
        assert!(json.get("finishLinePoint1").is_some());
        assert_eq!(json["finishLinePoint2"]["lng"], 16.9);
    }
}

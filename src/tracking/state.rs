use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, GeoSample, PathFilter};

use super::WalkEvent;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackingStatus {
    #[default]
    Idle,
    Tracking,
    ConfirmingStop,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Idle => "Idle",
            TrackingStatus::Tracking => "Tracking",
            TrackingStatus::ConfirmingStop => "ConfirmingStop",
        }
    }
}

/// The in-progress walk for one pet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    pub pet_id: String,
    pub status: TrackingStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Recomputed from `started_at` while tracking; frozen while confirming stop.
    pub elapsed_seconds: u64,
    pub path: Vec<GeoPoint>,
    pub total_distance_meters: f64,
    pub events: Vec<WalkEvent>,
}

impl TrackingSession {
    pub fn new(pet_id: impl Into<String>) -> Self {
        Self {
            pet_id: pet_id.into(),
            status: TrackingStatus::Idle,
            started_at: None,
            elapsed_seconds: 0,
            path: Vec::new(),
            total_distance_meters: 0.0,
            events: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != TrackingStatus::Idle
    }

    pub fn begin(&mut self, now: DateTime<Utc>) {
        *self = Self {
            pet_id: std::mem::take(&mut self.pet_id),
            status: TrackingStatus::Tracking,
            started_at: Some(now),
            elapsed_seconds: 0,
            path: Vec::new(),
            total_distance_meters: 0.0,
            events: Vec::new(),
        };
    }

    pub fn elapsed_at(&self, now: DateTime<Utc>) -> u64 {
        match (self.status, self.started_at) {
            (TrackingStatus::Tracking, Some(started_at)) => {
                (now - started_at).num_seconds().max(0) as u64
            }
            _ => self.elapsed_seconds,
        }
    }

    pub fn sync_elapsed(&mut self, now: DateTime<Utc>) {
        self.elapsed_seconds = self.elapsed_at(now);
    }

    pub fn last_point(&self) -> Option<GeoPoint> {
        self.path.last().copied()
    }

    /// Runs `sample` through `filter` and extends the path when accepted.
    /// Returns the distance added, or `None` when the sample was dropped.
    pub fn apply_sample(&mut self, filter: &PathFilter, sample: &GeoSample) -> Option<f64> {
        if self.status != TrackingStatus::Tracking {
            return None;
        }

        let decision = filter.accept(sample, &self.path);
        if !decision.accept {
            return None;
        }

        self.path.push(sample.point());
        self.total_distance_meters += decision.distance_delta;
        Some(decision.distance_delta)
    }

    pub fn freeze(&mut self, now: DateTime<Utc>) {
        self.sync_elapsed(now);
        self.status = TrackingStatus::ConfirmingStop;
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.status = TrackingStatus::Tracking;
        self.sync_elapsed(now);
    }

    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.pet_id));
    }

    pub fn distance_meters_rounded(&self) -> u64 {
        self.total_distance_meters.round().max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{path_length_meters, MIN_MOVEMENT_METERS};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn sample(lat: f64, lon: f64) -> GeoSample {
        GeoSample {
            lat,
            lon,
            accuracy: None,
            timestamp: t0(),
        }
    }

    #[test]
    fn begin_resets_everything_but_pet() {
        let mut session = TrackingSession::new("rex");
        session.path.push(GeoPoint::new(1.0, 1.0));
        session.total_distance_meters = 40.0;
        session.begin(t0());

        assert_eq!(session.pet_id, "rex");
        assert_eq!(session.status, TrackingStatus::Tracking);
        assert_eq!(session.started_at, Some(t0()));
        assert!(session.path.is_empty());
        assert_eq!(session.total_distance_meters, 0.0);
    }

    #[test]
    fn distance_matches_path_after_mixed_samples() {
        let filter = PathFilter::default();
        let mut session = TrackingSession::new("rex");
        session.begin(t0());

        let fixes = [
            (0.0, 0.0),
            (0.0, 0.000005),
            (0.0, 0.001),
            (0.0005, 0.001),
            (0.0005, 0.001001),
            (0.0012, 0.0013),
        ];
        for (lat, lon) in fixes {
            session.apply_sample(&filter, &sample(lat, lon));
        }

        assert_eq!(session.path.len(), 4);
        assert!((session.total_distance_meters - path_length_meters(&session.path)).abs() < 1e-6);
    }

    #[test]
    fn seeded_replay_keeps_distance_equal_to_path_length() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        const METERS_PER_DEGREE: f64 = 111_195.0;
        let filter = PathFilter::default();
        let mut rng = StdRng::seed_from_u64(0x9e7);
        let mut session = TrackingSession::new("rex");
        session.begin(t0());
        session.apply_sample(&filter, &sample(48.8566, 2.3522));

        let (mut accepted, mut rejected) = (0, 0);
        for _ in 0..500 {
            let last = *session.path.last().unwrap();
            let fix = if rng.gen_bool(0.4) {
                // under 1.6 m from the last accepted point
                sample(
                    last.lat + rng.gen_range(-1e-5..1e-5),
                    last.lon + rng.gen_range(-1e-5..1e-5),
                )
            } else {
                let meters = rng.gen_range(3.0..30.0);
                let bearing: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
                sample(
                    last.lat + meters * bearing.cos() / METERS_PER_DEGREE,
                    last.lon
                        + meters * bearing.sin() / (METERS_PER_DEGREE * last.lat.to_radians().cos()),
                )
            };

            let (len_before, distance_before) = (session.path.len(), session.total_distance_meters);
            match session.apply_sample(&filter, &fix) {
                Some(delta) => {
                    accepted += 1;
                    assert!(delta >= MIN_MOVEMENT_METERS);
                    assert_eq!(session.path.len(), len_before + 1);
                    assert!((session.total_distance_meters - (distance_before + delta)).abs() < 1e-9);
                }
                None => {
                    rejected += 1;
                    assert_eq!(session.path.len(), len_before);
                    assert_eq!(session.total_distance_meters, distance_before);
                }
            }
        }

        assert!(accepted > 100 && rejected > 100);
        let expected = path_length_meters(&session.path);
        assert!((session.total_distance_meters - expected).abs() < 1e-6 * expected.max(1.0));
    }

    #[test]
    fn samples_ignored_outside_tracking() {
        let filter = PathFilter::default();
        let mut session = TrackingSession::new("rex");
        assert!(session.apply_sample(&filter, &sample(0.0, 0.0)).is_none());

        session.begin(t0());
        session.apply_sample(&filter, &sample(0.0, 0.0));
        session.freeze(t0());
        assert!(session.apply_sample(&filter, &sample(0.0, 0.01)).is_none());
        assert_eq!(session.path.len(), 1);
    }

    #[test]
    fn elapsed_freezes_on_stop_and_recomputes_on_resume() {
        let mut session = TrackingSession::new("rex");
        session.begin(t0());
        session.sync_elapsed(t0() + Duration::seconds(61));
        assert_eq!(session.elapsed_seconds, 61);

        session.freeze(t0() + Duration::seconds(300));
        assert_eq!(session.elapsed_at(t0() + Duration::seconds(500)), 300);

        session.resume(t0() + Duration::seconds(320));
        assert_eq!(session.elapsed_seconds, 320);
        assert_eq!(session.started_at, Some(t0()));
    }

    #[test]
    fn clock_skew_never_goes_negative() {
        let mut session = TrackingSession::new("rex");
        session.begin(t0());
        assert_eq!(session.elapsed_at(t0() - Duration::seconds(5)), 0);
    }
}

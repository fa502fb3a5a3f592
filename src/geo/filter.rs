use super::{haversine_meters, GeoPoint, GeoSample};

/// Movement below this is treated as stationary GPS jitter.
pub const MIN_MOVEMENT_METERS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterDecision {
    pub accept: bool,
    pub distance_delta: f64,
}

impl FilterDecision {
    fn rejected() -> Self {
        Self {
            accept: false,
            distance_delta: 0.0,
        }
    }
}

/// Decides which raw samples extend the walk path. Pure function of its inputs,
/// so a recorded sample stream always replays to the same path and distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathFilter {
    pub min_movement_meters: f64,
    /// Samples reporting a larger accuracy radius are dropped. `None` disables the check.
    pub max_accuracy_meters: Option<f64>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            min_movement_meters: MIN_MOVEMENT_METERS,
            max_accuracy_meters: None,
        }
    }
}

impl PathFilter {
    pub fn new(min_movement_meters: f64, max_accuracy_meters: Option<f64>) -> Self {
        Self {
            min_movement_meters: min_movement_meters.max(0.0),
            max_accuracy_meters,
        }
    }

    pub fn accept(&self, sample: &GeoSample, current_path: &[GeoPoint]) -> FilterDecision {
        let point = sample.point();
        if !point.is_valid() {
            return FilterDecision::rejected();
        }

        if let (Some(limit), Some(accuracy)) = (self.max_accuracy_meters, sample.accuracy) {
            if accuracy > limit {
                return FilterDecision::rejected();
            }
        }

        let Some(last) = current_path.last() else {
            // Seed point
            return FilterDecision {
                accept: true,
                distance_delta: 0.0,
            };
        };

        let distance = haversine_meters(last, &point);
        if distance >= self.min_movement_meters {
            FilterDecision {
                accept: true,
                distance_delta: distance,
            }
        } else {
            FilterDecision::rejected()
        }
    }
}

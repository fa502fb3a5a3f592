use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::geo::{GeoPoint, GeoSample};
use crate::{log_info, log_warn};

use super::{GeoSampler, SampleSink, SamplerMessage, SamplerSubscription, SamplingFault, SamplingFaultKind};

const ENABLE_LOGS: bool = true;

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

#[derive(Debug, Clone)]
pub struct SimulatedSamplerConfig {
    pub origin: GeoPoint,
    pub interval: Duration,
    /// Walking pace in meters per second.
    pub speed_mps: f64,
    /// Max random offset added to each fix, in meters.
    pub jitter_meters: f64,
    /// Chance per tick of reporting signal loss instead of a fix.
    pub fault_probability: f64,
    pub seed: Option<u64>,
}

impl Default for SimulatedSamplerConfig {
    fn default() -> Self {
        Self {
            origin: GeoPoint::new(0.0, 0.0),
            interval: Duration::from_secs(1),
            speed_mps: 1.3,
            jitter_meters: 1.5,
            fault_probability: 0.0,
            seed: None,
        }
    }
}

/// Random-walk fix generator for demos and manual testing without a device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSampler {
    config: SimulatedSamplerConfig,
}

impl SimulatedSampler {
    pub fn new(config: SimulatedSamplerConfig) -> Self {
        Self { config }
    }
}

impl GeoSampler for SimulatedSampler {
    fn start(&self, sink: SampleSink) -> Result<SamplerSubscription> {
        if self.config.interval.is_zero() {
            bail!("simulated sampler interval must be greater than zero");
        }
        if !self.config.origin.is_valid() {
            bail!("simulated sampler origin is not a valid coordinate");
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(random_walk(self.config.clone(), sink, token.clone()));
        Ok(SamplerSubscription::new(token, Some(handle)))
    }
}

async fn random_walk(config: SimulatedSamplerConfig, sink: SampleSink, cancel_token: CancellationToken) {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let fault_probability = config.fault_probability.clamp(0.0, 1.0);
    let step_meters = config.speed_mps.max(0.0) * config.interval.as_secs_f64();
    let mut position = config.origin;
    let mut heading: f64 = rng.gen_range(0.0..std::f64::consts::TAU);

    log_info!("simulated sampler started at {:.5},{:.5}", position.lat, position.lon);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let message = if rng.gen_bool(fault_probability) {
                    log_warn!("simulated sampler dropping fix (signal lost)");
                    SamplerMessage::Fault(SamplingFault::new(
                        SamplingFaultKind::SignalLost,
                        "simulated signal loss",
                    ))
                } else {
                    heading += rng.gen_range(-0.4..0.4);
                    position = offset(position, step_meters * heading.cos(), step_meters * heading.sin());

                    let jitter = config.jitter_meters.max(0.0);
                    let fix = if jitter > 0.0 {
                        offset(position, rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
                    } else {
                        position
                    };
                    SamplerMessage::Sample(GeoSample {
                        lat: fix.lat,
                        lon: fix.lon,
                        accuracy: Some(jitter.max(3.0)),
                        timestamp: Utc::now(),
                    })
                };

                if sink.send(message).is_err() {
                    log_info!("simulated sampler receiver closed");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("simulated sampler shutting down");
                break;
            }
        }
    }
}

/// Moves `point` by a local north/east offset in meters.
fn offset(point: GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    let lat = (point.lat + north_m / METERS_PER_DEGREE_LAT).clamp(-89.9, 89.9);
    let meters_per_degree_lon = METERS_PER_DEGREE_LAT * lat.to_radians().cos().max(1e-6);
    let mut lon = point.lon + east_m / meters_per_degree_lon;
    if lon > 180.0 {
        lon -= 360.0;
    } else if lon < -180.0 {
        lon += 360.0;
    }
    GeoPoint::new(lat, lon)
}

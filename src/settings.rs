use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{
    geo::{GeoPoint, PathFilter, MIN_MOVEMENT_METERS},
    sampler::{GeoSampler, ManualSampler, SimulatedSampler, SimulatedSamplerConfig},
    tracking::TrackingConfig,
};

pub const DATA_DIR_ENV: &str = "PAWTRAIL_DATA_DIR";
pub const DEBUG_ENV: &str = "PAWTRAIL_DEBUG";
pub const PET_ENV: &str = "PAWTRAIL_PET";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SamplerKind {
    #[default]
    Manual,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingSettings {
    pub active_pet_id: String,
    pub min_movement_meters: f64,
    pub max_accuracy_meters: Option<f64>,
    pub tick_interval_ms: u64,
    pub sampler: SamplerKind,
    pub simulated_interval_ms: u64,
    pub simulated_origin: GeoPoint,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            active_pet_id: "default".into(),
            min_movement_meters: MIN_MOVEMENT_METERS,
            max_accuracy_meters: None,
            tick_interval_ms: 1000,
            sampler: SamplerKind::Manual,
            simulated_interval_ms: 1000,
            simulated_origin: GeoPoint::new(0.0, 0.0),
        }
    }
}

impl TrackingSettings {
    pub fn tracking_config(&self) -> TrackingConfig {
        TrackingConfig::new(
            PathFilter::new(self.min_movement_meters, self.max_accuracy_meters),
            Duration::from_millis(self.tick_interval_ms),
        )
    }

    /// Builds the configured sampler. The manual handle is returned separately
    /// so the host can feed it.
    pub fn build_sampler(&self) -> (Arc<dyn GeoSampler>, Option<ManualSampler>) {
        match self.sampler {
            SamplerKind::Manual => {
                let manual = ManualSampler::new();
                (Arc::new(manual.clone()), Some(manual))
            }
            SamplerKind::Simulated => {
                let simulated = SimulatedSampler::new(SimulatedSamplerConfig {
                    origin: self.simulated_origin,
                    interval: Duration::from_millis(self.simulated_interval_ms.max(100)),
                    ..Default::default()
                });
                (Arc::new(simulated), None)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct UserSettings {
    tracking: TrackingSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Settings with environment overrides applied.
    pub fn tracking(&self) -> TrackingSettings {
        let mut settings = self.read().tracking.clone();
        if let Ok(pet_id) = std::env::var(PET_ENV) {
            if !pet_id.trim().is_empty() {
                settings.active_pet_id = pet_id;
            }
        }
        settings
    }

    pub fn update_tracking(&self, settings: TrackingSettings) -> Result<()> {
        let mut guard = self.write();
        guard.tracking = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized =
            serde_json::to_string_pretty(data).context("Failed to serialize settings")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("Failed to write settings to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pawtrail-data"))
}

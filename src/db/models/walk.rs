//! Finished walk records, as handed to the walk submission client.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::tracking::WalkEvent;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalkRecord {
    pub id: String,
    pub pet_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub distance_meters: u64,
    pub path: Vec<GeoPoint>,
    pub events: Vec<WalkEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/update payload for a walk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewWalk {
    pub pet_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub distance_meters: u64,
    pub path: Vec<GeoPoint>,
    pub events: Vec<WalkEvent>,
}

impl NewWalk {
    pub fn validate(&self) -> Result<()> {
        if self.pet_id.trim().is_empty() {
            bail!("walk is missing a pet id");
        }
        if self.end_time < self.start_time {
            bail!(
                "walk ends ({}) before it starts ({})",
                self.end_time.to_rfc3339(),
                self.start_time.to_rfc3339()
            );
        }
        Ok(())
    }
}

//! In-walk event log.
//!
//! Events are appended only while the session is tracking. At stop time the
//! caller may confirm canonical kinds that were never logged; those land at the
//! frozen elapsed time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

use super::{TrackingSession, TrackingStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WalkEventKind {
    #[serde(rename = "elimination-a")]
    Urination,
    #[serde(rename = "elimination-b")]
    Defecation,
}

impl WalkEventKind {
    /// Kinds the stop prompt asks about.
    pub const CANONICAL: [WalkEventKind; 2] = [WalkEventKind::Urination, WalkEventKind::Defecation];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalkEventKind::Urination => "elimination-a",
            WalkEventKind::Defecation => "elimination-b",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalkEvent {
    #[serde(rename = "type")]
    pub kind: WalkEventKind,
    pub elapsed_seconds: u64,
    pub position: Option<GeoPoint>,
    pub occurred_at: DateTime<Utc>,
}

/// Appends one event to a tracking session. Returns `None` (and leaves the
/// session untouched) outside `Tracking`.
pub fn log_event(
    session: &mut TrackingSession,
    kind: WalkEventKind,
    now: DateTime<Utc>,
) -> Option<WalkEvent> {
    if session.status != TrackingStatus::Tracking {
        return None;
    }

    let event = WalkEvent {
        kind,
        elapsed_seconds: session.elapsed_at(now),
        position: session.last_point(),
        occurred_at: now,
    };
    session.events.push(event.clone());
    Some(event)
}

/// Stop-prompt confirmation: records `kind` at the frozen elapsed time, at most
/// once per kind.
pub fn confirm_missing_event(
    session: &mut TrackingSession,
    kind: WalkEventKind,
    now: DateTime<Utc>,
) -> Option<WalkEvent> {
    if session.status != TrackingStatus::ConfirmingStop {
        return None;
    }
    if session.events.iter().any(|event| event.kind == kind) {
        return None;
    }

    let event = WalkEvent {
        kind,
        elapsed_seconds: session.elapsed_seconds,
        position: session.last_point(),
        occurred_at: now,
    };
    session.events.push(event.clone());
    Some(event)
}

pub fn missing_canonical_kinds(events: &[WalkEvent]) -> Vec<WalkEventKind> {
    WalkEventKind::CANONICAL
        .into_iter()
        .filter(|kind| !events.iter().any(|event| event.kind == *kind))
        .collect()
}

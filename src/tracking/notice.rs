use serde::Serialize;

use crate::db::WalkRecord;
use crate::sampler::SamplingFault;

use super::{
    format::{format_distance_km, format_elapsed},
    missing_canonical_kinds, TrackingSession, TrackingStatus, WalkEventKind,
};

/// Which user actions are currently allowed. Invalid transitions are kept out
/// of reach by disabling the matching control.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Controls {
    pub start: bool,
    pub log_event: bool,
    pub stop: bool,
    pub confirmable_events: Vec<WalkEventKind>,
    pub cancel_stop: bool,
    pub save: bool,
    pub discard: bool,
}

impl Controls {
    pub fn for_session(session: &TrackingSession, submitting: bool) -> Self {
        let confirming = session.status == TrackingStatus::ConfirmingStop && !submitting;
        Self {
            start: session.status == TrackingStatus::Idle,
            log_event: session.status == TrackingStatus::Tracking,
            stop: session.status == TrackingStatus::Tracking,
            confirmable_events: if confirming {
                missing_canonical_kinds(&session.events)
            } else {
                Vec::new()
            },
            cancel_stop: confirming,
            save: confirming,
            discard: confirming,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub session: TrackingSession,
    pub elapsed_display: String,
    pub distance_meters: u64,
    pub distance_km_display: String,
    pub controls: Controls,
    pub last_fault: Option<SamplingFault>,
    pub submitting: bool,
}

impl TrackingSnapshot {
    pub fn new(session: TrackingSession, last_fault: Option<SamplingFault>, submitting: bool) -> Self {
        Self {
            elapsed_display: format_elapsed(session.elapsed_seconds),
            distance_meters: session.distance_meters_rounded(),
            distance_km_display: format_distance_km(session.total_distance_meters),
            controls: Controls::for_session(&session, submitting),
            session,
            last_fault,
            submitting,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TrackingNotice {
    StateChanged {
        snapshot: TrackingSnapshot,
    },
    Tick {
        pet_id: String,
        elapsed_seconds: u64,
        elapsed_display: String,
    },
    SamplingFault {
        pet_id: String,
        fault: SamplingFault,
    },
    SubmissionFailed {
        pet_id: String,
        message: String,
    },
    WalkSaved {
        pet_id: String,
        walk: WalkRecord,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn idle_only_allows_start() {
        let controls = Controls::for_session(&TrackingSession::new("rex"), false);
        assert!(controls.start);
        assert!(!controls.log_event && !controls.stop && !controls.save);
    }

    #[test]
    fn confirming_offers_missing_kinds_until_submitting() {
        let mut session = TrackingSession::new("rex");
        session.begin(Utc::now());
        session.freeze(Utc::now());

        let controls = Controls::for_session(&session, false);
        assert_eq!(controls.confirmable_events, WalkEventKind::CANONICAL.to_vec());
        assert!(controls.save && controls.cancel_stop && controls.discard);
        assert!(!controls.start && !controls.log_event);

        let busy = Controls::for_session(&session, true);
        assert!(!busy.save && !busy.cancel_stop && busy.confirmable_events.is_empty());
    }

    #[test]
    fn notice_serializes_with_type_tag() {
        let notice = TrackingNotice::Tick {
            pet_id: "rex".into(),
            elapsed_seconds: 65,
            elapsed_display: "01:05".into(),
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["type"], "tick");
        assert_eq!(json["petId"], "rex");
        assert_eq!(json["elapsedSeconds"], 65);
    }
}

pub mod controller;
pub mod events;
pub mod format;
pub mod notice;
pub mod registry;
pub mod state;

pub use controller::{ControllerDeps, StopPrompt, TrackingConfig, TrackingController, Transition};
pub use events::{confirm_missing_event, log_event, missing_canonical_kinds, WalkEvent, WalkEventKind};
pub use notice::{Controls, TrackingNotice, TrackingSnapshot};
pub use registry::WalkTracker;
pub use state::{TrackingSession, TrackingStatus};

pub mod active_sessions;
pub mod walks;

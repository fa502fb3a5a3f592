pub mod walk;

pub use walk::{NewWalk, WalkRecord};

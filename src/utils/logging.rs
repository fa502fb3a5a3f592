//! Logging macros gated on a module-level `ENABLE_LOGS` const, for modules
//! whose loops would otherwise flood the log (samplers, background tasks).
//!
//! ```ignore
//! const ENABLE_LOGS: bool = false;
//! use crate::log_info;
//!
//! log_info!("fix accepted: {:.5},{:.5}", lat, lon);
//! ```

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

//! Helpers for unit tests

/// Writes an info! message to the ut logger
#[macro_export]
macro_rules! ut_info {
    ($($arg:tt)+) => {
        log::info!(target: "ut", $($arg)+);
    };
}

/// Writes a debug! message to the ut logger
#[macro_export]
macro_rules! ut_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "ut", $($arg)+);
    };
}

//! Internal diagnostics, compiled out entirely unless the `layers` feature
//! is enabled.
//!
//! These are this crate's own instrumentation (registry mutations, buffer
//! refcount anomalies, filter exceptions swallowed per spec.md §4.10) and
//! are distinct from [`crate::event::EventListener`], which is the public
//! hook applications register for request-scoped tracing.

#![allow(unused_macros)]

macro_rules! debug {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::debug!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "tracing")))]
        log::debug!($($arg)+);
    }
}

macro_rules! trace {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::trace!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "tracing")))]
        log::trace!($($arg)+);
    }
}

macro_rules! warn {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::warn!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "tracing")))]
        log::warn!($($arg)+);
    }
}

macro_rules! error {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::error!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "tracing")))]
        log::error!($($arg)+);
    }
}

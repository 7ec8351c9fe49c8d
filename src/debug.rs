//! Debug-time logging helpers.

/// Logs a [`log::warn!`] message at most once per call site.
///
/// The teacher's device models and CSR emulation reach for this same idiom (e.g.
/// "PMP lock bits are not yet supported") to flag architecturally-legal but unusual
/// guest behaviour without flooding the log on a hot path.
macro_rules! warn_once {
    ($($arg:tt)*) => {{
        use std::sync::atomic::{AtomicBool, Ordering};
        static WARNED: AtomicBool = AtomicBool::new(false);
        if !WARNED.swap(true, Ordering::Relaxed) {
            log::warn!($($arg)*);
        }
    }};
}

pub(crate) use warn_once;

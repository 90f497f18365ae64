//! Logging facade for the regionstats workspace
//!
//! Every crate logs through these macros so that a single switch controls
//! output for the engine and the command-line tool.
//!
//! Usage:
//! - Set REGIONSTATS_LOG=off (default) - no logs
//! - Set REGIONSTATS_LOG=info - request start/finish
//! - Set REGIONSTATS_LOG=debug - per-stage details (scale, page counts, buckets)

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable consulted by [`init_diagnostics`]
pub const LOG_ENV: &str = "REGIONSTATS_LOG";

static INIT: Once = Once::new();

/// Minimum level parsed from a `REGIONSTATS_LOG` value, `None` meaning off.
///
/// Unknown values fall back to info.
#[must_use]
pub fn parse_level(value: &str) -> Option<emit::Level> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" | "" => None,
        "debug" => Some(emit::Level::Debug),
        "info" => Some(emit::Level::Info),
        "warn" => Some(emit::Level::Warn),
        "error" => Some(emit::Level::Error),
        _ => Some(emit::Level::Info),
    }
}

/// Initialize diagnostics based on the REGIONSTATS_LOG environment variable
///
/// Call once at application startup. Later calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let value = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());

        let Some(level) = parse_level(&value) else {
            return;
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime lives for the rest of the process.
        std::mem::forget(rt);
    });
}

/// Log request-level operations (extraction started, records returned)
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log per-stage details (scale corrections, page plans, bucket counts)
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log conditions worth noting that do not stop an extraction
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures just before they are returned to the caller
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;

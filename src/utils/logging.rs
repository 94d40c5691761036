//! Logger setup plus conditional logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_info!("clipboard poller started");
//! ```
//!
//! Never pass clipboard or message contents to these macros; log lengths instead.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize `env_logger` once per process.
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug` when
/// `CODECATCHER_DEBUG` is `1`/`true`.
pub fn init() {
    INIT.call_once(|| {
        let debug_mode = std::env::var("CODECATCHER_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let default_level = if debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };

        let mut builder = env_logger::Builder::new();
        builder.filter_level(default_level);
        if let Ok(spec) = std::env::var("RUST_LOG") {
            builder.parse_filters(&spec);
        }
        let _ = builder.try_init();
    });
}

/// Conditional debug logging; checks `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Conditional info logging; checks `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Conditional warn logging; checks `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Conditional error logging; checks `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

//! Leveled diagnostic printing.
//!
//! A small, dependency-free stand-in for a logging crate, in the shape of the teacher crate's own
//! env-var-gated debug-print facility: no external `log`/`tracing` dependency, just a level
//! threshold read once from `PARAPOOL_LOG_LEVEL` and a handful of macros. Unlike the teacher's
//! version this carries no per-worker-thread/per-task identity — there is nothing analogous to
//! worker/task ids to stamp on every line here — so the context segment was dropped rather than
//! faked.
//!
//! # Environment Variables
//!
//! - `PARAPOOL_LOG_LEVEL` — `off`, `error`, `warn`, `info`, `debug`, or `trace` (default `warn`).
//!
//! # Usage
//!
//! ```ignore
//! use parapool_core::{diag_warn, diag_debug};
//!
//! diag_warn!("pool at max capacity, claim {} will wait", pending);
//! diag_debug!("scale tick: usage={:.2}", usage);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// Diagnostic verbosity levels, ordered from least to most verbose.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Level {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Some(Level::Off),
            "error" | "1" => Some(Level::Error),
            "warn" | "2" => Some(Level::Warn),
            "info" | "3" => Some(Level::Info),
            "debug" | "4" => Some(Level::Debug),
            "trace" | "5" => Some(Level::Trace),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Level::Off => "",
            Level::Error => "[ERROR]",
            Level::Warn => "[WARN] ",
            Level::Info => "[INFO] ",
            Level::Debug => "[DEBUG]",
            Level::Trace => "[TRACE]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(0);
static INIT: OnceLock<()> = OnceLock::new();

fn init() {
    INIT.get_or_init(|| {
        let level = std::env::var("PARAPOOL_LOG_LEVEL")
            .ok()
            .and_then(|v| Level::from_str(&v))
            .unwrap_or(Level::Warn);
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    });
}

/// The currently configured diagnostic level.
pub fn level() -> Level {
    init();
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => Level::Off,
        1 => Level::Error,
        2 => Level::Warn,
        3 => Level::Info,
        4 => Level::Debug,
        _ => Level::Trace,
    }
}

/// Override the diagnostic level programmatically, ignoring `PARAPOOL_LOG_LEVEL`.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
fn enabled(level: Level) -> bool {
    level as u8 <= self::level() as u8
}

#[doc(hidden)]
pub fn _diag_impl(level: Level, args: std::fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} parapool: ", level.prefix());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
}

/// Error-level diagnostic.
#[macro_export]
macro_rules! diag_error {
    ($($arg:tt)*) => {
        $crate::diag::_diag_impl($crate::diag::Level::Error, format_args!($($arg)*))
    };
}

/// Warn-level diagnostic.
#[macro_export]
macro_rules! diag_warn {
    ($($arg:tt)*) => {
        $crate::diag::_diag_impl($crate::diag::Level::Warn, format_args!($($arg)*))
    };
}

/// Info-level diagnostic.
#[macro_export]
macro_rules! diag_info {
    ($($arg:tt)*) => {
        $crate::diag::_diag_impl($crate::diag::Level::Info, format_args!($($arg)*))
    };
}

/// Debug-level diagnostic.
#[macro_export]
macro_rules! diag_debug {
    ($($arg:tt)*) => {
        $crate::diag::_diag_impl($crate::diag::Level::Debug, format_args!($($arg)*))
    };
}

/// Trace-level diagnostic.
#[macro_export]
macro_rules! diag_trace {
    ($($arg:tt)*) => {
        $crate::diag::_diag_impl($crate::diag::Level::Trace, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Debug < Level::Trace);
    }

    #[test]
    fn test_set_level_roundtrip() {
        set_level(Level::Trace);
        assert_eq!(level(), Level::Trace);
        set_level(Level::Off);
        assert_eq!(level(), Level::Off);
    }

    #[test]
    fn test_macros_compile() {
        set_level(Level::Off);
        diag_error!("x={}", 1);
        diag_warn!("y");
        diag_info!("z");
        diag_debug!("w");
        diag_trace!("v");
    }
}

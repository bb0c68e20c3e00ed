//! Severity-filtered diagnostics
//!
//! Messages below the process-wide threshold are dropped before formatting.
//! Accepted messages go to the installed [`LogSink`]: logcat on Android,
//! standard error elsewhere. Writing never panics and failures are ignored.
//!
//! Severities use the Android log priority numbers so a raw integer from the
//! C API can be stored as-is.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicI32, Ordering};

/// Tag attached to every message
pub const LOG_TAG: &str = "JvmBridge";

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Level {
    /// Very chatty tracing
    Verbose = 2,
    /// Debug output
    Debug = 3,
    /// Informational (default threshold)
    Info = 4,
    /// Warnings
    Warn = 5,
    /// Errors
    Error = 6,
    /// Unrecoverable errors
    Fatal = 7,
}

impl Level {
    /// Map an Android log priority to a level
    pub fn from_priority(priority: i32) -> Option<Self> {
        match priority {
            2 => Some(Level::Verbose),
            3 => Some(Level::Debug),
            4 => Some(Level::Info),
            5 => Some(Level::Warn),
            6 => Some(Level::Error),
            7 => Some(Level::Fatal),
            _ => None,
        }
    }

    /// Android log priority of this level
    pub fn priority(self) -> i32 {
        self as i32
    }

    fn label(self) -> &'static str {
        match self {
            Level::Verbose => "VERBOSE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(priority) = s.parse::<i32>() {
            return Level::from_priority(priority)
                .ok_or_else(|| format!("unknown log priority {}", priority));
        }
        match s.to_ascii_lowercase().as_str() {
            "verbose" | "trace" => Ok(Level::Verbose),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            other => Err(format!("unknown log level {:?}", other)),
        }
    }
}

/// Destination for accepted diagnostic messages
pub trait LogSink: Send + Sync {
    /// Write one message. Must not panic.
    fn write(&self, level: Level, message: &str);
}

/// Writes `JvmBridge: <message>` to standard error
#[derive(Debug, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write(&self, _level: Level, message: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}: {}", LOG_TAG, message.trim_end());
    }
}

/// Writes to the Android system log
#[cfg(target_os = "android")]
#[derive(Debug, Default)]
pub struct AndroidSink;

#[cfg(target_os = "android")]
#[link(name = "log")]
extern "C" {
    fn __android_log_write(
        prio: std::os::raw::c_int,
        tag: *const std::os::raw::c_char,
        text: *const std::os::raw::c_char,
    ) -> std::os::raw::c_int;
}

#[cfg(target_os = "android")]
impl LogSink for AndroidSink {
    fn write(&self, level: Level, message: &str) {
        use std::ffi::CString;

        let Ok(tag) = CString::new(LOG_TAG) else {
            return;
        };
        let Ok(text) = CString::new(message.replace('\0', "")) else {
            return;
        };
        unsafe {
            __android_log_write(level.priority(), tag.as_ptr(), text.as_ptr());
        }
    }
}

/// Forwards diagnostics into the host's `tracing` subscriber
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: Level, message: &str) {
        match level {
            Level::Verbose => tracing::trace!(target: "jvm_bridge", "{}", message),
            Level::Debug => tracing::debug!(target: "jvm_bridge", "{}", message),
            Level::Info => tracing::info!(target: "jvm_bridge", "{}", message),
            Level::Warn => tracing::warn!(target: "jvm_bridge", "{}", message),
            Level::Error | Level::Fatal => tracing::error!(target: "jvm_bridge", "{}", message),
        }
    }
}

static THRESHOLD: AtomicI32 = AtomicI32::new(Level::Info as i32);

static SINK: Lazy<RwLock<Box<dyn LogSink>>> = Lazy::new(|| RwLock::new(default_sink()));

#[cfg(target_os = "android")]
fn default_sink() -> Box<dyn LogSink> {
    Box::new(AndroidSink)
}

#[cfg(not(target_os = "android"))]
fn default_sink() -> Box<dyn LogSink> {
    Box::new(StderrSink)
}

/// Set the process-wide threshold
pub fn set_log_threshold(level: Level) {
    THRESHOLD.store(level.priority(), Ordering::Relaxed);
}

/// Set the threshold from a raw priority.
///
/// Values outside the known range are stored unchanged: anything above
/// `Fatal` silences the channel, anything below `Verbose` lets everything
/// through.
pub fn set_log_priority(priority: i32) {
    THRESHOLD.store(priority, Ordering::Relaxed);
}

/// Current raw threshold
pub fn log_threshold() -> i32 {
    THRESHOLD.load(Ordering::Relaxed)
}

/// Whether a message at `level` would be emitted
pub fn enabled(level: Level) -> bool {
    level.priority() >= THRESHOLD.load(Ordering::Relaxed)
}

/// Replace the sink, returning the previous one
pub fn set_sink(sink: Box<dyn LogSink>) -> Box<dyn LogSink> {
    std::mem::replace(&mut *SINK.write(), sink)
}

/// Emit a message if `level` passes the threshold
pub fn log(level: Level, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let message = match args.as_str() {
        Some(s) => s.to_owned(),
        None => args.to_string(),
    };
    SINK.read().write(level, &message);
}

/// Log at an explicit [`Level`]
#[macro_export]
macro_rules! jvm_log {
    ($level:expr, $($arg:tt)+) => {
        $crate::diagnostics::log($level, format_args!($($arg)+))
    };
}

/// Log at [`Level::Debug`]
#[macro_export]
macro_rules! jvm_debug {
    ($($arg:tt)+) => { $crate::jvm_log!($crate::diagnostics::Level::Debug, $($arg)+) };
}

/// Log at [`Level::Info`]
#[macro_export]
macro_rules! jvm_info {
    ($($arg:tt)+) => { $crate::jvm_log!($crate::diagnostics::Level::Info, $($arg)+) };
}

/// Log at [`Level::Warn`]
#[macro_export]
macro_rules! jvm_warn {
    ($($arg:tt)+) => { $crate::jvm_log!($crate::diagnostics::Level::Warn, $($arg)+) };
}

/// Log at [`Level::Error`]
#[macro_export]
macro_rules! jvm_error {
    ($($arg:tt)+) => { $crate::jvm_log!($crate::diagnostics::Level::Error, $($arg)+) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CaptureSink, DIAGNOSTICS_LOCK};

    #[test]
    fn test_level_parsing() {
        assert_eq!("warn".parse::<Level>(), Ok(Level::Warn));
        assert_eq!("WARNING".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(" debug ".parse::<Level>(), Ok(Level::Debug));
        assert_eq!("6".parse::<Level>(), Ok(Level::Error));
        assert!("9".parse::<Level>().is_err());
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn test_levels_are_ordered_by_priority() {
        assert!(Level::Verbose < Level::Debug);
        assert!(Level::Warn < Level::Error);
        assert_eq!(Level::from_priority(Level::Fatal.priority()), Some(Level::Fatal));
    }

    #[test]
    fn test_threshold_filters_messages() {
        let _guard = DIAGNOSTICS_LOCK.lock();
        let capture = CaptureSink::new();
        let previous = set_sink(Box::new(capture.clone()));
        let saved = log_threshold();

        set_log_threshold(Level::Warn);
        jvm_debug!("threshold-test: debug {}", 1);
        jvm_info!("threshold-test: info");
        jvm_warn!("threshold-test: warn {}", 2);
        jvm_error!("threshold-test: error");

        set_log_priority(saved);
        set_sink(previous);

        let lines = capture.messages_containing("threshold-test");
        assert_eq!(
            lines,
            vec![
                (Level::Warn, "threshold-test: warn 2".to_string()),
                (Level::Error, "threshold-test: error".to_string()),
            ]
        );
    }

    #[test]
    fn test_out_of_range_priority_silences_channel() {
        let _guard = DIAGNOSTICS_LOCK.lock();
        let saved = log_threshold();

        set_log_priority(100);
        assert!(!enabled(Level::Fatal));
        set_log_priority(0);
        assert!(enabled(Level::Verbose));

        set_log_priority(saved);
    }
}

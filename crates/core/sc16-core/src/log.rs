//! Leveled logging facade.
//!
//! Driver code logs through the [`klog!`] family of macros. Each call is
//! forwarded to a single registered [`LogFn`]; until something registers
//! one, logging is a silent no-op, so library code never has to care
//! whether a logger exists.
//!
//! The stock backend is [`Logger`], which fans timestamped, level-tagged
//! lines out to any number of [`LogSink`]s. Timestamps come from the clock
//! registered with [`set_clock_fn`].

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::{self, Write as _};
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::sync::SpinLock;

// ---------------------------------------------------------------------------
// Log levels: lower = more severe
// ---------------------------------------------------------------------------

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Fatal: the device cannot be used any more.
    Fatal = 0,
    /// Error: an operation failed and was reported to its caller.
    Error = 1,
    /// Warning: unexpected condition, recovered from.
    Warn = 2,
    /// Informational: attach, startup and shutdown.
    Info = 3,
    /// Debug: configuration changes.
    Debug = 4,
    /// Trace: per-pass register and FIFO detail.
    Trace = 5,
}

impl LogLevel {
    /// Returns the human-readable name (fixed-width for aligned output).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Parses a level name, case-insensitively. Accepts `warning` for `warn`.
    pub fn parse(s: &str) -> Option<Self> {
        let level = match s.trim() {
            s if s.eq_ignore_ascii_case("fatal") => Self::Fatal,
            s if s.eq_ignore_ascii_case("error") => Self::Error,
            s if s.eq_ignore_ascii_case("warn") || s.eq_ignore_ascii_case("warning") => {
                Self::Warn
            }
            s if s.eq_ignore_ascii_case("info") => Self::Info,
            s if s.eq_ignore_ascii_case("debug") => Self::Debug,
            s if s.eq_ignore_ascii_case("trace") => Self::Trace,
            _ => return None,
        };
        Some(level)
    }
}

// ---------------------------------------------------------------------------
// Leveled log function (klog! and convenience macros)
// ---------------------------------------------------------------------------

/// The signature of the global leveled log function.
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn null_log(_level: LogLevel, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

/// Registers the global leveled log function.
///
/// # Safety
///
/// The provided function must be safe to call from any context, including
/// interrupt handlers. May be called more than once.
pub unsafe fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn load_log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: We only ever store valid `LogFn` function pointers into LOG_FN.
    unsafe { core::mem::transmute(ptr) }
}

/// Implementation detail for [`klog!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    load_log_fn()(level, args);
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs a fatal-level message (level 0).
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs an error-level message (level 1).
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message (level 2).
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs an info-level message (level 3).
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message (level 4).
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs a trace-level message (level 5).
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Trace, $($arg)*) };
}

// ---------------------------------------------------------------------------
// Timestamp clock
// ---------------------------------------------------------------------------

/// Nanosecond clock used for log timestamps.
pub type ClockFn = fn() -> u64;

fn null_clock() -> u64 {
    0
}

static CLOCK_FN: AtomicPtr<()> = AtomicPtr::new(null_clock as *mut ());

/// Registers the nanosecond clock used to timestamp log lines.
///
/// # Safety
///
/// Same contract as [`set_log_fn`]: callable from any context.
pub unsafe fn set_clock_fn(f: ClockFn) {
    CLOCK_FN.store(f as *mut (), Ordering::Release);
}

fn now_nanos() -> u64 {
    let ptr = CLOCK_FN.load(Ordering::Acquire);
    // SAFETY: We only ever store valid `ClockFn` function pointers into CLOCK_FN.
    let f: ClockFn = unsafe { core::mem::transmute(ptr) };
    f()
}

// ---------------------------------------------------------------------------
// LogSink trait
// ---------------------------------------------------------------------------

/// A dyn-compatible output sink for [`Logger`].
pub trait LogSink: Send + Sync {
    /// Write a string fragment to this sink.
    fn write_str(&self, s: &str);
    /// Maximum log level accepted (messages with `level <= max_level` are written).
    fn max_level(&self) -> LogLevel;
    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Fan-out logger.
///
/// Holds a `Vec<Box<dyn LogSink>>` behind a [`SpinLock`]. Construct with
/// [`Logger::new`] (const) and store in a `static`.
pub struct Logger {
    sinks: SpinLock<Vec<Box<dyn LogSink>>>,
}

impl Logger {
    /// Creates a logger with no sinks.
    pub const fn new() -> Self {
        Self {
            sinks: SpinLock::named("logger", Vec::new()),
        }
    }

    /// Registers an additional output sink.
    pub fn add_sink(&self, sink: Box<dyn LogSink>) {
        self.sinks.lock().push(sink);
    }

    /// Replaces the first sink whose [`name()`](LogSink::name) matches `name`.
    /// Returns `true` if a replacement was made.
    pub fn replace_sink_by_name(&self, name: &str, new_sink: Box<dyn LogSink>) -> bool {
        let mut sinks = self.sinks.lock();
        match sinks.iter_mut().find(|s| s.name() == name) {
            Some(slot) => {
                *slot = new_sink;
                true
            }
            None => false,
        }
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Formats a timestamped, level-tagged line and writes it to every sink
    /// whose `max_level >= level`.
    pub fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let total_micros = now_nanos() / 1_000;
        let secs = total_micros / 1_000_000;
        let micros = total_micros % 1_000_000;
        let level_str = level.name();

        let sinks = self.sinks.lock();
        for sink in sinks.iter().filter(|s| level <= s.max_level()) {
            let mut w = SinkWriter(sink.as_ref());
            let _ = writeln!(w, "[{secs:>5}.{micros:06}] {level_str} {args}");
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapter that wraps a `&dyn LogSink` to implement `fmt::Write`.
struct SinkWriter<'a>(&'a dyn LogSink);

impl fmt::Write for SinkWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Global logger instance and public API
// ---------------------------------------------------------------------------

/// Global logger instance.
pub static LOGGER: Logger = Logger::new();

fn logger_log(level: LogLevel, args: fmt::Arguments<'_>) {
    LOGGER.log(level, args);
}

/// Routes [`klog!`] output to the global [`LOGGER`].
pub fn init_logger() {
    // SAFETY: logger_log only takes the logger's spin lock and writes to sinks.
    unsafe { set_log_fn(logger_log) };
}

/// Registers an additional output sink with the global logger.
pub fn add_sink(sink: Box<dyn LogSink>) {
    LOGGER.add_sink(sink);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;
    use std::sync::Arc;

    struct CaptureSink {
        name: &'static str,
        max: LogLevel,
        out: Arc<SpinLock<String>>,
    }

    impl LogSink for CaptureSink {
        fn write_str(&self, s: &str) {
            self.out.lock().push_str(s);
        }
        fn max_level(&self) -> LogLevel {
            self.max
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    fn capture(name: &'static str, max: LogLevel) -> (Box<dyn LogSink>, Arc<SpinLock<String>>) {
        let out = Arc::new(SpinLock::new(String::new()));
        let sink = CaptureSink {
            name,
            max,
            out: Arc::clone(&out),
        };
        (Box::new(sink), out)
    }

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Fatal < LogLevel::Warn);
        assert!(LogLevel::Trace > LogLevel::Info);
    }

    #[test]
    fn level_names_are_fixed_width() {
        for level in [
            LogLevel::Fatal,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(level.name().len(), 5);
        }
    }

    #[test]
    fn parse_levels() {
        assert_eq!(LogLevel::parse("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse(" warning "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn logger_filters_by_sink_level() {
        let logger = Logger::new();
        let (verbose, verbose_out) = capture("verbose", LogLevel::Trace);
        let (quiet, quiet_out) = capture("quiet", LogLevel::Warn);
        logger.add_sink(verbose);
        logger.add_sink(quiet);

        logger.log(LogLevel::Debug, format_args!("divisor={}", 12));
        logger.log(LogLevel::Warn, format_args!("rx fifo level {} clamped", 70));

        let verbose_out = verbose_out.lock();
        let quiet_out = quiet_out.lock();
        assert!(verbose_out.contains("DEBUG divisor=12\n"));
        assert!(verbose_out.contains("WARN  rx fifo level 70 clamped\n"));
        assert!(!quiet_out.contains("divisor"));
        assert!(quiet_out.contains("rx fifo level 70 clamped"));
    }

    #[test]
    fn replace_sink_by_name_swaps_first_match() {
        let logger = Logger::new();
        let (first, first_out) = capture("stderr", LogLevel::Trace);
        let (second, second_out) = capture("stderr", LogLevel::Trace);
        logger.add_sink(first);
        assert!(logger.replace_sink_by_name("stderr", second));
        assert!(!logger.replace_sink_by_name("missing", capture("x", LogLevel::Trace).0));
        assert_eq!(logger.sink_count(), 1);

        logger.log(LogLevel::Info, format_args!("hello"));
        assert!(first_out.lock().is_empty());
        assert!(second_out.lock().ends_with("INFO  hello\n"));
    }
}

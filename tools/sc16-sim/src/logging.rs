//! Stderr sink for the driver's log facade.

use std::sync::OnceLock;
use std::time::Instant;

use sc16_core::log::{self, LogLevel, LogSink};

static START: OnceLock<Instant> = OnceLock::new();

fn monotonic_nanos() -> u64 {
    let start = START.get_or_init(Instant::now);
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

struct StderrSink {
    max: LogLevel,
}

impl LogSink for StderrSink {
    fn write_str(&self, s: &str) {
        eprint!("{s}");
    }

    fn max_level(&self) -> LogLevel {
        self.max
    }

    fn name(&self) -> &str {
        "stderr"
    }
}

/// Routes driver logging to stderr, filtered at `max`. Call once.
pub fn init(max: LogLevel) {
    START.get_or_init(Instant::now);
    // SAFETY: monotonic_nanos only reads a process-wide Instant.
    unsafe { log::set_clock_fn(monotonic_nanos) };
    log::add_sink(Box::new(StderrSink { max }));
    log::init_logger();
}

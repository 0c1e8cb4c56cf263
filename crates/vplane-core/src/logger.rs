//! Frame-stamped stderr logger.
//!
//! Lines look like `[  1.234s f   42  INFO tracker] message`: elapsed time,
//! the current frame index (set once per tick with [`set_log_frame`]), the
//! level and the last segment of the log target. Install it once with
//! [`init_with_level`].

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Env var read by [`init_tracing`] for filter directives.
#[cfg(feature = "tracing")]
pub const LOG_ENV: &str = "VPLANE_LOG";

static FRAME: AtomicU64 = AtomicU64::new(0);

/// Stamp subsequent log lines with `frame`.
pub fn set_log_frame(frame: u64) {
    FRAME.store(frame, Ordering::Relaxed);
}

/// Filtering follows `log::max_level()`, so every [`init_with_level`] call
/// takes effect immediately.
struct FrameLogger {
    started: Instant,
}

impl Log for FrameLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let target = record.target();
        let module = target.rsplit("::").next().unwrap_or(target);
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{:8.3}s f{:>5} {:>5} {}] {}",
            self.started.elapsed().as_secs_f64(),
            FRAME.load(Ordering::Relaxed),
            record.level(),
            module,
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<FrameLogger> = OnceLock::new();

/// Install the frame logger with the given level filter.
///
/// Later calls only adjust the level, raising or lowering it.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| FrameLogger {
            started: Instant::now(),
        });
        log::set_logger(logger)?;
    }
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber; `log` records are bridged into it.
///
/// Filter directives come from `VPLANE_LOG` and default to
/// `warn,vplane=info`. With `json` each event and closed span is one JSON
/// object per line.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn,vplane=info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}

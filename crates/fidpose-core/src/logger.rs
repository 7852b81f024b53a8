//! Stderr logging for the fidpose binaries and tests.
//!
//! Lines carry the elapsed time, the level and the frame being processed:
//! `[  0.013s  WARN img_004.png] dropping marker 7: ...`. The frame comes
//! from the innermost [`FrameScope`] on the logging thread; lines logged
//! outside any scope show the log target instead. With the `tracing`
//! feature [`init_tracing`] installs a `tracing-subscriber` formatter
//! filtered the same way.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt::format::FmtSpan, util::SubscriberInitExt, EnvFilter};

thread_local! {
    static FRAME: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Tags log lines from the current thread with a frame name until dropped.
///
/// Scopes nest: dropping an inner scope restores the outer frame name.
#[must_use = "the frame tag is removed when the scope is dropped"]
pub struct FrameScope {
    previous: Option<String>,
}

/// Tag subsequent log lines on this thread with `frame`.
pub fn frame_scope(frame: &str) -> FrameScope {
    let previous = FRAME.with(|f| f.replace(Some(frame.to_string())));
    FrameScope { previous }
}

impl Drop for FrameScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        FRAME.with(|f| *f.borrow_mut() = previous);
    }
}

/// Frame named by the innermost live [`FrameScope`] on this thread.
pub fn current_frame() -> Option<String> {
    FRAME.with(|f| f.borrow().clone())
}

/// Level for a `-v` count: none is `info`, one is `debug`, more is `trace`.
pub fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn format_line(elapsed: f64, level: Level, tag: &str, args: &fmt::Arguments<'_>) -> String {
    format!("[{elapsed:8.3}s {level:>5} {tag}] {args}")
}

struct StderrLogger {
    level: LevelFilter,
    t0: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = self.t0.elapsed().as_secs_f64();
        let line = FRAME.with(|f| {
            let frame = f.borrow();
            let tag = frame.as_deref().unwrap_or(record.target());
            format_line(elapsed, record.level(), tag, record.args())
        });
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger. Repeated calls keep the first configuration.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        t0: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber. `RUST_LOG` wins when set; otherwise
/// events at `level` and above are shown.
#[cfg(feature = "tracing")]
pub fn init_tracing(
    level: LevelFilter,
    json: bool,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_with_level(LevelFilter::Warn).expect("first init");
        init_with_level(LevelFilter::Trace).expect("second init");
        assert_eq!(LOGGER.get().map(|l| l.level), Some(LevelFilter::Warn));
    }

    #[test]
    fn frame_scopes_nest_and_restore() {
        assert_eq!(current_frame(), None);
        {
            let _outer = frame_scope("run.png");
            {
                let _inner = frame_scope("img_004.png");
                assert_eq!(current_frame().as_deref(), Some("img_004.png"));
            }
            assert_eq!(current_frame().as_deref(), Some("run.png"));
        }
        assert_eq!(current_frame(), None);
    }

    #[test]
    fn scope_is_per_thread() {
        let _scope = frame_scope("main.png");
        let other = std::thread::spawn(current_frame).join().expect("join");
        assert_eq!(other, None);
    }

    #[test]
    fn line_carries_level_and_tag() {
        let line = format_line(0.0126, Level::Warn, "img_004.png", &format_args!("marker {}", 7));
        assert_eq!(line, "[   0.013s  WARN img_004.png] marker 7");
    }

    #[test]
    fn verbosity_counts_map_to_levels() {
        assert_eq!(verbosity_level(0), LevelFilter::Info);
        assert_eq!(verbosity_level(1), LevelFilter::Debug);
        assert_eq!(verbosity_level(5), LevelFilter::Trace);
    }
}

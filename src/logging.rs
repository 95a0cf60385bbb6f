//! # Logging
//!
//! `ColorizedFormatter` produces clean, level-colored lines with no
//! timestamp/field noise for the user-facing stdout stream. [`init_tracing`]
//! layers it with a detailed file/stderr layer and is shared by the
//! `broker` and `load-balancer` binaries.

use std::fmt;

use colored::*;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

/// Colors an entire log line by level, with no timestamp or target prefix —
/// meant for the user-facing stdout stream, not the detailed file/stderr
/// log.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut buffer = String::new();
        let buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer, event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}

/// Initializes the global tracing subscriber for a binary named
/// `program_name` (used to pick the default rolling log filename).
///
/// `verbosity` follows the `-v` convention: 0 = INFO, 1 = DEBUG, 2+ = TRACE.
/// `log_file` of `Some("stderr")` sends the detailed layer to stderr instead
/// of a rolling daily file; `None` defaults to `<program_name>.log` in the
/// current directory. `quiet` suppresses the colorized stdout layer
/// entirely, leaving only the detailed layer.
///
/// Returns a guard that must be kept alive for the process lifetime when
/// file logging is active (dropping it stops the non-blocking writer).
pub fn init_tracing(
    program_name: &str,
    verbosity: u8,
    log_file: Option<&str>,
    quiet: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;

    if let Some("stderr") = log_file {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match log_file {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("broker.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", format!("{program_name}.log")),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    let stdout_log = if !quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(stdout_log)
        .init();

    guard
}

//! Structured logging using tracing.
//!
//! Console output on stderr plus a daily-rolling file in the data
//! directory. The file layer is what the `=log` command uploads, so it
//! stays ANSI-free.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix for the rolling log files.
pub const LOG_FILE_PREFIX: &str = "mc-sentry.log";

/// Initialize tracing with console and optional rolling-file output.
///
/// Verbosity comes from repeated `-v` flags, not RUST_LOG, so the
/// command line is the single source of truth: 0 = info, 1 = debug,
/// 2+ = trace.
///
/// The returned guard must stay alive for the process lifetime or the
/// file writer stops flushing.
pub fn init_tracing(verbosity: u8, log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let filter_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::new(filter_level);
    let registry = tracing_subscriber::registry().with(filter);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    if let Some(dir) = log_dir {
        let _ = std::fs::create_dir_all(&dir);
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(false);

        registry.with(console_layer).with(file_layer).init();
        Some(guard)
    } else {
        registry.with(console_layer).init();
        None
    }
}

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_WRITTEN: AtomicBool = AtomicBool::new(false);

/// Installs the global subscriber. Logs go to stderr; stdout belongs to
/// the progress display. `RUST_LOG` overrides the default filter.
pub fn init_logging(debug: bool) {
    let default_filter = if debug { "info,animefinder=debug" } else { "info" };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_writer(marked_stderr).with_target(false))
        .try_init();
}

fn marked_stderr() -> io::Stderr {
    note_log_line();
    io::stderr()
}

pub(crate) fn note_log_line() {
    LOG_WRITTEN.store(true, Ordering::Relaxed);
}

/// Whether a log line went to the terminal since the last call.
pub(crate) fn take_log_lines() -> bool {
    LOG_WRITTEN.swap(false, Ordering::Relaxed)
}

// src/logging.rs
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Stream the JSON log lines go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    /// Keeps stdout free for a binary's own output.
    Stderr,
}

/// JSON lines, one object per event. `RUST_LOG` overrides the default `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(target: LogTarget) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false);

    let _ = match target {
        LogTarget::Stdout => tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_writer(std::io::stdout))
            .try_init(),
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_writer(std::io::stderr))
            .try_init(),
    };
}

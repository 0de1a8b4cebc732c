//! Logging initialization and the injectable diagnostic sink.

use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG)
/// - Targets and thread ids on every line
///
/// # Example
/// ```
/// flipchain_core::init_logging();
/// tracing::info!("Presenter initialized");
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,flipchain=debug"));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

/// Destination for human-readable diagnostic lines.
///
/// Components receive a sink at construction instead of writing to a
/// process-wide handle. Implementations must tolerate calls from any thread.
pub trait LogSink: Send + Sync {
    /// Writes one message. Fire-and-forget.
    fn log(&self, message: &str);
}

/// Sink that forwards every message to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::info!(target: "flipchain::sink", "{}", message.trim_end());
    }
}

/// Sink that keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.trim_end().to_string());
    }
}

//! Core utilities for the flipchain frame presenter.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization and the injectable [`LogSink`]
//! - The pausable frame [`Timer`]
//! - Runtime [`Config`]

mod config;
mod error;
mod logging;
mod timer;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::{LogSink, MemorySink, TracingSink, init_logging};
pub use timer::{Clock, ManualClock, SystemClock, Timer};

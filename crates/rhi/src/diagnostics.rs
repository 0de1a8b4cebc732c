//! Thread-safe queue of driver-reported diagnostics.
//!
//! Driver callbacks may fire on any thread. They only push into a
//! [`DiagnosticQueue`]; the render loop drains it on its own thread with
//! [`DiagnosticQueue::take_fatal`] at the top of every iteration.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::RhiError;

/// Message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    Compilation,
    Cleanup,
    Execution,
    Miscellaneous,
}

/// Message severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    Corruption,
    Error,
    Warning,
    Info,
    Message,
}

impl DiagnosticSeverity {
    fn tag(self) -> &'static str {
        match self {
            Self::Corruption => "GPU Corruption: ",
            Self::Error => "GPU Error: ",
            Self::Warning => "GPU Warning: ",
            Self::Info => "GPU Info: ",
            Self::Message => "GPU Message: ",
        }
    }
}

/// A message reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticMessage {
    pub category: DiagnosticCategory,
    pub severity: DiagnosticSeverity,
    pub text: String,
}

impl DiagnosticMessage {
    pub fn new(
        category: DiagnosticCategory,
        severity: DiagnosticSeverity,
        text: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            text: text.into(),
        }
    }
}

/// Allow-list of categories and severities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticFilter {
    pub categories: Vec<DiagnosticCategory>,
    pub severities: Vec<DiagnosticSeverity>,
}

impl Default for DiagnosticFilter {
    fn default() -> Self {
        Self {
            categories: vec![
                DiagnosticCategory::Compilation,
                DiagnosticCategory::Cleanup,
                DiagnosticCategory::Execution,
            ],
            severities: vec![
                DiagnosticSeverity::Error,
                DiagnosticSeverity::Warning,
                DiagnosticSeverity::Corruption,
            ],
        }
    }
}

impl DiagnosticFilter {
    /// Whether `message` passes the filter.
    pub fn allows(&self, message: &DiagnosticMessage) -> bool {
        self.categories.contains(&message.category) && self.severities.contains(&message.severity)
    }
}

struct Inner {
    filter: DiagnosticFilter,
    warnings_as_errors: bool,
    entries: Mutex<VecDeque<(&'static str, String)>>,
}

/// The error queue. Clones share the same queue.
#[derive(Clone)]
pub struct DiagnosticQueue {
    inner: Arc<Inner>,
}

impl DiagnosticQueue {
    /// Queue with the default filter.
    pub fn new() -> Self {
        Self::with_filter(DiagnosticFilter::default(), false)
    }

    /// Queue with a custom filter. With `warnings_as_errors`, warnings are
    /// queued as fatal instead of being logged.
    pub fn with_filter(filter: DiagnosticFilter, warnings_as_errors: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                filter,
                warnings_as_errors,
                entries: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Route a driver message. Safe to call from any thread.
    pub fn push(&self, message: DiagnosticMessage) {
        if !self.inner.filter.allows(&message) {
            return;
        }

        let tag = message.severity.tag();
        match message.severity {
            DiagnosticSeverity::Corruption | DiagnosticSeverity::Error => {
                self.entries().push_back((tag, message.text));
            }
            DiagnosticSeverity::Warning if self.inner.warnings_as_errors => {
                self.entries().push_back((tag, message.text));
            }
            DiagnosticSeverity::Warning => {
                warn!("{}{}", tag, message.text);
            }
            DiagnosticSeverity::Info | DiagnosticSeverity::Message => {
                debug!("{}{}", tag, message.text);
            }
        }
    }

    /// Number of queued fatal messages.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drain every queued message into one aggregated error.
    pub fn take_fatal(&self) -> Option<RhiError> {
        let drained: Vec<_> = self.entries().drain(..).collect();
        if drained.is_empty() {
            return None;
        }

        let message = drained
            .into_iter()
            .map(|(tag, text)| format!("{}{}", tag, text))
            .collect::<Vec<_>>()
            .join("\n");
        Some(RhiError::DiagnosticFatal(message))
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<(&'static str, String)>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DiagnosticQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiagnosticQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticQueue")
            .field("pending", &self.len())
            .field("warnings_as_errors", &self.inner.warnings_as_errors)
            .finish()
    }
}

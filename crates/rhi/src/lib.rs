//! GPU abstraction layer (Render Hardware Interface).
//!
//! The [`api`] traits describe the small slice of a GPU API the frame loop
//! needs. On top of them this crate provides:
//! - Adapter selection and device creation ([`DeviceContext`])
//! - Monotonic fence values ([`FenceSynchronizer`])
//! - Single-list command recording and submission ([`CommandSubmissionUnit`])
//! - Render-target and depth-stencil descriptor slots ([`DescriptorHeap`])
//! - Debug-layer message routing ([`DiagnosticQueue`])
//!
//! Two backends implement the traits: [`backend::vulkan`] (behind the
//! `vulkan` feature) and [`backend::headless`], a deterministic in-memory GPU
//! used by the tests.

mod error;

pub mod api;
pub mod backend;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod diagnostics;
pub mod sync;
pub mod types;

pub use command::{CommandRecorder, CommandSubmissionUnit, WAIT_RETRIES};
pub use context::{ContextDesc, DeviceContext, select_adapter};
pub use descriptor::{DescriptorHandle, DescriptorHeap};
pub use diagnostics::{DiagnosticCategory, DiagnosticFilter, DiagnosticMessage, DiagnosticQueue, DiagnosticSeverity};
pub use error::{RhiError, RhiResult};
pub use sync::FenceSynchronizer;
pub use types::*;

// Re-export ash types that users might need
#[cfg(feature = "vulkan")]
pub use ash::vk;

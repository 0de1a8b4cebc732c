//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Every driver call site returns this. Apart from [`RhiError::WaitFailed`],
/// each kind is fatal for the render loop: driver object state is unspecified
/// after a failure, so the caller unwinds and exits.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Adapter enumeration yielded nothing
    #[error("No GPU adapter found")]
    AdapterNotFound,

    /// The logical device could not be created on the chosen adapter
    #[error("Device creation failed: {0}")]
    DeviceCreationFailed(String),

    /// A required capability is missing (e.g. multisample quality)
    #[error("Feature unsupported: {0}")]
    FeatureUnsupported(String),

    /// The swap chain refused to resize its buffers
    #[error("Swap chain resize rejected: {0}")]
    ResizeRejected(String),

    /// Queue, allocator or command list creation or execution failed
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    /// Aggregated corruption/error messages reported by the driver
    #[error("{0}")]
    DiagnosticFatal(String),

    /// The OS wait on fence completion failed; logged, not fatal
    #[error("Fence wait failed: {0}")]
    WaitFailed(String),

    /// Vulkan API error
    #[cfg(feature = "vulkan")]
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[cfg(feature = "vulkan")]
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[cfg(feature = "vulkan")]
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),
}

impl RhiError {
    /// Process exit status for this failure kind. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AdapterNotFound => 2,
            Self::DeviceCreationFailed(_) => 3,
            Self::FeatureUnsupported(_) => 4,
            Self::ResizeRejected(_) => 5,
            Self::SubmissionFailed(_) => 6,
            Self::DiagnosticFatal(_) => 7,
            Self::WaitFailed(_) => 8,
            #[cfg(feature = "vulkan")]
            Self::VulkanError(_) => 9,
            #[cfg(feature = "vulkan")]
            Self::LoadingError(_) => 10,
            #[cfg(feature = "vulkan")]
            Self::AllocatorError(_) => 11,
            Self::SurfaceError(_) => 12,
            Self::SwapchainError(_) => 13,
        }
    }

    /// Whether the render loop must stop on this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::WaitFailed(_))
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

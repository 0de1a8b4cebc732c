//! Plain data shared by every backend.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Adapter descriptor produced by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Human-readable adapter name.
    pub name: String,
    /// Dedicated video memory in bytes.
    pub dedicated_memory: u64,
}

impl AdapterInfo {
    /// Dedicated memory in whole megabytes.
    pub fn dedicated_memory_mb(&self) -> u64 {
        self.dedicated_memory / (1024 * 1024)
    }
}

/// Pixel formats used by the presenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// 8-bit RGBA, normalized.
    Rgba8Unorm,
    /// 8-bit BGRA, normalized.
    Bgra8Unorm,
    /// 24-bit depth, 8-bit stencil.
    D24UnormS8,
    /// 32-bit float depth, 8-bit stencil.
    D32FloatS8,
}

impl Format {
    /// Whether this is a depth/stencil format.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::D24UnormS8 | Self::D32FloatS8)
    }
}

/// GPU usage state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Freshly allocated, no particular usage.
    Common,
    /// Ready for the presentation engine.
    Present,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound as a writable depth/stencil target.
    DepthWrite,
}

/// Kind of descriptor heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Render-target views.
    RenderTarget,
    /// Depth-stencil views.
    DepthStencil,
}

/// Viewport rectangle with depth range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-surface viewport with the `[0, 1]` depth range.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Integer rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Rectangle covering `(0, 0)..(width, height)`.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }
}

/// Depth/stencil clear values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilClear {
    pub depth: f32,
    pub stencil: u8,
}

impl Default for DepthStencilClear {
    fn default() -> Self {
        Self {
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Description of a 2D texture allocated in device-local memory.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    /// State the resource starts in.
    pub initial_state: ResourceState,
    /// Optimized clear value.
    pub clear: DepthStencilClear,
}

/// Depth-stencil view description.
///
/// Always supplied in full when creating a depth view; a default view
/// description is never inferred from the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilViewDesc {
    pub format: Format,
    pub mip_slice: u32,
    pub read_only_depth: bool,
    pub read_only_stencil: bool,
}

impl DepthStencilViewDesc {
    /// Writable 2D view of mip 0.
    pub fn texture_2d(format: Format) -> Self {
        Self {
            format,
            mip_slice: 0,
            read_only_depth: false,
            read_only_stencil: false,
        }
    }
}

/// Swap chain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: Format,
}

/// Where a swap chain presents.
#[derive(Debug, Clone, Copy)]
pub enum WindowTarget {
    /// A native window.
    Window {
        display: RawDisplayHandle,
        window: RawWindowHandle,
    },
    /// No window; only the headless backend accepts this.
    Offscreen,
}

/// Options passed to device creation.
#[derive(Debug, Clone, Default)]
pub struct DeviceDesc {
    /// Diagnostic queue to attach; `None` outside debug configurations.
    pub diagnostics: Option<crate::diagnostics::DiagnosticQueue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_and_scissor_cover_surface() {
        let viewport = Viewport::from_size(1280, 720);
        assert_eq!((viewport.width, viewport.height), (1280.0, 720.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let rect = Rect::from_size(1280, 720);
        assert_eq!((rect.right, rect.bottom), (1280, 720));
    }

    #[test]
    fn test_depth_formats() {
        assert!(Format::D24UnormS8.is_depth());
        assert!(!Format::Rgba8Unorm.is_depth());
    }

    #[test]
    fn test_default_depth_clear() {
        let clear = DepthStencilClear::default();
        assert_eq!(clear.depth, 1.0);
        assert_eq!(clear.stencil, 0);
    }
}

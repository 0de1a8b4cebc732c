//! Depth buffer management.
//!
//! [`DepthBuffer`] owns a device-local depth/stencil texture sized to the
//! client area. Its view lives in the surface's depth-stencil heap; this type
//! only supplies the full view description.

use tracing::{info, warn};

use flipchain_rhi::api::{Api, Device};
use flipchain_rhi::{
    DepthStencilClear, DepthStencilViewDesc, Format, ResourceState, RhiError, RhiResult,
    TextureDesc,
};

/// Default depth buffer format (24-bit depth, 8-bit stencil).
pub const DEFAULT_DEPTH_FORMAT: Format = Format::D24UnormS8;

/// Depth/stencil texture for the presentation surface.
///
/// Created in [`ResourceState::Common`]; the owner transitions it to
/// [`ResourceState::DepthWrite`] before first use.
pub struct DepthBuffer<A: Api> {
    resource: A::Resource,
    format: Format,
    width: u32,
    height: u32,
}

impl<A: Api> DepthBuffer<A> {
    /// Creates a new depth buffer with the specified dimensions and format.
    ///
    /// The device may substitute another depth format for `format`; the
    /// buffer and its view description use the substituted one.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `format` is not a depth format
    /// - either dimension is zero
    /// - the texture allocation fails
    pub fn new(device: &A::Device, width: u32, height: u32, format: Format) -> RhiResult<Self> {
        if !format.is_depth() {
            return Err(RhiError::FeatureUnsupported(format!(
                "{:?} is not a depth format",
                format
            )));
        }
        if width == 0 || height == 0 {
            return Err(RhiError::SurfaceError(
                "Depth buffer dimensions must be greater than 0".to_string(),
            ));
        }

        let resolved = device.resolve_depth_format(format)?;
        if resolved != format {
            warn!("Depth format {:?} replaced by {:?}", format, resolved);
        }
        let format = resolved;

        let resource = device.create_texture(&TextureDesc {
            width,
            height,
            format,
            initial_state: ResourceState::Common,
            clear: DepthStencilClear::default(),
        })?;

        info!("Created depth buffer: {}x{} ({:?})", width, height, format);

        Ok(Self {
            resource,
            format,
            width,
            height,
        })
    }

    /// Full description for the depth-stencil view of this buffer.
    pub fn view_desc(&self) -> DepthStencilViewDesc {
        DepthStencilViewDesc::texture_2d(self.format)
    }

    #[inline]
    pub fn resource(&self) -> &A::Resource {
        &self.resource
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Dimensions as `(width, height)`.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

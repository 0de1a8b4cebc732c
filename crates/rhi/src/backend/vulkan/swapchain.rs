//! Swapchain with flip-model semantics.
//!
//! The next image is acquired eagerly (right after creation, resize and every
//! present) and waited for on the host, so the current back buffer is always
//! known before recording starts.

use std::sync::Arc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info, warn};

use super::command::VulkanQueue;
use super::device::DeviceShared;
use super::resource::{VulkanImage, VulkanResource};
use super::{Vulkan, format_from_vk, format_to_vk};
use crate::api;
use crate::error::{RhiError, RhiResult};
use crate::types::{Format, SwapChainDesc};

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan swapchain and the surface it presents to.
pub struct VulkanSwapChain {
    device: Arc<DeviceShared>,
    surface: vk::SurfaceKHR,
    raw: vk::SwapchainKHR,
    images: Vec<VulkanResource>,
    surface_format: vk::SurfaceFormatKHR,
    format: Format,
    requested_count: u32,
    /// Index of the image acquired for the next frame.
    current: u32,
    /// Set when acquire or present reports OUT_OF_DATE; `current` is then
    /// not an acquired image.
    out_of_date: bool,
    acquire_fence: vk::Fence,
}

impl VulkanSwapChain {
    pub(super) fn new(
        device: Arc<DeviceShared>,
        queue: &VulkanQueue,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        desc: &SwapChainDesc,
    ) -> RhiResult<Self> {
        let instance = &device.instance;
        let surface = unsafe {
            ash_window::create_surface(&instance.entry, &instance.raw, display, window, None)
                .map_err(|e| RhiError::SurfaceError(format!("vkCreateSurface: {}", e)))?
        };

        let present_support = unsafe {
            instance.surface_loader.get_physical_device_surface_support(
                device.physical,
                device.queue_family,
                surface,
            )
        };
        if !matches!(present_support, Ok(true)) {
            unsafe { instance.surface_loader.destroy_surface(surface, None) };
            return Err(RhiError::FeatureUnsupported(format!(
                "queue family {} cannot present to this window",
                device.queue_family
            )));
        }

        let fence = unsafe { device.raw.create_fence(&vk::FenceCreateInfo::default(), None) };
        let acquire_fence = match fence {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { instance.surface_loader.destroy_surface(surface, None) };
                return Err(e.into());
            }
        };
        debug!("Swap chain will present on queue {:?}", queue.raw);

        let mut swap_chain = Self {
            device,
            surface,
            raw: vk::SwapchainKHR::null(),
            images: Vec::new(),
            surface_format: vk::SurfaceFormatKHR::default(),
            format: desc.format,
            requested_count: desc.buffer_count,
            current: 0,
            out_of_date: false,
            acquire_fence,
        };
        swap_chain.build(desc.width, desc.height)?;
        swap_chain.acquire_next()?;
        Ok(swap_chain)
    }

    /// Create (or recreate, retiring the old one) the swapchain and its images.
    fn build(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let instance = &self.device.instance;
        let support = SwapchainSupportDetails::query(
            self.device.physical,
            self.surface,
            &instance.surface_loader,
        )?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats, format_to_vk(self.format));
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities, self.requested_count);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let old_swapchain = self.raw;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let loader = &self.device.swapchain_loader;
        let raw = unsafe { loader.create_swapchain(&create_info, None)? };
        if old_swapchain != vk::SwapchainKHR::null() {
            self.images.clear();
            unsafe { loader.destroy_swapchain(old_swapchain, None) };
        }
        self.raw = raw;

        let images = unsafe { loader.get_swapchain_images(raw)? };
        if images.len() as u32 != self.requested_count {
            warn!(
                "Requested {} swapchain images, the surface provided {}",
                self.requested_count,
                images.len()
            );
        }
        self.images = images
            .into_iter()
            .map(|image| {
                VulkanResource::new(VulkanImage::borrowed(
                    self.device.clone(),
                    image,
                    surface_format.format,
                    extent,
                ))
            })
            .collect();
        self.surface_format = surface_format;
        self.format = format_from_vk(surface_format.format).unwrap_or(self.format);
        Ok(())
    }

    /// Acquire the next image and block until it is usable.
    fn acquire_next(&mut self) -> RhiResult<()> {
        let acquired = unsafe {
            self.device.swapchain_loader.acquire_next_image(
                self.raw,
                u64::MAX,
                vk::Semaphore::null(),
                self.acquire_fence,
            )
        };

        match acquire_outcome(acquired)? {
            Acquired::Image(index) => {
                let fences = [self.acquire_fence];
                unsafe {
                    self.device.raw.wait_for_fences(&fences, true, u64::MAX)?;
                    self.device.raw.reset_fences(&fences)?;
                }
                self.current = index;
                self.out_of_date = false;
            }
            Acquired::OutOfDate => {
                warn!("Swapchain out of date on acquire; rendering stops until a resize");
                self.out_of_date = true;
            }
        }
        Ok(())
    }
}

impl api::SwapChain<Vulkan> for VulkanSwapChain {
    fn buffer_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn format(&self) -> Format {
        self.format
    }

    fn buffer(&self, index: u32) -> RhiResult<VulkanResource> {
        self.images.get(index as usize).cloned().ok_or_else(|| {
            RhiError::SwapchainError(format!(
                "buffer index {} out of range ({} images)",
                index,
                self.images.len()
            ))
        })
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    fn is_out_of_date(&self) -> bool {
        self.out_of_date
    }

    fn present(&mut self, queue: &VulkanQueue) -> RhiResult<()> {
        if self.out_of_date {
            return Err(RhiError::SwapchainError(format!(
                "present of image {} on an out-of-date swapchain",
                self.current
            )));
        }

        // No semaphores chain rendering to presentation; the queue is idle
        // before the image is handed over.
        queue.wait_idle()?;

        let swapchains = [self.raw];
        let image_indices = [self.current];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented =
            unsafe { self.device.swapchain_loader.queue_present(queue.raw, &present_info) };
        if present_outcome(presented)? {
            warn!("Swapchain out of date on present; rendering stops until a resize");
            self.out_of_date = true;
            return Ok(());
        }

        self.acquire_next()
    }

    fn resize_buffers(&mut self, width: u32, height: u32) -> RhiResult<()> {
        if let Some((index, image)) = self
            .images
            .iter()
            .enumerate()
            .find(|(_, image)| image.reference_count() > 1)
        {
            return Err(RhiError::SwapchainError(format!(
                "image {} still has {} outstanding reference(s)",
                index,
                image.reference_count() - 1
            )));
        }

        unsafe { self.device.raw.device_wait_idle()? };
        self.build(width, height)?;
        self.acquire_next()
    }
}

impl Drop for VulkanSwapChain {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.raw.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during swapchain drop: {:?}", e);
            }
            self.images.clear();
            self.device.raw.destroy_fence(self.acquire_fence, None);
            if self.raw != vk::SwapchainKHR::null() {
                self.device.swapchain_loader.destroy_swapchain(self.raw, None);
            }
            self.device
                .instance
                .surface_loader
                .destroy_surface(self.surface, None);
        }
        info!("Swapchain destroyed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquired {
    Image(u32),
    OutOfDate,
}

fn acquire_outcome(result: ash::prelude::VkResult<(u32, bool)>) -> RhiResult<Acquired> {
    match result {
        Ok((index, suboptimal)) => {
            if suboptimal {
                debug!("Swapchain is suboptimal for the surface");
            }
            Ok(Acquired::Image(index))
        }
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// `true` when the swapchain went out of date during present.
fn present_outcome(result: ash::prelude::VkResult<bool>) -> RhiResult<bool> {
    match result {
        Ok(suboptimal) => {
            if suboptimal {
                debug!("Presented to a suboptimal swapchain");
            }
            Ok(false)
        }
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Chooses the surface format.
///
/// Prefers `preferred` with SRGB_NONLINEAR, then B8G8R8A8_UNORM, then the
/// first available format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR], preferred: vk::Format) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(preferred) {
        return format;
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        debug!("Using fallback surface format: B8G8R8A8_UNORM");
        return format;
    }

    warn!("Using first available surface format: {:?}", formats[0].format);
    formats[0]
}

/// Prefers IMMEDIATE (present without waiting for vblank), then MAILBOX,
/// then FIFO, which is always available.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Uses the surface's current extent when defined, otherwise clamps the
/// requested size to the surface limits.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// The requested count, raised to the surface minimum and capped by its
/// maximum (0 means unlimited).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_out_of_date_acquire_yields_no_image() {
        assert_eq!(acquire_outcome(Ok((2, false))).unwrap(), Acquired::Image(2));
        assert_eq!(acquire_outcome(Ok((1, true))).unwrap(), Acquired::Image(1));
        assert_eq!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            Acquired::OutOfDate
        );
        assert!(matches!(
            acquire_outcome(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_out_of_date_present_is_reported() {
        assert!(!present_outcome(Ok(false)).unwrap());
        assert!(!present_outcome(Ok(true)).unwrap());
        assert!(present_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap());
        assert!(present_outcome(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_choose_surface_format_prefers_requested() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::R8G8B8A8_UNORM),
        ];
        let selected = choose_surface_format(&formats, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_bgra() {
        let formats = [
            surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        let selected = choose_surface_format(&formats, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));
    }

    #[test]
    fn test_determine_image_count_respects_surface_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities, 2), 3);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 1,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities, 2), 2);
    }
}

//! Images and image views.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, error};

use super::device::DeviceShared;
use crate::types::DepthStencilViewDesc;

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// A 2D image, either allocated here or owned by a swap chain.
pub struct VulkanImage {
    device: Arc<DeviceShared>,
    pub(super) raw: vk::Image,
    pub(super) format: vk::Format,
    pub(super) extent: vk::Extent2D,
    pub(super) aspect: vk::ImageAspectFlags,
    /// `None` for swap-chain images, which are not destroyed here.
    allocation: Option<Allocation>,
}

impl VulkanImage {
    pub(super) fn owned(
        device: Arc<DeviceShared>,
        raw: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        aspect: vk::ImageAspectFlags,
        allocation: Allocation,
    ) -> Self {
        Self {
            device,
            raw,
            format,
            extent,
            aspect,
            allocation: Some(allocation),
        }
    }

    pub(super) fn borrowed(
        device: Arc<DeviceShared>,
        raw: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            device,
            raw,
            format,
            extent,
            aspect: vk::ImageAspectFlags::COLOR,
            allocation: None,
        }
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        let Some(allocation) = self.allocation.take() else {
            return;
        };
        unsafe { self.device.raw.destroy_image(self.raw, None) };
        if let Err(e) = self.device.allocator().free(allocation) {
            error!("Failed to free image memory: {}", e);
        }
        debug!("Destroyed image {:?}", self.raw);
    }
}

/// Reference-counted image handle.
#[derive(Clone)]
pub struct VulkanResource(Arc<VulkanImage>);

impl VulkanResource {
    pub(super) fn new(image: VulkanImage) -> Self {
        Self(Arc::new(image))
    }

    pub(super) fn image(&self) -> &VulkanImage {
        &self.0
    }

    /// Live references, including this one.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.0.extent
    }

    pub fn format(&self) -> vk::Format {
        self.0.format
    }
}

impl fmt::Debug for VulkanResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanResource")
            .field("image", &self.0.raw)
            .field("format", &self.0.format)
            .field("extent", &self.0.extent)
            .finish()
    }
}

/// Image view written into a descriptor heap slot. Keeps its image alive.
pub struct VulkanView {
    device: Arc<DeviceShared>,
    pub(super) raw: vk::ImageView,
    pub(super) resource: VulkanResource,
    id: u64,
    depth_desc: Option<DepthStencilViewDesc>,
}

impl VulkanView {
    pub(super) fn new(
        device: Arc<DeviceShared>,
        raw: vk::ImageView,
        resource: VulkanResource,
        depth_desc: Option<DepthStencilViewDesc>,
    ) -> Self {
        Self {
            device,
            raw,
            resource,
            id: NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed),
            depth_desc,
        }
    }

    /// Unique across the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn depth_desc(&self) -> Option<&DepthStencilViewDesc> {
        self.depth_desc.as_ref()
    }
}

impl Drop for VulkanView {
    fn drop(&mut self) {
        unsafe { self.device.raw.destroy_image_view(self.raw, None) };
    }
}

impl fmt::Debug for VulkanView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanView")
            .field("id", &self.id)
            .field("view", &self.raw)
            .field("resource", &self.resource)
            .finish()
    }
}

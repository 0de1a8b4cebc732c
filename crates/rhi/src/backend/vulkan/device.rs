//! Vulkan logical device: the factory for queues, lists, fences and images.

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use tracing::{debug, info, warn};

use super::command::{VulkanCommandAllocator, VulkanCommandList, VulkanQueue};
use super::instance::{InstanceShared, VulkanAdapter};
use super::resource::{VulkanImage, VulkanResource, VulkanView};
use super::swapchain::VulkanSwapChain;
use super::sync::VulkanFence;
use super::{Vulkan, format_to_vk};
use crate::api;
use crate::error::{RhiError, RhiResult};
use crate::types::{
    DepthStencilViewDesc, DescriptorKind, Format, SwapChainDesc, TextureDesc, WindowTarget,
};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// First descriptor heap address handed out.
const DESCRIPTOR_BASE: usize = 0x1_0000;

pub(super) struct DeviceShared {
    pub(super) raw: ash::Device,
    pub(super) instance: Arc<InstanceShared>,
    pub(super) physical: vk::PhysicalDevice,
    pub(super) queue_family: u32,
    pub(super) swapchain_loader: ash::khr::swapchain::Device,
    pub(super) debug_utils: Option<ash::ext::debug_utils::Device>,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    descriptor_cursor: AtomicUsize,
}

impl DeviceShared {
    pub(super) fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.raw.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }
            // Every allocation has been returned by now; the allocator must go
            // before the device it allocates from.
            ManuallyDrop::drop(&mut self.allocator);
            self.raw.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: DeviceShared is Send+Sync because:
// - ash::Device and the extension loaders are Send+Sync
// - vk::PhysicalDevice is a Copy handle
// - Allocator is protected by Mutex
unsafe impl Send for DeviceShared {}
unsafe impl Sync for DeviceShared {}

/// Vulkan logical device.
pub struct VulkanDevice {
    shared: Arc<DeviceShared>,
}

impl VulkanDevice {
    pub(super) fn new(instance: Arc<InstanceShared>, adapter: &VulkanAdapter) -> RhiResult<Self> {
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(adapter.queue_family)
            .queue_priorities(&queue_priorities)];

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        let raw = unsafe {
            instance
                .raw
                .create_device(adapter.raw, &create_info, None)
                .map_err(|e| RhiError::DeviceCreationFailed(format!("vkCreateDevice: {}", e)))?
        };
        info!(
            "Logical device created with {} extension(s), queue family {}",
            DEVICE_EXTENSIONS.len(),
            adapter.queue_family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.raw.clone(),
            device: raw.clone(),
            physical_device: adapter.raw,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { raw.destroy_device(None) };
                return Err(e.into());
            }
        };
        debug!("GPU memory allocator initialized");

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.raw, &raw);
        let debug_utils = instance
            .has_debug_utils()
            .then(|| ash::ext::debug_utils::Device::new(&instance.raw, &raw));

        Ok(Self {
            shared: Arc::new(DeviceShared {
                raw,
                physical: adapter.raw,
                queue_family: adapter.queue_family,
                swapchain_loader,
                debug_utils,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                descriptor_cursor: AtomicUsize::new(DESCRIPTOR_BASE),
                instance,
            }),
        })
    }

    /// Wait until every queue is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.shared.raw.device_wait_idle()? };
        Ok(())
    }

    fn create_image_view(
        &self,
        resource: &VulkanResource,
        aspect: vk::ImageAspectFlags,
        base_mip_level: u32,
        depth_desc: Option<DepthStencilViewDesc>,
    ) -> RhiResult<VulkanView> {
        let image = resource.image();
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.raw)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(base_mip_level)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let raw = unsafe { self.shared.raw.create_image_view(&view_info, None)? };
        Ok(VulkanView::new(
            self.shared.clone(),
            raw,
            resource.clone(),
            depth_desc,
        ))
    }

    fn supports_depth_attachment(&self, format: vk::Format) -> bool {
        let properties = unsafe {
            self.shared
                .instance
                .raw
                .get_physical_device_format_properties(self.shared.physical, format)
        };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    }
}

impl api::Device<Vulkan> for VulkanDevice {
    fn resolve_depth_format(&self, requested: Format) -> RhiResult<Format> {
        if !requested.is_depth() {
            return Err(RhiError::FeatureUnsupported(format!(
                "{:?} is not a depth format",
                requested
            )));
        }
        if self.supports_depth_attachment(format_to_vk(requested)) {
            return Ok(requested);
        }

        let fallback = [Format::D24UnormS8, Format::D32FloatS8]
            .into_iter()
            .find(|&format| self.supports_depth_attachment(format_to_vk(format)))
            .ok_or_else(|| {
                RhiError::FeatureUnsupported("no depth/stencil attachment format".to_string())
            })?;
        warn!(
            "Depth format {:?} unsupported, falling back to {:?}",
            requested, fallback
        );
        Ok(fallback)
    }

    fn create_queue(&self) -> RhiResult<VulkanQueue> {
        let raw = unsafe { self.shared.raw.get_device_queue(self.shared.queue_family, 0) };
        debug!("Queue retrieved from family {}", self.shared.queue_family);
        Ok(VulkanQueue::new(self.shared.clone(), raw))
    }

    fn create_command_allocator(&self) -> RhiResult<VulkanCommandAllocator> {
        VulkanCommandAllocator::new(self.shared.clone())
    }

    fn create_command_list(&self, allocator: &VulkanCommandAllocator) -> RhiResult<VulkanCommandList> {
        VulkanCommandList::new(self.shared.clone(), allocator)
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<VulkanFence> {
        VulkanFence::new(self.shared.clone(), initial_value)
    }

    fn descriptor_increment(&self, _kind: DescriptorKind) -> usize {
        std::mem::size_of::<vk::ImageView>()
    }

    fn reserve_descriptors(&self, kind: DescriptorKind, count: u32) -> RhiResult<usize> {
        let bytes = count as usize * self.descriptor_increment(kind);
        Ok(self.shared.descriptor_cursor.fetch_add(bytes, Ordering::Relaxed))
    }

    fn create_render_target_view(&self, resource: &VulkanResource) -> RhiResult<VulkanView> {
        self.create_image_view(resource, vk::ImageAspectFlags::COLOR, 0, None)
    }

    fn create_depth_stencil_view(
        &self,
        resource: &VulkanResource,
        desc: &DepthStencilViewDesc,
    ) -> RhiResult<VulkanView> {
        let requested = format_to_vk(desc.format);
        if requested != resource.image().format {
            return Err(RhiError::FeatureUnsupported(format!(
                "depth view format {:?} does not match image format {:?}",
                requested,
                resource.image().format
            )));
        }
        self.create_image_view(
            resource,
            resource.image().aspect,
            desc.mip_slice,
            Some(*desc),
        )
    }

    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<VulkanResource> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::SubmissionFailed(
                "texture dimensions must be greater than 0".to_string(),
            ));
        }

        let (format, usage, aspect) = if desc.format.is_depth() {
            (
                format_to_vk(desc.format),
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            )
        } else {
            (
                format_to_vk(desc.format),
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                vk::ImageAspectFlags::COLOR,
            )
        };
        let extent = vk::Extent2D {
            width: desc.width,
            height: desc.height,
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let raw = unsafe { self.shared.raw.create_image(&image_info, None)? };
        let requirements = unsafe { self.shared.raw.get_image_memory_requirements(raw) };

        let allocation = self.shared.allocator().allocate(&AllocationCreateDesc {
            name: if desc.format.is_depth() { "depth_buffer" } else { "texture" },
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::DedicatedImage(raw),
        });
        let allocation: Allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.shared.raw.destroy_image(raw, None) };
                return Err(e.into());
            }
        };

        let bound = unsafe {
            self.shared
                .raw
                .bind_image_memory(raw, allocation.memory(), allocation.offset())
        };
        let image = VulkanImage::owned(self.shared.clone(), raw, format, extent, aspect, allocation);
        bound?;

        info!(
            "Created texture: {}x{} ({:?})",
            desc.width, desc.height, format
        );
        Ok(VulkanResource::new(image))
    }

    fn multisample_quality_levels(&self, format: Format, samples: u32) -> RhiResult<u32> {
        let Some(flag) = sample_count_flag(samples) else {
            return Ok(0);
        };
        let properties = unsafe {
            self.shared
                .instance
                .raw
                .get_physical_device_properties(self.shared.physical)
        };
        let supported = if format.is_depth() {
            properties.limits.framebuffer_depth_sample_counts
        } else {
            properties.limits.framebuffer_color_sample_counts
        };
        Ok(u32::from(supported.contains(flag)))
    }

    fn create_swap_chain(
        &self,
        queue: &VulkanQueue,
        target: &WindowTarget,
        desc: &SwapChainDesc,
    ) -> RhiResult<VulkanSwapChain> {
        let WindowTarget::Window { display, window } = *target else {
            return Err(RhiError::SurfaceError(
                "the Vulkan backend needs a native window".to_string(),
            ));
        };
        VulkanSwapChain::new(self.shared.clone(), queue, display, window, desc)
    }
}

fn sample_count_flag(samples: u32) -> Option<vk::SampleCountFlags> {
    match samples {
        1 => Some(vk::SampleCountFlags::TYPE_1),
        2 => Some(vk::SampleCountFlags::TYPE_2),
        4 => Some(vk::SampleCountFlags::TYPE_4),
        8 => Some(vk::SampleCountFlags::TYPE_8),
        16 => Some(vk::SampleCountFlags::TYPE_16),
        32 => Some(vk::SampleCountFlags::TYPE_32),
        64 => Some(vk::SampleCountFlags::TYPE_64),
        _ => None,
    }
}

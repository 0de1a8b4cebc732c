//! Queue, command pool and command buffer.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use super::device::DeviceShared;
use super::resource::{VulkanResource, VulkanView};
use super::sync::VulkanFence;
use super::{Vulkan, barrier_layouts, barrier_masks};
use crate::api;
use crate::error::RhiResult;
use crate::types::{Rect, ResourceState, Viewport};

/// The graphics queue.
pub struct VulkanQueue {
    device: Arc<DeviceShared>,
    pub(super) raw: vk::Queue,
}

impl VulkanQueue {
    pub(super) fn new(device: Arc<DeviceShared>, raw: vk::Queue) -> Self {
        Self { device, raw }
    }

    pub(super) fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.raw.queue_wait_idle(self.raw)? };
        Ok(())
    }
}

impl api::Queue<Vulkan> for VulkanQueue {
    fn execute(&self, list: &VulkanCommandList) -> RhiResult<()> {
        let command_buffers = [list.raw];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .raw
                .queue_submit(self.raw, &[submit], vk::Fence::null())?
        };
        Ok(())
    }

    fn signal(&self, fence: &VulkanFence, value: u64) -> RhiResult<()> {
        let semaphores = [fence.raw];
        let values = [value];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
        let submit = vk::SubmitInfo::default()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);
        unsafe {
            self.device
                .raw
                .queue_submit(self.raw, &[submit], vk::Fence::null())?
        };
        Ok(())
    }
}

/// Command pool.
pub struct VulkanCommandAllocator {
    device: Arc<DeviceShared>,
    raw: vk::CommandPool,
}

impl VulkanCommandAllocator {
    pub(super) fn new(device: Arc<DeviceShared>) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let raw = unsafe { device.raw.create_command_pool(&create_info, None)? };
        info!("Command pool created for queue family {}", device.queue_family);

        Ok(Self { device, raw })
    }
}

impl api::CommandAllocator for VulkanCommandAllocator {
    fn reset(&mut self) -> RhiResult<()> {
        unsafe {
            self.device
                .raw
                .reset_command_pool(self.raw, vk::CommandPoolResetFlags::empty())?
        };
        Ok(())
    }
}

impl Drop for VulkanCommandAllocator {
    fn drop(&mut self) {
        unsafe { self.device.raw.destroy_command_pool(self.raw, None) };
        info!("Command pool destroyed");
    }
}

/// Primary command buffer.
///
/// The handle is freed with its pool.
pub struct VulkanCommandList {
    device: Arc<DeviceShared>,
    raw: vk::CommandBuffer,
    pool: vk::CommandPool,
}

impl VulkanCommandList {
    pub(super) fn new(device: Arc<DeviceShared>, allocator: &VulkanCommandAllocator) -> RhiResult<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(allocator.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let raw = unsafe { device.raw.allocate_command_buffers(&alloc_info)? }
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;

        Ok(Self {
            device,
            raw,
            pool: allocator.raw,
        })
    }

    fn begin_rendering(
        &self,
        extent: vk::Extent2D,
        color: &[vk::RenderingAttachmentInfo<'_>],
        depth: Option<&vk::RenderingAttachmentInfo<'_>>,
        stencil: Option<&vk::RenderingAttachmentInfo<'_>>,
    ) {
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(color);
        if let Some(depth) = depth {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        if let Some(stencil) = stencil {
            rendering_info = rendering_info.stencil_attachment(stencil);
        }

        unsafe {
            self.device.raw.cmd_begin_rendering(self.raw, &rendering_info);
            self.device.raw.cmd_end_rendering(self.raw);
        }
    }
}

impl api::CommandList<Vulkan> for VulkanCommandList {
    fn reset(&mut self, allocator: &VulkanCommandAllocator) -> RhiResult<()> {
        debug_assert_eq!(allocator.raw, self.pool, "command list reset against a foreign pool");
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.raw.begin_command_buffer(self.raw, &begin_info)? };
        Ok(())
    }

    fn close(&mut self) -> RhiResult<()> {
        unsafe { self.device.raw.end_command_buffer(self.raw)? };
        Ok(())
    }

    fn resource_barrier(&mut self, resource: &VulkanResource, before: ResourceState, after: ResourceState) {
        let image = resource.image();
        let (old_layout, new_layout) = barrier_layouts(before, after);
        let (src_stage, src_access, dst_stage, dst_access) = barrier_masks(old_layout, new_layout);

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.raw)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(image.aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.device.raw.cmd_pipeline_barrier(
                self.raw,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device.raw.cmd_set_viewport(self.raw, 0, &[viewport]) };
    }

    fn set_scissor(&mut self, rect: &Rect) {
        let scissor = vk::Rect2D {
            offset: vk::Offset2D {
                x: rect.left,
                y: rect.top,
            },
            extent: vk::Extent2D {
                width: (rect.right - rect.left).max(0) as u32,
                height: (rect.bottom - rect.top).max(0) as u32,
            },
        };
        unsafe { self.device.raw.cmd_set_scissor(self.raw, 0, &[scissor]) };
    }

    fn clear_render_target(&mut self, view: &VulkanView, color: [f32; 4]) {
        let attachment = vk::RenderingAttachmentInfo::default()
            .image_view(view.raw)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            });
        self.begin_rendering(view.resource.extent(), &[attachment], None, None);
    }

    fn clear_depth_stencil(&mut self, view: &VulkanView, depth: f32, stencil: u8) {
        let attachment = vk::RenderingAttachmentInfo::default()
            .image_view(view.raw)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth,
                    stencil: u32::from(stencil),
                },
            });
        let has_stencil = view
            .resource
            .image()
            .aspect
            .contains(vk::ImageAspectFlags::STENCIL);
        self.begin_rendering(
            view.resource.extent(),
            &[],
            Some(&attachment),
            has_stencil.then_some(&attachment),
        );
    }

    fn insert_marker(&mut self, label: &str) {
        let Some(debug_utils) = &self.device.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(label) else {
            debug!("Marker label contains a NUL byte, skipped");
            return;
        };
        let label = vk::DebugUtilsLabelEXT::default().label_name(&name);
        unsafe { debug_utils.cmd_insert_debug_utils_label(self.raw, &label) };
    }
}

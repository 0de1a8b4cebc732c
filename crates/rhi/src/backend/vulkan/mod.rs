//! Vulkan backend.
//!
//! Fences are timeline semaphores, command allocators are command pools and
//! clears are recorded as empty dynamic-rendering passes. Swapchain images are
//! acquired eagerly on the host so the back buffer index is always known.

mod command;
mod device;
mod instance;
mod resource;
mod swapchain;
mod sync;

use ash::vk;
use tracing::warn;

pub use command::{VulkanCommandAllocator, VulkanCommandList, VulkanQueue};
pub use device::VulkanDevice;
pub use instance::{VulkanAdapter, VulkanInstance};
pub use resource::{VulkanResource, VulkanView};
pub use swapchain::{SwapchainSupportDetails, VulkanSwapChain};
pub use sync::VulkanFence;

use crate::api;
use crate::types::{Format, ResourceState};

/// Marker type selecting the Vulkan implementation of [`api::Api`].
#[derive(Debug, Clone, Copy)]
pub enum Vulkan {}

impl api::Api for Vulkan {
    type Instance = VulkanInstance;
    type Adapter = VulkanAdapter;
    type Device = VulkanDevice;
    type Queue = VulkanQueue;
    type CommandAllocator = VulkanCommandAllocator;
    type CommandList = VulkanCommandList;
    type Fence = VulkanFence;
    type Resource = VulkanResource;
    type View = VulkanView;
    type SwapChain = VulkanSwapChain;
}

pub(super) fn format_to_vk(format: Format) -> vk::Format {
    match format {
        Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::D24UnormS8 => vk::Format::D24_UNORM_S8_UINT,
        Format::D32FloatS8 => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub(super) fn format_from_vk(format: vk::Format) -> Option<Format> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(Format::Rgba8Unorm),
        vk::Format::B8G8R8A8_UNORM => Some(Format::Bgra8Unorm),
        vk::Format::D24_UNORM_S8_UINT => Some(Format::D24UnormS8),
        vk::Format::D32_SFLOAT_S8_UINT => Some(Format::D32FloatS8),
        _ => None,
    }
}

fn state_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Common => vk::ImageLayout::GENERAL,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    }
}

/// Image layouts for a state transition.
///
/// Leaving `Common` or `Present` discards the contents: every frame clears
/// the back buffer before drawing.
pub(super) fn barrier_layouts(before: ResourceState, after: ResourceState) -> (vk::ImageLayout, vk::ImageLayout) {
    let old = match before {
        ResourceState::Common | ResourceState::Present => vk::ImageLayout::UNDEFINED,
        state => state_layout(state),
    };
    (old, state_layout(after))
}

/// Pipeline stages and access masks for a layout transition.
pub(super) fn barrier_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> (vk::PipelineStageFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::AccessFlags) {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::empty(),
        ),
        (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR) => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::empty(),
        ),
        _ => {
            warn!("Unhandled layout transition: {:?} -> {:?}", old_layout, new_layout);
            (
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mapping_is_reversible() {
        for format in [
            Format::Rgba8Unorm,
            Format::Bgra8Unorm,
            Format::D24UnormS8,
            Format::D32FloatS8,
        ] {
            assert_eq!(format_from_vk(format_to_vk(format)), Some(format));
        }
        assert_eq!(format_from_vk(vk::Format::R16G16B16A16_SFLOAT), None);
    }

    #[test]
    fn test_present_to_render_target_discards_contents() {
        let (old, new) = barrier_layouts(ResourceState::Present, ResourceState::RenderTarget);
        assert_eq!(old, vk::ImageLayout::UNDEFINED);
        assert_eq!(new, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let (src_stage, _, dst_stage, dst_access) = barrier_masks(old, new);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_render_target_to_present_keeps_contents() {
        let (old, new) = barrier_layouts(ResourceState::RenderTarget, ResourceState::Present);
        assert_eq!(old, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(new, vk::ImageLayout::PRESENT_SRC_KHR);

        let (src_stage, src_access, dst_stage, _) = barrier_masks(old, new);
        assert_eq!(src_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_unknown_transition_uses_full_barrier() {
        let (src_stage, _, dst_stage, _) =
            barrier_masks(vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(src_stage, vk::PipelineStageFlags::ALL_COMMANDS);
        assert_eq!(dst_stage, vk::PipelineStageFlags::ALL_COMMANDS);
    }
}

//! Fence backed by a timeline semaphore.
//!
//! The semaphore's counter is the completed value; queue submissions signal
//! it to a target and the host blocks in `vkWaitSemaphores`.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use super::device::DeviceShared;
use crate::api;
use crate::error::{RhiError, RhiResult};

/// Timeline semaphore wrapper.
pub struct VulkanFence {
    device: Arc<DeviceShared>,
    pub(super) raw: vk::Semaphore,
}

impl VulkanFence {
    pub(super) fn new(device: Arc<DeviceShared>, initial_value: u64) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let raw = unsafe { device.raw.create_semaphore(&create_info, None)? };
        debug!("Created timeline semaphore (initial value {})", initial_value);

        Ok(Self { device, raw })
    }
}

impl api::Fence for VulkanFence {
    fn completed_value(&self) -> RhiResult<u64> {
        Ok(unsafe { self.device.raw.get_semaphore_counter_value(self.raw)? })
    }

    fn wait(&self, value: u64) -> RhiResult<()> {
        let semaphores = [self.raw];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        unsafe { self.device.raw.wait_semaphores(&wait_info, u64::MAX) }
            .map_err(|e| RhiError::WaitFailed(format!("vkWaitSemaphores: {}", e)))
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe { self.device.raw.destroy_semaphore(self.raw, None) };
        debug!("Destroyed timeline semaphore");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VulkanFence>();
    }
}

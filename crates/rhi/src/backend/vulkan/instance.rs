//! Vulkan instance, adapter enumeration and the debug messenger.

use std::ffi::{CStr, c_void};
use std::sync::{Arc, Mutex, PoisonError};

use ash::{Entry, vk};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, warn};

use super::Vulkan;
use super::device::VulkanDevice;
use crate::api;
use crate::diagnostics::{DiagnosticCategory, DiagnosticMessage, DiagnosticQueue, DiagnosticSeverity};
use crate::error::RhiResult;
use crate::types::{AdapterInfo, DeviceDesc};

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

struct Messenger {
    handle: vk::DebugUtilsMessengerEXT,
    // Referenced by the driver through `p_user_data` until the messenger is destroyed.
    _queue: Box<DiagnosticQueue>,
}

pub(super) struct InstanceShared {
    pub(super) entry: Entry,
    pub(super) raw: ash::Instance,
    pub(super) surface_loader: ash::khr::surface::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    messenger: Mutex<Option<Messenger>>,
}

impl InstanceShared {
    pub(super) fn has_debug_utils(&self) -> bool {
        self.debug_utils.is_some()
    }
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe {
            let messenger = self
                .messenger
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            // Destroy debug messenger before instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger.handle, None);
            }
            self.raw.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Vulkan instance with optional validation layer support.
pub struct VulkanInstance {
    shared: Arc<InstanceShared>,
}

impl VulkanInstance {
    /// Load Vulkan and create an instance able to present on `display`.
    ///
    /// With `enable_validation`, the Khronos validation layer and the
    /// debug-utils extension are enabled when available; the messenger itself
    /// is registered at device creation.
    pub fn new(display: RawDisplayHandle, enable_validation: bool) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"flipchain")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"flipchain")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = ash_window::enumerate_required_extensions(display)?.to_vec();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let raw = unsafe { entry.create_instance(&create_info, None)? };
        info!(
            "Vulkan instance created (API 1.3, validation {})",
            if validation_available { "on" } else { "off" }
        );

        let surface_loader = ash::khr::surface::Instance::new(&entry, &raw);
        let debug_utils =
            validation_available.then(|| ash::ext::debug_utils::Instance::new(&entry, &raw));

        Ok(Self {
            shared: Arc::new(InstanceShared {
                entry,
                raw,
                surface_loader,
                debug_utils,
                messenger: Mutex::new(None),
            }),
        })
    }

    /// Whether the debug-utils extension is enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.shared.has_debug_utils()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        let wanted = VALIDATION_LAYER_NAME.to_bytes_with_nul();

        Ok(available_layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_bytes_with_nul() == wanted
        }))
    }

    /// Register the messenger feeding `queue`. Replaces a previous one.
    fn attach_diagnostics(&self, queue: &DiagnosticQueue) -> RhiResult<()> {
        let Some(debug_utils) = &self.shared.debug_utils else {
            warn!("Diagnostics requested but the validation layer is not enabled");
            return Ok(());
        };

        let queue = Box::new(queue.clone());
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(&*queue as *const DiagnosticQueue as *mut c_void);

        let handle = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };

        let mut slot = self
            .shared
            .messenger
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.replace(Messenger {
            handle,
            _queue: queue,
        }) {
            unsafe { debug_utils.destroy_debug_utils_messenger(old.handle, None) };
        }
        info!("Debug messenger created");
        Ok(())
    }
}

impl api::Instance<Vulkan> for VulkanInstance {
    fn enumerate_adapters(&self) -> RhiResult<Vec<VulkanAdapter>> {
        let instance = &self.shared.raw;
        let devices = unsafe { instance.enumerate_physical_devices()? };
        info!("Found {} GPU(s)", devices.len());

        Ok(devices
            .into_iter()
            .filter_map(|device| check_adapter(instance, device))
            .collect())
    }

    fn create_device(&self, adapter: &VulkanAdapter, desc: &DeviceDesc) -> RhiResult<VulkanDevice> {
        if let Some(queue) = &desc.diagnostics {
            self.attach_diagnostics(queue)?;
        }
        VulkanDevice::new(self.shared.clone(), adapter)
    }
}

/// A physical device with a graphics queue family and Vulkan 1.3.
#[derive(Clone)]
pub struct VulkanAdapter {
    pub(super) raw: vk::PhysicalDevice,
    pub(super) queue_family: u32,
    info: AdapterInfo,
}

impl api::Adapter for VulkanAdapter {
    fn info(&self) -> AdapterInfo {
        self.info.clone()
    }
}

fn check_adapter(instance: &ash::Instance, device: vk::PhysicalDevice) -> Option<VulkanAdapter> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let major = vk::api_version_major(properties.api_version);
    let minor = vk::api_version_minor(properties.api_version);
    if (major, minor) < (1, 3) {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            name, major, minor
        );
        return None;
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let Some(queue_family) = families
        .iter()
        .position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|index| index as u32)
    else {
        debug!("GPU '{}' skipped: no graphics queue family", name);
        return None;
    };

    let dedicated_memory = device_local_memory(&memory_properties);
    debug!(
        "GPU '{}': {} MB device-local, graphics family {}",
        name,
        dedicated_memory / (1024 * 1024),
        queue_family
    );

    Some(VulkanAdapter {
        raw: device,
        queue_family,
        info: AdapterInfo {
            name,
            dedicated_memory,
        },
    })
}

/// Total device-local memory in bytes.
fn device_local_memory(memory_properties: &vk::PhysicalDeviceMemoryProperties) -> u64 {
    memory_properties
        .memory_heaps
        .iter()
        .take(memory_properties.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .sum()
}

fn classify(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
) -> (DiagnosticCategory, DiagnosticSeverity) {
    let category = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => DiagnosticCategory::Execution,
        _ => DiagnosticCategory::Miscellaneous,
    };
    let severity = match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => DiagnosticSeverity::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => DiagnosticSeverity::Warning,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => DiagnosticSeverity::Info,
        _ => DiagnosticSeverity::Message,
    };
    (category, severity)
}

/// Debug callback for validation layer messages.
///
/// Runs on whatever thread the driver chooses; it only enqueues.
///
/// # Safety
///
/// `user_data` is null or points to the `DiagnosticQueue` boxed in the
/// owning [`Messenger`].
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let text = if callback_data.p_message.is_null() {
        "(no message)".to_string()
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message) }
            .to_string_lossy()
            .into_owned()
    };

    let (category, severity) = classify(message_severity, message_type);
    if user_data.is_null() {
        error!("[Vulkan {:?}] {}", severity, text);
    } else {
        let queue = unsafe { &*(user_data as *const DiagnosticQueue) };
        queue.push(DiagnosticMessage::new(category, severity, text));
    }

    // Returning VK_FALSE indicates the call should not be aborted
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_validation_error() {
        let (category, severity) = classify(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
        );
        assert_eq!(category, DiagnosticCategory::Execution);
        assert_eq!(severity, DiagnosticSeverity::Error);
    }

    #[test]
    fn test_classify_general_info() {
        let (category, severity) = classify(
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
        );
        assert_eq!(category, DiagnosticCategory::Miscellaneous);
        assert_eq!(severity, DiagnosticSeverity::Info);
    }

    #[test]
    fn test_device_local_memory_sums_local_heaps() {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 3,
            ..Default::default()
        };
        properties.memory_heaps[0] = vk::MemoryHeap {
            size: 4096,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        properties.memory_heaps[1] = vk::MemoryHeap {
            size: 1024,
            flags: vk::MemoryHeapFlags::empty(),
        };
        properties.memory_heaps[2] = vk::MemoryHeap {
            size: 2048,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        // Heaps past the count are ignored.
        properties.memory_heaps[3] = vk::MemoryHeap {
            size: 1 << 40,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };

        assert_eq!(device_local_memory(&properties), 6144);
    }
}

//! Device Context: adapter selection and logical device creation.

use std::sync::Arc;

use flipchain_core::LogSink;
use tracing::{debug, info, warn};

use crate::api::{Adapter, Api, Device, Instance};
use crate::diagnostics::DiagnosticQueue;
use crate::error::{RhiError, RhiResult};
use crate::types::{AdapterInfo, DeviceDesc, Format};

/// Options for [`DeviceContext::select_and_create`].
#[derive(Debug, Clone, Default)]
pub struct ContextDesc {
    /// Attach `diagnostics` to the device.
    pub enable_validation: bool,
    /// Queue receiving driver messages. Always owned by the context; only
    /// attached when validation is enabled.
    pub diagnostics: DiagnosticQueue,
}

/// The selected adapter and its logical device.
///
/// Created once and shared read-only by every other component.
pub struct DeviceContext<A: Api> {
    // Field order is drop order: the device goes before the instance.
    device: A::Device,
    adapter: A::Adapter,
    adapter_info: AdapterInfo,
    diagnostics: DiagnosticQueue,
    instance: A::Instance,
}

impl<A: Api> DeviceContext<A> {
    /// Enumerate adapters, pick the one with the most dedicated memory and
    /// create a logical device on it.
    ///
    /// # Errors
    ///
    /// - [`RhiError::AdapterNotFound`] if enumeration yields nothing
    /// - [`RhiError::DeviceCreationFailed`] if the driver rejects the device
    pub fn select_and_create(
        instance: A::Instance,
        desc: ContextDesc,
        sink: &dyn LogSink,
    ) -> RhiResult<Arc<Self>> {
        let adapters = instance.enumerate_adapters()?;
        let infos: Vec<AdapterInfo> = adapters.iter().map(Adapter::info).collect();

        for info in &infos {
            sink.log(&format!(
                "Found adapter: {} ({} MB)",
                info.name,
                info.dedicated_memory_mb()
            ));
        }

        let index = select_adapter(&infos).ok_or_else(|| {
            warn!("No GPU adapters found");
            RhiError::AdapterNotFound
        })?;
        let adapter_info = infos[index].clone();
        let adapter = adapters
            .into_iter()
            .nth(index)
            .ok_or(RhiError::AdapterNotFound)?;

        let device_desc = DeviceDesc {
            diagnostics: desc.enable_validation.then(|| desc.diagnostics.clone()),
        };
        let device = instance
            .create_device(&adapter, &device_desc)
            .map_err(|e| match e {
                RhiError::DeviceCreationFailed(_) => e,
                other => RhiError::DeviceCreationFailed(other.to_string()),
            })?;

        info!(
            "Selected adapter '{}' ({} MB dedicated)",
            adapter_info.name,
            adapter_info.dedicated_memory_mb()
        );
        if desc.enable_validation {
            debug!("Diagnostic queue attached to device");
        }

        Ok(Arc::new(Self {
            device,
            adapter,
            adapter_info,
            diagnostics: desc.diagnostics,
            instance,
        }))
    }

    #[inline]
    pub fn device(&self) -> &A::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &A::Instance {
        &self.instance
    }

    #[inline]
    pub fn adapter(&self) -> &A::Adapter {
        &self.adapter
    }

    #[inline]
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    /// The error queue the device reports into.
    #[inline]
    pub fn diagnostics(&self) -> &DiagnosticQueue {
        &self.diagnostics
    }

    /// Require `samples`-sample multisampling of `format`.
    ///
    /// Returns the quality level count, or [`RhiError::FeatureUnsupported`]
    /// when it is zero.
    pub fn require_multisample(&self, format: Format, samples: u32) -> RhiResult<u32> {
        let levels = self.device.multisample_quality_levels(format, samples)?;
        if levels == 0 {
            return Err(RhiError::FeatureUnsupported(format!(
                "{}x MSAA is not supported for {:?}",
                samples, format
            )));
        }
        debug!("{}x MSAA quality levels for {:?}: {}", samples, format, levels);
        Ok(levels)
    }
}

/// Index of the adapter with the most dedicated memory. Ties go to the
/// first enumerated.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Option<usize> {
    adapters
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, u64)>, (index, info)| match best {
            Some((_, memory)) if memory >= info.dedicated_memory => best,
            _ => Some((index, info.dedicated_memory)),
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, mb: u64) -> AdapterInfo {
        AdapterInfo {
            name: name.to_string(),
            dedicated_memory: mb * 1024 * 1024,
        }
    }

    #[test]
    fn test_select_adapter_prefers_most_memory() {
        let adapters = [
            adapter("integrated", 512),
            adapter("discrete", 8192),
            adapter("software", 0),
        ];
        assert_eq!(select_adapter(&adapters), Some(1));
    }

    #[test]
    fn test_select_adapter_ties_go_to_first() {
        let adapters = [adapter("a", 1024), adapter("b", 1024)];
        assert_eq!(select_adapter(&adapters), Some(0));
    }

    #[test]
    fn test_select_adapter_empty() {
        assert_eq!(select_adapter(&[]), None);
    }
}

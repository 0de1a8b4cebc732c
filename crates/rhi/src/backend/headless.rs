//! Simulated GPU.
//!
//! Every command is recorded into an inspectable trace, fences complete on a
//! helper thread (optionally after a latency) and waits block on a condition
//! variable. Failures can be injected through [`HeadlessGpu`].
//!
//! # Example
//!
//! ```
//! use flipchain_rhi::backend::headless::{HeadlessConfig, HeadlessGpu};
//!
//! let gpu = HeadlessGpu::new(HeadlessConfig::default());
//! let instance = gpu.instance();
//! // ... DeviceContext::<Headless>::select_and_create(instance, ...) ...
//! assert!(gpu.trace().is_empty());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::api::{self, Api};
use crate::diagnostics::{DiagnosticMessage, DiagnosticQueue};
use crate::error::{RhiError, RhiResult};
use crate::types::{
    AdapterInfo, DepthStencilViewDesc, DescriptorKind, DeviceDesc, Format, Rect, ResourceState,
    SwapChainDesc, TextureDesc, Viewport, WindowTarget,
};

/// Bytes between descriptor slots.
pub const DESCRIPTOR_INCREMENT: usize = 32;

/// First descriptor heap address handed out.
const DESCRIPTOR_BASE: usize = 0x1000;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The headless backend marker.
#[derive(Debug, Clone, Copy)]
pub enum Headless {}

impl Api for Headless {
    type Instance = HeadlessInstance;
    type Adapter = HeadlessAdapter;
    type Device = HeadlessDevice;
    type Queue = HeadlessQueue;
    type CommandAllocator = HeadlessAllocator;
    type CommandList = HeadlessCommandList;
    type Fence = HeadlessFence;
    type Resource = HeadlessResource;
    type View = HeadlessView;
    type SwapChain = HeadlessSwapChain;
}

/// Construction options for the simulated GPU.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub adapters: Vec<AdapterInfo>,
    /// Reject every device creation.
    pub reject_device: bool,
    /// Delay before a signaled fence value completes. `None` completes
    /// immediately.
    pub signal_latency: Option<Duration>,
    /// Returned by `multisample_quality_levels`.
    pub msaa_quality_levels: u32,
    /// Depth format substituted for every requested one. `None` keeps the
    /// request.
    pub depth_fallback: Option<Format>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            adapters: vec![
                AdapterInfo {
                    name: "Headless Integrated".to_string(),
                    dedicated_memory: 512 * 1024 * 1024,
                },
                AdapterInfo {
                    name: "Headless Discrete".to_string(),
                    dedicated_memory: 8 * 1024 * 1024 * 1024,
                },
            ],
            reject_device: false,
            signal_latency: None,
            msaa_quality_levels: 1,
            depth_fallback: None,
        }
    }
}

/// A command as recorded into a list.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Barrier {
        resource: u64,
        before: ResourceState,
        after: ResourceState,
    },
    Viewport(Viewport),
    Scissor(Rect),
    ClearRenderTarget {
        view: u64,
        resource: u64,
        color: [f32; 4],
    },
    ClearDepthStencil {
        view: u64,
        resource: u64,
        depth: f32,
        stencil: u8,
    },
    Marker(String),
}

/// Something the simulated GPU observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    AllocatorReset,
    Execute(Vec<RecordedCommand>),
    Signal(u64),
    Present { index: u32 },
    ResizeBuffers { width: u32, height: u32 },
}

#[derive(Default)]
struct GpuState {
    trace: Vec<TraceEvent>,
    failing_waits: u32,
    rejected_resizes: u32,
    out_of_date: bool,
    /// Buffer count the next successful resize switches to.
    resized_buffer_count: Option<u32>,
    blocking_waits: u64,
    descriptor_cursor: usize,
    diagnostics: Option<DiagnosticQueue>,
}

struct Shared {
    config: HeadlessConfig,
    state: Mutex<GpuState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, GpuState> {
        lock(&self.state)
    }

    fn record(&self, event: TraceEvent) {
        self.state().trace.push(event);
    }
}

/// Control and inspection handle for the simulated GPU.
///
/// Cloneable and `Send`, so tests can inject failures from other threads.
#[derive(Clone)]
pub struct HeadlessGpu {
    shared: Arc<Shared>,
}

impl HeadlessGpu {
    pub fn new(config: HeadlessConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(GpuState {
                    descriptor_cursor: DESCRIPTOR_BASE,
                    ..GpuState::default()
                }),
            }),
        }
    }

    /// Instance enumerating the configured adapters.
    pub fn instance(&self) -> HeadlessInstance {
        HeadlessInstance {
            shared: self.shared.clone(),
        }
    }

    /// Snapshot of everything observed so far.
    pub fn trace(&self) -> Vec<TraceEvent> {
        self.shared.state().trace.clone()
    }

    /// Forget the trace.
    pub fn clear_trace(&self) {
        self.shared.state().trace.clear();
    }

    /// Back-buffer indices passed to present, in order.
    pub fn presented_indices(&self) -> Vec<u32> {
        self.trace()
            .into_iter()
            .filter_map(|event| match event {
                TraceEvent::Present { index } => Some(index),
                _ => None,
            })
            .collect()
    }

    /// Sizes passed to `resize_buffers`, in order.
    pub fn resize_calls(&self) -> Vec<(u32, u32)> {
        self.trace()
            .into_iter()
            .filter_map(|event| match event {
                TraceEvent::ResizeBuffers { width, height } => Some((width, height)),
                _ => None,
            })
            .collect()
    }

    /// Command lists executed, in order.
    pub fn executed_lists(&self) -> Vec<Vec<RecordedCommand>> {
        self.trace()
            .into_iter()
            .filter_map(|event| match event {
                TraceEvent::Execute(commands) => Some(commands),
                _ => None,
            })
            .collect()
    }

    /// Waits that actually had to block.
    pub fn blocking_waits(&self) -> u64 {
        self.shared.state().blocking_waits
    }

    /// Make the next `count` fence waits fail.
    pub fn fail_next_waits(&self, count: u32) {
        self.shared.state().failing_waits = count;
    }

    /// Make the next `resize_buffers` fail.
    pub fn reject_next_resize(&self) {
        self.shared.state().rejected_resizes += 1;
    }

    /// Invalidate the swap chain as a surface change would, until the next
    /// successful resize.
    pub fn mark_out_of_date(&self) {
        self.shared.state().out_of_date = true;
    }

    /// Make the next successful resize come back with `count` buffers.
    pub fn change_buffer_count_on_resize(&self, count: u32) {
        self.shared.state().resized_buffer_count = Some(count);
    }

    /// Deliver a driver message as the debug layer would. Dropped when no
    /// diagnostic queue is attached.
    pub fn push_diagnostic(&self, message: DiagnosticMessage) {
        let queue = self.shared.state().diagnostics.clone();
        if let Some(queue) = queue {
            queue.push(message);
        }
    }
}

/// Enumerates the configured adapters.
pub struct HeadlessInstance {
    shared: Arc<Shared>,
}

impl api::Instance<Headless> for HeadlessInstance {
    fn enumerate_adapters(&self) -> RhiResult<Vec<HeadlessAdapter>> {
        Ok(self
            .shared
            .config
            .adapters
            .iter()
            .cloned()
            .map(|info| HeadlessAdapter { info })
            .collect())
    }

    fn create_device(&self, adapter: &HeadlessAdapter, desc: &DeviceDesc) -> RhiResult<HeadlessDevice> {
        if self.shared.config.reject_device {
            return Err(RhiError::DeviceCreationFailed(format!(
                "adapter '{}' rejected device creation",
                adapter.info.name
            )));
        }
        self.shared.state().diagnostics = desc.diagnostics.clone();
        debug!("Headless device created on '{}'", adapter.info.name);
        Ok(HeadlessDevice {
            shared: self.shared.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessAdapter {
    info: AdapterInfo,
}

impl api::Adapter for HeadlessAdapter {
    fn info(&self) -> AdapterInfo {
        self.info.clone()
    }
}

pub struct HeadlessDevice {
    shared: Arc<Shared>,
}

impl HeadlessDevice {
    fn resource(&self, kind: ResourceKind, width: u32, height: u32, format: Format) -> HeadlessResource {
        HeadlessResource(Arc::new(ResourceRecord {
            id: next_id(),
            kind,
            width,
            height,
            format,
        }))
    }
}

impl api::Device<Headless> for HeadlessDevice {
    fn create_queue(&self) -> RhiResult<HeadlessQueue> {
        Ok(HeadlessQueue {
            shared: self.shared.clone(),
        })
    }

    fn create_command_allocator(&self) -> RhiResult<HeadlessAllocator> {
        Ok(HeadlessAllocator {
            shared: self.shared.clone(),
        })
    }

    fn create_command_list(&self, _allocator: &HeadlessAllocator) -> RhiResult<HeadlessCommandList> {
        Ok(HeadlessCommandList {
            commands: Vec::new(),
            open: false,
        })
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<HeadlessFence> {
        Ok(HeadlessFence {
            shared: self.shared.clone(),
            inner: Arc::new(FenceInner {
                completed: Mutex::new(initial_value),
                condvar: Condvar::new(),
            }),
        })
    }

    fn descriptor_increment(&self, _kind: DescriptorKind) -> usize {
        DESCRIPTOR_INCREMENT
    }

    fn reserve_descriptors(&self, _kind: DescriptorKind, count: u32) -> RhiResult<usize> {
        let mut state = self.shared.state();
        let start = state.descriptor_cursor;
        state.descriptor_cursor += count as usize * DESCRIPTOR_INCREMENT;
        Ok(start)
    }

    fn create_render_target_view(&self, resource: &HeadlessResource) -> RhiResult<HeadlessView> {
        if resource.0.format.is_depth() {
            return Err(RhiError::SubmissionFailed(format!(
                "render-target view of depth resource {}",
                resource.id()
            )));
        }
        Ok(HeadlessView {
            id: next_id(),
            resource: resource.clone(),
            depth_desc: None,
        })
    }

    fn create_depth_stencil_view(
        &self,
        resource: &HeadlessResource,
        desc: &DepthStencilViewDesc,
    ) -> RhiResult<HeadlessView> {
        if desc.format != resource.0.format {
            return Err(RhiError::SubmissionFailed(format!(
                "depth view format {:?} does not match resource format {:?}",
                desc.format, resource.0.format
            )));
        }
        Ok(HeadlessView {
            id: next_id(),
            resource: resource.clone(),
            depth_desc: Some(*desc),
        })
    }

    fn resolve_depth_format(&self, requested: Format) -> RhiResult<Format> {
        if !requested.is_depth() {
            return Err(RhiError::FeatureUnsupported(format!(
                "{:?} is not a depth format",
                requested
            )));
        }
        Ok(self.shared.config.depth_fallback.unwrap_or(requested))
    }

    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<HeadlessResource> {
        Ok(self.resource(ResourceKind::Texture, desc.width, desc.height, desc.format))
    }

    fn multisample_quality_levels(&self, _format: Format, _samples: u32) -> RhiResult<u32> {
        Ok(self.shared.config.msaa_quality_levels)
    }

    fn create_swap_chain(
        &self,
        _queue: &HeadlessQueue,
        _target: &WindowTarget,
        desc: &SwapChainDesc,
    ) -> RhiResult<HeadlessSwapChain> {
        let buffers = (0..desc.buffer_count)
            .map(|index| self.resource(ResourceKind::BackBuffer(index), desc.width, desc.height, desc.format))
            .collect();
        Ok(HeadlessSwapChain {
            shared: self.shared.clone(),
            buffers,
            desc: *desc,
            current: 0,
        })
    }
}

pub struct HeadlessQueue {
    shared: Arc<Shared>,
}

impl api::Queue<Headless> for HeadlessQueue {
    fn execute(&self, list: &HeadlessCommandList) -> RhiResult<()> {
        if list.open {
            return Err(RhiError::SubmissionFailed(
                "command list executed while still open".to_string(),
            ));
        }
        self.shared.record(TraceEvent::Execute(list.commands.clone()));
        Ok(())
    }

    fn signal(&self, fence: &HeadlessFence, value: u64) -> RhiResult<()> {
        self.shared.record(TraceEvent::Signal(value));
        match self.shared.config.signal_latency {
            None => fence.inner.complete(value),
            Some(latency) => {
                let inner = fence.inner.clone();
                thread::spawn(move || {
                    thread::sleep(latency);
                    inner.complete(value);
                });
            }
        }
        Ok(())
    }
}

pub struct HeadlessAllocator {
    shared: Arc<Shared>,
}

impl api::CommandAllocator for HeadlessAllocator {
    fn reset(&mut self) -> RhiResult<()> {
        self.shared.record(TraceEvent::AllocatorReset);
        Ok(())
    }
}

#[derive(Debug)]
pub struct HeadlessCommandList {
    commands: Vec<RecordedCommand>,
    open: bool,
}

impl api::CommandList<Headless> for HeadlessCommandList {
    fn reset(&mut self, _allocator: &HeadlessAllocator) -> RhiResult<()> {
        self.commands.clear();
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> RhiResult<()> {
        self.open = false;
        Ok(())
    }

    fn resource_barrier(&mut self, resource: &HeadlessResource, before: ResourceState, after: ResourceState) {
        self.commands.push(RecordedCommand::Barrier {
            resource: resource.id(),
            before,
            after,
        });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.commands.push(RecordedCommand::Viewport(*viewport));
    }

    fn set_scissor(&mut self, rect: &Rect) {
        self.commands.push(RecordedCommand::Scissor(*rect));
    }

    fn clear_render_target(&mut self, view: &HeadlessView, color: [f32; 4]) {
        self.commands.push(RecordedCommand::ClearRenderTarget {
            view: view.id,
            resource: view.resource.id(),
            color,
        });
    }

    fn clear_depth_stencil(&mut self, view: &HeadlessView, depth: f32, stencil: u8) {
        self.commands.push(RecordedCommand::ClearDepthStencil {
            view: view.id,
            resource: view.resource.id(),
            depth,
            stencil,
        });
    }

    fn insert_marker(&mut self, label: &str) {
        self.commands.push(RecordedCommand::Marker(label.to_string()));
    }
}

struct FenceInner {
    completed: Mutex<u64>,
    condvar: Condvar,
}

impl FenceInner {
    fn complete(&self, value: u64) {
        let mut completed = lock(&self.completed);
        // Delayed completions may land out of order.
        *completed = (*completed).max(value);
        self.condvar.notify_all();
    }
}

pub struct HeadlessFence {
    shared: Arc<Shared>,
    inner: Arc<FenceInner>,
}

impl api::Fence for HeadlessFence {
    fn completed_value(&self) -> RhiResult<u64> {
        Ok(*lock(&self.inner.completed))
    }

    fn wait(&self, value: u64) -> RhiResult<()> {
        {
            let mut state = self.shared.state();
            if state.failing_waits > 0 {
                state.failing_waits -= 1;
                return Err(RhiError::WaitFailed("simulated wait failure".to_string()));
            }
        }

        let mut completed = lock(&self.inner.completed);
        if *completed >= value {
            return Ok(());
        }
        self.shared.state().blocking_waits += 1;
        while *completed < value {
            completed = self
                .inner
                .condvar
                .wait(completed)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    BackBuffer(u32),
    Texture,
}

#[derive(Debug)]
struct ResourceRecord {
    id: u64,
    kind: ResourceKind,
    width: u32,
    height: u32,
    format: Format,
}

/// Reference-counted simulated resource.
#[derive(Debug, Clone)]
pub struct HeadlessResource(Arc<ResourceRecord>);

impl HeadlessResource {
    /// Unique across the process.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.0.kind
    }

    pub fn size(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }

    pub fn format(&self) -> Format {
        self.0.format
    }

    /// Live references, including this one.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

/// Simulated descriptor. Holds a reference to its resource.
#[derive(Debug)]
pub struct HeadlessView {
    id: u64,
    resource: HeadlessResource,
    depth_desc: Option<DepthStencilViewDesc>,
}

impl HeadlessView {
    /// Unique across the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resource(&self) -> &HeadlessResource {
        &self.resource
    }

    /// The description a depth view was created with.
    pub fn depth_desc(&self) -> Option<&DepthStencilViewDesc> {
        self.depth_desc.as_ref()
    }
}

pub struct HeadlessSwapChain {
    shared: Arc<Shared>,
    buffers: Vec<HeadlessResource>,
    desc: SwapChainDesc,
    current: u32,
}

impl HeadlessSwapChain {
    fn create_buffers(&self, width: u32, height: u32) -> Vec<HeadlessResource> {
        (0..self.desc.buffer_count)
            .map(|index| {
                HeadlessResource(Arc::new(ResourceRecord {
                    id: next_id(),
                    kind: ResourceKind::BackBuffer(index),
                    width,
                    height,
                    format: self.desc.format,
                }))
            })
            .collect()
    }
}

impl api::SwapChain<Headless> for HeadlessSwapChain {
    fn buffer_count(&self) -> u32 {
        self.desc.buffer_count
    }

    fn format(&self) -> Format {
        self.desc.format
    }

    fn buffer(&self, index: u32) -> RhiResult<HeadlessResource> {
        self.buffers.get(index as usize).cloned().ok_or_else(|| {
            RhiError::SwapchainError(format!(
                "buffer index {} out of range ({} buffers)",
                index,
                self.buffers.len()
            ))
        })
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    fn is_out_of_date(&self) -> bool {
        self.shared.state().out_of_date
    }

    fn present(&mut self, _queue: &HeadlessQueue) -> RhiResult<()> {
        if self.shared.state().out_of_date {
            return Err(RhiError::SwapchainError(
                "present on an out-of-date swap chain".to_string(),
            ));
        }
        self.shared.record(TraceEvent::Present {
            index: self.current,
        });
        self.current = (self.current + 1) % self.desc.buffer_count;
        Ok(())
    }

    fn resize_buffers(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let buffer_count = {
            let mut state = self.shared.state();
            if state.rejected_resizes > 0 {
                state.rejected_resizes -= 1;
                return Err(RhiError::SwapchainError("simulated resize failure".to_string()));
            }
            state.resized_buffer_count.take()
        };

        if let Some((index, buffer)) = self
            .buffers
            .iter()
            .enumerate()
            .find(|(_, buffer)| buffer.reference_count() > 1)
        {
            return Err(RhiError::SwapchainError(format!(
                "buffer {} still has {} outstanding reference(s)",
                index,
                buffer.reference_count() - 1
            )));
        }

        if let Some(count) = buffer_count {
            self.desc.buffer_count = count;
        }
        self.buffers = self.create_buffers(width, height);
        self.desc.width = width;
        self.desc.height = height;
        self.current = 0;
        self.shared.state().out_of_date = false;
        self.shared
            .record(TraceEvent::ResizeBuffers { width, height });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CommandList, Device, Fence, Instance, Queue, SwapChain};

    fn device(config: HeadlessConfig) -> (HeadlessGpu, HeadlessDevice) {
        let gpu = HeadlessGpu::new(config);
        let instance = gpu.instance();
        let adapters = instance.enumerate_adapters().unwrap();
        let device = instance
            .create_device(&adapters[0], &DeviceDesc::default())
            .unwrap();
        (gpu, device)
    }

    fn swap_chain_desc() -> SwapChainDesc {
        SwapChainDesc {
            width: 64,
            height: 32,
            buffer_count: 2,
            format: Format::Rgba8Unorm,
        }
    }

    #[test]
    fn test_resize_rejected_while_buffer_referenced() {
        let (gpu, device) = device(HeadlessConfig::default());
        let queue = device.create_queue().unwrap();
        let mut swap_chain = device
            .create_swap_chain(&queue, &WindowTarget::Offscreen, &swap_chain_desc())
            .unwrap();

        let held = swap_chain.buffer(1).unwrap();
        assert!(swap_chain.resize_buffers(128, 64).is_err());

        drop(held);
        swap_chain.resize_buffers(128, 64).unwrap();
        assert_eq!(gpu.resize_calls(), vec![(128, 64)]);
        assert_eq!(swap_chain.buffer(0).unwrap().size(), (128, 64));
    }

    #[test]
    fn test_present_rotates_index() {
        let (gpu, device) = device(HeadlessConfig::default());
        let queue = device.create_queue().unwrap();
        let mut swap_chain = device
            .create_swap_chain(&queue, &WindowTarget::Offscreen, &swap_chain_desc())
            .unwrap();

        for _ in 0..3 {
            swap_chain.present(&queue).unwrap();
        }
        assert_eq!(gpu.presented_indices(), vec![0, 1, 0]);
        assert_eq!(swap_chain.current_back_buffer_index(), 1);
    }

    #[test]
    fn test_out_of_date_blocks_present_until_resize() {
        let (gpu, device) = device(HeadlessConfig::default());
        let queue = device.create_queue().unwrap();
        let mut swap_chain = device
            .create_swap_chain(&queue, &WindowTarget::Offscreen, &swap_chain_desc())
            .unwrap();

        gpu.mark_out_of_date();
        assert!(swap_chain.is_out_of_date());
        assert!(swap_chain.present(&queue).is_err());
        assert!(gpu.presented_indices().is_empty());

        swap_chain.resize_buffers(64, 32).unwrap();
        assert!(!swap_chain.is_out_of_date());
        swap_chain.present(&queue).unwrap();
        assert_eq!(gpu.presented_indices(), vec![0]);
    }

    #[test]
    fn test_delayed_signal_blocks_waiter() {
        let (gpu, device) = device(HeadlessConfig {
            signal_latency: Some(Duration::from_millis(20)),
            ..HeadlessConfig::default()
        });
        let queue = device.create_queue().unwrap();
        let fence = device.create_fence(0).unwrap();

        queue.signal(&fence, 1).unwrap();
        fence.wait(1).unwrap();

        assert_eq!(fence.completed_value().unwrap(), 1);
        assert_eq!(gpu.blocking_waits(), 1);
    }

    #[test]
    fn test_injected_wait_failure() {
        let (gpu, device) = device(HeadlessConfig::default());
        let fence = device.create_fence(0).unwrap();

        gpu.fail_next_waits(1);
        assert!(matches!(fence.wait(0), Err(RhiError::WaitFailed(_))));
        assert!(fence.wait(0).is_ok());
    }

    #[test]
    fn test_open_list_cannot_execute() {
        let (_gpu, device) = device(HeadlessConfig::default());
        let queue = device.create_queue().unwrap();
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(&allocator).unwrap();

        list.reset(&allocator).unwrap();
        assert!(queue.execute(&list).is_err());
        list.close().unwrap();
        assert!(queue.execute(&list).is_ok());
    }

    #[test]
    fn test_descriptor_ranges_do_not_overlap() {
        let (_gpu, device) = device(HeadlessConfig::default());
        let a = device.reserve_descriptors(DescriptorKind::RenderTarget, 2).unwrap();
        let b = device.reserve_descriptors(DescriptorKind::DepthStencil, 1).unwrap();
        assert_eq!(b, a + 2 * DESCRIPTOR_INCREMENT);
    }

    #[test]
    fn test_rejected_device() {
        let gpu = HeadlessGpu::new(HeadlessConfig {
            reject_device: true,
            ..HeadlessConfig::default()
        });
        let instance = gpu.instance();
        let adapters = instance.enumerate_adapters().unwrap();
        let result = instance.create_device(&adapters[0], &DeviceDesc::default());
        assert!(matches!(result, Err(RhiError::DeviceCreationFailed(_))));
    }
}

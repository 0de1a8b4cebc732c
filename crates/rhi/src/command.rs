//! Command Submission Unit: one allocator, one command list, one queue.
//!
//! # Usage Pattern
//!
//! ```text
//! 1. begin_frame()         reset allocator, open the list
//! 2. recorder() / record_barrier()
//! 3. close()
//! 4. submit()              execute + signal, returns the fence target
//! 5. flush(target)         wait before the next begin_frame()
//! ```
//!
//! Frames are serialized: the allocator is only reset once everything it
//! backed has retired on the GPU.

use std::sync::Arc;

use flipchain_core::LogSink;
use tracing::{debug, warn};

use crate::api::{Api, CommandAllocator, CommandList, Device, Queue};
use crate::error::{RhiError, RhiResult};
use crate::sync::FenceSynchronizer;
use crate::types::{Rect, ResourceState, Viewport};

/// How many times an outstanding wait is retried before giving up.
pub const WAIT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    Closed,
    Recording,
    Submitted,
}

/// Records and submits GPU work.
pub struct CommandSubmissionUnit<A: Api> {
    list: A::CommandList,
    allocator: A::CommandAllocator,
    queue: A::Queue,
    fence: FenceSynchronizer<A>,
    state: ListState,
    /// Fence value of the last executed batch.
    last_submitted: u64,
}

impl<A: Api> CommandSubmissionUnit<A> {
    /// Create the queue, allocator, list and fence on `device`.
    pub fn new(device: &A::Device, sink: Arc<dyn LogSink>) -> RhiResult<Self> {
        let queue = device
            .create_queue()
            .map_err(|e| RhiError::SubmissionFailed(format!("queue creation: {}", e)))?;
        let allocator = device
            .create_command_allocator()
            .map_err(|e| RhiError::SubmissionFailed(format!("allocator creation: {}", e)))?;
        let list = device
            .create_command_list(&allocator)
            .map_err(|e| RhiError::SubmissionFailed(format!("command list creation: {}", e)))?;
        let fence = FenceSynchronizer::new(device, sink)?;

        debug!("Command submission unit created");

        Ok(Self {
            list,
            allocator,
            queue,
            fence,
            state: ListState::Closed,
            last_submitted: 0,
        })
    }

    /// Reset the allocator and open the list for recording.
    ///
    /// Waits (with retries) for the last submission if it has not retired.
    ///
    /// # Panics
    ///
    /// Panics if the list is already recording.
    pub fn begin_frame(&mut self) -> RhiResult<()> {
        assert!(
            self.state != ListState::Recording,
            "begin_frame called while the command list is recording"
        );

        self.wait_with_retries(self.last_submitted)?;

        self.allocator
            .reset()
            .map_err(|e| RhiError::SubmissionFailed(format!("allocator reset: {}", e)))?;
        self.list
            .reset(&self.allocator)
            .map_err(|e| RhiError::SubmissionFailed(format!("command list reset: {}", e)))?;
        self.state = ListState::Recording;
        Ok(())
    }

    /// Append a resource-state transition.
    pub fn record_barrier(
        &mut self,
        resource: &A::Resource,
        before: ResourceState,
        after: ResourceState,
    ) {
        self.recorder().resource_barrier(resource, before, after);
    }

    /// Borrow the open list for recording.
    ///
    /// # Panics
    ///
    /// Panics if the list is not recording.
    pub fn recorder(&mut self) -> CommandRecorder<'_, A> {
        assert!(
            self.state == ListState::Recording,
            "recording into a command list that is not open"
        );
        CommandRecorder {
            list: &mut self.list,
        }
    }

    /// End recording.
    pub fn close(&mut self) -> RhiResult<()> {
        assert!(
            self.state == ListState::Recording,
            "close called on a command list that is not recording"
        );
        self.list
            .close()
            .map_err(|e| RhiError::SubmissionFailed(format!("command list close: {}", e)))?;
        self.state = ListState::Closed;
        Ok(())
    }

    /// Execute the closed list and signal the fence. Returns the new target.
    pub fn submit(&mut self) -> RhiResult<u64> {
        assert!(
            self.state == ListState::Closed,
            "submit requires a closed, unsubmitted command list"
        );
        self.queue
            .execute(&self.list)
            .map_err(|e| RhiError::SubmissionFailed(format!("execute: {}", e)))?;
        let value = self.fence.signal(&self.queue)?;
        self.last_submitted = value;
        self.state = ListState::Submitted;
        Ok(value)
    }

    /// Signal and wait for everything submitted so far.
    ///
    /// The only point at which swap-chain buffers may be destroyed or
    /// recreated.
    pub fn drain_queue(&mut self) -> RhiResult<u64> {
        let value = self.fence.signal(&self.queue)?;
        self.wait_with_retries(value)?;
        Ok(value)
    }

    /// Single wait for `value`. A failed wait is logged and swallowed;
    /// the next [`begin_frame`](Self::begin_frame) retries it.
    pub fn flush(&self, value: u64) -> RhiResult<()> {
        match self.fence.wait_until(value) {
            Err(RhiError::WaitFailed(_)) => Ok(()),
            other => other,
        }
    }

    /// Whether every signaled fence value has completed.
    pub fn is_idle(&self) -> RhiResult<bool> {
        self.fence.is_idle()
    }

    /// Fence value of the last [`submit`](Self::submit), 0 before the first.
    #[inline]
    pub fn last_submitted(&self) -> u64 {
        self.last_submitted
    }

    #[inline]
    pub fn queue(&self) -> &A::Queue {
        &self.queue
    }

    #[inline]
    pub fn fence(&self) -> &FenceSynchronizer<A> {
        &self.fence
    }

    fn wait_with_retries(&self, value: u64) -> RhiResult<()> {
        for attempt in 1..=WAIT_RETRIES {
            match self.fence.wait_until(value) {
                Ok(()) => return Ok(()),
                Err(RhiError::WaitFailed(_)) => {
                    warn!("Wait for fence value {} failed (attempt {})", value, attempt);
                }
                Err(e) => return Err(e),
            }
        }
        Err(RhiError::SubmissionFailed(format!(
            "GPU work up to fence value {} still outstanding after {} waits",
            value, WAIT_RETRIES
        )))
    }
}

/// Recording access to an open command list.
///
/// Handed to draw callbacks; it cannot close, submit or present.
pub struct CommandRecorder<'a, A: Api> {
    list: &'a mut A::CommandList,
}

impl<A: Api> CommandRecorder<'_, A> {
    pub fn resource_barrier(
        &mut self,
        resource: &A::Resource,
        before: ResourceState,
        after: ResourceState,
    ) {
        self.list.resource_barrier(resource, before, after);
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) {
        self.list.set_viewport(viewport);
    }

    pub fn set_scissor(&mut self, rect: &Rect) {
        self.list.set_scissor(rect);
    }

    pub fn clear_render_target(&mut self, view: &A::View, color: [f32; 4]) {
        self.list.clear_render_target(view, color);
    }

    pub fn clear_depth_stencil(&mut self, view: &A::View, depth: f32, stencil: u8) {
        self.list.clear_depth_stencil(view, depth, stencil);
    }

    pub fn insert_marker(&mut self, label: &str) {
        self.list.insert_marker(label);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flipchain_core::MemorySink;

    use super::*;
    use crate::api::Instance;
    use crate::backend::headless::{
        Headless, HeadlessConfig, HeadlessDevice, HeadlessGpu, RecordedCommand, TraceEvent,
    };
    use crate::types::DeviceDesc;

    fn setup(config: HeadlessConfig) -> (HeadlessGpu, HeadlessDevice) {
        let gpu = HeadlessGpu::new(config);
        let instance = gpu.instance();
        let adapters = instance.enumerate_adapters().unwrap();
        let device = instance
            .create_device(&adapters[0], &DeviceDesc::default())
            .unwrap();
        (gpu, device)
    }

    fn unit(device: &HeadlessDevice) -> CommandSubmissionUnit<Headless> {
        CommandSubmissionUnit::new(device, Arc::new(MemorySink::new())).unwrap()
    }

    #[test]
    fn test_frame_cycle_executes_then_signals() {
        let (gpu, device) = setup(HeadlessConfig::default());
        let mut csu = unit(&device);

        csu.begin_frame().unwrap();
        csu.recorder().insert_marker("draw");
        csu.close().unwrap();
        let value = csu.submit().unwrap();
        csu.flush(value).unwrap();

        assert_eq!(
            gpu.trace(),
            vec![
                TraceEvent::AllocatorReset,
                TraceEvent::Execute(vec![RecordedCommand::Marker("draw".into())]),
                TraceEvent::Signal(1),
            ]
        );
        assert!(csu.is_idle().unwrap());
    }

    #[test]
    fn test_drain_queue_waits_for_completion() {
        let (_gpu, device) = setup(HeadlessConfig {
            signal_latency: Some(Duration::from_millis(5)),
            ..HeadlessConfig::default()
        });
        let mut csu = unit(&device);

        csu.begin_frame().unwrap();
        csu.close().unwrap();
        csu.submit().unwrap();
        let value = csu.drain_queue().unwrap();

        assert_eq!(value, 2);
        assert!(csu.is_idle().unwrap());
    }

    #[test]
    fn test_begin_frame_retries_failed_waits() {
        let (gpu, device) = setup(HeadlessConfig {
            signal_latency: Some(Duration::from_millis(5)),
            ..HeadlessConfig::default()
        });
        let mut csu = unit(&device);

        csu.begin_frame().unwrap();
        csu.close().unwrap();
        let value = csu.submit().unwrap();

        gpu.fail_next_waits(1);
        csu.flush(value).unwrap();

        gpu.fail_next_waits(WAIT_RETRIES - 1);
        csu.begin_frame().unwrap();
    }

    #[test]
    fn test_begin_frame_fails_when_work_never_retires() {
        let (gpu, device) = setup(HeadlessConfig {
            signal_latency: Some(Duration::from_millis(500)),
            ..HeadlessConfig::default()
        });
        let mut csu = unit(&device);

        csu.begin_frame().unwrap();
        csu.close().unwrap();
        csu.submit().unwrap();

        gpu.fail_next_waits(WAIT_RETRIES);
        let err = csu.begin_frame().unwrap_err();
        assert!(matches!(err, RhiError::SubmissionFailed(_)));
    }

    #[test]
    #[should_panic(expected = "not open")]
    fn test_recording_into_closed_list_panics() {
        let (_gpu, device) = setup(HeadlessConfig::default());
        let mut csu = unit(&device);
        csu.recorder().insert_marker("too early");
    }

    #[test]
    #[should_panic(expected = "closed, unsubmitted")]
    fn test_submit_while_recording_panics() {
        let (_gpu, device) = setup(HeadlessConfig::default());
        let mut csu = unit(&device);
        csu.begin_frame().unwrap();
        let _ = csu.submit();
    }
}

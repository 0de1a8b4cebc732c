//! Fence Synchronizer: the CPU view of GPU completion.
//!
//! # Overview
//!
//! [`FenceSynchronizer`] owns one fence and the monotonically increasing
//! target value. Every batch of GPU work that must be awaited gets exactly one
//! [`signal`](FenceSynchronizer::signal); the CPU blocks on it with
//! [`wait_until`](FenceSynchronizer::wait_until).
//!
//! ```text
//! signal(queue) -> 1    wait_until(1)    signal(queue) -> 2    wait_until(2)
//! ```

use std::sync::Arc;

use flipchain_core::LogSink;
use tracing::{debug, warn};

use crate::api::{Api, Device, Fence, Queue};
use crate::error::{RhiError, RhiResult};

/// Fence plus its target counter.
pub struct FenceSynchronizer<A: Api> {
    fence: A::Fence,
    /// Last value handed out by `signal`.
    target: u64,
    sink: Arc<dyn LogSink>,
}

impl<A: Api> FenceSynchronizer<A> {
    /// Create a fence at zero.
    pub fn new(device: &A::Device, sink: Arc<dyn LogSink>) -> RhiResult<Self> {
        let fence = device
            .create_fence(0)
            .map_err(|e| RhiError::SubmissionFailed(format!("fence creation: {}", e)))?;
        debug!("Created fence synchronizer");
        Ok(Self {
            fence,
            target: 0,
            sink,
        })
    }

    /// Enqueue a GPU-side signal of the next target value and return it.
    ///
    /// Values are 1, 2, 3, ... regardless of intervening waits.
    pub fn signal(&mut self, queue: &A::Queue) -> RhiResult<u64> {
        let next = self.target + 1;
        queue
            .signal(&self.fence, next)
            .map_err(|e| RhiError::SubmissionFailed(format!("fence signal {}: {}", next, e)))?;
        self.target = next;
        Ok(next)
    }

    /// Block until the GPU has reached `value`.
    ///
    /// Returns immediately when `value` is already complete. A failed OS wait
    /// is logged and returned as [`RhiError::WaitFailed`]; the completed value
    /// may then still be stale.
    pub fn wait_until(&self, value: u64) -> RhiResult<()> {
        if self.completed_value()? >= value {
            return Ok(());
        }

        match self.fence.wait(value) {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = format!("wait for fence value {} failed: {}", value, e);
                warn!("{}", message);
                self.sink.log(&message);
                Err(RhiError::WaitFailed(message))
            }
        }
    }

    /// Value most recently observed complete on the GPU.
    pub fn completed_value(&self) -> RhiResult<u64> {
        self.fence.completed_value()
    }

    /// Last value handed out by [`signal`](Self::signal).
    #[inline]
    pub fn target_value(&self) -> u64 {
        self.target
    }

    /// Whether every signaled value has completed.
    pub fn is_idle(&self) -> RhiResult<bool> {
        Ok(self.completed_value()? >= self.target)
    }
}

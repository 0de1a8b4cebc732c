//! Backend trait family.
//!
//! A backend is a zero-sized marker implementing [`Api`]; its associated
//! types are the driver objects. Everything above this module is generic over
//! `A: Api` and never touches a driver directly.

use std::fmt;

use crate::error::RhiResult;
use crate::types::{
    AdapterInfo, DepthStencilViewDesc, DescriptorKind, DeviceDesc, Format, Rect, ResourceState,
    SwapChainDesc, TextureDesc, Viewport, WindowTarget,
};

/// A GPU backend.
pub trait Api: Sized + 'static {
    type Instance: Instance<Self>;
    type Adapter: Adapter;
    type Device: Device<Self>;
    type Queue: Queue<Self>;
    type CommandAllocator: CommandAllocator;
    type CommandList: CommandList<Self>;
    type Fence: Fence;
    /// Reference-counted handle to a GPU resource. Cloning adds a reference.
    type Resource: Clone + fmt::Debug;
    /// A descriptor written into a heap slot.
    type View: fmt::Debug;
    type SwapChain: SwapChain<Self>;
}

/// Entry point that enumerates adapters and creates devices.
pub trait Instance<A: Api> {
    /// All adapters visible to the process, in driver order.
    fn enumerate_adapters(&self) -> RhiResult<Vec<A::Adapter>>;

    /// Create a logical device on `adapter`.
    fn create_device(&self, adapter: &A::Adapter, desc: &DeviceDesc) -> RhiResult<A::Device>;
}

/// A physical or virtual GPU.
pub trait Adapter {
    fn info(&self) -> AdapterInfo;
}

/// Logical device: the factory for every other object.
pub trait Device<A: Api> {
    fn create_queue(&self) -> RhiResult<A::Queue>;
    fn create_command_allocator(&self) -> RhiResult<A::CommandAllocator>;
    /// The list is created closed.
    fn create_command_list(&self, allocator: &A::CommandAllocator) -> RhiResult<A::CommandList>;
    fn create_fence(&self, initial_value: u64) -> RhiResult<A::Fence>;

    /// Distance in bytes between consecutive slots of a heap of `kind`.
    fn descriptor_increment(&self, kind: DescriptorKind) -> usize;
    /// Reserve `count` slots and return the heap start address.
    fn reserve_descriptors(&self, kind: DescriptorKind, count: u32) -> RhiResult<usize>;

    fn create_render_target_view(&self, resource: &A::Resource) -> RhiResult<A::View>;
    fn create_depth_stencil_view(
        &self,
        resource: &A::Resource,
        desc: &DepthStencilViewDesc,
    ) -> RhiResult<A::View>;

    /// The depth format textures should use when `requested` is wanted.
    /// Either `requested` or a supported depth format.
    fn resolve_depth_format(&self, requested: Format) -> RhiResult<Format>;

    /// Allocate a committed texture in device-local memory.
    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<A::Resource>;

    /// Number of quality levels for `samples`-sample multisampling of `format`.
    /// Zero means unsupported.
    fn multisample_quality_levels(&self, format: Format, samples: u32) -> RhiResult<u32>;

    fn create_swap_chain(
        &self,
        queue: &A::Queue,
        target: &WindowTarget,
        desc: &SwapChainDesc,
    ) -> RhiResult<A::SwapChain>;
}

/// Command queue.
pub trait Queue<A: Api> {
    /// Execute a closed command list.
    fn execute(&self, list: &A::CommandList) -> RhiResult<()>;
    /// Enqueue a GPU-side signal of `fence` to `value`.
    fn signal(&self, fence: &A::Fence, value: u64) -> RhiResult<()>;
}

/// Backing memory for recorded commands.
pub trait CommandAllocator {
    /// Reclaim all command memory. No list recorded from it may be pending.
    fn reset(&mut self) -> RhiResult<()>;
}

/// Records GPU commands.
pub trait CommandList<A: Api> {
    /// Reopen for recording against `allocator`.
    fn reset(&mut self, allocator: &A::CommandAllocator) -> RhiResult<()>;
    fn close(&mut self) -> RhiResult<()>;

    fn resource_barrier(&mut self, resource: &A::Resource, before: ResourceState, after: ResourceState);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor(&mut self, rect: &Rect);
    fn clear_render_target(&mut self, view: &A::View, color: [f32; 4]);
    fn clear_depth_stencil(&mut self, view: &A::View, depth: f32, stencil: u8);
    /// Debug label; may be a no-op.
    fn insert_marker(&mut self, label: &str);
}

/// GPU-signaled completion counter.
pub trait Fence {
    fn completed_value(&self) -> RhiResult<u64>;
    /// Block the calling thread until the completed value reaches `value`.
    fn wait(&self, value: u64) -> RhiResult<()>;
}

/// Rotating set of presentable buffers.
pub trait SwapChain<A: Api> {
    fn buffer_count(&self) -> u32;
    fn format(&self) -> Format;
    /// Resource of buffer `index`. The caller holds a reference until dropped.
    fn buffer(&self, index: u32) -> RhiResult<A::Resource>;
    /// Buffer the presentation engine expects to be rendered next.
    fn current_back_buffer_index(&self) -> u32;
    /// The surface no longer matches the buffers and no buffer is acquired.
    /// Nothing may be rendered or presented until `resize_buffers` succeeds.
    fn is_out_of_date(&self) -> bool;
    fn present(&mut self, queue: &A::Queue) -> RhiResult<()>;
    /// Fails while any buffer reference handed out by [`buffer`](Self::buffer)
    /// is still alive.
    fn resize_buffers(&mut self, width: u32, height: u32) -> RhiResult<()>;
}

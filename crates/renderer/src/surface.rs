//! Presentation Surface: the swap chain, its ring of back buffers, the depth
//! buffer and every view into them.
//!
//! # Overview
//!
//! The surface owns N back buffers with N render-target views and one depth
//! buffer with one depth-stencil view. Views live in two descriptor heaps
//! whose slot addresses are `heap start + index * increment`.
//!
//! ```text
//! create()   swap chain -> N RTVs -> depth buffer -> DSV -> Common->DepthWrite, drained
//! present()  swap chain present, index = (index + 1) % N
//! resize()   release views and buffers -> index = 0 -> resize_buffers -> recreate all
//! ```
//!
//! Resizing requires an idle queue; the caller drains first.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use flipchain_core::{Config, LogSink};
use flipchain_rhi::api::{Api, Device, SwapChain};
use flipchain_rhi::{
    CommandSubmissionUnit, DescriptorHandle, DescriptorHeap, DescriptorKind, DeviceContext,
    Format, Rect, ResourceState, RhiError, RhiResult, SwapChainDesc, Viewport, WindowTarget,
};

use crate::depth_buffer::{DEFAULT_DEPTH_FORMAT, DepthBuffer};

/// Default back-buffer format.
pub const DEFAULT_BACK_BUFFER_FORMAT: Format = Format::Rgba8Unorm;

/// Surface creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub back_buffer_format: Format,
    pub depth_format: Format,
}

impl SurfaceConfig {
    /// `buffer_count` buffers of `width` x `height` in the default formats.
    pub fn new(width: u32, height: u32, buffer_count: u32) -> Self {
        Self {
            width,
            height,
            buffer_count,
            back_buffer_format: DEFAULT_BACK_BUFFER_FORMAT,
            depth_format: DEFAULT_DEPTH_FORMAT,
        }
    }
}

impl From<&Config> for SurfaceConfig {
    fn from(config: &Config) -> Self {
        Self::new(config.width, config.height, config.back_buffer_count)
    }
}

/// Everything one frame renders into, borrowed from the surface.
pub struct FrameTargets<'a, A: Api> {
    pub back_buffer: &'a A::Resource,
    pub render_target: &'a A::View,
    pub depth_stencil: &'a A::View,
    pub viewport: Viewport,
    pub scissor: Rect,
}

/// Swap chain plus the back buffers, depth buffer and views derived from it.
pub struct PresentationSurface<A: Api> {
    // Field order is drop order: views, then the resources they reference,
    // then the swap chain.
    rtv_heap: DescriptorHeap<A>,
    dsv_heap: DescriptorHeap<A>,
    back_buffers: Vec<A::Resource>,
    depth: Option<DepthBuffer<A>>,
    swap_chain: A::SwapChain,
    context: Arc<DeviceContext<A>>,

    buffer_count: u32,
    /// Buffer the next frame renders into.
    current: u32,
    back_buffer_format: Format,
    depth_format: Format,
    width: u32,
    height: u32,
    viewport: Viewport,
    scissor: Rect,
    /// Submission value covered by the last present.
    presented_through: u64,
    sink: Arc<dyn LogSink>,
}

impl<A: Api> PresentationSurface<A> {
    /// Build the swap chain, all views and the depth buffer, then transition
    /// the depth buffer to depth-write and drain the queue.
    ///
    /// Zero dimensions are clamped to 1.
    pub fn create(
        context: Arc<DeviceContext<A>>,
        commands: &mut CommandSubmissionUnit<A>,
        target: &WindowTarget,
        config: &SurfaceConfig,
        sink: Arc<dyn LogSink>,
    ) -> RhiResult<Self> {
        let (width, height) = clamp_size(config.width, config.height);
        let device = context.device();

        let swap_chain = device.create_swap_chain(
            commands.queue(),
            target,
            &SwapChainDesc {
                width,
                height,
                buffer_count: config.buffer_count,
                format: config.back_buffer_format,
            },
        )?;
        let buffer_count = swap_chain.buffer_count();
        let back_buffer_format = swap_chain.format();

        let rtv_heap = DescriptorHeap::new(device, DescriptorKind::RenderTarget, buffer_count)?;
        let dsv_heap = DescriptorHeap::new(device, DescriptorKind::DepthStencil, 1)?;

        let mut surface = Self {
            rtv_heap,
            dsv_heap,
            back_buffers: Vec::with_capacity(buffer_count as usize),
            depth: None,
            swap_chain,
            context,
            buffer_count,
            current: 0,
            back_buffer_format,
            depth_format: config.depth_format,
            width,
            height,
            viewport: Viewport::from_size(width, height),
            scissor: Rect::from_size(width, height),
            presented_through: 0,
            sink,
        };

        surface.create_views()?;
        surface.sync_index()?;
        surface.transition_depth(commands)?;

        info!(
            "Presentation surface created: {}x{}, {} back buffers ({:?}), depth {:?}",
            width, height, buffer_count, back_buffer_format, surface.depth_format
        );
        Ok(surface)
    }

    /// Recreate every buffer and view at the new size.
    ///
    /// # Errors
    ///
    /// [`RhiError::ResizeRejected`] if the swap chain refuses to resize.
    ///
    /// # Panics
    ///
    /// Panics if GPU work is still outstanding on `commands`.
    pub fn resize(
        &mut self,
        commands: &mut CommandSubmissionUnit<A>,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        assert!(
            commands.is_idle()?,
            "resize called while GPU work is outstanding; drain the queue first"
        );
        let (width, height) = clamp_size(width, height);

        self.rtv_heap.clear();
        self.dsv_heap.clear();
        self.back_buffers.clear();
        self.depth = None;
        self.current = 0;

        self.swap_chain.resize_buffers(width, height).map_err(|e| {
            error!("Swap chain resize to {}x{} failed: {}", width, height, e);
            RhiError::ResizeRejected(e.to_string())
        })?;
        let buffer_count = self.swap_chain.buffer_count();
        if buffer_count != self.buffer_count {
            error!(
                "Swap chain came back with {} buffers after resize, expected {}",
                buffer_count, self.buffer_count
            );
            return Err(RhiError::ResizeRejected(format!(
                "buffer count changed from {} to {}",
                self.buffer_count, buffer_count
            )));
        }

        self.width = width;
        self.height = height;
        self.create_views()?;
        self.sync_index()?;
        self.transition_depth(commands)?;

        self.sink
            .log(&format!("Resized surface to {}x{}", width, height));
        Ok(())
    }

    /// Present the current back buffer and advance to the next one.
    ///
    /// If the swap chain goes out of date while presenting, the index is left
    /// alone; [`is_out_of_date`](Self::is_out_of_date) then reports it and
    /// only a resize makes the surface usable again.
    ///
    /// # Panics
    ///
    /// Panics if nothing was submitted since the last present.
    pub fn present(&mut self, commands: &CommandSubmissionUnit<A>) -> RhiResult<()> {
        assert!(
            commands.last_submitted() > self.presented_through,
            "present called before the frame's command list was submitted"
        );

        self.swap_chain.present(commands.queue())?;
        self.presented_through = commands.last_submitted();
        if self.swap_chain.is_out_of_date() {
            warn!("Swap chain out of date after present of buffer {}", self.current);
            return Ok(());
        }
        self.current = (self.current + 1) % self.buffer_count;
        self.sync_index()
    }

    /// No back buffer is acquired; the surface must be resized before the
    /// next frame.
    #[inline]
    pub fn is_out_of_date(&self) -> bool {
        self.swap_chain.is_out_of_date()
    }

    /// Handle of the render-target view the next frame draws into.
    pub fn current_back_buffer_view(&self) -> DescriptorHandle {
        self.rtv_heap.handle(self.current as usize)
    }

    /// Handle of the depth-stencil view.
    pub fn depth_stencil_view(&self) -> DescriptorHandle {
        self.dsv_heap.handle(0)
    }

    /// Handle of the render-target view of back buffer `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`buffer_count`](Self::buffer_count).
    pub fn back_buffer_view(&self, index: u32) -> DescriptorHandle {
        self.rtv_heap.handle(index as usize)
    }

    /// The render-target view behind `handle`, `None` if stale.
    pub fn resolve_render_target(&self, handle: DescriptorHandle) -> Option<&A::View> {
        self.rtv_heap.resolve(handle)
    }

    /// The depth-stencil view behind `handle`, `None` if stale.
    pub fn resolve_depth_stencil(&self, handle: DescriptorHandle) -> Option<&A::View> {
        self.dsv_heap.resolve(handle)
    }

    /// Resources and views for the current frame.
    pub fn frame_targets(&self) -> RhiResult<FrameTargets<'_, A>> {
        if self.is_out_of_date() {
            return Err(RhiError::SurfaceError(
                "swap chain is out of date; resize before rendering".to_string(),
            ));
        }
        let missing = |what: &str| {
            RhiError::SurfaceError(format!(
                "{} for back buffer {} is missing",
                what, self.current
            ))
        };

        Ok(FrameTargets {
            back_buffer: self
                .back_buffers
                .get(self.current as usize)
                .ok_or_else(|| missing("resource"))?,
            render_target: self
                .resolve_render_target(self.current_back_buffer_view())
                .ok_or_else(|| missing("render-target view"))?,
            depth_stencil: self
                .resolve_depth_stencil(self.depth_stencil_view())
                .ok_or_else(|| missing("depth-stencil view"))?,
            viewport: self.viewport,
            scissor: self.scissor,
        })
    }

    #[inline]
    pub fn current_index(&self) -> u32 {
        self.current
    }

    #[inline]
    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    /// Client size as `(width, height)`.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn scissor(&self) -> Rect {
        self.scissor
    }

    #[inline]
    pub fn back_buffer_format(&self) -> Format {
        self.back_buffer_format
    }

    #[inline]
    pub fn depth_format(&self) -> Format {
        self.depth_format
    }

    pub fn depth_buffer(&self) -> Option<&DepthBuffer<A>> {
        self.depth.as_ref()
    }

    pub fn render_target_heap(&self) -> &DescriptorHeap<A> {
        &self.rtv_heap
    }

    pub fn depth_stencil_heap(&self) -> &DescriptorHeap<A> {
        &self.dsv_heap
    }

    fn create_views(&mut self) -> RhiResult<()> {
        let device = self.context.device();

        for index in 0..self.buffer_count {
            let buffer = self.swap_chain.buffer(index)?;
            let view = device.create_render_target_view(&buffer)?;
            self.rtv_heap.write(index as usize, view);
            self.back_buffers.push(buffer);
        }

        let depth = DepthBuffer::new(device, self.width, self.height, self.depth_format)?;
        let view = device.create_depth_stencil_view(depth.resource(), &depth.view_desc())?;
        self.dsv_heap.write(0, view);
        self.depth_format = depth.format();
        self.depth = Some(depth);

        self.viewport = Viewport::from_size(self.width, self.height);
        self.scissor = Rect::from_size(self.width, self.height);
        debug!(
            "Created {} render-target views and 1 depth-stencil view",
            self.buffer_count
        );
        Ok(())
    }

    /// Follow the swap chain if it expects a different buffer.
    fn sync_index(&mut self) -> RhiResult<()> {
        if self.swap_chain.is_out_of_date() {
            return Ok(());
        }
        let expected = self.swap_chain.current_back_buffer_index();
        if expected >= self.buffer_count {
            return Err(RhiError::SurfaceError(format!(
                "swap chain expects back buffer {} of {}",
                expected, self.buffer_count
            )));
        }
        if expected != self.current {
            debug!(
                "Swap chain expects back buffer {} (tracked {})",
                expected, self.current
            );
            self.current = expected;
        }
        Ok(())
    }

    fn transition_depth(&mut self, commands: &mut CommandSubmissionUnit<A>) -> RhiResult<()> {
        let depth = self
            .depth
            .as_ref()
            .ok_or_else(|| RhiError::SurfaceError("depth buffer missing".to_string()))?;

        commands.begin_frame()?;
        commands.record_barrier(
            depth.resource(),
            ResourceState::Common,
            ResourceState::DepthWrite,
        );
        commands.close()?;
        commands.submit()?;
        commands.drain_queue()?;

        self.presented_through = commands.last_submitted();
        Ok(())
    }
}

fn clamp_size(width: u32, height: u32) -> (u32, u32) {
    (width.max(1), height.max(1))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use flipchain_core::MemorySink;
    use flipchain_rhi::backend::headless::{
        DESCRIPTOR_INCREMENT, Headless, HeadlessConfig, HeadlessGpu, RecordedCommand,
    };
    use flipchain_rhi::{ContextDesc, DeviceContext};

    use super::*;

    struct Fixture {
        gpu: HeadlessGpu,
        commands: CommandSubmissionUnit<Headless>,
        surface: PresentationSurface<Headless>,
    }

    fn fixture(buffer_count: u32) -> Fixture {
        fixture_with(HeadlessConfig::default(), buffer_count)
    }

    fn fixture_with(config: HeadlessConfig, buffer_count: u32) -> Fixture {
        let gpu = HeadlessGpu::new(config);
        let sink: Arc<dyn LogSink> = Arc::new(MemorySink::new());
        let context =
            DeviceContext::<Headless>::select_and_create(gpu.instance(), ContextDesc::default(), &*sink)
                .unwrap();
        let mut commands = CommandSubmissionUnit::new(context.device(), sink.clone()).unwrap();
        let surface = PresentationSurface::create(
            context,
            &mut commands,
            &WindowTarget::Offscreen,
            &SurfaceConfig::new(1280, 720, buffer_count),
            sink,
        )
        .unwrap();
        Fixture {
            gpu,
            commands,
            surface,
        }
    }

    fn submit_empty_frame(commands: &mut CommandSubmissionUnit<Headless>) {
        commands.begin_frame().unwrap();
        commands.close().unwrap();
        commands.submit().unwrap();
    }

    #[test]
    fn test_create_transitions_depth_buffer() {
        let f = fixture(2);
        let depth = f.surface.depth_buffer().unwrap().resource().id();

        assert_eq!(
            f.gpu.executed_lists(),
            vec![vec![RecordedCommand::Barrier {
                resource: depth,
                before: ResourceState::Common,
                after: ResourceState::DepthWrite,
            }]]
        );
        assert!(f.commands.is_idle().unwrap());
        assert_eq!(f.surface.viewport(), Viewport::from_size(1280, 720));
        assert_eq!(f.surface.scissor(), Rect::from_size(1280, 720));
    }

    #[test]
    fn test_back_buffer_views_are_evenly_spaced() {
        let f = fixture(3);
        let heap = f.surface.render_target_heap();

        let handles: Vec<_> = (0..3).map(|i| f.surface.back_buffer_view(i)).collect();
        for (index, handle) in handles.iter().enumerate() {
            assert_eq!(handle.ptr, heap.start() + index * DESCRIPTOR_INCREMENT);
        }
        assert_eq!(handles.iter().collect::<HashSet<_>>().len(), 3);
    }

    #[test]
    fn test_depth_view_uses_full_description() {
        let f = fixture(2);
        let view = f
            .surface
            .resolve_depth_stencil(f.surface.depth_stencil_view())
            .unwrap();
        assert_eq!(
            view.depth_desc(),
            Some(&flipchain_rhi::DepthStencilViewDesc::texture_2d(DEFAULT_DEPTH_FORMAT))
        );
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let mut f = fixture(2);
        f.surface.resize(&mut f.commands, 0, 0).unwrap();
        assert_eq!(f.surface.size(), (1, 1));
        assert_eq!(f.gpu.resize_calls(), vec![(1, 1)]);
    }

    #[test]
    fn test_rejected_resize_is_reported() {
        let mut f = fixture(2);
        f.gpu.reject_next_resize();

        let result = f.surface.resize(&mut f.commands, 800, 600);
        assert!(matches!(result, Err(RhiError::ResizeRejected(_))));
    }

    #[test]
    fn test_resize_rejects_changed_buffer_count() {
        let mut f = fixture(2);
        f.gpu.change_buffer_count_on_resize(3);

        let result = f.surface.resize(&mut f.commands, 800, 600);
        assert!(matches!(result, Err(RhiError::ResizeRejected(_))));
        assert_eq!(f.surface.buffer_count(), 2);
    }

    #[test]
    fn test_substituted_depth_format_is_reported() {
        let mut f = fixture_with(
            HeadlessConfig {
                depth_fallback: Some(Format::D32FloatS8),
                ..HeadlessConfig::default()
            },
            2,
        );
        assert_eq!(f.surface.depth_format(), Format::D32FloatS8);

        f.surface.resize(&mut f.commands, 320, 240).unwrap();
        let view = f
            .surface
            .resolve_depth_stencil(f.surface.depth_stencil_view())
            .unwrap();
        assert_eq!(view.resource().format(), Format::D32FloatS8);
        assert_eq!(
            view.depth_desc(),
            Some(&flipchain_rhi::DepthStencilViewDesc::texture_2d(Format::D32FloatS8))
        );
    }

    #[test]
    fn test_out_of_date_surface_has_no_frame_targets() {
        let mut f = fixture(2);
        f.gpu.mark_out_of_date();

        assert!(f.surface.is_out_of_date());
        assert!(matches!(
            f.surface.frame_targets(),
            Err(RhiError::SurfaceError(_))
        ));

        f.surface.resize(&mut f.commands, 1280, 720).unwrap();
        assert!(!f.surface.is_out_of_date());
        assert_eq!(f.surface.current_index(), 0);
        assert!(f.surface.frame_targets().is_ok());
    }

    #[test]
    fn test_resize_rejected_while_back_buffer_is_held() {
        let mut f = fixture(2);
        let held = f.surface.frame_targets().unwrap().back_buffer.clone();

        let result = f.surface.resize(&mut f.commands, 800, 600);
        assert!(matches!(result, Err(RhiError::ResizeRejected(_))));
        drop(held);
    }

    #[test]
    #[should_panic(expected = "drain the queue first")]
    fn test_resize_with_outstanding_work_panics() {
        let gpu = HeadlessGpu::new(HeadlessConfig {
            signal_latency: Some(std::time::Duration::from_millis(200)),
            ..HeadlessConfig::default()
        });
        let sink: Arc<dyn LogSink> = Arc::new(MemorySink::new());
        let context =
            DeviceContext::<Headless>::select_and_create(gpu.instance(), ContextDesc::default(), &*sink)
                .unwrap();
        let mut commands = CommandSubmissionUnit::new(context.device(), sink.clone()).unwrap();
        let mut surface = PresentationSurface::create(
            context,
            &mut commands,
            &WindowTarget::Offscreen,
            &SurfaceConfig::new(64, 64, 2),
            sink,
        )
        .unwrap();

        submit_empty_frame(&mut commands);
        let _ = surface.resize(&mut commands, 128, 128);
    }

    #[test]
    #[should_panic(expected = "before the frame's command list was submitted")]
    fn test_present_without_submission_panics() {
        let mut f = fixture(2);
        let _ = f.surface.present(&f.commands);
    }

    #[test]
    fn test_present_advances_index() {
        let mut f = fixture(2);
        assert_eq!(f.surface.current_index(), 0);

        submit_empty_frame(&mut f.commands);
        f.surface.present(&f.commands).unwrap();
        assert_eq!(f.surface.current_index(), 1);

        submit_empty_frame(&mut f.commands);
        f.surface.present(&f.commands).unwrap();
        assert_eq!(f.surface.current_index(), 0);
    }
}

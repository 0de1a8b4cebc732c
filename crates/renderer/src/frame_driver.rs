//! Frame Driver: the render loop.
//!
//! # Overview
//!
//! Ties platform events, the timer and the GPU together on one thread:
//!
//! ```text
//! loop {
//!     raise queued driver diagnostics
//!     if an event is pending: dispatch it, continue
//!     tick the timer
//!     if paused: sleep, continue
//!     frame stats -> update -> render one frame
//! }
//! ```
//!
//! Rendering one frame:
//!
//! ```text
//! begin_frame
//! back buffer Present -> RenderTarget
//! viewport, scissor, clear color, clear depth
//! draw callback
//! back buffer RenderTarget -> Present
//! close, submit (signal), present, drain
//! ```
//!
//! Frames are serialized: the queue is drained after every present, so the
//! next `begin_frame` never resets an allocator the GPU is still reading.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use flipchain_core::{Clock, Config, LogSink, SystemClock, Timer};
use flipchain_platform::{KeyCode, PlatformEvent, PointerButton, PointerButtons};
use flipchain_rhi::api::Api;
use flipchain_rhi::{
    CommandRecorder, CommandSubmissionUnit, DepthStencilClear, DeviceContext, ResourceState,
    RhiResult, WindowTarget,
};

use crate::frame_stats::{FrameCounter, FrameStats};
use crate::loop_state::{Reaction, RenderLoopState, TimerCommand};
use crate::surface::{PresentationSurface, SurfaceConfig};

/// Timer reading passed to callbacks, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    pub delta: f32,
    pub total: f32,
}

/// Application hooks invoked by the driver.
///
/// `draw` records between the two back-buffer transitions; the recorder
/// cannot close, submit or present.
pub trait FrameCallbacks<A: Api> {
    fn update(&mut self, _time: FrameTime) {}

    /// Clear color for this frame; `None` uses the configured one.
    fn clear_color(&self, _time: FrameTime) -> Option<[f32; 4]> {
        None
    }

    fn draw(&mut self, _recorder: &mut CommandRecorder<'_, A>, _time: FrameTime) {}

    fn pointer_down(&mut self, _button: PointerButton, _x: f32, _y: f32) {}

    fn pointer_up(&mut self, _button: PointerButton, _x: f32, _y: f32) {}

    fn pointer_move(&mut self, _buttons: PointerButtons, _x: f32, _y: f32) {}

    fn key_up(&mut self, _key: KeyCode) {}

    /// Called once per second with the new window title.
    fn title_changed(&mut self, _title: &str, _stats: &FrameStats) {}
}

/// Callbacks that do nothing beyond clearing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCallbacks;

impl<A: Api> FrameCallbacks<A> for NoCallbacks {}

/// Source of platform events for [`FrameDriver::run`].
pub trait EventSource {
    /// Next pending event, without blocking.
    fn poll(&mut self) -> Option<PlatformEvent>;
}

/// Whether the loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The render-loop state machine.
pub struct FrameDriver<A: Api, C: FrameCallbacks<A>, K: Clock = SystemClock> {
    // Field order is drop order: the surface goes before the queue it
    // presents on, both before the device.
    surface: PresentationSurface<A>,
    commands: CommandSubmissionUnit<A>,
    context: Arc<DeviceContext<A>>,
    callbacks: C,

    timer: Timer<K>,
    state: RenderLoopState,
    counter: FrameCounter,
    client_width: u32,
    client_height: u32,
    title: String,
    clear_color: [f32; 4],
    paused_sleep: Duration,
    sink: Arc<dyn LogSink>,
    frames_rendered: u64,
    shut_down: bool,
}

impl<A: Api, C: FrameCallbacks<A>> FrameDriver<A, C, SystemClock> {
    /// Create the driver on wall-clock time.
    pub fn new(
        context: Arc<DeviceContext<A>>,
        target: &WindowTarget,
        config: &Config,
        callbacks: C,
        sink: Arc<dyn LogSink>,
    ) -> RhiResult<Self> {
        Self::with_clock(context, target, config, callbacks, sink, SystemClock::default())
    }
}

impl<A: Api, C: FrameCallbacks<A>, K: Clock> FrameDriver<A, C, K> {
    /// Probe multisample support, create the submission unit and the
    /// surface, and reset the timer.
    pub fn with_clock(
        context: Arc<DeviceContext<A>>,
        target: &WindowTarget,
        config: &Config,
        callbacks: C,
        sink: Arc<dyn LogSink>,
        clock: K,
    ) -> RhiResult<Self> {
        let surface_config = SurfaceConfig::from(config);
        if config.msaa_samples > 1 {
            context.require_multisample(surface_config.back_buffer_format, config.msaa_samples)?;
        }

        let mut commands = CommandSubmissionUnit::new(context.device(), sink.clone())?;
        let surface = PresentationSurface::create(
            context.clone(),
            &mut commands,
            target,
            &surface_config,
            sink.clone(),
        )?;

        let mut timer = Timer::with_clock(clock).with_sink(sink.clone());
        timer.reset();

        let (client_width, client_height) = surface.size();
        info!("Frame driver ready on '{}'", context.adapter_info().name);

        Ok(Self {
            surface,
            commands,
            context,
            callbacks,
            timer,
            state: RenderLoopState::new(),
            counter: FrameCounter::new(),
            client_width,
            client_height,
            title: config.title.clone(),
            clear_color: config.clear_color,
            paused_sleep: config.paused_sleep,
            sink,
            frames_rendered: 0,
            shut_down: false,
        })
    }

    /// Run until a quit event, then drain the queue.
    pub fn run<E: EventSource>(&mut self, events: &mut E) -> RhiResult<()> {
        loop {
            match events.poll() {
                Some(event) => {
                    if self.handle_event(event)? == Flow::Quit {
                        break;
                    }
                }
                None => self.run_iteration()?,
            }
        }
        self.shutdown()
    }

    /// React to one platform event.
    ///
    /// Raises queued driver diagnostics before doing anything else.
    pub fn handle_event(&mut self, event: PlatformEvent) -> RhiResult<Flow> {
        self.check_diagnostics()?;

        match event {
            PlatformEvent::Quit => return Ok(Flow::Quit),
            PlatformEvent::KeyUp(key) => {
                self.callbacks.key_up(key);
                if key == KeyCode::Escape {
                    info!("Escape released, quitting");
                    return Ok(Flow::Quit);
                }
            }
            PlatformEvent::PointerDown(button, x, y) => self.callbacks.pointer_down(button, x, y),
            PlatformEvent::PointerUp(button, x, y) => self.callbacks.pointer_up(button, x, y),
            PlatformEvent::PointerMove(buttons, x, y) => self.callbacks.pointer_move(buttons, x, y),
            PlatformEvent::Size { width, height, .. } => {
                self.client_width = width;
                self.client_height = height;
                let reaction = self.state.apply(&event);
                self.react(reaction)?;
            }
            PlatformEvent::Activate(_)
            | PlatformEvent::EnterSizeMove
            | PlatformEvent::ExitSizeMove => {
                let reaction = self.state.apply(&event);
                self.react(reaction)?;
            }
        }
        Ok(Flow::Continue)
    }

    /// One loop iteration with no pending event: tick, then either sleep
    /// (paused) or update and render a frame.
    pub fn run_iteration(&mut self) -> RhiResult<()> {
        self.check_diagnostics()?;

        self.timer.tick();
        if self.state.paused {
            thread::sleep(self.paused_sleep);
            return Ok(());
        }

        let time = FrameTime {
            delta: self.timer.delta_time(),
            total: self.timer.total_time(),
        };

        if let Some(stats) = self.counter.record(time.total) {
            let title = stats.title(&self.title);
            debug!("{}", title);
            self.callbacks.title_changed(&title, &stats);
        }

        self.callbacks.update(time);
        self.render_frame(time)
    }

    /// Drain the queue. Idempotent.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.commands.drain_queue()?;
        self.shut_down = true;
        info!("Frame driver shut down after {} frames", self.frames_rendered);
        Ok(())
    }

    /// Drain the queue and resize the surface to the current client size.
    pub fn resize(&mut self) -> RhiResult<()> {
        self.commands.drain_queue()?;
        self.surface
            .resize(&mut self.commands, self.client_width, self.client_height)?;
        debug!(
            "Surface resized to {}x{}",
            self.client_width, self.client_height
        );
        Ok(())
    }

    #[inline]
    pub fn surface(&self) -> &PresentationSurface<A> {
        &self.surface
    }

    #[inline]
    pub fn commands(&self) -> &CommandSubmissionUnit<A> {
        &self.commands
    }

    #[inline]
    pub fn context(&self) -> &Arc<DeviceContext<A>> {
        &self.context
    }

    #[inline]
    pub fn state(&self) -> &RenderLoopState {
        &self.state
    }

    #[inline]
    pub fn timer(&self) -> &Timer<K> {
        &self.timer
    }

    #[inline]
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    #[inline]
    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Client size as last reported by the platform.
    #[inline]
    pub fn client_size(&self) -> (u32, u32) {
        (self.client_width, self.client_height)
    }

    #[inline]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    fn check_diagnostics(&self) -> RhiResult<()> {
        match self.context.diagnostics().take_fatal() {
            Some(err) => {
                error!("Driver reported fatal diagnostics:\n{}", err);
                self.sink.log(&err.to_string());
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn react(&mut self, reaction: Reaction) -> RhiResult<()> {
        // The timer warns on redundant start/stop; only issue real transitions.
        match reaction.timer {
            Some(TimerCommand::Start) if self.timer.is_stopped() => self.timer.start(),
            Some(TimerCommand::Stop) if !self.timer.is_stopped() => self.timer.stop(),
            _ => {}
        }
        if reaction.resize {
            self.resize()?;
        }
        Ok(())
    }

    fn render_frame(&mut self, time: FrameTime) -> RhiResult<()> {
        if self.surface.is_out_of_date() {
            info!("Swap chain out of date, recreating it before rendering");
            self.resize()?;
        }

        let color = self
            .callbacks
            .clear_color(time)
            .unwrap_or(self.clear_color);
        let depth = DepthStencilClear::default();
        let targets = self.surface.frame_targets()?;

        self.commands.begin_frame()?;
        {
            let mut recorder = self.commands.recorder();
            recorder.resource_barrier(
                targets.back_buffer,
                ResourceState::Present,
                ResourceState::RenderTarget,
            );
            recorder.set_viewport(&targets.viewport);
            recorder.set_scissor(&targets.scissor);
            recorder.clear_render_target(targets.render_target, color);
            recorder.clear_depth_stencil(targets.depth_stencil, depth.depth, depth.stencil);

            self.callbacks.draw(&mut recorder, time);

            recorder.resource_barrier(
                targets.back_buffer,
                ResourceState::RenderTarget,
                ResourceState::Present,
            );
        }
        self.commands.close()?;
        self.commands.submit()?;

        self.surface.present(&self.commands)?;
        self.commands.drain_queue()?;
        self.frames_rendered += 1;
        Ok(())
    }
}

impl<A: Api, C: FrameCallbacks<A>, K: Clock> Drop for FrameDriver<A, C, K> {
    fn drop(&mut self) {
        if !self.shut_down {
            if let Err(e) = self.commands.drain_queue() {
                error!("Failed to drain the queue during drop: {}", e);
            }
        }
    }
}

//! flipchain - windowed frame loop on the Vulkan backend.
//!
//! Clears the back buffer every frame, reports frame statistics in the
//! window title and exits with a status derived from the failure kind.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use flipchain_core::{Config, LogSink, TracingSink};
use flipchain_platform::{EventTranslator, PlatformEvent, Window};
use flipchain_renderer::{Flow, FrameCallbacks, FrameDriver, FrameStats};
use flipchain_rhi::backend::vulkan::{Vulkan, VulkanInstance};
use flipchain_rhi::{
    ContextDesc, DeviceContext, DiagnosticFilter, DiagnosticQueue, RhiError, WindowTarget,
};

/// Pushes the frame statistics into the window title.
struct TitleCallbacks {
    window: Window,
}

impl FrameCallbacks<Vulkan> for TitleCallbacks {
    fn title_changed(&mut self, title: &str, _stats: &FrameStats) {
        self.window.set_title(title);
    }
}

struct App {
    config: Config,
    sink: Arc<dyn LogSink>,
    // Dropped before the window it presents to.
    driver: Option<FrameDriver<Vulkan, TitleCallbacks>>,
    window: Option<Window>,
    translator: EventTranslator,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            sink: Arc::new(TracingSink),
            driver: None,
            window: None,
            translator: EventTranslator::new(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            self.config.width,
            self.config.height,
            &self.config.title,
        )?;
        let target = window.target()?;
        let WindowTarget::Window { display, .. } = target else {
            return Err(anyhow!("window produced no native handles"));
        };

        let instance = VulkanInstance::new(display, self.config.enable_validation)?;
        let desc = ContextDesc {
            enable_validation: instance.has_validation(),
            diagnostics: DiagnosticQueue::with_filter(
                DiagnosticFilter::default(),
                self.config.warnings_as_errors,
            ),
        };
        let context = DeviceContext::<Vulkan>::select_and_create(instance, desc, &*self.sink)?;

        let driver = FrameDriver::new(
            context,
            &target,
            &self.config,
            TitleCallbacks {
                window: window.clone(),
            },
            self.sink.clone(),
        )?;

        info!("Initialization complete, entering main loop");
        self.driver = Some(driver);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RhiError) {
        error!("Fatal error: {}", err);
        self.failure = Some(err.into());
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("Failed to initialize: {:#}", e);
            self.failure = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        let Some(event) = self
            .translator
            .translate(&event, |width, height| window.size_mode(width, height))
        else {
            return;
        };
        if let PlatformEvent::Size { width, height, .. } = event {
            window.resize(width, height);
        }

        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        match driver.handle_event(event) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => {
                info!("Quit requested, shutting down");
                event_loop.exit();
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(driver) = self.driver.as_mut()
            && let Err(e) = driver.run_iteration()
        {
            self.fail(event_loop, e);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut driver) = self.driver.take()
            && let Err(e) = driver.shutdown()
        {
            error!("Failed to drain the GPU queue on exit: {}", e);
            self.failure.get_or_insert(e.into());
        }
        self.window = None;
    }
}

fn run() -> Result<()> {
    let config = Config::from_env()?;
    config.validate()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    flipchain_core::init_logging();
    info!("Starting flipchain");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.downcast_ref::<RhiError>().map_or(1, RhiError::exit_code);
            error!("{:#}", err);
            eprintln!("flipchain: {:#}", err);
            ExitCode::from(code as u8)
        }
    }
}

//! Window management using winit.

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use flipchain_core::{Error, Result};
use flipchain_rhi::WindowTarget;

use crate::event::{SizeMode, size_mode};

/// A window wrapper that tracks the client size and hands out the raw
/// handles a swap chain presents to.
#[derive(Clone)]
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
}

impl Window {
    /// Create a new window with the given dimensions and title.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
            width,
            height,
        })
    }

    /// Get a reference to the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Get the current width of the window.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the current height of the window.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Update the stored dimensions (call this when handling resize events).
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    /// Size mode of the window for a client size of `width` x `height`.
    pub fn size_mode(&self, width: u32, height: u32) -> SizeMode {
        size_mode(
            width,
            height,
            self.window.is_minimized(),
            self.window.is_maximized(),
        )
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Raw handles for swap-chain creation.
    ///
    /// # Errors
    /// Returns an error if the platform cannot provide either handle.
    pub fn target(&self) -> Result<WindowTarget> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        Ok(WindowTarget::Window {
            display: display.as_raw(),
            window: window.as_raw(),
        })
    }
}

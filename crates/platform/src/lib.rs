//! Platform layer for the flipchain frame presenter.
//!
//! This crate provides:
//! - Window management via winit
//! - Translation of winit events into opaque [`PlatformEvent`]s
//! - Raw window handles for swap-chain creation

mod event;
mod window;

pub use event::{
    EventTranslator, KeyCode, PlatformEvent, PointerButton, PointerButtons, SizeMode, size_mode,
};
pub use window::Window;

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;

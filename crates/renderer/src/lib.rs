//! Frame presentation on top of `flipchain_rhi`.
//!
//! This crate provides:
//! - The depth buffer and the [`PresentationSurface`] (swap chain, back
//!   buffers, views)
//! - The pause/resize decision table ([`RenderLoopState`])
//! - Frame statistics for the window title
//! - The [`FrameDriver`] render loop

pub mod depth_buffer;
pub mod frame_driver;
pub mod frame_stats;
pub mod loop_state;
pub mod surface;

pub use depth_buffer::{DEFAULT_DEPTH_FORMAT, DepthBuffer};
pub use frame_driver::{EventSource, Flow, FrameCallbacks, FrameDriver, FrameTime, NoCallbacks};
pub use frame_stats::{FrameCounter, FrameStats};
pub use loop_state::{Reaction, RenderLoopState, TimerCommand};
pub use surface::{DEFAULT_BACK_BUFFER_FORMAT, FrameTargets, PresentationSurface, SurfaceConfig};

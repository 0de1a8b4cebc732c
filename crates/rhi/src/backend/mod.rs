//! Backend implementations of the [`Api`](crate::api::Api) trait family.

pub mod headless;

#[cfg(feature = "vulkan")]
pub mod vulkan;

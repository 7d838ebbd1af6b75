//! Vulkan abstraction layer (Render Hardware Interface) for the compositor.
//!
//! Thin, safe wrappers over `ash`: instance and device setup, swapchain,
//! command recording, host-visible buffers, sampled plane textures and a
//! dynamic-rendering graphics pipeline.
//!
//! # Modules
//!
//! - [`instance`], [`physical_device`], [`device`]: setup and GPU selection
//! - [`swapchain`]: presentable images
//! - [`command`], [`sync`]: recording and submission
//! - [`buffer`], [`texture`], [`sampler`], [`descriptor`]: shader resources
//! - [`shader`], [`pipeline`], [`rendering`], [`vertex`]: the graphics pipeline
//!
//! Every object holds an `Arc<Device>` and destroys its Vulkan handle on drop.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;

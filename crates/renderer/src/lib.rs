//! AR frame compositing.
//!
//! Each display refresh runs one cycle: take the latest camera frame, turn its
//! planes and the person-segmentation matte into textures, and blend the
//! camera image with the rendered scene into the drawable. At most a fixed
//! number of cycles are in flight on the GPU at once.
//!
//! - [`transform`]: sensor/viewport coordinate mapping
//! - [`converter`]: camera planes and matte to textures
//! - [`geometry`]: the composite quads
//! - [`scheduler`] and [`completion`]: in-flight slot accounting
//! - [`pipeline`]: the per-refresh cycle
//! - [`vulkan`]: the GPU backend

pub mod completion;
pub mod compositor;
pub mod converter;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod region;
pub mod scheduler;
pub mod transform;
pub mod vulkan;

pub use compositor::{CompositeInputs, CompositorBackend, PassOutcome};
pub use error::{CompositorError, CompositorResult};
pub use frame::{CameraFrame, MatteGenerator, PlaneKind, SessionSource};
pub use pipeline::{CompositorPipeline, CycleOutcome, CycleStats, SkipReason};
pub use scheduler::{FrameTicket, InFlightScheduler};
pub use transform::{CoordinateTransform, Orientation, PixelRect, ViewportDescriptor};
pub use vulkan::VulkanBackend;

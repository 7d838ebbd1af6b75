//! Windowing and input for the compositor demo.
//!
//! - Window creation via winit
//! - Vulkan surface creation via ash-window
//! - Keyboard state and mouse drag tracking

mod input;
mod window;

pub use input::{Drag, InputState, KeyCode, MouseButton};
pub use window::{Surface, Window, required_surface_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;

//! Core utilities shared by the compositor crates.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - YAML configuration
//! - Frame clock

pub mod config;

mod clock;
mod error;
mod logging;

pub use clock::FrameClock;
pub use config::{Config, MatteResolution};
pub use error::{Error, Result};
pub use logging::init_logging;

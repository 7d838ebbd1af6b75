//! Error types shared by the compositor crates.

use thiserror::Error;

/// Errors shared by the compositor crates.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is out of range.
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The window or its handles could not be obtained.
    #[error("Window error: {0}")]
    Window(String),

    /// Surface creation or extension discovery failed.
    #[error("Vulkan error: {0}")]
    Vulkan(String),
}

/// Result type using the shared [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

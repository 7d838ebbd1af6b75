//! Errors raised by the compositing pipeline.

use compositor_rhi::RhiError;
use thiserror::Error;

/// Errors that can occur while compositing.
#[derive(Error, Debug)]
pub enum CompositorError {
    /// A Vulkan layer call failed.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Configuration or platform support failed.
    #[error(transparent)]
    Core(#[from] compositor_core::Error),

    /// A transform could not be built or inverted.
    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    /// The pipeline refused to start.
    #[error("Initialization failed: {0}")]
    Init(String),

    /// The backend was driven out of order or lost a resource.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The pipeline or completion worker has been shut down.
    #[error("Pipeline is shut down")]
    Shutdown,
}

/// Result type for the compositing pipeline.
pub type CompositorResult<T> = std::result::Result<T, CompositorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use compositor_rhi::vk;

    #[test]
    fn test_rhi_error_is_transparent() {
        let err = CompositorError::from(RhiError::from(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(err, CompositorError::Rhi(_)));
        assert_eq!(
            err.to_string(),
            RhiError::from(vk::Result::ERROR_DEVICE_LOST).to_string()
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            CompositorError::InvalidTransform("zero image width".into()).to_string(),
            "Invalid transform: zero image width"
        );
        assert_eq!(CompositorError::Shutdown.to_string(), "Pipeline is shut down");
    }
}

//! Errors raised by the Vulkan layer.

use thiserror::Error;

/// Errors that can occur in the Vulkan layer.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A Vulkan API call returned an error code.
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// The Vulkan loader library could not be loaded.
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// gpu-allocator failed to allocate or free memory.
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No GPU supports the required queues, extensions and formats.
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// SPIR-V could not be read or a shader module could not be created.
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// The surface cannot back a swapchain.
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A texture could not be created or filled from the given plane.
    #[error("Texture error: {0}")]
    TextureError(String),

    /// An object was used after its handle became invalid.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A pipeline was built with missing or inconsistent state.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type for Vulkan layer operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

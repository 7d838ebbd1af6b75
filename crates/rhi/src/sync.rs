//! Semaphores and fences.
//!
//! This module provides wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations
//! - [`Fence`] - GPU-to-CPU signaling for host waits
//!
//! # Overview
//!
//! Semaphores order queue operations (acquire -> composite -> present). A
//! fence is what the host waits on: the completion worker blocks on a slot's
//! fence and only then hands the slot back to the scheduler.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use compositor_rhi::device::Device;
//! use compositor_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), compositor_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device, true)?;
//!
//! // A slot is free once its previous submission has finished.
//! in_flight.wait(Duration::from_secs(5))?;
//! in_flight.reset()?;
//! # let _ = image_available;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::trace;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// GPU-to-GPU synchronization between queue operations.
///
/// Each slot owns an image-available semaphore; each swapchain image owns a
/// render-finished semaphore so presentation never waits on a semaphore that
/// a later submission re-signals.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        trace!("Created semaphore");
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// GPU-to-CPU synchronization.
///
/// Waiting is safe from any thread. Resetting requires that no pending
/// submission still references the fence.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Start in the signaled state, so the first wait returns at once
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        trace!(signaled, "Created fence");
        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence signals or `timeout` elapses.
    ///
    /// `Duration::MAX` waits indefinitely.
    ///
    /// # Errors
    ///
    /// A timeout surfaces as `RhiError::VulkanError(vk::Result::TIMEOUT)`; a lost
    /// device as `ERROR_DEVICE_LOST`.
    pub fn wait(&self, timeout: Duration) -> Result<(), RhiError> {
        let fences = [self.fence];
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_ns)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// No pending submission may still reference the fence.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }
}

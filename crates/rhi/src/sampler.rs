//! Texture samplers.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// Bilinear, clamp-to-edge, no mipmaps.
///
/// Camera planes, the scene color and the matte all have different
/// resolutions; one linear sampler lets the fragment shader read them with
/// the same normalized coordinates.
pub struct Sampler {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan sampler handle.
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates the linear clamp-to-edge sampler.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn linear_clamp(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = linear_clamp_info();
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        Ok(Self { device, sampler })
    }

    /// Returns the Vulkan sampler handle.
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}

fn linear_clamp_info() -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .max_lod(0.0)
        .unnormalized_coordinates(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_clamp_info() {
        let info = linear_clamp_info();
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.unnormalized_coordinates, vk::FALSE);
    }
}

//! Descriptor set management for binding textures to the composite shader.
//!
//! This module provides:
//! - [`DescriptorSetLayout`] describes the shader's binding points
//! - [`DescriptorPool`] allocates descriptor sets
//! - Helpers for building bindings and writing image descriptors
//!
//! # Overview
//!
//! The composite pass binds four combined image samplers per in-flight slot
//! (luma, chroma, scene color, alpha). Each slot owns one descriptor set, so
//! the pool is sized for exactly one set per slot and a set is only rewritten
//! after the slot's fence has signaled.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use compositor_rhi::device::Device;
//! use compositor_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, combined_image_sampler};
//!
//! # fn example(device: Arc<Device>) -> Result<(), compositor_rhi::RhiError> {
//! let bindings = [
//!     combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT),
//!     combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
//! ];
//! let layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
//!
//! let pool_size = vk::DescriptorPoolSize::default()
//!     .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
//!     .descriptor_count(2 * 3);
//! let pool = DescriptorPool::new(device, 3, &[pool_size])?;
//!
//! let sets = pool.allocate(&[layout.handle(); 3])?;
//! assert_eq!(sets.len(), 3);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
///
/// Immutable after creation; destroyed on drop.
pub struct DescriptorSetLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor set layout handle.
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a descriptor set layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `bindings` - Binding descriptions, typically built with [`combined_image_sampler`]
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool wrapper.
///
/// Sets allocated from the pool are not freed individually; they are
/// released together when the pool is destroyed.
pub struct DescriptorPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor pool handle.
    pool: vk::DescriptorPool,
    /// Maximum number of sets this pool can hand out.
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a descriptor pool.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `max_sets` - Maximum number of descriptor sets that can be allocated
    /// * `pool_sizes` - Number of descriptors available per descriptor type
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates one descriptor set per entry in `layouts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted
    /// (`ERROR_OUT_OF_POOL_MEMORY`) or allocation fails otherwise.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Returns the Vulkan descriptor pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Writes descriptor updates.
///
/// The target sets must not be in use by pending GPU work, and every image
/// view referenced by `writes` must stay alive as long as the sets are used.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }
    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
}

/// Builds a descriptor image info for a sampled image.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// Layout binding for a single combined image sampler.
///
/// # Arguments
///
/// * `binding` - Binding number in the shader
/// * `stage_flags` - Shader stages that sample the texture
#[inline]
pub fn combined_image_sampler(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_image_sampler_binding() {
        let binding = combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 2);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_image_info_helper() {
        let info = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(info.sampler, vk::Sampler::null());
        assert_eq!(info.image_view, vk::ImageView::null());
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}

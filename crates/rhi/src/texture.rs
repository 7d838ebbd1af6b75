//! GPU images sampled by the composite pass.
//!
//! [`Image`] is a device-local optimal-tiling image with a view. A
//! [`PlaneTexture`] wraps one image plus the staging buffer that feeds it,
//! and is recreated only when the incoming plane changes size.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::rendering::layout_transition;

/// Single mip, single layer, color aspect.
#[inline]
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Bytes per texel for the formats the compositor uses.
///
/// Returns `None` for any other format.
pub fn bytes_per_texel(format: vk::Format) -> Option<usize> {
    match format {
        vk::Format::R8_UNORM => Some(1),
        vk::Format::R8G8_UNORM => Some(2),
        vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM => Some(4),
        _ => None,
    }
}

/// Device-local, optimal-tiling 2D image with a view.
///
/// Tracks the layout it was last transitioned to, so callers record
/// transitions by target layout only. Destroyed on drop; the GPU must be done
/// with it by then.
pub struct Image {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// Full-image 2D view.
    view: vk::ImageView,
    /// Device-local memory; `None` only while dropping.
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    /// Layout at the end of the most recently recorded use.
    layout: vk::ImageLayout,
}

impl Image {
    /// Creates an image, binds device-local memory and creates its view.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device and its allocator
    /// * `format` - Texel format
    /// * `extent` - Size in texels; both dimensions must be non-zero
    /// * `usage` - How the image is used, e.g. `SAMPLED | TRANSFER_DST`
    /// * `name` - Debug name for logs and the allocation
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::TextureError`] for an empty extent, or the Vulkan or
    /// allocator error if creation, allocation or binding fails.
    pub fn new(
        device: Arc<Device>,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::TextureError(format!(
                "{} dimensions must be greater than 0, got {}x{}",
                name, extent.width, extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        let mut created = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            format,
            extent,
            layout: vk::ImageLayout::UNDEFINED,
        };

        if let Some(allocation) = created.allocation.as_ref() {
            unsafe {
                created.device.handle().bind_image_memory(
                    image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_subresource_range());
        created.view = unsafe { created.device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created {} image: {}x{} ({:?})",
            name, extent.width, extent.height, format
        );

        Ok(created)
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Layout at the end of the most recently recorded use.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Records a transition to `new_layout` and remembers it.
    pub fn transition(&mut self, cmd: &CommandBuffer, new_layout: vk::ImageLayout) {
        if self.layout == new_layout {
            return;
        }
        cmd.image_barriers(&[layout_transition(self.image, self.layout, new_layout)]);
        self.layout = new_layout;
    }

    /// Forgets the tracked layout after recorded commands were thrown away
    /// unsubmitted. The next transition starts from `UNDEFINED`.
    pub fn discard_contents(&mut self) {
        self.layout = vk::ImageLayout::UNDEFINED;
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
        }
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().lock().free(allocation)
        {
            error!("Failed to free image allocation: {:?}", e);
        }
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
    }
}

/// A strided CPU plane to copy into a [`PlaneTexture`].
#[derive(Clone, Copy, Debug)]
pub struct PlaneUpload<'a> {
    /// Width in texels.
    pub width: u32,
    /// Height in rows.
    pub height: u32,
    /// Row stride of `data`, at least `width * bytes_per_texel`.
    pub bytes_per_row: usize,
    pub data: &'a [u8],
}

/// A sampled texture refreshed from CPU memory each cycle.
///
/// Wraps one [`Image`] plus the staging buffer that feeds it. The image is
/// recreated only when the incoming plane changes size.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ash::vk;
/// use compositor_rhi::command::CommandBuffer;
/// use compositor_rhi::device::Device;
/// use compositor_rhi::texture::{PlaneTexture, PlaneUpload};
///
/// # fn example(device: Arc<Device>, cmd: &CommandBuffer, luma: &[u8]) -> Result<(), compositor_rhi::RhiError> {
/// let mut texture = PlaneTexture::new(device, vk::Format::R8_UNORM, "luma")?;
/// texture.upload(cmd, PlaneUpload { width: 1920, height: 1440, bytes_per_row: 1920, data: luma })?;
/// let view = texture.view();
/// # let _ = view;
/// # Ok(())
/// # }
/// ```
pub struct PlaneTexture {
    device: Arc<Device>,
    format: vk::Format,
    /// Debug name, also used for allocations.
    name: &'static str,
    /// Created on the first upload and on every size change.
    image: Option<Image>,
    /// Grows to the largest plane seen; never shrinks.
    staging: Option<Buffer>,
}

impl PlaneTexture {
    /// Creates an empty texture. No GPU memory is allocated until the first upload.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::TextureError`] if `format` has no known texel size.
    pub fn new(device: Arc<Device>, format: vk::Format, name: &'static str) -> RhiResult<Self> {
        if bytes_per_texel(format).is_none() {
            return Err(RhiError::TextureError(format!(
                "Unsupported plane format {:?}",
                format
            )));
        }
        Ok(Self {
            device,
            format,
            name,
            image: None,
            staging: None,
        })
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// View of the last uploaded contents, if any.
    pub fn view(&self) -> Option<vk::ImageView> {
        self.image.as_ref().map(Image::view)
    }

    /// Size of the last uploaded contents, if any.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.image.as_ref().map(Image::extent)
    }

    /// See [`Image::discard_contents`].
    pub fn discard_contents(&mut self) {
        if let Some(image) = self.image.as_mut() {
            image.discard_contents();
        }
    }

    /// Records a copy of `plane` into the texture, leaving it in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// Returns true when the image was (re)created. The previous view is then
    /// destroyed, and any descriptor pointing at it must be rewritten even if the
    /// new view has the same handle value. The caller must guarantee the GPU is
    /// no longer reading the previous contents.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::TextureError`] for an empty plane, a buffer error if
    /// `data` is shorter than its rows claim, or an allocation error.
    pub fn upload(&mut self, cmd: &CommandBuffer, plane: PlaneUpload<'_>) -> RhiResult<bool> {
        let texel = bytes_per_texel(self.format).unwrap_or(1);
        let row_len = plane.width as usize * texel;
        let size = (row_len * plane.height as usize) as vk::DeviceSize;
        if size == 0 {
            return Err(RhiError::TextureError(format!(
                "{} plane is empty ({}x{})",
                self.name, plane.width, plane.height
            )));
        }

        let extent = vk::Extent2D {
            width: plane.width,
            height: plane.height,
        };
        let recreated = self.image.as_ref().map(Image::extent) != Some(extent);
        if recreated {
            self.image = Some(Image::new(
                self.device.clone(),
                self.format,
                extent,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                self.name,
            )?);
        }
        if self.staging.as_ref().is_none_or(|b| b.size() < size) {
            self.staging = Some(Buffer::new(
                self.device.clone(),
                BufferUsage::Staging,
                size,
            )?);
        }

        let (Some(image), Some(staging)) = (self.image.as_mut(), self.staging.as_ref()) else {
            return Err(RhiError::TextureError(format!(
                "{} texture storage missing after allocation",
                self.name
            )));
        };

        staging.write_rows(
            0,
            plane.data,
            plane.bytes_per_row,
            row_len,
            plane.height as usize,
        )?;

        image.transition(cmd, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: plane.width,
                height: plane.height,
                depth: 1,
            });
        cmd.copy_buffer_to_image(
            staging.handle(),
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        image.transition(cmd, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        Ok(recreated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_texel() {
        assert_eq!(bytes_per_texel(vk::Format::R8_UNORM), Some(1));
        assert_eq!(bytes_per_texel(vk::Format::R8G8_UNORM), Some(2));
        assert_eq!(bytes_per_texel(vk::Format::B8G8R8A8_UNORM), Some(4));
        assert_eq!(bytes_per_texel(vk::Format::D32_SFLOAT), None);
    }

    #[test]
    fn test_color_subresource_range() {
        let range = color_subresource_range();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
    }
}

//! Swapchain creation, image acquisition and presentation.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;

/// What the surface supports for swapchain creation.
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image counts, extents, transforms).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the surface queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Whether at least one format and one present mode are available.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Presentable images for the window surface.
///
/// Not thread-safe; the compositor drives it from the single producer path.
pub struct Swapchain {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Swapchain extension loader.
    swapchain_loader: ash::khr::swapchain::Device,
    /// Vulkan swapchain handle.
    swapchain: vk::SwapchainKHR,
    /// Images owned by the swapchain.
    images: Vec<vk::Image>,
    /// One view per swapchain image.
    image_views: Vec<vk::ImageView>,
    /// Color format of the swapchain images.
    format: vk::Format,
    /// Current image size in pixels.
    extent: vk::Extent2D,
    /// Selected presentation mode.
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// With `vsync` the swapchain uses FIFO so each acquire is paced by the
    /// display refresh; otherwise the lowest-latency available mode is used.
    ///
    /// # Arguments
    ///
    /// * `instance` - Instance the surface was created from
    /// * `device` - The logical device
    /// * `surface` - Window surface to present to
    /// * `width`, `height` - Desired size, clamped to the surface limits
    /// * `vsync` - Pace presentation to the display refresh
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is inadequate or swapchain creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self, RhiError> {
        Self::create_internal(
            instance,
            device,
            surface,
            (width, height),
            vsync,
            vk::SwapchainKHR::null(),
        )
    }

    fn create_internal(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        (width, height): (u32, u32),
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self, RhiError> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, vsync);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        let queue_families = device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::SwapchainError(
                "Device has no graphics or present queue".to_string(),
            ));
        };
        let family_indices = [graphics_family, present_family];
        let (sharing_mode, family_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        let image_views = create_image_views(&device, &images, surface_format.format)?;

        info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            images.len()
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Rebuilds the swapchain for a new surface size.
    ///
    /// Waits for the device to go idle first, so no in-flight command buffer
    /// still references the old images.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting for idle or swapchain creation fails.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<(), RhiError> {
        self.device.wait_idle()?;
        self.destroy_image_views();

        let old_swapchain = self.swapchain;
        let vsync = self.present_mode == vk::PresentModeKHR::FIFO;
        let mut fresh = Self::create_internal(
            instance,
            self.device.clone(),
            surface,
            (width, height),
            vsync,
            old_swapchain,
        )?;

        unsafe {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }

        self.swapchain = fresh.swapchain;
        self.images = std::mem::take(&mut fresh.images);
        self.image_views = std::mem::take(&mut fresh.image_views);
        self.format = fresh.format;
        self.extent = fresh.extent;
        self.present_mode = fresh.present_mode;
        // `fresh` now drops with no views and a null handle.
        fresh.swapchain = vk::SwapchainKHR::null();

        Ok(())
    }

    /// Acquires the next presentable image.
    ///
    /// Returns `(image_index, suboptimal)`.
    ///
    /// # Errors
    ///
    /// `ERROR_OUT_OF_DATE_KHR` means the caller must recreate the swapchain.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// Returns true if the swapchain is suboptimal.
    ///
    /// # Errors
    ///
    /// `ERROR_OUT_OF_DATE_KHR` means the caller must recreate the swapchain.
    pub fn present(&self, image_index: u32, wait_semaphore: vk::Semaphore) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        self.device.with_present_queue(|queue| unsafe {
            self.swapchain_loader.queue_present(queue, &present_info)
        })
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain image size.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the swapchain image at `index`.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the view of the swapchain image at `index`.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{})",
                self.extent.width, self.extent.height
            );
        }
    }
}

/// Prefers an 8-bit UNORM format: the composite pass writes display-encoded
/// values straight from the camera's YCbCr data.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];
    for wanted in preferred {
        if let Some(&format) = formats.iter().find(|f| {
            f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            debug!("Selected surface format {:?}", wanted);
            return format;
        }
    }

    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync {
        for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if present_modes.contains(&mode) {
                return mode;
            }
        }
    }
    // Always supported.
    vk::PresentModeKHR::FIFO
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    images
        .iter()
        .enumerate()
        .map(|(i, &image)| {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(crate::texture::color_subresource_range());

            unsafe { device.handle().create_image_view(&create_info, None) }.map_err(|e| {
                RhiError::SwapchainError(format!("Failed to create image view {}: {:?}", i, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_unorm() {
        let formats = vec![
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = vec![surface_format(vk::Format::A2B10G10R10_UNORM_PACK32)];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::A2B10G10R10_UNORM_PACK32
        );
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&modes, false),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent() {
        let fixed = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1170,
                height: 2532,
            },
            ..Default::default()
        };
        let extent = choose_extent(&fixed, 800, 600);
        assert_eq!((extent.width, extent.height), (1170, 2532));

        let free = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };
        let extent = choose_extent(&free, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 3);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            formats: vec![],
            ..adequate
        };
        assert!(!no_formats.is_adequate());
    }
}

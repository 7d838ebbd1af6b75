//! GPU selection.
//!
//! A device qualifies when it exposes Vulkan 1.3, the swapchain extension, a
//! graphics queue, a queue that can present to the target surface, and
//! filterable sampled images in every plane format the compositor uploads.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Formats sampled by the composite pass: luma/matte and interleaved chroma.
pub const SAMPLED_PLANE_FORMATS: [vk::Format; 2] = [vk::Format::R8_UNORM, vk::Format::R8G8_UNORM];

/// Queue family indices required by the compositor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics commands.
    pub graphics_family: Option<u32>,
    /// Family able to present to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Whether both a graphics and a present family were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// A candidate GPU and the properties used to rate it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, type, limits).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue families found on this device.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the driver-reported device name.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the supported Vulkan version as `(major, minor, patch)`.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Total size of device-local heaps in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Picks the highest rated GPU that can drive the compositor on `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(info.properties.device_type, info.device_local_memory());
            debug!(
                "GPU '{}' ({}) qualifies, score {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .max_by_key(|(_, score)| *score)
        .map(|(info, _)| info)
        .ok_or(RhiError::NoSuitableGpu)?;

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();

    if !supports_api_1_3(properties.api_version) {
        debug!("GPU '{}' skipped: Vulkan 1.3 not supported", name);
        return None;
    }

    let extensions =
        unsafe { instance.enumerate_device_extension_properties(device) }.unwrap_or_default();
    if !has_extension(&extensions, ash::khr::swapchain::NAME) {
        debug!("GPU '{}' skipped: no swapchain extension", name);
        return None;
    }

    for format in SAMPLED_PLANE_FORMATS {
        let props = unsafe { instance.get_physical_device_format_properties(device, format) };
        let required = vk::FormatFeatureFlags::SAMPLED_IMAGE
            | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
            | vk::FormatFeatureFlags::TRANSFER_DST;
        if !props.optimal_tiling_features.contains(required) {
            debug!("GPU '{}' skipped: {:?} cannot be sampled linearly", name, format);
            return None;
        }
    }

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={})",
            name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

/// Prefers a single family that does both graphics and present.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        };

        if graphics && present {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

/// Whether `name` is among the extensions a device reports.
fn has_extension(extensions: &[vk::ExtensionProperties], name: &CStr) -> bool {
    extensions.iter().any(|ext| {
        // Vulkan guarantees a NUL-terminated name within the array.
        let ext_name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        ext_name == name
    })
}

fn supports_api_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

fn rate_device(device_type: vk::PhysicalDeviceType, device_local_memory: u64) -> u64 {
    let type_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 100_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 10_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1_000,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    // Capped at 16 GiB so memory never outweighs the device type.
    let vram_mb = (device_local_memory / (1024 * 1024)).min(16_000);
    type_score + vram_mb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_indices_complete() {
        assert!(!QueueFamilyIndices::default().is_complete());
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_complete());
        let partial = QueueFamilyIndices {
            graphics_family: None,
            present_family: Some(1),
        };
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_unique_families() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(1),
        };
        assert_eq!(split.unique_families(), vec![2, 1]);
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, &src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as std::ffi::c_char;
        }
        props
    }

    #[test]
    fn test_has_extension() {
        let extensions = [
            extension(c"VK_KHR_maintenance1"),
            extension(ash::khr::swapchain::NAME),
        ];
        assert!(has_extension(&extensions, ash::khr::swapchain::NAME));
        assert!(!has_extension(&extensions, c"VK_KHR_swapchain_mutable_format"));
        assert!(!has_extension(&[], ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_supports_api_1_3() {
        assert!(supports_api_1_3(vk::API_VERSION_1_3));
        assert!(supports_api_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!supports_api_1_3(vk::API_VERSION_1_2));
        assert!(!supports_api_1_3(vk::API_VERSION_1_0));
    }

    #[test]
    fn test_rate_device_prefers_discrete() {
        let discrete = rate_device(vk::PhysicalDeviceType::DISCRETE_GPU, 0);
        let integrated = rate_device(vk::PhysicalDeviceType::INTEGRATED_GPU, 64 << 30);
        assert!(discrete > integrated);
        assert!(
            rate_device(vk::PhysicalDeviceType::CPU, 0)
                < rate_device(vk::PhysicalDeviceType::VIRTUAL_GPU, 0)
        );
    }

    #[test]
    fn test_device_type_name() {
        assert_eq!(
            device_type_name(vk::PhysicalDeviceType::DISCRETE_GPU),
            "Discrete GPU"
        );
        assert_eq!(device_type_name(vk::PhysicalDeviceType::OTHER), "Other");
    }
}

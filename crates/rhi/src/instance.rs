//! Vulkan instance creation with optional validation.
//!
//! Surface extensions come from the windowing layer (see
//! `compositor_platform::required_surface_extensions`) so the instance only
//! enables what the running display server needs.

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{error, info, warn};

use crate::error::RhiError;

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owns the Vulkan loader entry, the instance and the debug messenger.
pub struct Instance {
    /// Vulkan loader entry; must outlive the instance.
    entry: Entry,
    /// Vulkan instance.
    instance: ash::Instance,
    /// Debug utils loader, present when validation is enabled.
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Messenger routing validation output to `tracing`.
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a Vulkan 1.3 instance.
    ///
    /// # Arguments
    ///
    /// * `enable_validation` - Request the Khronos validation layer; silently
    ///   skipped (with a warning) when the layer is not installed
    /// * `surface_extensions` - Instance extensions required to create a surface
    ///   for the target window
    ///
    /// # Errors
    ///
    /// Returns an error if the loader cannot be found or instance creation fails.
    pub fn new(
        enable_validation: bool,
        surface_extensions: &[*const c_char],
    ) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"AR Compositor")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"compositor")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let extensions = instance_extensions(surface_extensions, validation_available);
        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created (API 1.3, {} extension(s), validation {})",
            extensions.len(),
            if validation_available { "on" } else { "off" }
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the ash instance.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan loader entry.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Whether the validation layer and debug messenger are active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name == VALIDATION_LAYER_NAME
        }))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Surface extensions plus debug utils, without duplicates.
fn instance_extensions(
    surface_extensions: &[*const c_char],
    with_debug_utils: bool,
) -> Vec<*const c_char> {
    let mut extensions: Vec<*const c_char> = Vec::with_capacity(surface_extensions.len() + 1);
    for &ext in surface_extensions {
        let name = unsafe { CStr::from_ptr(ext) };
        if !extensions
            .iter()
            .any(|&known| unsafe { CStr::from_ptr(known) } == name)
        {
            extensions.push(ext);
        }
    }
    if with_debug_utils {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    extensions
}

/// Forwards validation messages to `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if p_callback_data.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        let data = unsafe { &*p_callback_data };
        if data.p_message.is_null() {
            std::borrow::Cow::Borrowed("<no message>")
        } else {
            unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
        }
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        _ => "general",
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "compositor_rhi::vulkan", kind, "{}", message);
    } else {
        warn!(target: "compositor_rhi::vulkan", kind, "{}", message);
    }

    vk::FALSE
}

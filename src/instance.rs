use crate::debug::vulkan_debug_callback;
use crate::system_info::{DEBUG_UTILS_EXT_NAME, SystemInfo, VALIDATION_LAYER_NAME};
use crate::version::Version;
use ash::{ext, khr, vk};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::fmt::Debug;
use std::sync::Arc;

pub trait WindowTraits: HasDisplayHandle + HasWindowHandle + Debug {}
impl<T> WindowTraits for T where T: HasDisplayHandle + HasWindowHandle + Debug {}

#[derive(Debug)]
pub struct InstanceBuilder {
    // VkApplicationInfo
    app_name: String,
    engine_name: String,
    application_version: u32,
    engine_version: u32,
    minimum_instance_version: u32,
    required_instance_version: u32,

    // VkInstanceCreateInfo
    layers: Vec<CString>,
    extensions: Vec<CString>,
    flags: vk::InstanceCreateFlags,

    // debug callback
    debug_callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
    debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    debug_message_type: vk::DebugUtilsMessageTypeFlagsEXT,

    request_validation_layers: bool,
    enable_validation_layers: bool,
    use_debug_messenger: bool,
    headless_context: bool,

    window: Option<Arc<dyn WindowTraits>>,
}

impl InstanceBuilder {
    pub fn new(window: Option<Arc<dyn WindowTraits>>) -> Self {
        Self {
            app_name: "".to_string(),
            engine_name: "".to_string(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            minimum_instance_version: vk::API_VERSION_1_0,
            required_instance_version: vk::API_VERSION_1_0,
            layers: vec![],
            extensions: vec![],
            flags: Default::default(),
            debug_callback: None,
            debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            debug_message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            request_validation_layers: false,
            enable_validation_layers: false,
            use_debug_messenger: false,
            headless_context: false,
            window,
        }
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn engine_name(mut self, engine_name: impl Into<String>) -> Self {
        self.engine_name = engine_name.into();
        self
    }

    pub fn app_version(mut self, version: u32) -> Self {
        self.application_version = version;
        self
    }

    pub fn engine_version(mut self, version: u32) -> Self {
        self.engine_version = version;
        self
    }

    pub fn require_api_version(mut self, version: u32) -> Self {
        self.required_instance_version = version;
        self
    }

    pub fn minimum_instance_version(mut self, version: u32) -> Self {
        self.minimum_instance_version = version;
        self
    }

    pub fn enable_layer(mut self, layer: &CStr) -> Self {
        self.layers.push(layer.to_owned());
        self
    }

    pub fn enable_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push(extension.to_owned());
        self
    }

    pub fn create_flags(mut self, flags: vk::InstanceCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Fails the build if the validation layer is not installed.
    pub fn enable_validation_layers(mut self, enable: bool) -> Self {
        self.enable_validation_layers = enable;
        self
    }

    /// Enables the validation layer only if it is installed.
    pub fn request_validation_layers(mut self, request: bool) -> Self {
        self.request_validation_layers = request;
        self
    }

    pub fn use_default_debug_messenger(mut self) -> Self {
        self.use_debug_messenger = true;
        self.debug_callback = Some(vulkan_debug_callback);
        self
    }

    #[cfg(feature = "enable_tracing")]
    pub fn use_default_tracing_messenger(mut self) -> Self {
        self.use_debug_messenger = true;
        self.debug_callback = Some(crate::tracing::vulkan_tracing_callback);
        self
    }

    pub fn set_debug_messenger(
        mut self,
        callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
    ) -> Self {
        self.use_debug_messenger = true;
        self.debug_callback = callback;
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless_context = headless;
        self
    }

    pub fn debug_messenger_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.debug_message_severity = severity;
        self
    }

    pub fn add_debug_messenger_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.debug_message_severity |= severity;
        self
    }

    pub fn debug_messenger_type(mut self, message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        self.debug_message_type = message_type;
        self
    }

    pub fn add_debug_messenger_type(
        mut self,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    ) -> Self {
        self.debug_message_type |= message_type;
        self
    }

    /// The API version to request given what the loader supports.
    ///
    /// Without a minimum, the required version is a hard floor. With one, the
    /// request falls back to the loader version as long as the minimum holds.
    fn negotiate_api_version(&self, instance_version: u32) -> crate::Result<u32> {
        let loader = Version::new(instance_version);
        let minimum = Version::new(self.minimum_instance_version);
        let required = Version::new(self.required_instance_version);

        if loader < minimum || (minimum == Version::V1_0 && loader < required) {
            let wanted = minimum.max(required);
            return Err(crate::InstanceError::VulkanVersionUnavailable(wanted.to_string()).into());
        }

        if loader < Version::V1_1 {
            Ok(vk::API_VERSION_1_0)
        } else {
            Ok(self
                .required_instance_version
                .max(self.minimum_instance_version)
                .min(instance_version))
        }
    }

    #[cfg_attr(feature = "enable_tracing", tracing::instrument(skip(self)))]
    pub fn build(self) -> crate::Result<Arc<Instance>> {
        let system_info = SystemInfo::get_system_info()?;
        let instance_version = system_info.instance_api_version;
        let api_version = self.negotiate_api_version(instance_version)?;

        #[cfg(feature = "enable_tracing")]
        {
            tracing::info!("Instance version: {}", Version::new(instance_version));
            tracing::info!("api_version: {}", Version::new(api_version));
        }

        let headless = self.headless_context || self.window.is_none();

        let mut enabled_extensions: Vec<&CStr> =
            self.extensions.iter().map(CString::as_c_str).collect();

        let use_debug_messenger = self.use_debug_messenger
            && self.debug_callback.is_some()
            && system_info.debug_utils_available;
        if use_debug_messenger {
            enabled_extensions.push(DEBUG_UTILS_EXT_NAME);
        }

        let properties2_ext_enabled = api_version < vk::API_VERSION_1_1
            && system_info.is_extension_available(khr::get_physical_device_properties2::NAME);
        if properties2_ext_enabled {
            enabled_extensions.push(khr::get_physical_device_properties2::NAME);
        }

        #[cfg(feature = "portability")]
        if system_info.is_extension_available(khr::portability_enumeration::NAME) {
            enabled_extensions.push(khr::portability_enumeration::NAME);
        }

        let missing = system_info.missing_extensions(enabled_extensions.iter().copied());
        if !missing.is_empty() {
            return Err(crate::InstanceError::RequestedExtensionsNotPresent(missing).into());
        }

        let window = if headless { None } else { self.window.clone() };
        if let Some(window) = &window {
            let display_handle = window.display_handle()?.as_raw();
            let surface_extensions: Vec<&CStr> =
                ash_window::enumerate_required_extensions(display_handle)?
                    .iter()
                    .map(|ext| unsafe { CStr::from_ptr(*ext) })
                    .collect();

            let missing = system_info.missing_extensions(surface_extensions.iter().copied());
            if !missing.is_empty() {
                return Err(crate::InstanceError::WindowingExtensionsNotPresent(missing).into());
            }

            enabled_extensions.extend(surface_extensions);
        }

        #[cfg(feature = "enable_tracing")]
        tracing::trace!(?enabled_extensions);

        let mut enabled_layers: Vec<&CStr> = self.layers.iter().map(CString::as_c_str).collect();
        if self.enable_validation_layers
            || (self.request_validation_layers && system_info.validation_layers_available)
        {
            enabled_layers.push(VALIDATION_LAYER_NAME);
        }

        let missing = system_info.missing_layers(enabled_layers.iter().copied());
        if !missing.is_empty() {
            return Err(crate::InstanceError::RequestedLayersNotPresent(missing).into());
        }

        let app_name = CString::new(self.app_name.as_str()).map_err(anyhow::Error::from)?;
        let engine_name = CString::new(self.engine_name.as_str()).map_err(anyhow::Error::from)?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(self.application_version)
            .engine_name(&engine_name)
            .engine_version(self.engine_version)
            .api_version(api_version);

        let instance_create_flags = if cfg!(feature = "portability") {
            self.flags | vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            self.flags
        };

        let enabled_extension_ptr = enabled_extensions
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        let enabled_layers_ptr = enabled_layers
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        let mut messenger_create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(self.debug_message_severity)
            .message_type(self.debug_message_type)
            .pfn_user_callback(self.debug_callback);

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .flags(instance_create_flags)
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extension_ptr)
            .enabled_layer_names(&enabled_layers_ptr);

        // Chained so instance creation and destruction are also reported.
        if use_debug_messenger {
            instance_create_info = instance_create_info.push_next(&mut messenger_create_info);
        }

        let entry = system_info.entry.clone();
        let instance = unsafe { entry.create_instance(&instance_create_info, None) }
            .map_err(crate::InstanceError::FailedCreateInstance)?;

        #[cfg(feature = "enable_tracing")]
        tracing::info!("Created vkInstance");

        let mut debug_messenger = None;
        if use_debug_messenger {
            let debug_utils = ext::debug_utils::Instance::new(&entry, &instance);
            let messenger_create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(self.debug_message_severity)
                .message_type(self.debug_message_type)
                .pfn_user_callback(self.debug_callback);

            let messenger =
                match unsafe { debug_utils.create_debug_utils_messenger(&messenger_create_info, None) } {
                    Ok(messenger) => messenger,
                    Err(e) => {
                        unsafe { instance.destroy_instance(None) };
                        return Err(crate::InstanceError::FailedCreateDebugMessenger(e).into());
                    }
                };

            #[cfg(feature = "enable_tracing")]
            tracing::trace!(callback = ?self.debug_callback, "Using debug messenger");

            debug_messenger = Some((debug_utils, messenger));
        }

        let mut surface = None;
        let mut surface_instance = None;
        if let Some(window) = &window {
            let created = window
                .display_handle()
                .and_then(|display| Ok((display.as_raw(), window.window_handle()?.as_raw())))
                .map_err(crate::Error::from)
                .and_then(|(display, window)| {
                    unsafe { ash_window::create_surface(&entry, &instance, display, window, None) }
                        .map_err(|e| crate::InstanceError::FailedCreateSurface(e).into())
                });

            match created {
                Ok(created) => {
                    surface = Some(created);
                    surface_instance = Some(khr::surface::Instance::new(&entry, &instance));
                    #[cfg(feature = "enable_tracing")]
                    tracing::info!("Created vkSurfaceKHR");
                }
                Err(e) => {
                    unsafe {
                        if let Some((debug_utils, messenger)) = &debug_messenger {
                            debug_utils.destroy_debug_utils_messenger(*messenger, None);
                        }
                        instance.destroy_instance(None);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Arc::new(Instance {
            entry,
            instance,
            surface,
            surface_instance,
            instance_version,
            api_version,
            headless,
            properties2_ext_enabled,
            debug_messenger,
            _system_info: system_info,
        }))
    }
}

pub struct Instance {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface: Option<vk::SurfaceKHR>,
    pub(crate) surface_instance: Option<khr::surface::Instance>,
    pub(crate) instance_version: u32,
    pub api_version: u32,
    pub(crate) headless: bool,
    pub(crate) properties2_ext_enabled: bool,
    pub(crate) debug_messenger: Option<(ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    _system_info: SystemInfo,
}

impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("handle", &self.instance.handle())
            .field("surface", &self.surface)
            .field("instance_version", &Version::new(self.instance_version))
            .field("api_version", &Version::new(self.api_version))
            .field("headless", &self.headless)
            .field("properties2_ext_enabled", &self.properties2_ext_enabled)
            .finish_non_exhaustive()
    }
}

impl Instance {
    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface
    }

    pub fn surface_instance(&self) -> Option<&khr::surface::Instance> {
        self.surface_instance.as_ref()
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    /// Destroys the messenger, the surface and the instance, in that order.
    /// Every device created from this instance must be destroyed first.
    pub fn destroy(&self) {
        unsafe {
            if let Some((debug_utils, messenger)) = &self.debug_messenger {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            if let (Some(surface_instance), Some(surface)) = (&self.surface_instance, self.surface)
            {
                surface_instance.destroy_surface(surface, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

impl AsRef<ash::Instance> for Instance {
    fn as_ref(&self) -> &ash::Instance {
        &self.instance
    }
}

use ash::{Entry, ext, vk};
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::fmt::{Debug, Formatter};

pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";
pub const DEBUG_UTILS_EXT_NAME: &CStr = ext::debug_utils::NAME;

pub struct SystemInfo {
    pub available_layers: BTreeSet<String>,
    pub available_extensions: BTreeSet<String>,
    pub validation_layers_available: bool,
    pub debug_utils_available: bool,
    pub instance_api_version: u32,
    pub(crate) entry: Entry,
}

impl Debug for SystemInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemInfo")
            .field("available_layers", &self.available_layers)
            .field("available_extensions", &self.available_extensions)
            .field(
                "validation_layers_available",
                &self.validation_layers_available,
            )
            .field("debug_utils_available", &self.debug_utils_available)
            .field("instance_api_version", &self.instance_api_version)
            .finish()
    }
}

fn names_of<'a>(names: impl IntoIterator<Item = &'a CStr>) -> BTreeSet<String> {
    names
        .into_iter()
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Requested names that are not in `available`, in request order.
pub(crate) fn missing_names<'a>(
    available: &BTreeSet<String>,
    requested: impl IntoIterator<Item = &'a CStr>,
) -> Vec<String> {
    requested
        .into_iter()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !available.contains(name))
        .collect()
}

impl SystemInfo {
    #[cfg_attr(feature = "enable_tracing", tracing::instrument)]
    pub fn get_system_info() -> crate::Result<Self> {
        #[cfg(feature = "enable_tracing")]
        tracing::trace!("Loading entry...");
        let entry = unsafe { Entry::load() }?;
        #[cfg(feature = "enable_tracing")]
        tracing::trace!("Entry loaded.");

        let layers = unsafe { entry.enumerate_instance_layer_properties() }?;
        let available_layers =
            names_of(layers.iter().filter_map(|layer| layer.layer_name_as_c_str().ok()));

        let mut extensions = unsafe { entry.enumerate_instance_extension_properties(None) }?;
        for layer in &layers {
            let Ok(layer_name) = layer.layer_name_as_c_str() else {
                continue;
            };
            let layer_extensions =
                unsafe { entry.enumerate_instance_extension_properties(Some(layer_name)) }?;
            extensions.extend_from_slice(&layer_extensions);
        }
        let available_extensions =
            names_of(extensions.iter().filter_map(|ext| ext.extension_name_as_c_str().ok()));

        let validation_layers_available =
            available_layers.contains(VALIDATION_LAYER_NAME.to_string_lossy().as_ref());
        let debug_utils_available =
            available_extensions.contains(DEBUG_UTILS_EXT_NAME.to_string_lossy().as_ref());

        #[cfg(feature = "enable_tracing")]
        tracing::trace!(validation_layers_available, debug_utils_available);

        let instance_api_version =
            unsafe { entry.try_enumerate_instance_version() }?.unwrap_or(vk::API_VERSION_1_0);

        Ok(Self {
            available_layers,
            available_extensions,
            validation_layers_available,
            debug_utils_available,
            instance_api_version,
            entry,
        })
    }

    pub fn is_extension_available(&self, extension: &CStr) -> bool {
        self.available_extensions
            .contains(extension.to_string_lossy().as_ref())
    }

    pub fn missing_extensions<'a>(
        &self,
        extensions: impl IntoIterator<Item = &'a CStr>,
    ) -> Vec<String> {
        missing_names(&self.available_extensions, extensions)
    }

    pub fn is_layer_available(&self, layer: &CStr) -> bool {
        self.available_layers
            .contains(layer.to_string_lossy().as_ref())
    }

    pub fn missing_layers<'a>(&self, layers: impl IntoIterator<Item = &'a CStr>) -> Vec<String> {
        missing_names(&self.available_layers, layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_missing_names_in_request_order() {
        let available = names_of([c"VK_KHR_surface", c"VK_EXT_debug_utils"]);

        let missing = missing_names(
            &available,
            [c"VK_KHR_xlib_surface", c"VK_KHR_surface", c"VK_KHR_wayland_surface"],
        );

        assert_eq!(missing, vec!["VK_KHR_xlib_surface", "VK_KHR_wayland_surface"]);
    }

    #[test]
    fn nothing_requested_nothing_missing() {
        assert!(missing_names(&BTreeSet::new(), []).is_empty());
    }
}

//! Read-only capability queries against physical devices.

use crate::PhysicalDeviceError;
use crate::version::Version;
use ash::{khr, vk};
use std::collections::BTreeSet;

/// One hardware queue family. `index` is the family's position in the list the
/// driver reported and is never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyRecord {
    pub index: u32,
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Whether this family can present to the surface the query was made for.
    pub present_support: bool,
}

/// Point-in-time snapshot of what a surface supports on one device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub queue_families: Vec<QueueFamilyRecord>,
    pub extensions: BTreeSet<String>,
    /// Present only when the query was made against a surface.
    pub surface: Option<SurfaceSupport>,
}

impl DeviceCapabilities {
    pub fn api_version(&self) -> Version {
        Version::new(self.api_version)
    }

    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }
}

/// Where the selector gets its candidates and their capabilities from.
///
/// [`InstanceCapabilities`] reads them from a live instance; tests supply
/// synthetic values.
pub trait CapabilitySource {
    fn enumerate(&self) -> crate::Result<Vec<vk::PhysicalDevice>>;

    fn query(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: Option<vk::SurfaceKHR>,
    ) -> crate::Result<DeviceCapabilities>;
}

pub struct InstanceCapabilities<'a> {
    instance: &'a ash::Instance,
    surface_instance: Option<&'a khr::surface::Instance>,
}

impl<'a> InstanceCapabilities<'a> {
    pub fn new(
        instance: &'a ash::Instance,
        surface_instance: Option<&'a khr::surface::Instance>,
    ) -> Self {
        Self {
            instance,
            surface_instance,
        }
    }
}

impl CapabilitySource for InstanceCapabilities<'_> {
    fn enumerate(&self) -> crate::Result<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
            .map_err(|e| PhysicalDeviceError::FailedToEnumeratePhysicalDevices(e).into())
    }

    fn query(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: Option<vk::SurfaceKHR>,
    ) -> crate::Result<DeviceCapabilities> {
        let properties = unsafe { self.instance.get_physical_device_properties(physical_device) };
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| format!("{physical_device:?}"));

        let extensions = unsafe {
            self.instance
                .enumerate_device_extension_properties(physical_device)
        }
        .map_err(PhysicalDeviceError::QueryFailed)?
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .map(|ext| ext.to_string_lossy().into_owned())
        .collect();

        let families = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        let surface = match surface {
            Some(surface) => {
                let surface_instance = self
                    .surface_instance
                    .ok_or(PhysicalDeviceError::NoSurfaceProvided)?;
                Some((surface_instance, surface))
            }
            None => None,
        };

        let mut queue_families = Vec::with_capacity(families.len());
        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let present_support = match surface {
                Some((surface_instance, surface)) => unsafe {
                    surface_instance.get_physical_device_surface_support(
                        physical_device,
                        index,
                        surface,
                    )
                }
                .map_err(PhysicalDeviceError::QueryFailed)?,
                None => false,
            };

            queue_families.push(QueueFamilyRecord {
                index,
                flags: family.queue_flags,
                queue_count: family.queue_count,
                present_support,
            });
        }

        let surface = surface
            .map(|(surface_instance, surface)| {
                query_surface_support(surface_instance, physical_device, surface)
                    .map_err(PhysicalDeviceError::QueryFailed)
            })
            .transpose()?;

        #[cfg(feature = "enable_tracing")]
        tracing::trace!(
            name = %name,
            api_version = %Version::new(properties.api_version),
            queue_families = queue_families.len(),
            "Queried physical device"
        );

        Ok(DeviceCapabilities {
            name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            queue_families,
            extensions,
            surface,
        })
    }
}

pub fn query_surface_support(
    surface_instance: &khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SurfaceSupport, vk::Result> {
    let capabilities = unsafe {
        surface_instance.get_physical_device_surface_capabilities(physical_device, surface)
    }?;
    let formats =
        unsafe { surface_instance.get_physical_device_surface_formats(physical_device, surface) }?;
    let present_modes = unsafe {
        surface_instance.get_physical_device_surface_present_modes(physical_device, surface)
    }?;

    Ok(SurfaceSupport {
        capabilities,
        formats,
        present_modes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup_is_exact() {
        let caps = DeviceCapabilities {
            extensions: ["VK_KHR_swapchain".to_string()].into_iter().collect(),
            ..Default::default()
        };

        assert!(caps.supports_extension("VK_KHR_swapchain"));
        assert!(!caps.supports_extension("VK_KHR_swap"));
    }

    #[test]
    fn reports_api_version() {
        let caps = DeviceCapabilities {
            api_version: vk::make_api_version(0, 1, 2, 0),
            ..Default::default()
        };

        assert_eq!(caps.api_version().to_string(), "1.2.0");
    }
}

use crate::query::DeviceCapabilities;
use crate::queue::QueueRole;
use ash::{khr, vk};
use std::collections::BTreeSet;
use thiserror::Error;

/// What a device must offer to be selected. Immutable for one selection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirements {
    roles: BTreeSet<QueueRole>,
    extensions: BTreeSet<String>,
    surface: Option<vk::SurfaceKHR>,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            roles: BTreeSet::from([QueueRole::Graphics]),
            extensions: BTreeSet::new(),
            surface: None,
        }
    }
}

impl Requirements {
    /// Graphics submission only; no presentation target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires presentation to `surface`, which also implies `VK_KHR_swapchain`.
    pub fn presenting_to(mut self, surface: vk::SurfaceKHR) -> Self {
        self.surface = Some(surface);
        self.roles.insert(QueueRole::Present);
        self.extensions
            .insert(khr::swapchain::NAME.to_string_lossy().into_owned());
        self
    }

    pub fn require_role(mut self, role: QueueRole) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn require_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.insert(name.into());
        self
    }

    pub fn require_extensions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn roles(&self) -> &BTreeSet<QueueRole> {
        &self.roles
    }

    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface
    }
}

/// The first requirement a device failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unsuitable {
    #[error("missing device extensions: {0:?}")]
    MissingExtensions(Vec<String>),
    #[error("no queue family supports {0}")]
    MissingQueueRole(QueueRole),
    #[error("surface support was not queried")]
    SurfaceNotQueried,
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("surface reports no present modes")]
    NoPresentModes,
}

/// Checks, in order: extensions, queue roles, then surface formats and present
/// modes when a surface is required. Stops at the first failure.
pub fn evaluate(
    capabilities: &DeviceCapabilities,
    requirements: &Requirements,
) -> Result<(), Unsuitable> {
    let missing: Vec<String> = requirements
        .extensions
        .difference(&capabilities.extensions)
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(Unsuitable::MissingExtensions(missing));
    }

    for role in &requirements.roles {
        if !capabilities
            .queue_families
            .iter()
            .any(|family| role.is_satisfied_by(family))
        {
            return Err(Unsuitable::MissingQueueRole(*role));
        }
    }

    if requirements.surface.is_some() {
        let support = capabilities
            .surface
            .as_ref()
            .ok_or(Unsuitable::SurfaceNotQueried)?;
        if support.formats.is_empty() {
            return Err(Unsuitable::NoSurfaceFormats);
        }
        if support.present_modes.is_empty() {
            return Err(Unsuitable::NoPresentModes);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueueFamilyRecord, SurfaceSupport};
    use ash::vk::Handle;

    const SWAPCHAIN: &str = "VK_KHR_swapchain";

    fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(7)
    }

    fn presentable_device() -> DeviceCapabilities {
        DeviceCapabilities {
            name: "test".into(),
            queue_families: vec![QueueFamilyRecord {
                index: 0,
                flags: vk::QueueFlags::GRAPHICS,
                queue_count: 1,
                present_support: true,
            }],
            extensions: [SWAPCHAIN.to_string()].into_iter().collect(),
            surface: Some(SurfaceSupport {
                formats: vec![vk::SurfaceFormatKHR::default()],
                present_modes: vec![vk::PresentModeKHR::FIFO],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn presenting_to_adds_role_and_swapchain_extension() {
        let requirements = Requirements::new().presenting_to(surface());

        assert!(requirements.roles().contains(&QueueRole::Present));
        assert!(requirements.extensions().contains(SWAPCHAIN));
        assert_eq!(requirements.surface(), Some(surface()));
    }

    #[test]
    fn duplicate_extension_names_collapse() {
        let requirements = Requirements::new()
            .require_extension(SWAPCHAIN)
            .require_extensions([SWAPCHAIN, SWAPCHAIN]);

        assert_eq!(requirements.extensions().len(), 1);
    }

    #[test]
    fn accepts_complete_device() {
        let requirements = Requirements::new().presenting_to(surface());

        assert_eq!(evaluate(&presentable_device(), &requirements), Ok(()));
    }

    #[test]
    fn missing_extension_is_checked_first() {
        let mut device = presentable_device();
        device.extensions.clear();
        device.queue_families.clear();
        let requirements = Requirements::new()
            .presenting_to(surface())
            .require_extension("VK_KHR_ray_query");

        assert_eq!(
            evaluate(&device, &requirements),
            Err(Unsuitable::MissingExtensions(vec![
                "VK_KHR_ray_query".to_string(),
                SWAPCHAIN.to_string(),
            ]))
        );
    }

    #[test]
    fn missing_present_support() {
        let mut device = presentable_device();
        device.queue_families[0].present_support = false;
        let requirements = Requirements::new().presenting_to(surface());

        assert_eq!(
            evaluate(&device, &requirements),
            Err(Unsuitable::MissingQueueRole(QueueRole::Present))
        );
    }

    #[test]
    fn empty_surface_lists_fail() {
        let requirements = Requirements::new().presenting_to(surface());

        let mut no_formats = presentable_device();
        no_formats.surface.as_mut().unwrap().formats.clear();
        assert_eq!(
            evaluate(&no_formats, &requirements),
            Err(Unsuitable::NoSurfaceFormats)
        );

        let mut no_modes = presentable_device();
        no_modes.surface.as_mut().unwrap().present_modes.clear();
        assert_eq!(
            evaluate(&no_modes, &requirements),
            Err(Unsuitable::NoPresentModes)
        );

        let mut unqueried = presentable_device();
        unqueried.surface = None;
        assert_eq!(
            evaluate(&unqueried, &requirements),
            Err(Unsuitable::SurfaceNotQueried)
        );
    }

    #[test]
    fn headless_ignores_surface() {
        let mut device = presentable_device();
        device.surface = None;
        device.queue_families[0].present_support = false;

        assert_eq!(evaluate(&device, &Requirements::new()), Ok(()));
    }
}

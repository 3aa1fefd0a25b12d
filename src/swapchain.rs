use crate::query::{SurfaceSupport, query_surface_support};
use crate::queue::QueueAssignment;
use crate::{Device, Instance, SwapchainError};
use ash::prelude::VkResult;
use ash::{khr, vk};

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
enum Priority {
    Main,
    Fallback,
}

#[derive(Debug, Clone, Copy)]
struct Format {
    inner: vk::SurfaceFormatKHR,
    priority: Priority,
}

#[derive(Debug, Clone, Copy)]
struct PresentMode {
    inner: vk::PresentModeKHR,
    priority: Priority,
}

fn default_formats() -> Vec<Format> {
    vec![
        Format {
            inner: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            priority: Priority::Main,
        },
        Format {
            inner: vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            priority: Priority::Fallback,
        },
    ]
}

fn default_present_modes() -> Vec<PresentMode> {
    vec![
        PresentMode {
            inner: vk::PresentModeKHR::MAILBOX,
            priority: Priority::Main,
        },
        PresentMode {
            inner: vk::PresentModeKHR::FIFO,
            priority: Priority::Fallback,
        },
    ]
}

/// First desired format (main before fallback, then insertion order) that the
/// surface supports, otherwise the first supported format.
fn find_best_surface_format(
    available: &[vk::SurfaceFormatKHR],
    desired: &[Format],
) -> Option<vk::SurfaceFormatKHR> {
    let mut desired = desired.to_vec();
    desired.sort_by_key(|f| f.priority);

    desired
        .iter()
        .find(|desired| available.contains(&desired.inner))
        .map(|desired| desired.inner)
        .or_else(|| available.first().copied())
}

/// FIFO is the fallback because every conformant implementation supports it.
fn find_best_present_mode(
    available: &[vk::PresentModeKHR],
    desired: &[PresentMode],
) -> vk::PresentModeKHR {
    let mut desired = desired.to_vec();
    desired.sort_by_key(|m| m.priority);

    desired
        .iter()
        .find(|desired| available.contains(&desired.inner))
        .map(|desired| desired.inner)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `u32::MAX` in `current_extent` means the surface size follows the swapchain.
fn find_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: desired_extent
            .width
            .max(capabilities.min_image_extent.width)
            .min(capabilities.max_image_extent.width),
        height: desired_extent
            .height
            .max(capabilities.min_image_extent.height)
            .min(capabilities.max_image_extent.height),
    }
}

/// One more than the minimum so acquiring never waits on the driver, capped by
/// the maximum unless that is zero (unbounded).
fn find_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        image_count.min(capabilities.max_image_count)
    } else {
        image_count
    }
}

fn find_composite_alpha(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|alpha| capabilities.supported_composite_alpha.contains(*alpha))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharingMode {
    Exclusive,
    /// The distinct queue family indices that access the images.
    Concurrent(Vec<u32>),
}

impl SharingMode {
    pub fn from_assignment(assignment: &QueueAssignment) -> Self {
        let indices = assignment.distinct_indices();
        if indices.len() > 1 {
            SharingMode::Concurrent(indices)
        } else {
            SharingMode::Exclusive
        }
    }

    pub fn as_vk(&self) -> vk::SharingMode {
        match self {
            SharingMode::Exclusive => vk::SharingMode::EXCLUSIVE,
            SharingMode::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn queue_family_indices(&self) -> &[u32] {
        match self {
            SharingMode::Exclusive => &[],
            SharingMode::Concurrent(indices) => indices,
        }
    }
}

/// Caller-side swapchain preferences, applied against what the surface reports.
#[derive(Debug, Clone)]
pub struct SwapchainPreferences {
    desired_formats: Vec<Format>,
    desired_present_modes: Vec<PresentMode>,
    desired_extent: vk::Extent2D,
    image_usage_flags: vk::ImageUsageFlags,
    clipped: bool,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            desired_formats: vec![],
            desired_present_modes: vec![],
            desired_extent: vk::Extent2D {
                width: 256,
                height: 256,
            },
            image_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            clipped: true,
        }
    }
}

impl SwapchainPreferences {
    /// The framebuffer size in pixels, used only when the surface leaves the
    /// extent to the swapchain.
    pub fn desired_extent(mut self, width: u32, height: u32) -> Self {
        self.desired_extent = vk::Extent2D { width, height };
        self
    }

    pub fn desired_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.desired_formats.push(Format {
            inner: format,
            priority: Priority::Main,
        });
        self
    }

    pub fn fallback_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.desired_formats.push(Format {
            inner: format,
            priority: Priority::Fallback,
        });
        self
    }

    pub fn desired_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.desired_present_modes.push(PresentMode {
            inner: present_mode,
            priority: Priority::Main,
        });
        self
    }

    pub fn fallback_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.desired_present_modes.push(PresentMode {
            inner: present_mode,
            priority: Priority::Fallback,
        });
        self
    }

    fn formats(&self) -> Vec<Format> {
        if self.desired_formats.is_empty() {
            default_formats()
        } else {
            self.desired_formats.clone()
        }
    }

    fn present_modes(&self) -> Vec<PresentMode> {
        if self.desired_present_modes.is_empty() {
            default_present_modes()
        } else {
            self.desired_present_modes.clone()
        }
    }
}

/// A fully resolved swapchain configuration. Never modified after negotiation;
/// recreating a swapchain negotiates a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing_mode: SharingMode,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub image_usage: vk::ImageUsageFlags,
    pub clipped: bool,
}

impl SwapchainConfig {
    pub fn negotiate(
        support: &SurfaceSupport,
        assignment: &QueueAssignment,
        preferences: &SwapchainPreferences,
    ) -> Result<Self, SwapchainError> {
        let capabilities = &support.capabilities;
        let surface_format = find_best_surface_format(&support.formats, &preferences.formats())
            .ok_or(SwapchainError::NoSurfaceFormats)?;

        Ok(Self {
            surface_format,
            present_mode: find_best_present_mode(
                &support.present_modes,
                &preferences.present_modes(),
            ),
            extent: find_extent(capabilities, preferences.desired_extent),
            image_count: find_image_count(capabilities),
            sharing_mode: SharingMode::from_assignment(assignment),
            pre_transform: capabilities.current_transform,
            composite_alpha: find_composite_alpha(capabilities),
            image_usage: preferences.image_usage_flags,
            clipped: preferences.clipped,
        })
    }

    pub fn create_info(&self, surface: vk::SurfaceKHR) -> vk::SwapchainCreateInfoKHR<'_> {
        vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(self.image_usage)
            .image_sharing_mode(self.sharing_mode.as_vk())
            .queue_family_indices(self.sharing_mode.queue_family_indices())
            .pre_transform(self.pre_transform)
            .composite_alpha(self.composite_alpha)
            .present_mode(self.present_mode)
            .clipped(self.clipped)
    }
}

/// Hands the assembled create info to `create`. A failure is reported as
/// [`SwapchainError::Rejected`] with the API result unchanged; nothing is retried.
pub fn create_swapchain_with<F>(
    config: &SwapchainConfig,
    surface: vk::SurfaceKHR,
    create: F,
) -> crate::Result<vk::SwapchainKHR>
where
    F: FnOnce(&vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR>,
{
    let create_info = config.create_info(surface);
    create(&create_info).map_err(|e| SwapchainError::Rejected(e).into())
}

pub struct SwapchainBuilder<'a> {
    instance: &'a Instance,
    device: &'a Device,
    preferences: SwapchainPreferences,
}

impl<'a> SwapchainBuilder<'a> {
    pub fn new(instance: &'a Instance, device: &'a Device) -> Self {
        Self {
            instance,
            device,
            preferences: SwapchainPreferences::default(),
        }
    }

    pub fn desired_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.preferences = self.preferences.desired_format(format);
        self
    }

    pub fn fallback_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.preferences = self.preferences.fallback_format(format);
        self
    }

    /// Use the default swapchain formats. This is done if no formats are provided.
    ///
    /// Default surface format is [
    ///     [`vk::Format::B8G8R8A8_SRGB`],
    ///     [`vk::ColorSpaceKHR::SRGB_NONLINEAR`]
    /// ]
    pub fn use_default_format_selection(mut self) -> Self {
        self.preferences.desired_formats = default_formats();
        self
    }

    pub fn desired_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.preferences = self.preferences.desired_present_mode(present_mode);
        self
    }

    pub fn fallback_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.preferences = self.preferences.fallback_present_mode(present_mode);
        self
    }

    pub fn use_default_present_modes(mut self) -> Self {
        self.preferences.desired_present_modes = default_present_modes();
        self
    }

    /// The framebuffer size in pixels. Only used when the surface lets the
    /// swapchain decide its extent; clamped to the surface limits.
    pub fn desired_extent(mut self, width: u32, height: u32) -> Self {
        self.preferences = self.preferences.desired_extent(width, height);
        self
    }

    /// Set whether the Vulkan implementation is allowed to discard rendering operations that
    /// affect regions of the surface that are not visible. Default is true.
    pub fn clipped(mut self, clipped: bool) -> Self {
        self.preferences.clipped = clipped;
        self
    }

    /// Set the bitmask of the image usage for acquired swapchain images.
    pub fn image_usage_flags(mut self, flags: vk::ImageUsageFlags) -> Self {
        self.preferences.image_usage_flags = flags;
        self
    }

    /// Add a image usage to the bitmask for acquired swapchain images.
    pub fn add_image_usage_flags(mut self, flags: vk::ImageUsageFlags) -> Self {
        self.preferences.image_usage_flags |= flags;
        self
    }

    #[cfg_attr(feature = "enable_tracing", tracing::instrument(skip(self)))]
    pub fn build(self) -> crate::Result<Swapchain> {
        let (Some(surface), Some(surface_instance)) =
            (self.instance.surface(), self.instance.surface_instance())
        else {
            return Err(SwapchainError::SurfaceHandleNotProvided.into());
        };
        let Some(swapchain_device) = self.device.swapchain_device() else {
            return Err(SwapchainError::ExtensionNotEnabled.into());
        };

        let surface_support = query_surface_support(
            surface_instance,
            self.device.physical_device().handle(),
            surface,
        )
        .map_err(SwapchainError::FailedQuerySurfaceSupportDetails)?;

        let config = SwapchainConfig::negotiate(
            &surface_support,
            self.device.queue_assignment(),
            &self.preferences,
        )?;

        #[cfg(feature = "enable_tracing")]
        tracing::debug!(?config, "Negotiated swapchain configuration");

        let swapchain = create_swapchain_with(&config, surface, |create_info| unsafe {
            swapchain_device.create_swapchain(create_info, None)
        })?;

        let images = match unsafe { swapchain_device.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_device.destroy_swapchain(swapchain, None) };
                return Err(SwapchainError::FailedGetSwapchainImages(e).into());
            }
        };

        #[cfg(feature = "enable_tracing")]
        tracing::info!(images = images.len(), "Created swapchain");

        Ok(Swapchain {
            swapchain,
            swapchain_device: swapchain_device.clone(),
            images,
            config,
        })
    }
}

pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    swapchain_device: khr::swapchain::Device,
    images: Vec<vk::Image>,
    config: SwapchainConfig,
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("swapchain", &self.swapchain)
            .field("images", &self.images)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Swapchain {
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    pub fn destroy(&self) {
        unsafe {
            self.swapchain_device
                .destroy_swapchain(self.swapchain, None)
        };
    }
}

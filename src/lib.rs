mod debug;
mod device;
mod diagnostics;
mod error;
mod instance;
mod query;
mod queue;
mod suitability;
mod swapchain;
mod system_info;
#[cfg(feature = "enable_tracing")]
mod tracing;
mod version;

pub use debug::vulkan_debug_callback;
pub use device::{
    Device, DeviceBuilder, PhysicalDevice, PhysicalDeviceSelector, RejectedDevice, Rejection,
    negotiate_device, select_device,
};
#[cfg(feature = "enable_tracing")]
pub use diagnostics::TracingSink;
pub use diagnostics::{DiagnosticSink, NoopSink, Severity, default_sink};
pub use error::*;
pub use instance::{Instance, InstanceBuilder, WindowTraits};
pub use query::{
    CapabilitySource, DeviceCapabilities, InstanceCapabilities, QueueFamilyRecord, SurfaceSupport,
    query_surface_support,
};
pub use queue::{QueueAssignment, QueueRole, resolve_queues};
pub use suitability::{Requirements, Unsuitable, evaluate};
pub use swapchain::{
    SharingMode, Swapchain, SwapchainBuilder, SwapchainConfig, SwapchainPreferences,
    create_swapchain_with,
};
pub use system_info::SystemInfo;
#[cfg(feature = "enable_tracing")]
pub use self::tracing::vulkan_tracing_callback;
pub use version::Version;

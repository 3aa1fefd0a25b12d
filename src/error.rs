use crate::device::RejectedDevice;
use crate::queue::QueueRole;
use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Instance error: {0}")]
    Instance(#[from] InstanceError),
    #[error("Physical device error: {0}")]
    PhysicalDevice(#[from] PhysicalDeviceError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Swapchain error: {0}")]
    Swapchain(#[from] SwapchainError),
    #[error("Ash loading error: {0}")]
    AshLoading(#[from] ash::LoadingError),
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
    #[error("Window handle error: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("Vulkan version {0} unavailable")]
    VulkanVersionUnavailable(String),
    #[error("Failed to create instance: {0}")]
    FailedCreateInstance(vk::Result),
    #[error("Failed to create debug messenger: {0}")]
    FailedCreateDebugMessenger(vk::Result),
    #[error("Failed to create window surface: {0}")]
    FailedCreateSurface(vk::Result),
    #[error("Failed to find requested layers: {0:?}")]
    RequestedLayersNotPresent(Vec<String>),
    #[error("Failed to find requested extensions: {0:?}")]
    RequestedExtensionsNotPresent(Vec<String>),
    #[error("Failed to find windowing extensions: {0:?}")]
    WindowingExtensionsNotPresent(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhysicalDeviceError {
    #[error("No surface provided")]
    NoSurfaceProvided,
    #[error("Failed to enumerate physical devices: {0}")]
    FailedToEnumeratePhysicalDevices(vk::Result),
    #[error("Failed to query device capabilities: {0}")]
    QueryFailed(vk::Result),
    #[error("No suitable device ({} candidates rejected)", .0.len())]
    NoSuitableDevice(Vec<RejectedDevice>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Incomplete queue family assignment, unsatisfied roles: {0:?}")]
    IncompleteAssignment(Vec<QueueRole>),
    #[error("No queue family assigned for role {0}")]
    RoleNotAssigned(QueueRole),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Failed to create logical device: {0}")]
    FailedCreateDevice(vk::Result),
    #[error("Invalid extension name: {0:?}")]
    InvalidExtensionName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapchainError {
    #[error("Surface handle not provided")]
    SurfaceHandleNotProvided,
    #[error("Failed to query surface support details: {0}")]
    FailedQuerySurfaceSupportDetails(vk::Result),
    #[error("VK_KHR_swapchain was not enabled on the device")]
    ExtensionNotEnabled,
    #[error("Surface reports no supported formats")]
    NoSurfaceFormats,
    #[error("Swapchain creation rejected: {0}")]
    Rejected(vk::Result),
    #[error("Failed to get swapchain images: {0}")]
    FailedGetSwapchainImages(vk::Result),
}

pub type Result<T> = std::result::Result<T, Error>;

use ash::vk;
use std::fmt::{Display, Formatter};

/// A packed Vulkan API version as reported by the loader or a physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(u32);

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            vk::api_version_major(self.0),
            vk::api_version_minor(self.0),
            vk::api_version_patch(self.0)
        )
    }
}

impl Version {
    pub const V1_0: Self = Self(vk::API_VERSION_1_0);
    pub const V1_1: Self = Self(vk::API_VERSION_1_1);

    pub fn new(version: u32) -> Self {
        Self(version)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for Version {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

use crate::diagnostics::{DiagnosticSink, Severity, default_sink};
use crate::query::{CapabilitySource, DeviceCapabilities, InstanceCapabilities};
use crate::queue::{QueueAssignment, QueueRole, resolve_queues};
use crate::suitability::{Requirements, Unsuitable, evaluate};
use crate::{DeviceError, Instance, PhysicalDeviceError, QueueError};
use ash::{khr, vk};
use std::collections::BTreeMap;
use std::ffi::CString;
use std::fmt::{Display, Formatter};
use thiserror::Error;

const PORTABILITY_SUBSET_EXT_NAME: &str = "VK_KHR_portability_subset";

/// Why a candidate was passed over.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("capability query failed: {0}")]
    QueryFailed(vk::Result),
    #[error(transparent)]
    Unsuitable(#[from] Unsuitable),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedDevice {
    pub name: String,
    pub reason: Rejection,
}

impl Display for RejectedDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    physical_device: vk::PhysicalDevice,
    capabilities: DeviceCapabilities,
    queue_assignment: QueueAssignment,
    extensions_to_enable: Vec<String>,
}

impl PhysicalDevice {
    pub fn name(&self) -> &str {
        &self.capabilities.name
    }

    pub fn handle(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn queue_assignment(&self) -> &QueueAssignment {
        &self.queue_assignment
    }

    pub fn extensions_to_enable(&self) -> &[String] {
        &self.extensions_to_enable
    }

    /// Adds the extensions the device advertises to the set enabled at device
    /// creation and returns whether all of them were present.
    pub fn enable_extensions_if_present<I, S>(&mut self, extensions: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all_present = true;
        for extension in extensions {
            let extension = extension.as_ref();
            if !self.capabilities.supports_extension(extension) {
                all_present = false;
                continue;
            }
            if !self.extensions_to_enable.iter().any(|e| e == extension) {
                self.extensions_to_enable.push(extension.to_string());
            }
        }
        all_present
    }
}

/// Returns the first candidate, in enumeration order, that meets `requirements`.
///
/// A candidate whose capability query fails is rejected and the pass moves on.
/// Every rejection is reported to `sink` and collected into
/// [`PhysicalDeviceError::NoSuitableDevice`] if nothing passes.
pub fn select_device<S: CapabilitySource + ?Sized>(
    source: &S,
    requirements: &Requirements,
    sink: &dyn DiagnosticSink,
) -> crate::Result<(vk::PhysicalDevice, DeviceCapabilities)> {
    let candidates = source.enumerate()?;
    if candidates.is_empty() {
        sink.emit(Severity::Error, "No physical devices found");
        return Err(PhysicalDeviceError::NoSuitableDevice(vec![]).into());
    }

    let mut rejected = Vec::new();
    for candidate in candidates {
        let (name, reason) = match source.query(candidate, requirements.surface()) {
            Ok(capabilities) => match evaluate(&capabilities, requirements) {
                Ok(()) => {
                    sink.emit(
                        Severity::Info,
                        &format!("Selected physical device {}", capabilities.name),
                    );
                    return Ok((candidate, capabilities));
                }
                Err(unsuitable) => (capabilities.name, Rejection::from(unsuitable)),
            },
            Err(
                crate::Error::PhysicalDevice(PhysicalDeviceError::QueryFailed(result))
                | crate::Error::Vulkan(result),
            ) => (format!("{candidate:?}"), Rejection::QueryFailed(result)),
            Err(e) => return Err(e),
        };

        sink.emit(
            Severity::Warning,
            &format!("Rejected physical device {name}: {reason}"),
        );
        rejected.push(RejectedDevice { name, reason });
    }

    sink.emit(
        Severity::Error,
        &format!(
            "No suitable physical device among {} candidates",
            rejected.len()
        ),
    );
    Err(PhysicalDeviceError::NoSuitableDevice(rejected).into())
}

/// Selects a device and resolves its queue families.
pub fn negotiate_device<S: CapabilitySource + ?Sized>(
    source: &S,
    requirements: &Requirements,
    sink: &dyn DiagnosticSink,
) -> crate::Result<(PhysicalDevice, QueueAssignment)> {
    let (physical_device, capabilities) = select_device(source, requirements, sink)?;

    let queue_assignment =
        resolve_queues(&capabilities.queue_families, requirements.roles()).inspect_err(|e| {
            sink.emit(
                Severity::Error,
                &format!("Queue resolution failed on {}: {e}", capabilities.name),
            );
        })?;

    let mut extensions_to_enable: Vec<String> = requirements.extensions().iter().cloned().collect();
    if capabilities.supports_extension(PORTABILITY_SUBSET_EXT_NAME)
        && !requirements.extensions().contains(PORTABILITY_SUBSET_EXT_NAME)
    {
        extensions_to_enable.push(PORTABILITY_SUBSET_EXT_NAME.to_string());
    }

    #[cfg(feature = "enable_tracing")]
    tracing::debug!(
        name = %capabilities.name,
        ?queue_assignment,
        ?extensions_to_enable,
        "Negotiated physical device"
    );

    Ok((
        PhysicalDevice {
            physical_device,
            capabilities,
            queue_assignment: queue_assignment.clone(),
            extensions_to_enable,
        },
        queue_assignment,
    ))
}

pub struct PhysicalDeviceSelector<'a> {
    instance: &'a Instance,
    require_present: bool,
    requirements: Requirements,
    sink: Box<dyn DiagnosticSink + 'a>,
}

impl<'a> PhysicalDeviceSelector<'a> {
    pub fn new(instance: &'a Instance) -> PhysicalDeviceSelector<'a> {
        Self {
            instance,
            require_present: !instance.is_headless(),
            requirements: Requirements::new(),
            sink: default_sink(),
        }
    }

    pub fn require_present(mut self, require: bool) -> Self {
        self.require_present = require;
        self
    }

    pub fn add_required_extension(mut self, extension: impl Into<String>) -> Self {
        self.requirements = self.requirements.require_extension(extension);
        self
    }

    pub fn add_required_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = self.requirements.require_extensions(extensions);
        self
    }

    pub fn require_queue(mut self, role: QueueRole) -> Self {
        self.requirements = self.requirements.require_role(role);
        self
    }

    pub fn diagnostic_sink(mut self, sink: impl DiagnosticSink + 'a) -> Self {
        self.sink = Box::new(sink);
        self
    }

    #[cfg_attr(feature = "enable_tracing", tracing::instrument(skip(self)))]
    pub fn select(self) -> crate::Result<PhysicalDevice> {
        let mut requirements = self.requirements;
        if self.require_present {
            let surface = self
                .instance
                .surface()
                .ok_or(PhysicalDeviceError::NoSurfaceProvided)?;
            requirements = requirements.presenting_to(surface);
        }

        let source = InstanceCapabilities::new(
            self.instance.as_ref(),
            self.instance.surface_instance(),
        );

        let (physical_device, _) = negotiate_device(&source, &requirements, self.sink.as_ref())?;
        Ok(physical_device)
    }
}

/// Swapchain entry points are only loaded when the extension is enabled on the
/// device, not merely advertised.
fn swapchain_enabled(extensions_to_enable: &[String]) -> bool {
    let name = khr::swapchain::NAME.to_string_lossy();
    extensions_to_enable.iter().any(|e| *e == name)
}

pub struct DeviceBuilder<'a> {
    instance: &'a Instance,
    physical_device: PhysicalDevice,
}

impl<'a> DeviceBuilder<'a> {
    pub fn new(physical_device: PhysicalDevice, instance: &'a Instance) -> Self {
        Self {
            instance,
            physical_device,
        }
    }

    #[cfg_attr(feature = "enable_tracing", tracing::instrument(skip(self)))]
    pub fn build(self) -> crate::Result<Device> {
        let assignment = self.physical_device.queue_assignment.clone();
        let queue_priorities = [1.0_f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = assignment
            .distinct_indices()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extension_names = self
            .physical_device
            .extensions_to_enable
            .iter()
            .map(|name| {
                CString::new(name.as_str())
                    .map_err(|_| DeviceError::InvalidExtensionName(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let extension_ptrs = extension_names
            .iter()
            .map(|name| name.as_ptr())
            .collect::<Vec<_>>();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs);

        let device = unsafe {
            self.instance.as_ref().create_device(
                self.physical_device.physical_device,
                &create_info,
                None,
            )
        }
        .map_err(DeviceError::FailedCreateDevice)?;

        #[cfg(feature = "enable_tracing")]
        tracing::info!(name = %self.physical_device.name(), "Created logical device");

        let queues = assignment
            .iter()
            .map(|(role, index)| (role, (index, unsafe { device.get_device_queue(index, 0) })))
            .collect();

        let swapchain_device = swapchain_enabled(&self.physical_device.extensions_to_enable)
            .then(|| khr::swapchain::Device::new(self.instance.as_ref(), &device));

        Ok(Device {
            device,
            physical_device: self.physical_device,
            swapchain_device,
            queues,
        })
    }
}

pub struct Device {
    device: ash::Device,
    physical_device: PhysicalDevice,
    swapchain_device: Option<khr::swapchain::Device>,
    queues: BTreeMap<QueueRole, (u32, vk::Queue)>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("handle", &self.device.handle())
            .field("physical_device", &self.physical_device.name())
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn physical_device(&self) -> &PhysicalDevice {
        &self.physical_device
    }

    pub fn queue_assignment(&self) -> &QueueAssignment {
        &self.physical_device.queue_assignment
    }

    /// Queue 0 of the family assigned to `role`, with that family's index.
    pub fn get_queue(&self, role: QueueRole) -> crate::Result<(u32, vk::Queue)> {
        self.queues
            .get(&role)
            .copied()
            .ok_or_else(|| QueueError::RoleNotAssigned(role).into())
    }

    pub(crate) fn swapchain_device(&self) -> Option<&khr::swapchain::Device> {
        self.swapchain_device.as_ref()
    }

    /// Every swapchain created from this device must be destroyed first.
    pub fn destroy(&self) {
        unsafe { self.device.destroy_device(None) };
    }
}

impl AsRef<ash::Device> for Device {
    fn as_ref(&self) -> &ash::Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NoopSink;
    use crate::query::{QueueFamilyRecord, SurfaceSupport};
    use ash::vk::Handle;
    use std::cell::RefCell;

    const SWAPCHAIN: &str = "VK_KHR_swapchain";

    #[derive(Default)]
    struct RecordingSink(RefCell<Vec<(Severity, String)>>);

    impl DiagnosticSink for RecordingSink {
        fn emit(&self, severity: Severity, message: &str) {
            self.0.borrow_mut().push((severity, message.to_string()));
        }
    }

    impl RecordingSink {
        fn severities(&self) -> Vec<Severity> {
            self.0.borrow().iter().map(|(s, _)| *s).collect()
        }
    }

    struct FakeSource(Vec<Result<DeviceCapabilities, PhysicalDeviceError>>);

    impl CapabilitySource for FakeSource {
        fn enumerate(&self) -> crate::Result<Vec<vk::PhysicalDevice>> {
            Ok((1..=self.0.len() as u64)
                .map(vk::PhysicalDevice::from_raw)
                .collect())
        }

        fn query(
            &self,
            physical_device: vk::PhysicalDevice,
            _surface: Option<vk::SurfaceKHR>,
        ) -> crate::Result<DeviceCapabilities> {
            self.0[physical_device.as_raw() as usize - 1]
                .clone()
                .map_err(Into::into)
        }
    }

    fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(11)
    }

    fn device(name: &str, families: &[(vk::QueueFlags, bool)]) -> DeviceCapabilities {
        DeviceCapabilities {
            name: name.to_string(),
            queue_families: families
                .iter()
                .enumerate()
                .map(|(index, (flags, present_support))| QueueFamilyRecord {
                    index: index as u32,
                    flags: *flags,
                    queue_count: 1,
                    present_support: *present_support,
                })
                .collect(),
            extensions: [SWAPCHAIN.to_string()].into_iter().collect(),
            surface: Some(SurfaceSupport {
                formats: vec![vk::SurfaceFormatKHR::default()],
                present_modes: vec![vk::PresentModeKHR::FIFO],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn presenting() -> Requirements {
        Requirements::new().presenting_to(surface())
    }

    #[test]
    fn first_suitable_candidate_wins() {
        let source = FakeSource(vec![
            Ok(device("compute-only", &[(vk::QueueFlags::COMPUTE, true)])),
            Ok(device("first", &[(vk::QueueFlags::GRAPHICS, true)])),
            Ok(device("second", &[(vk::QueueFlags::GRAPHICS, true)])),
        ]);
        let sink = RecordingSink::default();

        let (handle, caps) = select_device(&source, &presenting(), &sink).unwrap();

        assert_eq!(handle, vk::PhysicalDevice::from_raw(2));
        assert_eq!(caps.name, "first");
        assert_eq!(sink.severities(), vec![Severity::Warning, Severity::Info]);
    }

    #[test]
    fn failed_query_excludes_only_that_candidate() {
        let source = FakeSource(vec![
            Err(PhysicalDeviceError::QueryFailed(vk::Result::ERROR_DEVICE_LOST)),
            Ok(device("healthy", &[(vk::QueueFlags::GRAPHICS, true)])),
        ]);

        let (handle, _) = select_device(&source, &presenting(), &NoopSink).unwrap();

        assert_eq!(handle, vk::PhysicalDevice::from_raw(2));
    }

    #[test]
    fn no_candidates_is_no_suitable_device() {
        let sink = RecordingSink::default();

        let err = select_device(&FakeSource(vec![]), &presenting(), &sink).unwrap_err();

        assert!(matches!(
            err,
            crate::Error::PhysicalDevice(PhysicalDeviceError::NoSuitableDevice(ref r)) if r.is_empty()
        ));
        assert_eq!(sink.severities(), vec![Severity::Error]);
    }

    #[test]
    fn every_rejection_is_reported_in_order() {
        let mut no_swapchain = device("no-swapchain", &[(vk::QueueFlags::GRAPHICS, true)]);
        no_swapchain.extensions.clear();
        let source = FakeSource(vec![
            Ok(no_swapchain),
            Err(PhysicalDeviceError::QueryFailed(vk::Result::ERROR_INITIALIZATION_FAILED)),
            Ok(device("no-present", &[(vk::QueueFlags::GRAPHICS, false)])),
        ]);
        let sink = RecordingSink::default();

        let err = select_device(&source, &presenting(), &sink).unwrap_err();

        let crate::Error::PhysicalDevice(PhysicalDeviceError::NoSuitableDevice(rejected)) = err
        else {
            panic!("expected NoSuitableDevice");
        };
        assert_eq!(
            rejected,
            vec![
                RejectedDevice {
                    name: "no-swapchain".into(),
                    reason: Unsuitable::MissingExtensions(vec![SWAPCHAIN.into()]).into(),
                },
                RejectedDevice {
                    name: format!("{:?}", vk::PhysicalDevice::from_raw(2)),
                    reason: Rejection::QueryFailed(vk::Result::ERROR_INITIALIZATION_FAILED),
                },
                RejectedDevice {
                    name: "no-present".into(),
                    reason: Unsuitable::MissingQueueRole(QueueRole::Present).into(),
                },
            ]
        );
        assert_eq!(
            sink.severities(),
            vec![
                Severity::Warning,
                Severity::Warning,
                Severity::Warning,
                Severity::Error
            ]
        );
    }

    #[test]
    fn configuration_errors_abort_the_pass() {
        let source = FakeSource(vec![
            Err(PhysicalDeviceError::NoSurfaceProvided),
            Ok(device("healthy", &[(vk::QueueFlags::GRAPHICS, true)])),
        ]);

        let err = select_device(&source, &presenting(), &NoopSink).unwrap_err();

        assert!(matches!(
            err,
            crate::Error::PhysicalDevice(PhysicalDeviceError::NoSurfaceProvided)
        ));
    }

    #[test]
    fn negotiate_resolves_queues_and_extensions() {
        let mut caps = device(
            "split",
            &[
                (vk::QueueFlags::GRAPHICS, false),
                (vk::QueueFlags::TRANSFER, true),
            ],
        );
        caps.extensions.insert(PORTABILITY_SUBSET_EXT_NAME.to_string());
        let source = FakeSource(vec![Ok(caps)]);

        let (physical_device, assignment) =
            negotiate_device(&source, &presenting(), &NoopSink).unwrap();

        assert_eq!(assignment.family_index(QueueRole::Graphics), Some(0));
        assert_eq!(assignment.family_index(QueueRole::Present), Some(1));
        assert_eq!(physical_device.queue_assignment(), &assignment);
        assert_eq!(
            physical_device.extensions_to_enable(),
            &[SWAPCHAIN.to_string(), PORTABILITY_SUBSET_EXT_NAME.to_string()]
        );
    }

    #[test]
    fn swapchain_loads_only_when_enabled() {
        let caps = device("advertises", &[(vk::QueueFlags::GRAPHICS, true)]);
        let (headless, _) =
            negotiate_device(&FakeSource(vec![Ok(caps.clone())]), &Requirements::new(), &NoopSink)
                .unwrap();
        assert!(headless.capabilities().supports_extension(SWAPCHAIN));
        assert!(!swapchain_enabled(headless.extensions_to_enable()));

        let (presenting, _) =
            negotiate_device(&FakeSource(vec![Ok(caps)]), &presenting(), &NoopSink).unwrap();
        assert!(swapchain_enabled(presenting.extensions_to_enable()));

        let mut opted_in = headless;
        assert!(opted_in.enable_extensions_if_present([SWAPCHAIN]));
        assert!(swapchain_enabled(opted_in.extensions_to_enable()));
    }

    #[test]
    fn optional_extensions_are_enabled_only_when_advertised() {
        let mut caps = device("optional", &[(vk::QueueFlags::GRAPHICS, true)]);
        caps.extensions.insert("VK_KHR_dynamic_rendering".to_string());
        let (mut physical_device, _) =
            negotiate_device(&FakeSource(vec![Ok(caps)]), &presenting(), &NoopSink).unwrap();

        let all_present = physical_device.enable_extensions_if_present([
            "VK_KHR_dynamic_rendering",
            "VK_KHR_ray_query",
            "VK_KHR_dynamic_rendering",
        ]);

        assert!(!all_present);
        assert_eq!(
            physical_device.extensions_to_enable(),
            &[
                SWAPCHAIN.to_string(),
                "VK_KHR_dynamic_rendering".to_string()
            ]
        );
    }
}

use ash::vk;
use ash_negotiator::{
    Device, DeviceBuilder, Instance, InstanceBuilder, PhysicalDeviceSelector, QueueRole,
    Swapchain, SwapchainBuilder, WindowTraits,
};
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

struct Renderer {
    instance: Arc<Instance>,
    device: Device,
    swapchain: Swapchain,
}

impl Renderer {
    fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let window: Arc<dyn WindowTraits> = window;

        let instance = InstanceBuilder::new(Some(window))
            .app_name("Hello Triangle")
            .engine_name("ash-negotiator")
            .request_validation_layers(true)
            .use_default_tracing_messenger()
            .add_debug_messenger_severity(vk::DebugUtilsMessageSeverityFlagsEXT::INFO)
            .minimum_instance_version(vk::make_api_version(0, 1, 1, 0))
            .build()?;

        let device = match Self::create_device(&instance) {
            Ok(device) => device,
            Err(e) => {
                instance.destroy();
                return Err(e);
            }
        };

        let swapchain = match Self::create_swapchain(&instance, &device, size.width, size.height) {
            Ok(swapchain) => swapchain,
            Err(e) => {
                device.destroy();
                instance.destroy();
                return Err(e);
            }
        };

        Ok(Self {
            instance,
            device,
            swapchain,
        })
    }

    fn create_device(instance: &Instance) -> anyhow::Result<Device> {
        let mut physical_device = PhysicalDeviceSelector::new(instance).select()?;
        physical_device.enable_extensions_if_present(["VK_KHR_dynamic_rendering"]);
        tracing::info!(
            name = physical_device.name(),
            assignment = ?physical_device.queue_assignment(),
            "Negotiated physical device"
        );

        let device = DeviceBuilder::new(physical_device, instance).build()?;
        let queues = device
            .get_queue(QueueRole::Graphics)
            .and_then(|graphics| Ok((graphics, device.get_queue(QueueRole::Present)?)));
        match queues {
            Ok(((graphics_family, _), (present_family, _))) => {
                tracing::info!(graphics_family, present_family, "Retrieved queues");
                Ok(device)
            }
            Err(e) => {
                device.destroy();
                Err(e.into())
            }
        }
    }

    fn create_swapchain(
        instance: &Instance,
        device: &Device,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Swapchain> {
        let swapchain = SwapchainBuilder::new(instance, device)
            .desired_extent(width, height)
            .build()?;
        tracing::info!(
            config = ?swapchain.config(),
            images = swapchain.images().len(),
            "Created swapchain"
        );
        Ok(swapchain)
    }

    fn destroy(&self) {
        self.swapchain.destroy();
        self.device.destroy();
        self.instance.destroy();
    }
}

#[derive(Default)]
struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default().with_title("Hello Triangle");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(window.clone()) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                tracing::error!("Failed to set up Vulkan: {e:#}");
                event_loop.exit();
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            if let Some(renderer) = self.renderer.take() {
                renderer.destroy();
            }
            event_loop.exit();
        }
    }
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let mut app = App::default();
    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut app)?;

    Ok(())
}

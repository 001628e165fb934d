//! `Gpu`: the handle bundling instance, device, queues, and the device-memory sub-allocator that
//! every other component in this crate is built on top of.
//!
//! Mirrors the shape of `ivy-vulkan`'s `VulkanContext`, minus the surface/swapchain/descriptor
//! machinery it owned: this crate never drives a swapchain, and pipeline/descriptor construction
//! is the caller's responsibility.

use crate::commands::CommandPool;
use crate::debug_utils;
use crate::device::{self, PhysicalDeviceInfo, QueueFamilies};
use crate::entry;
use crate::error::Result;
use crate::instance;
use ash::extensions::ext::DebugUtils;
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Device extensions this crate requires of the physical device it picks.
const DEVICE_EXTENSIONS: &[&str] = &[];

/// A reference-counted handle, since every raw resource wrapper keeps one alive for the
/// lifetime of its own Vulkan objects.
pub type SharedGpu = Arc<Gpu>;

pub struct Gpu {
    _entry: ash::Entry,
    instance: ash::Instance,
    device: Arc<ash::Device>,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilies,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    graphics_queue: vk::Queue,
    transfer_queue: vk::Queue,
    compute_queue: vk::Queue,

    allocator: RwLock<Allocator>,
    limits: vk::PhysicalDeviceLimits,

    /// Pool used for the short-lived command buffers issued by resize, layout transition, and
    /// the transfer executors. Wrapped in `Option` only so `Drop` can tear it down before the
    /// device it was allocated from.
    transfer_pool: Option<CommandPool>,
}

impl Gpu {
    /// Creates a new GPU handle: Vulkan instance, best-scoring physical device, logical device
    /// with one queue per distinct family, and a `gpu_allocator` sub-allocator over it.
    ///
    /// `extra_instance_extensions` lets a windowing layer request surface extensions without this
    /// crate needing to know about windowing at all.
    pub fn new(app_name: &str, extra_instance_extensions: &[String]) -> Result<Self> {
        let entry = entry::create()?;
        let instance = instance::create(&entry, extra_instance_extensions, app_name)?;

        let debug_utils = if instance::ENABLE_VALIDATION_LAYERS {
            Some(debug_utils::create(&entry, &instance)?)
        } else {
            None
        };

        let (device, pdevice_info) =
            device::create(&instance, instance::get_layers(), DEVICE_EXTENSIONS)?;
        let device = Arc::new(device);

        let PhysicalDeviceInfo { physical_device, queue_families, limits, .. } = pdevice_info;

        let graphics_queue = device::get_queue(&device, queue_families.graphics(), 0);
        let transfer_queue = device::get_queue(&device, queue_families.transfer(), 0);
        let compute_queue = device::get_queue(&device, queue_families.compute(), 0);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
        })?;

        let transfer_pool = CommandPool::new(device.clone(), queue_families.transfer(), true, true)?;

        Ok(Gpu {
            _entry: entry,
            instance,
            device,
            physical_device,
            queue_families,
            debug_utils,
            graphics_queue,
            transfer_queue,
            compute_queue,
            allocator: RwLock::new(allocator),
            limits,
            transfer_pool: Some(transfer_pool),
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue_families(&self) -> &QueueFamilies {
        &self.queue_families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    #[inline]
    pub fn allocator(&self) -> &RwLock<Allocator> {
        &self.allocator
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Pool for one-shot command buffers on the transfer queue family: resize copies, layout
    /// transitions, and every synchronous transfer executor use this.
    pub fn transfer_pool(&self) -> &CommandPool {
        self.transfer_pool.as_ref().expect("transfer pool is only None once Gpu is dropping")
    }

    pub fn wait_idle(&self) -> Result<()> {
        device::wait_idle(&self.device)
    }
}

impl Drop for Gpu {
    fn drop(&mut self) {
        let _ = device::wait_idle(&self.device);
        self.transfer_pool.take();
        device::destroy(&self.device);

        if let Some((debug_utils, messenger)) = self.debug_utils.take() {
            debug_utils::destroy(&debug_utils, messenger);
        }

        instance::destroy(&self.instance);
    }
}

//! Physical device selection and logical device creation.
//!
//! The core never owns a surface or a swapchain (that is the windowing layer's job), so device
//! selection and queue family discovery here do not require a present queue the way the original
//! `ivy-vulkan` device module did.

use crate::error::{Error, Result};
use ash::{vk, Device, Instance};
use std::collections::HashSet;
use std::ffi::{CStr, CString};

/// Indices of the graphics, transfer, and compute queue families on a chosen physical device.
///
/// A device lacking a dedicated transfer or compute family still works: `transfer` and
/// `compute` fall back to the graphics family, since `GRAPHICS` implies both capabilities.
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilies {
    graphics: u32,
    transfer: u32,
    compute: u32,
}

impl QueueFamilies {
    fn find(instance: &Instance, physical_device: vk::PhysicalDevice) -> Option<QueueFamilies> {
        let properties =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let graphics = properties
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))? as u32;

        // Prefer a queue family that is transfer-capable but not also graphics-capable, so
        // transfer work can proceed concurrently with rendering.
        let transfer = properties
            .iter()
            .position(|f| {
                f.queue_flags.contains(vk::QueueFlags::TRANSFER)
                    && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .or_else(|| properties.iter().position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS)))
            .map(|i| i as u32)?;

        let compute = properties
            .iter()
            .position(|f| {
                f.queue_flags.contains(vk::QueueFlags::COMPUTE)
                    && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .or(Some(graphics as usize))
            .map(|i| i as u32)?;

        Some(QueueFamilies { graphics, transfer, compute })
    }

    pub fn graphics(&self) -> u32 {
        self.graphics
    }

    pub fn transfer(&self) -> u32 {
        self.transfer
    }

    pub fn compute(&self) -> u32 {
        self.compute
    }

    /// All distinct family indices, deduplicated, for queue create info construction.
    pub fn unique(&self) -> Vec<u32> {
        let mut set = HashSet::new();
        set.insert(self.graphics);
        set.insert(self.transfer);
        set.insert(self.compute);
        set.into_iter().collect()
    }
}

type Score = u64;

/// A rated physical device, carrying everything needed to create a logical device from it.
pub struct PhysicalDeviceInfo {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub queue_families: QueueFamilies,
    pub limits: vk::PhysicalDeviceLimits,
    pub features: vk::PhysicalDeviceFeatures,
}

fn rate_physical_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<(Score, PhysicalDeviceInfo)> {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let features = unsafe { instance.get_physical_device_features(physical_device) };

    let name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .to_string()
    };

    let queue_families = QueueFamilies::find(instance, physical_device)?;

    let mut score: Score = 0;
    if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 10_000;
    }
    if queue_families.transfer != queue_families.graphics {
        score += 1_000;
    }
    score += properties.limits.max_storage_buffer_range as Score / 1_000_000;

    Some((
        score,
        PhysicalDeviceInfo {
            physical_device,
            name,
            queue_families,
            limits: properties.limits,
            features,
        },
    ))
}

fn pick_physical_device(instance: &Instance) -> Result<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    devices
        .into_iter()
        .filter_map(|d| rate_physical_device(instance, d))
        .max_by_key(|(score, _)| *score)
        .map(|(_, info)| info)
        .ok_or(Error::UnsuitableDevice)
}

fn get_missing_extensions(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    extensions: &[CString],
) -> Result<Vec<CString>> {
    let available = unsafe { instance.enumerate_device_extension_properties(physical_device)? };

    Ok(extensions
        .iter()
        .filter(|ext| {
            !available.iter().any(|avail| unsafe {
                CStr::from_ptr(avail.extension_name.as_ptr()) == ext.as_c_str()
            })
        })
        .cloned()
        .collect())
}

/// Picks a physical device and creates a logical device with one queue per distinct family.
pub fn create(
    instance: &Instance,
    layers: &[&str],
    extensions: &[&str],
) -> Result<(Device, PhysicalDeviceInfo)> {
    let pdevice_info = pick_physical_device(instance)?;

    let extensions = extensions
        .iter()
        .map(|s| CString::new(*s))
        .collect::<std::result::Result<Vec<_>, _>>()
        .unwrap();

    let missing = get_missing_extensions(instance, pdevice_info.physical_device, &extensions)?;
    if !missing.is_empty() {
        return Err(Error::MissingExtensions(missing));
    }

    let extension_names_raw = extensions.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();

    let layers = layers
        .iter()
        .map(|s| CString::new(*s))
        .collect::<std::result::Result<Vec<_>, _>>()
        .unwrap();
    let layer_names_raw = layers.iter().map(|l| l.as_ptr()).collect::<Vec<_>>();

    let queue_create_infos = pdevice_info
        .queue_families
        .unique()
        .into_iter()
        .map(|index| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(index)
                .queue_priorities(&[1.0])
                .build()
        })
        .collect::<Vec<_>>();

    let enabled_features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: pdevice_info.features.sampler_anisotropy,
        ..Default::default()
    };

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names_raw)
        .enabled_layer_names(&layer_names_raw)
        .enabled_features(&enabled_features);

    let device = unsafe { instance.create_device(pdevice_info.physical_device, &create_info, None)? };
    Ok((device, pdevice_info))
}

pub fn get_queue(device: &Device, family_index: u32, index: u32) -> vk::Queue {
    unsafe { device.get_device_queue(family_index, index) }
}

pub fn wait_idle(device: &Device) -> Result<()> {
    unsafe { device.device_wait_idle()? };
    Ok(())
}

pub fn queue_wait_idle(device: &Device, queue: vk::Queue) -> Result<()> {
    unsafe { device.queue_wait_idle(queue)? };
    Ok(())
}

pub fn destroy(device: &Device) {
    unsafe { device.destroy_device(None) };
}

//! Raw sampler wrapper (C2): filter and per-axis address mode, created eagerly.

use crate::error::Result;
use crate::gpu::SharedGpu;
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerInfo {
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            min_filter: vk::Filter::LINEAR,
            mag_filter: vk::Filter::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
        }
    }
}

pub struct Sampler {
    gpu: SharedGpu,
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn new(gpu: &SharedGpu, info: &SamplerInfo) -> Result<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(info.mag_filter)
            .min_filter(info.min_filter)
            .address_mode_u(info.address_mode_u)
            .address_mode_v(info.address_mode_v)
            .address_mode_w(info.address_mode_w)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        let sampler = unsafe { gpu.device().create_sampler(&create_info, None)? };

        Ok(Self { gpu: gpu.clone(), sampler })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.gpu.device().destroy_sampler(self.sampler, None) };
    }
}

impl AsRef<vk::Sampler> for Sampler {
    fn as_ref(&self) -> &vk::Sampler {
        &self.sampler
    }
}

//! Raw image wrapper (C2): a `vk::Image` plus view, transitioned to its declared layout
//! immediately after creation.

use crate::commands::CommandPool;
use crate::error::Result;
use crate::extent::{Dims, Shape};
use crate::gpu::SharedGpu;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc};
use gpu_allocator::MemoryLocation;
use log::info;

fn vk_image_type(dims: Dims) -> vk::ImageType {
    match dims {
        Dims::D1 => vk::ImageType::TYPE_1D,
        Dims::D2 => vk::ImageType::TYPE_2D,
        Dims::D3 => vk::ImageType::TYPE_3D,
    }
}

fn vk_view_type(dims: Dims) -> vk::ImageViewType {
    match dims {
        Dims::D1 => vk::ImageViewType::TYPE_1D,
        Dims::D2 => vk::ImageViewType::TYPE_2D,
        Dims::D3 => vk::ImageViewType::TYPE_3D,
    }
}

fn aspect_for(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT => vk::ImageAspectFlags::DEPTH,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

pub struct Image {
    gpu: SharedGpu,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    dims: Dims,
    shape: Shape,
    format: vk::Format,
    layout: vk::ImageLayout,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
}

impl Image {
    pub fn new(
        gpu: &SharedGpu,
        dims: Dims,
        shape: Shape,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        tiling: vk::ImageTiling,
        layout: vk::ImageLayout,
    ) -> Result<Self> {
        let device = gpu.device();
        let aspect = aspect_for(format);

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk_image_type(dims))
            .format(format)
            .extent(shape.into())
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(tiling)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&create_info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let location = if tiling == vk::ImageTiling::LINEAR { MemoryLocation::GpuToCpu } else { MemoryLocation::GpuOnly };

        let allocation = gpu.allocator().write().allocate(&AllocationCreateDesc {
            name: "gpu-core image",
            requirements,
            location,
            linear: tiling == vk::ImageTiling::LINEAR,
        })?;

        unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset())? };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk_view_type(dims))
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { device.create_image_view(&view_info, None)? };

        let mut img = Self {
            gpu: gpu.clone(),
            image,
            view,
            allocation: Some(allocation),
            dims,
            shape,
            format,
            layout: vk::ImageLayout::UNDEFINED,
            tiling,
            usage,
            aspect,
        };

        img.transition(gpu.transfer_pool(), layout)?;
        Ok(img)
    }

    /// Records and submits, synchronously, a single pipeline barrier transitioning this image
    /// to `new_layout`. Called once right after creation, and again whenever the transfer
    /// executors move the image in and out of `TRANSFER_*_OPTIMAL`.
    pub fn transition(&mut self, pool: &CommandPool, new_layout: vk::ImageLayout) -> Result<()> {
        let (src_access, dst_access, src_stage, dst_stage) =
            layout_transition_masks(self.layout, new_layout)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(self.layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();

        pool.single_time_command(self.gpu.transfer_queue(), |cmd| {
            cmd.pipeline_barrier(src_stage, dst_stage, &[], &[barrier]);
        })?;

        self.layout = new_layout;
        Ok(())
    }

    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub fn tiling(&self) -> vk::ImageTiling {
        self.tiling
    }

    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    pub fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        self.allocation.as_ref().and_then(|a| a.mapped_ptr())
    }

    pub fn subresource_layout(&self) -> Result<vk::SubresourceLayout> {
        let subresource = vk::ImageSubresource { aspect_mask: self.aspect, mip_level: 0, array_layer: 0 };
        Ok(unsafe { self.gpu.device().get_image_subresource_layout(self.image, subresource) })
    }

    pub(crate) fn subresource_layers(&self) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: self.aspect,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// `vkCmdCopyBufferToImage`, bracketed by layout transitions to/from `TRANSFER_DST_OPTIMAL`
    /// around the image's declared layout (spec.md §4.8's `BufferImageCopy` executor).
    pub fn copy_from_buffer(
        &mut self,
        pool: &CommandPool,
        buffer: vk::Buffer,
        buffer_offset: vk::DeviceSize,
        image_offset: Shape,
        shape: Shape,
    ) -> Result<()> {
        let declared_layout = self.layout;
        self.transition(pool, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

        let region = vk::BufferImageCopy {
            buffer_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: self.subresource_layers(),
            image_offset: image_offset.into(),
            image_extent: shape.into(),
        };

        pool.single_time_command(self.gpu.transfer_queue(), |cmd| {
            cmd.copy_buffer_to_image(buffer, self.image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[region]);
        })?;

        self.transition(pool, declared_layout)
    }

    /// `vkCmdCopyImageToBuffer`, the mirror of [`Image::copy_from_buffer`].
    pub fn copy_to_buffer(
        &mut self,
        pool: &CommandPool,
        buffer: vk::Buffer,
        buffer_offset: vk::DeviceSize,
        image_offset: Shape,
        shape: Shape,
    ) -> Result<()> {
        let declared_layout = self.layout;
        self.transition(pool, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;

        let region = vk::BufferImageCopy {
            buffer_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: self.subresource_layers(),
            image_offset: image_offset.into(),
            image_extent: shape.into(),
        };

        pool.single_time_command(self.gpu.transfer_queue(), |cmd| {
            cmd.copy_image_to_buffer(self.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, buffer, &[region]);
        })?;

        self.transition(pool, declared_layout)
    }

    /// Resizes the image to a new shape. Per spec.md §4.2, an image resize **drops contents**:
    /// the old image is destroyed and a fresh one created and re-transitioned to its declared
    /// layout.
    pub fn resize(&mut self, new_shape: Shape) -> Result<()> {
        if new_shape == self.shape {
            return Ok(());
        }
        info!("resizing image from {:?} to {new_shape:?} (contents dropped)", self.shape);

        let mut resized = Image::new(&self.gpu, self.dims, new_shape, self.format, self.usage, self.tiling, self.layout)?;
        std::mem::swap(self, &mut resized);
        Ok(())
    }
}

fn layout_transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<(vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags)> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    Ok(match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
        }
        (L::UNDEFINED, L::TRANSFER_SRC_OPTIMAL) => {
            (A::empty(), A::TRANSFER_READ, S::TOP_OF_PIPE, S::TRANSFER)
        }
        (L::UNDEFINED, L::GENERAL) => (A::empty(), A::empty(), S::TOP_OF_PIPE, S::TOP_OF_PIPE),
        (L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::empty(), A::SHADER_READ, S::TOP_OF_PIPE, S::FRAGMENT_SHADER)
        }
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => {
            (A::empty(), A::COLOR_ATTACHMENT_WRITE, S::TOP_OF_PIPE, S::COLOR_ATTACHMENT_OUTPUT)
        }
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::EARLY_FRAGMENT_TESTS,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::SHADER_READ, S::TRANSFER, S::FRAGMENT_SHADER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::TRANSFER_READ, S::TRANSFER, S::TRANSFER)
        }
        (L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (A::COLOR_ATTACHMENT_WRITE, A::TRANSFER_READ, S::COLOR_ATTACHMENT_OUTPUT, S::TRANSFER)
        }
        (L::TRANSFER_SRC_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL) => {
            (A::TRANSFER_READ, A::COLOR_ATTACHMENT_WRITE, S::TRANSFER, S::COLOR_ATTACHMENT_OUTPUT)
        }
        (a, b) if a == b => (A::empty(), A::empty(), S::TOP_OF_PIPE, S::BOTTOM_OF_PIPE),
        (a, b) => return Err(crate::error::Error::UnsupportedLayoutTransition(a, b)),
    })
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe { self.gpu.device().destroy_image_view(self.view, None) };
        if let Some(allocation) = self.allocation.take() {
            let _ = self.gpu.allocator().write().free(allocation);
        }
        unsafe { self.gpu.device().destroy_image(self.image, None) };
    }
}

impl AsRef<vk::Image> for Image {
    fn as_ref(&self) -> &vk::Image {
        &self.image
    }
}

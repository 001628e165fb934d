//! Raw buffer wrapper (C2): a `vk::Buffer` plus its `gpu_allocator` allocation, sized and typed
//! per the creation request.

use crate::error::{Error, Result};
use crate::gpu::SharedGpu;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc};
use gpu_allocator::MemoryLocation;
use log::info;

/// The purpose a buffer was created for; determines its Vulkan usage flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    Staging,
    Vertex,
    Index,
    Uniform,
    Storage,
    /// A uniform buffer created host-visible from the start, bypassing staging entirely.
    UniformMappable,
}

impl BufferType {
    fn usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as U;
        let base = match self {
            BufferType::Staging => U::TRANSFER_SRC,
            BufferType::Vertex => U::VERTEX_BUFFER,
            BufferType::Index => U::INDEX_BUFFER,
            BufferType::Uniform | BufferType::UniformMappable => U::UNIFORM_BUFFER,
            BufferType::Storage => U::STORAGE_BUFFER,
        };
        // Every non-staging buffer can be a copy source/destination, since resize and
        // the dup engine both move bytes through a GPU-side buffer copy.
        if self == BufferType::Staging {
            base
        } else {
            base | U::TRANSFER_SRC | U::TRANSFER_DST
        }
    }

    /// Staging and `UniformMappable` buffers are always host-visible irrespective of the
    /// `mappable` flag requested by the caller.
    pub fn forces_mappable(self) -> bool {
        matches!(self, BufferType::Staging | BufferType::UniformMappable)
    }
}

/// A raw GPU buffer: fixed Vulkan usage, variable size, optionally host-visible.
pub struct Buffer {
    gpu: SharedGpu,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    ty: BufferType,
    mappable: bool,
    size: vk::DeviceSize,
    alignment: vk::DeviceSize,
}

impl Buffer {
    pub fn new(gpu: &SharedGpu, ty: BufferType, mappable: bool, size: vk::DeviceSize) -> Result<Self> {
        let mappable = mappable || ty.forces_mappable();
        let device = gpu.device();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size.max(1))
            .usage(ty.usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let location = if mappable { MemoryLocation::CpuToGpu } else { MemoryLocation::GpuOnly };

        let allocation = gpu.allocator().write().allocate(&AllocationCreateDesc {
            name: "gpu-core buffer",
            requirements,
            location,
            linear: true,
        })?;

        unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())? };

        Ok(Self {
            gpu: gpu.clone(),
            buffer,
            allocation: Some(allocation),
            ty,
            mappable,
            size,
            alignment: requirements.alignment,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn ty(&self) -> BufferType {
        self.ty
    }

    pub fn is_mappable(&self) -> bool {
        self.mappable
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn alignment(&self) -> vk::DeviceSize {
        self.alignment
    }

    /// Returns the persistently mapped pointer, if this buffer is host-visible.
    pub fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        self.allocation.as_ref().and_then(|a| a.mapped_ptr())
    }

    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<()> {
        let allocation = self.allocation.as_ref().expect("buffer allocation freed");
        unsafe {
            self.gpu.device().flush_mapped_memory_ranges(&[vk::MappedMemoryRange::builder()
                .memory(allocation.memory())
                .offset(allocation.offset() + offset)
                .size(size)
                .build()])?
        };
        Ok(())
    }

    /// Maps (if not persistently mapped already), copies `data` to `offset`, and flushes.
    ///
    /// The executor for [`crate::transfer::task::Task::BufferUpload`] (C8) calls this; it
    /// assumes the buffer is host-visible, per spec.md §4.8.
    pub fn upload(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        if offset + data.len() as vk::DeviceSize > self.size {
            return Err(Error::BufferOverflow { size: offset + data.len() as vk::DeviceSize, max_size: self.size });
        }
        let ptr = self.mapped_ptr().expect("upload on a non-mappable buffer");
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), (ptr.as_ptr() as *mut u8).add(offset as usize), data.len());
        }
        self.flush(offset, data.len() as vk::DeviceSize)
    }

    /// Symmetric to [`Buffer::upload`]: reads `size` bytes back out of mapped memory.
    pub fn download(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<Vec<u8>> {
        if offset + size > self.size {
            return Err(Error::BufferOverflow { size: offset + size, max_size: self.size });
        }
        let ptr = self.mapped_ptr().expect("download from a non-mappable buffer");
        let mut out = vec![0u8; size as usize];
        unsafe {
            std::ptr::copy_nonoverlapping((ptr.as_ptr() as *const u8).add(offset as usize), out.as_mut_ptr(), size as usize);
        }
        Ok(out)
    }

    /// Grows the buffer to `new_size`, preserving existing contents via a GPU-side copy through a
    /// throwaway command buffer (spec.md §4.2). An image's `resize` drops contents; a buffer's
    /// does not.
    ///
    /// The caller (C4's allocator pool) must not hold any command recording mid-flight when this
    /// runs: it issues its own single-time command buffer on the transfer queue.
    pub fn resize(&mut self, new_size: vk::DeviceSize) -> Result<()> {
        if new_size <= self.size {
            return Ok(());
        }
        info!("resizing {:?} buffer from {} to {new_size} bytes", self.ty, self.size);

        let mut new_buffer = Buffer::new(&self.gpu, self.ty, self.mappable, new_size)?;

        self.gpu.transfer_pool().single_time_command(self.gpu.transfer_queue(), |cmd| {
            cmd.copy_buffer(
                self.buffer,
                new_buffer.buffer,
                &[vk::BufferCopy { src_offset: 0, dst_offset: 0, size: self.size }],
            );
        })?;

        std::mem::swap(self, &mut new_buffer);
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let _ = self.gpu.allocator().write().free(allocation);
        }
        unsafe { self.gpu.device().destroy_buffer(self.buffer, None) };
    }
}

impl AsRef<vk::Buffer> for Buffer {
    fn as_ref(&self) -> &vk::Buffer {
        &self.buffer
    }
}

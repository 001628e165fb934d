//! Buffer-Type Allocator Pool (C4): one [`Allocator`] (C1) per `(BufferType, mappable)` pair,
//! each bound to a lazily-created shared backing [`Buffer`].
//!
//! Grounded on `datalloc.c`/`datalloc.h`: the original builds one `DvzAlloc` per pair eagerly at
//! context creation (`dvz_datalloc`) and only creates the backing buffer lazily on first use.
//! SPEC_FULL.md §11 keeps that split: the (cheap, GPU-resource-free) [`Allocator`] entries exist
//! from construction, the shared [`Buffer`] itself is created on the first `alloc` for that pair.

use crate::alloc::Allocator;
use crate::error::{Error, Result};
use crate::gpu::SharedGpu;
use crate::handle::BufferHandle;
use crate::registry::Registry;
use crate::resources::{Buffer, BufferType};
use ash::vk;
use log::info;
use std::collections::HashMap;

/// `(type, mappable)` — staging is always mappable, so `(Staging, false)` never occurs; the
/// pool coalesces it onto `(Staging, true)` per spec.md §4.4.
type PoolKey = (BufferType, bool);

struct PoolEntry {
    allocator: Allocator,
    buffer: Option<BufferHandle>,
}

pub struct BufferAllocatorPool {
    entries: HashMap<PoolKey, PoolEntry>,
    default_buffer_size: vk::DeviceSize,
}

fn normalize(ty: BufferType, mappable: bool) -> PoolKey {
    (ty, mappable || ty.forces_mappable())
}

impl BufferAllocatorPool {
    pub fn new(default_buffer_size: vk::DeviceSize) -> Self {
        let mut entries = HashMap::new();
        for ty in [
            BufferType::Staging,
            BufferType::Vertex,
            BufferType::Index,
            BufferType::Uniform,
            BufferType::Storage,
            BufferType::UniformMappable,
        ] {
            for mappable in [false, true] {
                let key = normalize(ty, mappable);
                entries.entry(key).or_insert_with(|| PoolEntry { allocator: Allocator::new(0, 0), buffer: None });
            }
        }
        Self { entries, default_buffer_size }
    }

    /// Ensures the shared `(type, mappable)` buffer exists, creating it at the pool's default
    /// size on first use, and returns its handle and reported memory alignment. Dat construction
    /// (C5) needs the alignment up front to compute a sub-slice's `aligned_size` before it knows
    /// how many bytes to actually request from the allocator.
    pub fn ensure_buffer(
        &mut self,
        gpu: &SharedGpu,
        registry: &mut Registry,
        ty: BufferType,
        mappable: bool,
    ) -> Result<(BufferHandle, vk::DeviceSize)> {
        let key = normalize(ty, mappable);
        let entry = self.entries.get_mut(&key).expect("pool pre-populates every (type, mappable) pair");

        let handle = match entry.buffer {
            Some(handle) => handle,
            None => {
                let buffer = Buffer::new(gpu, key.0, key.1, self.default_buffer_size)?;
                entry.allocator = Allocator::new(buffer.size(), buffer.alignment());
                let handle = registry.insert_buffer(buffer);
                entry.buffer = Some(handle);
                handle
            }
        };

        let alignment = registry.buffer(handle).expect("pool-owned buffer handle is always live").alignment();
        Ok((handle, alignment))
    }

    /// Sub-allocates `req_size` bytes from the shared `(type, mappable)` buffer, creating or
    /// growing it as needed. Returns the buffer the region lives in and the offset within it.
    pub fn alloc(
        &mut self,
        gpu: &SharedGpu,
        registry: &mut Registry,
        ty: BufferType,
        mappable: bool,
        req_size: vk::DeviceSize,
    ) -> Result<(BufferHandle, vk::DeviceSize)> {
        if req_size == 0 {
            return Err(Error::ZeroSizeRequest);
        }

        let key = normalize(ty, mappable);
        let (buffer_handle, _) = self.ensure_buffer(gpu, registry, ty, mappable)?;
        let entry = self.entries.get_mut(&key).expect("pool pre-populates every (type, mappable) pair");

        let (offset, grew_to) = entry.allocator.alloc(req_size);
        if let Some(new_total) = grew_to {
            let buffer = registry.buffer_mut(buffer_handle).expect("pool-owned buffer handle is always live");
            info!("growing shared {:?} buffer to {new_total} bytes to satisfy a {req_size}-byte request", key.0);
            buffer.resize(new_total)?;
        }

        Ok((buffer_handle, offset))
    }

    pub fn dealloc(&mut self, ty: BufferType, mappable: bool, offset: vk::DeviceSize) {
        let key = normalize(ty, mappable);
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.allocator.free(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_coalesces_staging_onto_mappable() {
        assert_eq!(normalize(BufferType::Staging, false), (BufferType::Staging, true));
        assert_eq!(normalize(BufferType::Staging, true), (BufferType::Staging, true));
        assert_eq!(normalize(BufferType::UniformMappable, false), (BufferType::UniformMappable, true));
        assert_eq!(normalize(BufferType::Vertex, false), (BufferType::Vertex, false));
    }
}

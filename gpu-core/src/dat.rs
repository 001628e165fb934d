//! Dat (C5): a sub-allocated region inside a shared or standalone buffer, with an optional
//! persistent staging companion and optional per-swapchain-image duplication.
//!
//! Grounded on `resources.h`'s `DvzDat` (`DvzBufferRegions br` plus a `DvzDat* stg` companion) and
//! `resources.h`'s `DvzDatOptions` flag bits. Per SPEC_FULL.md's Design Notes, the companion
//! staging Dat is an owned `Box<Dat>`, not a sibling registry entry — this breaks the cyclic
//! reference the original's pointer pair forms, statically, instead of relying on destruction
//! order alone.

use crate::handle::BufferHandle;
use crate::resources::BufferType;
use ash::vk::DeviceSize;
use bitflags::bitflags;
use smallvec::SmallVec;

bitflags! {
    /// Dat creation flags (spec.md §6). Four independent axes: ownership, mappability,
    /// duplication, resize behavior, plus one orthogonal axis (staging persistence).
    #[derive(Default)]
    pub struct DatFlags: u32 {
        /// Backing buffer is dedicated to this Dat; otherwise shared with others of the same
        /// `(type, mappable)`.
        const STANDALONE = 0b0000_0001;
        /// Backing buffer is host-visible; uploads bypass staging.
        const MAPPABLE = 0b0000_0010;
        /// Region has one sub-slice per swapchain image; uploads go through the dup engine.
        const DUP = 0b0000_0100;
        /// Resize preserves contents (by staging round-trip); otherwise contents are undefined
        /// after resize. See SPEC_FULL.md §9's open-question resolution in `DESIGN.md`.
        const KEEP_ON_RESIZE = 0b0000_1000;
        /// Non-mappable Dats keep their companion staging Dat for the Dat's lifetime instead of
        /// creating and destroying one per transfer.
        const PERSISTENT_STAGING = 0b0001_0000;
    }
}

/// An addressable slice of a [`crate::resources::Buffer`] (§3's "Buffer Region").
///
/// `count > 1` denotes a multi-buffered region occupying `count` equally-sized aligned
/// sub-slices of the same buffer: `offsets[i] = offsets[0] + i * aligned_size`.
#[derive(Debug, Clone)]
pub struct BufferRegion {
    pub buffer: BufferHandle,
    pub count: u32,
    pub size: DeviceSize,
    pub aligned_size: DeviceSize,
    pub alignment: DeviceSize,
    pub offsets: SmallVec<[DeviceSize; 4]>,
}

impl BufferRegion {
    pub fn offset(&self, sub_slice: u32) -> DeviceSize {
        self.offsets[sub_slice as usize]
    }
}

pub struct Dat {
    pub(crate) flags: DatFlags,
    pub(crate) ty: BufferType,
    pub(crate) region: BufferRegion,
    /// Owned, not a registry sibling: breaks the Dat/staging-Dat reference cycle statically.
    pub(crate) staging: Option<Box<Dat>>,
}

impl Dat {
    pub fn flags(&self) -> DatFlags {
        self.flags
    }

    pub fn is_mappable(&self) -> bool {
        self.flags.contains(DatFlags::MAPPABLE)
    }

    pub fn is_standalone(&self) -> bool {
        self.flags.contains(DatFlags::STANDALONE)
    }

    pub fn is_dup(&self) -> bool {
        self.flags.contains(DatFlags::DUP)
    }

    pub fn ty(&self) -> BufferType {
        self.ty
    }

    pub fn region(&self) -> &BufferRegion {
        &self.region
    }

    pub fn size(&self) -> DeviceSize {
        self.region.size
    }

    pub fn buffer(&self) -> BufferHandle {
        self.region.buffer
    }

    pub fn staging(&self) -> Option<&Dat> {
        self.staging.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_region_offsets_follow_aligned_stride() {
        let region = BufferRegion {
            buffer: Default::default(),
            count: 3,
            size: 16,
            aligned_size: 32,
            alignment: 32,
            offsets: (0..3).map(|i| i as DeviceSize * 32).collect(),
        };
        for i in 0..3u32 {
            assert_eq!(region.offset(i), region.offsets[0] + i as DeviceSize * region.aligned_size);
        }
    }

    #[test]
    fn flag_axes_are_independent_bits() {
        let f = DatFlags::MAPPABLE | DatFlags::DUP;
        assert!(f.contains(DatFlags::MAPPABLE));
        assert!(f.contains(DatFlags::DUP));
        assert!(!f.contains(DatFlags::STANDALONE));
        assert!(!f.contains(DatFlags::PERSISTENT_STAGING));
    }
}

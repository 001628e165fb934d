//! Resource Registry (C3): the single owner of every raw resource, Dat and Tex.
//!
//! Grounded on `ivy-resources`' `ResourceCache<T>` (a `SlotMap<Handle<T>, T>` per entity kind),
//! narrowed from its generic form to the five concrete containers this crate needs. Destruction
//! order follows spec.md §4.3 / §9: Dats (they reference buffer regions on shared buffers) before
//! Texs, before Samplers, before Images, before Buffers. The original `resources.c` also destroys
//! a `Computes` container in this sequence; this crate does not model compute pipelines (they are
//! a higher layer's concern), so that step is simply absent.

use crate::dat::Dat;
use crate::handle::{BufferHandle, DatHandle, ImageHandle, SamplerHandle, TexHandle};
use crate::resources::buffer::Buffer;
use crate::resources::image::Image;
use crate::resources::sampler::Sampler;
use crate::tex::Tex;
use log::warn;
use slotmap::SlotMap;

#[derive(Default)]
pub struct Registry {
    pub(crate) buffers: SlotMap<BufferHandle, Buffer>,
    pub(crate) images: SlotMap<ImageHandle, Image>,
    pub(crate) samplers: SlotMap<SamplerHandle, Sampler>,
    pub(crate) dats: SlotMap<DatHandle, Dat>,
    pub(crate) texs: SlotMap<TexHandle, Tex>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&Buffer> {
        self.buffers.get(handle)
    }

    pub fn buffer_mut(&mut self, handle: BufferHandle) -> Option<&mut Buffer> {
        self.buffers.get_mut(handle)
    }

    pub fn image(&self, handle: ImageHandle) -> Option<&Image> {
        self.images.get(handle)
    }

    pub fn image_mut(&mut self, handle: ImageHandle) -> Option<&mut Image> {
        self.images.get_mut(handle)
    }

    pub fn sampler(&self, handle: SamplerHandle) -> Option<&Sampler> {
        self.samplers.get(handle)
    }

    pub fn dat(&self, handle: DatHandle) -> Option<&Dat> {
        self.dats.get(handle)
    }

    pub fn dat_mut(&mut self, handle: DatHandle) -> Option<&mut Dat> {
        self.dats.get_mut(handle)
    }

    pub fn tex(&self, handle: TexHandle) -> Option<&Tex> {
        self.texs.get(handle)
    }

    pub fn tex_mut(&mut self, handle: TexHandle) -> Option<&mut Tex> {
        self.texs.get_mut(handle)
    }

    pub fn insert_buffer(&mut self, buffer: Buffer) -> BufferHandle {
        self.buffers.insert(buffer)
    }

    pub fn remove_buffer(&mut self, handle: BufferHandle) -> Option<Buffer> {
        self.buffers.remove(handle)
    }

    pub fn insert_image(&mut self, image: Image) -> ImageHandle {
        self.images.insert(image)
    }

    pub fn remove_image(&mut self, handle: ImageHandle) -> Option<Image> {
        self.images.remove(handle)
    }

    pub fn insert_sampler(&mut self, sampler: Sampler) -> SamplerHandle {
        self.samplers.insert(sampler)
    }

    pub fn insert_dat(&mut self, dat: Dat) -> DatHandle {
        self.dats.insert(dat)
    }

    pub fn remove_dat(&mut self, handle: DatHandle) -> Option<Dat> {
        self.dats.remove(handle)
    }

    pub fn insert_tex(&mut self, tex: Tex) -> TexHandle {
        self.texs.insert(tex)
    }

    pub fn remove_tex(&mut self, handle: TexHandle) -> Option<Tex> {
        self.texs.remove(handle)
    }

    /// Destroys every entity in the fixed order the core's ownership model requires, logging a
    /// count of anything the caller forgot to free explicitly.
    pub fn destroy(&mut self) {
        log_leaks("Dat", self.dats.len());
        self.dats.clear();

        log_leaks("Tex", self.texs.len());
        self.texs.clear();

        log_leaks("Sampler", self.samplers.len());
        self.samplers.clear();

        log_leaks("Image", self.images.len());
        self.images.clear();

        log_leaks("Buffer", self.buffers.len());
        self.buffers.clear();
    }
}

fn log_leaks(kind: &str, count: usize) {
    if count > 0 {
        warn!("destroying registry with {count} live {kind}(s) the caller never freed");
    }
}

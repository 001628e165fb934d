//! Context Facade (C10): the crate's single entry point, owning the registry, the buffer
//! allocator pool, and the transfer pipeline.
//!
//! Grounded on `ivy-vulkan`'s `VulkanContext`/`Gpu` relationship, generalized per SPEC_FULL.md §9:
//! no process-wide singleton, an explicit value a caller threads through their own API, with every
//! piece of mutable state (registry, allocator pool, transfer queues) reachable only through it.

use crate::alloc::align_up;
use crate::buffer_pool::BufferAllocatorPool;
use crate::dat::{BufferRegion, Dat, DatFlags};
use crate::error::{Error, Result};
use crate::extent::{Dims, Shape};
use crate::gpu::SharedGpu;
use crate::handle::{BufferHandle, DatHandle, ImageHandle, SamplerHandle, TexHandle};
use crate::registry::Registry;
use crate::resources::{Buffer, BufferType, Image, Sampler, SamplerInfo};
use crate::tex::{Tex, TexFlags};
use crate::transfer::{executor, run_chain_sync, Domain, Queued, Task, Transfers};
use ash::vk;
use crossbeam_channel::{bounded, Receiver};
use log::{error, trace, warn};
use parking_lot::RwLock;
use std::sync::Arc;

/// Tunables `spec.md` §9's Open Questions leave to the implementer (SPEC_FULL.md §10.3).
#[derive(Debug, Clone, Copy)]
pub struct ContextConfig {
    /// Size a shared `(type, mappable)` buffer is first created at.
    pub default_buffer_size: vk::DeviceSize,
    /// Swapchain image count assumed for a `DUP` Dat created before the real count is known.
    pub max_swapchain_images: usize,
    /// Fixed capacity of the dup slot table (C9).
    pub dup_capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { default_buffer_size: 1024 * 1024, max_swapchain_images: 8, dup_capacity: 256 }
    }
}

pub struct Context {
    gpu: SharedGpu,
    registry: Arc<RwLock<Registry>>,
    buffer_pool: BufferAllocatorPool,
    transfers: Transfers,
    config: ContextConfig,
    swapchain_count: Option<usize>,
}

impl Context {
    pub fn new(gpu: SharedGpu, config: ContextConfig) -> Self {
        trace!("creating context");
        let registry = Arc::new(RwLock::new(Registry::new()));
        let transfers = Transfers::new(gpu.clone(), registry.clone(), config.dup_capacity, config.max_swapchain_images);
        Self { gpu, registry, buffer_pool: BufferAllocatorPool::new(config.default_buffer_size), transfers, config, swapchain_count: None }
    }

    /// Informs the context of the real swapchain image count, once a windowing layer knows it.
    /// `DUP` Dats created before this call use `config.max_swapchain_images` as a fallback.
    pub fn set_swapchain_count(&mut self, count: usize) {
        self.swapchain_count = Some(count);
        self.transfers.set_swapchain_count(count);
    }

    fn dup_count(&self) -> usize {
        self.swapchain_count.unwrap_or_else(|| {
            warn!("DUP Dat created before swapchain count is known; defaulting to {}", self.config.max_swapchain_images);
            self.config.max_swapchain_images
        })
    }

    // ---- Dat (C5) ----------------------------------------------------------------------------

    pub fn dat(&mut self, ty: BufferType, size: vk::DeviceSize, flags: DatFlags) -> Option<DatHandle> {
        match self.try_create_dat(ty, size, flags) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("dat() failed: {e}");
                None
            }
        }
    }

    fn try_create_dat(&mut self, ty: BufferType, size: vk::DeviceSize, flags: DatFlags) -> Result<DatHandle> {
        if size == 0 {
            return Err(Error::ZeroSizeRequest);
        }

        let mappable = flags.contains(DatFlags::MAPPABLE);
        let dup = flags.contains(DatFlags::DUP);
        let count = if dup { self.dup_count() as u32 } else { 1 };

        let region = self.alloc_region(ty, mappable, flags.contains(DatFlags::STANDALONE), size, count)?;

        let mut dat = Dat { flags, ty, region, staging: None };

        if flags.contains(DatFlags::PERSISTENT_STAGING) && !mappable {
            dat.staging = Some(Box::new(self.alloc_staging(size)?));
        }

        Ok(self.registry.write().insert_dat(dat))
    }

    /// Shared implementation for both fresh Dat creation and resize: allocates a `count`-wide
    /// region of `size` bytes each, either from a dedicated buffer (`standalone`) or from the
    /// shared `(type, mappable)` buffer via C4.
    fn alloc_region(&mut self, ty: BufferType, mappable: bool, standalone: bool, size: vk::DeviceSize, count: u32) -> Result<BufferRegion> {
        if standalone {
            let buffer = Buffer::new(&self.gpu, ty, mappable, size * count as vk::DeviceSize)?;
            let handle = self.registry.write().insert_buffer(buffer);
            return Ok(BufferRegion {
                buffer: handle,
                count,
                size,
                aligned_size: size,
                alignment: 0,
                offsets: (0..count).map(|i| i as vk::DeviceSize * size).collect(),
            });
        }

        let mut registry = self.registry.write();
        let (_, alignment) = self.buffer_pool.ensure_buffer(&self.gpu, &mut registry, ty, mappable)?;
        let aligned_size = align_up(size, alignment);
        let (buffer, base) = self.buffer_pool.alloc(&self.gpu, &mut registry, ty, mappable, aligned_size * count as vk::DeviceSize)?;
        Ok(BufferRegion {
            buffer,
            count,
            size,
            aligned_size,
            alignment,
            offsets: (0..count).map(|i| base + i as vk::DeviceSize * aligned_size).collect(),
        })
    }

    /// Allocates a standalone, mappable, single-sub-slice staging [`Dat`] (spec.md §4.5 steps 3-4).
    fn alloc_staging(&mut self, size: vk::DeviceSize) -> Result<Dat> {
        let region = self.alloc_region(BufferType::Staging, true, false, size, 1)?;
        Ok(Dat { flags: DatFlags::MAPPABLE, ty: BufferType::Staging, region, staging: None })
    }

    pub fn dat_resize(&mut self, handle: DatHandle, new_size: vk::DeviceSize) {
        if let Err(e) = self.try_dat_resize(handle, new_size) {
            error!("dat_resize failed: {e}");
        }
    }

    fn try_dat_resize(&mut self, handle: DatHandle, new_size: vk::DeviceSize) -> Result<()> {
        let (ty, mappable, standalone, keep, old_region) = {
            let registry = self.registry.read();
            let dat = registry.dat(handle).ok_or(Error::InvalidHandle("Dat"))?;
            (dat.ty, dat.is_mappable(), dat.is_standalone(), dat.flags().contains(DatFlags::KEEP_ON_RESIZE), dat.region().clone())
        };
        if new_size == old_region.size {
            return Ok(());
        }

        if !standalone {
            self.buffer_pool.dealloc(ty, mappable, old_region.offsets[0]);
        }
        let new_region = self.alloc_region(ty, mappable, standalone, new_size, old_region.count)?;

        // "keep-on-resize": spec.md §9 leaves this open; this crate honors the flag literally by
        // copying each old sub-slice into the new region before the old buffer goes away. See
        // DESIGN.md.
        if keep {
            let copy_size = old_region.size.min(new_size);
            for i in 0..old_region.count {
                let task = Task::BufferCopy {
                    src: old_region.buffer,
                    src_offset: old_region.offset(i),
                    dst: new_region.buffer,
                    dst_offset: new_region.offset(i),
                    size: copy_size,
                };
                executor::execute(&self.gpu, &self.registry, &task)?;
            }
        }

        if standalone {
            self.registry.write().remove_buffer(old_region.buffer);
        }

        let staging_old_region = {
            let registry = self.registry.read();
            registry.dat(handle).and_then(|d| d.staging()).map(|s| (s.ty, s.is_mappable(), s.is_standalone(), s.region().clone()))
        };
        let new_staging_region = match staging_old_region {
            Some((s_ty, s_mappable, s_standalone, s_old_region)) => {
                if !s_standalone {
                    self.buffer_pool.dealloc(s_ty, s_mappable, s_old_region.offsets[0]);
                }
                Some(self.alloc_region(s_ty, s_mappable, s_standalone, new_size, s_old_region.count)?)
            }
            None => None,
        };

        let mut registry = self.registry.write();
        let dat = registry.dat_mut(handle).ok_or(Error::InvalidHandle("Dat"))?;
        dat.region = new_region;
        if let (Some(staging), Some(new_staging_region)) = (dat.staging.as_mut(), new_staging_region) {
            staging.region = new_staging_region;
        }
        Ok(())
    }

    /// Returns the Dat's existing companion staging region if one is already cached
    /// (`PERSISTENT_STAGING`), or allocates and caches a fresh one. Returns `None` for the region
    /// slot that should be torn down after the pending transfer instead of kept — the caller owns
    /// that teardown via the completion event.
    fn ensure_staging(&mut self, handle: DatHandle, size: vk::DeviceSize) -> Result<(BufferRegion, Option<Dat>)> {
        let existing = {
            let registry = self.registry.read();
            registry.dat(handle).ok_or(Error::InvalidHandle("Dat"))?.staging().map(|s| s.region().clone())
        };
        if let Some(region) = existing {
            return Ok((region, None));
        }

        let staging = self.alloc_staging(size)?;
        let region = staging.region().clone();

        let persistent = self.registry.read().dat(handle).map(|d| d.flags().contains(DatFlags::PERSISTENT_STAGING)).unwrap_or(false);
        if persistent {
            self.registry.write().dat_mut(handle).ok_or(Error::InvalidHandle("Dat"))?.staging = Some(Box::new(staging));
            Ok((region, None))
        } else {
            Ok((region, Some(staging)))
        }
    }

    /// `wait`: per spec.md §6, blocks until the upload has fully landed instead of handing it off
    /// to the worker thread / next `frame()` call. Not meaningful for a `DUP` Dat — its sub-slices
    /// only get updated one at a time, across future `frame(image_index)` calls, so there is
    /// nothing to synchronously wait for; `wait` is ignored (with a log) in that case. See
    /// DESIGN.md.
    pub fn dat_upload(&mut self, handle: DatHandle, offset: vk::DeviceSize, data: &[u8], wait: bool) {
        if let Err(e) = self.try_dat_upload(handle, offset, data, wait) {
            error!("dat_upload failed: {e}");
        }
    }

    /// Implements spec.md §4.5's upload path, including the dup-routing carve-out in
    /// SPEC_FULL.md §11 ("`transfers_utils.h`'s task-local `is_dup` routing").
    fn try_dat_upload(&mut self, handle: DatHandle, offset: vk::DeviceSize, data: &[u8], wait: bool) -> Result<()> {
        let (mappable, is_dup, region) = {
            let registry = self.registry.read();
            let dat = registry.dat(handle).ok_or(Error::InvalidHandle("Dat"))?;
            (dat.is_mappable(), dat.is_dup(), dat.region().clone())
        };

        if mappable {
            if is_dup {
                if wait {
                    warn!("dat_upload: wait=true has no synchronous meaning for a DUP region; queuing for frame() to apply instead");
                }
                self.transfers.push(Domain::Dup, Queued::new(Task::DupUpload { dat: handle, offset, data: data.to_vec() }));
                return Ok(());
            }
            let task = Task::BufferUpload { buffer: region.buffer, offset: region.offsets[0] + offset, data: data.to_vec() };
            return self.dispatch(Domain::Copy, Queued::new(task), wait);
        }

        let (staging_region, transient) = self.ensure_staging(handle, data.len() as vk::DeviceSize)?;
        let upload_task = Task::BufferUpload { buffer: staging_region.buffer, offset: staging_region.offsets[0], data: data.to_vec() };

        if is_dup {
            if wait {
                warn!("dat_upload: wait=true has no synchronous meaning for a DUP region; queuing for frame() to apply instead");
            }
            let dup_copy = Task::DupCopy {
                staging: staging_region.buffer,
                staging_offset: staging_region.offsets[0],
                dat: handle,
                offset,
                size: data.len() as vk::DeviceSize,
            };
            // `UploadDone` must hang off the `DupCopy`'s own tail, not the upload's — chaining it
            // onto `upload_task` directly would overwrite the `Domain::Dup` follow-up that carries
            // `dup_copy`, since a `Queued` only has one `next`. Building the inner chain first and
            // handing the whole thing to `upload_task` as its single follow-up keeps both steps.
            let mut dup_copy_queued = Queued::new(dup_copy);
            if let Some(transient) = transient {
                dup_copy_queued = dup_copy_queued.then(Domain::Event, Task::UploadDone { transient_staging: Some(Box::new(transient)), ok: true });
            }
            self.transfers.push(Domain::Upload, Queued::new(upload_task).chain(Domain::Dup, dup_copy_queued));
            return Ok(());
        }

        let copy_task = Task::BufferCopy {
            src: staging_region.buffer,
            src_offset: staging_region.offsets[0],
            dst: region.buffer,
            dst_offset: region.offsets[0] + offset,
            size: data.len() as vk::DeviceSize,
        };
        let mut copy_queued = Queued::new(copy_task);
        if let Some(transient) = transient {
            copy_queued = copy_queued.then(Domain::Event, Task::UploadDone { transient_staging: Some(Box::new(transient)), ok: true });
        }

        self.dispatch(Domain::Upload, Queued::new(upload_task).chain(Domain::Copy, copy_queued), wait)
    }

    /// Pushes `queued` onto `initial_domain` for the worker/main thread to drain later, or — when
    /// `wait` is set — runs the whole chain inline on the calling thread and returns only once it
    /// has fully landed, routing its terminal task through the same handling `frame`'s Event drain
    /// would have given it (so a chain ending in `UploadDone`/`DownloadDone` still tears down its
    /// transient staging).
    fn dispatch(&mut self, initial_domain: Domain, queued: Queued, wait: bool) -> Result<()> {
        if wait {
            let (_, terminal) = run_chain_sync(&self.gpu, &self.registry, queued)?;
            self.handle_event(terminal);
            Ok(())
        } else {
            self.transfers.push(initial_domain, queued);
            Ok(())
        }
    }

    pub fn dat_download(&mut self, handle: DatHandle, offset: vk::DeviceSize, size: vk::DeviceSize) -> Option<Receiver<Vec<u8>>> {
        match self.try_dat_download(handle, offset, size) {
            Ok(rx) => Some(rx),
            Err(e) => {
                error!("dat_download failed: {e}");
                None
            }
        }
    }

    fn try_dat_download(&mut self, handle: DatHandle, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<Receiver<Vec<u8>>> {
        let (mappable, region) = {
            let registry = self.registry.read();
            let dat = registry.dat(handle).ok_or(Error::InvalidHandle("Dat"))?;
            (dat.is_mappable(), dat.region().clone())
        };

        let (tx, rx) = bounded(1);

        if mappable {
            let task = Task::BufferDownload { buffer: region.buffer, offset: region.offsets[0] + offset, size, result: tx };
            let done = Task::DownloadDone { size, data: Vec::new(), ok: true, transient_staging: None };
            self.transfers.push(Domain::Copy, Queued::new(task).then(Domain::Event, done));
            return Ok(rx);
        }

        let (staging_region, transient) = self.ensure_staging(handle, size)?;
        let copy_task = Task::BufferCopy {
            src: region.buffer,
            src_offset: region.offsets[0] + offset,
            dst: staging_region.buffer,
            dst_offset: staging_region.offsets[0],
            size,
        };
        let download_task = Task::BufferDownload { buffer: staging_region.buffer, offset: staging_region.offsets[0], size, result: tx };
        let done = Task::DownloadDone { size, data: Vec::new(), ok: true, transient_staging: transient.map(Box::new) };

        self.transfers.push(Domain::Copy, Queued::new(copy_task).chain(Domain::Copy, Queued::new(download_task).then(Domain::Event, done)));
        Ok(rx)
    }

    pub fn dat_destroy(&mut self, handle: DatHandle) {
        let Some(dat) = self.registry.write().remove_dat(handle) else {
            error!("dat_destroy called on an unknown or already-freed handle");
            return;
        };
        self.release_dat(dat);
    }

    /// Releases a Dat's backing storage and, recursively, its companion staging Dat's. Takes the
    /// Dat by value since the staging companion is an owned `Box<Dat>`, not a registry entry.
    fn release_dat(&mut self, dat: Dat) {
        let standalone = dat.is_standalone();
        let ty = dat.ty();
        let mappable = dat.is_mappable();
        let offset = dat.region().offsets[0];
        let buffer = dat.region().buffer;

        if standalone {
            self.registry.write().remove_buffer(buffer);
        } else {
            self.buffer_pool.dealloc(ty, mappable, offset);
        }

        if let Some(staging) = dat.staging {
            self.release_dat(*staging);
        }
    }

    // ---- Tex (C6) -----------------------------------------------------------------------------

    pub fn tex(&mut self, dims: Dims, shape: Shape, format: vk::Format, flags: TexFlags) -> Option<TexHandle> {
        match self.try_create_tex(dims, shape, format, flags) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("tex() failed: {e}");
                None
            }
        }
    }

    fn try_create_tex(&mut self, dims: Dims, shape: Shape, format: vk::Format, flags: TexFlags) -> Result<TexHandle> {
        if !shape.validate(dims) {
            return Err(Error::ZeroSizeRequest);
        }
        let usage = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED;
        let image = Image::new(&self.gpu, dims, shape, format, usage, vk::ImageTiling::OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
        let image_handle = self.registry.write().insert_image(image);
        Ok(self.registry.write().insert_tex(Tex { dims, shape, format, flags, image: image_handle, staging: None }))
    }

    pub fn tex_resize(&mut self, handle: TexHandle, new_shape: Shape) {
        if let Err(e) = self.try_tex_resize(handle, new_shape) {
            error!("tex_resize failed: {e}");
        }
    }

    fn try_tex_resize(&mut self, handle: TexHandle, new_shape: Shape) -> Result<()> {
        let image_handle = {
            let registry = self.registry.read();
            let tex = registry.tex(handle).ok_or(Error::InvalidHandle("Tex"))?;
            if !new_shape.validate(tex.dims()) {
                return Err(Error::ZeroSizeRequest);
            }
            tex.image()
        };

        self.registry.write().image_mut(image_handle).ok_or(Error::InvalidHandle("Image"))?.resize(new_shape)?;
        self.registry.write().tex_mut(handle).ok_or(Error::InvalidHandle("Tex"))?.shape = new_shape;
        Ok(())
    }

    /// `wait`: see [`Context::dat_upload`]; a Tex upload never routes through the dup engine, so
    /// this one always has a synchronous meaning.
    pub fn tex_upload(&mut self, handle: TexHandle, image_offset: Shape, shape: Shape, data: &[u8], wait: bool) {
        if let Err(e) = self.try_tex_upload(handle, image_offset, shape, data, wait) {
            error!("tex_upload failed: {e}");
        }
    }

    fn try_tex_upload(&mut self, handle: TexHandle, image_offset: Shape, shape: Shape, data: &[u8], wait: bool) -> Result<()> {
        let image_handle = self.registry.read().tex(handle).ok_or(Error::InvalidHandle("Tex"))?.image();
        let (staging, transient) = self.ensure_tex_staging(handle, data.len() as vk::DeviceSize)?;

        let upload_task = Task::BufferUpload { buffer: staging.buffer, offset: staging.offsets[0], data: data.to_vec() };
        let copy_task = Task::ImageFromBuffer { image: image_handle, image_offset, shape, buffer: staging.buffer, buffer_offset: staging.offsets[0] };
        let mut copy_queued = Queued::new(copy_task);
        if let Some(transient) = transient {
            copy_queued = copy_queued.then(Domain::Event, Task::UploadDone { transient_staging: Some(Box::new(transient)), ok: true });
        }

        self.dispatch(Domain::Upload, Queued::new(upload_task).chain(Domain::Copy, copy_queued), wait)
    }

    pub fn tex_download(&mut self, handle: TexHandle, image_offset: Shape, shape: Shape, size: vk::DeviceSize) -> Option<Receiver<Vec<u8>>> {
        match self.try_tex_download(handle, image_offset, shape, size) {
            Ok(rx) => Some(rx),
            Err(e) => {
                error!("tex_download failed: {e}");
                None
            }
        }
    }

    fn try_tex_download(&mut self, handle: TexHandle, image_offset: Shape, shape: Shape, size: vk::DeviceSize) -> Result<Receiver<Vec<u8>>> {
        let image_handle = self.registry.read().tex(handle).ok_or(Error::InvalidHandle("Tex"))?.image();
        let (staging, transient) = self.ensure_tex_staging(handle, size)?;
        let (tx, rx) = bounded(1);

        let copy_task = Task::ImageToBuffer { image: image_handle, image_offset, shape, buffer: staging.buffer, buffer_offset: staging.offsets[0] };
        let download_task = Task::BufferDownload { buffer: staging.buffer, offset: staging.offsets[0], size, result: tx };
        let done = Task::DownloadDone { size, data: Vec::new(), ok: true, transient_staging: transient.map(Box::new) };

        self.transfers.push(Domain::Copy, Queued::new(copy_task).chain(Domain::Copy, Queued::new(download_task).then(Domain::Event, done)));
        Ok(rx)
    }

    /// Returns the Tex's existing companion staging region if one is already cached
    /// (`PERSISTENT_STAGING`), or allocates and caches a fresh one. Mirrors `ensure_staging`'s
    /// `Dat` counterpart: `None` in the second slot means the region is cached on the Tex and owned
    /// by it; `Some(dat)` means it is ad hoc and the caller must attach it to a chain's terminal
    /// `UploadDone`/`DownloadDone` event so its teardown happens only once the in-flight
    /// upload/copy that reads or writes it has actually completed, not before.
    fn ensure_tex_staging(&mut self, handle: TexHandle, size: vk::DeviceSize) -> Result<(BufferRegion, Option<Dat>)> {
        let existing = self.registry.read().tex(handle).ok_or(Error::InvalidHandle("Tex"))?.staging().map(|s| s.region().clone());
        if let Some(region) = existing {
            return Ok((region, None));
        }

        let staging = self.alloc_staging(size)?;
        let region = staging.region().clone();
        let persistent = self.registry.read().tex(handle).map(|t| t.flags().contains(TexFlags::PERSISTENT_STAGING)).unwrap_or(false);

        if persistent {
            self.registry.write().tex_mut(handle).ok_or(Error::InvalidHandle("Tex"))?.staging = Some(staging);
            Ok((region, None))
        } else {
            Ok((region, Some(staging)))
        }
    }

    pub fn tex_destroy(&mut self, handle: TexHandle) {
        let Some(tex) = self.registry.write().remove_tex(handle) else {
            error!("tex_destroy called on an unknown or already-freed handle");
            return;
        };
        self.registry.write().remove_image(tex.image());
        if let Some(staging) = tex.staging() {
            self.buffer_pool.dealloc(BufferType::Staging, true, staging.region().offsets[0]);
        }
    }

    // ---- Sampler --------------------------------------------------------------------------

    pub fn sampler(&mut self, info: SamplerInfo) -> Option<SamplerHandle> {
        match Sampler::new(&self.gpu, &info) {
            Ok(sampler) => Some(self.registry.write().insert_sampler(sampler)),
            Err(e) => {
                error!("sampler() failed: {e}");
                None
            }
        }
    }

    // ---- Direct (test/one-shot) transfers, bypassing Dat/Tex -------------------------------

    pub fn upload_buffer(&self, buffer: BufferHandle, offset: vk::DeviceSize, data: &[u8]) {
        let task = Task::BufferUpload { buffer, offset, data: data.to_vec() };
        if let Err(e) = executor::execute(&self.gpu, &self.registry, &task) {
            error!("upload_buffer failed: {e}");
        }
    }

    pub fn download_buffer(&self, buffer: BufferHandle, offset: vk::DeviceSize, size: vk::DeviceSize) -> Option<Vec<u8>> {
        let (tx, _rx) = bounded(1);
        let task = Task::BufferDownload { buffer, offset, size, result: tx };
        match executor::execute(&self.gpu, &self.registry, &task) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("download_buffer failed: {e}");
                None
            }
        }
    }

    pub fn copy_buffer(&self, src: BufferHandle, src_offset: vk::DeviceSize, dst: BufferHandle, dst_offset: vk::DeviceSize, size: vk::DeviceSize) {
        let task = Task::BufferCopy { src, src_offset, dst, dst_offset, size };
        if let Err(e) = executor::execute(&self.gpu, &self.registry, &task) {
            error!("copy_buffer failed: {e}");
        }
    }

    pub fn upload_image(&mut self, image: ImageHandle, image_offset: Shape, shape: Shape, data: &[u8]) {
        if let Err(e) = self.try_upload_image(image, image_offset, shape, data) {
            error!("upload_image failed: {e}");
        }
    }

    fn try_upload_image(&mut self, image: ImageHandle, image_offset: Shape, shape: Shape, data: &[u8]) -> Result<()> {
        let staging = self.alloc_staging(data.len() as vk::DeviceSize)?;
        let region = staging.region().clone();
        self.upload_buffer(region.buffer, region.offsets[0], data);
        let task = Task::ImageFromBuffer { image, image_offset, shape, buffer: region.buffer, buffer_offset: region.offsets[0] };
        let result = executor::execute(&self.gpu, &self.registry, &task);
        self.buffer_pool.dealloc(BufferType::Staging, true, region.offsets[0]);
        result.map(|_| ())
    }

    pub fn download_image(&mut self, image: ImageHandle, image_offset: Shape, shape: Shape, size: vk::DeviceSize) -> Option<Vec<u8>> {
        match self.try_download_image(image, image_offset, shape, size) {
            Ok(data) => Some(data),
            Err(e) => {
                error!("download_image failed: {e}");
                None
            }
        }
    }

    fn try_download_image(&mut self, image: ImageHandle, image_offset: Shape, shape: Shape, size: vk::DeviceSize) -> Result<Vec<u8>> {
        let staging = self.alloc_staging(size)?;
        let region = staging.region().clone();
        let task = Task::ImageToBuffer { image, image_offset, shape, buffer: region.buffer, buffer_offset: region.offsets[0] };
        executor::execute(&self.gpu, &self.registry, &task)?;
        let data = self.download_buffer(region.buffer, region.offsets[0], size);
        self.buffer_pool.dealloc(BufferType::Staging, true, region.offsets[0]);
        data.ok_or(Error::ZeroSizeRequest)
    }

    pub fn copy_image(&self, src: ImageHandle, src_offset: Shape, dst: ImageHandle, dst_offset: Shape, shape: Shape) {
        let task = Task::ImageCopy { src_image: src, src_offset, dst_image: dst, dst_offset, shape };
        if let Err(e) = executor::execute(&self.gpu, &self.registry, &task) {
            error!("copy_image failed: {e}");
        }
    }

    // ---- Per-frame tick -------------------------------------------------------------------

    /// Drains Copy, then Event, then Dup, in that order (spec.md §4.10).
    pub fn frame(&mut self, image_index: u32) {
        self.transfers.pump_copy(&self.gpu, &self.registry);

        for queued in self.transfers.drain_event() {
            self.handle_event(queued.task);
        }

        if let Err(e) = self.transfers.frame_dup(&self.gpu, &self.registry, image_index) {
            error!("dup frame processing failed: {e}");
        }
    }

    fn handle_event(&mut self, task: Task) {
        match task {
            Task::UploadDone { transient_staging: Some(dat), ok } => {
                if !ok {
                    warn!("upload failed; releasing its transient staging region anyway");
                }
                self.buffer_pool.dealloc(dat.ty, dat.is_mappable(), dat.region().offsets[0]);
            }
            Task::DownloadDone { transient_staging: Some(dat), ok, .. } => {
                if !ok {
                    warn!("download failed; releasing its transient staging region anyway");
                }
                self.buffer_pool.dealloc(dat.ty, dat.is_mappable(), dat.region().offsets[0]);
            }
            _ => {}
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        trace!("destroying context");
        self.transfers.shutdown();
        self.registry.write().destroy();
    }
}

//! Transfer Executors (C8): the handlers that perform the GPU-side half of each [`Task`] variant.
//!
//! Grounded on `transfers_utils.h`'s per-task-kind processing functions. Hazard strategy follows
//! spec.md §4.8 exactly: `BufferCopy` and `ImageCopy` wait-idle the render queue first (coarse,
//! intended to run a handful of times per frame, not per draw) before recording and waiting on
//! the transfer queue; the buffer↔image executors only wait on the transfer queue, bracketing
//! their copy with the layout-transition barriers [`Image`] already knows how to perform.

use super::task::Task;
use crate::device;
use crate::error::Result;
use crate::gpu::SharedGpu;
use crate::registry::Registry;
use ash::vk;
use parking_lot::RwLock;

/// Executes one task's GPU-side effect in place. Returns the bytes a `BufferDownload` produced,
/// if any — the caller is responsible for forwarding them to the task's result channel and/or a
/// `DownloadDone` event.
pub fn execute(gpu: &SharedGpu, registry: &RwLock<Registry>, task: &Task) -> Result<Option<Vec<u8>>> {
    match task {
        Task::BufferUpload { buffer, offset, data } => {
            let registry = registry.read();
            let buffer = registry.buffer(*buffer).expect("buffer upload on a live handle");
            buffer.upload(*offset, data)?;
            Ok(None)
        }

        Task::BufferDownload { buffer, offset, size, .. } => {
            let registry = registry.read();
            let buffer = registry.buffer(*buffer).expect("buffer download on a live handle");
            Ok(Some(buffer.download(*offset, *size)?))
        }

        Task::BufferCopy { src, src_offset, dst, dst_offset, size } => {
            device::queue_wait_idle(gpu.device(), gpu.graphics_queue())?;
            let registry = registry.read();
            let src_buf = registry.buffer(*src).expect("copy source buffer is live").handle();
            let dst_buf = registry.buffer(*dst).expect("copy dest buffer is live").handle();
            gpu.transfer_pool().single_time_command(gpu.transfer_queue(), |cmd| {
                cmd.copy_buffer(
                    src_buf,
                    dst_buf,
                    &[vk::BufferCopy { src_offset: *src_offset, dst_offset: *dst_offset, size: *size }],
                );
            })?;
            Ok(None)
        }

        Task::ImageFromBuffer { image, image_offset, shape, buffer, buffer_offset } => {
            let mut registry = registry.write();
            let buf_handle = registry.buffer(*buffer).expect("upload source buffer is live").handle();
            let image = registry.image_mut(*image).expect("image target is live");
            image.copy_from_buffer(gpu.transfer_pool(), buf_handle, *buffer_offset, *image_offset, *shape)?;
            Ok(None)
        }

        Task::ImageToBuffer { image, image_offset, shape, buffer, buffer_offset } => {
            let mut registry = registry.write();
            let buf_handle = registry.buffer(*buffer).expect("download dest buffer is live").handle();
            let image = registry.image_mut(*image).expect("image source is live");
            image.copy_to_buffer(gpu.transfer_pool(), buf_handle, *buffer_offset, *image_offset, *shape)?;
            Ok(None)
        }

        Task::ImageCopy { src_image, src_offset, dst_image, dst_offset, shape } => {
            assert_ne!(src_image, dst_image, "image copy requires distinct source and destination images");
            device::queue_wait_idle(gpu.device(), gpu.graphics_queue())?;
            let mut registry = registry.write();

            // Each image only ever needs one `&mut` borrow at a time — the copy itself is
            // recorded from the raw handles, so the two transitions are sequenced instead of
            // borrowing both images mutably at once (slotmap has no `get_disjoint_mut`).
            let src_declared = registry.image(*src_image).expect("copy source image is live").layout();
            registry
                .image_mut(*src_image)
                .expect("copy source image is live")
                .transition(gpu.transfer_pool(), vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;

            let dst_declared = registry.image(*dst_image).expect("copy dest image is live").layout();
            registry
                .image_mut(*dst_image)
                .expect("copy dest image is live")
                .transition(gpu.transfer_pool(), vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

            let src = registry.image(*src_image).unwrap();
            let dst = registry.image(*dst_image).unwrap();
            let region = vk::ImageCopy {
                src_subresource: src.subresource_layers(),
                src_offset: (*src_offset).into(),
                dst_subresource: dst.subresource_layers(),
                dst_offset: (*dst_offset).into(),
                extent: (*shape).into(),
            };
            let (src_handle, dst_handle) = (src.handle(), dst.handle());

            let result = gpu.transfer_pool().single_time_command(gpu.transfer_queue(), |cmd| {
                cmd.copy_image(src_handle, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, dst_handle, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[region]);
            });

            registry.image_mut(*src_image).unwrap().transition(gpu.transfer_pool(), src_declared)?;
            registry.image_mut(*dst_image).unwrap().transition(gpu.transfer_pool(), dst_declared)?;
            result?;
            Ok(None)
        }

        Task::DupUpload { .. } | Task::DupCopy { .. } => {
            unreachable!("dup tasks are routed to the dup engine, not executed directly")
        }

        Task::UploadDone { .. } | Task::DownloadDone { .. } => Ok(None),
    }
}

//! Render Target Pair (C11): an offscreen color+depth attachment bundle with an owned framebuffer
//! and readback staging image.
//!
//! Grounded on `board.c`'s synchronous, un-queued readback path (SPEC_FULL.md §11): unlike every
//! other transfer in this crate, [`Board::download`] never touches [`crate::transfer::Transfers`]
//! — it is a rare, expensive, test/screenshot-oriented operation that submits and waits inline.

use crate::commands::{CommandBuffer, CommandPool};
use crate::error::Result;
use crate::extent::{Dims, Shape};
use crate::gpu::SharedGpu;
use crate::resources::Image;
use ash::vk;
use bitflags::bitflags;
use log::trace;

bitflags! {
    /// Reserved for future board variants (e.g. multisampling); spec.md §6 names a `flags`
    /// parameter on `board()` without describing any bit, so this crate carries an empty set.
    /// See DESIGN.md.
    #[derive(Default)]
    pub struct BoardFlags: u32 {}
}

const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

pub struct Board {
    gpu: SharedGpu,
    renderpass: vk::RenderPass,
    color: Image,
    depth: Image,
    staging: Image,
    framebuffer: vk::Framebuffer,
    pool: CommandPool,
    cmd: CommandBuffer,
    width: u32,
    height: u32,
    #[allow(dead_code)]
    flags: BoardFlags,
}

impl Board {
    pub fn create(gpu: SharedGpu, renderpass: vk::RenderPass, width: u32, height: u32, flags: BoardFlags) -> Result<Self> {
        trace!("creating board {width}x{height}");
        let (color, depth, staging, framebuffer) = Self::build_attachments(&gpu, renderpass, width, height)?;

        let pool = CommandPool::new(gpu.device().clone(), gpu.queue_families().graphics(), false, true)?;
        let cmd = pool.allocate_one()?;

        Ok(Self { gpu, renderpass, color, depth, staging, framebuffer, pool, cmd, width, height, flags })
    }

    fn build_attachments(
        gpu: &SharedGpu,
        renderpass: vk::RenderPass,
        width: u32,
        height: u32,
    ) -> Result<(Image, Image, Image, vk::Framebuffer)> {
        let shape = Shape::new(width, height, 1);

        let color = Image::new(
            gpu,
            Dims::D2,
            shape,
            COLOR_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageTiling::OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;

        let depth = Image::new(
            gpu,
            Dims::D2,
            shape,
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageTiling::OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        // Host-visible, linear tiling: mapped directly by `download` without a buffer round-trip.
        let staging = Image::new(
            gpu,
            Dims::D2,
            shape,
            COLOR_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST,
            vk::ImageTiling::LINEAR,
            vk::ImageLayout::GENERAL,
        )?;

        let attachments = [color.view(), depth.view()];
        let fb_info = vk::FramebufferCreateInfo::builder()
            .render_pass(renderpass)
            .attachments(&attachments)
            .width(width)
            .height(height)
            .layers(1);
        let framebuffer = unsafe { gpu.device().create_framebuffer(&fb_info, None)? };

        Ok((color, depth, staging, framebuffer))
    }

    /// Reallocates all three images and the framebuffer in place, keeping the renderpass and
    /// command pool/buffer (spec.md §4.11: "reallocates all three images and the framebuffer").
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        trace!("resizing board from {}x{} to {width}x{height}", self.width, self.height);

        let (color, depth, staging, framebuffer) = Self::build_attachments(&self.gpu, self.renderpass, width, height)?;
        unsafe { self.gpu.device().destroy_framebuffer(self.framebuffer, None) };

        self.color = color;
        self.depth = depth;
        self.staging = staging;
        self.framebuffer = framebuffer;
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Rebuilds the framebuffer and attachments against a new renderpass, keeping dimensions.
    pub fn recreate(&mut self, renderpass: vk::RenderPass) -> Result<()> {
        let (color, depth, staging, framebuffer) = Self::build_attachments(&self.gpu, renderpass, self.width, self.height)?;
        unsafe { self.gpu.device().destroy_framebuffer(self.framebuffer, None) };

        self.renderpass = renderpass;
        self.color = color;
        self.depth = depth;
        self.staging = staging;
        self.framebuffer = framebuffer;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_view(&self) -> vk::ImageView {
        self.color.view()
    }

    /// Begins recording the board's one command buffer and opens its renderpass. Returns the raw
    /// handle so a caller can record its own draw calls before [`Board::end`].
    pub fn begin(&self, clear_values: &[vk::ClearValue]) -> Result<vk::CommandBuffer> {
        self.cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.cmd.begin_renderpass(self.renderpass, self.framebuffer, vk::Extent2D { width: self.width, height: self.height }, clear_values);
        Ok(self.cmd.handle())
    }

    pub fn viewport(&self) {
        let viewport = vk::Viewport { x: 0.0, y: 0.0, width: self.width as f32, height: self.height as f32, min_depth: 0.0, max_depth: 1.0 };
        let scissor = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: vk::Extent2D { width: self.width, height: self.height } };
        self.cmd.set_viewport(viewport, scissor);
    }

    /// Ends the renderpass and the command buffer, then submits and waits synchronously —
    /// boards are a test/offscreen path, not part of the swapchain-driven present loop.
    pub fn end(&self) -> Result<()> {
        self.cmd.end_renderpass();
        self.cmd.end()?;
        self.cmd.submit(self.gpu.graphics_queue(), &[], &[], vk::Fence::null(), &[])?;
        crate::device::queue_wait_idle(self.gpu.device(), self.gpu.graphics_queue())
    }

    /// Records a color-image → staging-image copy with the required barriers, submits it
    /// synchronously, then maps the staging image and writes the result as RGB8 (alpha stripped).
    pub fn download(&mut self, out_rgb: &mut Vec<u8>) -> Result<()> {
        let declared_color_layout = self.color.layout();

        self.color.transition(self.gpu.transfer_pool(), vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;
        self.staging.transition(self.gpu.transfer_pool(), vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

        let region = vk::ImageCopy {
            src_subresource: self.color.subresource_layers(),
            src_offset: vk::Offset3D::default(),
            dst_subresource: self.staging.subresource_layers(),
            dst_offset: vk::Offset3D::default(),
            extent: vk::Extent3D { width: self.width, height: self.height, depth: 1 },
        };

        let copy_result = self.gpu.transfer_pool().single_time_command(self.gpu.transfer_queue(), |cmd| {
            cmd.copy_image(
                self.color.handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.staging.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        });

        self.color.transition(self.gpu.transfer_pool(), declared_color_layout)?;
        copy_result?;

        let layout = self.staging.subresource_layout()?;
        let ptr = self.staging.mapped_ptr().expect("readback staging image is host-visible");

        out_rgb.clear();
        out_rgb.reserve((self.width as usize) * (self.height as usize) * 3);
        unsafe {
            let base = ptr.as_ptr() as *const u8;
            for y in 0..self.height as usize {
                let row = base.add(layout.offset as usize + y * layout.row_pitch as usize);
                for x in 0..self.width as usize {
                    let texel = row.add(x * 4);
                    out_rgb.push(*texel);
                    out_rgb.push(*texel.add(1));
                    out_rgb.push(*texel.add(2));
                }
            }
        }
        Ok(())
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        unsafe { self.gpu.device().destroy_framebuffer(self.framebuffer, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_flags_default_to_empty() {
        assert_eq!(BoardFlags::default(), BoardFlags::empty());
    }
}

//! Command pools and command buffers used internally by the transfer executors and by
//! [`crate::board::Board`] to record its renderpass.
//!
//! Callers needing to record their own draw calls do so directly against the raw
//! `vk::CommandBuffer` handle a [`Board`](crate::board::Board) exposes; this module only wraps
//! the operations the core itself issues (copies, barriers, one-shot submission).

use crate::device;
use crate::error::Result;
use ash::vk;
use ash::Device;
use std::sync::Arc;

pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// `transient`: buffers allocated from this pool are short-lived. `reset`: buffers may be
    /// individually reset rather than requiring a pool-wide reset.
    pub fn new(device: Arc<Device>, queue_family: u32, transient: bool, reset: bool) -> Result<Self> {
        let flags = if transient { vk::CommandPoolCreateFlags::TRANSIENT } else { vk::CommandPoolCreateFlags::empty() }
            | if reset { vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER } else { vk::CommandPoolCreateFlags::empty() };

        let create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self { device, pool })
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let raw = unsafe { self.device.allocate_command_buffers(&alloc_info)? };

        Ok(raw
            .into_iter()
            .map(|commandbuffer| CommandBuffer { device: self.device.clone(), commandbuffer })
            .collect())
    }

    pub fn allocate_one(&self) -> Result<CommandBuffer> {
        Ok(self.allocate(1)?.pop().unwrap())
    }

    pub fn free(&self, buf: CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.pool, &[buf.commandbuffer]) }
    }

    /// Records `func` into a fresh one-time-submit command buffer, submits it to `queue`, waits
    /// for the queue to idle, then frees the buffer.
    pub fn single_time_command<F: FnOnce(&CommandBuffer) -> R, R>(&self, queue: vk::Queue, func: F) -> Result<R> {
        let cmd = self.allocate_one()?;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        let result = func(&cmd);
        cmd.end()?;
        cmd.submit(queue, &[], &[], vk::Fence::null(), &[])?;
        device::queue_wait_idle(&self.device, queue)?;
        self.free(cmd);
        Ok(result)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

pub struct CommandBuffer {
    device: Arc<Device>,
    commandbuffer: vk::CommandBuffer,
}

impl CommandBuffer {
    pub fn begin(&self, flags: vk::CommandBufferUsageFlags) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.device.begin_command_buffer(self.commandbuffer, &begin_info)? };
        Ok(())
    }

    pub fn end(&self) -> Result<()> {
        unsafe { self.device.end_command_buffer(self.commandbuffer)? };
        Ok(())
    }

    pub fn begin_renderpass(
        &self,
        renderpass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(renderpass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent })
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.commandbuffer, &begin_info, vk::SubpassContents::INLINE)
        };
    }

    pub fn end_renderpass(&self) {
        unsafe { self.device.cmd_end_render_pass(self.commandbuffer) };
    }

    pub fn set_viewport(&self, viewport: vk::Viewport, scissor: vk::Rect2D) {
        unsafe {
            self.device.cmd_set_viewport(self.commandbuffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.commandbuffer, 0, &[scissor]);
        }
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(self.commandbuffer, src, dst, regions) };
    }

    pub fn copy_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_image(self.commandbuffer, src, src_layout, dst, dst_layout, regions)
        };
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_buffer_to_image(self.commandbuffer, src, dst, layout, regions)
        };
    }

    pub fn copy_image_to_buffer(
        &self,
        src: vk::Image,
        layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_image_to_buffer(self.commandbuffer, src, layout, dst, regions)
        };
    }

    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.commandbuffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                buffer_barriers,
                image_barriers,
            )
        };
    }

    pub fn submit(
        &self,
        queue: vk::Queue,
        wait_semaphores: &[vk::Semaphore],
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
        wait_stages: &[vk::PipelineStageFlags],
    ) -> Result<()> {
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(std::slice::from_ref(&self.commandbuffer))
            .signal_semaphores(signal_semaphores);

        unsafe { self.device.queue_submit(queue, &[submit_info.build()], fence)? };
        Ok(())
    }

    /// The raw handle, exposed so a caller can record its own draw calls inside a
    /// [`Board`](crate::board::Board) renderpass.
    pub fn handle(&self) -> vk::CommandBuffer {
        self.commandbuffer
    }
}

impl AsRef<vk::CommandBuffer> for CommandBuffer {
    fn as_ref(&self) -> &vk::CommandBuffer {
        &self.commandbuffer
    }
}

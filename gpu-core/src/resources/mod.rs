//! Raw GPU resource wrappers (C2): thin typed owners of `vk::Buffer`, `vk::Image`, and
//! `vk::Sampler` handles. Each exposes a `new`/builder-style constructor followed by eager Vulkan
//! object creation, and destroys its handle on `Drop`.

pub mod buffer;
pub mod image;
pub mod sampler;

pub use buffer::{Buffer, BufferType};
pub use image::Image;
pub use sampler::{Sampler, SamplerInfo};

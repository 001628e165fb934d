//! GPU resource core for a Vulkan-based rendering library: an offset allocator, a typed
//! resource registry, sub-allocated buffer/image handles (`Dat`/`Tex`), and a producer-consumer
//! transfer pipeline that moves bytes between host and device without stalling the GPU pipeline.
//!
//! [`Context`] is the single entry point: it owns the [`registry::Registry`], the
//! [`buffer_pool::BufferAllocatorPool`], and the [`transfer::Transfers`] pipeline, and is the
//! only way callers reach any of them. See SPEC_FULL.md for the full module map and DESIGN.md
//! for how each piece is grounded.

pub mod alloc;
pub mod board;
pub mod buffer_pool;
pub mod commands;
pub mod context;
pub mod dat;
mod debug_utils;
pub mod device;
pub mod entry;
pub mod error;
pub mod extent;
pub mod gpu;
pub mod handle;
pub mod instance;
pub mod registry;
pub mod resources;
pub mod tex;
pub mod transfer;

pub use board::{Board, BoardFlags};
pub use context::{Context, ContextConfig};
pub use dat::{Dat, DatFlags};
pub use error::{Error, Result};
pub use extent::{Dims, Extent, Shape};
pub use gpu::{Gpu, SharedGpu};
pub use handle::{BufferHandle, DatHandle, ImageHandle, SamplerHandle, TexHandle};
pub use resources::{BufferType, SamplerInfo};
pub use tex::{Tex, TexFlags};

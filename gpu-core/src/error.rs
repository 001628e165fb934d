use ash::vk;
use gpu_allocator::AllocationError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load the Vulkan library")]
    LibLoading,
    #[error("Vulkan API error")]
    Vulkan(#[from] vk::Result),
    #[error("Failed to allocate device memory")]
    MemoryAllocation(#[from] AllocationError),
    #[error("Failed to create a Vulkan instance")]
    InstanceCreation(#[from] ash::InstanceError),
    #[error("Missing required instance extensions: {0:?}")]
    MissingExtensions(Vec<std::ffi::CString>),
    #[error("Missing required instance layers: {0:?}")]
    MissingLayers(Vec<std::ffi::CString>),
    #[error("No suitable physical device was found")]
    UnsuitableDevice,

    #[error("Requested allocation size must be greater than zero")]
    ZeroSizeRequest,
    #[error("Insufficient buffer size: tried to write {size} bytes into a buffer of {max_size} bytes")]
    BufferOverflow { size: vk::DeviceSize, max_size: vk::DeviceSize },
    #[error("Unsupported image layout transition from {0:?} to {1:?}")]
    UnsupportedLayoutTransition(vk::ImageLayout, vk::ImageLayout),

    #[error("Stale or unknown handle for a {0}")]
    InvalidHandle(&'static str),
    #[error("Attempted to free an offset that is not currently allocated")]
    DoubleFree,

    #[error("Dup slot table is at capacity ({0} slots); dropping the dup transfer")]
    DupTableFull(usize),

    #[error("wait: true is not supported for a DUP region; its updates complete across frame() calls, not synchronously")]
    SyncWaitUnsupportedForDup,
}

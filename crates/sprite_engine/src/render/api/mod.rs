//! Public device API
//!
//! This module contains the GPU device trait and the handle, enum, and error
//! types shared by every device implementation.

pub mod device;

// Re-export commonly used types
pub use device::{
    ActiveUniform, BlendMode, BufferId, BufferUsage, ClearFlags, DeviceCapabilities, DeviceError,
    DeviceResult, FramebufferId, FramebufferStatus, GlDevice, PixelType, ProgramId, RenderbufferId,
    ShaderId, ShaderStage, TextureFormat, TextureId, UniformId, UniformType, VertexLayoutId,
};

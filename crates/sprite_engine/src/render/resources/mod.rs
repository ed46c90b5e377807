//! GPU resource lifecycles
//!
//! Textures, shader programs, and offscreen render targets. Each resource is
//! owned by exactly one component and disposed exactly once; disposal helpers
//! return the `None` sentinel so owners overwrite their slot in the same
//! statement.

pub mod framebuffer;
pub mod shader;
pub mod texture;

pub use framebuffer::{create_framebuffer, dispose_framebuffer, Framebuffer};
pub use shader::{Shader, ShaderProgramData, ShaderSource};
pub use texture::{
    bind_texture, create_empty_texture, create_texture, dispose_texture, resize_texture,
    PixelSource, Texture2d,
};

//! GPU device abstraction
//!
//! This module defines the trait that GPU device implementations must satisfy
//! to back the sprite renderer. The trait deliberately covers only the narrow
//! slice of the GL surface the engine uses, which keeps a recording headless
//! implementation small enough to drive every test without a GPU.
//!
//! Handles are plain `Copy` newtypes; each implementation maps them to its
//! native objects internally. Deleting a handle twice, or deleting a handle
//! the device no longer knows, is a no-op.

use bitflags::bitflags;

use crate::foundation::math::Mat4;
use crate::render::batching::layout::VertexAttribute;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors reported by a GPU device implementation
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// A GPU call left an error flag set
    #[error("GPU error during {context}")]
    Api {
        /// Operation that observed the error
        context: String,
    },

    /// The device could not allocate a GPU resource
    #[error("Failed to allocate {what}")]
    ResourceAllocation {
        /// Resource kind that failed to allocate
        what: String,
    },

    /// A shader stage failed to compile
    #[error("Failed to compile {stage} shader: {log}")]
    ShaderCompile {
        /// Stage name ("vertex" or "fragment")
        stage: &'static str,
        /// Backend diagnostic log
        log: String,
    },

    /// A program failed to link
    #[error("Failed to link shader program: {log}")]
    ProgramLink {
        /// Backend diagnostic log
        log: String,
    },
}

/// Handle to a GPU buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Handle to a GPU texture object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Handle to a GPU renderbuffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferId(pub u64);

/// Handle to a GPU framebuffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u64);

/// Handle to a compiled shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

/// Handle to a resolved uniform location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformId(pub u64);

/// Handle to a vertex layout (vertex array) object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexLayoutId(pub u64);

/// Shader stage selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    /// Stage name for diagnostics
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

/// Buffer upload frequency hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once, drawn many times
    Static,
    /// Rewritten every frame
    Dynamic,
}

/// Texel channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// Four 8-bit channels
    Rgba,
    /// Three 8-bit channels (framebuffer color targets)
    Rgb,
    /// Single channel replicated into rgb at sample time
    Luminance,
}

/// Texel component type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    /// Unsigned byte components
    U8,
    /// Floating point components (requires device support)
    F32,
}

/// Blending configuration for draw submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Blending disabled
    None,
    /// Standard alpha blending
    Alpha,
    /// Additive blending (light accumulation pass)
    Additive,
}

/// Framebuffer completeness report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    /// The framebuffer is complete and renderable
    Complete,
    /// The framebuffer is incomplete; carries the backend status code
    Incomplete(u32),
}

/// Data type of an active uniform, as reported by program reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    /// 2D texture sampler
    Sampler2D,
    /// 4x4 float matrix
    Mat4,
    /// 4-component float vector
    Vec4,
    /// 2-component float vector
    Vec2,
    /// Single float
    Float,
    /// Single integer
    Int,
    /// Any type the engine does not set directly
    Other(u32),
}

impl UniformType {
    /// Whether this uniform samples a texture unit
    #[must_use]
    pub const fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D)
    }
}

/// One active uniform reported after linking
#[derive(Debug, Clone)]
pub struct ActiveUniform {
    /// Uniform name as declared in the source
    pub name: String,
    /// Reflected data type
    pub utype: UniformType,
    /// Array size (1 for non-arrays)
    pub size: i32,
}

/// Capability report used for validation and quality selection
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    /// Largest supported texture dimension
    pub max_texture_size: u32,
    /// Whether float texel types can be allocated
    pub supports_float_textures: bool,
    /// Hardware renderer name, when the backend exposes one
    pub renderer_name: Option<String>,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_size: 4096,
            supports_float_textures: false,
            renderer_name: None,
        }
    }
}

bitflags! {
    /// Buffers cleared at the start of a pass
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        /// Color attachment
        const COLOR = 1 << 0;
        /// Depth attachment
        const DEPTH = 1 << 1;
    }
}

/// GPU device interface consumed by the renderer.
///
/// All methods take `&self`: the engine is single-threaded and device
/// implementations use interior mutability for their handle tables. Methods
/// that cannot fail at the API level return nothing; failures surface either
/// through [`DeviceResult`] or through the deferred error flag queried with
/// [`GlDevice::has_errors`].
pub trait GlDevice {
    /// Capability report for this device
    fn capabilities(&self) -> DeviceCapabilities;

    // === Buffers ===

    /// Allocate a buffer object
    fn create_buffer(&self) -> DeviceResult<BufferId>;

    /// Bind (or unbind) the array buffer target
    fn bind_array_buffer(&self, buffer: Option<BufferId>);

    /// Bind (or unbind) the element array buffer target
    fn bind_index_buffer(&self, buffer: Option<BufferId>);

    /// Upload the full contents of the bound array buffer
    fn array_buffer_data_f32(&self, data: &[f32], usage: BufferUsage);

    /// Upload a prefix range of the bound array buffer
    fn array_buffer_sub_data_f32(&self, offset_floats: usize, data: &[f32]);

    /// Upload the full contents of the bound element array buffer
    fn index_buffer_data_u16(&self, data: &[u16], usage: BufferUsage);

    /// Delete a buffer object; no-op for stale handles
    fn delete_buffer(&self, buffer: BufferId);

    // === Vertex layouts ===

    /// Build a vertex layout object binding `attributes` over the given buffers
    fn create_vertex_layout(
        &self,
        attributes: &[VertexAttribute],
        vertex_buffer: BufferId,
        index_buffer: BufferId,
    ) -> DeviceResult<VertexLayoutId>;

    /// Bind (or unbind) a vertex layout
    fn bind_vertex_layout(&self, layout: Option<VertexLayoutId>);

    /// Delete a vertex layout object; no-op for stale handles
    fn delete_vertex_layout(&self, layout: VertexLayoutId);

    // === Textures ===

    /// Allocate a texture object
    fn create_texture(&self) -> DeviceResult<TextureId>;

    /// Bind (or unbind) a texture on the given texture unit
    fn bind_texture(&self, unit: u32, texture: Option<TextureId>);

    /// Apply the engine-wide sampling parameters (nearest, clamp to edge)
    /// to the texture bound on unit 0
    fn tex_parameters_nearest_clamp(&self);

    /// Allocate or upload storage for the texture bound on unit 0
    fn tex_image_2d(
        &self,
        internal_format: TextureFormat,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixel_type: PixelType,
        pixels: Option<&[u8]>,
    );

    /// Delete a texture object; no-op for stale handles
    fn delete_texture(&self, texture: TextureId);

    // === Renderbuffers and framebuffers ===

    /// Allocate a renderbuffer object
    fn create_renderbuffer(&self) -> DeviceResult<RenderbufferId>;

    /// Allocate depth storage for a renderbuffer
    fn renderbuffer_storage_depth(&self, renderbuffer: RenderbufferId, width: u32, height: u32);

    /// Delete a renderbuffer object; no-op for stale handles
    fn delete_renderbuffer(&self, renderbuffer: RenderbufferId);

    /// Allocate a framebuffer object
    fn create_framebuffer(&self) -> DeviceResult<FramebufferId>;

    /// Bind a framebuffer, or the default target for `None`
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>);

    /// Attach a color texture to the bound framebuffer
    fn attach_color_texture(&self, texture: TextureId);

    /// Attach a depth renderbuffer to the bound framebuffer
    fn attach_depth_renderbuffer(&self, renderbuffer: RenderbufferId);

    /// Completeness of the bound framebuffer
    fn framebuffer_status(&self) -> FramebufferStatus;

    /// Delete a framebuffer object; no-op for stale handles
    fn delete_framebuffer(&self, framebuffer: FramebufferId);

    // === Shaders and programs ===

    /// Compile one shader stage, returning the backend log on failure
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> DeviceResult<ShaderId>;

    /// Allocate a program object
    fn create_program(&self) -> DeviceResult<ProgramId>;

    /// Attach a compiled stage to a program
    fn attach_shader(&self, program: ProgramId, shader: ShaderId);

    /// Bind an attribute name to a fixed location; must precede linking
    fn bind_attrib_location(&self, program: ProgramId, index: u32, name: &str);

    /// Link a program, returning the backend log on failure
    fn link_program(&self, program: ProgramId) -> DeviceResult<()>;

    /// Delete a shader stage object; no-op for stale handles
    fn delete_shader(&self, shader: ShaderId);

    /// Delete a program object; no-op for stale handles
    fn delete_program(&self, program: ProgramId);

    /// Active uniforms of a linked program
    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform>;

    /// Resolve a uniform location by name
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformId>;

    /// Select (or deselect) the program used for subsequent draws
    fn use_program(&self, program: Option<ProgramId>);

    /// Set an integer uniform on the active program
    fn set_uniform_1i(&self, location: UniformId, value: i32);

    /// Set a vec2 uniform on the active program
    fn set_uniform_2f(&self, location: UniformId, value: [f32; 2]);

    /// Set a vec4 uniform on the active program
    fn set_uniform_4f(&self, location: UniformId, value: [f32; 4]);

    /// Set a mat4 uniform on the active program
    fn set_uniform_mat4(&self, location: UniformId, value: &Mat4);

    // === Pipeline state ===

    /// Enable depth testing (reads/writes are gated by the depth mask)
    fn enable_depth_test(&self);

    /// Disable dithering
    fn disable_dither(&self);

    /// Enable or disable depth writes
    fn depth_mask(&self, enabled: bool);

    /// Set the viewport rectangle
    fn viewport(&self, x: i32, y: i32, width: u32, height: u32);

    /// Set the clear color
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);

    /// Clear the selected buffers of the bound target
    fn clear(&self, flags: ClearFlags);

    /// Configure blending for subsequent draws
    fn set_blend_mode(&self, mode: BlendMode);

    // === Draw submission ===

    /// Draw `index_count` indices from the bound layout as triangles
    fn draw_triangles(&self, index_count: usize, first_index: usize);

    // === Error flag and teardown ===

    /// Drain any pending error flags
    fn clear_errors(&self);

    /// Whether any GPU call since the last drain left an error flag
    fn has_errors(&self) -> bool;

    /// Unbind every texture unit, buffer target, and framebuffer
    fn unbind_all(&self);
}

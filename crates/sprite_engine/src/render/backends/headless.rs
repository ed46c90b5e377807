//! Headless recording device
//!
//! A [`GlDevice`] implementation with no GPU behind it. Every call is
//! recorded in order, handles come from slotmaps so stale deletes are
//! naturally no-ops, and a set of injection switches simulates the failure
//! modes the renderer has to degrade through (renderbuffer allocation
//! failure, framebuffer incompleteness, deferred GPU errors, compile and
//! link failures).
//!
//! Program reflection is simulated by scanning attached shader sources for
//! `uniform` declarations, so the real embedded shaders exercise the same
//! resolution path they would on a live context.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::foundation::math::Mat4;
use crate::render::api::device::{
    ActiveUniform, BlendMode, BufferId, BufferUsage, ClearFlags, DeviceCapabilities, DeviceError,
    DeviceResult, FramebufferId, FramebufferStatus, GlDevice, PixelType, ProgramId, RenderbufferId,
    ShaderId, ShaderStage, TextureFormat, TextureId, UniformId, UniformType, VertexLayoutId,
};
use crate::render::batching::layout::VertexAttribute;

new_key_type! {
    struct BufferKey;
    struct TextureKey;
    struct RenderbufferKey;
    struct FramebufferKey;
    struct ShaderKey;
    struct ProgramKey;
    struct LayoutKey;
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    /// Buffer allocated
    CreateBuffer(BufferId),
    /// Array buffer target bound
    BindArrayBuffer(Option<BufferId>),
    /// Element array buffer target bound
    BindIndexBuffer(Option<BufferId>),
    /// Full array buffer upload
    ArrayBufferData {
        /// Number of f32 values uploaded
        floats: usize,
        /// Upload frequency hint
        usage: BufferUsage,
    },
    /// Partial array buffer upload
    ArrayBufferSubData {
        /// Destination offset in f32 values
        offset_floats: usize,
        /// Number of f32 values uploaded
        floats: usize,
    },
    /// Full index buffer upload
    IndexBufferData {
        /// Number of u16 indices uploaded
        indices: usize,
        /// Upload frequency hint
        usage: BufferUsage,
    },
    /// Buffer deleted
    DeleteBuffer(BufferId),
    /// Vertex layout built
    CreateVertexLayout(VertexLayoutId),
    /// Vertex layout bound or unbound
    BindVertexLayout(Option<VertexLayoutId>),
    /// Vertex layout deleted
    DeleteVertexLayout(VertexLayoutId),
    /// Texture allocated
    CreateTexture(TextureId),
    /// Texture bound on a unit
    BindTexture {
        /// Texture unit index
        unit: u32,
        /// Bound texture, `None` to unbind
        texture: Option<TextureId>,
    },
    /// Sampling parameters applied
    TexParameters,
    /// Texture storage allocated or uploaded
    TexImage2d {
        /// Internal storage format
        internal_format: TextureFormat,
        /// Width in texels
        width: u32,
        /// Height in texels
        height: u32,
        /// Source data format
        format: TextureFormat,
        /// Source component type
        pixel_type: PixelType,
        /// Whether pixel data was supplied
        with_pixels: bool,
    },
    /// Texture deleted
    DeleteTexture(TextureId),
    /// Renderbuffer allocated
    CreateRenderbuffer(RenderbufferId),
    /// Depth storage allocated
    RenderbufferStorageDepth {
        /// Width in texels
        width: u32,
        /// Height in texels
        height: u32,
    },
    /// Renderbuffer deleted
    DeleteRenderbuffer(RenderbufferId),
    /// Framebuffer allocated
    CreateFramebuffer(FramebufferId),
    /// Framebuffer bound, `None` for the default target
    BindFramebuffer(Option<FramebufferId>),
    /// Color texture attached to the bound framebuffer
    AttachColorTexture(TextureId),
    /// Depth renderbuffer attached to the bound framebuffer
    AttachDepthRenderbuffer(RenderbufferId),
    /// Framebuffer deleted
    DeleteFramebuffer(FramebufferId),
    /// Shader stage compiled
    CompileShader {
        /// Compiled stage
        stage: ShaderStage,
        /// Full source handed to the compiler, define prefix included
        source: String,
    },
    /// Program allocated
    CreateProgram(ProgramId),
    /// Stage attached to a program
    AttachShader,
    /// Attribute bound to a fixed location
    BindAttribLocation {
        /// Assigned location index
        index: u32,
        /// Attribute name
        name: String,
    },
    /// Program linked
    LinkProgram(ProgramId),
    /// Shader stage deleted
    DeleteShader(ShaderId),
    /// Program deleted
    DeleteProgram(ProgramId),
    /// Program selected for drawing
    UseProgram(Option<ProgramId>),
    /// Integer uniform set
    SetUniform1i {
        /// Uniform location
        location: UniformId,
        /// Value written
        value: i32,
    },
    /// Vec2 uniform set
    SetUniform2f {
        /// Uniform location
        location: UniformId,
        /// Value written
        value: [f32; 2],
    },
    /// Vec4 uniform set
    SetUniform4f {
        /// Uniform location
        location: UniformId,
        /// Value written
        value: [f32; 4],
    },
    /// Mat4 uniform set
    SetUniformMat4 {
        /// Uniform location
        location: UniformId,
    },
    /// Depth test enabled
    EnableDepthTest,
    /// Dithering disabled
    DisableDither,
    /// Depth writes toggled
    DepthMask(bool),
    /// Viewport set
    Viewport {
        /// Left edge
        x: i32,
        /// Bottom edge
        y: i32,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
    /// Clear color set
    ClearColor,
    /// Buffers cleared
    Clear(ClearFlags),
    /// Blend mode configured
    SetBlendMode(BlendMode),
    /// Indexed triangle draw issued
    DrawTriangles {
        /// Number of indices drawn
        index_count: usize,
        /// First index in the bound index buffer
        first_index: usize,
    },
    /// Every binding released
    UnbindAll,
}

#[derive(Default)]
struct Injection {
    fail_buffer_alloc: bool,
    fail_texture_alloc: bool,
    fail_renderbuffer_alloc: bool,
    fail_framebuffer_alloc: bool,
    framebuffer_incomplete: Option<u32>,
    error_after_tex_image: bool,
    fail_vertex_compile: Option<String>,
    fail_fragment_compile: Option<String>,
    fail_link: Option<String>,
    fail_uniform_lookup: Option<String>,
}

struct ShaderRecord {
    source: String,
}

#[derive(Default)]
struct ProgramRecord {
    shaders: Vec<ShaderId>,
    uniforms: Vec<ActiveUniform>,
    locations: HashMap<String, UniformId>,
}

/// Recording in-memory device used by tests and capability probing
#[derive(Default)]
pub struct HeadlessDevice {
    calls: RefCell<Vec<DeviceCall>>,
    capabilities: RefCell<DeviceCapabilities>,
    injection: RefCell<Injection>,
    error_flag: Cell<bool>,
    next_uniform_id: Cell<u64>,
    buffers: RefCell<SlotMap<BufferKey, ()>>,
    textures: RefCell<SlotMap<TextureKey, ()>>,
    renderbuffers: RefCell<SlotMap<RenderbufferKey, ()>>,
    framebuffers: RefCell<SlotMap<FramebufferKey, ()>>,
    shaders: RefCell<SlotMap<ShaderKey, ShaderRecord>>,
    programs: RefCell<SlotMap<ProgramKey, ProgramRecord>>,
    layouts: RefCell<SlotMap<LayoutKey, usize>>,
}

impl HeadlessDevice {
    /// Create a device with default capabilities
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a device with the given capability report
    #[must_use]
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        let device = Self::new();
        *device.capabilities.borrow_mut() = capabilities;
        device
    }

    /// Replace the capability report
    pub fn set_capabilities(&self, capabilities: DeviceCapabilities) {
        *self.capabilities.borrow_mut() = capabilities;
    }

    /// Snapshot of every recorded call, in issue order
    #[must_use]
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.borrow().clone()
    }

    /// Forget recorded calls (keeps live handles)
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Number of recorded calls matching a predicate
    pub fn count_calls(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    /// Live (created and not deleted) buffer objects
    #[must_use]
    pub fn alive_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }

    /// Live texture objects
    #[must_use]
    pub fn alive_textures(&self) -> usize {
        self.textures.borrow().len()
    }

    /// Live renderbuffer objects
    #[must_use]
    pub fn alive_renderbuffers(&self) -> usize {
        self.renderbuffers.borrow().len()
    }

    /// Live framebuffer objects
    #[must_use]
    pub fn alive_framebuffers(&self) -> usize {
        self.framebuffers.borrow().len()
    }

    /// Live shader stage objects
    #[must_use]
    pub fn alive_shaders(&self) -> usize {
        self.shaders.borrow().len()
    }

    /// Live program objects
    #[must_use]
    pub fn alive_programs(&self) -> usize {
        self.programs.borrow().len()
    }

    /// Live vertex layout objects
    #[must_use]
    pub fn alive_vertex_layouts(&self) -> usize {
        self.layouts.borrow().len()
    }

    /// Make every subsequent buffer allocation fail
    pub fn fail_buffer_alloc(&self) {
        self.injection.borrow_mut().fail_buffer_alloc = true;
    }

    /// Make every subsequent texture allocation fail
    pub fn fail_texture_alloc(&self) {
        self.injection.borrow_mut().fail_texture_alloc = true;
    }

    /// Make every subsequent renderbuffer allocation fail
    pub fn fail_renderbuffer_alloc(&self) {
        self.injection.borrow_mut().fail_renderbuffer_alloc = true;
    }

    /// Make every subsequent framebuffer allocation fail
    pub fn fail_framebuffer_alloc(&self) {
        self.injection.borrow_mut().fail_framebuffer_alloc = true;
    }

    /// Report the given status code from framebuffer completeness checks
    pub fn set_framebuffer_incomplete(&self, status: u32) {
        self.injection.borrow_mut().framebuffer_incomplete = Some(status);
    }

    /// Raise the deferred error flag after each texture upload
    pub fn set_error_after_tex_image(&self) {
        self.injection.borrow_mut().error_after_tex_image = true;
    }

    /// Fail vertex stage compilation with the given log
    pub fn fail_vertex_compile(&self, log: &str) {
        self.injection.borrow_mut().fail_vertex_compile = Some(log.to_string());
    }

    /// Fail fragment stage compilation with the given log
    pub fn fail_fragment_compile(&self, log: &str) {
        self.injection.borrow_mut().fail_fragment_compile = Some(log.to_string());
    }

    /// Fail program linking with the given log
    pub fn fail_link(&self, log: &str) {
        self.injection.borrow_mut().fail_link = Some(log.to_string());
    }

    /// Make location lookups for the named uniform return nothing
    pub fn fail_uniform_lookup(&self, name: &str) {
        self.injection.borrow_mut().fail_uniform_lookup = Some(name.to_string());
    }

    fn record(&self, call: DeviceCall) {
        self.calls.borrow_mut().push(call);
    }

    /// Collect uniform declarations from the attached shader sources.
    ///
    /// Good enough for the engine's shaders: one declaration per line,
    /// `uniform <type> <name>;`, no arrays.
    fn reflect_uniforms(sources: &[&str]) -> Vec<ActiveUniform> {
        let mut uniforms: Vec<ActiveUniform> = Vec::new();
        for source in sources {
            for line in source.lines() {
                let line = line.trim();
                let Some(rest) = line.strip_prefix("uniform ") else {
                    continue;
                };
                let mut parts = rest.split_whitespace();
                let (Some(type_name), Some(raw_name)) = (parts.next(), parts.next()) else {
                    continue;
                };
                let name = raw_name.trim_end_matches(';').to_string();
                if uniforms.iter().any(|u| u.name == name) {
                    continue;
                }
                let utype = match type_name {
                    "sampler2D" => UniformType::Sampler2D,
                    "mat4" => UniformType::Mat4,
                    "vec4" => UniformType::Vec4,
                    "vec2" => UniformType::Vec2,
                    "float" => UniformType::Float,
                    "int" => UniformType::Int,
                    _ => UniformType::Other(0),
                };
                uniforms.push(ActiveUniform {
                    name,
                    utype,
                    size: 1,
                });
            }
        }
        uniforms
    }
}

fn to_key<K: Key>(id: u64) -> K {
    KeyData::from_ffi(id).into()
}

impl GlDevice for HeadlessDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.borrow().clone()
    }

    fn create_buffer(&self) -> DeviceResult<BufferId> {
        if self.injection.borrow().fail_buffer_alloc {
            return Err(DeviceError::ResourceAllocation {
                what: "buffer".to_string(),
            });
        }
        let id = BufferId(self.buffers.borrow_mut().insert(()).data().as_ffi());
        self.record(DeviceCall::CreateBuffer(id));
        Ok(id)
    }

    fn bind_array_buffer(&self, buffer: Option<BufferId>) {
        self.record(DeviceCall::BindArrayBuffer(buffer));
    }

    fn bind_index_buffer(&self, buffer: Option<BufferId>) {
        self.record(DeviceCall::BindIndexBuffer(buffer));
    }

    fn array_buffer_data_f32(&self, data: &[f32], usage: BufferUsage) {
        self.record(DeviceCall::ArrayBufferData {
            floats: data.len(),
            usage,
        });
    }

    fn array_buffer_sub_data_f32(&self, offset_floats: usize, data: &[f32]) {
        self.record(DeviceCall::ArrayBufferSubData {
            offset_floats,
            floats: data.len(),
        });
    }

    fn index_buffer_data_u16(&self, data: &[u16], usage: BufferUsage) {
        self.record(DeviceCall::IndexBufferData {
            indices: data.len(),
            usage,
        });
    }

    fn delete_buffer(&self, buffer: BufferId) {
        if self
            .buffers
            .borrow_mut()
            .remove(to_key::<BufferKey>(buffer.0))
            .is_some()
        {
            self.record(DeviceCall::DeleteBuffer(buffer));
        }
    }

    fn create_vertex_layout(
        &self,
        attributes: &[VertexAttribute],
        _vertex_buffer: BufferId,
        _index_buffer: BufferId,
    ) -> DeviceResult<VertexLayoutId> {
        let id = VertexLayoutId(
            self.layouts
                .borrow_mut()
                .insert(attributes.len())
                .data()
                .as_ffi(),
        );
        self.record(DeviceCall::CreateVertexLayout(id));
        Ok(id)
    }

    fn bind_vertex_layout(&self, layout: Option<VertexLayoutId>) {
        self.record(DeviceCall::BindVertexLayout(layout));
    }

    fn delete_vertex_layout(&self, layout: VertexLayoutId) {
        if self
            .layouts
            .borrow_mut()
            .remove(to_key::<LayoutKey>(layout.0))
            .is_some()
        {
            self.record(DeviceCall::DeleteVertexLayout(layout));
        }
    }

    fn create_texture(&self) -> DeviceResult<TextureId> {
        if self.injection.borrow().fail_texture_alloc {
            return Err(DeviceError::ResourceAllocation {
                what: "texture".to_string(),
            });
        }
        let id = TextureId(self.textures.borrow_mut().insert(()).data().as_ffi());
        self.record(DeviceCall::CreateTexture(id));
        Ok(id)
    }

    fn bind_texture(&self, unit: u32, texture: Option<TextureId>) {
        self.record(DeviceCall::BindTexture { unit, texture });
    }

    fn tex_parameters_nearest_clamp(&self) {
        self.record(DeviceCall::TexParameters);
    }

    fn tex_image_2d(
        &self,
        internal_format: TextureFormat,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixel_type: PixelType,
        pixels: Option<&[u8]>,
    ) {
        self.record(DeviceCall::TexImage2d {
            internal_format,
            width,
            height,
            format,
            pixel_type,
            with_pixels: pixels.is_some(),
        });
        if self.injection.borrow().error_after_tex_image {
            self.error_flag.set(true);
        }
    }

    fn delete_texture(&self, texture: TextureId) {
        if self
            .textures
            .borrow_mut()
            .remove(to_key::<TextureKey>(texture.0))
            .is_some()
        {
            self.record(DeviceCall::DeleteTexture(texture));
        }
    }

    fn create_renderbuffer(&self) -> DeviceResult<RenderbufferId> {
        if self.injection.borrow().fail_renderbuffer_alloc {
            return Err(DeviceError::ResourceAllocation {
                what: "renderbuffer".to_string(),
            });
        }
        let id = RenderbufferId(self.renderbuffers.borrow_mut().insert(()).data().as_ffi());
        self.record(DeviceCall::CreateRenderbuffer(id));
        Ok(id)
    }

    fn renderbuffer_storage_depth(&self, _renderbuffer: RenderbufferId, width: u32, height: u32) {
        self.record(DeviceCall::RenderbufferStorageDepth { width, height });
    }

    fn delete_renderbuffer(&self, renderbuffer: RenderbufferId) {
        if self
            .renderbuffers
            .borrow_mut()
            .remove(to_key::<RenderbufferKey>(renderbuffer.0))
            .is_some()
        {
            self.record(DeviceCall::DeleteRenderbuffer(renderbuffer));
        }
    }

    fn create_framebuffer(&self) -> DeviceResult<FramebufferId> {
        if self.injection.borrow().fail_framebuffer_alloc {
            return Err(DeviceError::ResourceAllocation {
                what: "framebuffer".to_string(),
            });
        }
        let id = FramebufferId(self.framebuffers.borrow_mut().insert(()).data().as_ffi());
        self.record(DeviceCall::CreateFramebuffer(id));
        Ok(id)
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        self.record(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn attach_color_texture(&self, texture: TextureId) {
        self.record(DeviceCall::AttachColorTexture(texture));
    }

    fn attach_depth_renderbuffer(&self, renderbuffer: RenderbufferId) {
        self.record(DeviceCall::AttachDepthRenderbuffer(renderbuffer));
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        match self.injection.borrow().framebuffer_incomplete {
            Some(status) => FramebufferStatus::Incomplete(status),
            None => FramebufferStatus::Complete,
        }
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        if self
            .framebuffers
            .borrow_mut()
            .remove(to_key::<FramebufferKey>(framebuffer.0))
            .is_some()
        {
            self.record(DeviceCall::DeleteFramebuffer(framebuffer));
        }
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> DeviceResult<ShaderId> {
        self.record(DeviceCall::CompileShader {
            stage,
            source: source.to_string(),
        });
        let injected = match stage {
            ShaderStage::Vertex => self.injection.borrow().fail_vertex_compile.clone(),
            ShaderStage::Fragment => self.injection.borrow().fail_fragment_compile.clone(),
        };
        if let Some(log) = injected {
            return Err(DeviceError::ShaderCompile {
                stage: stage.name(),
                log,
            });
        }
        let key = self.shaders.borrow_mut().insert(ShaderRecord {
            source: source.to_string(),
        });
        Ok(ShaderId(key.data().as_ffi()))
    }

    fn create_program(&self) -> DeviceResult<ProgramId> {
        let key = self.programs.borrow_mut().insert(ProgramRecord::default());
        let id = ProgramId(key.data().as_ffi());
        self.record(DeviceCall::CreateProgram(id));
        Ok(id)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        self.record(DeviceCall::AttachShader);
        if let Some(record) = self
            .programs
            .borrow_mut()
            .get_mut(to_key::<ProgramKey>(program.0))
        {
            record.shaders.push(shader);
        }
    }

    fn bind_attrib_location(&self, _program: ProgramId, index: u32, name: &str) {
        self.record(DeviceCall::BindAttribLocation {
            index,
            name: name.to_string(),
        });
    }

    fn link_program(&self, program: ProgramId) -> DeviceResult<()> {
        self.record(DeviceCall::LinkProgram(program));
        if let Some(log) = self.injection.borrow().fail_link.clone() {
            return Err(DeviceError::ProgramLink { log });
        }
        let shaders = self.shaders.borrow();
        let mut programs = self.programs.borrow_mut();
        if let Some(record) = programs.get_mut(to_key::<ProgramKey>(program.0)) {
            let sources: Vec<&str> = record
                .shaders
                .iter()
                .filter_map(|s| shaders.get(to_key::<ShaderKey>(s.0)))
                .map(|r| r.source.as_str())
                .collect();
            record.uniforms = Self::reflect_uniforms(&sources);
            record.locations = record
                .uniforms
                .iter()
                .map(|u| {
                    let id = UniformId(self.next_uniform_id.get());
                    self.next_uniform_id.set(id.0 + 1);
                    (u.name.clone(), id)
                })
                .collect();
        }
        Ok(())
    }

    fn delete_shader(&self, shader: ShaderId) {
        if self
            .shaders
            .borrow_mut()
            .remove(to_key::<ShaderKey>(shader.0))
            .is_some()
        {
            self.record(DeviceCall::DeleteShader(shader));
        }
    }

    fn delete_program(&self, program: ProgramId) {
        if self
            .programs
            .borrow_mut()
            .remove(to_key::<ProgramKey>(program.0))
            .is_some()
        {
            self.record(DeviceCall::DeleteProgram(program));
        }
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform> {
        self.programs
            .borrow()
            .get(to_key::<ProgramKey>(program.0))
            .map(|r| r.uniforms.clone())
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformId> {
        if self.injection.borrow().fail_uniform_lookup.as_deref() == Some(name) {
            return None;
        }
        self.programs
            .borrow()
            .get(to_key::<ProgramKey>(program.0))
            .and_then(|r| r.locations.get(name).copied())
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.record(DeviceCall::UseProgram(program));
    }

    fn set_uniform_1i(&self, location: UniformId, value: i32) {
        self.record(DeviceCall::SetUniform1i { location, value });
    }

    fn set_uniform_2f(&self, location: UniformId, value: [f32; 2]) {
        self.record(DeviceCall::SetUniform2f { location, value });
    }

    fn set_uniform_4f(&self, location: UniformId, value: [f32; 4]) {
        self.record(DeviceCall::SetUniform4f { location, value });
    }

    fn set_uniform_mat4(&self, location: UniformId, _value: &Mat4) {
        self.record(DeviceCall::SetUniformMat4 { location });
    }

    fn enable_depth_test(&self) {
        self.record(DeviceCall::EnableDepthTest);
    }

    fn disable_dither(&self) {
        self.record(DeviceCall::DisableDither);
    }

    fn depth_mask(&self, enabled: bool) {
        self.record(DeviceCall::DepthMask(enabled));
    }

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        self.record(DeviceCall::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn clear_color(&self, _r: f32, _g: f32, _b: f32, _a: f32) {
        self.record(DeviceCall::ClearColor);
    }

    fn clear(&self, flags: ClearFlags) {
        self.record(DeviceCall::Clear(flags));
    }

    fn set_blend_mode(&self, mode: BlendMode) {
        self.record(DeviceCall::SetBlendMode(mode));
    }

    fn draw_triangles(&self, index_count: usize, first_index: usize) {
        self.record(DeviceCall::DrawTriangles {
            index_count,
            first_index,
        });
    }

    fn clear_errors(&self) {
        self.error_flag.set(false);
    }

    fn has_errors(&self) -> bool {
        let flagged = self.error_flag.get();
        self.error_flag.set(false);
        flagged
    }

    fn unbind_all(&self) {
        self.record(DeviceCall::UnbindAll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_delete_is_noop() {
        let device = HeadlessDevice::new();
        let buffer = device.create_buffer().unwrap();
        device.delete_buffer(buffer);
        device.delete_buffer(buffer);
        assert_eq!(device.alive_buffers(), 0);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::DeleteBuffer(_))),
            1
        );
    }

    #[test]
    fn test_error_flag_drains_on_query() {
        let device = HeadlessDevice::new();
        device.set_error_after_tex_image();
        device.tex_image_2d(TextureFormat::Rgba, 2, 2, TextureFormat::Rgba, PixelType::U8, None);
        assert!(device.has_errors());
        assert!(!device.has_errors());
    }

    #[test]
    fn test_uniform_reflection_from_sources() {
        let device = HeadlessDevice::new();
        let vs = device
            .compile_shader(
                ShaderStage::Vertex,
                "uniform mat4 transform;\nattribute vec3 position;\nvoid main() {}",
            )
            .unwrap();
        let fs = device
            .compile_shader(
                ShaderStage::Fragment,
                "uniform sampler2D sampler1;\nuniform vec4 lighting;\nvoid main() {}",
            )
            .unwrap();
        let program = device.create_program().unwrap();
        device.attach_shader(program, vs);
        device.attach_shader(program, fs);
        device.link_program(program).unwrap();

        let uniforms = device.active_uniforms(program);
        let names: Vec<&str> = uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["transform", "sampler1", "lighting"]);
        assert!(device.uniform_location(program, "transform").is_some());
        assert!(device.uniform_location(program, "missing").is_none());
        assert_eq!(uniforms[1].utype, UniformType::Sampler2D);
    }

    #[test]
    fn test_injected_compile_failure() {
        let device = HeadlessDevice::new();
        device.fail_fragment_compile("syntax error");
        assert!(device
            .compile_shader(ShaderStage::Vertex, "void main() {}")
            .is_ok());
        let err = device
            .compile_shader(ShaderStage::Fragment, "void main() {}")
            .unwrap_err();
        assert!(matches!(err, DeviceError::ShaderCompile { stage: "fragment", .. }));
    }

    #[test]
    fn test_framebuffer_incompleteness_injection() {
        let device = HeadlessDevice::new();
        assert_eq!(device.framebuffer_status(), FramebufferStatus::Complete);
        device.set_framebuffer_incomplete(0x8cd6);
        assert_eq!(
            device.framebuffer_status(),
            FramebufferStatus::Incomplete(0x8cd6)
        );
    }
}

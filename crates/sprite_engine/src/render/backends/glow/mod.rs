//! OpenGL device implementation
//!
//! Implements [`GlDevice`] over a [`glow::Context`]. Engine handles are
//! slotmap keys mapped to native GL objects here, so a stale or repeated
//! delete simply misses the table and becomes a no-op, which is what the
//! disposal contract requires.
//!
//! Luminance textures are native on GLES; on desktop core profiles they are
//! stored as single-channel R8 with a texture swizzle replicating red into
//! the color channels.

pub mod context;

pub use context::{acquire_context, AcquiredContext};

use std::cell::RefCell;

use glow::{HasContext, PixelUnpackData};
use log::debug;
use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::foundation::math::Mat4;
use crate::render::api::device::{
    ActiveUniform, BlendMode, BufferId, BufferUsage, ClearFlags, DeviceCapabilities, DeviceError,
    DeviceResult, FramebufferId, FramebufferStatus, GlDevice, PixelType, ProgramId, RenderbufferId,
    ShaderId, ShaderStage, TextureFormat, TextureId, UniformId, UniformType, VertexLayoutId,
};
use crate::render::batching::layout::{AttributeType, VertexAttribute};

new_key_type! {
    struct BufferKey;
    struct TextureKey;
    struct RenderbufferKey;
    struct FramebufferKey;
    struct ShaderKey;
    struct ProgramKey;
    struct LayoutKey;
    struct UniformKey;
}

fn to_key<K: Key>(id: u64) -> K {
    KeyData::from_ffi(id).into()
}

/// [`GlDevice`] backed by a live OpenGL or GLES context
pub struct GlowDevice {
    gl: glow::Context,
    capabilities: DeviceCapabilities,
    is_embedded: bool,
    max_texture_units: u32,
    buffers: RefCell<SlotMap<BufferKey, glow::Buffer>>,
    textures: RefCell<SlotMap<TextureKey, glow::Texture>>,
    renderbuffers: RefCell<SlotMap<RenderbufferKey, glow::Renderbuffer>>,
    framebuffers: RefCell<SlotMap<FramebufferKey, glow::Framebuffer>>,
    shaders: RefCell<SlotMap<ShaderKey, glow::Shader>>,
    programs: RefCell<SlotMap<ProgramKey, glow::Program>>,
    layouts: RefCell<SlotMap<LayoutKey, glow::VertexArray>>,
    uniforms: RefCell<SlotMap<UniformKey, glow::UniformLocation>>,
}

impl GlowDevice {
    /// Wrap a loaded GL context and query its capability report
    #[must_use]
    pub fn new(gl: glow::Context) -> Self {
        let version = gl.version();
        let is_embedded = version.is_embedded;
        let supports_float_textures = !is_embedded
            || version.major >= 3
            || gl.supported_extensions().contains("GL_OES_texture_float");
        let (max_texture_size, max_texture_units, renderer) = unsafe {
            (
                gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE).max(0) as u32,
                gl.get_parameter_i32(glow::MAX_TEXTURE_IMAGE_UNITS).max(0) as u32,
                gl.get_parameter_string(glow::RENDERER),
            )
        };

        Self {
            gl,
            capabilities: DeviceCapabilities {
                max_texture_size,
                supports_float_textures,
                renderer_name: (!renderer.is_empty()).then_some(renderer),
            },
            is_embedded,
            max_texture_units,
            buffers: RefCell::default(),
            textures: RefCell::default(),
            renderbuffers: RefCell::default(),
            framebuffers: RefCell::default(),
            shaders: RefCell::default(),
            programs: RefCell::default(),
            layouts: RefCell::default(),
            uniforms: RefCell::default(),
        }
    }

    fn buffer(&self, id: BufferId) -> Option<glow::Buffer> {
        self.buffers.borrow().get(to_key::<BufferKey>(id.0)).copied()
    }

    fn texture(&self, id: TextureId) -> Option<glow::Texture> {
        self.textures.borrow().get(to_key::<TextureKey>(id.0)).copied()
    }

    fn program(&self, id: ProgramId) -> Option<glow::Program> {
        self.programs.borrow().get(to_key::<ProgramKey>(id.0)).copied()
    }

    fn uniform(&self, id: UniformId) -> Option<glow::UniformLocation> {
        self.uniforms.borrow().get(to_key::<UniformKey>(id.0)).cloned()
    }

    fn gl_internal_format(&self, format: TextureFormat, pixel_type: PixelType) -> i32 {
        let value = match (format, pixel_type) {
            (TextureFormat::Rgba, PixelType::U8) => glow::RGBA8,
            (TextureFormat::Rgba, PixelType::F32) => glow::RGBA32F,
            (TextureFormat::Rgb, PixelType::U8) => glow::RGB8,
            (TextureFormat::Rgb, PixelType::F32) => glow::RGB32F,
            (TextureFormat::Luminance, _) if self.is_embedded => glow::LUMINANCE,
            (TextureFormat::Luminance, _) => glow::R8,
        };
        value as i32
    }

    fn gl_format(&self, format: TextureFormat) -> u32 {
        match format {
            TextureFormat::Rgba => glow::RGBA,
            TextureFormat::Rgb => glow::RGB,
            TextureFormat::Luminance if self.is_embedded => glow::LUMINANCE,
            TextureFormat::Luminance => glow::RED,
        }
    }
}

const fn gl_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
    }
}

const fn gl_pixel_type(pixel_type: PixelType) -> u32 {
    match pixel_type {
        PixelType::U8 => glow::UNSIGNED_BYTE,
        PixelType::F32 => glow::FLOAT,
    }
}

fn map_uniform_type(raw: u32) -> UniformType {
    match raw {
        glow::SAMPLER_2D => UniformType::Sampler2D,
        glow::FLOAT_MAT4 => UniformType::Mat4,
        glow::FLOAT_VEC4 => UniformType::Vec4,
        glow::FLOAT_VEC2 => UniformType::Vec2,
        glow::FLOAT => UniformType::Float,
        glow::INT => UniformType::Int,
        other => UniformType::Other(other),
    }
}

impl GlDevice for GlowDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn create_buffer(&self) -> DeviceResult<BufferId> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(|e| {
            debug!("buffer allocation failed: {e}");
            DeviceError::ResourceAllocation {
                what: "buffer".to_string(),
            }
        })?;
        Ok(BufferId(self.buffers.borrow_mut().insert(buffer).data().as_ffi()))
    }

    fn bind_array_buffer(&self, buffer: Option<BufferId>) {
        unsafe {
            self.gl
                .bind_buffer(glow::ARRAY_BUFFER, buffer.and_then(|b| self.buffer(b)));
        }
    }

    fn bind_index_buffer(&self, buffer: Option<BufferId>) {
        unsafe {
            self.gl.bind_buffer(
                glow::ELEMENT_ARRAY_BUFFER,
                buffer.and_then(|b| self.buffer(b)),
            );
        }
    }

    fn array_buffer_data_f32(&self, data: &[f32], usage: BufferUsage) {
        unsafe {
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(data),
                gl_usage(usage),
            );
        }
    }

    fn array_buffer_sub_data_f32(&self, offset_floats: usize, data: &[f32]) {
        unsafe {
            self.gl.buffer_sub_data_u8_slice(
                glow::ARRAY_BUFFER,
                (offset_floats * 4) as i32,
                bytemuck::cast_slice(data),
            );
        }
    }

    fn index_buffer_data_u16(&self, data: &[u16], usage: BufferUsage) {
        unsafe {
            self.gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(data),
                gl_usage(usage),
            );
        }
    }

    fn delete_buffer(&self, buffer: BufferId) {
        if let Some(native) = self
            .buffers
            .borrow_mut()
            .remove(to_key::<BufferKey>(buffer.0))
        {
            unsafe { self.gl.delete_buffer(native) };
        }
    }

    fn create_vertex_layout(
        &self,
        attributes: &[VertexAttribute],
        vertex_buffer: BufferId,
        index_buffer: BufferId,
    ) -> DeviceResult<VertexLayoutId> {
        let vao = unsafe { self.gl.create_vertex_array() }.map_err(|e| {
            debug!("vertex array allocation failed: {e}");
            DeviceError::ResourceAllocation {
                what: "vertex array".to_string(),
            }
        })?;

        let stride: usize = attributes.iter().map(VertexAttribute::byte_span).sum();
        unsafe {
            self.gl.bind_vertex_array(Some(vao));
            self.gl
                .bind_buffer(glow::ARRAY_BUFFER, self.buffer(vertex_buffer));

            let mut offset = 0usize;
            for (index, attribute) in attributes.iter().enumerate() {
                let gl_type = match attribute.component_type {
                    AttributeType::F32 => glow::FLOAT,
                    AttributeType::U8 => glow::UNSIGNED_BYTE,
                };
                self.gl.enable_vertex_attrib_array(index as u32);
                self.gl.vertex_attrib_pointer_f32(
                    index as u32,
                    attribute.component_count as i32,
                    gl_type,
                    attribute.normalized,
                    stride as i32,
                    offset as i32,
                );
                offset += attribute.byte_span();
            }

            // Captured by the vertex array; must stay bound until unbinding it.
            self.gl
                .bind_buffer(glow::ELEMENT_ARRAY_BUFFER, self.buffer(index_buffer));
            self.gl.bind_vertex_array(None);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);
        }

        Ok(VertexLayoutId(
            self.layouts.borrow_mut().insert(vao).data().as_ffi(),
        ))
    }

    fn bind_vertex_layout(&self, layout: Option<VertexLayoutId>) {
        let native = layout.and_then(|l| self.layouts.borrow().get(to_key::<LayoutKey>(l.0)).copied());
        unsafe { self.gl.bind_vertex_array(native) };
    }

    fn delete_vertex_layout(&self, layout: VertexLayoutId) {
        if let Some(native) = self
            .layouts
            .borrow_mut()
            .remove(to_key::<LayoutKey>(layout.0))
        {
            unsafe { self.gl.delete_vertex_array(native) };
        }
    }

    fn create_texture(&self) -> DeviceResult<TextureId> {
        let texture = unsafe { self.gl.create_texture() }.map_err(|e| {
            debug!("texture allocation failed: {e}");
            DeviceError::ResourceAllocation {
                what: "texture".to_string(),
            }
        })?;
        Ok(TextureId(
            self.textures.borrow_mut().insert(texture).data().as_ffi(),
        ))
    }

    fn bind_texture(&self, unit: u32, texture: Option<TextureId>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl
                .bind_texture(glow::TEXTURE_2D, texture.and_then(|t| self.texture(t)));
        }
    }

    fn tex_parameters_nearest_clamp(&self) {
        unsafe {
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::NEAREST as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::NEAREST as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
        }
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
        unsafe {
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                self.gl_internal_format(internal_format, pixel_type),
                width as i32,
                height as i32,
                0,
                self.gl_format(format),
                gl_pixel_type(pixel_type),
                PixelUnpackData::Slice(pixels),
            );
            if format == TextureFormat::Luminance && !self.is_embedded {
                self.gl
                    .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_R, glow::RED as i32);
                self.gl
                    .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_G, glow::RED as i32);
                self.gl
                    .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_B, glow::RED as i32);
                self.gl
                    .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_A, glow::ONE as i32);
            }
        }
    }

    fn delete_texture(&self, texture: TextureId) {
        if let Some(native) = self
            .textures
            .borrow_mut()
            .remove(to_key::<TextureKey>(texture.0))
        {
            unsafe { self.gl.delete_texture(native) };
        }
    }

    fn create_renderbuffer(&self) -> DeviceResult<RenderbufferId> {
        let renderbuffer = unsafe { self.gl.create_renderbuffer() }.map_err(|e| {
            debug!("renderbuffer allocation failed: {e}");
            DeviceError::ResourceAllocation {
                what: "renderbuffer".to_string(),
            }
        })?;
        Ok(RenderbufferId(
            self.renderbuffers
                .borrow_mut()
                .insert(renderbuffer)
                .data()
                .as_ffi(),
        ))
    }

    fn renderbuffer_storage_depth(&self, renderbuffer: RenderbufferId, width: u32, height: u32) {
        let native = self
            .renderbuffers
            .borrow()
            .get(to_key::<RenderbufferKey>(renderbuffer.0))
            .copied();
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, native);
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH_COMPONENT16,
                width as i32,
                height as i32,
            );
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
    }

    fn delete_renderbuffer(&self, renderbuffer: RenderbufferId) {
        if let Some(native) = self
            .renderbuffers
            .borrow_mut()
            .remove(to_key::<RenderbufferKey>(renderbuffer.0))
        {
            unsafe { self.gl.delete_renderbuffer(native) };
        }
    }

    fn create_framebuffer(&self) -> DeviceResult<FramebufferId> {
        let framebuffer = unsafe { self.gl.create_framebuffer() }.map_err(|e| {
            debug!("framebuffer allocation failed: {e}");
            DeviceError::ResourceAllocation {
                what: "framebuffer".to_string(),
            }
        })?;
        Ok(FramebufferId(
            self.framebuffers
                .borrow_mut()
                .insert(framebuffer)
                .data()
                .as_ffi(),
        ))
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        let native = framebuffer.and_then(|f| {
            self.framebuffers
                .borrow()
                .get(to_key::<FramebufferKey>(f.0))
                .copied()
        });
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, native) };
    }

    fn attach_color_texture(&self, texture: TextureId) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                self.texture(texture),
                0,
            );
        }
    }

    fn attach_depth_renderbuffer(&self, renderbuffer: RenderbufferId) {
        let native = self
            .renderbuffers
            .borrow()
            .get(to_key::<RenderbufferKey>(renderbuffer.0))
            .copied();
        unsafe {
            self.gl
                .framebuffer_renderbuffer(glow::FRAMEBUFFER, glow::DEPTH_ATTACHMENT, glow::RENDERBUFFER, native);
        }
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        let status = unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) };
        if status == glow::FRAMEBUFFER_COMPLETE {
            FramebufferStatus::Complete
        } else {
            FramebufferStatus::Incomplete(status)
        }
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        if let Some(native) = self
            .framebuffers
            .borrow_mut()
            .remove(to_key::<FramebufferKey>(framebuffer.0))
        {
            unsafe { self.gl.delete_framebuffer(native) };
        }
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> DeviceResult<ShaderId> {
        let gl_stage = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = self.gl.create_shader(gl_stage).map_err(|e| {
                debug!("shader allocation failed: {e}");
                DeviceError::ResourceAllocation {
                    what: "shader".to_string(),
                }
            })?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(DeviceError::ShaderCompile {
                    stage: stage.name(),
                    log,
                });
            }
            Ok(ShaderId(
                self.shaders.borrow_mut().insert(shader).data().as_ffi(),
            ))
        }
    }

    fn create_program(&self) -> DeviceResult<ProgramId> {
        let program = unsafe { self.gl.create_program() }.map_err(|e| {
            debug!("program allocation failed: {e}");
            DeviceError::ResourceAllocation {
                what: "program".to_string(),
            }
        })?;
        Ok(ProgramId(
            self.programs.borrow_mut().insert(program).data().as_ffi(),
        ))
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        let native_shader = self.shaders.borrow().get(to_key::<ShaderKey>(shader.0)).copied();
        if let (Some(p), Some(s)) = (self.program(program), native_shader) {
            unsafe { self.gl.attach_shader(p, s) };
        }
    }

    fn bind_attrib_location(&self, program: ProgramId, index: u32, name: &str) {
        if let Some(p) = self.program(program) {
            unsafe { self.gl.bind_attrib_location(p, index, name) };
        }
    }

    fn link_program(&self, program: ProgramId) -> DeviceResult<()> {
        let Some(p) = self.program(program) else {
            return Ok(());
        };
        unsafe {
            self.gl.link_program(p);
            if !self.gl.get_program_link_status(p) {
                return Err(DeviceError::ProgramLink {
                    log: self.gl.get_program_info_log(p),
                });
            }
        }
        Ok(())
    }

    fn delete_shader(&self, shader: ShaderId) {
        if let Some(native) = self
            .shaders
            .borrow_mut()
            .remove(to_key::<ShaderKey>(shader.0))
        {
            unsafe { self.gl.delete_shader(native) };
        }
    }

    fn delete_program(&self, program: ProgramId) {
        if let Some(native) = self
            .programs
            .borrow_mut()
            .remove(to_key::<ProgramKey>(program.0))
        {
            unsafe { self.gl.delete_program(native) };
        }
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform> {
        let Some(p) = self.program(program) else {
            return Vec::new();
        };
        unsafe {
            let count = self.gl.get_active_uniforms(p);
            (0..count)
                .filter_map(|i| self.gl.get_active_uniform(p, i))
                .map(|u| ActiveUniform {
                    name: u.name,
                    utype: map_uniform_type(u.utype),
                    size: u.size,
                })
                .collect()
        }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformId> {
        let p = self.program(program)?;
        let location = unsafe { self.gl.get_uniform_location(p, name) }?;
        Some(UniformId(
            self.uniforms.borrow_mut().insert(location).data().as_ffi(),
        ))
    }

    fn use_program(&self, program: Option<ProgramId>) {
        unsafe { self.gl.use_program(program.and_then(|p| self.program(p))) };
    }

    fn set_uniform_1i(&self, location: UniformId, value: i32) {
        if let Some(loc) = self.uniform(location) {
            unsafe { self.gl.uniform_1_i32(Some(&loc), value) };
        }
    }

    fn set_uniform_2f(&self, location: UniformId, value: [f32; 2]) {
        if let Some(loc) = self.uniform(location) {
            unsafe { self.gl.uniform_2_f32(Some(&loc), value[0], value[1]) };
        }
    }

    fn set_uniform_4f(&self, location: UniformId, value: [f32; 4]) {
        if let Some(loc) = self.uniform(location) {
            unsafe {
                self.gl
                    .uniform_4_f32(Some(&loc), value[0], value[1], value[2], value[3]);
            }
        }
    }

    fn set_uniform_mat4(&self, location: UniformId, value: &Mat4) {
        if let Some(loc) = self.uniform(location) {
            unsafe {
                self.gl
                    .uniform_matrix_4_f32_slice(Some(&loc), false, value.as_slice());
            }
        }
    }

    fn enable_depth_test(&self) {
        unsafe { self.gl.enable(glow::DEPTH_TEST) };
    }

    fn disable_dither(&self) {
        unsafe { self.gl.disable(glow::DITHER) };
    }

    fn depth_mask(&self, enabled: bool) {
        unsafe { self.gl.depth_mask(enabled) };
    }

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        unsafe { self.gl.viewport(x, y, width as i32, height as i32) };
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) };
    }

    fn clear(&self, flags: ClearFlags) {
        let mut mask = 0;
        if flags.contains(ClearFlags::COLOR) {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::DEPTH) {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        unsafe { self.gl.clear(mask) };
    }

    fn set_blend_mode(&self, mode: BlendMode) {
        unsafe {
            match mode {
                BlendMode::None => self.gl.disable(glow::BLEND),
                BlendMode::Alpha => {
                    self.gl.enable(glow::BLEND);
                    self.gl
                        .blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
                }
                BlendMode::Additive => {
                    self.gl.enable(glow::BLEND);
                    self.gl.blend_func(glow::SRC_ALPHA, glow::ONE);
                }
            }
        }
    }

    fn draw_triangles(&self, index_count: usize, first_index: usize) {
        unsafe {
            self.gl.draw_elements(
                glow::TRIANGLES,
                index_count as i32,
                glow::UNSIGNED_SHORT,
                (first_index * 2) as i32,
            );
        }
    }

    fn clear_errors(&self) {
        while unsafe { self.gl.get_error() } != glow::NO_ERROR {}
    }

    fn has_errors(&self) -> bool {
        unsafe { self.gl.get_error() != glow::NO_ERROR }
    }

    fn unbind_all(&self) {
        unsafe {
            for unit in 0..self.max_texture_units {
                self.gl.active_texture(glow::TEXTURE0 + unit);
                self.gl.bind_texture(glow::TEXTURE_2D, None);
            }
            self.gl.active_texture(glow::TEXTURE0);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }
}

//! # Renderer Facade
//!
//! Owns every GPU resource the sprite pipeline needs and sequences the
//! per-frame passes. Hosts construct one [`Renderer`] per context, draw
//! through its batches, and dispose it before dropping the context.
//!
//! ## Initialization
//!
//! Construction brings the pipeline up in a fixed order: global device
//! state, the offscreen framebuffer chain, sprite sheet textures, the
//! palette store, shader parsing, the shared quad index buffer, both
//! batches, and finally the eager compile of every standard program
//! variant. Failures split two ways. Losing the framebuffer chain or the
//! depth attachment only degrades the renderer; the corresponding
//! `failed_*` flag is raised and scene rendering continues against the
//! default target. Everything else is fatal: construction releases
//! whatever it already allocated and returns the error.
//!
//! ## Frame Loop
//!
//! A frame is `begin_frame`, scene drawing, optionally `begin_light_pass`
//! plus light drawing, then `end_frame`, which composites the scene and
//! light targets onto the default framebuffer with the merge program.
//! When the chain is unavailable the light pass reports `false` and the
//! merge pass is skipped, so the same host loop runs on degraded devices.

use std::rc::Rc;

use log::{info, warn};

use crate::config::RendererConfig;
use crate::foundation::color;
use crate::foundation::math::ortho_projection;
use crate::render::api::device::{
    BlendMode, BufferId, BufferUsage, ClearFlags, GlDevice,
};
use crate::render::batching::{DrawSurface, PaletteSpriteBatch, SpriteBatch};
use crate::render::resources::framebuffer::{
    create_framebuffer, dispose_framebuffer, Framebuffer,
};
use crate::render::resources::shader::{Shader, ShaderProgramData, ShaderSource};
use crate::render::resources::texture::Texture2d;
use crate::render::shaders::{LIGHT_SHADER, MERGE_SHADER, PALETTE_SHADER, SPRITE_SHADER};
use crate::render::sprites::{
    create_textures_for_sprite_sheets, dispose_textures_for_sprite_sheets, Palette,
    PaletteStore, SpriteSheet,
};
use crate::render::{GraphicsError, GraphicsResult};

/// Draw counters summed over both batches since the last `begin_frame`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Staged-region uploads submitted
    pub flushes: usize,
    /// Triangles drawn across all flushes
    pub drawn_triangles: usize,
}

/// Program variants compiled during initialization
///
/// Hosts select these directly for their passes; further variants can
/// still be compiled on demand through the owning [`Shader`]s.
#[derive(Debug)]
pub struct StandardPrograms {
    /// Scene and light composite
    pub merge: Rc<ShaderProgramData>,
    /// Indexed-color sprites
    pub palette: Rc<ShaderProgramData>,
    /// Indexed-color sprites with depth-buffered alpha discard
    pub palette_depth: Rc<ShaderProgramData>,
    /// Textured sprites modulated by vertex alpha
    pub sprite: Rc<ShaderProgramData>,
    /// Textured sprites modulated by the full vertex color
    pub sprite_color: Rc<ShaderProgramData>,
    /// Additive light sprites
    pub light: Rc<ShaderProgramData>,
}

/// Top-level owner of the sprite rendering pipeline
pub struct Renderer {
    device: Rc<dyn GlDevice>,
    width: u32,
    height: u32,
    background_color: u32,
    primary_target: Option<Framebuffer>,
    secondary_target: Option<Framebuffer>,
    failed_framebuffers: bool,
    failed_depth_buffer: bool,
    sheets: Vec<SpriteSheet>,
    /// Shared palette rows; call [`PaletteStore::init`] again after adding rows
    pub palettes: PaletteStore,
    default_palette: Rc<Palette>,
    merge_shader: Shader,
    palette_shader: Shader,
    sprite_shader: Shader,
    light_shader: Shader,
    /// Eagerly compiled program variants
    pub programs: StandardPrograms,
    /// Plain textured quad surface
    pub sprite_batch: SpriteBatch,
    /// Palette-resolved quad surface
    pub palette_batch: PaletteSpriteBatch,
    index_buffer: Option<BufferId>,
    renderer_name: String,
}

impl Renderer {
    /// Bring up the full pipeline against `device`
    ///
    /// Consumes the sprite sheets and uploads a texture for each one that
    /// carries pixel data. A missing framebuffer chain or depth buffer is
    /// tolerated and flagged; any other failure releases all resources
    /// allocated so far and is returned.
    pub fn new(
        device: Rc<dyn GlDevice>,
        config: &RendererConfig,
        sheets: Vec<SpriteSheet>,
    ) -> GraphicsResult<Self> {
        let width = config.width;
        let height = config.height;
        let mut sheets = sheets;

        device.enable_depth_test();
        device.disable_dither();

        let mut primary_target = None;
        let mut secondary_target = None;
        let mut failed_framebuffers = false;
        let mut failed_depth_buffer = false;
        match build_chain(&*device, width, height) {
            Ok((primary, secondary)) => {
                failed_depth_buffer = primary.depth_renderbuffer.is_none();
                primary_target = Some(primary);
                secondary_target = Some(secondary);
            }
            Err(e) => {
                warn!("frame buffer chain is not available: {e}");
                failed_framebuffers = true;
                failed_depth_buffer = true;
            }
        }

        let mut palettes = PaletteStore::new();

        if let Err(e) = create_textures_for_sprite_sheets(&*device, &mut sheets) {
            abort_init(
                &*device,
                primary_target,
                secondary_target,
                &mut sheets,
                &mut palettes,
                None,
            );
            return Err(e);
        }

        let default_palette = palettes.add(&[color::WHITE]);
        if let Err(e) = palettes.init(&*device) {
            abort_init(
                &*device,
                primary_target,
                secondary_target,
                &mut sheets,
                &mut palettes,
                None,
            );
            return Err(e);
        }

        let (mut merge_shader, mut palette_shader, mut sprite_shader, mut light_shader) =
            match parse_shader_set() {
                Ok(set) => set,
                Err(e) => {
                    abort_init(
                        &*device,
                        primary_target,
                        secondary_target,
                        &mut sheets,
                        &mut palettes,
                        None,
                    );
                    return Err(e);
                }
            };

        let index_buffer = match device.create_buffer() {
            Ok(buffer) => buffer,
            Err(e) => {
                abort_init(
                    &*device,
                    primary_target,
                    secondary_target,
                    &mut sheets,
                    &mut palettes,
                    None,
                );
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "shared quad index buffer: {e}"
                )));
            }
        };
        device.bind_index_buffer(Some(index_buffer));
        device.index_buffer_data_u16(
            &create_indices(config.batch_vertex_capacity),
            BufferUsage::Static,
        );
        device.bind_index_buffer(None);

        let mut sprite_batch = match SpriteBatch::new(
            Rc::clone(&device),
            config.batch_vertex_capacity,
            index_buffer,
        ) {
            Ok(batch) => batch,
            Err(e) => {
                abort_init(
                    &*device,
                    primary_target,
                    secondary_target,
                    &mut sheets,
                    &mut palettes,
                    Some(index_buffer),
                );
                return Err(e);
            }
        };
        let mut palette_batch = match PaletteSpriteBatch::new(
            Rc::clone(&device),
            config.batch_vertex_capacity,
            index_buffer,
        ) {
            Ok(batch) => batch,
            Err(e) => {
                sprite_batch.core.dispose();
                abort_init(
                    &*device,
                    primary_target,
                    secondary_target,
                    &mut sheets,
                    &mut palettes,
                    Some(index_buffer),
                );
                return Err(e);
            }
        };
        palette_batch.default_palette = Some(Rc::clone(&default_palette));

        let renderer_name = device.capabilities().renderer_name.unwrap_or_default();

        let programs = match compile_standard_programs(
            &*device,
            &mut merge_shader,
            &mut palette_shader,
            &mut sprite_shader,
            &mut light_shader,
        ) {
            Ok(programs) => programs,
            Err(e) => {
                merge_shader.dispose(&*device);
                palette_shader.dispose(&*device);
                sprite_shader.dispose(&*device);
                light_shader.dispose(&*device);
                sprite_batch.core.dispose();
                palette_batch.core.dispose();
                abort_init(
                    &*device,
                    primary_target,
                    secondary_target,
                    &mut sheets,
                    &mut palettes,
                    Some(index_buffer),
                );
                return Err(e);
            }
        };

        if renderer_name.is_empty() {
            info!("sprite renderer initialized at {width}x{height}");
        } else {
            info!("sprite renderer initialized at {width}x{height} on {renderer_name}");
        }

        Ok(Self {
            device,
            width,
            height,
            background_color: config.background_color,
            primary_target,
            secondary_target,
            failed_framebuffers,
            failed_depth_buffer,
            sheets,
            palettes,
            default_palette,
            merge_shader,
            palette_shader,
            sprite_shader,
            light_shader,
            programs,
            sprite_batch,
            palette_batch,
            index_buffer: Some(index_buffer),
            renderer_name,
        })
    }

    /// Start a frame on the scene target
    ///
    /// Resets the frame counters, binds the primary target (or the default
    /// framebuffer when the chain is unavailable), clears color and depth,
    /// and selects alpha blending. Depth writes stay off afterwards; passes
    /// that want them toggle the mask themselves.
    pub fn begin_frame(&mut self) {
        self.sprite_batch.core.reset_stats();
        self.palette_batch.core.reset_stats();

        self.device
            .bind_framebuffer(self.primary_target.as_ref().map(|target| target.id));
        self.device.viewport(0, 0, self.width, self.height);
        let [r, g, b, a] = color::to_floats(self.background_color);
        self.device.clear_color(r, g, b, a);
        self.device.depth_mask(true);
        self.device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
        self.device.depth_mask(false);
        self.device.set_blend_mode(BlendMode::Alpha);
    }

    /// Switch to the light accumulation target
    ///
    /// Clears it to `ambient_color` and selects additive blending. Returns
    /// `false` without touching device state when the framebuffer chain is
    /// unavailable; hosts skip their light drawing in that case. End any
    /// open batch before switching targets.
    pub fn begin_light_pass(&mut self, ambient_color: u32) -> bool {
        let Some(secondary) = &self.secondary_target else {
            return false;
        };

        self.device.bind_framebuffer(Some(secondary.id));
        self.device.viewport(0, 0, self.width, self.height);
        let [r, g, b, a] = color::to_floats(ambient_color);
        self.device.clear_color(r, g, b, a);
        self.device.clear(ClearFlags::COLOR);
        self.device.set_blend_mode(BlendMode::Additive);
        true
    }

    /// Composite the scene and light targets onto the default framebuffer
    ///
    /// A no-op when the framebuffer chain is unavailable, since scene work
    /// already went to the default target. Leaves alpha blending selected.
    pub fn end_frame(&mut self) -> GraphicsResult<()> {
        let (Some(primary), Some(secondary)) = (&self.primary_target, &self.secondary_target)
        else {
            return Ok(());
        };
        let scene = primary.color_texture.id;
        let light = secondary.color_texture.id;

        self.device.bind_framebuffer(None);
        self.device.viewport(0, 0, self.width, self.height);
        self.device.set_blend_mode(BlendMode::None);
        self.device.use_program(Some(self.programs.merge.program));

        let width = self.width as f32;
        let height = self.height as f32;
        if let Some(location) = self.programs.merge.uniform("transform") {
            self.device
                .set_uniform_mat4(location, &ortho_projection(width, height));
        }
        if let Some(location) = self.programs.merge.uniform("textureSize") {
            self.device.set_uniform_2f(location, [width, height]);
        }

        // Sampler units were assigned in name order at link time.
        self.device.bind_texture(0, Some(light));
        self.device.bind_texture(1, Some(scene));

        // Target textures are stored bottom-up; flip the source rect.
        self.sprite_batch.core.begin()?;
        self.sprite_batch
            .draw_image(color::WHITE, 0.0, height, width, -height, 0.0, 0.0, width, height)?;
        self.sprite_batch.core.end()?;

        self.device.bind_texture(1, None);
        self.device.bind_texture(0, None);
        self.device.use_program(None);
        self.device.set_blend_mode(BlendMode::Alpha);
        Ok(())
    }

    /// Rebuild the framebuffer chain for a new surface size
    ///
    /// Keeps the degraded state sticky: once the chain has failed, resizes
    /// only record the new dimensions. Losing the chain during a resize
    /// degrades the renderer the same way construction would have.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if self.failed_framebuffers {
            return;
        }

        self.secondary_target = dispose_framebuffer(&*self.device, self.secondary_target.take());
        self.primary_target = dispose_framebuffer(&*self.device, self.primary_target.take());
        match build_chain(&*self.device, width, height) {
            Ok((primary, secondary)) => {
                self.failed_depth_buffer = primary.depth_renderbuffer.is_none();
                self.primary_target = Some(primary);
                self.secondary_target = Some(secondary);
            }
            Err(e) => {
                warn!("frame buffer chain lost on resize: {e}");
                self.failed_framebuffers = true;
                self.failed_depth_buffer = true;
            }
        }
    }

    /// Select a program and set its projection uniform for the current size
    pub fn use_program(&self, program: &ShaderProgramData) {
        self.device.use_program(Some(program.program));
        if let Some(location) = program.uniform("transform") {
            let projection = ortho_projection(self.width as f32, self.height as f32);
            self.device.set_uniform_mat4(location, &projection);
        }
    }

    /// Bind a sheet texture on `unit` and point the size uniform at it
    ///
    /// The unit is 0 for the sprite and light programs. The palette program
    /// keeps its lookup texture on unit 0, so sheets bind on unit 1 there.
    pub fn bind_sheet_texture(&self, program: &ShaderProgramData, unit: u32, texture: &Texture2d) {
        self.device.bind_texture(unit, Some(texture.id));
        if let Some(location) = program.uniform("textureSize") {
            self.device
                .set_uniform_2f(location, [texture.width as f32, texture.height as f32]);
        }
    }

    /// Bind the palette lookup texture and its size uniform
    ///
    /// `paletteSampler` precedes `textureSampler` in name order, so the
    /// lookup texture owns unit 0. A no-op before [`PaletteStore::init`]
    /// has uploaded the texture.
    pub fn bind_palette_texture(&self, program: &ShaderProgramData) {
        let Some(texture) = self.palettes.texture() else {
            return;
        };
        self.device.bind_texture(0, Some(texture.id));
        if let Some(location) = program.uniform("paletteSize") {
            self.device
                .set_uniform_2f(location, [texture.width as f32, texture.height as f32]);
        }
    }

    /// Draw counters accumulated since the last [`Renderer::begin_frame`]
    #[must_use]
    pub fn frame_stats(&self) -> FrameStats {
        let sprite = self.sprite_batch.core.stats();
        let palette = self.palette_batch.core.stats();
        FrameStats {
            flushes: sprite.flushes + palette.flushes,
            drawn_triangles: sprite.drawn_triangles + palette.drawn_triangles,
        }
    }

    /// The device this renderer draws through
    #[must_use]
    pub fn device(&self) -> &dyn GlDevice {
        &*self.device
    }

    /// Surface width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Surface height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Device-reported renderer string, empty when unavailable
    #[must_use]
    pub fn renderer_name(&self) -> &str {
        &self.renderer_name
    }

    /// Whether the offscreen chain failed and rendering targets the default
    /// framebuffer directly
    #[must_use]
    pub fn failed_framebuffers(&self) -> bool {
        self.failed_framebuffers
    }

    /// Whether the scene target is missing its depth attachment
    #[must_use]
    pub fn failed_depth_buffer(&self) -> bool {
        self.failed_depth_buffer
    }

    /// Scene render target, absent when the chain failed
    #[must_use]
    pub fn primary_target(&self) -> Option<&Framebuffer> {
        self.primary_target.as_ref()
    }

    /// Light render target, absent when the chain failed
    #[must_use]
    pub fn secondary_target(&self) -> Option<&Framebuffer> {
        self.secondary_target.as_ref()
    }

    /// Sprite sheets owned by this renderer, in construction order
    #[must_use]
    pub fn sheets(&self) -> &[SpriteSheet] {
        &self.sheets
    }

    /// Palette shared by draws that pass no explicit palette
    #[must_use]
    pub fn default_palette(&self) -> &Rc<Palette> {
        &self.default_palette
    }

    /// Whether [`Renderer::dispose`] has run
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.index_buffer.is_none()
    }

    /// Release every GPU resource this renderer owns
    ///
    /// Unbinds all targets first so nothing is deleted while bound, then
    /// tears down in reverse construction order. Safe to call more than
    /// once.
    pub fn dispose(&mut self) {
        self.device.unbind_all();

        self.sprite_batch.core.dispose();
        self.palette_batch.core.dispose();
        self.secondary_target = dispose_framebuffer(&*self.device, self.secondary_target.take());
        self.primary_target = dispose_framebuffer(&*self.device, self.primary_target.take());
        self.merge_shader.dispose(&*self.device);
        self.palette_shader.dispose(&*self.device);
        self.sprite_shader.dispose(&*self.device);
        self.light_shader.dispose(&*self.device);
        dispose_textures_for_sprite_sheets(&*self.device, &mut self.sheets);
        self.palettes.dispose(&*self.device);
        if let Some(buffer) = self.index_buffer.take() {
            self.device.delete_buffer(buffer);
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("failed_framebuffers", &self.failed_framebuffers)
            .field("failed_depth_buffer", &self.failed_depth_buffer)
            .field("sheets", &self.sheets.len())
            .field("renderer_name", &self.renderer_name)
            .finish_non_exhaustive()
    }
}

/// Create the scene and light targets; the light target borrows the scene
/// target's depth renderbuffer so depth-aware light sprites test against
/// scene geometry.
fn build_chain(
    device: &dyn GlDevice,
    width: u32,
    height: u32,
) -> GraphicsResult<(Framebuffer, Framebuffer)> {
    let primary = create_framebuffer(device, width, height, true, None)?;
    let secondary =
        match create_framebuffer(device, width, height, false, primary.depth_renderbuffer) {
            Ok(buffer) => buffer,
            Err(e) => {
                dispose_framebuffer(device, Some(primary));
                return Err(e);
            }
        };
    Ok((primary, secondary))
}

fn parse_shader_set() -> GraphicsResult<(Shader, Shader, Shader, Shader)> {
    Ok((
        Shader::new(ShaderSource::parse(MERGE_SHADER)?),
        Shader::new(ShaderSource::parse(PALETTE_SHADER)?),
        Shader::new(ShaderSource::parse(SPRITE_SHADER)?),
        Shader::new(ShaderSource::parse(LIGHT_SHADER)?),
    ))
}

fn compile_standard_programs(
    device: &dyn GlDevice,
    merge: &mut Shader,
    palette: &mut Shader,
    sprite: &mut Shader,
    light: &mut Shader,
) -> GraphicsResult<StandardPrograms> {
    Ok(StandardPrograms {
        merge: merge.compile(device, &[])?,
        palette: palette.compile(device, &[])?,
        palette_depth: palette.compile(device, &["DEPTH_BUFFERED"])?,
        sprite: sprite.compile(device, &[])?,
        sprite_color: sprite.compile(device, &["USE_COLOR"])?,
        light: light.compile(device, &[])?,
    })
}

/// Two-triangle index pattern for `vertex_count` quad vertices
///
/// Every four vertices form a quad drawn as triangles (0, 1, 2) and
/// (0, 2, 3), offset by the quad's base vertex.
fn create_indices(vertex_count: usize) -> Vec<u16> {
    debug_assert!(vertex_count <= usize::from(u16::MAX) + 1);
    let mut indices = vec![0_u16; vertex_count * 6 / 4];
    for (quad, chunk) in indices.chunks_exact_mut(6).enumerate() {
        let base = (quad * 4) as u16;
        chunk.copy_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    indices
}

fn abort_init(
    device: &dyn GlDevice,
    primary_target: Option<Framebuffer>,
    secondary_target: Option<Framebuffer>,
    sheets: &mut [SpriteSheet],
    palettes: &mut PaletteStore,
    index_buffer: Option<BufferId>,
) {
    dispose_framebuffer(device, secondary_target);
    dispose_framebuffer(device, primary_target);
    dispose_textures_for_sprite_sheets(device, sheets);
    palettes.dispose(device);
    if let Some(buffer) = index_buffer {
        device.delete_buffer(buffer);
    }
    device.unbind_all();
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, RgbaImage};

    use super::*;
    use crate::render::backends::headless::{DeviceCall, HeadlessDevice};
    use crate::render::sprites::Sprite;

    fn test_config() -> RendererConfig {
        RendererConfig {
            width: 640,
            height: 360,
            batch_vertex_capacity: 64,
            background_color: color::BLACK,
        }
    }

    fn test_sheets() -> Vec<SpriteSheet> {
        vec![
            SpriteSheet::rgba(
                vec![Sprite::new(0.0, 0.0, 4.0, 4.0, 0.0, 0.0)],
                RgbaImage::new(4, 4),
            ),
            SpriteSheet::single_channel(Vec::new(), GrayImage::new(4, 4)),
        ]
    }

    fn init_renderer() -> (Rc<HeadlessDevice>, Renderer) {
        let device = Rc::new(HeadlessDevice::new());
        let renderer = Renderer::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            &test_config(),
            test_sheets(),
        )
        .unwrap();
        (device, renderer)
    }

    #[test]
    fn test_init_builds_standard_resources() {
        let (device, renderer) = init_renderer();

        assert_eq!(device.alive_framebuffers(), 2);
        assert_eq!(device.alive_renderbuffers(), 1);
        assert_eq!(device.alive_programs(), 6);
        assert_eq!(device.alive_vertex_layouts(), 2);
        // Shared index buffer plus one vertex buffer per batch.
        assert_eq!(device.alive_buffers(), 3);
        // Two chain color textures, two sheets, one palette.
        assert_eq!(device.alive_textures(), 5);

        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::EnableDepthTest)),
            1
        );
        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::DisableDither)),
            1
        );
        assert!(!renderer.failed_framebuffers());
        assert!(!renderer.failed_depth_buffer());
        assert!(renderer.palette_batch.default_palette.is_some());
        assert_eq!(renderer.default_palette().v, 0.0);
        assert_eq!(renderer.sheets().len(), 2);
    }

    #[test]
    fn test_init_uploads_quad_index_buffer_once() {
        let (device, _renderer) = init_renderer();

        assert_eq!(
            device.count_calls(|call| matches!(
                call,
                DeviceCall::IndexBufferData {
                    indices: 96,
                    usage: BufferUsage::Static,
                }
            )),
            1
        );
    }

    #[test]
    fn test_create_indices_pattern() {
        assert_eq!(create_indices(8), vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
        assert_eq!(create_indices(4).len(), 6);
    }

    #[test]
    fn test_missing_framebuffer_chain_degrades() {
        let device = Rc::new(HeadlessDevice::new());
        device.fail_framebuffer_alloc();
        let mut renderer = Renderer::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            &test_config(),
            test_sheets(),
        )
        .unwrap();

        assert!(renderer.failed_framebuffers());
        assert!(renderer.failed_depth_buffer());
        assert!(renderer.primary_target().is_none());
        assert_eq!(device.alive_framebuffers(), 0);
        assert_eq!(device.alive_programs(), 6);

        device.clear_calls();
        renderer.begin_frame();
        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::BindFramebuffer(None))),
            1
        );
    }

    #[test]
    fn test_missing_depth_buffer_flagged_without_losing_chain() {
        let device = Rc::new(HeadlessDevice::new());
        device.fail_renderbuffer_alloc();
        let renderer = Renderer::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            &test_config(),
            test_sheets(),
        )
        .unwrap();

        assert!(!renderer.failed_framebuffers());
        assert!(renderer.failed_depth_buffer());
        assert_eq!(device.alive_framebuffers(), 2);
        assert!(renderer.primary_target().unwrap().depth_renderbuffer.is_none());
    }

    #[test]
    fn test_fatal_init_failure_releases_everything() {
        let device = Rc::new(HeadlessDevice::new());
        device.fail_link("no varyings");
        let result = Renderer::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            &test_config(),
            test_sheets(),
        );

        assert!(matches!(result, Err(GraphicsError::Device(_))));
        assert_eq!(device.alive_buffers(), 0);
        assert_eq!(device.alive_textures(), 0);
        assert_eq!(device.alive_renderbuffers(), 0);
        assert_eq!(device.alive_framebuffers(), 0);
        assert_eq!(device.alive_programs(), 0);
        assert_eq!(device.alive_shaders(), 0);
        assert_eq!(device.alive_vertex_layouts(), 0);
    }

    #[test]
    fn test_begin_frame_clears_scene_target() {
        let (device, mut renderer) = init_renderer();
        let primary = renderer.primary_target().unwrap().id;

        device.clear_calls();
        renderer.begin_frame();

        let calls = device.calls();
        assert!(calls.contains(&DeviceCall::BindFramebuffer(Some(primary))));
        assert!(calls.contains(&DeviceCall::Viewport {
            x: 0,
            y: 0,
            width: 640,
            height: 360,
        }));
        let clear_at = calls
            .iter()
            .position(|call| matches!(call, DeviceCall::Clear(_)))
            .unwrap();
        assert_eq!(calls[clear_at], DeviceCall::Clear(ClearFlags::COLOR | ClearFlags::DEPTH));
        assert_eq!(calls[clear_at - 1], DeviceCall::DepthMask(true));
        assert_eq!(calls[clear_at + 1], DeviceCall::DepthMask(false));
        assert_eq!(*calls.last().unwrap(), DeviceCall::SetBlendMode(BlendMode::Alpha));
        assert_eq!(renderer.frame_stats(), FrameStats::default());
    }

    #[test]
    fn test_begin_light_pass_targets_light_buffer() {
        let (device, mut renderer) = init_renderer();
        let secondary = renderer.secondary_target().unwrap().id;

        renderer.begin_frame();
        device.clear_calls();
        assert!(renderer.begin_light_pass(color::rgba(16, 16, 16, 255)));

        let calls = device.calls();
        assert!(calls.contains(&DeviceCall::BindFramebuffer(Some(secondary))));
        assert!(calls.contains(&DeviceCall::Clear(ClearFlags::COLOR)));
        assert!(!calls.contains(&DeviceCall::Clear(ClearFlags::COLOR | ClearFlags::DEPTH)));
        assert_eq!(
            *calls.last().unwrap(),
            DeviceCall::SetBlendMode(BlendMode::Additive)
        );
    }

    #[test]
    fn test_light_pass_reports_degraded_chain() {
        let device = Rc::new(HeadlessDevice::new());
        device.fail_framebuffer_alloc();
        let mut renderer = Renderer::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            &test_config(),
            test_sheets(),
        )
        .unwrap();

        renderer.begin_frame();
        device.clear_calls();
        assert!(!renderer.begin_light_pass(color::BLACK));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_end_frame_merges_targets_to_default_framebuffer() {
        let (device, mut renderer) = init_renderer();
        let scene = renderer.primary_target().unwrap().color_texture.id;
        let light = renderer.secondary_target().unwrap().color_texture.id;
        let merge_program = renderer.programs.merge.program;

        renderer.begin_frame();
        device.clear_calls();
        renderer.end_frame().unwrap();

        let calls = device.calls();
        assert!(calls.contains(&DeviceCall::BindFramebuffer(None)));
        assert!(calls.contains(&DeviceCall::SetBlendMode(BlendMode::None)));
        assert!(calls.contains(&DeviceCall::UseProgram(Some(merge_program))));
        assert!(calls.contains(&DeviceCall::BindTexture {
            unit: 0,
            texture: Some(light),
        }));
        assert!(calls.contains(&DeviceCall::BindTexture {
            unit: 1,
            texture: Some(scene),
        }));
        assert!(calls
            .iter()
            .any(|call| matches!(call, DeviceCall::SetUniformMat4 { .. })));
        assert!(calls.iter().any(|call| matches!(
            call,
            DeviceCall::SetUniform2f {
                value: [640.0, 360.0],
                ..
            }
        )));
        assert!(calls.contains(&DeviceCall::DrawTriangles {
            index_count: 6,
            first_index: 0,
        }));
        assert_eq!(*calls.last().unwrap(), DeviceCall::SetBlendMode(BlendMode::Alpha));
        assert_eq!(renderer.frame_stats().drawn_triangles, 2);
    }

    #[test]
    fn test_end_frame_without_chain_is_noop() {
        let device = Rc::new(HeadlessDevice::new());
        device.fail_framebuffer_alloc();
        let mut renderer = Renderer::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            &test_config(),
            test_sheets(),
        )
        .unwrap();

        renderer.begin_frame();
        device.clear_calls();
        renderer.end_frame().unwrap();
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_resize_rebuilds_chain_at_new_size() {
        let (device, mut renderer) = init_renderer();
        device.clear_calls();

        renderer.resize(320, 240);

        assert_eq!(renderer.width(), 320);
        assert_eq!(renderer.height(), 240);
        assert_eq!(device.alive_framebuffers(), 2);
        assert_eq!(device.alive_renderbuffers(), 1);
        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::DeleteFramebuffer(_))),
            2
        );
        assert_eq!(
            device.count_calls(|call| matches!(
                call,
                DeviceCall::RenderbufferStorageDepth {
                    width: 320,
                    height: 240,
                }
            )),
            1
        );

        let primary = renderer.primary_target().unwrap();
        let secondary = renderer.secondary_target().unwrap();
        assert!(primary.owns_depth);
        assert!(!secondary.owns_depth);
        assert_eq!(secondary.depth_renderbuffer, primary.depth_renderbuffer);
    }

    #[test]
    fn test_resize_after_chain_failure_only_records_size() {
        let device = Rc::new(HeadlessDevice::new());
        device.fail_framebuffer_alloc();
        let mut renderer = Renderer::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            &test_config(),
            test_sheets(),
        )
        .unwrap();

        device.clear_calls();
        renderer.resize(100, 50);
        assert_eq!(renderer.width(), 100);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_frame_stats_sum_both_batches() {
        let (_device, mut renderer) = init_renderer();
        renderer.begin_frame();

        renderer.sprite_batch.core.begin().unwrap();
        renderer
            .sprite_batch
            .draw_rect(color::WHITE, 0.0, 0.0, 8.0, 8.0)
            .unwrap();
        renderer.sprite_batch.core.end().unwrap();

        renderer.palette_batch.core.begin().unwrap();
        renderer
            .palette_batch
            .draw_rect(color::WHITE, 4.0, 4.0, 8.0, 8.0)
            .unwrap();
        renderer.palette_batch.core.end().unwrap();

        let stats = renderer.frame_stats();
        assert_eq!(stats.flushes, 2);
        assert_eq!(stats.drawn_triangles, 4);

        renderer.begin_frame();
        assert_eq!(renderer.frame_stats(), FrameStats::default());
    }

    #[test]
    fn test_use_program_applies_projection() {
        let (device, renderer) = init_renderer();
        device.clear_calls();

        renderer.use_program(&renderer.programs.sprite);

        let calls = device.calls();
        assert_eq!(
            calls[0],
            DeviceCall::UseProgram(Some(renderer.programs.sprite.program))
        );
        assert!(matches!(calls[1], DeviceCall::SetUniformMat4 { .. }));
    }

    #[test]
    fn test_bind_sheet_texture_sets_size_uniform() {
        let (device, renderer) = init_renderer();
        let texture = renderer.sheets()[0].texture.as_ref().unwrap().clone();

        renderer.use_program(&renderer.programs.sprite);
        device.clear_calls();
        renderer.bind_sheet_texture(&renderer.programs.sprite, 0, &texture);

        let calls = device.calls();
        assert_eq!(
            calls[0],
            DeviceCall::BindTexture {
                unit: 0,
                texture: Some(texture.id),
            }
        );
        assert!(matches!(
            calls[1],
            DeviceCall::SetUniform2f {
                value: [4.0, 4.0],
                ..
            }
        ));
    }

    #[test]
    fn test_bind_palette_texture_uses_unit_zero() {
        let (device, renderer) = init_renderer();
        let palette_texture = renderer.palettes.texture().unwrap().id;

        renderer.use_program(&renderer.programs.palette);
        device.clear_calls();
        renderer.bind_palette_texture(&renderer.programs.palette);

        let calls = device.calls();
        assert_eq!(
            calls[0],
            DeviceCall::BindTexture {
                unit: 0,
                texture: Some(palette_texture),
            }
        );
        // The default palette makes a single one-texel row.
        assert!(matches!(
            calls[1],
            DeviceCall::SetUniform2f {
                value: [1.0, 1.0],
                ..
            }
        ));
    }

    #[test]
    fn test_dispose_releases_everything_once() {
        let (device, mut renderer) = init_renderer();

        renderer.dispose();
        assert!(renderer.is_disposed());
        assert_eq!(device.alive_buffers(), 0);
        assert_eq!(device.alive_textures(), 0);
        assert_eq!(device.alive_renderbuffers(), 0);
        assert_eq!(device.alive_framebuffers(), 0);
        assert_eq!(device.alive_programs(), 0);
        assert_eq!(device.alive_vertex_layouts(), 0);
        assert!(device.count_calls(|call| matches!(call, DeviceCall::UnbindAll)) >= 1);

        let deletes = device.count_calls(|call| {
            matches!(
                call,
                DeviceCall::DeleteBuffer(_)
                    | DeviceCall::DeleteTexture(_)
                    | DeviceCall::DeleteRenderbuffer(_)
                    | DeviceCall::DeleteFramebuffer(_)
                    | DeviceCall::DeleteProgram(_)
                    | DeviceCall::DeleteVertexLayout(_)
            )
        });
        renderer.dispose();
        assert_eq!(
            device.count_calls(|call| {
                matches!(
                    call,
                    DeviceCall::DeleteBuffer(_)
                        | DeviceCall::DeleteTexture(_)
                        | DeviceCall::DeleteRenderbuffer(_)
                        | DeviceCall::DeleteFramebuffer(_)
                        | DeviceCall::DeleteProgram(_)
                        | DeviceCall::DeleteVertexLayout(_)
                )
            }),
            deletes
        );
    }
}

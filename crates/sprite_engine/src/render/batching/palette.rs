//! Palette-lookup batch
//!
//! Extends the sprite layout with a second texture coordinate carrying the
//! palette row base in palette-texture texels. The palette fragment stage
//! reads a color index from the sheet texture and resolves it against that
//! row. Draws that name no palette fall back to the batch default, then to
//! row zero.

use std::rc::Rc;

use crate::foundation::color::get_color_float;
use crate::foundation::math::Mat2d;
use crate::render::api::device::{BufferId, GlDevice};
use crate::render::batching::layout::VertexAttribute;
use crate::render::batching::{Batch, BatchCore, BatchResult, DrawSurface};
use crate::render::sprites::{Palette, Sprite};
use crate::render::GraphicsResult;

/// Vertex layout of the palette pipeline
///
/// Array order fixes the attribute binding indices, which must match the
/// declaration order in the palette shader's vertex stage.
pub const PALETTE_ATTRIBUTES: [VertexAttribute; 4] = [
    VertexAttribute::float("position", 3),
    VertexAttribute::float("texcoord0", 2),
    VertexAttribute::float("texcoord1", 2),
    VertexAttribute::normalized_u8("color", 4),
];

#[allow(clippy::too_many_arguments)]
fn write_vertex(
    slot: &mut [f32],
    at: usize,
    x: f32,
    y: f32,
    depth: f32,
    u: f32,
    v: f32,
    pu: f32,
    pv: f32,
    c: f32,
    t: &Mat2d,
) {
    let m = &t.0;
    slot[at] = m[0] * x + m[2] * y + m[4];
    slot[at + 1] = m[1] * x + m[3] * y + m[5];
    slot[at + 2] = depth;
    slot[at + 3] = u;
    slot[at + 4] = v;
    slot[at + 5] = pu;
    slot[at + 6] = pv;
    slot[at + 7] = c;
}

/// Batches palette-resolved quads over a shared index buffer
pub struct PaletteSpriteBatch {
    /// Staging, flush, capture and draw-state machinery
    pub core: BatchCore,
    /// Atlas region used by `draw_rect`, normally an opaque white texel
    pub rect_sprite: Option<Sprite>,
    /// Palette used when a draw call names none
    pub default_palette: Option<Rc<Palette>>,
}

impl PaletteSpriteBatch {
    /// Build a batch staging up to `vertex_capacity_max` vertices
    pub fn new(
        device: Rc<dyn GlDevice>,
        vertex_capacity_max: usize,
        index_buffer: BufferId,
    ) -> GraphicsResult<Self> {
        Ok(Self {
            core: BatchCore::new(device, vertex_capacity_max, index_buffer, &PALETTE_ATTRIBUTES)?,
            rect_sprite: None,
            default_palette: None,
        })
    }

    fn resolve_palette(&self, palette: Option<&Rc<Palette>>) -> (f32, f32) {
        match palette.or(self.default_palette.as_ref()) {
            Some(p) => (p.u, p.v),
            None => (0.0, 0.0),
        }
    }

    /// Append one quad resolved against the given palette row
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image_with_palette(
        &mut self,
        color: u32,
        palette: Option<&Rc<Palette>>,
        src_x: f32,
        src_y: f32,
        src_w: f32,
        src_h: f32,
        dst_x: f32,
        dst_y: f32,
        dst_w: f32,
        dst_h: f32,
    ) -> BatchResult<()> {
        let (pu, pv) = self.resolve_palette(palette);
        let c = get_color_float(color, self.core.global_alpha());
        let depth = self.core.depth();
        let transform = self.core.transform();

        let x2 = dst_x + dst_w;
        let y2 = dst_y + dst_h;
        let u2 = src_x + src_w;
        let v2 = src_y + src_h;

        let slot = self.core.begin_quad()?;
        write_vertex(slot, 0, dst_x, dst_y, depth, src_x, src_y, pu, pv, c, &transform);
        write_vertex(slot, 8, x2, dst_y, depth, u2, src_y, pu, pv, c, &transform);
        write_vertex(slot, 16, x2, y2, depth, u2, v2, pu, pv, c, &transform);
        write_vertex(slot, 24, dst_x, y2, depth, src_x, v2, pu, pv, c, &transform);
        self.core.commit_quad();
        Ok(())
    }

    /// Append a sprite resolved against the given palette row; no-op for
    /// zero-sized sprites
    pub fn draw_sprite_with_palette(
        &mut self,
        sprite: &Sprite,
        color: u32,
        palette: Option<&Rc<Palette>>,
        x: f32,
        y: f32,
    ) -> BatchResult<()> {
        if sprite.w == 0.0 || sprite.h == 0.0 {
            return Ok(());
        }
        self.draw_image_with_palette(
            color,
            palette,
            sprite.x,
            sprite.y,
            sprite.w,
            sprite.h,
            x + sprite.ox,
            y + sprite.oy,
            sprite.w,
            sprite.h,
        )
    }
}

impl DrawSurface for PaletteSpriteBatch {
    fn draw_image(
        &mut self,
        color: u32,
        src_x: f32,
        src_y: f32,
        src_w: f32,
        src_h: f32,
        dst_x: f32,
        dst_y: f32,
        dst_w: f32,
        dst_h: f32,
    ) -> BatchResult<()> {
        self.draw_image_with_palette(
            color, None, src_x, src_y, src_w, src_h, dst_x, dst_y, dst_w, dst_h,
        )
    }

    fn draw_rect(&mut self, color: u32, x: f32, y: f32, w: f32, h: f32) -> BatchResult<()> {
        if w == 0.0 || h == 0.0 {
            return Ok(());
        }
        match self.rect_sprite {
            Some(rect) => self.draw_image(color, rect.x, rect.y, rect.w, rect.h, x, y, w, h),
            None => self.draw_image(color, 0.0, 0.0, 1.0, 1.0, x, y, w, h),
        }
    }

    fn draw_sprite(&mut self, sprite: &Sprite, color: u32, x: f32, y: f32) -> BatchResult<()> {
        self.draw_sprite_with_palette(sprite, color, None, x, y)
    }

    fn start_batch(&mut self) -> BatchResult<()> {
        self.core.start_batch()
    }

    fn finish_batch(&mut self) -> BatchResult<Option<Batch>> {
        self.core.finish_batch()
    }

    fn draw_batch(&mut self, batch: &Batch) -> BatchResult<()> {
        self.core.draw_batch(batch)
    }

    fn release_batch(&mut self, batch: Batch) {
        self.core.release_batch(batch);
    }
}

//! Plain textured-quad batch
//!
//! Vertex layout `position(3), texcoord0(2), color(4 normalized u8)`, six
//! f32 slots per vertex. Texture coordinates are written in atlas pixels;
//! the sprite shader divides by the texture size.

use std::rc::Rc;

use crate::foundation::color::get_color_float;
use crate::foundation::math::Mat2d;
use crate::render::api::device::{BufferId, GlDevice};
use crate::render::batching::layout::VertexAttribute;
use crate::render::batching::{Batch, BatchCore, BatchResult, DrawSurface};
use crate::render::sprites::Sprite;
use crate::render::GraphicsResult;

/// Vertex layout of the plain sprite pipeline
///
/// Array order fixes the attribute binding indices, which must match the
/// declaration order in the sprite shader's vertex stage.
pub const SPRITE_ATTRIBUTES: [VertexAttribute; 3] = [
    VertexAttribute::float("position", 3),
    VertexAttribute::float("texcoord0", 2),
    VertexAttribute::normalized_u8("color", 4),
];

fn write_vertex(
    slot: &mut [f32],
    at: usize,
    x: f32,
    y: f32,
    depth: f32,
    u: f32,
    v: f32,
    c: f32,
    t: &Mat2d,
) {
    let m = &t.0;
    slot[at] = m[0] * x + m[2] * y + m[4];
    slot[at + 1] = m[1] * x + m[3] * y + m[5];
    slot[at + 2] = depth;
    slot[at + 3] = u;
    slot[at + 4] = v;
    slot[at + 5] = c;
}

/// Batches plain textured quads over a shared index buffer
pub struct SpriteBatch {
    /// Staging, flush, capture and draw-state machinery
    pub core: BatchCore,
    /// Atlas region used by `draw_rect`, normally an opaque white texel
    pub rect_sprite: Option<Sprite>,
}

impl SpriteBatch {
    /// Build a batch staging up to `vertex_capacity_max` vertices
    pub fn new(
        device: Rc<dyn GlDevice>,
        vertex_capacity_max: usize,
        index_buffer: BufferId,
    ) -> GraphicsResult<Self> {
        Ok(Self {
            core: BatchCore::new(device, vertex_capacity_max, index_buffer, &SPRITE_ATTRIBUTES)?,
            rect_sprite: None,
        })
    }
}

impl DrawSurface for SpriteBatch {
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
        let c = get_color_float(color, self.core.global_alpha());
        let depth = self.core.depth();
        let transform = self.core.transform();

        let x2 = dst_x + dst_w;
        let y2 = dst_y + dst_h;
        let u2 = src_x + src_w;
        let v2 = src_y + src_h;

        let slot = self.core.begin_quad()?;
        write_vertex(slot, 0, dst_x, dst_y, depth, src_x, src_y, c, &transform);
        write_vertex(slot, 6, x2, dst_y, depth, u2, src_y, c, &transform);
        write_vertex(slot, 12, x2, y2, depth, u2, v2, c, &transform);
        write_vertex(slot, 18, dst_x, y2, depth, src_x, v2, c, &transform);
        self.core.commit_quad();
        Ok(())
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
        if sprite.w == 0.0 || sprite.h == 0.0 {
            return Ok(());
        }
        self.draw_image(
            color,
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

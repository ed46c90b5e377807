//! # Sprite Batching
//!
//! Draw calls append quads into a fixed-capacity CPU staging buffer; when
//! capacity runs out or the frame ends, the staged region is uploaded and
//! drawn in one submission. The staging buffer is never resized, only
//! flushed.
//!
//! [`BatchCore`](core::BatchCore) owns the capacity, flush and
//! capture/replay machinery once; the specializations in [`sprite`] and
//! [`palette`] supply only their vertex layout and per-quad write function.
//!
//! A capture ([`Batch`]) is a copy of a contiguous range of already-staged
//! vertex floats. Replaying it skips all transform and color work, which is
//! what makes it worthwhile for static scenery. It is plain data, not a GPU
//! resource.

pub mod core;
pub mod layout;
pub mod palette;
pub mod sprite;

use thiserror::Error;

use crate::render::sprites::Sprite;

pub use self::core::BatchCore;
pub use layout::{vertex_byte_stride, AttributeType, VertexAttribute};
pub use palette::PaletteSpriteBatch;
pub use sprite::SpriteBatch;

/// Result type for batching operations
pub type BatchResult<T> = Result<T, BatchError>;

/// Errors raised by batch accumulation and capture
#[derive(Debug, Error)]
pub enum BatchError {
    /// The batch's GPU buffers were already disposed
    #[error("Batch is disposed")]
    Disposed,

    /// `start_batch` was called while a capture was already open
    #[error("Cannot start a capture while one is active")]
    CaptureAlreadyActive,

    /// `finish_batch` was called without an open capture
    #[error("No capture is active")]
    NoActiveCapture,

    /// Captured vertices are already transformed; replaying them under a
    /// non-identity transform would transform them twice
    #[error("Cannot draw a captured batch under an active transform")]
    CannotTransformCapturedBatch,

    /// A captured range holds more sprites than the whole staging buffer
    #[error("Captured batch of {sprites} sprites exceeds capacity {capacity}")]
    ReplayTooLarge {
        /// Sprites in the captured range
        sprites: usize,
        /// Sprite capacity of the replaying batch
        capacity: usize,
    },
}

/// A captured copy of staged vertex data, replayable without recomputation
///
/// Produced by `finish_batch`, consumed by `draw_batch` on a batch with the
/// same vertex layout. Carries no GPU state.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    vertices: Vec<f32>,
}

impl Batch {
    pub(crate) fn from_vertices(vertices: Vec<f32>) -> Self {
        Self { vertices }
    }

    /// Number of captured floats
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the capture holds no vertices
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub(crate) fn vertices(&self) -> &[f32] {
        &self.vertices
    }
}

/// Per-batch submission counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Staged-region uploads submitted
    pub flushes: usize,
    /// Triangles drawn across all flushes
    pub drawn_triangles: usize,
}

/// Per-frame drawing surface consumed by the animation and UI layers
pub trait DrawSurface {
    /// Append one quad mapping an atlas region onto a destination rectangle
    #[allow(clippy::too_many_arguments)]
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
    ) -> BatchResult<()>;

    /// Append a solid rectangle; no-op when either extent is zero
    ///
    /// Uses the configured rect sprite's atlas region, degrading to a 1x1
    /// source region when none is configured.
    fn draw_rect(&mut self, color: u32, x: f32, y: f32, w: f32, h: f32) -> BatchResult<()>;

    /// Append a sprite at its origin-corrected position; no-op for
    /// zero-sized sprites
    fn draw_sprite(&mut self, sprite: &Sprite, color: u32, x: f32, y: f32) -> BatchResult<()>;

    /// Open a capture at the current staging position
    fn start_batch(&mut self) -> BatchResult<()>;

    /// Close the capture and copy out its vertex range
    ///
    /// Returns `Ok(None)` when the capture could not be produced (allocation
    /// failure, or the capture outgrew the staging buffer); the drawn output
    /// is correct either way.
    fn finish_batch(&mut self) -> BatchResult<Option<Batch>>;

    /// Replay a captured range by appending it to the staging buffer
    fn draw_batch(&mut self, batch: &Batch) -> BatchResult<()>;

    /// Return a capture after use
    fn release_batch(&mut self, batch: Batch);
}

//! # Batch Core
//!
//! Shared accumulation machinery for every batch specialization: one CPU
//! staging buffer bound to one GPU vertex buffer plus the renderer's shared
//! index buffer, a 2D draw-state stack, flush scheduling, and capture
//! bookkeeping.
//!
//! ## Capacity
//!
//! The staging buffer holds `vertex_capacity_max` vertices and is never
//! grown. Writers reserve one quad at a time; a reservation that would
//! exceed `sprites_capacity` flushes first. `write_index` and
//! `sprites_count` therefore never exceed their capacities between calls.
//!
//! ## Flushing during a capture
//!
//! An ordinary flush drains everything. While a capture is open, only the
//! region before the capture start may be drained: the tail (the capture
//! plus anything after it) slides down to offset zero so the capture's
//! relative content survives the flush. A capture that grows to span the
//! entire buffer leaves nothing to drain; it is abandoned so accumulation
//! can continue, and `finish_batch` reports it as absent.

use std::rc::Rc;

use log::warn;

use crate::foundation::math::Mat2d;
use crate::render::api::device::{BufferId, BufferUsage, GlDevice, VertexLayoutId};
use crate::render::batching::layout::{floats_per_vertex, VertexAttribute};
use crate::render::batching::{Batch, BatchError, BatchResult, BatchStats};
use crate::render::{GraphicsError, GraphicsResult};

/// Vertices per quad
pub const VERTICES_PER_SPRITE: usize = 4;
/// Indices per quad in the shared index buffer
pub const INDICES_PER_SPRITE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// No capture open
    Inactive,
    /// Capture open; the range starts at these staging offsets
    Active {
        start_index: usize,
        start_sprites: usize,
    },
    /// Capture open but abandoned after outgrowing the staging buffer
    Abandoned,
}

/// Fixed-capacity vertex staging bound to one GPU vertex buffer
pub struct BatchCore {
    device: Rc<dyn GlDevice>,
    vertices: Vec<f32>,
    write_index: usize,
    sprites_count: usize,
    sprites_capacity: usize,
    floats_per_sprite: usize,
    vertex_buffer: Option<BufferId>,
    layout: Option<VertexLayoutId>,
    capture: Capture,
    flushes: usize,
    drawn_triangles: usize,
    transform: Mat2d,
    global_alpha: f32,
    depth: f32,
    state_stack: Vec<(Mat2d, f32)>,
}

impl BatchCore {
    /// Allocate the staging buffer, its GPU vertex buffer, and the vertex
    /// layout binding over the shared index buffer
    ///
    /// The index buffer is referenced, never owned. Vertex buffer
    /// allocation failure is fatal.
    pub fn new(
        device: Rc<dyn GlDevice>,
        vertex_capacity_max: usize,
        index_buffer: BufferId,
        attributes: &[VertexAttribute],
    ) -> GraphicsResult<Self> {
        let per_vertex = floats_per_vertex(attributes);
        let vertices = vec![0.0f32; vertex_capacity_max * per_vertex];
        let sprites_capacity = vertex_capacity_max / VERTICES_PER_SPRITE;

        let vertex_buffer = device.create_buffer().map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("batch vertex buffer: {e}"))
        })?;
        device.bind_array_buffer(Some(vertex_buffer));
        device.array_buffer_data_f32(&vertices, BufferUsage::Dynamic);

        let layout = match device.create_vertex_layout(attributes, vertex_buffer, index_buffer) {
            Ok(layout) => layout,
            Err(e) => {
                device.bind_array_buffer(None);
                device.delete_buffer(vertex_buffer);
                return Err(e.into());
            }
        };
        device.bind_array_buffer(None);

        Ok(Self {
            device,
            vertices,
            write_index: 0,
            sprites_count: 0,
            sprites_capacity,
            floats_per_sprite: per_vertex * VERTICES_PER_SPRITE,
            vertex_buffer: Some(vertex_buffer),
            layout: Some(layout),
            capture: Capture::Inactive,
            flushes: 0,
            drawn_triangles: 0,
            transform: Mat2d::IDENTITY,
            global_alpha: 1.0,
            depth: 1.0,
            state_stack: Vec::new(),
        })
    }

    /// Bind the vertex layout and reset capture state for a new frame
    pub fn begin(&mut self) -> BatchResult<()> {
        let Some(layout) = self.layout else {
            return Err(BatchError::Disposed);
        };
        self.capture = Capture::Inactive;
        self.device.bind_vertex_layout(Some(layout));
        Ok(())
    }

    /// Flush whatever is staged and unbind the vertex layout
    pub fn end(&mut self) -> BatchResult<()> {
        if self.layout.is_none() {
            return Err(BatchError::Disposed);
        }
        self.flush()?;
        self.device.bind_vertex_layout(None);
        Ok(())
    }

    /// Upload the staged region and issue its draw call
    ///
    /// No-op when nothing is staged. With an open capture only the
    /// pre-capture region is drained; see the module docs.
    pub fn flush(&mut self) -> BatchResult<()> {
        if self.write_index == 0 {
            return Ok(());
        }
        let (Some(_layout), Some(vertex_buffer)) = (self.layout, self.vertex_buffer) else {
            return Err(BatchError::Disposed);
        };

        if let Capture::Active {
            start_index,
            start_sprites,
        } = self.capture
        {
            self.device.bind_array_buffer(Some(vertex_buffer));
            self.device
                .array_buffer_sub_data_f32(0, &self.vertices[..start_index]);
            self.device
                .draw_triangles(start_sprites * INDICES_PER_SPRITE, 0);

            self.drawn_triangles += start_sprites * 2;
            self.sprites_count -= start_sprites;
            self.write_index -= start_index;
            self.vertices
                .copy_within(start_index..start_index + self.write_index, 0);
            self.capture = Capture::Active {
                start_index: 0,
                start_sprites: 0,
            };
        } else {
            self.device.bind_array_buffer(Some(vertex_buffer));
            self.device
                .array_buffer_sub_data_f32(0, &self.vertices[..self.write_index]);
            self.device
                .draw_triangles(self.sprites_count * INDICES_PER_SPRITE, 0);

            self.drawn_triangles += self.sprites_count * 2;
            self.sprites_count = 0;
            self.write_index = 0;
        }

        self.flushes += 1;
        Ok(())
    }

    /// Open a capture at the current staging position
    pub fn start_batch(&mut self) -> BatchResult<()> {
        if self.capture != Capture::Inactive {
            return Err(BatchError::CaptureAlreadyActive);
        }
        self.capture = Capture::Active {
            start_index: self.write_index,
            start_sprites: self.sprites_count,
        };
        Ok(())
    }

    /// Close the capture and copy out the range written since it opened
    ///
    /// Returns `Ok(None)` for an abandoned capture or when the copy cannot
    /// be allocated. Capture is best effort; the staged output is correct
    /// in every case.
    pub fn finish_batch(&mut self) -> BatchResult<Option<Batch>> {
        match self.capture {
            Capture::Inactive => Err(BatchError::NoActiveCapture),
            Capture::Abandoned => {
                self.capture = Capture::Inactive;
                Ok(None)
            }
            Capture::Active { start_index, .. } => {
                self.capture = Capture::Inactive;
                let range = &self.vertices[start_index..self.write_index];
                let mut copied = Vec::new();
                if copied.try_reserve_exact(range.len()).is_err() {
                    return Ok(None);
                }
                copied.extend_from_slice(range);
                Ok(Some(Batch::from_vertices(copied)))
            }
        }
    }

    /// Append a captured range without recomputation
    ///
    /// Rejected under a non-identity transform (captured vertices are
    /// already transformed) and for captures larger than the whole staging
    /// buffer. Trailing floats short of a full sprite are dropped.
    pub fn draw_batch(&mut self, batch: &Batch) -> BatchResult<()> {
        if !self.transform.is_identity() {
            return Err(BatchError::CannotTransformCapturedBatch);
        }

        let sprites = batch.len() / self.floats_per_sprite;
        if sprites > self.sprites_capacity {
            return Err(BatchError::ReplayTooLarge {
                sprites,
                capacity: self.sprites_capacity,
            });
        }

        if self.sprites_capacity < self.sprites_count + sprites {
            self.flush()?;
            if self.sprites_capacity < self.sprites_count + sprites {
                self.abandon_capture();
                self.flush()?;
            }
        }

        let floats = sprites * self.floats_per_sprite;
        let end = self.write_index + floats;
        self.vertices[self.write_index..end].copy_from_slice(&batch.vertices()[..floats]);
        self.write_index = end;
        self.sprites_count += sprites;
        Ok(())
    }

    /// Return a capture after use
    ///
    /// Captures are freshly allocated, so this just drops the buffer.
    pub fn release_batch(&mut self, batch: Batch) {
        drop(batch);
    }

    /// Reserve staging room for one quad and hand out its vertex slot
    ///
    /// Flushes first when the batch is at sprite capacity. The slot is
    /// committed separately so writers fill it without further checks.
    pub(crate) fn begin_quad(&mut self) -> BatchResult<&mut [f32]> {
        if self.sprites_capacity <= self.sprites_count {
            self.flush()?;
            if self.sprites_capacity <= self.sprites_count {
                self.abandon_capture();
                self.flush()?;
            }
        }
        let start = self.write_index;
        Ok(&mut self.vertices[start..start + self.floats_per_sprite])
    }

    /// Account for the quad written into the slot from [`Self::begin_quad`]
    pub(crate) fn commit_quad(&mut self) {
        self.write_index += self.floats_per_sprite;
        self.sprites_count += 1;
    }

    /// Reachable only when an open capture spans the whole staging buffer.
    fn abandon_capture(&mut self) {
        warn!("sprite capture outgrew the staging buffer; abandoning it");
        self.capture = Capture::Abandoned;
    }

    /// Delete the GPU vertex buffer and layout binding
    ///
    /// Idempotent. The shared index buffer is not owned and never touched.
    pub fn dispose(&mut self) {
        if let Some(layout) = self.layout.take() {
            self.device.delete_vertex_layout(layout);
        }
        if let Some(buffer) = self.vertex_buffer.take() {
            self.device.delete_buffer(buffer);
        }
    }

    /// Whether [`Self::dispose`] already ran
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.layout.is_none()
    }

    /// Push the current transform and alpha onto the state stack
    pub fn save(&mut self) {
        self.state_stack.push((self.transform, self.global_alpha));
    }

    /// Pop the most recently saved transform and alpha; no-op when nothing
    /// was saved
    pub fn restore(&mut self) {
        if let Some((transform, alpha)) = self.state_stack.pop() {
            self.transform = transform;
            self.global_alpha = alpha;
        }
    }

    /// Active 2D affine transform
    #[must_use]
    pub fn transform(&self) -> Mat2d {
        self.transform
    }

    /// Replace the active transform
    pub fn set_transform(&mut self, transform: Mat2d) {
        self.transform = transform;
    }

    /// Compose a translation onto the active transform
    pub fn translate(&mut self, x: f32, y: f32) {
        self.transform = self.transform.translate(x, y);
    }

    /// Compose a scale onto the active transform
    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.transform = self.transform.scale(sx, sy);
    }

    /// Compose a rotation onto the active transform
    pub fn rotate(&mut self, radians: f32) {
        self.transform = self.transform.rotate(radians);
    }

    /// Active global alpha multiplier
    #[must_use]
    pub fn global_alpha(&self) -> f32 {
        self.global_alpha
    }

    /// Replace the global alpha multiplier
    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.global_alpha = alpha;
    }

    /// Depth written with every vertex
    #[must_use]
    pub fn depth(&self) -> f32 {
        self.depth
    }

    /// Replace the vertex depth
    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth;
    }

    /// Sprites currently staged
    #[must_use]
    pub fn sprites_count(&self) -> usize {
        self.sprites_count
    }

    /// Sprite capacity of the staging buffer
    #[must_use]
    pub fn sprites_capacity(&self) -> usize {
        self.sprites_capacity
    }

    /// Next staging write position, in floats
    #[must_use]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Floats consumed by one quad
    #[must_use]
    pub fn floats_per_sprite(&self) -> usize {
        self.floats_per_sprite
    }

    /// Submission counters since the last reset
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        BatchStats {
            flushes: self.flushes,
            drawn_triangles: self.drawn_triangles,
        }
    }

    /// Zero the submission counters
    pub fn reset_stats(&mut self) {
        self.flushes = 0;
        self.drawn_triangles = 0;
    }
}

impl std::fmt::Debug for BatchCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCore")
            .field("sprites_count", &self.sprites_count)
            .field("sprites_capacity", &self.sprites_capacity)
            .field("write_index", &self.write_index)
            .field("capture", &self.capture)
            .field("flushes", &self.flushes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::device::BufferUsage;
    use crate::render::backends::headless::{DeviceCall, HeadlessDevice};

    const ATTRIBUTES: [VertexAttribute; 2] = [
        VertexAttribute::float("position", 3),
        VertexAttribute::normalized_u8("color", 4),
    ];

    fn test_core(capacity_sprites: usize) -> (Rc<HeadlessDevice>, BatchCore) {
        let device = Rc::new(HeadlessDevice::new());
        let index_buffer = device.create_buffer().unwrap();
        let core = BatchCore::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            capacity_sprites * VERTICES_PER_SPRITE,
            index_buffer,
            &ATTRIBUTES,
        )
        .unwrap();
        (device, core)
    }

    fn stage_quads(core: &mut BatchCore, count: usize) {
        for _ in 0..count {
            let slot = core.begin_quad().unwrap();
            slot.fill(1.0);
            core.commit_quad();
        }
    }

    #[test]
    fn test_new_allocates_dynamic_vertex_buffer_at_full_size() {
        let (device, core) = test_core(8);
        assert_eq!(core.sprites_capacity(), 8);
        assert_eq!(core.floats_per_sprite(), 16);
        assert_eq!(
            device.count_calls(|c| matches!(
                c,
                DeviceCall::ArrayBufferData {
                    floats: 128,
                    usage: BufferUsage::Dynamic,
                }
            )),
            1
        );
    }

    #[test]
    fn test_vertex_buffer_allocation_failure_is_fatal() {
        let device = Rc::new(HeadlessDevice::new());
        let index_buffer = device.create_buffer().unwrap();
        device.fail_buffer_alloc();

        let result = BatchCore::new(
            Rc::clone(&device) as Rc<dyn GlDevice>,
            16,
            index_buffer,
            &ATTRIBUTES,
        );

        assert!(matches!(
            result,
            Err(GraphicsError::ResourceCreationFailed(_))
        ));
    }

    #[test]
    fn test_flush_is_noop_when_nothing_staged() {
        let (device, mut core) = test_core(4);
        core.begin().unwrap();
        device.clear_calls();

        core.flush().unwrap();

        assert_eq!(core.stats().flushes, 0);
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::DrawTriangles { .. })), 0);
    }

    #[test]
    fn test_capacity_triggered_flush() {
        let (device, mut core) = test_core(4);
        core.begin().unwrap();

        stage_quads(&mut core, 4);
        assert_eq!(core.stats().flushes, 0);

        stage_quads(&mut core, 1);

        assert_eq!(core.stats().flushes, 1);
        assert_eq!(core.sprites_count(), 1);
        assert_eq!(
            device.count_calls(|c| matches!(
                c,
                DeviceCall::DrawTriangles {
                    index_count: 24,
                    first_index: 0,
                }
            )),
            1
        );
    }

    #[test]
    fn test_counters_never_exceed_capacity() {
        let (_device, mut core) = test_core(4);
        core.begin().unwrap();

        for _ in 0..13 {
            stage_quads(&mut core, 1);
            assert!(core.sprites_count() <= core.sprites_capacity());
            assert!(core.write_index() <= core.sprites_capacity() * core.floats_per_sprite());
        }

        assert_eq!(core.sprites_count(), 1);
        assert_eq!(core.stats().flushes, 3);
    }

    #[test]
    fn test_end_flushes_and_unbinds() {
        let (device, mut core) = test_core(4);
        core.begin().unwrap();
        stage_quads(&mut core, 2);

        core.end().unwrap();

        assert_eq!(core.sprites_count(), 0);
        assert_eq!(core.stats().flushes, 1);
        assert_eq!(core.stats().drawn_triangles, 4);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::BindVertexLayout(None))),
            1
        );
    }

    #[test]
    fn test_capture_copies_exact_range() {
        let (_device, mut core) = test_core(8);
        core.begin().unwrap();
        stage_quads(&mut core, 1);

        core.start_batch().unwrap();
        stage_quads(&mut core, 2);
        let batch = core.finish_batch().unwrap().expect("capture produced");

        assert_eq!(batch.len(), 2 * core.floats_per_sprite());
    }

    #[test]
    fn test_capture_state_errors() {
        let (_device, mut core) = test_core(8);
        core.begin().unwrap();

        assert!(matches!(
            core.finish_batch(),
            Err(BatchError::NoActiveCapture)
        ));
        core.start_batch().unwrap();
        assert!(matches!(
            core.start_batch(),
            Err(BatchError::CaptureAlreadyActive)
        ));
    }

    #[test]
    fn test_replay_appends_without_transform_work() {
        let (_device, mut core) = test_core(8);
        core.begin().unwrap();
        core.start_batch().unwrap();
        stage_quads(&mut core, 2);
        let batch = core.finish_batch().unwrap().unwrap();

        let (_other_device, mut other) = test_core(8);
        other.begin().unwrap();
        other.draw_batch(&batch).unwrap();

        assert_eq!(other.sprites_count(), 2);
        assert_eq!(other.write_index(), 2 * other.floats_per_sprite());
    }

    #[test]
    fn test_replay_rejects_active_transform() {
        let (_device, mut core) = test_core(8);
        core.begin().unwrap();
        core.start_batch().unwrap();
        stage_quads(&mut core, 1);
        let batch = core.finish_batch().unwrap().unwrap();

        core.set_transform(Mat2d::translation(4.0, 0.0));
        assert!(matches!(
            core.draw_batch(&batch),
            Err(BatchError::CannotTransformCapturedBatch)
        ));

        core.set_transform(Mat2d::IDENTITY);
        core.draw_batch(&batch).unwrap();
    }

    #[test]
    fn test_replay_larger_than_capacity_is_rejected() {
        let (_device, mut core) = test_core(8);
        core.begin().unwrap();
        core.start_batch().unwrap();
        stage_quads(&mut core, 6);
        let batch = core.finish_batch().unwrap().unwrap();

        let (_other_device, mut small) = test_core(4);
        small.begin().unwrap();

        assert!(matches!(
            small.draw_batch(&batch),
            Err(BatchError::ReplayTooLarge {
                sprites: 6,
                capacity: 4,
            })
        ));
    }

    #[test]
    fn test_mid_capture_flush_compacts_tail() {
        let (device, mut core) = test_core(4);
        core.begin().unwrap();

        // Two committed quads, then a capture holding two more: buffer full.
        stage_quads(&mut core, 2);
        core.start_batch().unwrap();
        for value in [2.0f32, 3.0] {
            let slot = core.begin_quad().unwrap();
            slot.fill(value);
            core.commit_quad();
        }

        device.clear_calls();
        stage_quads(&mut core, 1);

        // The flush drained only the two pre-capture quads.
        assert_eq!(
            device.count_calls(|c| matches!(
                c,
                DeviceCall::DrawTriangles {
                    index_count: 12,
                    first_index: 0,
                }
            )),
            1
        );
        assert_eq!(core.sprites_count(), 3);

        // The capture slid to the buffer start, kept its content, and still
        // covers the quad appended after the flush.
        let fps = core.floats_per_sprite();
        let batch = core.finish_batch().unwrap().expect("capture survives");
        assert_eq!(batch.len(), 3 * fps);
        assert!(batch.vertices()[..fps].iter().all(|&v| v == 2.0));
        assert!(batch.vertices()[fps..2 * fps].iter().all(|&v| v == 3.0));
        assert!(batch.vertices()[2 * fps..].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_whole_buffer_capture_is_abandoned_on_overflow() {
        let (_device, mut core) = test_core(4);
        core.begin().unwrap();

        core.start_batch().unwrap();
        stage_quads(&mut core, 4);
        // Buffer is full and the capture spans all of it.
        stage_quads(&mut core, 1);

        assert!(core.sprites_count() <= core.sprites_capacity());
        assert_eq!(core.sprites_count(), 1);
        assert!(core.finish_batch().unwrap().is_none());

        // The capture slot is free again afterwards.
        core.start_batch().unwrap();
        stage_quads(&mut core, 1);
        assert!(core.finish_batch().unwrap().is_some());
    }

    #[test]
    fn test_dispose_is_idempotent_and_spares_index_buffer() {
        let (device, mut core) = test_core(4);

        core.dispose();
        core.dispose();

        assert!(core.is_disposed());
        assert_eq!(device.alive_vertex_layouts(), 0);
        // The shared index buffer created by the fixture is still alive.
        assert_eq!(device.alive_buffers(), 1);
        assert!(matches!(core.begin(), Err(BatchError::Disposed)));
        assert!(matches!(core.flush(), Ok(())));
    }

    #[test]
    fn test_save_restore_round_trip() {
        let (_device, mut core) = test_core(4);

        core.set_global_alpha(0.5);
        core.set_transform(Mat2d::translation(10.0, 20.0));
        core.save();
        core.set_global_alpha(0.25);
        core.set_transform(Mat2d::IDENTITY);
        core.restore();

        assert_eq!(core.global_alpha(), 0.5);
        assert_eq!(core.transform(), Mat2d::translation(10.0, 20.0));
        core.restore();
        assert_eq!(core.global_alpha(), 0.5);
    }

    #[test]
    fn test_stats_reset() {
        let (_device, mut core) = test_core(4);
        core.begin().unwrap();
        stage_quads(&mut core, 2);
        core.flush().unwrap();
        assert_eq!(
            core.stats(),
            BatchStats {
                flushes: 1,
                drawn_triangles: 4,
            }
        );

        core.reset_stats();
        assert_eq!(core.stats(), BatchStats::default());
    }
}

//! # Offscreen Render Targets
//!
//! A [`Framebuffer`] owns its color texture and, optionally, a depth
//! renderbuffer. Depth can instead be borrowed from another framebuffer:
//! the renderer's two-target chain gives the primary target an owned depth
//! buffer and lets the secondary attach the same one without owning it, so
//! both passes share depth testing.
//!
//! Depth allocation failure is a capability gap, not an error: the target is
//! still produced, without depth. Incompleteness after attachment is a
//! configuration bug and fails hard.

use log::warn;

use crate::render::api::device::{
    ClearFlags, FramebufferId, FramebufferStatus, GlDevice, PixelType, RenderbufferId,
    TextureFormat,
};
use crate::render::resources::texture::{create_empty_texture, Texture2d};
use crate::render::{GraphicsError, GraphicsResult};

/// An offscreen render target
#[derive(Debug, Clone)]
pub struct Framebuffer {
    /// Device framebuffer handle
    pub id: FramebufferId,
    /// Color attachment, owned
    pub color_texture: Texture2d,
    /// Depth attachment; owned only when `owns_depth` is set
    pub depth_renderbuffer: Option<RenderbufferId>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Whether disposal should delete the depth renderbuffer
    pub owns_depth: bool,
}

/// Create a render target with an RGB color texture
///
/// With `create_depth`, a depth renderbuffer is allocated and owned; if that
/// allocation fails the target is created without depth and the gap is
/// logged. Without `create_depth`, `borrowed_depth` is attached (when
/// present) but never owned. The new target is cleared once with depth
/// writes enabled.
///
/// # Errors
///
/// Framebuffer or color texture creation failure and an incomplete
/// framebuffer status are fatal; partially created resources are released
/// before returning.
pub fn create_framebuffer(
    device: &dyn GlDevice,
    width: u32,
    height: u32,
    create_depth: bool,
    borrowed_depth: Option<RenderbufferId>,
) -> GraphicsResult<Framebuffer> {
    let id = device.create_framebuffer()?;

    let color_texture = match create_empty_texture(device, width, height, TextureFormat::Rgb, PixelType::U8) {
        Ok(Some(texture)) => texture,
        Ok(None) => {
            device.delete_framebuffer(id);
            return Err(GraphicsError::ResourceCreationFailed(
                "frame buffer color texture".to_string(),
            ));
        }
        Err(e) => {
            device.delete_framebuffer(id);
            return Err(e);
        }
    };

    let (depth_renderbuffer, owns_depth) = if create_depth {
        match device.create_renderbuffer() {
            Ok(renderbuffer) => {
                device.renderbuffer_storage_depth(renderbuffer, width, height);
                (Some(renderbuffer), true)
            }
            Err(e) => {
                warn!("depth buffer is not available: {e}");
                (None, true)
            }
        }
    } else {
        (borrowed_depth, false)
    };

    let buffer = Framebuffer {
        id,
        color_texture,
        depth_renderbuffer,
        width,
        height,
        owns_depth,
    };

    device.bind_framebuffer(Some(buffer.id));
    device.attach_color_texture(buffer.color_texture.id);
    if let Some(renderbuffer) = buffer.depth_renderbuffer {
        device.attach_depth_renderbuffer(renderbuffer);
    }

    device.depth_mask(true);
    device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
    device.depth_mask(false);

    if let FramebufferStatus::Incomplete(status) = device.framebuffer_status() {
        device.bind_framebuffer(None);
        dispose_framebuffer(device, Some(buffer));
        return Err(GraphicsError::IncompleteFramebuffer { status });
    }
    device.bind_framebuffer(None);

    Ok(buffer)
}

/// Delete a render target and return the `None` sentinel
///
/// Deletes the framebuffer and color texture unconditionally and the depth
/// renderbuffer only when owned. Idempotent through the sentinel pattern;
/// stale handles are device-level no-ops.
pub fn dispose_framebuffer(
    device: &dyn GlDevice,
    buffer: Option<Framebuffer>,
) -> Option<Framebuffer> {
    if let Some(buffer) = buffer {
        device.delete_framebuffer(buffer.id);
        device.delete_texture(buffer.color_texture.id);
        if buffer.owns_depth {
            if let Some(renderbuffer) = buffer.depth_renderbuffer {
                device.delete_renderbuffer(renderbuffer);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::{DeviceCall, HeadlessDevice};

    #[test]
    fn test_create_attaches_color_and_owned_depth() {
        let device = HeadlessDevice::new();

        let buffer = create_framebuffer(&device, 320, 200, true, None).unwrap();

        assert!(buffer.owns_depth);
        assert!(buffer.depth_renderbuffer.is_some());
        assert_eq!((buffer.width, buffer.height), (320, 200));
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::AttachColorTexture(_))),
            1
        );
        assert_eq!(
            device.count_calls(|c| matches!(
                c,
                DeviceCall::RenderbufferStorageDepth {
                    width: 320,
                    height: 200,
                }
            )),
            1
        );
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::DepthMask(true))), 1);
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::Clear(_))), 1);
    }

    #[test]
    fn test_depth_allocation_failure_degrades() {
        let device = HeadlessDevice::new();
        device.fail_renderbuffer_alloc();

        let buffer = create_framebuffer(&device, 64, 64, true, None).unwrap();

        assert!(buffer.owns_depth);
        assert!(buffer.depth_renderbuffer.is_none());
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::AttachDepthRenderbuffer(_))),
            0
        );
    }

    #[test]
    fn test_borrowed_depth_outlives_borrower() {
        let device = HeadlessDevice::new();
        let primary = create_framebuffer(&device, 64, 64, true, None).unwrap();
        let secondary =
            create_framebuffer(&device, 64, 64, false, primary.depth_renderbuffer).unwrap();
        assert_eq!(secondary.depth_renderbuffer, primary.depth_renderbuffer);
        assert!(!secondary.owns_depth);

        let disposed = dispose_framebuffer(&device, Some(secondary));

        assert!(disposed.is_none());
        assert_eq!(device.alive_renderbuffers(), 1);

        dispose_framebuffer(&device, Some(primary));
        assert_eq!(device.alive_renderbuffers(), 0);
    }

    #[test]
    fn test_dispose_is_idempotent_on_partial_creation() {
        let device = HeadlessDevice::new();
        device.fail_renderbuffer_alloc();
        let buffer = create_framebuffer(&device, 16, 16, true, None).unwrap();
        let stale = buffer.clone();

        let mut slot = Some(buffer);
        slot = dispose_framebuffer(&device, slot.take());
        slot = dispose_framebuffer(&device, slot.take());
        dispose_framebuffer(&device, Some(stale));

        assert!(slot.is_none());
        assert_eq!(device.alive_framebuffers(), 0);
        assert_eq!(device.alive_textures(), 0);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::DeleteFramebuffer(_))),
            1
        );
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::DeleteTexture(_))),
            1
        );
    }

    #[test]
    fn test_incompleteness_is_fatal_and_cleans_up() {
        let device = HeadlessDevice::new();
        device.set_framebuffer_incomplete(0x8cd6);

        let result = create_framebuffer(&device, 32, 32, true, None);

        assert!(matches!(
            result,
            Err(GraphicsError::IncompleteFramebuffer { status: 0x8cd6 })
        ));
        assert_eq!(device.alive_framebuffers(), 0);
        assert_eq!(device.alive_textures(), 0);
        assert_eq!(device.alive_renderbuffers(), 0);
    }

    #[test]
    fn test_color_texture_soft_failure_is_promoted() {
        let device = HeadlessDevice::new();
        device.set_error_after_tex_image();

        let result = create_framebuffer(&device, 32, 32, true, None);

        assert!(matches!(
            result,
            Err(GraphicsError::ResourceCreationFailed(_))
        ));
        assert_eq!(device.alive_framebuffers(), 0);
        assert_eq!(device.alive_textures(), 0);
    }
}

//! # Texture Resources
//!
//! Creation, upload, resize and disposal of 2D textures. Creation is
//! soft-failing: after the GPU calls, the device error flag is checked and a
//! poisoned allocation yields `Ok(None)` so callers can degrade instead of
//! aborting. Shape validation and missing capabilities are hard errors and
//! happen before any allocation call.
//!
//! Disposal returns the `None` sentinel so owners can unconditionally
//! overwrite their slot: `self.texture = dispose_texture(device, self.texture.take())`.

use image::{GrayImage, RgbaImage};
use log::warn;

use crate::render::api::device::{GlDevice, PixelType, TextureFormat, TextureId};
use crate::render::{GraphicsError, GraphicsResult};

/// A GPU texture together with the parameters needed to reallocate it
///
/// `format` and `pixel_type` are kept so [`resize_texture`] can respecify
/// storage at the same handle. Identity (the handle) survives resizes,
/// content does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture2d {
    /// Device handle
    pub id: TextureId,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channel layout
    pub format: TextureFormat,
    /// Texel component type
    pub pixel_type: PixelType,
}

/// Borrowed pixel data for [`create_texture`]
#[derive(Debug, Clone, Copy)]
pub enum PixelSource<'a> {
    /// 8-bit RGBA image
    Rgba(&'a RgbaImage),
    /// 8-bit single-channel image, uploaded as luminance
    Gray(&'a GrayImage),
    /// Raw bytes with explicit dimensions; length must match the
    /// format/type/dimensions product
    Raw {
        /// Pixel rows, tightly packed
        bytes: &'a [u8],
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
}

impl PixelSource<'_> {
    /// Width of the source in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            PixelSource::Rgba(image) => image.width(),
            PixelSource::Gray(image) => image.width(),
            PixelSource::Raw { width, .. } => *width,
        }
    }

    /// Height of the source in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            PixelSource::Rgba(image) => image.height(),
            PixelSource::Gray(image) => image.height(),
            PixelSource::Raw { height, .. } => *height,
        }
    }

    /// Tightly packed pixel bytes
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            PixelSource::Rgba(image) => image.as_raw(),
            PixelSource::Gray(image) => image.as_raw(),
            PixelSource::Raw { bytes, .. } => bytes,
        }
    }
}

fn validate_shape(device: &dyn GlDevice, width: u32, height: u32) -> GraphicsResult<()> {
    let max_size = device.capabilities().max_texture_size;
    if width > max_size || height > max_size {
        return Err(GraphicsError::InvalidTextureShape {
            width,
            height,
            max_size,
        });
    }
    Ok(())
}

/// Create the handle and set the sampling parameters every engine texture uses
fn create_texture_handle(device: &dyn GlDevice) -> GraphicsResult<TextureId> {
    let id = device.create_texture()?;
    device.bind_texture(0, Some(id));
    device.tex_parameters_nearest_clamp();
    Ok(id)
}

/// Allocate texture storage without initial pixel data
///
/// Used for render targets. Dimensions beyond the device limit fail with
/// [`GraphicsError::InvalidTextureShape`]; requesting float texels on a
/// device without float texture support fails with
/// [`GraphicsError::UnsupportedFeature`]. Both checks run before any GPU
/// allocation. A GPU error raised by the allocation itself is a soft
/// failure: the handle is released and `Ok(None)` is returned.
pub fn create_empty_texture(
    device: &dyn GlDevice,
    width: u32,
    height: u32,
    format: TextureFormat,
    pixel_type: PixelType,
) -> GraphicsResult<Option<Texture2d>> {
    validate_shape(device, width, height)?;

    if pixel_type == PixelType::F32 && !device.capabilities().supports_float_textures {
        return Err(GraphicsError::UnsupportedFeature {
            feature: "floating point textures".to_string(),
        });
    }

    device.clear_errors();
    let id = create_texture_handle(device)?;
    device.tex_image_2d(format, width, height, format, pixel_type, None);

    if device.has_errors() {
        warn!("empty texture allocation {width}x{height} failed due to a GL error");
        device.delete_texture(id);
        return Ok(None);
    }

    Ok(Some(Texture2d {
        id,
        width,
        height,
        format,
        pixel_type,
    }))
}

/// Upload existing pixel data into a new texture
///
/// Same soft-failure contract as [`create_empty_texture`]: a GPU error
/// during the upload releases the handle and returns `Ok(None)`.
pub fn create_texture(
    device: &dyn GlDevice,
    source: PixelSource<'_>,
    format: TextureFormat,
    pixel_type: PixelType,
) -> GraphicsResult<Option<Texture2d>> {
    let width = source.width();
    let height = source.height();

    device.clear_errors();
    let id = create_texture_handle(device)?;
    device.tex_image_2d(format, width, height, format, pixel_type, Some(source.bytes()));

    if device.has_errors() {
        warn!("texture upload {width}x{height} failed due to a GL error");
        device.delete_texture(id);
        return Ok(None);
    }

    Ok(Some(Texture2d {
        id,
        width,
        height,
        format,
        pixel_type,
    }))
}

/// Delete a texture and return the `None` sentinel
///
/// Idempotent: a missing or already-deleted texture is a no-op.
pub fn dispose_texture(device: &dyn GlDevice, texture: Option<Texture2d>) -> Option<Texture2d> {
    if let Some(texture) = texture {
        device.delete_texture(texture.id);
    }
    None
}

/// Bind a texture (or unbind, for `None`) on the given texture unit
pub fn bind_texture(device: &dyn GlDevice, unit: u32, texture: Option<&Texture2d>) {
    device.bind_texture(unit, texture.map(|t| t.id));
}

/// Reallocate storage at the same handle with new dimensions
///
/// Content is discarded. Dimensions are re-validated against the device
/// limit.
pub fn resize_texture(
    device: &dyn GlDevice,
    texture: &mut Texture2d,
    width: u32,
    height: u32,
) -> GraphicsResult<()> {
    validate_shape(device, width, height)?;

    texture.width = width;
    texture.height = height;
    device.bind_texture(0, Some(texture.id));
    device.tex_image_2d(texture.format, width, height, texture.format, texture.pixel_type, None);
    Ok(())
}

//! # Sprites, Sheets and Palettes
//!
//! A [`Sprite`] is an atlas rectangle plus a draw-origin offset, produced by
//! the asset pipeline. A [`SpriteSheet`] groups sprites with the pixel data
//! of their atlas and the texture uploaded from it. Single-channel sheets
//! hold color indices instead of colors and are uploaded as luminance for
//! the palette-lookup path.
//!
//! A [`PaletteStore`] packs palette rows into one shared RGBA texture; each
//! [`Palette`] records the texel coordinates of its row, which the palette
//! batch writes as the second texture coordinate of every vertex.

use std::rc::Rc;

use image::{GrayImage, RgbaImage};

use crate::foundation::color;
use crate::render::api::device::{GlDevice, PixelType, TextureFormat};
use crate::render::resources::texture::{
    create_texture, dispose_texture, PixelSource, Texture2d,
};
use crate::render::GraphicsResult;

/// Atlas region with a draw-origin offset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sprite {
    /// Left edge in the atlas, in pixels
    pub x: f32,
    /// Top edge in the atlas, in pixels
    pub y: f32,
    /// Width in pixels
    pub w: f32,
    /// Height in pixels
    pub h: f32,
    /// Horizontal draw-origin offset
    pub ox: f32,
    /// Vertical draw-origin offset
    pub oy: f32,
}

impl Sprite {
    /// Build a sprite from its atlas rectangle and origin offset
    #[must_use]
    pub const fn new(x: f32, y: f32, w: f32, h: f32, ox: f32, oy: f32) -> Self {
        Self { x, y, w, h, ox, oy }
    }
}

/// Decoded atlas pixels held until upload
#[derive(Debug, Clone)]
pub enum SheetData {
    /// Full-color atlas
    Rgba(RgbaImage),
    /// Color-index atlas for palette lookup
    Gray(GrayImage),
}

/// A sprite atlas: its sprites, pixel data, and uploaded texture
#[derive(Debug, Default)]
pub struct SpriteSheet {
    /// Sprites addressing into this sheet
    pub sprites: Vec<Sprite>,
    /// Pixel data to upload; sheets without data get no texture
    pub data: Option<SheetData>,
    /// Uploaded texture; `None` before upload or after a soft failure
    pub texture: Option<Texture2d>,
    /// Upload as luminance instead of RGBA
    pub single_channel: bool,
}

impl SpriteSheet {
    /// Full-color sheet
    #[must_use]
    pub fn rgba(sprites: Vec<Sprite>, image: RgbaImage) -> Self {
        Self {
            sprites,
            data: Some(SheetData::Rgba(image)),
            texture: None,
            single_channel: false,
        }
    }

    /// Color-index sheet uploaded as luminance
    #[must_use]
    pub fn single_channel(sprites: Vec<Sprite>, image: GrayImage) -> Self {
        Self {
            sprites,
            data: Some(SheetData::Gray(image)),
            texture: None,
            single_channel: true,
        }
    }
}

/// Upload a texture for every sheet that has pixel data
///
/// A sheet whose upload soft-fails keeps `texture = None`; drawing from it
/// produces no output but the engine keeps running.
pub fn create_textures_for_sprite_sheets(
    device: &dyn GlDevice,
    sheets: &mut [SpriteSheet],
) -> GraphicsResult<()> {
    for sheet in sheets {
        if let Some(data) = &sheet.data {
            let format = if sheet.single_channel {
                TextureFormat::Luminance
            } else {
                TextureFormat::Rgba
            };
            let source = match data {
                SheetData::Rgba(image) => PixelSource::Rgba(image),
                SheetData::Gray(image) => PixelSource::Gray(image),
            };
            sheet.texture = create_texture(device, source, format, PixelType::U8)?;
        }
    }
    Ok(())
}

/// Dispose every sheet texture, overwriting each slot with the sentinel
pub fn dispose_textures_for_sprite_sheets(device: &dyn GlDevice, sheets: &mut [SpriteSheet]) {
    for sheet in sheets {
        sheet.texture = dispose_texture(device, sheet.texture.take());
    }
}

/// One row in the shared palette texture
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    /// Column base of the row, in texels
    pub u: f32,
    /// Row position, in texels
    pub v: f32,
    /// Row colors, packed `0xRRGGBBAA`
    pub colors: Vec<u32>,
}

/// Packs palette rows into one shared RGBA texture
#[derive(Debug, Default)]
pub struct PaletteStore {
    palettes: Vec<Rc<Palette>>,
    texture: Option<Texture2d>,
}

impl PaletteStore {
    /// Empty store; add rows, then upload with [`PaletteStore::init`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a palette row and get its shared handle
    ///
    /// The row coordinate is final; rows added after [`PaletteStore::init`]
    /// need another `init` call to reach the GPU.
    pub fn add(&mut self, colors: &[u32]) -> Rc<Palette> {
        let palette = Rc::new(Palette {
            u: 0.0,
            v: self.palettes.len() as f32,
            colors: colors.to_vec(),
        });
        self.palettes.push(Rc::clone(&palette));
        palette
    }

    /// Number of stored rows
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.palettes.len()
    }

    /// Upload all rows into the shared texture
    ///
    /// Rows shorter than the widest are right-padded with transparent
    /// texels. Replaces any previous upload. A soft texture failure leaves
    /// the store without a texture; palette draws then sample nothing.
    pub fn init(&mut self, device: &dyn GlDevice) -> GraphicsResult<()> {
        self.texture = dispose_texture(device, self.texture.take());

        let width = self
            .palettes
            .iter()
            .map(|p| p.colors.len())
            .max()
            .unwrap_or(1)
            .max(1);
        let height = self.palettes.len().max(1);

        let mut pixels = vec![0u8; width * height * 4];
        for (row, palette) in self.palettes.iter().enumerate() {
            for (column, &packed) in palette.colors.iter().enumerate() {
                let at = (row * width + column) * 4;
                pixels[at] = color::red(packed);
                pixels[at + 1] = color::green(packed);
                pixels[at + 2] = color::blue(packed);
                pixels[at + 3] = color::alpha(packed);
            }
        }

        self.texture = create_texture(
            device,
            PixelSource::Raw {
                bytes: &pixels,
                width: width as u32,
                height: height as u32,
            },
            TextureFormat::Rgba,
            PixelType::U8,
        )?;
        Ok(())
    }

    /// Uploaded palette texture, when present
    #[must_use]
    pub fn texture(&self) -> Option<&Texture2d> {
        self.texture.as_ref()
    }

    /// Release the shared texture; row data and handles stay valid
    pub fn dispose(&mut self, device: &dyn GlDevice) {
        self.texture = dispose_texture(device, self.texture.take());
    }
}

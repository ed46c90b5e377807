//! Packed color handling
//!
//! Colors travel through the engine as packed `0xRRGGBBAA` integers and are
//! written into the vertex staging buffer as the raw bit pattern of an f32.
//! The GPU reads that field back as four normalized unsigned bytes, so the
//! byte order inside the float must be ABGR (R in the lowest byte on
//! little-endian targets).

/// Opaque white
pub const WHITE: u32 = 0xffff_ffff;

/// Opaque black
pub const BLACK: u32 = 0x0000_00ff;

/// Fully transparent
pub const TRANSPARENT: u32 = 0x0000_0000;

const WHITE_FLOAT: f32 = f32::from_bits(0xffff_ffff);

/// Pack individual channels into a `0xRRGGBBAA` color
#[must_use]
pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | (a as u32)
}

/// Red channel of a packed color
#[must_use]
pub const fn red(color: u32) -> u8 {
    (color >> 24) as u8
}

/// Green channel of a packed color
#[must_use]
pub const fn green(color: u32) -> u8 {
    (color >> 16) as u8
}

/// Blue channel of a packed color
#[must_use]
pub const fn blue(color: u32) -> u8 {
    (color >> 8) as u8
}

/// Alpha channel of a packed color
#[must_use]
pub const fn alpha(color: u32) -> u8 {
    color as u8
}

/// Replace the alpha channel with a normalized float in `[0, 1]`
#[must_use]
pub fn with_alpha_float(color: u32, alpha: f32) -> u32 {
    (color & 0xffff_ff00) | ((alpha * 255.0) as u32 & 0xff)
}

/// Normalized channel floats in RGBA order, for clear colors and uniforms
#[must_use]
pub fn to_floats(color: u32) -> [f32; 4] {
    [
        f32::from(red(color)) / 255.0,
        f32::from(green(color)) / 255.0,
        f32::from(blue(color)) / 255.0,
        f32::from(alpha(color)) / 255.0,
    ]
}

/// Reinterpret a packed RGBA color as the f32 bit pattern of its ABGR bytes
#[must_use]
pub fn color_to_float(color: u32) -> f32 {
    let abgr = ((color & 0xff) << 24)
        | ((color >> 8) & 0xff) << 16
        | ((color >> 16) & 0xff) << 8
        | (color >> 24);
    f32::from_bits(abgr)
}

/// Like [`color_to_float`], with the alpha channel scaled by `alpha`
#[must_use]
pub fn color_to_float_alpha(color: u32, alpha: f32) -> f32 {
    let a = ((color & 0xff) as f32 * alpha) as u32 & 0xff;
    let abgr = (a << 24) | ((color >> 8) & 0xff) << 16 | ((color >> 16) & 0xff) << 8 | (color >> 24);
    f32::from_bits(abgr)
}

/// Packed color float for a draw call, with a fast path for opaque white
#[must_use]
pub fn get_color_float(color: u32, alpha: f32) -> f32 {
    if color == WHITE && alpha == 1.0 {
        WHITE_FLOAT
    } else {
        color_to_float_alpha(color, alpha)
    }
}

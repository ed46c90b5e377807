//! Embedded shader sources
//!
//! Each GLSL ES 1.00 file carries both stages in one blob, split on the
//! `// FRAGMENT` sentinel line by `ShaderSource::parse`. The attribute
//! declaration order in every vertex stage matches the corresponding batch
//! layout, because declaration order drives the attribute binding indices.
//!
//! Variant defines:
//! - sprite: `USE_COLOR` multiplies the texel by the full vertex color
//!   instead of its alpha alone.
//! - palette: `DEPTH_BUFFERED` discards transparent fragments so depth
//!   writes leave no holes behind them.

/// Plain textured sprites over the sprite batch layout
pub const SPRITE_SHADER: &str = include_str!("../../shaders/sprite.glsl");

/// Palette-resolved sprites over the palette batch layout
pub const PALETTE_SHADER: &str = include_str!("../../shaders/palette.glsl");

/// Additive light sprites drawn into the light target
pub const LIGHT_SHADER: &str = include_str!("../../shaders/light.glsl");

/// Fullscreen pass multiplying the scene target by the light target
pub const MERGE_SHADER: &str = include_str!("../../shaders/merge.glsl");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::HeadlessDevice;
    use crate::render::batching::palette::PALETTE_ATTRIBUTES;
    use crate::render::batching::sprite::SPRITE_ATTRIBUTES;
    use crate::render::resources::shader::{vertex_attribute_names, Shader, ShaderSource};

    fn attribute_names(source: &str) -> Vec<String> {
        let parsed = ShaderSource::parse(source).unwrap();
        vertex_attribute_names(parsed.vertex())
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn layout_names(attributes: &[crate::render::batching::layout::VertexAttribute]) -> Vec<String> {
        attributes.iter().map(|a| a.name.to_string()).collect()
    }

    #[test]
    fn test_every_source_splits_on_the_sentinel() {
        for source in [SPRITE_SHADER, PALETTE_SHADER, LIGHT_SHADER, MERGE_SHADER] {
            let parsed = ShaderSource::parse(source).unwrap();
            assert!(parsed.vertex().contains("gl_Position"));
            assert!(parsed.fragment().contains("gl_FragColor"));
        }
    }

    #[test]
    fn test_sprite_attributes_match_batch_layout() {
        assert_eq!(attribute_names(SPRITE_SHADER), layout_names(&SPRITE_ATTRIBUTES));
    }

    #[test]
    fn test_palette_attributes_match_batch_layout() {
        assert_eq!(attribute_names(PALETTE_SHADER), layout_names(&PALETTE_ATTRIBUTES));
    }

    #[test]
    fn test_light_and_merge_use_the_sprite_layout() {
        assert_eq!(attribute_names(LIGHT_SHADER), layout_names(&SPRITE_ATTRIBUTES));
        assert_eq!(attribute_names(MERGE_SHADER), layout_names(&SPRITE_ATTRIBUTES));
    }

    #[test]
    fn test_merge_sampler_units_follow_name_order() {
        let device = HeadlessDevice::new();
        let mut shader = Shader::new(ShaderSource::parse(MERGE_SHADER).unwrap());

        let program = shader.compile(&device, &[]).unwrap();

        assert!(program.uniform("lightSampler").is_some());
        assert!(program.uniform("sceneSampler").is_some());
        assert!(program.uniform("transform").is_some());
        shader.dispose(&device);
    }

    #[test]
    fn test_variant_defines_compile() {
        let device = HeadlessDevice::new();
        let mut sprite = Shader::new(ShaderSource::parse(SPRITE_SHADER).unwrap());
        let mut palette = Shader::new(ShaderSource::parse(PALETTE_SHADER).unwrap());

        sprite.compile(&device, &[]).unwrap();
        sprite.compile(&device, &["USE_COLOR"]).unwrap();
        palette.compile(&device, &[]).unwrap();
        palette.compile(&device, &["DEPTH_BUFFERED"]).unwrap();

        assert_eq!(sprite.variant_count(), 2);
        assert_eq!(palette.variant_count(), 2);
        sprite.dispose(&device);
        palette.dispose(&device);
    }
}

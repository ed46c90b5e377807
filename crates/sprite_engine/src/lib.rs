//! # Sprite Engine
//!
//! A batched 2D sprite renderer for OpenGL and GLES 2 class devices.
//!
//! ## Features
//!
//! - **Sprite Batching**: fixed-capacity quad accumulation with one buffer
//!   upload and one indexed draw per flush
//! - **Capture and Replay**: record a transformed quad range once, replay it
//!   in later frames without re-transforming
//! - **Palette Rendering**: indexed-color sprites resolved through a shared
//!   lookup texture
//! - **Light Pass**: additive offscreen light accumulation merged over the
//!   scene at frame end
//! - **Capability Degradation**: keeps drawing when offscreen framebuffers
//!   or the depth buffer are unavailable
//! - **Headless Testing**: every layer above the device seam runs against a
//!   recording device with fault injection, no GPU required
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::rc::Rc;
//!
//! use sprite_engine::config::RendererConfig;
//! use sprite_engine::foundation::color;
//! use sprite_engine::render::backends::HeadlessDevice;
//! use sprite_engine::render::{DrawSurface, GlDevice, Renderer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device: Rc<dyn GlDevice> = Rc::new(HeadlessDevice::new());
//!     let mut renderer = Renderer::new(device, &RendererConfig::default(), Vec::new())?;
//!
//!     renderer.begin_frame();
//!     renderer.use_program(&renderer.programs.sprite);
//!     renderer.sprite_batch.core.begin()?;
//!     renderer.sprite_batch.draw_rect(color::WHITE, 16.0, 16.0, 32.0, 32.0)?;
//!     renderer.sprite_batch.core.end()?;
//!     renderer.end_frame()?;
//!
//!     renderer.dispose();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::config::{Config, RendererConfig};
    pub use crate::foundation::color;
    pub use crate::foundation::math::Mat2d;
    pub use crate::render::{
        DrawSurface, FrameStats, GlDevice, GraphicsError, GraphicsResult, PaletteSpriteBatch,
        Renderer, Sprite, SpriteBatch, SpriteSheet,
    };
}

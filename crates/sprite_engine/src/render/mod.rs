//! # Rendering System
//!
//! Batched 2D sprite rendering over OpenGL / GLES with explicit GPU resource
//! lifecycles. The module is layered so everything above the device seam is
//! testable without a GPU:
//!
//! - **Renderer**: high-level facade owning every GPU resource for a frame
//! - **Batching**: fixed-capacity sprite accumulation with capture/replay
//! - **Resources**: textures, shader variant caches, framebuffer chain
//! - **Device seam**: [`api::GlDevice`] trait over the GL calls the engine uses
//! - **Backends**: a real `glow` device and a recording headless device
//!
//! ## Failure Model
//!
//! Operations distinguish fatal errors (`Err`) from degraded-but-running
//! outcomes (`Ok(None)` / capability flags on the renderer). Disposal never
//! fails and never runs twice on the same resource: every dispose either
//! consumes its value or overwrites the owning slot with `None`.

pub mod api;
pub mod backends;
pub mod batching;
pub mod renderer;
pub mod resources;
pub mod shaders;
pub mod sprites;

use thiserror::Error;

pub use api::device::{DeviceCapabilities, DeviceError, DeviceResult, GlDevice};
pub use batching::{
    Batch, BatchError, BatchResult, BatchStats, DrawSurface, PaletteSpriteBatch, SpriteBatch,
};
pub use renderer::{FrameStats, Renderer, StandardPrograms};
pub use resources::framebuffer::Framebuffer;
pub use resources::shader::{Shader, ShaderProgramData, ShaderSource};
pub use resources::texture::{PixelSource, Texture2d};
pub use sprites::{Palette, PaletteStore, SheetData, Sprite, SpriteSheet};

/// High-level graphics error
///
/// Everything above the device seam reports failures through this type.
/// Backend-specific errors surface as [`DeviceError`] wrapped in
/// [`GraphicsError::Device`]; the remaining variants describe failures the
/// engine itself detects before or after the GPU call.
#[derive(Error, Debug)]
pub enum GraphicsError {
    /// No usable GL context could be created on this host
    ///
    /// Every context API in the fallback order was attempted and failed.
    /// `details` carries the per-attempt failure reasons.
    #[error("No usable GL context: {details}")]
    ContextUnavailable { details: String },

    /// A combined shader source did not contain exactly one stage separator
    #[error("Malformed shader source: {details}")]
    MalformedShaderSource { details: String },

    /// An active uniform reported by the driver could not be located
    ///
    /// Indicates a driver reflection inconsistency; the program is unusable.
    #[error("Could not resolve location of active uniform '{name}'")]
    UniformResolution { name: String },

    /// Requested texture dimensions are zero or exceed the device limit
    #[error("Invalid texture shape {width}x{height} (device limit {max_size})")]
    InvalidTextureShape {
        width: u32,
        height: u32,
        max_size: u32,
    },

    /// The device cannot satisfy a required capability
    #[error("Unsupported device feature: {feature}")]
    UnsupportedFeature { feature: String },

    /// A framebuffer failed its completeness check after attachment
    #[error("Framebuffer incomplete (status {status:#06x})")]
    IncompleteFramebuffer { status: u32 },

    /// A GPU resource could not be created or populated
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// A device-level call failed
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A batch operation failed inside a facade frame pass
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Result type for graphics operations
pub type GraphicsResult<T> = Result<T, GraphicsError>;

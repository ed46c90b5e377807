//! Device backends
//!
//! Two implementations of [`GlDevice`](crate::render::api::GlDevice) live
//! here. [`glow::GlowDevice`] drives a real OpenGL or GLES context acquired
//! through glutin. [`headless::HeadlessDevice`] records every call for tests
//! and supports fault injection, so resource lifecycles and degradation
//! paths can be exercised without a GPU.

pub mod glow;
pub mod headless;

pub use self::glow::{acquire_context, AcquiredContext, GlowDevice};
pub use headless::{DeviceCall, HeadlessDevice};

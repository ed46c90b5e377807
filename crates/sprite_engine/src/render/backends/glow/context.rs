//! GL context acquisition
//!
//! Builds a GL context for a host surface, with ordered capability fallback:
//! desktop OpenGL is tried first, then GLES 3.0. The context is requested
//! with no alpha channel, no multisampling, and no default depth or stencil
//! buffer; depth for the composited passes lives in the framebuffer chain.
//!
//! Nothing here configures GL state. The caller wraps the returned
//! [`glow::Context`] in a device and drives all state from there.

use std::ffi::CStr;
use std::num::NonZeroU32;

use glutin::config::{Config, ConfigTemplateBuilder};
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext, Version};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, WindowSurface};
use log::{debug, info};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};

use crate::render::{GraphicsError, GraphicsResult};

/// A live GL context bound to a host window surface.
///
/// Owns the presentation side of the context; the [`glow::Context`] handed
/// back alongside it is consumed by the device. Kept separate so the device
/// stays presentation-agnostic.
pub struct AcquiredContext {
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
}

impl AcquiredContext {
    /// Present the back buffer
    pub fn swap_buffers(&self) -> GraphicsResult<()> {
        self.surface
            .swap_buffers(&self.context)
            .map_err(|e| GraphicsError::ResourceCreationFailed(format!("buffer swap: {e}")))
    }

    /// Resize the presentation surface after a window resize
    pub fn resize(&self, width: NonZeroU32, height: NonZeroU32) {
        self.surface.resize(&self.context, width, height);
    }
}

fn platform_display(
    window: &(impl HasWindowHandle + HasDisplayHandle),
) -> GraphicsResult<Display> {
    let display_handle = window
        .display_handle()
        .map_err(|e| GraphicsError::ContextUnavailable {
            details: format!("no display handle: {e}"),
        })?
        .as_raw();

    #[cfg(target_os = "windows")]
    let preference = DisplayApiPreference::Wgl(None);
    #[cfg(target_os = "macos")]
    let preference = DisplayApiPreference::Cgl;
    #[cfg(all(unix, not(target_os = "macos")))]
    let preference = DisplayApiPreference::Egl;

    unsafe { Display::new(display_handle, preference) }.map_err(|e| {
        GraphicsError::ContextUnavailable {
            details: format!("display bring-up failed: {e}"),
        }
    })
}

fn find_config(display: &Display) -> GraphicsResult<Config> {
    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(0)
        .with_depth_size(0)
        .with_stencil_size(0)
        .with_transparency(false)
        .build();

    unsafe { display.find_configs(template) }
        .ok()
        .and_then(|mut configs| configs.next())
        .ok_or_else(|| GraphicsError::ContextUnavailable {
            details: "no GL config matches the requested attributes".to_string(),
        })
}

fn create_context_with_fallback(
    display: &Display,
    config: &Config,
    raw_window_handle: RawWindowHandle,
) -> GraphicsResult<glutin::context::NotCurrentContext> {
    let apis = [
        ("OpenGL", ContextApi::OpenGl(None)),
        ("GLES 3.0", ContextApi::Gles(Some(Version::new(3, 0)))),
    ];

    let mut attempts = Vec::new();
    for (name, api) in apis {
        let attributes = ContextAttributesBuilder::new()
            .with_context_api(api)
            .build(Some(raw_window_handle));
        match unsafe { display.create_context(config, &attributes) } {
            Ok(context) => {
                info!("Acquired {name} context");
                return Ok(context);
            }
            Err(e) => {
                debug!("{name} context rejected: {e}");
                attempts.push(format!("{name}: {e}"));
            }
        }
    }

    Err(GraphicsError::ContextUnavailable {
        details: attempts.join("; "),
    })
}

/// Acquire a GL context for the given host window.
///
/// Returns the presentation pair and the function-loaded [`glow::Context`].
/// Fails with [`GraphicsError::ContextUnavailable`] when no API in the
/// fallback order accepts the fixed attribute set.
pub fn acquire_context(
    window: &(impl HasWindowHandle + HasDisplayHandle),
    width: NonZeroU32,
    height: NonZeroU32,
) -> GraphicsResult<(AcquiredContext, glow::Context)> {
    let display = platform_display(window)?;
    let config = find_config(&display)?;

    let raw_window_handle = window
        .window_handle()
        .map_err(|e| GraphicsError::ContextUnavailable {
            details: format!("no window handle: {e}"),
        })?
        .as_raw();

    let surface_attributes =
        SurfaceAttributesBuilder::<WindowSurface>::new().build(raw_window_handle, width, height);
    let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }.map_err(
        |e| GraphicsError::ContextUnavailable {
            details: format!("surface creation failed: {e}"),
        },
    )?;

    let context = create_context_with_fallback(&display, &config, raw_window_handle)?
        .make_current(&surface)
        .map_err(|e| GraphicsError::ContextUnavailable {
            details: format!("make_current failed: {e}"),
        })?;

    let gl = unsafe {
        glow::Context::from_loader_function_cstr(|s: &CStr| display.get_proc_address(s))
    };

    Ok((AcquiredContext { surface, context }, gl))
}

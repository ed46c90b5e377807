//! # Shader Compiler & Cache
//!
//! A [`Shader`] holds one vertex+fragment source pair and a cache of linked
//! programs, one per canonical define set. Defines are sorted before they are
//! joined into the cache key and before they are emitted as `#define` prefix
//! lines, so `["A", "B"]` and `["B", "A"]` resolve to the same program.
//!
//! Attribute locations are not reflected: the vertex source is scanned for
//! `attribute` declarations in textual order and each is bound to the next
//! sequential index before linking. Batch vertex layouts are declared in the
//! same order, which is what makes the two agree.
//!
//! Sampler uniforms get texture units assigned by sorted name, also 0..N.
//! Draw-time texture binding relies on that same ordering.

use std::collections::HashMap;
use std::rc::Rc;

use crate::render::api::device::{GlDevice, ProgramId, ShaderStage, UniformId};
use crate::render::{GraphicsError, GraphicsResult};

/// Separator line between the vertex and fragment stages of a combined source
const FRAGMENT_SENTINEL: &str = "// FRAGMENT";

/// A linked program and its resolved uniform locations
#[derive(Debug)]
pub struct ShaderProgramData {
    /// Device program handle
    pub program: ProgramId,
    /// Location of every active uniform, by name
    pub uniforms: HashMap<String, UniformId>,
}

impl ShaderProgramData {
    /// Location of a uniform, if the program declares and uses it
    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformId> {
        self.uniforms.get(name).copied()
    }
}

/// Vertex and fragment source pair
#[derive(Debug, Clone)]
pub struct ShaderSource {
    vertex: String,
    fragment: String,
}

impl ShaderSource {
    /// Split a combined source on the `// FRAGMENT` separator line
    ///
    /// The separator must occur exactly once. The fragment half keeps the
    /// separator line itself (it is a plain comment to the compiler).
    pub fn parse(source: &str) -> GraphicsResult<Self> {
        let mut split_at = None;
        let mut separators = 0usize;
        let mut offset = 0usize;

        for line in source.split_inclusive('\n') {
            if line.trim_end() == FRAGMENT_SENTINEL {
                separators += 1;
                if split_at.is_none() {
                    split_at = Some(offset);
                }
            }
            offset += line.len();
        }

        match (split_at, separators) {
            (Some(at), 1) => Ok(Self {
                vertex: source[..at].to_string(),
                fragment: source[at..].to_string(),
            }),
            (None, _) => Err(GraphicsError::MalformedShaderSource {
                details: format!("missing '{FRAGMENT_SENTINEL}' separator line"),
            }),
            (_, n) => Err(GraphicsError::MalformedShaderSource {
                details: format!("found {n} '{FRAGMENT_SENTINEL}' separator lines, expected one"),
            }),
        }
    }

    /// Build from already-separate stage sources
    pub fn from_stages(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Vertex stage source
    #[must_use]
    pub fn vertex(&self) -> &str {
        &self.vertex
    }

    /// Fragment stage source
    #[must_use]
    pub fn fragment(&self) -> &str {
        &self.fragment
    }
}

/// Names of `attribute` declarations in textual order.
///
/// Declarations start at column zero, one per line, matching how the engine
/// sources are written.
pub(crate) fn vertex_attribute_names(vertex: &str) -> Vec<&str> {
    vertex
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("attribute ")?;
            let mut parts = rest.split_whitespace();
            let _type_name = parts.next()?;
            parts.next().map(|name| name.trim_end_matches(';'))
        })
        .collect()
}

/// A shader source pair with its per-instance program variant cache
#[derive(Debug)]
pub struct Shader {
    source: ShaderSource,
    programs: HashMap<String, Rc<ShaderProgramData>>,
}

impl Shader {
    /// Wrap a source pair; nothing is compiled until [`Shader::compile`]
    #[must_use]
    pub fn new(source: ShaderSource) -> Self {
        Self {
            source,
            programs: HashMap::new(),
        }
    }

    /// Compile and link the variant for the given define set, or return the
    /// cached program
    ///
    /// Compile and link failures are fatal and carry the backend's
    /// diagnostic log. So is an active uniform whose location cannot be
    /// resolved after linking.
    pub fn compile(
        &mut self,
        device: &dyn GlDevice,
        defines: &[&str],
    ) -> GraphicsResult<Rc<ShaderProgramData>> {
        let mut sorted: Vec<&str> = defines.to_vec();
        sorted.sort_unstable();
        let key = sorted.concat();

        if let Some(data) = self.programs.get(&key) {
            return Ok(Rc::clone(data));
        }

        let data = Rc::new(compile_program(device, &self.source, &sorted)?);
        self.programs.insert(key, Rc::clone(&data));
        Ok(data)
    }

    /// Number of compiled variants currently cached
    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.programs.len()
    }

    /// Delete every cached program
    ///
    /// Outstanding [`ShaderProgramData`] references become stale; using them
    /// is a device-level no-op. Safe to call more than once.
    pub fn dispose(&mut self, device: &dyn GlDevice) {
        for (_, data) in self.programs.drain() {
            device.delete_program(data.program);
        }
    }
}

fn compile_program(
    device: &dyn GlDevice,
    source: &ShaderSource,
    sorted_defines: &[&str],
) -> GraphicsResult<ShaderProgramData> {
    let prefix: String = sorted_defines
        .iter()
        .map(|define| format!("#define {define}\n"))
        .collect();

    let vertex = device.compile_shader(ShaderStage::Vertex, &format!("{prefix}{}", source.vertex))?;
    let fragment =
        match device.compile_shader(ShaderStage::Fragment, &format!("{prefix}{}", source.fragment)) {
            Ok(shader) => shader,
            Err(e) => {
                device.delete_shader(vertex);
                return Err(e.into());
            }
        };

    let program = match device.create_program() {
        Ok(program) => program,
        Err(e) => {
            device.delete_shader(vertex);
            device.delete_shader(fragment);
            return Err(e.into());
        }
    };
    device.attach_shader(program, vertex);
    device.attach_shader(program, fragment);

    // Binding order defines the vertex layout contract; must happen pre-link.
    for (index, name) in vertex_attribute_names(&source.vertex).iter().enumerate() {
        device.bind_attrib_location(program, index as u32, name);
    }

    let linked = device.link_program(program);
    device.delete_shader(vertex);
    device.delete_shader(fragment);
    if let Err(e) = linked {
        device.delete_program(program);
        return Err(e.into());
    }

    device.use_program(Some(program));

    let mut uniforms = HashMap::new();
    let mut samplers = Vec::new();
    for active in device.active_uniforms(program) {
        let Some(location) = device.uniform_location(program, &active.name) else {
            device.use_program(None);
            device.delete_program(program);
            return Err(GraphicsError::UniformResolution { name: active.name });
        };
        if active.utype.is_sampler() {
            samplers.push(active.name.clone());
        }
        uniforms.insert(active.name, location);
    }

    samplers.sort();
    for (unit, name) in samplers.iter().enumerate() {
        device.set_uniform_1i(uniforms[name.as_str()], unit as i32);
    }

    device.use_program(None);

    Ok(ShaderProgramData { program, uniforms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::headless::{DeviceCall, HeadlessDevice};

    const SOURCE: &str = "attribute vec3 aPosition;\n\
                          attribute vec2 aTexCoord;\n\
                          uniform mat4 transform;\n\
                          void main() {}\n\
                          // FRAGMENT\n\
                          uniform sampler2D textureSampler;\n\
                          void main() {}\n";

    #[test]
    fn test_parse_splits_on_sentinel() {
        let source = ShaderSource::parse(SOURCE).unwrap();
        assert!(source.vertex().ends_with("void main() {}\n"));
        assert!(source.vertex().contains("aPosition"));
        assert!(source.fragment().starts_with("// FRAGMENT"));
        assert!(source.fragment().contains("textureSampler"));
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        let result = ShaderSource::parse("void main() {}\n");
        assert!(matches!(
            result,
            Err(GraphicsError::MalformedShaderSource { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_repeated_separator() {
        let result = ShaderSource::parse("a\n// FRAGMENT\nb\n// FRAGMENT\nc\n");
        assert!(matches!(
            result,
            Err(GraphicsError::MalformedShaderSource { .. })
        ));
    }

    #[test]
    fn test_attribute_scan_follows_declaration_order() {
        let device = HeadlessDevice::new();
        let mut shader = Shader::new(ShaderSource::parse(SOURCE).unwrap());
        shader.compile(&device, &[]).unwrap();

        let bindings: Vec<(u32, String)> = device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::BindAttribLocation { index, name } => Some((index, name)),
                _ => None,
            })
            .collect();
        assert_eq!(
            bindings,
            vec![(0, "aPosition".to_string()), (1, "aTexCoord".to_string())]
        );
    }

    #[test]
    fn test_compile_caches_by_canonical_define_key() {
        let device = HeadlessDevice::new();
        let mut shader = Shader::new(ShaderSource::parse(SOURCE).unwrap());

        let first = shader.compile(&device, &["USE_COLOR", "DEPTH"]).unwrap();
        let second = shader.compile(&device, &["DEPTH", "USE_COLOR"]).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(shader.variant_count(), 1);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::CompileShader { .. })),
            2
        );
    }

    #[test]
    fn test_define_prefix_lines_are_sorted() {
        let device = HeadlessDevice::new();
        let mut shader = Shader::new(ShaderSource::parse(SOURCE).unwrap());
        shader.compile(&device, &["USE_COLOR", "DEPTH"]).unwrap();

        for call in device.calls() {
            if let DeviceCall::CompileShader { source, .. } = call {
                assert!(source.starts_with("#define DEPTH\n#define USE_COLOR\n"));
            }
        }
    }

    #[test]
    fn test_sampler_units_follow_sorted_name_order() {
        let device = HeadlessDevice::new();
        let combined = "attribute vec3 aPosition;\n\
                        void main() {}\n\
                        // FRAGMENT\n\
                        uniform sampler2D zSampler;\n\
                        uniform sampler2D aSampler;\n\
                        void main() {}\n";
        let mut shader = Shader::new(ShaderSource::parse(combined).unwrap());
        let data = shader.compile(&device, &[]).unwrap();

        let a_location = data.uniform("aSampler").unwrap();
        let z_location = data.uniform("zSampler").unwrap();
        let assignments: Vec<(UniformId, i32)> = device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::SetUniform1i { location, value } => Some((location, value)),
                _ => None,
            })
            .collect();
        assert_eq!(assignments, vec![(a_location, 0), (z_location, 1)]);
    }

    #[test]
    fn test_compile_failure_cleans_up_and_carries_log() {
        let device = HeadlessDevice::new();
        device.fail_fragment_compile("unexpected token");
        let mut shader = Shader::new(ShaderSource::parse(SOURCE).unwrap());

        let err = shader.compile(&device, &[]).unwrap_err();

        match err {
            GraphicsError::Device(crate::render::api::device::DeviceError::ShaderCompile {
                stage,
                log,
            }) => {
                assert_eq!(stage, "fragment");
                assert!(log.contains("unexpected token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(device.alive_shaders(), 0);
        assert_eq!(device.alive_programs(), 0);
        assert_eq!(shader.variant_count(), 0);
    }

    #[test]
    fn test_unresolvable_uniform_is_fatal() {
        let device = HeadlessDevice::new();
        device.fail_uniform_lookup("transform");
        let mut shader = Shader::new(ShaderSource::parse(SOURCE).unwrap());

        let err = shader.compile(&device, &[]).unwrap_err();

        assert!(matches!(
            err,
            GraphicsError::UniformResolution { name } if name == "transform"
        ));
        assert_eq!(device.alive_programs(), 0);
    }

    #[test]
    fn test_dispose_deletes_every_variant_once() {
        let device = HeadlessDevice::new();
        let mut shader = Shader::new(ShaderSource::parse(SOURCE).unwrap());
        shader.compile(&device, &[]).unwrap();
        shader.compile(&device, &["USE_COLOR"]).unwrap();
        assert_eq!(device.alive_programs(), 2);

        shader.dispose(&device);
        shader.dispose(&device);

        assert_eq!(device.alive_programs(), 0);
        assert_eq!(
            device.count_calls(|c| matches!(c, DeviceCall::DeleteProgram(_))),
            2
        );
        assert_eq!(shader.variant_count(), 0);
    }
}

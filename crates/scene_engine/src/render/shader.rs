//! Shader descriptions
//!
//! A [`Shader`] is an engine-side description of a GPU program: its named
//! techniques (passes plus fixed-function state) and the constants it
//! consumes, grouped by how often they change. Built-in shaders are created
//! through the [`ShaderRegistry`], which maps each [`ShaderKind`] to a
//! factory function.

use serde::{Deserialize, Serialize};

/// Built-in shader families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderKind {
    /// Flat colour, no lighting
    Unlit,
    /// Single directional light with specular highlight
    Lit,
    /// Line rendering used by debug helpers
    Wireframe,
}

/// How often a shader constant changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateFrequency {
    /// Once per frame (camera, lights)
    Global,
    /// Whenever the bound material changes
    PerMaterial,
    /// For every drawn object
    PerInstance,
}

/// Type of a shader constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Scalar
    Float,
    /// 3 component vector
    Vec3,
    /// 4 component vector
    Vec4,
    /// Column-major 4x4 matrix
    Mat4,
}

/// Value of a shader constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    /// Scalar
    Float(f32),
    /// 3 component vector
    Vec3([f32; 3]),
    /// 4 component vector
    Vec4([f32; 4]),
    /// Column-major 4x4 matrix
    Mat4([f32; 16]),
}

impl ParameterValue {
    /// Type of this value
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::Vec3(_) => ParameterKind::Vec3,
            ParameterValue::Vec4(_) => ParameterKind::Vec4,
            ParameterValue::Mat4(_) => ParameterKind::Mat4,
        }
    }

    /// Raw bytes as uploaded to a constant buffer
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ParameterValue::Float(v) => bytemuck::bytes_of(v),
            ParameterValue::Vec3(v) => bytemuck::cast_slice(v),
            ParameterValue::Vec4(v) => bytemuck::cast_slice(v),
            ParameterValue::Mat4(v) => bytemuck::cast_slice(v),
        }
    }
}

/// A constant consumed by a shader
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderParameter {
    /// Name the constant is bound by
    pub name: String,
    /// When the value is pushed
    pub frequency: UpdateFrequency,
    /// Expected value type
    pub kind: ParameterKind,
    /// Value used when nothing else provides one
    pub default: Option<ParameterValue>,
}

impl ShaderParameter {
    /// Parameter without a default value
    pub fn new(name: impl Into<String>, frequency: UpdateFrequency, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            frequency,
            kind,
            default: None,
        }
    }

    /// Set the fallback value
    pub fn with_default(mut self, value: ParameterValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// Triangle rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterizerState {
    /// Cull counter-clockwise faces
    #[default]
    CullCounterClockwise,
    /// Cull clockwise faces
    CullClockwise,
    /// Draw both faces
    CullNone,
    /// Draw edges only
    Wireframe,
}

/// Depth buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthStencilState {
    /// Depth test and depth write
    #[default]
    Default,
    /// Depth test without writing
    DepthRead,
    /// No depth test
    None,
}

/// Colour blending mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendState {
    /// Replace the destination
    #[default]
    Opaque,
    /// Premultiplied alpha blending
    AlphaBlend,
    /// Add to the destination
    Additive,
    /// Straight alpha blending
    NonPremultiplied,
}

impl BlendState {
    /// Whether geometry drawn with this state must be sorted back to front
    pub fn is_transparent(&self) -> bool {
        !matches!(self, BlendState::Opaque)
    }
}

/// Fixed-function state a technique draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderState {
    /// Rasterizer state
    pub rasterizer: RasterizerState,
    /// Depth/stencil state
    pub depth_stencil: DepthStencilState,
    /// Blend state
    pub blend: BlendState,
}

impl RenderState {
    /// Opaque geometry with depth test and back-face culling
    pub fn opaque() -> Self {
        Self::default()
    }

    /// Alpha blended geometry that tests but does not write depth
    pub fn alpha_blend() -> Self {
        Self {
            rasterizer: RasterizerState::CullCounterClockwise,
            depth_stencil: DepthStencilState::DepthRead,
            blend: BlendState::AlphaBlend,
        }
    }

    /// Line geometry
    pub fn wireframe() -> Self {
        Self {
            rasterizer: RasterizerState::Wireframe,
            depth_stencil: DepthStencilState::Default,
            blend: BlendState::Opaque,
        }
    }
}

/// A named variant of a shader
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderTechnique {
    /// Technique name, unique within its shader
    pub name: String,
    /// Pass names applied in order for every draw
    pub passes: Vec<String>,
    /// State the technique draws with
    pub render_state: RenderState,
    /// Name of the technique used for instanced draws, if any
    pub instanced_variant: Option<String>,
}

impl ShaderTechnique {
    /// Single-pass technique with the given state
    pub fn new(name: impl Into<String>, render_state: RenderState) -> Self {
        Self {
            name: name.into(),
            passes: vec!["P0".to_string()],
            render_state,
            instanced_variant: None,
        }
    }

    /// Replace the pass list
    pub fn with_passes(mut self, passes: &[&str]) -> Self {
        self.passes = passes.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Declare the technique used for instanced draws
    pub fn with_instanced_variant(mut self, variant: impl Into<String>) -> Self {
        self.instanced_variant = Some(variant.into());
        self
    }
}

/// Description of a GPU program
#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    kind: ShaderKind,
    techniques: Vec<ShaderTechnique>,
    parameters: Vec<ShaderParameter>,
}

impl Shader {
    /// Name of the technique materials start with
    pub const DEFAULT_TECHNIQUE: &'static str = "Default";

    /// Empty shader of the given kind
    pub fn new(kind: ShaderKind) -> Self {
        Self {
            kind,
            techniques: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Add a technique
    pub fn with_technique(mut self, technique: ShaderTechnique) -> Self {
        self.techniques.push(technique);
        self
    }

    /// Add a parameter
    pub fn with_parameter(mut self, parameter: ShaderParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Shader family
    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    /// Look up a technique by name
    pub fn technique(&self, name: &str) -> Option<&ShaderTechnique> {
        self.techniques.iter().find(|t| t.name == name)
    }

    /// All techniques
    pub fn techniques(&self) -> &[ShaderTechnique] {
        &self.techniques
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&ShaderParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameters updated at `frequency`
    pub fn parameters_with(&self, frequency: UpdateFrequency) -> impl Iterator<Item = &ShaderParameter> {
        self.parameters.iter().filter(move |p| p.frequency == frequency)
    }
}

/// Constant names shared by the built-in shaders
pub mod names {
    /// Camera view-projection matrix
    pub const VIEW_PROJECTION: &str = "view_projection";
    /// Camera position in world space
    pub const CAMERA_POSITION: &str = "camera_position";
    /// Direction the scene light travels in
    pub const LIGHT_DIRECTION: &str = "light_direction";
    /// Base colour of a material
    pub const DIFFUSE_COLOR: &str = "diffuse_color";
    /// Specular exponent of a material
    pub const SPECULAR_POWER: &str = "specular_power";
    /// Object world matrix
    pub const WORLD: &str = "world";
}

type ShaderFactory = fn() -> Shader;

const FACTORIES: [(ShaderKind, ShaderFactory); 3] = [
    (ShaderKind::Unlit, unlit_shader as ShaderFactory),
    (ShaderKind::Lit, lit_shader as ShaderFactory),
    (ShaderKind::Wireframe, wireframe_shader as ShaderFactory),
];

/// Creates built-in shaders by kind
pub struct ShaderRegistry;

impl ShaderRegistry {
    /// Build a fresh description of the shader of `kind`
    pub fn create(kind: ShaderKind) -> Shader {
        FACTORIES
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, factory)| factory())
            .unwrap_or_else(|| Shader::new(kind))
    }

    /// Every kind the registry knows how to build
    pub fn kinds() -> impl Iterator<Item = ShaderKind> {
        FACTORIES.iter().map(|(kind, _)| *kind)
    }
}

fn common_parameters(shader: Shader) -> Shader {
    shader
        .with_parameter(ShaderParameter::new(names::VIEW_PROJECTION, UpdateFrequency::Global, ParameterKind::Mat4))
        .with_parameter(ShaderParameter::new(names::WORLD, UpdateFrequency::PerInstance, ParameterKind::Mat4))
        .with_parameter(
            ShaderParameter::new(names::DIFFUSE_COLOR, UpdateFrequency::PerMaterial, ParameterKind::Vec4)
                .with_default(ParameterValue::Vec4([1.0, 1.0, 1.0, 1.0])),
        )
}

fn unlit_shader() -> Shader {
    common_parameters(Shader::new(ShaderKind::Unlit))
        .with_technique(
            ShaderTechnique::new(Shader::DEFAULT_TECHNIQUE, RenderState::opaque()).with_instanced_variant("Instanced"),
        )
        .with_technique(ShaderTechnique::new("Instanced", RenderState::opaque()))
        .with_technique(ShaderTechnique::new("Transparent", RenderState::alpha_blend()))
}

fn lit_shader() -> Shader {
    common_parameters(Shader::new(ShaderKind::Lit))
        .with_parameter(ShaderParameter::new(names::CAMERA_POSITION, UpdateFrequency::Global, ParameterKind::Vec3))
        .with_parameter(
            ShaderParameter::new(names::LIGHT_DIRECTION, UpdateFrequency::Global, ParameterKind::Vec3)
                .with_default(ParameterValue::Vec3([0.0, -1.0, 0.0])),
        )
        .with_parameter(
            ShaderParameter::new(names::SPECULAR_POWER, UpdateFrequency::PerMaterial, ParameterKind::Float)
                .with_default(ParameterValue::Float(16.0)),
        )
        .with_technique(
            ShaderTechnique::new(Shader::DEFAULT_TECHNIQUE, RenderState::opaque()).with_instanced_variant("Instanced"),
        )
        .with_technique(ShaderTechnique::new("Instanced", RenderState::opaque()))
        .with_technique(
            ShaderTechnique::new("Transparent", RenderState::alpha_blend()).with_passes(&["BackFaces", "FrontFaces"]),
        )
}

fn wireframe_shader() -> Shader {
    common_parameters(Shader::new(ShaderKind::Wireframe))
        .with_technique(ShaderTechnique::new(Shader::DEFAULT_TECHNIQUE, RenderState::wireframe()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_every_kind() {
        for kind in ShaderRegistry::kinds() {
            let shader = ShaderRegistry::create(kind);
            assert_eq!(shader.kind(), kind);
            assert!(shader.technique(Shader::DEFAULT_TECHNIQUE).is_some());
            assert!(shader.parameter(names::WORLD).is_some());
        }
    }

    #[test]
    fn test_instanced_variants_exist() {
        let shader = ShaderRegistry::create(ShaderKind::Lit);
        for technique in shader.techniques() {
            if let Some(variant) = &technique.instanced_variant {
                assert!(shader.technique(variant).is_some(), "missing variant {variant}");
            }
        }
        assert!(ShaderRegistry::create(ShaderKind::Wireframe)
            .technique(Shader::DEFAULT_TECHNIQUE)
            .and_then(|t| t.instanced_variant.as_ref())
            .is_none());
    }

    #[test]
    fn test_parameters_grouped_by_frequency() {
        let shader = ShaderRegistry::create(ShaderKind::Lit);
        let globals: Vec<_> = shader.parameters_with(UpdateFrequency::Global).map(|p| p.name.as_str()).collect();
        assert_eq!(globals, vec![names::VIEW_PROJECTION, names::CAMERA_POSITION, names::LIGHT_DIRECTION]);
    }

    #[test]
    fn test_parameter_bytes() {
        let value = ParameterValue::Vec3([1.0, 2.0, 3.0]);
        assert_eq!(value.kind(), ParameterKind::Vec3);
        assert_eq!(value.as_bytes().len(), 12);
        assert_eq!(ParameterValue::Mat4([0.0; 16]).as_bytes().len(), 64);
    }

    #[test]
    fn test_transparency_follows_blend_state() {
        assert!(!RenderState::opaque().blend.is_transparent());
        assert!(RenderState::alpha_blend().blend.is_transparent());
        assert!(BlendState::Additive.is_transparent());
    }
}

//! Material system
//!
//! A material binds a [`Shader`] to an active technique and per-material
//! constant values. Every change that can affect how a sub-entity sorts
//! (technique, queue group) bumps the material's generation counter so
//! holders of cached sort keys can notice lazily.

use std::collections::BTreeMap;

use crate::render::render_queue::RenderQueueGroupId;
use crate::render::shader::{
    ParameterValue, RenderState, Shader, ShaderKind, ShaderRegistry, ShaderTechnique, UpdateFrequency,
};
use crate::render::{RenderError, RenderResult};

/// Shader plus the values it is drawn with
#[derive(Debug, Clone)]
pub struct Material {
    name: String,
    shader: Shader,
    active_technique: String,
    parameters: BTreeMap<String, ParameterValue>,
    queue_group: Option<RenderQueueGroupId>,
    generation: u64,
    pub(crate) sort_id: u32,
}

impl Material {
    /// Material using one of the built-in shaders
    pub fn new(name: impl Into<String>, kind: ShaderKind) -> Self {
        Self::with_shader(name, ShaderRegistry::create(kind))
    }

    /// Material using a custom shader description
    pub fn with_shader(name: impl Into<String>, shader: Shader) -> Self {
        Self {
            name: name.into(),
            shader,
            active_technique: Shader::DEFAULT_TECHNIQUE.to_string(),
            parameters: BTreeMap::new(),
            queue_group: None,
            generation: 0,
            sort_id: 0,
        }
    }

    /// Builder form of [`Material::set_parameter`]
    pub fn with_parameter(mut self, name: &str, value: ParameterValue) -> RenderResult<Self> {
        self.set_parameter(name, value)?;
        Ok(self)
    }

    /// Builder form of [`Material::set_active_technique`]
    pub fn with_technique(mut self, technique: &str) -> RenderResult<Self> {
        self.set_active_technique(technique)?;
        Ok(self)
    }

    /// Material name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shader description
    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    /// Shader family
    pub fn shader_kind(&self) -> ShaderKind {
        self.shader.kind()
    }

    /// Identity used to order materials in the render queue
    ///
    /// Zero until the material is registered with a library.
    pub fn sort_id(&self) -> u32 {
        self.sort_id
    }

    /// Change counter for technique and queue-group updates
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Name of the active technique
    pub fn active_technique_name(&self) -> &str {
        &self.active_technique
    }

    /// The active technique
    pub fn active_technique(&self) -> RenderResult<&ShaderTechnique> {
        self.shader
            .technique(&self.active_technique)
            .ok_or_else(|| RenderError::MissingTechnique {
                material: self.name.clone(),
                technique: self.active_technique.clone(),
            })
    }

    /// Switch to another technique of the shader
    pub fn set_active_technique(&mut self, technique: &str) -> RenderResult<()> {
        if self.shader.technique(technique).is_none() {
            return Err(RenderError::MissingTechnique {
                material: self.name.clone(),
                technique: technique.to_string(),
            });
        }
        if self.active_technique != technique {
            self.active_technique = technique.to_string();
            self.generation += 1;
            log::debug!("Material '{}' switched to technique '{}'", self.name, technique);
        }
        Ok(())
    }

    /// Render state of the active technique, if it exists
    pub fn render_state(&self) -> Option<RenderState> {
        self.shader.technique(&self.active_technique).map(|t| t.render_state)
    }

    /// Whether the active technique blends
    pub fn is_transparent(&self) -> bool {
        self.render_state().map(|s| s.blend.is_transparent()).unwrap_or(false)
    }

    /// Whether the active technique has an instanced variant
    pub fn supports_instancing(&self) -> bool {
        self.shader
            .technique(&self.active_technique)
            .map(|t| t.instanced_variant.is_some())
            .unwrap_or(false)
    }

    /// Queue group requested by the material
    pub fn queue_group(&self) -> Option<RenderQueueGroupId> {
        self.queue_group
    }

    /// Override the queue group used by sub-entities drawing with this material
    pub fn set_queue_group(&mut self, group: Option<RenderQueueGroupId>) {
        if self.queue_group != group {
            self.queue_group = group;
            self.generation += 1;
        }
    }

    /// Set a per-material constant
    ///
    /// The shader must declare the constant as per-material with the same type.
    pub fn set_parameter(&mut self, name: &str, value: ParameterValue) -> RenderResult<()> {
        let parameter = self
            .shader
            .parameter(name)
            .filter(|p| p.frequency == UpdateFrequency::PerMaterial)
            .ok_or_else(|| RenderError::MissingShaderParameter {
                shader: self.shader.kind(),
                parameter: name.to_string(),
            })?;
        if parameter.kind != value.kind() {
            return Err(RenderError::ParameterKindMismatch {
                parameter: name.to_string(),
                expected: parameter.kind,
                actual: value.kind(),
            });
        }
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }

    /// Value of a per-material constant, falling back to the shader default
    pub fn parameter(&self, name: &str) -> Option<ParameterValue> {
        self.parameters
            .get(name)
            .copied()
            .or_else(|| self.shader.parameter(name).and_then(|p| p.default))
    }

    /// Resolved per-material constants in declaration order
    pub fn material_constants(&self) -> RenderResult<Vec<(String, ParameterValue)>> {
        self.shader
            .parameters_with(UpdateFrequency::PerMaterial)
            .map(|p| {
                self.parameter(&p.name)
                    .map(|value| (p.name.clone(), value))
                    .ok_or_else(|| RenderError::MissingShaderParameter {
                        shader: self.shader.kind(),
                        parameter: p.name.clone(),
                    })
            })
            .collect()
    }

    /// Check that the material can be drawn
    pub fn validate(&self) -> RenderResult<()> {
        let technique = self.active_technique()?;
        if let Some(variant) = &technique.instanced_variant {
            if self.shader.technique(variant).is_none() {
                return Err(RenderError::MissingTechnique {
                    material: self.name.clone(),
                    technique: variant.clone(),
                });
            }
        }
        self.material_constants()?;
        Ok(())
    }
}

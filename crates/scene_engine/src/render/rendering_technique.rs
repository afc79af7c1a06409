//! Rendering techniques
//!
//! A rendering technique consumes a populated [`RenderQueue`] and turns it
//! into device commands. The forward technique draws every entry in sorted
//! order and keeps redundant device work to a minimum:
//!
//! - a technique is bound only when the material changes
//! - global constants are pushed once per shader per frame
//! - rasterizer, depth-stencil and blend state switch independently
//!
//! The queue is reset and the target released even when a frame fails.

use std::collections::{BTreeMap, BTreeSet};

use bytemuck::cast_slice;

use crate::assets::MaterialLibrary;
use crate::core::config::RenderConfig;
use crate::foundation::collections::MaterialId;
use crate::foundation::math::mat4_to_cols;
use crate::render::device::GraphicsDevice;
use crate::render::material::Material;
use crate::render::render_queue::{QueueItem, RenderQueue};
use crate::render::renderable::Renderable;
use crate::render::shader::{
    names, BlendState, DepthStencilState, ParameterValue, RasterizerState, RenderState, ShaderTechnique,
    UpdateFrequency,
};
use crate::render::{RenderError, RenderResult};
use crate::scene::camera::Camera;

/// Counters describing the device work of one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Technique binds caused by material changes
    pub technique_binds: usize,
    /// Binds of instanced technique variants
    pub variant_binds: usize,
    /// Rasterizer state switches
    pub rasterizer_switches: usize,
    /// Depth-stencil state switches
    pub depth_stencil_switches: usize,
    /// Blend state switches
    pub blend_switches: usize,
    /// Direct draw calls (one per pass)
    pub draw_calls: usize,
    /// Instanced draw calls (one per pass)
    pub instanced_draws: usize,
    /// Instances drawn by instanced draws
    pub instances_drawn: usize,
    /// Renderables skipped for lack of a material
    pub skipped: usize,
}

/// Strategy turning a render queue into device commands
pub trait RenderingTechnique {
    /// Technique name for diagnostics
    fn name(&self) -> &str;

    /// Draw and reset the queue
    fn render(
        &mut self,
        queue: &mut RenderQueue,
        camera: &Camera,
        materials: &MaterialLibrary,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<FrameStats>;
}

#[derive(Debug, Default)]
struct StateCache {
    material: Option<MaterialId>,
    variant_bound: bool,
    rasterizer: Option<RasterizerState>,
    depth_stencil: Option<DepthStencilState>,
    blend: Option<BlendState>,
}

impl StateCache {
    fn apply(&mut self, state: RenderState, device: &mut dyn GraphicsDevice, stats: &mut FrameStats) {
        if self.rasterizer != Some(state.rasterizer) {
            device.set_rasterizer_state(state.rasterizer);
            self.rasterizer = Some(state.rasterizer);
            stats.rasterizer_switches += 1;
        }
        if self.depth_stencil != Some(state.depth_stencil) {
            device.set_depth_stencil_state(state.depth_stencil);
            self.depth_stencil = Some(state.depth_stencil);
            stats.depth_stencil_switches += 1;
        }
        if self.blend != Some(state.blend) {
            device.set_blend_state(state.blend);
            self.blend = Some(state.blend);
            stats.blend_switches += 1;
        }
    }
}

/// Single-pass forward renderer
#[derive(Debug)]
pub struct ForwardRenderingTechnique {
    config: RenderConfig,
    globals: BTreeMap<String, ParameterValue>,
    last_stats: FrameStats,
}

impl ForwardRenderingTechnique {
    /// Create a forward technique with the given render settings
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            globals: BTreeMap::new(),
            last_stats: FrameStats::default(),
        }
    }

    /// Render settings
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Provide a global constant (lights, time) for every shader that declares it
    pub fn set_global(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.globals.insert(name.into(), value);
    }

    /// Statistics of the last completed frame
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    fn frame_globals(&self, camera: &Camera) -> BTreeMap<String, ParameterValue> {
        let mut globals = self.globals.clone();
        let position = camera.world_position();
        globals.insert(
            names::VIEW_PROJECTION.to_string(),
            ParameterValue::Mat4(mat4_to_cols(&camera.view_projection_matrix())),
        );
        globals.insert(
            names::CAMERA_POSITION.to_string(),
            ParameterValue::Vec3([position.x, position.y, position.z]),
        );
        globals
    }

    /// Global constants a material's shader needs, resolved for this frame
    fn resolve_globals(
        material: &Material,
        globals: &BTreeMap<String, ParameterValue>,
    ) -> RenderResult<Vec<(String, ParameterValue)>> {
        material
            .shader()
            .parameters_with(UpdateFrequency::Global)
            .map(|p| {
                globals
                    .get(&p.name)
                    .copied()
                    .or(p.default)
                    .map(|value| (p.name.clone(), value))
                    .ok_or_else(|| RenderError::MissingShaderParameter {
                        shader: material.shader_kind(),
                        parameter: p.name.clone(),
                    })
            })
            .collect()
    }

    /// Check every material the queue references before drawing anything
    fn validate_materials(
        queue: &RenderQueue,
        materials: &MaterialLibrary,
        globals: &BTreeMap<String, ParameterValue>,
    ) -> RenderResult<()> {
        for id in queue.used_materials() {
            let material = materials.get(id).ok_or(RenderError::MaterialNotFound(id))?;
            material.validate()?;
            Self::resolve_globals(material, globals)?;
        }
        Ok(())
    }

    fn draw_frame(
        &self,
        queue: &mut RenderQueue,
        camera: &Camera,
        materials: &MaterialLibrary,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<FrameStats> {
        let mut stats = FrameStats::default();

        device.set_render_target(&self.config.viewport)?;
        if let Some(color) = self.config.clear_color {
            device.clear(color)?;
        }

        queue.sort();
        let globals = self.frame_globals(camera);
        Self::validate_materials(queue, materials, &globals)?;

        let items = queue.sorted_items();
        let mut shaders_with_globals = BTreeSet::new();
        let mut cache = StateCache::default();

        for item in &items {
            let Some(material_id) = item.material() else {
                stats.skipped += item.renderables.len();
                continue;
            };
            let material = materials.get(material_id).ok_or(RenderError::MaterialNotFound(material_id))?;
            let technique = material.active_technique()?;

            let instanced = self.should_instance(item);

            if cache.material != Some(material_id) {
                device.bind_technique(material.shader_kind(), &technique.name)?;
                stats.technique_binds += 1;
                cache.variant_bound = false;
                if shaders_with_globals.insert(material.shader_kind()) {
                    device.set_shader_constants(UpdateFrequency::Global, &Self::resolve_globals(material, &globals)?)?;
                }
                device.set_shader_constants(UpdateFrequency::PerMaterial, &material.material_constants()?)?;
                cache.material = Some(material_id);
            } else if cache.variant_bound && !instanced {
                // Back from an instanced variant of the same material.
                device.bind_technique(material.shader_kind(), &technique.name)?;
                stats.variant_binds += 1;
                cache.variant_bound = false;
            }

            if instanced {
                Self::draw_instanced(item, material, technique, device, &mut stats, &mut cache)?;
            } else {
                cache.apply(technique.render_state, device, &mut stats);
                for renderable in &item.renderables {
                    Self::draw_single(renderable, technique, device, &mut stats)?;
                }
            }
        }

        log::trace!(
            "Frame drawn: {} binds, {} draws, {} instanced, {} skipped",
            stats.technique_binds,
            stats.draw_calls,
            stats.instanced_draws,
            stats.skipped
        );
        Ok(stats)
    }

    fn should_instance(&self, item: &QueueItem<'_>) -> bool {
        self.config.enable_instancing && item.instanced && item.renderables.len() >= self.config.min_instance_batch
    }

    fn draw_single(
        renderable: &Renderable,
        technique: &ShaderTechnique,
        device: &mut dyn GraphicsDevice,
        stats: &mut FrameStats,
    ) -> RenderResult<()> {
        let constants = [(names::WORLD.to_string(), ParameterValue::Mat4(renderable.instance_data()))];
        device.set_shader_constants(UpdateFrequency::PerInstance, &constants)?;
        for pass in &technique.passes {
            device.apply_pass(pass)?;
            device.draw_indexed(&renderable.geometry)?;
            stats.draw_calls += 1;
        }
        Ok(())
    }

    fn draw_instanced(
        item: &QueueItem<'_>,
        material: &Material,
        technique: &ShaderTechnique,
        device: &mut dyn GraphicsDevice,
        stats: &mut FrameStats,
        cache: &mut StateCache,
    ) -> RenderResult<()> {
        let variant_name = technique.instanced_variant.as_deref().ok_or_else(|| RenderError::MissingTechnique {
            material: material.name().to_string(),
            technique: format!("{} (instanced)", technique.name),
        })?;
        let variant = material.shader().technique(variant_name).ok_or_else(|| RenderError::MissingTechnique {
            material: material.name().to_string(),
            technique: variant_name.to_string(),
        })?;

        if !cache.variant_bound {
            device.bind_technique(material.shader_kind(), &variant.name)?;
            stats.variant_binds += 1;
            cache.variant_bound = true;
        }
        cache.apply(variant.render_state, device, stats);

        let instances: Vec<[f32; 16]> = item.renderables.iter().map(|r| r.instance_data()).collect();
        let geometry = item.renderables[0].geometry;
        for pass in &variant.passes {
            device.apply_pass(pass)?;
            device.draw_instanced(&geometry, cast_slice(&instances), instances.len() as u32)?;
            stats.instanced_draws += 1;
        }
        stats.instances_drawn += instances.len();
        Ok(())
    }
}

impl RenderingTechnique for ForwardRenderingTechnique {
    fn name(&self) -> &str {
        "Forward"
    }

    fn render(
        &mut self,
        queue: &mut RenderQueue,
        camera: &Camera,
        materials: &MaterialLibrary,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<FrameStats> {
        let result = self.draw_frame(queue, camera, materials, device);
        device.unbind_render_target();
        queue.reset();

        match &result {
            Ok(stats) => self.last_stats = *stats,
            Err(err) => log::warn!("Frame aborted: {}", err),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::GeometryBinding;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::device::{DeviceCommand, RecordingDevice};
    use crate::render::render_queue::RenderQueueKey;
    use crate::render::shader::{ParameterKind, Shader, ShaderKind, ShaderParameter};

    fn camera() -> Camera {
        Camera::perspective("main", Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0)
    }

    fn submit(queue: &mut RenderQueue, materials: &MaterialLibrary, material: MaterialId, geometry: u32, depth: f32) {
        let resolved = materials.get(material).unwrap();
        let key = RenderQueueKey::new(resolved.sort_id(), resolved.is_transparent(), depth)
            .with_instancing(resolved.supports_instancing());
        let renderable = Renderable::new(GeometryBinding::new(geometry, 24, 36), Some(material), Mat4::identity());
        queue.add_renderable(key, renderable);
    }

    #[test]
    fn test_technique_bound_once_per_material_run() {
        let mut materials = MaterialLibrary::new();
        let a = materials.add(Material::new("a", ShaderKind::Unlit)).unwrap();
        let b = materials.add(Material::new("b", ShaderKind::Lit)).unwrap();
        let mut queue = RenderQueue::new();
        queue.set_instancing(false);
        submit(&mut queue, &materials, a, 1, 4.0);
        submit(&mut queue, &materials, b, 2, 1.0);
        submit(&mut queue, &materials, a, 3, 2.0);
        submit(&mut queue, &materials, b, 4, 3.0);

        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::new();
        let stats = technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();

        assert_eq!(stats.technique_binds, 2);
        assert_eq!(device.technique_binds(), 2);
        assert_eq!(stats.draw_calls, 4);
        assert_eq!(technique.last_stats(), stats);
    }

    #[test]
    fn test_globals_pushed_once_per_shader() {
        let mut materials = MaterialLibrary::new();
        let a = materials.add(Material::new("a", ShaderKind::Unlit)).unwrap();
        let b = materials.add(Material::new("b", ShaderKind::Unlit)).unwrap();
        let c = materials.add(Material::new("c", ShaderKind::Lit)).unwrap();
        let mut queue = RenderQueue::new();
        for (i, material) in [a, b, c].into_iter().enumerate() {
            submit(&mut queue, &materials, material, i as u32, 1.0);
        }

        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::new();
        technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();

        assert_eq!(device.constant_uploads(UpdateFrequency::Global), 2);
        assert_eq!(device.constant_uploads(UpdateFrequency::PerMaterial), 3);
        assert_eq!(device.constant_uploads(UpdateFrequency::PerInstance), 3);
    }

    #[test]
    fn test_globals_pushed_again_each_frame() {
        let mut materials = MaterialLibrary::new();
        let a = materials.add(Material::new("a", ShaderKind::Unlit)).unwrap();
        let mut queue = RenderQueue::new();
        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::new();

        for frame in 0..3 {
            submit(&mut queue, &materials, a, frame, 1.0);
            technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();
        }
        assert_eq!(device.constant_uploads(UpdateFrequency::Global), 3);
    }

    #[test]
    fn test_sub_states_switch_independently() {
        let mut materials = MaterialLibrary::new();
        let solid = materials.add(Material::new("solid", ShaderKind::Unlit)).unwrap();
        let glass = materials
            .add(Material::new("glass", ShaderKind::Unlit).with_technique("Transparent").unwrap())
            .unwrap();
        let mut queue = RenderQueue::new();
        submit(&mut queue, &materials, solid, 1, 1.0);
        submit(&mut queue, &materials, glass, 2, 1.0);

        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::new();
        let stats = technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();

        // Both techniques cull counter-clockwise faces.
        assert_eq!(stats.rasterizer_switches, 1);
        assert_eq!(stats.depth_stencil_switches, 2);
        assert_eq!(stats.blend_switches, 2);
    }

    #[test]
    fn test_multi_pass_technique_draws_each_pass() {
        let mut materials = MaterialLibrary::new();
        let glass = materials
            .add(Material::new("glass", ShaderKind::Lit).with_technique("Transparent").unwrap())
            .unwrap();
        let mut queue = RenderQueue::new();
        submit(&mut queue, &materials, glass, 1, 1.0);

        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::new();
        let stats = technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();

        assert_eq!(stats.draw_calls, 2);
        let passes: Vec<&DeviceCommand> = device
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::ApplyPass(_)))
            .collect();
        assert_eq!(
            passes,
            [
                &DeviceCommand::ApplyPass("BackFaces".to_string()),
                &DeviceCommand::ApplyPass("FrontFaces".to_string())
            ]
        );
    }

    #[test]
    fn test_instance_batch_drawn_in_one_call() {
        let mut materials = MaterialLibrary::new();
        let rock = materials.add(Material::new("rock", ShaderKind::Unlit)).unwrap();
        let mut queue = RenderQueue::new();
        for depth in [1.0, 2.0, 3.0] {
            submit(&mut queue, &materials, rock, 7, depth);
        }

        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::new();
        let stats = technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();

        assert_eq!(stats.instanced_draws, 1);
        assert_eq!(stats.instances_drawn, 3);
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.technique_binds, 1);
        assert_eq!(stats.variant_binds, 1);
        assert!(device.commands().contains(&DeviceCommand::DrawInstanced {
            geometry: GeometryBinding::new(7, 24, 36),
            instance_count: 3,
            data_len: 3 * 16 * std::mem::size_of::<f32>(),
        }));
    }

    #[test]
    fn test_small_batch_drawn_directly() {
        let mut materials = MaterialLibrary::new();
        let rock = materials.add(Material::new("rock", ShaderKind::Unlit)).unwrap();
        let mut queue = RenderQueue::new();
        submit(&mut queue, &materials, rock, 7, 1.0);
        submit(&mut queue, &materials, rock, 7, 2.0);

        let config = RenderConfig::default().with_instancing(true, 3);
        let mut technique = ForwardRenderingTechnique::new(config);
        let mut device = RecordingDevice::new();
        let stats = technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();

        assert_eq!(stats.instanced_draws, 0);
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.variant_binds, 0);
    }

    #[test]
    fn test_renderable_without_material_skipped() {
        let materials = MaterialLibrary::new();
        let mut queue = RenderQueue::new();
        queue.add_renderable(
            RenderQueueKey::default(),
            Renderable::new(GeometryBinding::new(1, 3, 3), None, Mat4::identity()),
        );

        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::new();
        let stats = technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(device.draw_calls(), 0);
        assert_eq!(device.technique_binds(), 0);
    }

    #[test]
    fn test_missing_global_fails_before_drawing() {
        let shader = Shader::new(ShaderKind::Unlit)
            .with_technique(ShaderTechnique::new(Shader::DEFAULT_TECHNIQUE, RenderState::opaque()))
            .with_parameter(ShaderParameter::new("time", UpdateFrequency::Global, ParameterKind::Float));
        let mut materials = MaterialLibrary::new();
        let clock = materials.add(Material::with_shader("clock", shader)).unwrap();
        let mut queue = RenderQueue::new();
        submit(&mut queue, &materials, clock, 1, 1.0);

        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::new();
        let result = technique.render(&mut queue, &camera(), &materials, &mut device);

        assert!(matches!(
            result,
            Err(RenderError::MissingShaderParameter { ref parameter, .. }) if parameter == "time"
        ));
        assert!(queue.is_empty());
        assert_eq!(device.draw_calls(), 0);
        assert_eq!(device.commands().last(), Some(&DeviceCommand::UnbindRenderTarget));

        technique.set_global("time", ParameterValue::Float(0.5));
        submit(&mut queue, &materials, clock, 1, 1.0);
        device.clear_commands();
        assert!(technique.render(&mut queue, &camera(), &materials, &mut device).is_ok());
        assert_eq!(device.draw_calls(), 1);
    }

    #[test]
    fn test_device_failure_still_resets_queue() {
        let mut materials = MaterialLibrary::new();
        let rock = materials.add(Material::new("rock", ShaderKind::Unlit)).unwrap();
        let mut queue = RenderQueue::new();
        submit(&mut queue, &materials, rock, 1, 1.0);

        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default());
        let mut device = RecordingDevice::failing_draws();
        let result = technique.render(&mut queue, &camera(), &materials, &mut device);

        assert!(matches!(result, Err(RenderError::Device(_))));
        assert!(queue.is_empty());
        assert_eq!(device.commands().last(), Some(&DeviceCommand::UnbindRenderTarget));
        assert_eq!(technique.last_stats(), FrameStats::default());
    }

    #[test]
    fn test_clear_skipped_without_color() {
        let materials = MaterialLibrary::new();
        let mut queue = RenderQueue::new();
        let mut technique = ForwardRenderingTechnique::new(RenderConfig::default().with_clear_color(None));
        let mut device = RecordingDevice::new();
        technique.render(&mut queue, &camera(), &materials, &mut device).unwrap();

        assert!(!device.commands().iter().any(|c| matches!(c, DeviceCommand::Clear(_))));
        assert_eq!(device.commands().len(), 2);
    }
}

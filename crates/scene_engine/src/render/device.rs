//! Graphics device abstraction
//!
//! [`GraphicsDevice`] is the boundary the rendering technique drives: it
//! binds targets, switches fixed-function state and shader techniques,
//! uploads constants and issues draws. [`RecordingDevice`] implements it
//! without a GPU by recording every command, which makes frame output
//! inspectable in tests and tools.

use crate::assets::GeometryBinding;
use crate::core::config::Viewport;
use crate::render::shader::{
    BlendState, DepthStencilState, ParameterValue, RasterizerState, ShaderKind, UpdateFrequency,
};
use crate::render::{RenderError, RenderResult};

/// Device operations used by rendering techniques
pub trait GraphicsDevice {
    /// Bind the render target and viewport for the frame
    fn set_render_target(&mut self, viewport: &Viewport) -> RenderResult<()>;

    /// Clear the bound target
    fn clear(&mut self, color: [f32; 4]) -> RenderResult<()>;

    /// Set the rasterizer state
    fn set_rasterizer_state(&mut self, state: RasterizerState);

    /// Set the depth/stencil state
    fn set_depth_stencil_state(&mut self, state: DepthStencilState);

    /// Set the blend state
    fn set_blend_state(&mut self, state: BlendState);

    /// Make a shader technique current
    fn bind_technique(&mut self, shader: ShaderKind, technique: &str) -> RenderResult<()>;

    /// Upload shader constants of one update frequency
    fn set_shader_constants(
        &mut self,
        frequency: UpdateFrequency,
        constants: &[(String, ParameterValue)],
    ) -> RenderResult<()>;

    /// Apply one pass of the bound technique
    fn apply_pass(&mut self, pass: &str) -> RenderResult<()>;

    /// Draw geometry once
    fn draw_indexed(&mut self, geometry: &GeometryBinding) -> RenderResult<()>;

    /// Draw geometry `instance_count` times with per-instance data
    fn draw_instanced(
        &mut self,
        geometry: &GeometryBinding,
        instance_data: &[u8],
        instance_count: u32,
    ) -> RenderResult<()>;

    /// Release the render target at the end of the frame
    fn unbind_render_target(&mut self);
}

/// Command captured by a [`RecordingDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Render target bound
    SetRenderTarget(Viewport),
    /// Target cleared
    Clear([f32; 4]),
    /// Rasterizer state changed
    SetRasterizerState(RasterizerState),
    /// Depth/stencil state changed
    SetDepthStencilState(DepthStencilState),
    /// Blend state changed
    SetBlendState(BlendState),
    /// Technique bound
    BindTechnique {
        /// Shader family
        shader: ShaderKind,
        /// Technique name
        technique: String,
    },
    /// Constants uploaded
    SetConstants {
        /// Update frequency of the block
        frequency: UpdateFrequency,
        /// Constant names in upload order
        names: Vec<String>,
    },
    /// Pass applied
    ApplyPass(String),
    /// Direct draw
    DrawIndexed(GeometryBinding),
    /// Instanced draw
    DrawInstanced {
        /// Geometry drawn
        geometry: GeometryBinding,
        /// Number of instances
        instance_count: u32,
        /// Size of the per-instance data in bytes
        data_len: usize,
    },
    /// Render target released
    UnbindRenderTarget,
}

/// Device that records commands instead of talking to a GPU
#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<DeviceCommand>,
    fail_draws: bool,
}

impl RecordingDevice {
    /// Create a new recording device
    pub fn new() -> Self {
        Self::default()
    }

    /// Device whose draw calls fail, for exercising error paths
    pub fn failing_draws() -> Self {
        Self {
            commands: Vec::new(),
            fail_draws: true,
        }
    }

    /// Every command recorded so far
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Forget recorded commands
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of technique binds recorded
    pub fn technique_binds(&self) -> usize {
        self.count(|c| matches!(c, DeviceCommand::BindTechnique { .. }))
    }

    /// Number of direct draws recorded
    pub fn draw_calls(&self) -> usize {
        self.count(|c| matches!(c, DeviceCommand::DrawIndexed(_)))
    }

    /// Number of instanced draws recorded
    pub fn instanced_draws(&self) -> usize {
        self.count(|c| matches!(c, DeviceCommand::DrawInstanced { .. }))
    }

    /// Number of constant uploads of one frequency
    pub fn constant_uploads(&self, frequency: UpdateFrequency) -> usize {
        self.count(|c| matches!(c, DeviceCommand::SetConstants { frequency: f, .. } if *f == frequency))
    }

    fn count(&self, predicate: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn set_render_target(&mut self, viewport: &Viewport) -> RenderResult<()> {
        log::trace!("RecordingDevice: render target {}x{}", viewport.width, viewport.height);
        self.commands.push(DeviceCommand::SetRenderTarget(*viewport));
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) -> RenderResult<()> {
        self.commands.push(DeviceCommand::Clear(color));
        Ok(())
    }

    fn set_rasterizer_state(&mut self, state: RasterizerState) {
        self.commands.push(DeviceCommand::SetRasterizerState(state));
    }

    fn set_depth_stencil_state(&mut self, state: DepthStencilState) {
        self.commands.push(DeviceCommand::SetDepthStencilState(state));
    }

    fn set_blend_state(&mut self, state: BlendState) {
        self.commands.push(DeviceCommand::SetBlendState(state));
    }

    fn bind_technique(&mut self, shader: ShaderKind, technique: &str) -> RenderResult<()> {
        log::trace!("RecordingDevice: bind {:?}/{}", shader, technique);
        self.commands.push(DeviceCommand::BindTechnique {
            shader,
            technique: technique.to_string(),
        });
        Ok(())
    }

    fn set_shader_constants(
        &mut self,
        frequency: UpdateFrequency,
        constants: &[(String, ParameterValue)],
    ) -> RenderResult<()> {
        self.commands.push(DeviceCommand::SetConstants {
            frequency,
            names: constants.iter().map(|(name, _)| name.clone()).collect(),
        });
        Ok(())
    }

    fn apply_pass(&mut self, pass: &str) -> RenderResult<()> {
        self.commands.push(DeviceCommand::ApplyPass(pass.to_string()));
        Ok(())
    }

    fn draw_indexed(&mut self, geometry: &GeometryBinding) -> RenderResult<()> {
        if self.fail_draws {
            return Err(RenderError::Device(format!("draw of geometry {} rejected", geometry.id)));
        }
        self.commands.push(DeviceCommand::DrawIndexed(*geometry));
        Ok(())
    }

    fn draw_instanced(
        &mut self,
        geometry: &GeometryBinding,
        instance_data: &[u8],
        instance_count: u32,
    ) -> RenderResult<()> {
        if self.fail_draws {
            return Err(RenderError::Device(format!("instanced draw of geometry {} rejected", geometry.id)));
        }
        self.commands.push(DeviceCommand::DrawInstanced {
            geometry: *geometry,
            instance_count,
            data_len: instance_data.len(),
        });
        Ok(())
    }

    fn unbind_render_target(&mut self) {
        self.commands.push(DeviceCommand::UnbindRenderTarget);
    }
}

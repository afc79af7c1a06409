//! # Rendering System
//!
//! Engine-level rendering abstractions between the scene graph and a
//! graphics device.
//!
//! ## Architecture
//!
//! - **Shader / Material**: technique, pass and constant descriptions
//! - **RenderQueue**: per-frame, sortable collection of renderables
//! - **RenderingTechnique**: turns a sorted queue into device commands
//! - **GraphicsDevice**: the device boundary, with a recording implementation

pub mod device;
pub mod material;
pub mod render_queue;
pub mod renderable;
pub mod rendering_technique;
pub mod shader;

pub use device::{DeviceCommand, GraphicsDevice, RecordingDevice};
pub use material::Material;
pub use render_queue::{QueueItem, RenderQueue, RenderQueueGroupId, RenderQueueKey};
pub use renderable::Renderable;
pub use rendering_technique::{ForwardRenderingTechnique, FrameStats, RenderingTechnique};
pub use shader::{
    BlendState, DepthStencilState, ParameterKind, ParameterValue, RasterizerState, RenderState, Shader,
    ShaderKind, ShaderParameter, ShaderRegistry, ShaderTechnique, UpdateFrequency,
};

use crate::foundation::collections::MaterialId;
use crate::scene::SceneError;

/// Errors produced while preparing or drawing a frame
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A material refers to a technique its shader does not have
    #[error("Material '{material}' has no technique '{technique}'")]
    MissingTechnique {
        /// Material name
        material: String,
        /// Requested technique
        technique: String,
    },

    /// A shader constant has no value from any source
    #[error("Shader {shader:?} parameter '{parameter}' is not provided")]
    MissingShaderParameter {
        /// Shader family
        shader: ShaderKind,
        /// Constant name
        parameter: String,
    },

    /// A constant was given a value of the wrong type
    #[error("Parameter '{parameter}' expects {expected:?}, got {actual:?}")]
    ParameterKindMismatch {
        /// Constant name
        parameter: String,
        /// Declared type
        expected: ParameterKind,
        /// Supplied type
        actual: ParameterKind,
    },

    /// A queued renderable refers to an unregistered material
    #[error("Material not found: {0:?}")]
    MaterialNotFound(MaterialId),

    /// The graphics device rejected a command
    #[error("Device error: {0}")]
    Device(String),

    /// Scene update or culling failed
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

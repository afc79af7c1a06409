//! # Core Engine Module
//!
//! Shared abstractions used by every other subsystem of the engine.
//!
//! ## Organization
//!
//! - **Config**: Unified configuration for the scene graph and render pipeline
//! - **Foundation**: Low-level utilities (math, collections, logging)

pub mod config;

// Re-export foundation modules for convenience
pub use crate::foundation;

// Re-export commonly used config types
pub use config::{
    EngineConfig,
    SceneConfig,
    RenderConfig,
    Viewport,
    Config,
    ConfigError,
};

//! # Engine Configuration
//!
//! Configuration structures for the scene graph and the render pipeline.
//! Everything here is plain serializable data with builder-style setters,
//! loaded through the [`Config`] trait from TOML or RON files.
//!
//! ## Configuration Categories
//!
//! - **Scene Config**: culling behaviour and debug visualisation
//! - **Render Config**: clear colour, viewport, queue sizing and instancing
//! - **Engine Config**: log level plus the two sections above

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// Rectangle of the render target that a technique draws into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge in pixels
    pub x: u32,
    /// Top edge in pixels
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Viewport {
    /// Create a viewport anchored at the origin
    pub fn new(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// # Scene Configuration
///
/// Controls how the scene graph culls and what debug geometry it emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Submit a wireframe bounding box for every entity
    pub show_bounding_boxes: bool,
    /// Skip whole subtrees whose aggregated bounds fall outside the frustum
    pub cull_subtrees: bool,
    /// Deepest node chain accepted when creating children
    pub max_tree_depth: usize,
}

impl SceneConfig {
    /// Create a scene configuration with defaults
    pub fn new() -> Self {
        Self {
            show_bounding_boxes: false,
            cull_subtrees: true,
            max_tree_depth: 256,
        }
    }

    /// Enable or disable debug bounding boxes
    pub fn with_bounding_boxes(mut self, enabled: bool) -> Self {
        self.show_bounding_boxes = enabled;
        self
    }

    /// Enable or disable subtree culling
    pub fn with_subtree_culling(mut self, enabled: bool) -> Self {
        self.cull_subtrees = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tree_depth == 0 {
            return Err(ConfigError::Invalid("max_tree_depth must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Render Configuration
///
/// Parameters of the render queue and rendering technique.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Colour used to clear the target at frame start, `None` to keep contents
    pub clear_color: Option<[f32; 4]>,
    /// Merge instanceable renderables into instance batches
    pub enable_instancing: bool,
    /// Smallest batch drawn with an instanced call; smaller batches draw directly
    pub min_instance_batch: usize,
    /// Number of queue elements pre-allocated in the pool
    pub queue_capacity: usize,
    /// Viewport the technique binds before drawing
    pub viewport: Viewport,
}

impl RenderConfig {
    /// Create a render configuration with defaults
    pub fn new() -> Self {
        Self {
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            enable_instancing: true,
            min_instance_batch: 2,
            queue_capacity: 256,
            viewport: Viewport::default(),
        }
    }

    /// Set the clear colour
    pub fn with_clear_color(mut self, color: Option<[f32; 4]>) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the viewport
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Configure instancing
    pub fn with_instancing(mut self, enabled: bool, min_batch: usize) -> Self {
        self.enable_instancing = enabled;
        self.min_instance_batch = min_batch;
        self
    }

    /// Set the initial queue pool size
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Invalid("viewport must have a non-zero size".to_string()));
        }
        if self.enable_instancing && self.min_instance_batch < 2 {
            return Err(ConfigError::Invalid(
                "min_instance_batch must be at least 2 when instancing is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Engine Configuration
///
/// Top-level configuration that applications load from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine
    pub log_level: String,
    /// Scene graph configuration
    pub scene: SceneConfig,
    /// Render pipeline configuration
    pub render: RenderConfig,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            scene: SceneConfig::default(),
            render: RenderConfig::default(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.is_empty() {
            return Err(ConfigError::Invalid("log_level cannot be empty".to_string()));
        }
        self.scene.validate()?;
        self.render.validate()?;
        Ok(())
    }

    /// Install the logger using [`EngineConfig::log_level`]
    pub fn init_logging(&self) {
        crate::foundation::logging::init_with_level(&self.log_level);
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for EngineConfig {}

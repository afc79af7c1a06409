//! Renderable units
//!
//! A [`Renderable`] is the smallest thing the render queue orders: one
//! piece of geometry, the material it is drawn with and its world matrix.

use crate::assets::GeometryBinding;
use crate::foundation::collections::{MaterialId, MovableId};
use crate::foundation::math::{mat4_to_cols, Mat4};

/// One draw submitted to the render queue
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    /// Movable that produced the draw, for diagnostics
    pub source: Option<MovableId>,
    /// Geometry to draw
    pub geometry: GeometryBinding,
    /// Material to draw with; draws without one are skipped
    pub material: Option<MaterialId>,
    /// Object-to-world matrix
    pub world_transform: Mat4,
}

impl Renderable {
    /// Create a renderable with no source movable
    pub fn new(geometry: GeometryBinding, material: Option<MaterialId>, world_transform: Mat4) -> Self {
        Self {
            source: None,
            geometry,
            material,
            world_transform,
        }
    }

    /// Record the movable that produced this renderable
    pub fn with_source(mut self, source: MovableId) -> Self {
        self.source = Some(source);
        self
    }

    /// World matrix as uploaded per instance
    pub fn instance_data(&self) -> [f32; 16] {
        mat4_to_cols(&self.world_transform)
    }
}

//! Scene node data
//!
//! The scene-specific half of a node: the movables attached to it and the
//! world bounds of its whole subtree. Stored beside the [`super::NodeTree`]
//! and keyed by the same node keys.

use crate::foundation::collections::MovableId;
use crate::scene::bounds::Aabb;

/// Movables and cached bounds of one scene node
#[derive(Debug, Clone, Default)]
pub struct SceneNodeData {
    attached: Vec<MovableId>,
    world_bounds: Option<Aabb>,
}

impl SceneNodeData {
    /// Movables attached to the node, in attach order
    pub fn attached(&self) -> &[MovableId] {
        &self.attached
    }

    /// Bounds of the attached movables and every descendant, as of the last update
    pub fn world_bounds(&self) -> Option<Aabb> {
        self.world_bounds
    }

    pub(crate) fn attach(&mut self, movable: MovableId) {
        if !self.attached.contains(&movable) {
            self.attached.push(movable);
        }
    }

    pub(crate) fn detach(&mut self, movable: MovableId) -> bool {
        let before = self.attached.len();
        self.attached.retain(|&m| m != movable);
        self.attached.len() != before
    }

    pub(crate) fn take_attached(&mut self) -> Vec<MovableId> {
        std::mem::take(&mut self.attached)
    }

    pub(crate) fn set_world_bounds(&mut self, bounds: Option<Aabb>) {
        self.world_bounds = bounds;
    }
}

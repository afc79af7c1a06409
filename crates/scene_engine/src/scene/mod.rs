//! # Scene Graph
//!
//! Hierarchical placement of renderable objects and per-frame visibility.
//!
//! ## Architecture
//!
//! - **NodeTree**: transform hierarchy with lazy, dirty-flag driven world
//!   transforms
//! - **SceneGraph**: scene nodes (tree nodes plus attached movables), the
//!   camera manager and the update, cull and render frame driver
//! - **Movable / Entity**: objects attached to scene nodes that push their
//!   renderable parts into the render queue
//! - **Camera / Frustum**: view parameters and culling volumes

pub mod bounds;
pub mod camera;
pub mod entity;
pub mod movable;
pub mod node;
pub mod node_tree;
pub mod scene_graph;
pub mod scene_node;

#[cfg(test)]
mod tests;

pub use bounds::{Aabb, Frustum, Plane};
pub use camera::{Camera, CameraManager};
pub use entity::{Entity, SubEntity, SubEntityMaterial};
pub use movable::{AxesGizmo, Movable, MovableContext, MovableObject};
pub use node::{GraphId, Node, NodeFlags, NodeId, TransformSpace};
pub use node_tree::NodeTree;
pub use scene_graph::SceneGraph;
pub use scene_node::SceneNodeData;

use thiserror::Error;

use crate::assets::AssetError;
use crate::foundation::collections::{MaterialId, MeshId};

/// Scene graph errors
#[derive(Debug, Error)]
pub enum SceneError {
    /// Another node of the graph already uses this name
    #[error("Cannot add '{name}' under '{parent}': name already used in the graph")]
    DuplicateName {
        /// Name of the intended parent node
        parent: String,
        /// Rejected node name
        name: String,
    },

    /// The handle refers to a destroyed node
    #[error("Node not found")]
    NodeNotFound,

    /// The handle was issued by another scene graph
    #[error("Node belongs to a different scene graph")]
    ForeignNode,

    /// The root node cannot be destroyed or re-parented
    #[error("The root node cannot be destroyed or moved")]
    RootNodeProtected,

    /// The node must be detached before it can be added elsewhere
    #[error("Node '{0}' already has a parent")]
    AlreadyHasParent(String),

    /// The node is not a child of the given parent
    #[error("Node '{child}' is not a child of '{parent}'")]
    NotAChild {
        /// Name of the supposed parent
        parent: String,
        /// Name of the node
        child: String,
    },

    /// The operation would make a node its own ancestor
    #[error("Attaching '{0}' there would create a cycle")]
    WouldCreateCycle(String),

    /// The hierarchy would become deeper than allowed
    #[error("Maximum tree depth of {0} exceeded")]
    MaxDepthExceeded(usize),

    /// The movable handle is stale
    #[error("Movable object not found")]
    MovableNotFound,

    /// The movable is not attached to the given node
    #[error("Movable '{0}' is not attached to this node")]
    MovableNotAttached(String),

    /// A camera with this name is already registered
    #[error("Camera already registered: {0}")]
    DuplicateCamera(String),

    /// No camera with this name is registered
    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    /// Culling needs a current camera
    #[error("No active camera selected")]
    NoActiveCamera,

    /// A material slot was cleared and has no fallback
    #[error("Material required: slot has no fallback material")]
    MaterialRequired,

    /// The material handle is not registered
    #[error("Material not found: {0:?}")]
    MaterialNotFound(MaterialId),

    /// The mesh handle is not registered
    #[error("Mesh not found: {0:?}")]
    MeshNotFound(MeshId),

    /// Sub-entity or material slot index out of range
    #[error("Index {index} out of range (len {len})")]
    SubEntityOutOfRange {
        /// Requested index
        index: usize,
        /// Number of available entries
        len: usize,
    },

    /// Asset registration failed
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

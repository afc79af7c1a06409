//! Specialized collection types
//!
//! Scene and asset storage is arena based: objects live in a [`SlotMap`]
//! and refer to each other through generational keys, which keeps
//! back-references non-owning and detects stale handles.

pub use slotmap::{SlotMap, SecondaryMap, Key};

slotmap::new_key_type! {
    /// Arena key of a node inside a [`crate::scene::NodeTree`]
    pub struct NodeKey;

    /// Handle of a movable object registered with a scene graph
    pub struct MovableId;

    /// Handle of a mesh registered in a [`crate::assets::MeshLibrary`]
    pub struct MeshId;

    /// Handle of a material registered in a [`crate::assets::MaterialLibrary`]
    pub struct MaterialId;
}

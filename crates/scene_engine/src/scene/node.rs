//! Transform node data
//!
//! A [`Node`] stores its local transform, the cached world ("derived")
//! transform and the dirty flags that say which parts of the cache are
//! stale. Nodes live in a [`super::NodeTree`] arena, which owns every node
//! and implements the propagation rules; a node only refers to its parent
//! and children through arena keys.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::foundation::collections::NodeKey;
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};

bitflags! {
    /// Dirty state of a node's cached world transform
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Derived position/orientation/scale must be recomputed from the parent
        const NEEDS_PARENT_UPDATE = 1 << 0;
        /// Every child must be updated on the next tree update
        const NEEDS_CHILD_UPDATE = 1 << 1;
        /// The cached 4x4 matrix is older than the derived components
        const NEEDS_TRANSFORM_REBUILD = 1 << 2;
        /// The parent already knows this node requested an update
        const PARENT_NOTIFIED = 1 << 3;
        /// Derived transform was recomputed since the owner last checked
        const TRANSFORM_CHANGED = 1 << 4;
    }
}

/// Frame of reference for relative transform operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformSpace {
    /// Relative to the node's own axes
    #[default]
    Local,
    /// Relative to the parent node's axes
    Parent,
    /// Relative to the world axes
    World,
}

/// Identifies the tree a node handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u32);

impl GraphId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Public handle of a node
///
/// Carries the id of the owning tree so that handles from another scene
/// graph are rejected instead of aliasing an unrelated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) graph: GraphId,
    pub(crate) key: NodeKey,
}

impl NodeId {
    /// Tree this handle belongs to
    pub fn graph(&self) -> GraphId {
        self.graph
    }
}

/// A node of the transform hierarchy
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: BTreeMap<String, NodeKey>,

    pub(crate) local: Transform,
    pub(crate) derived: Transform,
    pub(crate) cached_matrix: Mat4,

    pub(crate) flags: NodeFlags,
    pub(crate) children_to_update: Vec<NodeKey>,
}

impl Node {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            parent: None,
            children: BTreeMap::new(),
            local: Transform::identity(),
            derived: Transform::identity(),
            cached_matrix: Mat4::identity(),
            flags: NodeFlags::NEEDS_PARENT_UPDATE
                | NodeFlags::NEEDS_CHILD_UPDATE
                | NodeFlags::NEEDS_TRANSFORM_REBUILD,
            children_to_update: Vec::new(),
        }
    }

    /// Node name, unique among its siblings
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position relative to the parent
    pub fn position(&self) -> Vec3 {
        self.local.position
    }

    /// Orientation relative to the parent
    pub fn orientation(&self) -> Quat {
        self.local.rotation
    }

    /// Scale relative to the parent
    pub fn scale(&self) -> Vec3 {
        self.local.scale
    }

    /// Local transform as a whole
    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// Current dirty flags
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Number of direct children
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether the node is attached to a parent
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }
}

//! Transform hierarchy
//!
//! [`NodeTree`] owns every [`Node`] of one scene graph in an arena and
//! implements lazy world-transform propagation:
//!
//! - Mutators only touch the local transform and raise dirty flags. The
//!   first mutation of a batch notifies the parent chain once
//!   (`PARENT_NOTIFIED`), later ones stop at the node itself.
//! - Reading a derived value recomputes from the highest dirty ancestor
//!   down to the node. A recomputed node flags its direct children, so a
//!   cache is valid exactly when no node on the path to the root is dirty.
//! - [`NodeTree::update`] walks the tree once per frame, either visiting
//!   every child of a fully dirty node or only the children that asked for
//!   an update.
//!
//! Node names are unique across the whole tree, detached subtrees included.

use std::collections::HashMap;

use crate::foundation::collections::{NodeKey, SlotMap};
use crate::foundation::math::{
    compose_rotation, is_near_zero, Mat4, Quat, Transform, Unit, Vec3,
};
use crate::scene::node::{GraphId, Node, NodeFlags, NodeId, TransformSpace};
use crate::scene::{SceneError, SceneResult};

/// Default limit on the depth of the hierarchy
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Arena of transform nodes rooted at a single node
#[derive(Debug)]
pub struct NodeTree {
    graph: GraphId,
    nodes: SlotMap<NodeKey, Node>,
    names: HashMap<String, NodeKey>,
    root: NodeKey,
    max_depth: usize,
}

impl NodeTree {
    /// Create a tree containing only a root node
    pub fn new(root_name: impl Into<String>) -> Self {
        Self::with_max_depth(root_name, DEFAULT_MAX_DEPTH)
    }

    /// Create a tree that rejects chains deeper than `max_depth`
    pub fn with_max_depth(root_name: impl Into<String>, max_depth: usize) -> Self {
        let root_name = root_name.into();
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(root_name.clone()));
        let mut names = HashMap::new();
        names.insert(root_name, root);
        Self {
            graph: GraphId::next(),
            nodes,
            names,
            root,
            max_depth: max_depth.max(1),
        }
    }

    /// Id of this tree
    pub fn graph_id(&self) -> GraphId {
        self.graph
    }

    /// Handle of the root node
    pub fn root(&self) -> NodeId {
        self.id(self.root)
    }

    /// Total number of live nodes, detached subtrees included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root cannot be removed
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` refers to a live node of this tree
    pub fn contains(&self, id: NodeId) -> bool {
        id.graph == self.graph && self.nodes.contains_key(id.key)
    }

    /// Borrow a node
    pub fn node(&self, id: NodeId) -> SceneResult<&Node> {
        let key = self.resolve(id)?;
        Ok(&self.nodes[key])
    }

    /// Parent of a node, `None` for the root and detached nodes
    pub fn parent(&self, id: NodeId) -> SceneResult<Option<NodeId>> {
        let key = self.resolve(id)?;
        Ok(self.nodes[key].parent.map(|p| self.id(p)))
    }

    /// Children of a node in name order
    pub fn children(&self, id: NodeId) -> SceneResult<Vec<NodeId>> {
        let key = self.resolve(id)?;
        Ok(self.nodes[key].children.values().map(|&c| self.id(c)).collect())
    }

    /// Find a direct child by name
    pub fn child_by_name(&self, parent: NodeId, name: &str) -> SceneResult<Option<NodeId>> {
        let key = self.resolve(parent)?;
        Ok(self.nodes[key].children.get(name).map(|&c| self.id(c)))
    }

    /// Find any node of the tree by name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).map(|&key| self.id(key))
    }

    /// Number of ancestors above a node
    pub fn depth(&self, id: NodeId) -> SceneResult<usize> {
        let key = self.resolve(id)?;
        Ok(self.depth_of(key))
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Create a named child with an identity local transform
    pub fn create_child(&mut self, parent: NodeId, name: impl Into<String>) -> SceneResult<NodeId> {
        self.create_child_with(parent, name, Vec3::zeros(), Quat::identity())
    }

    /// Create a named child with an initial position and orientation
    ///
    /// Fails with [`SceneError::DuplicateName`] if any node of the tree
    /// already uses that name; the tree is unchanged in that case.
    pub fn create_child_with(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        position: Vec3,
        orientation: Quat,
    ) -> SceneResult<NodeId> {
        let parent_key = self.resolve(parent)?;
        let name = name.into();
        self.check_can_adopt(parent_key, &name, None)?;
        if self.depth_of(parent_key) + 1 > self.max_depth {
            return Err(SceneError::MaxDepthExceeded(self.max_depth));
        }

        let mut node = Node::new(name.clone());
        node.local.position = position;
        node.local.rotation = orientation;
        let key = self.nodes.insert(node);
        self.names.insert(name.clone(), key);
        self.link(parent_key, key);

        log::trace!("Created node '{}' under '{}'", name, self.nodes[parent_key].name);
        Ok(self.id(key))
    }

    /// Attach a detached node (and its subtree) under `parent`
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        let parent_key = self.resolve(parent)?;
        let child_key = self.resolve(child)?;

        if child_key == self.root {
            return Err(SceneError::RootNodeProtected);
        }
        if self.nodes[child_key].parent.is_some() {
            return Err(SceneError::AlreadyHasParent(self.nodes[child_key].name.clone()));
        }
        if self.is_ancestor_or_self(child_key, parent_key) {
            return Err(SceneError::WouldCreateCycle(self.nodes[child_key].name.clone()));
        }
        let name = self.nodes[child_key].name.clone();
        self.check_can_adopt(parent_key, &name, Some(child_key))?;
        if self.depth_of(parent_key) + 1 + self.subtree_height(child_key) > self.max_depth {
            return Err(SceneError::MaxDepthExceeded(self.max_depth));
        }

        self.link(parent_key, child_key);
        Ok(())
    }

    /// Detach the child called `name` from `parent`
    ///
    /// The detached subtree stays alive in the arena and can be re-attached
    /// with [`NodeTree::add_child`]. Returns `Ok(None)` if there is no such
    /// child.
    pub fn remove_child(&mut self, parent: NodeId, name: &str) -> SceneResult<Option<NodeId>> {
        let parent_key = self.resolve(parent)?;
        let Some(&child_key) = self.nodes[parent_key].children.get(name) else {
            return Ok(None);
        };
        self.unlink(parent_key, child_key);
        Ok(Some(self.id(child_key)))
    }

    /// Detach `child` from `parent`, failing if it is not a child of `parent`
    pub fn detach_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        let parent_key = self.resolve(parent)?;
        let child_key = self.resolve(child)?;
        if self.nodes[child_key].parent != Some(parent_key) {
            return Err(SceneError::NotAChild {
                parent: self.nodes[parent_key].name.clone(),
                child: self.nodes[child_key].name.clone(),
            });
        }
        self.unlink(parent_key, child_key);
        Ok(())
    }

    /// Move a node under a new parent, keeping its local transform
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) -> SceneResult<()> {
        let child_key = self.resolve(child)?;
        let parent_key = self.resolve(new_parent)?;
        if child_key == self.root {
            return Err(SceneError::RootNodeProtected);
        }
        if self.is_ancestor_or_self(child_key, parent_key) {
            return Err(SceneError::WouldCreateCycle(self.nodes[child_key].name.clone()));
        }
        let name = self.nodes[child_key].name.clone();
        let old_parent = self.nodes[child_key].parent;
        if old_parent == Some(parent_key) {
            return Ok(());
        }
        self.check_can_adopt(parent_key, &name, Some(child_key))?;
        if self.depth_of(parent_key) + 1 + self.subtree_height(child_key) > self.max_depth {
            return Err(SceneError::MaxDepthExceeded(self.max_depth));
        }

        if let Some(old) = old_parent {
            self.unlink(old, child_key);
        }
        self.link(parent_key, child_key);
        Ok(())
    }

    /// Destroy a node and its whole subtree
    ///
    /// Returns the destroyed keys, deepest nodes last. The root is protected
    /// and the tree is left untouched when it is targeted.
    pub fn destroy(&mut self, id: NodeId) -> SceneResult<Vec<NodeKey>> {
        let key = self.resolve(id)?;
        if key == self.root {
            return Err(SceneError::RootNodeProtected);
        }
        if let Some(parent) = self.nodes[key].parent {
            self.unlink(parent, key);
        }

        let mut destroyed = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                self.names.remove(&node.name);
                stack.extend(node.children.values().copied());
                destroyed.push(current);
            }
        }
        log::debug!("Destroyed subtree of {} node(s)", destroyed.len());
        Ok(destroyed)
    }

    // ------------------------------------------------------------------
    // Local transform mutation
    // ------------------------------------------------------------------

    /// Set the position relative to the parent
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> SceneResult<()> {
        let key = self.resolve(id)?;
        self.nodes[key].local.position = position;
        self.need_update(key, false);
        Ok(())
    }

    /// Set the orientation relative to the parent
    pub fn set_orientation(&mut self, id: NodeId, orientation: Quat) -> SceneResult<()> {
        let key = self.resolve(id)?;
        self.nodes[key].local.rotation = Quat::new_normalize(orientation.into_inner());
        self.need_update(key, false);
        Ok(())
    }

    /// Set the scale relative to the parent
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> SceneResult<()> {
        let key = self.resolve(id)?;
        self.nodes[key].local.scale = scale;
        self.need_update(key, false);
        Ok(())
    }

    /// Reset the orientation to identity
    pub fn reset_orientation(&mut self, id: NodeId) -> SceneResult<()> {
        self.set_orientation(id, Quat::identity())
    }

    /// Multiply the current scale component-wise
    pub fn scale_by(&mut self, id: NodeId, factor: Vec3) -> SceneResult<()> {
        let key = self.resolve(id)?;
        let scale = self.nodes[key].local.scale.component_mul(&factor);
        self.nodes[key].local.scale = scale;
        self.need_update(key, false);
        Ok(())
    }

    /// Move the node by `delta` expressed in `space`
    ///
    /// - `Local`: along the node's own axes
    /// - `Parent` and `World`: the offset is brought into the parent's frame
    ///   by the inverse of the parent's world orientation and divided by the
    ///   parent's world scale, so the node moves by exactly `delta` in world
    ///   units. Without a parent the offset is applied as is.
    pub fn translate(&mut self, id: NodeId, delta: Vec3, space: TransformSpace) -> SceneResult<()> {
        let key = self.resolve(id)?;
        let offset = match space {
            TransformSpace::Local => self.nodes[key].local.rotation * delta,
            TransformSpace::Parent | TransformSpace::World => match self.nodes[key].parent {
                Some(parent) => {
                    let parent_world = self.derived(parent);
                    (parent_world.rotation.inverse() * delta).component_div(&parent_world.scale)
                }
                None => delta,
            },
        };
        self.nodes[key].local.position += offset;
        self.need_update(key, false);
        Ok(())
    }

    /// Rotate by `angle` radians about `axis` expressed in `space`
    ///
    /// A near-zero axis leaves the node unchanged.
    pub fn rotate(&mut self, id: NodeId, axis: Vec3, angle: f32, space: TransformSpace) -> SceneResult<()> {
        if is_near_zero(&axis) {
            log::warn!("Ignoring rotation about a zero-length axis");
            self.resolve(id)?;
            return Ok(());
        }
        let rotation = Quat::from_axis_angle(&Unit::new_normalize(axis), angle);
        self.rotate_quat(id, rotation, space)
    }

    /// Apply a rotation expressed in `space`
    pub fn rotate_quat(&mut self, id: NodeId, rotation: Quat, space: TransformSpace) -> SceneResult<()> {
        let key = self.resolve(id)?;
        let rotation = Quat::new_normalize(rotation.into_inner());
        let current = self.nodes[key].local.rotation;

        let updated = match space {
            TransformSpace::Local => compose_rotation(&current, &rotation),
            TransformSpace::Parent => compose_rotation(&rotation, &current),
            TransformSpace::World => {
                let world = self.derived(key).rotation;
                let to_local = compose_rotation(&current, &world.inverse());
                compose_rotation(&compose_rotation(&to_local, &rotation), &world)
            }
        };
        self.nodes[key].local.rotation = updated;
        self.need_update(key, false);
        Ok(())
    }

    /// Rotate about the Y axis
    pub fn yaw(&mut self, id: NodeId, angle: f32, space: TransformSpace) -> SceneResult<()> {
        self.rotate(id, Vec3::y(), angle, space)
    }

    /// Rotate about the X axis
    pub fn pitch(&mut self, id: NodeId, angle: f32, space: TransformSpace) -> SceneResult<()> {
        self.rotate(id, Vec3::x(), angle, space)
    }

    /// Rotate about the Z axis
    pub fn roll(&mut self, id: NodeId, angle: f32, space: TransformSpace) -> SceneResult<()> {
        self.rotate(id, Vec3::z(), angle, space)
    }

    /// Orient the node so that its -Z axis points at `target`
    ///
    /// `target` is interpreted in `space`; world Y is used as the up hint.
    pub fn look_at(&mut self, id: NodeId, target: Vec3, space: TransformSpace) -> SceneResult<()> {
        let key = self.resolve(id)?;
        let world_target = match space {
            TransformSpace::World => target,
            TransformSpace::Local => self.derived(key).combine(&Transform::from_position(target)).position,
            TransformSpace::Parent => match self.nodes[key].parent {
                Some(parent) => self.derived(parent).combine(&Transform::from_position(target)).position,
                None => target,
            },
        };

        let direction = world_target - self.derived(key).position;
        if is_near_zero(&direction) {
            log::warn!("Node '{}' asked to look at its own position", self.nodes[key].name);
            return Ok(());
        }
        let world_orientation = Quat::face_towards(&(-direction), &Vec3::y());
        let local = match self.nodes[key].parent {
            Some(parent) => compose_rotation(&self.derived(parent).rotation.inverse(), &world_orientation),
            None => world_orientation,
        };
        self.nodes[key].local.rotation = local;
        self.need_update(key, false);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Derived (world) transform
    // ------------------------------------------------------------------

    /// World position, recomputed lazily
    pub fn full_position(&mut self, id: NodeId) -> SceneResult<Vec3> {
        let key = self.resolve(id)?;
        Ok(self.derived(key).position)
    }

    /// World orientation, recomputed lazily
    pub fn full_orientation(&mut self, id: NodeId) -> SceneResult<Quat> {
        let key = self.resolve(id)?;
        Ok(self.derived(key).rotation)
    }

    /// World scale, recomputed lazily
    pub fn full_scale(&mut self, id: NodeId) -> SceneResult<Vec3> {
        let key = self.resolve(id)?;
        Ok(self.derived(key).scale)
    }

    /// World transform matrix
    ///
    /// The matrix is rebuilt only when the derived components changed since
    /// the last build.
    pub fn full_transform(&mut self, id: NodeId) -> SceneResult<Mat4> {
        let key = self.resolve(id)?;
        Ok(self.full_transform_by_key(key))
    }

    /// Map a world-space point into the node's local space
    pub fn inverse_transform_point(&mut self, id: NodeId, point: Vec3) -> SceneResult<Vec3> {
        let key = self.resolve(id)?;
        Ok(self.derived(key).inverse_transform_point(&point))
    }

    /// Update a node's world transform and, optionally, its descendants
    ///
    /// Dirty ancestors are brought up to date first so the node composes
    /// against a valid parent.
    pub fn update(&mut self, id: NodeId, update_children: bool, parent_changed: bool) -> SceneResult<()> {
        let key = self.resolve(id)?;
        if let Some(parent) = self.nodes[key].parent {
            self.ensure_derived(parent);
        }
        self.update_node(key, update_children, parent_changed);
        Ok(())
    }

    /// Update the whole tree from the root
    pub fn update_all(&mut self) {
        self.update_node(self.root, true, false);
    }

    // ------------------------------------------------------------------
    // Crate-internal key based access
    // ------------------------------------------------------------------

    pub(crate) fn id(&self, key: NodeKey) -> NodeId {
        NodeId { graph: self.graph, key }
    }

    pub(crate) fn resolve(&self, id: NodeId) -> SceneResult<NodeKey> {
        if id.graph != self.graph {
            return Err(SceneError::ForeignNode);
        }
        if !self.nodes.contains_key(id.key) {
            return Err(SceneError::NodeNotFound);
        }
        Ok(id.key)
    }

    pub(crate) fn root_key(&self) -> NodeKey {
        self.root
    }

    pub(crate) fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub(crate) fn child_keys(&self, key: NodeKey) -> Vec<NodeKey> {
        self.nodes
            .get(key)
            .map(|node| node.children.values().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn full_transform_by_key(&mut self, key: NodeKey) -> Mat4 {
        self.ensure_derived(key);
        let node = &mut self.nodes[key];
        if node.flags.contains(NodeFlags::NEEDS_TRANSFORM_REBUILD) {
            node.cached_matrix = node.derived.to_matrix();
            node.flags.remove(NodeFlags::NEEDS_TRANSFORM_REBUILD);
        }
        node.cached_matrix
    }

    pub(crate) fn derived(&mut self, key: NodeKey) -> Transform {
        self.ensure_derived(key);
        self.nodes[key].derived
    }

    /// Read and clear the "transform changed" marker of a node
    pub(crate) fn take_transform_changed(&mut self, key: NodeKey) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                let changed = node.flags.contains(NodeFlags::TRANSFORM_CHANGED);
                node.flags.remove(NodeFlags::TRANSFORM_CHANGED);
                changed
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Mark a node's derived state stale and notify the parent chain once
    fn need_update(&mut self, key: NodeKey, force_parent_update: bool) {
        let node = &mut self.nodes[key];
        node.flags.insert(
            NodeFlags::NEEDS_PARENT_UPDATE
                | NodeFlags::NEEDS_CHILD_UPDATE
                | NodeFlags::NEEDS_TRANSFORM_REBUILD,
        );
        node.children_to_update.clear();

        if let Some(parent) = node.parent {
            if !node.flags.contains(NodeFlags::PARENT_NOTIFIED) || force_parent_update {
                node.flags.insert(NodeFlags::PARENT_NOTIFIED);
                self.request_update(parent, key, force_parent_update);
            }
        }
    }

    /// Record that `child` needs an update on the next pass over `key`
    fn request_update(&mut self, key: NodeKey, child: NodeKey, force_parent_update: bool) {
        let node = &mut self.nodes[key];
        // A fully dirty node visits every child anyway.
        if node.flags.contains(NodeFlags::NEEDS_CHILD_UPDATE) {
            return;
        }
        if !node.children_to_update.contains(&child) {
            node.children_to_update.push(child);
        }

        if let Some(parent) = node.parent {
            if !node.flags.contains(NodeFlags::PARENT_NOTIFIED) || force_parent_update {
                node.flags.insert(NodeFlags::PARENT_NOTIFIED);
                self.request_update(parent, key, force_parent_update);
            }
        }
    }

    /// Withdraw a pending update request from `child`
    fn cancel_update(&mut self, key: NodeKey, child: NodeKey) {
        let node = &mut self.nodes[key];
        node.children_to_update.retain(|&c| c != child);

        if node.children_to_update.is_empty() && !node.flags.contains(NodeFlags::NEEDS_CHILD_UPDATE) {
            if let Some(parent) = node.parent {
                node.flags.remove(NodeFlags::PARENT_NOTIFIED);
                self.cancel_update(parent, key);
            }
        }
    }

    /// Recompute the derived transform from the parent's derived transform
    ///
    /// The parent must already be up to date.
    fn update_from_parent(&mut self, key: NodeKey) {
        let parent_world = self.nodes[key].parent.map(|p| self.nodes[p].derived);
        let node = &mut self.nodes[key];
        node.derived = match parent_world {
            Some(parent_world) => parent_world.combine(&node.local),
            None => node.local,
        };
        node.flags.remove(NodeFlags::NEEDS_PARENT_UPDATE);
        node.flags.insert(NodeFlags::NEEDS_TRANSFORM_REBUILD | NodeFlags::TRANSFORM_CHANGED);

        let children: Vec<NodeKey> = node.children.values().copied().collect();
        for child in children {
            self.nodes[child].flags.insert(NodeFlags::NEEDS_PARENT_UPDATE);
        }
    }

    /// Bring a node's derived transform up to date, ancestors first
    fn ensure_derived(&mut self, key: NodeKey) {
        if let Some(parent) = self.nodes[key].parent {
            self.ensure_derived(parent);
        }
        if self.nodes[key].flags.contains(NodeFlags::NEEDS_PARENT_UPDATE) {
            self.update_from_parent(key);
        }
    }

    fn update_node(&mut self, key: NodeKey, update_children: bool, parent_changed: bool) {
        self.nodes[key].flags.remove(NodeFlags::PARENT_NOTIFIED);

        if parent_changed || self.nodes[key].flags.contains(NodeFlags::NEEDS_PARENT_UPDATE) {
            self.update_from_parent(key);
        }

        if !update_children {
            return;
        }

        let node = &mut self.nodes[key];
        if node.flags.contains(NodeFlags::NEEDS_CHILD_UPDATE) || parent_changed {
            let children: Vec<NodeKey> = node.children.values().copied().collect();
            for child in children {
                self.update_node(child, true, true);
            }
        } else {
            let pending = std::mem::take(&mut node.children_to_update);
            for child in pending {
                // Requests can outlive a child that was destroyed or moved away.
                if self.nodes.get(child).and_then(|c| c.parent) == Some(key) {
                    self.update_node(child, true, false);
                }
            }
        }

        let node = &mut self.nodes[key];
        node.children_to_update.clear();
        node.flags.remove(NodeFlags::NEEDS_CHILD_UPDATE);
    }

    // ------------------------------------------------------------------
    // Structural helpers
    // ------------------------------------------------------------------

    fn link(&mut self, parent: NodeKey, child: NodeKey) {
        let name = self.nodes[child].name.clone();
        self.nodes[parent].children.insert(name, child);
        let node = &mut self.nodes[child];
        node.parent = Some(parent);
        node.flags.remove(NodeFlags::PARENT_NOTIFIED);
        self.need_update(child, false);
    }

    fn unlink(&mut self, parent: NodeKey, child: NodeKey) {
        self.cancel_update(parent, child);
        let name = self.nodes[child].name.clone();
        self.nodes[parent].children.remove(&name);
        let node = &mut self.nodes[child];
        node.parent = None;
        node.flags.remove(NodeFlags::PARENT_NOTIFIED);
        self.need_update(child, false);
    }

    fn check_can_adopt(&self, parent: NodeKey, name: &str, candidate: Option<NodeKey>) -> SceneResult<()> {
        let taken = self.names.get(name).is_some_and(|&owner| Some(owner) != candidate);
        if taken || self.nodes[parent].children.contains_key(name) {
            return Err(SceneError::DuplicateName {
                parent: self.nodes[parent].name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn depth_of(&self, key: NodeKey) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[key].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent].parent;
        }
        depth
    }

    fn subtree_height(&self, key: NodeKey) -> usize {
        self.nodes[key]
            .children
            .values()
            .map(|&child| 1 + self.subtree_height(child))
            .max()
            .unwrap_or(0)
    }

    fn is_ancestor_or_self(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.nodes[k].parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::constants::HALF_PI;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn chain() -> (NodeTree, NodeId, NodeId) {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let a = tree.create_child(root, "a").unwrap();
        let b = tree.create_child(a, "b").unwrap();
        (tree, a, b)
    }

    #[test]
    fn test_yawed_parent_rotates_child_offset() {
        let (mut tree, a, b) = chain();
        tree.set_position(b, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        tree.yaw(a, HALF_PI, TransformSpace::Local).unwrap();

        let position = tree.full_position(b).unwrap();
        assert_relative_eq!(position, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_mutation_does_not_recompute_eagerly() {
        let (mut tree, a, _) = chain();
        tree.update_all();
        tree.set_position(a, Vec3::new(5.0, 0.0, 0.0)).unwrap();

        let node = tree.node(a).unwrap();
        assert!(node.flags().contains(NodeFlags::NEEDS_PARENT_UPDATE));
        assert_eq!(node.local_transform().position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(tree.nodes[a.key].derived.position, Vec3::zeros());
    }

    #[test]
    fn test_parent_notified_once_per_batch() {
        let (mut tree, a, b) = chain();
        tree.update_all();

        tree.set_position(b, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        tree.set_scale(b, Vec3::new(2.0, 2.0, 2.0)).unwrap();
        tree.yaw(b, 0.3, TransformSpace::Local).unwrap();

        assert_eq!(tree.nodes[a.key].children_to_update, vec![b.key]);
        assert!(tree.node(b).unwrap().flags().contains(NodeFlags::PARENT_NOTIFIED));
        assert!(tree.node(a).unwrap().flags().contains(NodeFlags::PARENT_NOTIFIED));

        tree.update_all();
        assert!(tree.nodes[a.key].children_to_update.is_empty());
        assert!(!tree.node(b).unwrap().flags().contains(NodeFlags::PARENT_NOTIFIED));
    }

    #[test]
    fn test_sparse_update_visits_only_requesting_children() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let left = tree.create_child(root, "left").unwrap();
        let right = tree.create_child(root, "right").unwrap();
        tree.update_all();
        tree.take_transform_changed(left.key);
        tree.take_transform_changed(right.key);

        tree.translate(left, Vec3::new(1.0, 0.0, 0.0), TransformSpace::Parent).unwrap();
        tree.update_all();

        assert!(tree.take_transform_changed(left.key));
        assert!(!tree.take_transform_changed(right.key));
        assert_eq!(tree.nodes[left.key].derived.position, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_lazy_read_sees_ancestor_change_without_update() {
        let (mut tree, a, b) = chain();
        tree.set_position(b, Vec3::new(0.0, 1.0, 0.0)).unwrap();
        tree.update_all();
        assert_relative_eq!(tree.full_position(b).unwrap(), Vec3::new(0.0, 1.0, 0.0));

        tree.set_position(a, Vec3::new(10.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(tree.full_position(b).unwrap(), Vec3::new(10.0, 1.0, 0.0));
    }

    #[test]
    fn test_sibling_cache_invalidated_by_lazy_ancestor_recompute() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let a = tree.create_child(root, "a").unwrap();
        let b = tree.create_child(a, "b").unwrap();
        let c = tree.create_child(a, "c").unwrap();
        tree.set_position(c, Vec3::new(0.0, 0.0, 1.0)).unwrap();
        tree.update_all();

        tree.set_position(a, Vec3::new(3.0, 0.0, 0.0)).unwrap();
        // Recomputes `a` on the way to `b`; `c` must not keep its stale cache.
        tree.full_position(b).unwrap();
        assert_relative_eq!(tree.full_position(c).unwrap(), Vec3::new(3.0, 0.0, 1.0));
    }

    #[test]
    fn test_reads_are_idempotent() {
        let (mut tree, a, b) = chain();
        tree.set_position(a, Vec3::new(0.3, 1.7, -2.0)).unwrap();
        tree.rotate(a, Vec3::new(1.0, 2.0, 3.0), 0.77, TransformSpace::Local).unwrap();
        tree.set_scale(a, Vec3::new(1.5, 0.5, 2.0)).unwrap();
        tree.set_position(b, Vec3::new(1.0, 1.0, 1.0)).unwrap();

        let first = tree.full_transform(b).unwrap();
        let second = tree.full_transform(b).unwrap();
        tree.update_all();
        let third = tree.full_transform(b).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_matrix_rebuilt_only_after_change() {
        let (mut tree, a, _) = chain();
        tree.full_transform(a).unwrap();
        assert!(!tree.node(a).unwrap().flags().contains(NodeFlags::NEEDS_TRANSFORM_REBUILD));

        tree.set_position(a, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert!(tree.node(a).unwrap().flags().contains(NodeFlags::NEEDS_TRANSFORM_REBUILD));
        let matrix = tree.full_transform(a).unwrap();
        assert_relative_eq!(matrix[(0, 3)], 1.0);
    }

    #[test]
    fn test_duplicate_child_rejected() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        tree.create_child(root, "dup").unwrap();

        let result = tree.create_child(root, "dup");
        assert!(matches!(result, Err(SceneError::DuplicateName { .. })));
        assert_eq!(tree.children(root).unwrap().len(), 1);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected_across_parents() {
        let (mut tree, a, b) = chain();
        let leaf = tree.create_child(a, "leaf").unwrap();

        let result = tree.create_child(b, "leaf");
        assert!(matches!(result, Err(SceneError::DuplicateName { .. })));
        assert!(tree.child_by_name(b, "leaf").unwrap().is_none());
        assert!(matches!(tree.create_child(b, "root"), Err(SceneError::DuplicateName { .. })));
        assert_eq!(tree.find("leaf"), Some(leaf));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_destroyed_names_can_be_reused() {
        let (mut tree, a, b) = chain();
        let root = tree.root();
        tree.create_child(b, "leaf").unwrap();

        tree.destroy(b).unwrap();
        assert_eq!(tree.find("b"), None);
        assert_eq!(tree.find("leaf"), None);
        let leaf = tree.create_child(root, "leaf").unwrap();
        assert_eq!(tree.find("leaf"), Some(leaf));
        assert!(tree.create_child(a, "b").is_ok());
    }

    #[test]
    fn test_detached_nodes_keep_their_names() {
        let (mut tree, a, b) = chain();
        let root = tree.root();
        tree.remove_child(a, "b").unwrap();

        assert!(matches!(tree.create_child(root, "b"), Err(SceneError::DuplicateName { .. })));
        tree.add_child(root, b).unwrap();
        tree.reparent(b, a).unwrap();
        assert_eq!(tree.parent(b).unwrap(), Some(a));
    }

    #[test]
    fn test_remove_missing_child_returns_none() {
        let (mut tree, a, _) = chain();
        assert_eq!(tree.remove_child(a, "nope").unwrap(), None);
    }

    #[test]
    fn test_remove_and_readd_child() {
        let (mut tree, a, b) = chain();
        let root = tree.root();
        tree.set_position(a, Vec3::new(5.0, 0.0, 0.0)).unwrap();

        let removed = tree.remove_child(a, "b").unwrap();
        assert_eq!(removed, Some(b));
        assert_eq!(tree.parent(b).unwrap(), None);
        assert_relative_eq!(tree.full_position(b).unwrap(), Vec3::zeros());

        tree.add_child(root, b).unwrap();
        assert_eq!(tree.parent(b).unwrap(), Some(root));
        assert!(matches!(tree.add_child(a, b), Err(SceneError::AlreadyHasParent(_))));
    }

    #[test]
    fn test_cycles_rejected() {
        let (mut tree, a, b) = chain();
        assert!(matches!(tree.reparent(a, b), Err(SceneError::WouldCreateCycle(_))));
        assert_eq!(tree.parent(b).unwrap(), Some(a));
    }

    #[test]
    fn test_destroy_removes_subtree() {
        let (mut tree, a, b) = chain();
        let c = tree.create_child(b, "c").unwrap();

        let destroyed = tree.destroy(a).unwrap();
        assert_eq!(destroyed.len(), 3);
        assert!(!tree.contains(a));
        assert!(!tree.contains(c));
        assert_eq!(tree.len(), 1);
        assert!(tree.children(tree.root()).unwrap().is_empty());
    }

    #[test]
    fn test_root_cannot_be_destroyed() {
        let (mut tree, _, _) = chain();
        let root = tree.root();
        assert!(matches!(tree.destroy(root), Err(SceneError::RootNodeProtected)));
        assert_eq!(tree.len(), 3);
        assert!(tree.contains(root));
    }

    #[test]
    fn test_foreign_handles_rejected() {
        let (tree, a, _) = chain();
        let (mut other, _, _) = chain();
        assert!(!other.contains(a));
        assert!(matches!(other.set_position(a, Vec3::zeros()), Err(SceneError::ForeignNode)));
        assert!(tree.contains(a));
    }

    #[test]
    fn test_max_depth_enforced() {
        let mut tree = NodeTree::with_max_depth("root", 2);
        let root = tree.root();
        let a = tree.create_child(root, "a").unwrap();
        let b = tree.create_child(a, "b").unwrap();
        assert!(matches!(tree.create_child(b, "c"), Err(SceneError::MaxDepthExceeded(2))));
    }

    #[test]
    fn test_world_space_translation_cancels_parent_transform() {
        let (mut tree, a, b) = chain();
        tree.yaw(a, HALF_PI, TransformSpace::Local).unwrap();
        tree.set_scale(a, Vec3::new(2.0, 2.0, 2.0)).unwrap();

        tree.translate(b, Vec3::new(4.0, 0.0, 0.0), TransformSpace::World).unwrap();
        assert_relative_eq!(tree.full_position(b).unwrap(), Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_parent_space_translation_cancels_parent_rotation_and_scale() {
        let (mut tree, a, b) = chain();
        tree.yaw(a, HALF_PI, TransformSpace::Local).unwrap();
        tree.set_scale(a, Vec3::new(2.0, 2.0, 2.0)).unwrap();

        tree.translate(b, Vec3::new(4.0, 0.0, 0.0), TransformSpace::Parent).unwrap();
        assert_relative_eq!(tree.full_position(b).unwrap(), Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(tree.node(b).unwrap().position(), Vec3::new(0.0, 0.0, 2.0), epsilon = 1e-5);
    }

    #[test]
    fn test_parent_space_translation_without_parent_is_plain_offset() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        tree.yaw(root, HALF_PI, TransformSpace::Local).unwrap();
        tree.translate(root, Vec3::new(1.0, 2.0, 3.0), TransformSpace::Parent).unwrap();
        assert_relative_eq!(tree.full_position(root).unwrap(), Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-6);
    }

    #[test]
    fn test_local_translation_follows_orientation() {
        let (mut tree, a, _) = chain();
        tree.yaw(a, HALF_PI, TransformSpace::Local).unwrap();
        tree.translate(a, Vec3::new(0.0, 0.0, -1.0), TransformSpace::Local).unwrap();
        assert_relative_eq!(tree.node(a).unwrap().position(), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_world_rotation_ignores_parent_orientation() {
        let (mut tree, a, b) = chain();
        tree.roll(a, HALF_PI, TransformSpace::Local).unwrap();
        tree.yaw(b, HALF_PI, TransformSpace::World).unwrap();

        let forward = tree.full_orientation(b).unwrap() * Vec3::x();
        let parent_forward = tree.full_orientation(a).unwrap() * Vec3::x();
        let expected = Quat::from_axis_angle(&Vec3::y_axis(), HALF_PI) * parent_forward;
        assert_relative_eq!(forward, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_axis_rotation_is_ignored() {
        let (mut tree, a, _) = chain();
        tree.rotate(a, Vec3::new(0.0, 1e-8, 0.0), 1.0, TransformSpace::Local).unwrap();
        assert_eq!(tree.node(a).unwrap().orientation(), Quat::identity());
    }

    #[test]
    fn test_look_at_points_negative_z_at_target() {
        let (mut tree, a, b) = chain();
        tree.yaw(a, 0.4, TransformSpace::Local).unwrap();
        tree.set_position(b, Vec3::new(1.0, 2.0, 3.0)).unwrap();
        let target = Vec3::new(-5.0, 0.0, 2.0);

        tree.look_at(b, target, TransformSpace::World).unwrap();

        let from = tree.full_position(b).unwrap();
        let facing = tree.full_orientation(b).unwrap() * -Vec3::z();
        assert_relative_eq!(facing, (target - from).normalize(), epsilon = 1e-5);
    }

    #[test]
    fn test_randomized_child_position_matches_closed_form() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let p = tree.create_child(root, "p").unwrap();
        let q = tree.create_child(root, "q").unwrap();
        let n = tree.create_child(p, "n").unwrap();

        for step in 0..200 {
            let target = [p, q, n][rng.gen_range(0..3)];
            let v = Vec3::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0));
            let space = [TransformSpace::Local, TransformSpace::Parent, TransformSpace::World][rng.gen_range(0..3)];
            match rng.gen_range(0..5) {
                0 => tree.translate(target, v, space).unwrap(),
                1 => tree.rotate(target, v, rng.gen_range(-3.0..3.0), space).unwrap(),
                2 => tree
                    .set_scale(target, Vec3::new(rng.gen_range(0.5..2.0), rng.gen_range(0.5..2.0), rng.gen_range(0.5..2.0)))
                    .unwrap(),
                3 => {
                    let new_parent = if tree.parent(n).unwrap() == Some(p) { q } else { p };
                    tree.reparent(n, new_parent).unwrap();
                }
                _ => tree.update_all(),
            }

            if step % 3 == 0 {
                tree.update_all();
            }

            let parent = tree.parent(n).unwrap().unwrap();
            let parent_position = tree.full_position(parent).unwrap();
            let parent_orientation = tree.full_orientation(parent).unwrap();
            let parent_scale = tree.full_scale(parent).unwrap();
            let local = tree.node(n).unwrap().position();

            let expected = parent_orientation * parent_scale.component_mul(&local) + parent_position;
            let actual = tree.full_position(n).unwrap();
            assert_relative_eq!(actual, expected, epsilon = 1e-3, max_relative = 1e-4);
        }
    }
}

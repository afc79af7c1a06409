//! # Scene Graph
//!
//! Owns the transform tree, the scene data of every node, the movables and
//! the cameras, and drives the per-frame update, cull and render sequence.
//!
//! Movables live in an arena of their own; a scene node only records the
//! handles attached to it. A movable is attached to at most one node at a
//! time.

use crate::assets::Resources;
use crate::core::config::SceneConfig;
use crate::foundation::collections::{MovableId, NodeKey, SecondaryMap, SlotMap};
use crate::foundation::math::{Quat, Vec3};
use crate::render::device::GraphicsDevice;
use crate::render::render_queue::RenderQueue;
use crate::render::rendering_technique::{FrameStats, RenderingTechnique};
use crate::render::RenderResult;
use crate::scene::bounds::{merge_optional, Aabb, Frustum};
use crate::scene::camera::{Camera, CameraManager};
use crate::scene::movable::{Movable, MovableContext, MovableObject};
use crate::scene::node::NodeId;
use crate::scene::node_tree::NodeTree;
use crate::scene::scene_node::SceneNodeData;
use crate::scene::{SceneError, SceneResult};

#[derive(Debug)]
struct MovableSlot {
    object: MovableObject,
    attached_to: Option<NodeKey>,
}

/// A scene: node hierarchy, attached objects and cameras
#[derive(Debug)]
pub struct SceneGraph {
    name: String,
    tree: NodeTree,
    scene_nodes: SecondaryMap<NodeKey, SceneNodeData>,
    movables: SlotMap<MovableId, MovableSlot>,
    cameras: CameraManager,
    config: SceneConfig,
}

impl SceneGraph {
    /// Create an empty scene with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, SceneConfig::default())
    }

    /// Create an empty scene with the given settings
    pub fn with_config(name: impl Into<String>, config: SceneConfig) -> Self {
        let name = name.into();
        let tree = NodeTree::with_max_depth(format!("{}::root", name), config.max_tree_depth);
        let mut scene_nodes = SecondaryMap::new();
        scene_nodes.insert(tree.root_key(), SceneNodeData::default());
        log::debug!("Created scene graph '{}'", name);
        Self {
            name,
            tree,
            scene_nodes,
            movables: SlotMap::with_key(),
            cameras: CameraManager::new(),
            config,
        }
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scene settings
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Toggle debug bounding boxes for subsequent frames
    pub fn set_show_bounding_boxes(&mut self, enabled: bool) {
        self.config.show_bounding_boxes = enabled;
    }

    /// The root scene node
    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Transform hierarchy, for reading node transforms
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Transform hierarchy, for moving nodes
    pub fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }

    /// Camera registry
    pub fn cameras(&self) -> &CameraManager {
        &self.cameras
    }

    /// Camera registry, for adding and selecting cameras
    pub fn cameras_mut(&mut self) -> &mut CameraManager {
        &mut self.cameras
    }

    // ------------------------------------------------------------------
    // Scene nodes
    // ------------------------------------------------------------------

    /// Create a scene node under `parent`
    pub fn create_child_scene_node(&mut self, parent: NodeId, name: impl Into<String>) -> SceneResult<NodeId> {
        self.create_child_scene_node_with(parent, name, Vec3::zeros(), Quat::identity())
    }

    /// Create a scene node under `parent` with an initial local placement
    pub fn create_child_scene_node_with(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        position: Vec3,
        orientation: Quat,
    ) -> SceneResult<NodeId> {
        let id = self.tree.create_child_with(parent, name, position, orientation)?;
        self.scene_nodes.insert(id.key, SceneNodeData::default());
        Ok(id)
    }

    /// Destroy a scene node and its subtree, detaching every movable in it
    pub fn destroy_node(&mut self, node: NodeId) -> SceneResult<()> {
        let destroyed = self.tree.destroy(node)?;
        for key in destroyed {
            self.release_node(key);
        }
        Ok(())
    }

    /// Movables attached to a node, in attach order
    pub fn attached_objects(&self, node: NodeId) -> SceneResult<&[MovableId]> {
        let key = self.tree.resolve(node)?;
        Ok(self.scene_nodes.get(key).map_or(&[][..], SceneNodeData::attached))
    }

    /// World bounds of a node's movables and descendants, as of the last update
    pub fn node_bounds(&self, node: NodeId) -> SceneResult<Option<Aabb>> {
        let key = self.tree.resolve(node)?;
        Ok(self.scene_nodes.get(key).and_then(SceneNodeData::world_bounds))
    }

    fn release_node(&mut self, key: NodeKey) {
        let Some(mut data) = self.scene_nodes.remove(key) else {
            return;
        };
        for id in data.take_attached() {
            if let Some(slot) = self.movables.get_mut(id) {
                slot.attached_to = None;
                slot.object.notify_moved();
            }
        }
    }

    // ------------------------------------------------------------------
    // Movables
    // ------------------------------------------------------------------

    /// Register a movable; it is not drawn until attached to a node
    pub fn add_movable(&mut self, object: impl Into<MovableObject>) -> MovableId {
        let object = object.into();
        log::debug!("Added movable '{}' to scene '{}'", object.name(), self.name);
        self.movables.insert(MovableSlot { object, attached_to: None })
    }

    /// Look up a movable
    pub fn movable(&self, id: MovableId) -> Option<&MovableObject> {
        self.movables.get(id).map(|slot| &slot.object)
    }

    /// Look up a movable for modification
    pub fn movable_mut(&mut self, id: MovableId) -> Option<&mut MovableObject> {
        self.movables.get_mut(id).map(|slot| &mut slot.object)
    }

    /// Number of registered movables
    pub fn movable_count(&self) -> usize {
        self.movables.len()
    }

    /// Node a movable is attached to
    pub fn attached_node(&self, id: MovableId) -> Option<NodeId> {
        let key = self.movables.get(id)?.attached_to?;
        Some(self.tree.id(key))
    }

    /// Attach a movable to a node, detaching it from its previous node first
    pub fn attach_object(&mut self, node: NodeId, id: MovableId) -> SceneResult<()> {
        let key = self.tree.resolve(node)?;
        let slot = self.movables.get_mut(id).ok_or(SceneError::MovableNotFound)?;

        match slot.attached_to {
            Some(current) if current == key => return Ok(()),
            Some(previous) => {
                if let Some(data) = self.scene_nodes.get_mut(previous) {
                    data.detach(id);
                }
                log::trace!("Moving '{}' to another node", slot.object.name());
            }
            None => {}
        }

        slot.attached_to = Some(key);
        slot.object.notify_moved();
        if let Some(entry) = self.scene_nodes.entry(key) {
            entry.or_default().attach(id);
        }
        Ok(())
    }

    /// Detach a movable from the node it is attached to
    pub fn detach_object(&mut self, node: NodeId, id: MovableId) -> SceneResult<()> {
        let key = self.tree.resolve(node)?;
        let slot = self.movables.get_mut(id).ok_or(SceneError::MovableNotFound)?;
        if slot.attached_to != Some(key) {
            return Err(SceneError::MovableNotAttached(slot.object.name().to_string()));
        }

        slot.attached_to = None;
        slot.object.notify_moved();
        if let Some(data) = self.scene_nodes.get_mut(key) {
            data.detach(id);
        }
        Ok(())
    }

    /// Detach every movable from a node
    pub fn detach_all_objects(&mut self, node: NodeId) -> SceneResult<Vec<MovableId>> {
        let key = self.tree.resolve(node)?;
        let detached = self
            .scene_nodes
            .get_mut(key)
            .map(SceneNodeData::take_attached)
            .unwrap_or_default();
        for &id in &detached {
            if let Some(slot) = self.movables.get_mut(id) {
                slot.attached_to = None;
                slot.object.notify_moved();
            }
        }
        Ok(detached)
    }

    /// Remove a movable from the scene, detaching it first
    pub fn destroy_movable(&mut self, id: MovableId) -> Option<MovableObject> {
        let slot = self.movables.remove(id)?;
        if let Some(data) = slot.attached_to.and_then(|key| self.scene_nodes.get_mut(key)) {
            data.detach(id);
        }
        Some(slot.object)
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Bring every world transform and every node's bounds up to date
    ///
    /// Movables on nodes whose transform changed are told so before their
    /// bounds are read.
    pub fn update(&mut self) {
        self.tree.update_all();

        let stale: Vec<NodeKey> = self
            .scene_nodes
            .keys()
            .filter(|&key| self.tree.get(key).is_none())
            .collect();
        for key in stale {
            self.release_node(key);
        }

        let root = self.tree.root_key();
        let bounds = self.update_bounds(root);
        log::trace!("Scene '{}' updated, bounds {:?}", self.name, bounds);
    }

    fn update_bounds(&mut self, key: NodeKey) -> Option<Aabb> {
        let mut bounds = None;
        for child in self.tree.child_keys(key) {
            if let Some(child_bounds) = self.update_bounds(child) {
                bounds = merge_optional(bounds, child_bounds);
            }
        }

        let moved = self.tree.take_transform_changed(key);
        let attached = self
            .scene_nodes
            .get(key)
            .map(|data| data.attached().to_vec())
            .unwrap_or_default();
        if !attached.is_empty() {
            let world = self.tree.full_transform_by_key(key);
            for id in attached {
                let Some(slot) = self.movables.get_mut(id) else {
                    continue;
                };
                if moved {
                    slot.object.notify_moved();
                }
                if let Some(object_bounds) = slot.object.world_bounds(&world) {
                    bounds = merge_optional(bounds, object_bounds);
                }
            }
        }

        if let Some(entry) = self.scene_nodes.entry(key) {
            entry.or_default().set_world_bounds(bounds);
        }
        bounds
    }

    /// Queue every visible movable of the scene for the current camera
    ///
    /// Returns the number of movables that contributed to the queue.
    pub fn find_visible_objects(&mut self, queue: &mut RenderQueue, resources: &Resources) -> SceneResult<usize> {
        let root = self.tree.root();
        self.find_visible_objects_from(root, queue, resources, true)
    }

    /// Queue the visible movables of one node, and of its subtree if asked
    ///
    /// Uses the bounds computed by the last [`SceneGraph::update`].
    pub fn find_visible_objects_from(
        &mut self,
        node: NodeId,
        queue: &mut RenderQueue,
        resources: &Resources,
        include_children: bool,
    ) -> SceneResult<usize> {
        let start = self.tree.resolve(node)?;
        let camera = self.cameras.current().ok_or(SceneError::NoActiveCamera)?;

        let mut pass = CullPass {
            tree: &mut self.tree,
            scene_nodes: &self.scene_nodes,
            movables: &mut self.movables,
            frustum: camera.frustum(),
            camera,
            resources,
            config: &self.config,
        };
        let queued = pass.visit(start, queue, include_children)?;
        log::debug!("Scene '{}' queued {} visible object(s)", self.name, queued);
        Ok(queued)
    }

    /// Update, cull and draw one frame with the current camera
    ///
    /// The queue is empty when this returns, whether the frame succeeded or not.
    pub fn render_frame(
        &mut self,
        queue: &mut RenderQueue,
        technique: &mut dyn RenderingTechnique,
        resources: &Resources,
        device: &mut dyn GraphicsDevice,
    ) -> RenderResult<FrameStats> {
        self.update();
        if let Err(err) = self.find_visible_objects(queue, resources) {
            queue.reset();
            return Err(err.into());
        }
        let camera = self.cameras.current().ok_or(SceneError::NoActiveCamera)?;
        technique.render(queue, camera, &resources.materials, device)
    }
}

/// Borrowed scene state for one culling traversal
struct CullPass<'a> {
    tree: &'a mut NodeTree,
    scene_nodes: &'a SecondaryMap<NodeKey, SceneNodeData>,
    movables: &'a mut SlotMap<MovableId, MovableSlot>,
    camera: &'a Camera,
    frustum: Frustum,
    resources: &'a Resources,
    config: &'a SceneConfig,
}

impl CullPass<'_> {
    fn visit(&mut self, key: NodeKey, queue: &mut RenderQueue, include_children: bool) -> SceneResult<usize> {
        let scene_nodes = self.scene_nodes;
        let data = scene_nodes.get(key);

        if self.config.cull_subtrees {
            match data.and_then(SceneNodeData::world_bounds) {
                Some(bounds) if self.frustum.intersects_aabb(&bounds) => {}
                _ => return Ok(0),
            }
        }

        let mut queued = 0;
        if let Some(data) = data.filter(|d| !d.attached().is_empty()) {
            let world_transform = self.tree.full_transform_by_key(key);
            let world_position = self.tree.derived(key).position;

            for &id in data.attached() {
                let Some(slot) = self.movables.get_mut(id) else {
                    continue;
                };
                if !slot.object.is_visible() {
                    continue;
                }
                match slot.object.world_bounds(&world_transform) {
                    Some(bounds) if self.frustum.intersects_aabb(&bounds) => {}
                    _ => continue,
                }

                let ctx = MovableContext {
                    id,
                    world_transform,
                    world_position,
                    resources: self.resources,
                    show_bounding_boxes: self.config.show_bounding_boxes,
                };
                slot.object.update_render_queue(&ctx, queue, self.camera)?;
                queued += 1;
            }
        }

        if include_children {
            for child in self.tree.child_keys(key) {
                queued += self.visit(child, queue, true)?;
            }
        }
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{GeometryBinding, Mesh, SubMesh};
    use crate::foundation::collections::MeshId;
    use crate::foundation::math::Mat4;
    use crate::render::material::Material;
    use crate::render::shader::ShaderKind;
    use crate::scene::entity::Entity;
    use crate::scene::movable::AxesGizmo;
    use crate::scene::node::TransformSpace;
    use approx::assert_relative_eq;

    fn resources() -> (Resources, MeshId) {
        let mut resources = Resources::new();
        let material = resources.materials.add(Material::new("stone", ShaderKind::Lit)).unwrap();
        let mesh = Mesh::new(vec![SubMesh::new(
            "cube",
            GeometryBinding::new(1, 24, 36),
            Aabb::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)),
            Some(material),
        )]);
        let mesh = resources.meshes.add("cube", mesh).unwrap();
        (resources, mesh)
    }

    fn scene_with_camera() -> SceneGraph {
        let mut scene = SceneGraph::new("test");
        scene
            .cameras_mut()
            .add(Camera::perspective("main", Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0))
            .unwrap();
        scene
    }

    fn place_cube(scene: &mut SceneGraph, resources: &Resources, mesh: MeshId, name: &str, at: Vec3) -> MovableId {
        let root = scene.root();
        let node = scene
            .create_child_scene_node_with(root, name, at, Quat::identity())
            .unwrap();
        let id = scene.add_movable(Entity::new(name, mesh, resources).unwrap());
        scene.attach_object(node, id).unwrap();
        id
    }

    #[test]
    fn test_attach_moves_ownership() {
        let (resources, mesh) = resources();
        let mut scene = SceneGraph::new("test");
        let root = scene.root();
        let a = scene.create_child_scene_node(root, "a").unwrap();
        let b = scene.create_child_scene_node(root, "b").unwrap();
        let id = scene.add_movable(Entity::new("cube", mesh, &resources).unwrap());

        scene.attach_object(a, id).unwrap();
        scene.attach_object(a, id).unwrap();
        assert_eq!(scene.attached_objects(a).unwrap(), &[id]);

        scene.attach_object(b, id).unwrap();
        assert!(scene.attached_objects(a).unwrap().is_empty());
        assert_eq!(scene.attached_objects(b).unwrap(), &[id]);
        assert_eq!(scene.attached_node(id), Some(b));
    }

    #[test]
    fn test_detach_from_wrong_node_fails() {
        let (resources, mesh) = resources();
        let mut scene = SceneGraph::new("test");
        let root = scene.root();
        let a = scene.create_child_scene_node(root, "a").unwrap();
        let id = scene.add_movable(Entity::new("cube", mesh, &resources).unwrap());
        scene.attach_object(a, id).unwrap();

        assert!(matches!(
            scene.detach_object(root, id),
            Err(SceneError::MovableNotAttached(_))
        ));
        scene.detach_object(a, id).unwrap();
        assert_eq!(scene.attached_node(id), None);
    }

    #[test]
    fn test_destroy_node_detaches_movables() {
        let (resources, mesh) = resources();
        let mut scene = SceneGraph::new("test");
        let id = place_cube(&mut scene, &resources, mesh, "cube", Vec3::zeros());
        let node = scene.attached_node(id).unwrap();

        scene.destroy_node(node).unwrap();
        assert_eq!(scene.attached_node(id), None);
        assert!(scene.movable(id).is_some());
        assert!(matches!(scene.attached_objects(node), Err(SceneError::NodeNotFound)));
    }

    #[test]
    fn test_destroy_movable_detaches() {
        let (resources, mesh) = resources();
        let mut scene = SceneGraph::new("test");
        let id = place_cube(&mut scene, &resources, mesh, "cube", Vec3::zeros());
        let node = scene.attached_node(id).unwrap();

        assert!(scene.destroy_movable(id).is_some());
        assert!(scene.attached_objects(node).unwrap().is_empty());
        assert!(scene.destroy_movable(id).is_none());
    }

    #[test]
    fn test_update_aggregates_bounds() {
        let (resources, mesh) = resources();
        let mut scene = SceneGraph::new("test");
        place_cube(&mut scene, &resources, mesh, "left", Vec3::new(-5.0, 0.0, 0.0));
        place_cube(&mut scene, &resources, mesh, "right", Vec3::new(5.0, 0.0, 0.0));
        scene.update();

        let bounds = scene.node_bounds(scene.root()).unwrap().unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(-6.0, -1.0, -1.0));
        assert_relative_eq!(bounds.max, Vec3::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn test_moving_node_refreshes_bounds() {
        let (resources, mesh) = resources();
        let mut scene = SceneGraph::new("test");
        let id = place_cube(&mut scene, &resources, mesh, "cube", Vec3::zeros());
        let node = scene.attached_node(id).unwrap();
        scene.update();

        scene
            .tree_mut()
            .translate(node, Vec3::new(0.0, 3.0, 0.0), TransformSpace::Parent)
            .unwrap();
        scene.update();

        let bounds = scene.node_bounds(node).unwrap().unwrap();
        assert_relative_eq!(bounds.center(), Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_culling_skips_objects_outside_frustum() {
        let (resources, mesh) = resources();
        let mut scene = scene_with_camera();
        place_cube(&mut scene, &resources, mesh, "front", Vec3::zeros());
        place_cube(&mut scene, &resources, mesh, "behind", Vec3::new(0.0, 0.0, 50.0));
        place_cube(&mut scene, &resources, mesh, "aside", Vec3::new(100.0, 0.0, 0.0));
        scene.update();

        let mut queue = RenderQueue::new();
        let queued = scene.find_visible_objects(&mut queue, &resources).unwrap();
        assert_eq!(queued, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_culling_uses_bone_posed_bounds() {
        let mut resources = Resources::new();
        let material = resources.materials.add(Material::new("stone", ShaderKind::Lit)).unwrap();
        let mesh = Mesh::new(vec![SubMesh::new(
            "arm",
            GeometryBinding::new(1, 24, 36),
            Aabb::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)),
            Some(material),
        )
        .with_bone(0)])
        .with_bones(vec![Mat4::new_translation(&Vec3::new(-100.0, 0.0, 0.0))]);
        let mesh = resources.meshes.add("arm", mesh).unwrap();
        let mut scene = scene_with_camera();
        let id = place_cube(&mut scene, &resources, mesh, "arm", Vec3::new(100.0, 0.0, 0.0));
        scene.update();

        let mut queue = RenderQueue::new();
        assert_eq!(scene.find_visible_objects(&mut queue, &resources).unwrap(), 1);
        queue.reset();

        scene
            .movable_mut(id)
            .and_then(MovableObject::as_entity_mut)
            .unwrap()
            .set_bone(0, Mat4::identity())
            .unwrap();
        scene.update();
        assert_eq!(scene.find_visible_objects(&mut queue, &resources).unwrap(), 0);
    }

    #[test]
    fn test_hidden_objects_not_queued() {
        let (resources, mesh) = resources();
        let mut scene = scene_with_camera();
        let id = place_cube(&mut scene, &resources, mesh, "cube", Vec3::zeros());
        scene.movable_mut(id).unwrap().set_visible(false);
        scene.update();

        let mut queue = RenderQueue::new();
        assert_eq!(scene.find_visible_objects(&mut queue, &resources).unwrap(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_culling_without_camera_fails() {
        let (resources, mesh) = resources();
        let mut scene = SceneGraph::new("test");
        place_cube(&mut scene, &resources, mesh, "cube", Vec3::zeros());
        scene.update();

        let mut queue = RenderQueue::new();
        assert!(matches!(
            scene.find_visible_objects(&mut queue, &resources),
            Err(SceneError::NoActiveCamera)
        ));
    }

    #[test]
    fn test_find_from_node_without_children() {
        let (resources, mesh) = resources();
        let mut scene = scene_with_camera();
        let parent_id = place_cube(&mut scene, &resources, mesh, "parent", Vec3::zeros());
        let parent = scene.attached_node(parent_id).unwrap();
        let child = scene.create_child_scene_node(parent, "child").unwrap();
        let child_id = scene.add_movable(Entity::new("child", mesh, &resources).unwrap());
        scene.attach_object(child, child_id).unwrap();
        scene.update();

        let mut queue = RenderQueue::new();
        queue.set_instancing(false);
        assert_eq!(scene.find_visible_objects_from(parent, &mut queue, &resources, false).unwrap(), 1);
        queue.reset();
        assert_eq!(scene.find_visible_objects_from(parent, &mut queue, &resources, true).unwrap(), 2);
    }

    #[test]
    fn test_bounding_boxes_follow_config() {
        let (resources, mesh) = resources();
        let mut scene = scene_with_camera();
        place_cube(&mut scene, &resources, mesh, "cube", Vec3::zeros());
        scene.update();

        let mut queue = RenderQueue::new();
        scene.find_visible_objects(&mut queue, &resources).unwrap();
        assert_eq!(queue.len(), 1);
        queue.reset();

        scene.set_show_bounding_boxes(true);
        scene.find_visible_objects(&mut queue, &resources).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_axes_gizmo_lands_in_overlay() {
        let (resources, _) = resources();
        let mut scene = scene_with_camera();
        let root = scene.root();
        let id = scene.add_movable(AxesGizmo::new("axes", 1.0, &resources.materials));
        scene.attach_object(root, id).unwrap();
        scene.update();

        let mut queue = RenderQueue::new();
        scene.find_visible_objects(&mut queue, &resources).unwrap();
        assert_eq!(
            queue.solid_count(crate::render::render_queue::RenderQueueGroupId::Overlay),
            1
        );
    }
}

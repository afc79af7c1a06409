//! Movable objects
//!
//! A movable is anything that can be attached to a scene node and contribute
//! renderables to the queue. Its world transform always comes from the node
//! it is attached to, handed in through a [`MovableContext`].

use crate::assets::{GeometryBinding, MaterialLibrary, Resources};
use crate::foundation::collections::{MaterialId, MovableId};
use crate::foundation::math::{Mat4, Vec3};
use crate::render::render_queue::{RenderQueue, RenderQueueGroupId, RenderQueueKey};
use crate::render::renderable::Renderable;
use crate::scene::bounds::Aabb;
use crate::scene::camera::Camera;
use crate::scene::entity::Entity;
use crate::scene::SceneResult;

/// Per-object data supplied by the scene graph during culling
pub struct MovableContext<'a> {
    /// Handle of the movable being processed
    pub id: MovableId,
    /// World matrix of the owning scene node
    pub world_transform: Mat4,
    /// World position of the owning scene node
    pub world_position: Vec3,
    /// Asset libraries
    pub resources: &'a Resources,
    /// Emit debug bounding boxes
    pub show_bounding_boxes: bool,
}

/// Object that can be attached to a scene node
pub trait Movable {
    /// Object name
    fn name(&self) -> &str;

    /// Whether the object is drawn
    fn is_visible(&self) -> bool;

    /// Show or hide the object
    fn set_visible(&mut self, visible: bool);

    /// Bounds in object space, `None` if the object has no extent
    fn local_bounds(&self) -> Option<Aabb>;

    /// Bounds after applying the owning node's world matrix
    fn world_bounds(&mut self, world: &Mat4) -> Option<Aabb> {
        self.local_bounds().map(|bounds| bounds.transformed(world))
    }

    /// The owning node's world transform changed
    fn notify_moved(&mut self) {}

    /// Push this object's renderables into the queue
    fn update_render_queue(
        &mut self,
        ctx: &MovableContext<'_>,
        queue: &mut RenderQueue,
        camera: &Camera,
    ) -> SceneResult<()>;
}

/// Three axis lines showing a node's orientation
#[derive(Debug, Clone)]
pub struct AxesGizmo {
    name: String,
    visible: bool,
    size: f32,
    material: MaterialId,
}

impl AxesGizmo {
    /// Gizmo with lines of length `size`, drawn with the debug material
    pub fn new(name: impl Into<String>, size: f32, materials: &MaterialLibrary) -> Self {
        Self {
            name: name.into(),
            visible: true,
            size,
            material: materials.debug_wireframe(),
        }
    }

    /// Line length
    pub fn size(&self) -> f32 {
        self.size
    }
}

impl Movable for AxesGizmo {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn local_bounds(&self) -> Option<Aabb> {
        Some(Aabb::new(Vec3::zeros(), Vec3::new(self.size, self.size, self.size)))
    }

    fn update_render_queue(
        &mut self,
        ctx: &MovableContext<'_>,
        queue: &mut RenderQueue,
        camera: &Camera,
    ) -> SceneResult<()> {
        let Some(material) = ctx.resources.materials.get(self.material) else {
            log::warn!("Axes '{}' lost the debug material", self.name);
            return Ok(());
        };
        let depth = (camera.world_position() - ctx.world_position).norm_squared();
        let key = RenderQueueKey::new(material.sort_id(), false, depth).with_group(RenderQueueGroupId::Overlay);
        let world = ctx.world_transform * Mat4::new_scaling(self.size);
        queue.add_renderable(
            key,
            Renderable::new(GeometryBinding::AXES, Some(self.material), world).with_source(ctx.id),
        );
        Ok(())
    }
}

/// Closed set of movable kinds a scene graph stores
#[derive(Debug)]
pub enum MovableObject {
    /// Mesh instance
    Entity(Entity),
    /// Debug axes
    Axes(AxesGizmo),
}

impl MovableObject {
    /// The entity, if this movable is one
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            MovableObject::Entity(entity) => Some(entity),
            MovableObject::Axes(_) => None,
        }
    }

    /// The entity for modification, if this movable is one
    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            MovableObject::Entity(entity) => Some(entity),
            MovableObject::Axes(_) => None,
        }
    }

    fn inner(&self) -> &dyn Movable {
        match self {
            MovableObject::Entity(entity) => entity,
            MovableObject::Axes(axes) => axes,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Movable {
        match self {
            MovableObject::Entity(entity) => entity,
            MovableObject::Axes(axes) => axes,
        }
    }
}

impl From<Entity> for MovableObject {
    fn from(entity: Entity) -> Self {
        MovableObject::Entity(entity)
    }
}

impl From<AxesGizmo> for MovableObject {
    fn from(axes: AxesGizmo) -> Self {
        MovableObject::Axes(axes)
    }
}

impl Movable for MovableObject {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn is_visible(&self) -> bool {
        self.inner().is_visible()
    }

    fn set_visible(&mut self, visible: bool) {
        self.inner_mut().set_visible(visible);
    }

    fn local_bounds(&self) -> Option<Aabb> {
        self.inner().local_bounds()
    }

    fn world_bounds(&mut self, world: &Mat4) -> Option<Aabb> {
        self.inner_mut().world_bounds(world)
    }

    fn notify_moved(&mut self) {
        self.inner_mut().notify_moved();
    }

    fn update_render_queue(
        &mut self,
        ctx: &MovableContext<'_>,
        queue: &mut RenderQueue,
        camera: &Camera,
    ) -> SceneResult<()> {
        self.inner_mut().update_render_queue(ctx, queue, camera)
    }
}

//! Mesh instances
//!
//! An [`Entity`] places a registered mesh in the scene. On construction (and
//! whenever the mesh is replaced) it is split into one [`SubEntity`] per
//! submesh; each sub-entity carries one [`SubEntityMaterial`] per material
//! slot, holding the cached render-queue key for that slot.

use crate::assets::{GeometryBinding, MaterialLibrary, Resources};
use crate::foundation::collections::{MaterialId, MeshId};
use crate::foundation::math::{Mat4, Vec3};
use crate::render::material::Material;
use crate::render::render_queue::{RenderQueue, RenderQueueGroupId, RenderQueueKey};
use crate::render::renderable::Renderable;
use crate::scene::bounds::{merge_optional, Aabb};
use crate::scene::camera::Camera;
use crate::scene::movable::{Movable, MovableContext};
use crate::scene::{SceneError, SceneResult};

/// Material assignment of one slot, with its cached queue key
///
/// The key's material and transparency fields follow the material. A
/// technique or queue-group change on the material bumps its generation;
/// the key is refreshed lazily the next time the slot is queued.
#[derive(Debug, Clone)]
pub struct SubEntityMaterial {
    material: Option<MaterialId>,
    fallback: Option<MaterialId>,
    seen_generation: u64,
    group_override: Option<RenderQueueGroupId>,
    key: RenderQueueKey,
}

impl SubEntityMaterial {
    fn new(slot: Option<MaterialId>, materials: &MaterialLibrary) -> Self {
        let mut result = Self {
            material: None,
            fallback: slot,
            seen_generation: 0,
            group_override: None,
            key: RenderQueueKey::default(),
        };
        if let Some(id) = slot {
            match materials.get(id) {
                Some(material) => result.assign(id, material),
                None => log::warn!("Submesh refers to unregistered material {:?}", id),
            }
        }
        result
    }

    /// Assigned material
    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    /// Material declared by the submesh for this slot
    pub fn fallback(&self) -> Option<MaterialId> {
        self.fallback
    }

    /// Current queue key (depth is filled in per frame)
    pub fn key(&self) -> RenderQueueKey {
        self.key
    }

    /// Assign a material; `None` restores the submesh's material
    ///
    /// Assigning the material already in use, with an unchanged technique,
    /// does nothing.
    pub fn set_material(&mut self, material: Option<MaterialId>, materials: &MaterialLibrary) -> SceneResult<()> {
        let (id, resolved) = self.resolve(material, materials)?;
        if self.material == Some(id) && self.seen_generation == resolved.generation() {
            return Ok(());
        }
        self.assign(id, resolved);
        Ok(())
    }

    fn resolve<'m>(
        &self,
        material: Option<MaterialId>,
        materials: &'m MaterialLibrary,
    ) -> SceneResult<(MaterialId, &'m Material)> {
        let id = material.or(self.fallback).ok_or(SceneError::MaterialRequired)?;
        let resolved = materials.get(id).ok_or(SceneError::MaterialNotFound(id))?;
        Ok((id, resolved))
    }

    /// Force the slot into a queue group regardless of the material's choice
    pub fn set_queue_group(&mut self, group: Option<RenderQueueGroupId>, materials: &MaterialLibrary) {
        self.group_override = group;
        self.key.group = self.resolve_group(self.material.and_then(|id| materials.get(id)));
    }

    /// Pick up technique or group changes made to the material since the last refresh
    pub(crate) fn refresh(&mut self, materials: &MaterialLibrary) {
        let Some(id) = self.material else {
            return;
        };
        if let Some(material) = materials.get(id) {
            if material.generation() != self.seen_generation {
                self.assign(id, material);
            }
        }
    }

    fn assign(&mut self, id: MaterialId, material: &Material) {
        self.material = Some(id);
        self.seen_generation = material.generation();
        self.key.material = material.sort_id();
        self.key.transparent = material.is_transparent();
        self.key.instanced = material.supports_instancing();
        self.key.group = self.resolve_group(Some(material));
    }

    fn resolve_group(&self, material: Option<&Material>) -> RenderQueueGroupId {
        self.group_override
            .or_else(|| material.and_then(Material::queue_group))
            .unwrap_or_default()
    }
}

/// One submesh of an entity
#[derive(Debug, Clone)]
pub struct SubEntity {
    index: usize,
    geometry: GeometryBinding,
    bone_index: Option<usize>,
    local_bounds: Aabb,
    materials: Vec<SubEntityMaterial>,
    visible: bool,
}

impl SubEntity {
    /// Index of the submesh this sub-entity draws
    pub fn index(&self) -> usize {
        self.index
    }

    /// Geometry drawn
    pub fn geometry(&self) -> GeometryBinding {
        self.geometry
    }

    /// Bone driving this part
    pub fn bone_index(&self) -> Option<usize> {
        self.bone_index
    }

    /// Bounds in mesh space
    pub fn local_bounds(&self) -> Aabb {
        self.local_bounds
    }

    /// Material slots
    pub fn materials(&self) -> &[SubEntityMaterial] {
        &self.materials
    }

    /// Whether the part is drawn
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show or hide the part
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// World matrix of the part: the entity's, after the bone matrix if any
    pub fn world_transform(&self, entity_world: &Mat4, bones: &[Mat4]) -> Mat4 {
        match self.bone_index.and_then(|i| bones.get(i)) {
            Some(bone) => entity_world * bone,
            None => *entity_world,
        }
    }
}

#[derive(Debug, Clone)]
struct DebugBox {
    material: MaterialId,
    local_transform: Mat4,
}

impl DebugBox {
    fn new(bounds: &Aabb, material: MaterialId) -> Self {
        Self {
            material,
            local_transform: Mat4::new_translation(&bounds.center())
                * Mat4::new_nonuniform_scaling(&bounds.extents()),
        }
    }
}

/// Instance of a mesh attached to the scene
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    mesh: MeshId,
    visible: bool,
    sub_entities: Vec<SubEntity>,
    bones: Vec<Mat4>,
    local_bounds: Option<Aabb>,
    cached_world_bounds: Option<Aabb>,
    debug_box: Option<DebugBox>,
}

impl Entity {
    /// Create an entity for a registered mesh
    pub fn new(name: impl Into<String>, mesh: MeshId, resources: &Resources) -> SceneResult<Self> {
        let mut entity = Self {
            name: name.into(),
            mesh,
            visible: true,
            sub_entities: Vec::new(),
            bones: Vec::new(),
            local_bounds: None,
            cached_world_bounds: None,
            debug_box: None,
        };
        entity.process_mesh(mesh, resources)?;
        Ok(entity)
    }

    /// Replace the mesh and rebuild every sub-entity
    pub fn set_mesh(&mut self, mesh: MeshId, resources: &Resources) -> SceneResult<()> {
        self.process_mesh(mesh, resources)
    }

    fn process_mesh(&mut self, mesh_id: MeshId, resources: &Resources) -> SceneResult<()> {
        let mesh = resources.meshes.get(mesh_id).ok_or(SceneError::MeshNotFound(mesh_id))?;

        self.sub_entities = mesh
            .submeshes
            .iter()
            .enumerate()
            .map(|(index, submesh)| SubEntity {
                index,
                geometry: submesh.geometry,
                bone_index: submesh.bone_index,
                local_bounds: submesh.bounds,
                materials: submesh
                    .material_slots
                    .iter()
                    .map(|&slot| SubEntityMaterial::new(slot, &resources.materials))
                    .collect(),
                visible: true,
            })
            .collect();
        self.bones = mesh.bones.clone();
        self.mesh = mesh_id;
        self.refresh_bounds();

        log::debug!("Entity '{}' built {} sub-entities", self.name, self.sub_entities.len());
        Ok(())
    }

    /// Mesh this entity draws
    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    /// Parts of the entity, one per submesh
    pub fn sub_entities(&self) -> &[SubEntity] {
        &self.sub_entities
    }

    /// One part by submesh index
    pub fn sub_entity(&self, index: usize) -> Option<&SubEntity> {
        self.sub_entities.get(index)
    }

    /// One part by submesh index, for modification
    pub fn sub_entity_mut(&mut self, index: usize) -> Option<&mut SubEntity> {
        self.sub_entities.get_mut(index)
    }

    /// Bone matrices copied from the mesh
    pub fn bones(&self) -> &[Mat4] {
        &self.bones
    }

    /// Replace a bone matrix
    ///
    /// The entity's bounds follow the new pose.
    pub fn set_bone(&mut self, index: usize, bone: Mat4) -> SceneResult<()> {
        let len = self.bones.len();
        let slot = self
            .bones
            .get_mut(index)
            .ok_or(SceneError::SubEntityOutOfRange { index, len })?;
        *slot = bone;
        self.refresh_bounds();
        Ok(())
    }

    /// Union of every part's bounds after its bone, under `world`
    pub fn posed_bounds(&self, world: &Mat4) -> Option<Aabb> {
        self.sub_entities.iter().fold(None, |acc, sub| {
            let transform = sub.world_transform(world, &self.bones);
            merge_optional(acc, sub.local_bounds.transformed(&transform))
        })
    }

    fn refresh_bounds(&mut self) {
        self.local_bounds = self.posed_bounds(&Mat4::identity());
        self.cached_world_bounds = None;
        self.debug_box = None;
    }

    /// Assign a material to one slot of one sub-entity
    pub fn set_sub_entity_material(
        &mut self,
        sub_entity: usize,
        slot: usize,
        material: Option<MaterialId>,
        materials: &MaterialLibrary,
    ) -> SceneResult<()> {
        let len = self.sub_entities.len();
        let sub = self
            .sub_entities
            .get_mut(sub_entity)
            .ok_or(SceneError::SubEntityOutOfRange { index: sub_entity, len })?;
        let len = sub.materials.len();
        sub.materials
            .get_mut(slot)
            .ok_or(SceneError::SubEntityOutOfRange { index: slot, len })?
            .set_material(material, materials)
    }

    /// Assign a material to every slot of every sub-entity
    ///
    /// Every slot is checked before any is changed, so a failure leaves the
    /// entity as it was.
    pub fn set_material(&mut self, material: Option<MaterialId>, materials: &MaterialLibrary) -> SceneResult<()> {
        for slot in self.sub_entities.iter().flat_map(|sub| &sub.materials) {
            slot.resolve(material, materials)?;
        }
        for sub in &mut self.sub_entities {
            for slot in &mut sub.materials {
                slot.set_material(material, materials)?;
            }
        }
        Ok(())
    }

    /// Camera-relative depth used for ordering: squared distance
    pub fn view_depth(&self, camera: &Camera, world_position: Vec3) -> f32 {
        (camera.world_position() - world_position).norm_squared()
    }

    fn submit_debug_box(&mut self, ctx: &MovableContext<'_>, queue: &mut RenderQueue, depth: f32) {
        let Some(bounds) = self.local_bounds else {
            return;
        };
        let debug = self
            .debug_box
            .get_or_insert_with(|| DebugBox::new(&bounds, ctx.resources.materials.debug_wireframe()));
        let Some(material) = ctx.resources.materials.get(debug.material) else {
            return;
        };
        let key = RenderQueueKey::new(material.sort_id(), false, depth);
        let world = ctx.world_transform * debug.local_transform;
        queue.add_renderable(
            key,
            Renderable::new(GeometryBinding::DEBUG_BOX, Some(debug.material), world).with_source(ctx.id),
        );
    }
}

impl Movable for Entity {
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
        self.local_bounds
    }

    fn world_bounds(&mut self, world: &Mat4) -> Option<Aabb> {
        if self.cached_world_bounds.is_none() {
            self.cached_world_bounds = self.posed_bounds(world);
        }
        self.cached_world_bounds
    }

    fn notify_moved(&mut self) {
        self.cached_world_bounds = None;
    }

    fn update_render_queue(
        &mut self,
        ctx: &MovableContext<'_>,
        queue: &mut RenderQueue,
        camera: &Camera,
    ) -> SceneResult<()> {
        let depth = self.view_depth(camera, ctx.world_position);

        for sub in &mut self.sub_entities {
            if !sub.visible {
                continue;
            }
            let world = sub.world_transform(&ctx.world_transform, &self.bones);
            for slot in &mut sub.materials {
                slot.refresh(&ctx.resources.materials);
                let mut key = slot.key;
                key.depth = depth;
                let renderable = Renderable::new(sub.geometry, slot.material, world).with_source(ctx.id);
                queue.add_renderable(key, renderable);
            }
        }

        if ctx.show_bounding_boxes {
            self.submit_debug_box(ctx, queue, depth);
        }
        Ok(())
    }
}

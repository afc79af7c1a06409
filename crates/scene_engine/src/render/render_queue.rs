//! # Render Queue System
//!
//! Collects the renderables produced by visibility culling for one frame
//! and orders them for submission.
//!
//! ## Architecture
//!
//! - **RenderQueue**: pooled element storage plus one group per
//!   [`RenderQueueGroupId`]
//! - **RenderQueueGroup**: a solid list and a transparent list
//! - **Instance batches**: solid renderables that share group, geometry and
//!   an instanceable material are merged into one entry
//!
//! Groups draw in ascending id order. Within a group solids sort by
//! material then front to back, transparents strictly back to front.
//! Elements are reused across frames; [`RenderQueue::reset`] releases them
//! without freeing the pool.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::config::RenderConfig;
use crate::foundation::collections::MaterialId;
use crate::render::renderable::Renderable;

/// Coarse draw-order bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum RenderQueueGroupId {
    /// Drawn first (skies, backdrops)
    Background,
    /// Regular scene geometry
    #[default]
    Default,
    /// Drawn last (debug helpers, UI in world space)
    Overlay,
    /// Number of real groups; never a bucket
    Count,
}

impl RenderQueueGroupId {
    /// Number of real groups
    pub const COUNT: usize = 3;

    /// Real groups in draw order
    pub const ALL: [RenderQueueGroupId; Self::COUNT] = [
        RenderQueueGroupId::Background,
        RenderQueueGroupId::Default,
        RenderQueueGroupId::Overlay,
    ];

    fn index(self) -> Option<usize> {
        match self {
            RenderQueueGroupId::Background => Some(0),
            RenderQueueGroupId::Default => Some(1),
            RenderQueueGroupId::Overlay => Some(2),
            RenderQueueGroupId::Count => None,
        }
    }
}

/// Ordering key of a queued renderable
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderQueueKey {
    /// Bucket the renderable is drawn in
    pub group: RenderQueueGroupId,
    /// Sort id of the material
    pub material: u32,
    /// Drawn with blending, sorted back to front
    pub transparent: bool,
    /// The material's active technique has an instanced variant
    pub instanced: bool,
    /// Camera-relative depth (squared distance)
    pub depth: f32,
}

impl RenderQueueKey {
    /// Key in the default group
    pub fn new(material: u32, transparent: bool, depth: f32) -> Self {
        Self {
            group: RenderQueueGroupId::Default,
            material,
            transparent,
            instanced: false,
            depth,
        }
    }

    /// Move the key into another group
    pub fn with_group(mut self, group: RenderQueueGroupId) -> Self {
        self.group = group;
        self
    }

    /// Mark the key as instanceable
    pub fn with_instancing(mut self, instanced: bool) -> Self {
        self.instanced = instanced;
        self
    }

    fn solid_order(&self, other: &Self) -> Ordering {
        self.material
            .cmp(&other.material)
            .then_with(|| self.depth.total_cmp(&other.depth))
    }
}

#[derive(Debug, Default)]
struct QueueElement {
    key: RenderQueueKey,
    renderable: Option<Renderable>,
}

impl QueueElement {
    fn release(&mut self) {
        self.key = RenderQueueKey::default();
        self.renderable = None;
    }
}

#[derive(Debug, Clone, Copy)]
enum SolidEntry {
    Single(usize),
    Batch(usize),
}

#[derive(Debug)]
struct InstanceBatch {
    key: RenderQueueKey,
    members: Vec<usize>,
}

type BatchKey = (RenderQueueGroupId, u32, MaterialId);

/// Solid and transparent lists of one group
#[derive(Debug, Default)]
pub struct RenderQueueGroup {
    solid: Vec<SolidEntry>,
    transparent: Vec<usize>,
}

impl RenderQueueGroup {
    fn clear(&mut self) {
        self.solid.clear();
        self.transparent.clear();
    }
}

/// A sorted unit of work handed to the rendering technique
#[derive(Debug)]
pub struct QueueItem<'a> {
    /// Key of the entry; for batches the nearest member's depth
    pub key: RenderQueueKey,
    /// One renderable, or every member of an instance batch
    pub renderables: Vec<&'a Renderable>,
    /// Whether the entry is an instance batch
    pub instanced: bool,
}

impl QueueItem<'_> {
    /// Material shared by every renderable of the item
    pub fn material(&self) -> Option<MaterialId> {
        self.renderables.first().and_then(|r| r.material)
    }
}

/// Per-frame collection of renderables
#[derive(Debug)]
pub struct RenderQueue {
    pool: Vec<QueueElement>,
    in_use: usize,
    groups: [RenderQueueGroup; RenderQueueGroupId::COUNT],
    instancing: bool,
    batches: Vec<InstanceBatch>,
    batch_index: HashMap<BatchKey, usize>,
    used_materials: BTreeSet<MaterialId>,
}

impl RenderQueue {
    /// Create an empty render queue with instancing enabled
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a render queue with pre-allocated pool elements
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: (0..capacity).map(|_| QueueElement::default()).collect(),
            in_use: 0,
            groups: Default::default(),
            instancing: true,
            batches: Vec::new(),
            batch_index: HashMap::new(),
            used_materials: BTreeSet::new(),
        }
    }

    /// Create a queue sized and configured from the render settings
    pub fn from_config(config: &RenderConfig) -> Self {
        let mut queue = Self::with_capacity(config.queue_capacity);
        queue.set_instancing(config.enable_instancing);
        queue
    }

    /// Enable or disable instance batching for subsequent submissions
    pub fn set_instancing(&mut self, enabled: bool) {
        self.instancing = enabled;
    }

    /// Whether instance batching is enabled
    pub fn instancing_enabled(&self) -> bool {
        self.instancing
    }

    /// Add a renderable to the queue
    ///
    /// Lands in exactly one list of exactly one group: the transparent list,
    /// an instance batch in the solid list, or the solid list directly.
    pub fn add_renderable(&mut self, key: RenderQueueKey, renderable: Renderable) {
        let mut key = key;
        let group_index = match key.group.index() {
            Some(index) => index,
            None => {
                log::warn!("Renderable submitted to the Count sentinel group, using Default");
                key.group = RenderQueueGroupId::Default;
                1
            }
        };

        let material = renderable.material;
        let geometry = renderable.geometry.id;
        if let Some(material) = material {
            self.used_materials.insert(material);
        }
        let index = self.acquire(key, renderable);
        let group = &mut self.groups[group_index];

        if key.transparent {
            group.transparent.push(index);
            return;
        }

        match material {
            Some(material) if self.instancing && key.instanced => {
                let batch_key = (key.group, geometry, material);
                match self.batch_index.get(&batch_key) {
                    Some(&batch) => {
                        let batch = &mut self.batches[batch];
                        batch.members.push(index);
                        if key.depth < batch.key.depth {
                            batch.key.depth = key.depth;
                        }
                    }
                    None => {
                        let batch = self.batches.len();
                        self.batches.push(InstanceBatch { key, members: vec![index] });
                        self.batch_index.insert(batch_key, batch);
                        group.solid.push(SolidEntry::Batch(batch));
                    }
                }
            }
            _ => group.solid.push(SolidEntry::Single(index)),
        }
    }

    /// Order every group for drawing
    pub fn sort(&mut self) {
        let Self { pool, groups, batches, .. } = self;
        let solid_key = |entry: &SolidEntry| match *entry {
            SolidEntry::Single(index) => pool[index].key,
            SolidEntry::Batch(batch) => batches[batch].key,
        };

        for group in groups.iter_mut() {
            group.solid.sort_by(|a, b| solid_key(a).solid_order(&solid_key(b)));
            group
                .transparent
                .sort_by(|&a, &b| pool[b].key.depth.total_cmp(&pool[a].key.depth));
        }
    }

    /// Entries in draw order: groups ascending, solids before transparents
    ///
    /// Reflects the order of the last [`RenderQueue::sort`].
    pub fn sorted_items(&self) -> Vec<QueueItem<'_>> {
        let mut items = Vec::with_capacity(self.in_use);
        for group in &self.groups {
            for entry in &group.solid {
                match *entry {
                    SolidEntry::Single(index) => items.extend(self.single(index)),
                    SolidEntry::Batch(batch) => {
                        let batch = &self.batches[batch];
                        let renderables: Vec<&Renderable> = batch
                            .members
                            .iter()
                            .filter_map(|&i| self.pool[i].renderable.as_ref())
                            .collect();
                        items.push(QueueItem {
                            key: batch.key,
                            renderables,
                            instanced: true,
                        });
                    }
                }
            }
            for &index in &group.transparent {
                items.extend(self.single(index));
            }
        }
        items
    }

    /// Release every element and clear all per-frame tracking
    pub fn reset(&mut self) {
        for element in &mut self.pool[..self.in_use] {
            element.release();
        }
        self.in_use = 0;
        for group in &mut self.groups {
            group.clear();
        }
        self.batches.clear();
        self.batch_index.clear();
        self.used_materials.clear();
    }

    /// Number of queued renderables
    pub fn len(&self) -> usize {
        self.in_use
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    /// Number of solid renderables in a group, batch members included
    pub fn solid_count(&self, group: RenderQueueGroupId) -> usize {
        group.index().map_or(0, |i| {
            self.groups[i]
                .solid
                .iter()
                .map(|entry| match *entry {
                    SolidEntry::Single(_) => 1,
                    SolidEntry::Batch(batch) => self.batches[batch].members.len(),
                })
                .sum()
        })
    }

    /// Number of transparent renderables in a group
    pub fn transparent_count(&self, group: RenderQueueGroupId) -> usize {
        group.index().map_or(0, |i| self.groups[i].transparent.len())
    }

    /// Number of instance batches formed this frame
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Number of elements held by the pool, in use or not
    pub fn pool_capacity(&self) -> usize {
        self.pool.len()
    }

    /// Materials referenced by queued renderables
    pub fn used_materials(&self) -> impl Iterator<Item = MaterialId> + '_ {
        self.used_materials.iter().copied()
    }

    fn acquire(&mut self, key: RenderQueueKey, renderable: Renderable) -> usize {
        let index = self.in_use;
        if index == self.pool.len() {
            self.pool.push(QueueElement::default());
        }
        let element = &mut self.pool[index];
        element.key = key;
        element.renderable = Some(renderable);
        self.in_use += 1;
        index
    }

    fn single(&self, index: usize) -> Option<QueueItem<'_>> {
        let element = &self.pool[index];
        element.renderable.as_ref().map(|renderable| QueueItem {
            key: element.key,
            renderables: vec![renderable],
            instanced: false,
        })
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

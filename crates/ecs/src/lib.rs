//! Minimal deterministic component model.
//!
//! Components are stored in BTreeMap for deterministic iteration order.
//! Each component type has its own storage keyed by EntityId and is reached
//! through the [`Component`] capability trait, so callers can ask
//! `store.has::<Camera>(id)` without knowing the storage layout.
//!
//! # Invariants
//! - All component mutations produce events.
//! - Iteration order is deterministic (BTreeMap).
//! - Inserting a component registers the entity if it was not spawned yet.

use glam::Vec3;
use prism_common::{Color, EntityId, Mesh, RendererType, Transform};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Human-readable name component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name(pub String);

/// Camera component: projection parameters plus the technique used to draw
/// what it sees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub background: Color,
    pub renderer: RendererType,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov: 60.0,
            near: 0.1,
            far: 1000.0,
            background: Color::SLATE,
            renderer: RendererType::Forward,
        }
    }
}

impl Camera {
    pub fn with_renderer(renderer: RendererType) -> Self {
        Self {
            renderer,
            ..Self::default()
        }
    }
}

/// Mesh filter component: shared reference to a mesh asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshFilter {
    pub mesh: Arc<Mesh>,
}

impl MeshFilter {
    pub fn new(mesh: Arc<Mesh>) -> Self {
        Self { mesh }
    }
}

/// Discriminates component storages in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Name,
    Transform,
    Camera,
    MeshFilter,
}

/// Events produced by component mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentEvent {
    Spawned { entity: EntityId },
    Despawned { entity: EntityId },
    Added { entity: EntityId, kind: ComponentKind },
    Updated { entity: EntityId, kind: ComponentKind },
    Removed { entity: EntityId, kind: ComponentKind },
}

impl ComponentEvent {
    pub fn entity(&self) -> EntityId {
        match self {
            Self::Spawned { entity }
            | Self::Despawned { entity }
            | Self::Added { entity, .. }
            | Self::Updated { entity, .. }
            | Self::Removed { entity, .. } => *entity,
        }
    }
}

/// Capability trait: a type that has a storage slot in [`ComponentStore`].
pub trait Component: Sized + 'static {
    const KIND: ComponentKind;

    fn storage(store: &ComponentStore) -> &BTreeMap<EntityId, Self>;
    fn storage_mut(store: &mut ComponentStore) -> &mut BTreeMap<EntityId, Self>;
}

macro_rules! impl_component {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Component for $ty {
            const KIND: ComponentKind = ComponentKind::$kind;

            fn storage(store: &ComponentStore) -> &BTreeMap<EntityId, Self> {
                &store.$field
            }

            fn storage_mut(store: &mut ComponentStore) -> &mut BTreeMap<EntityId, Self> {
                &mut store.$field
            }
        }
    };
}

impl_component!(Name, Name, names);
impl_component!(Transform, Transform, transforms);
impl_component!(Camera, Camera, cameras);
impl_component!(MeshFilter, MeshFilter, mesh_filters);

/// Deterministic component storage for all component types.
///
/// Uses BTreeMap for canonical iteration order. All mutations produce events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentStore {
    entities: BTreeSet<EntityId>,
    names: BTreeMap<EntityId, Name>,
    transforms: BTreeMap<EntityId, Transform>,
    cameras: BTreeMap<EntityId, Camera>,
    mesh_filters: BTreeMap<EntityId, MeshFilter>,
    #[serde(skip)]
    events: Vec<ComponentEvent>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return all pending component events.
    pub fn drain_events(&mut self) -> Vec<ComponentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Read-only access to pending events.
    pub fn events(&self) -> &[ComponentEvent] {
        &self.events
    }

    /// Create a new, component-less entity.
    pub fn spawn(&mut self) -> EntityId {
        let entity = EntityId::new();
        self.register(entity);
        entity
    }

    /// Remove an entity and every component attached to it.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        if !self.entities.contains(&entity) {
            return false;
        }
        self.remove::<Name>(entity);
        self.remove::<Transform>(entity);
        self.remove::<Camera>(entity);
        self.remove::<MeshFilter>(entity);
        self.entities.remove(&entity);
        self.events.push(ComponentEvent::Despawned { entity });
        true
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All entity ids in canonical order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    /// Attach or replace a component. Returns the previous value, if any.
    pub fn insert<T: Component>(&mut self, entity: EntityId, component: T) -> Option<T> {
        self.register(entity);
        let old = T::storage_mut(self).insert(entity, component);
        let event = if old.is_some() {
            ComponentEvent::Updated {
                entity,
                kind: T::KIND,
            }
        } else {
            ComponentEvent::Added {
                entity,
                kind: T::KIND,
            }
        };
        self.events.push(event);
        old
    }

    pub fn remove<T: Component>(&mut self, entity: EntityId) -> Option<T> {
        let removed = T::storage_mut(self).remove(&entity);
        if removed.is_some() {
            self.events.push(ComponentEvent::Removed {
                entity,
                kind: T::KIND,
            });
        }
        removed
    }

    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        T::storage(self).contains_key(&entity)
    }

    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        T::storage(self).get(&entity)
    }

    /// Mutable access for host systems. Does not produce an event.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        T::storage_mut(self).get_mut(&entity)
    }

    /// Iterate one component type in canonical entity order.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        T::storage(self).iter().map(|(id, c)| (*id, c))
    }

    // --- Convenience spawners ---

    /// Spawn an entity with a Transform and a Camera.
    pub fn spawn_camera(&mut self, position: Vec3, camera: Camera) -> EntityId {
        let entity = self.spawn();
        self.insert(entity, Transform::from_position(position));
        self.insert(entity, camera);
        entity
    }

    /// Spawn an entity with a Transform and a MeshFilter.
    pub fn spawn_mesh(&mut self, transform: Transform, mesh: Arc<Mesh>) -> EntityId {
        let entity = self.spawn();
        self.insert(entity, transform);
        self.insert(entity, MeshFilter::new(mesh));
        entity
    }

    fn register(&mut self, entity: EntityId) {
        if self.entities.insert(entity) {
            tracing::trace!(?entity, "entity registered");
            self.events.push(ComponentEvent::Spawned { entity });
        }
    }
}

pub fn crate_info() -> &'static str {
    "prism-ecs v0.1.0"
}

//! Entity and component storage
//!
//! An arena of generational slots plus one sparse-set table per component
//! type. Lookups check the handle's generation on every access, so a
//! handle to a destroyed entity always reports "not found" rather than
//! reaching the slot's new occupant.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;

use super::Entity;
use super::components::Meta;

/// Marker bound for component types stored in a table.
pub trait Component: 'static {}

impl<T: 'static> Component for T {}

/// Errors surfaced by store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The entity handle does not resolve to a live entity.
    NotFound(Entity),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(e) => write!(f, "entity {e} is not alive"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Sparse-set storage for one component type.
///
/// `sparse` maps entity index to a position in the dense arrays; removal
/// swap-pops, so iteration order is not creation order.
struct Table<T> {
    sparse: Vec<Option<u32>>,
    dense: Vec<T>,
    entities: Vec<Entity>,
}

impl<T> Table<T> {
    fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            entities: Vec::new(),
        }
    }

    fn insert(&mut self, entity: Entity, component: T) {
        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, None);
        }
        match self.sparse[index] {
            Some(pos) => {
                // Replace in place, keeping the dense position stable.
                self.dense[pos as usize] = component;
                self.entities[pos as usize] = entity;
            }
            None => {
                self.sparse[index] = Some(self.dense.len() as u32);
                self.dense.push(component);
                self.entities.push(entity);
            }
        }
    }

    fn get(&self, entity: Entity) -> Option<&T> {
        let pos = self.position(entity)?;
        Some(&self.dense[pos])
    }

    fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let pos = self.position(entity)?;
        Some(&mut self.dense[pos])
    }

    fn position(&self, entity: Entity) -> Option<usize> {
        let pos = (*self.sparse.get(entity.index() as usize)?)? as usize;
        // The slot may have been recycled; the dense side knows the owner.
        if self.entities[pos] == entity {
            Some(pos)
        } else {
            None
        }
    }

    fn take(&mut self, entity: Entity) -> Option<T> {
        let pos = self.position(entity)?;
        self.sparse[entity.index() as usize] = None;
        let last = self.dense.len() - 1;
        if pos != last {
            let moved = self.entities[last];
            self.sparse[moved.index() as usize] = Some(pos as u32);
        }
        self.entities.swap_remove(pos);
        Some(self.dense.swap_remove(pos))
    }
}

/// Type-erased view of a table, so the store can strip an entity from
/// every table on destroy without knowing the component types.
trait ComponentColumn {
    fn remove_entity(&mut self, entity: Entity);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ComponentColumn for Table<T> {
    fn remove_entity(&mut self, entity: Entity) {
        let _ = self.take(entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All entities and their components.
pub struct EntityStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alive: usize,
    tables: FxHashMap<TypeId, Box<dyn ComponentColumn>>,
}

impl EntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            alive: 0,
            tables: FxHashMap::default(),
        }
    }

    /// Create an entity with a [`Meta`] component carrying `name`.
    pub fn create(&mut self, name: impl Into<String>) -> Entity {
        let entity = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.alive = true;
                Entity::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    alive: true,
                });
                Entity::new(index, 0)
            }
        };
        self.alive += 1;
        self.insert(entity, Meta::new(name))
            .unwrap_or_else(|_| unreachable!("freshly created entity is alive"));
        log::trace!("created entity {entity}");
        entity
    }

    /// Destroy an entity, releasing all of its components immediately.
    ///
    /// Returns false if the handle was already dead; destroying twice is
    /// a no-op. The slot's generation is bumped so outstanding handles
    /// become invalid.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.contains(entity) {
            return false;
        }
        for table in self.tables.values_mut() {
            table.remove_entity(entity);
        }
        let slot = &mut self.slots[entity.index() as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.index());
        self.alive -= 1;
        log::trace!("destroyed entity {entity}");
        true
    }

    /// Check whether the handle resolves to a live entity.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index() as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation())
    }

    /// Attach a component, replacing any existing one of the same type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the entity is not alive.
    pub fn insert<T: Component>(&mut self, entity: Entity, component: T) -> Result<(), StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::NotFound(entity));
        }
        self.table_mut::<T>().insert(entity, component);
        Ok(())
    }

    /// Get a component, or `None` if the entity is dead or lacks it.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.contains(entity) {
            return None;
        }
        self.table::<T>()?.get(entity)
    }

    /// Mutable variant of [`EntityStore::get`].
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.contains(entity) {
            return None;
        }
        self.tables
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<Table<T>>()?
            .get_mut(entity)
    }

    /// Check for a component without fetching it.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.get::<T>(entity).is_some()
    }

    /// Detach and return a component, `None` if absent.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        if !self.contains(entity) {
            return None;
        }
        self.tables
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<Table<T>>()?
            .take(entity)
    }

    /// Iterate all live `(entity, component)` pairs of one type.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.table::<T>()
            .into_iter()
            .flat_map(|table| table.entities.iter().copied().zip(table.dense.iter()))
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Whether no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Destroy every entity.
    pub fn clear(&mut self) {
        let all: Vec<Entity> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| Entity::new(index as u32, slot.generation))
            .collect();
        for entity in all {
            self.destroy(entity);
        }
    }

    fn table<T: Component>(&self) -> Option<&Table<T>> {
        self.tables
            .get(&TypeId::of::<T>())?
            .as_any()
            .downcast_ref::<Table<T>>()
    }

    fn table_mut<T: Component>(&mut self) -> &mut Table<T> {
        self.tables
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Table::<T>::new()))
            .as_any_mut()
            .downcast_mut::<Table<T>>()
            .unwrap_or_else(|| unreachable!("table registered under its own TypeId"))
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

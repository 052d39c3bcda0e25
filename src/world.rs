// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World: central entity and archetype storage

use std::any::TypeId;
use std::cell::RefCell;
use std::sync::Arc;

use ahash::AHashMap;
use slotmap::SlotMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::Archetype;
use crate::component::{Bundle, Component};
use crate::entity::{EntityId, EntityLocation};
use crate::error::{EcsError, Result};
use crate::expr::{Match, Signature, Target, TypeExpression};
use crate::lock::{StructuralLock, WorldLock};
use crate::query::{CachedQueryResult, Query, QueryMask, StreamSet};

/// Index of the empty archetype bootstrapped at world creation
const EMPTY_ARCHETYPE: usize = 0;

/// Central ECS world
///
/// Holds the entity directory, every archetype, the transition cache between
/// archetypes, and the structural lock serializing graph mutation against
/// iteration.
pub struct World {
    /// Entity directory: the authoritative archetype/row per live entity
    entity_locations: SlotMap<EntityId, EntityLocation>,

    /// All archetypes in the world; never removed, may sit empty for reuse
    archetypes: Vec<Archetype>,

    /// Maps signatures to archetype indices
    archetype_index: AHashMap<Signature, usize>,

    /// Cache for archetype transitions when adding/removing a column key
    /// (source archetype, expression, added?) -> destination archetype
    transitions: AHashMap<(usize, TypeExpression, bool), usize>,

    /// Query result cache to avoid O(n) archetype scanning per iteration
    query_cache: RefCell<AHashMap<QueryMask, CachedQueryResult>>,

    /// Deferred removal queue for safe entity deletion around iteration
    removal_queue: Vec<EntityId>,

    /// Single-writer/many-reader lock over the archetype graph and directory
    lock: Arc<StructuralLock>,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        let mut world = Self {
            entity_locations: SlotMap::with_key(),

            // Start with reasonable defaults to avoid resize spikes
            archetypes: Vec::with_capacity(64),
            archetype_index: AHashMap::with_capacity(64),
            transitions: AHashMap::with_capacity(128),
            query_cache: RefCell::new(AHashMap::with_capacity(32)),
            removal_queue: Vec::new(),
            lock: Arc::new(StructuralLock::new()),
        };

        // Bootstrap the empty archetype (entities with no components).
        // It is always at index 0 and simplifies spawn logic elsewhere.
        world.get_or_create_archetype_with(&Signature::new(), |_| {});
        world
    }

    // ========== Entity Lifecycle ==========

    /// Spawn an entity with no components
    ///
    /// # Panics
    /// Panics when called while an iteration guard is held.
    pub fn spawn(&mut self) -> EntityId {
        let lock = self.lock.clone();
        let _guard = lock
            .write()
            .expect("spawn while an iteration lock is held");

        let entity = self.entity_locations.insert(EntityLocation {
            archetype_id: EMPTY_ARCHETYPE,
            archetype_row: 0,
        });
        let row = self.archetypes[EMPTY_ARCHETYPE].push_entity(entity);
        self.entity_locations[entity].archetype_row = row;
        entity
    }

    /// Spawn an entity with a bundle of plain components
    ///
    /// # Panics
    /// Panics when called while an iteration guard is held.
    pub fn spawn_with<B: Bundle>(&mut self, bundle: B) -> EntityId {
        let lock = self.lock.clone();
        let _guard = lock
            .write()
            .expect("spawn while an iteration lock is held");

        let exprs = B::type_exprs();
        #[cfg(feature = "profiling")]
        let span = info_span!(
            "world.spawn",
            bundle_components = exprs.len(),
            archetype_count = self.archetypes.len()
        );
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let signature = Signature::from_exprs(exprs.iter().copied());
        debug_assert_eq!(
            signature.len(),
            exprs.len(),
            "bundle component types must be distinct"
        );

        let archetype_id =
            self.get_or_create_archetype_with(&signature, |arch| B::register_columns(arch));

        let entity = self.entity_locations.insert(EntityLocation {
            archetype_id,
            archetype_row: 0,
        });
        let archetype = &mut self.archetypes[archetype_id];
        let row = archetype.push_entity(entity);
        bundle.push_components(archetype);
        #[cfg(debug_assertions)]
        archetype.debug_assert_coherent();

        self.entity_locations[entity].archetype_row = row;
        entity
    }

    /// Spawn multiple entities with the same bundle type in one batch
    ///
    /// Cheaper than repeated `spawn_with`: one archetype lookup, one lock.
    ///
    /// # Panics
    /// Panics when called while an iteration guard is held.
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> Vec<EntityId>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
    {
        let lock = self.lock.clone();
        let _guard = lock
            .write()
            .expect("spawn while an iteration lock is held");

        let exprs = B::type_exprs();
        let signature = Signature::from_exprs(exprs.iter().copied());
        let archetype_id =
            self.get_or_create_archetype_with(&signature, |arch| B::register_columns(arch));

        let mut ids = Vec::new();
        for bundle in bundles {
            let entity = self.entity_locations.insert(EntityLocation {
                archetype_id,
                archetype_row: 0,
            });
            let archetype = &mut self.archetypes[archetype_id];
            let row = archetype.push_entity(entity);
            bundle.push_components(archetype);
            self.entity_locations[entity].archetype_row = row;
            ids.push(entity);
        }
        ids
    }

    /// Despawn entity immediately
    ///
    /// Removes the entity and all its components. Relation columns on other
    /// entities that target the despawned one are left in place; resolving
    /// such a target later yields a dead entity.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        let lock = self.lock.clone();
        let _guard = lock.write()?;

        let location = self
            .entity_locations
            .remove(entity)
            .ok_or(EcsError::EntityNotAlive)?;
        let archetype = &mut self.archetypes[location.archetype_id];
        if let Some(swapped) = archetype.remove_row(location.archetype_row) {
            if let Some(loc) = self.entity_locations.get_mut(swapped) {
                loc.archetype_row = location.archetype_row;
            }
        }
        Ok(())
    }

    /// Despawn entity (deferred - queued for removal)
    ///
    /// Call `flush_removals()` after iteration to process the queue.
    pub fn despawn_deferred(&mut self, entity: EntityId) -> Result<()> {
        if !self.entity_locations.contains_key(entity) {
            return Err(EcsError::EntityNotAlive);
        }
        self.removal_queue.push(entity);
        Ok(())
    }

    /// Flush deferred removal queue
    ///
    /// Duplicates and entities already removed since queuing are skipped.
    pub fn flush_removals(&mut self) -> Result<()> {
        let to_remove: Vec<_> = self.removal_queue.drain(..).collect();
        for entity in to_remove {
            if self.entity_locations.contains_key(entity) {
                self.despawn(entity)?;
            }
        }
        Ok(())
    }

    /// Check if an entity is alive
    ///
    /// A handle from a previous occupancy of the slot (older generation)
    /// is not alive.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entity_locations.contains_key(entity)
    }

    /// Get entity location
    pub fn entity_location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entity_locations.get(entity).copied()
    }

    /// Signature of the entity's current archetype
    pub fn signature_of(&self, entity: EntityId) -> Result<&Signature> {
        let location = self
            .entity_locations
            .get(entity)
            .ok_or(EcsError::EntityNotAlive)?;
        Ok(self.archetypes[location.archetype_id].signature())
    }

    // ========== Component Operations ==========

    /// Add a component keyed by `(T, target)` to an entity
    ///
    /// When the entity already has the column, the stored value is
    /// overwritten in place and no migration happens. Otherwise the entity
    /// moves to the archetype whose signature adds the key, creating it on
    /// first use.
    pub fn add_component<T: Component>(
        &mut self,
        entity: EntityId,
        target: Target,
        value: T,
    ) -> Result<()> {
        let lock = self.lock.clone();
        let _guard = lock.write()?;

        let location = self
            .entity_locations
            .get(entity)
            .copied()
            .ok_or(EcsError::EntityNotAlive)?;
        let expr = TypeExpression::of::<T>(target);

        #[cfg(feature = "profiling")]
        let span = info_span!("world.add_component", archetype = location.archetype_id);
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        // Overwrite when the column already exists.
        if let Some(idx) = self.archetypes[location.archetype_id].column_index(&expr) {
            let column = self.archetypes[location.archetype_id]
                .column_mut_typed_by_index::<T>(idx)
                .expect("column keyed by component type");
            column.store(location.archetype_row, value);
            return Ok(());
        }

        let dst_id = match self
            .transitions
            .get(&(location.archetype_id, expr, true))
            .copied()
        {
            Some(id) => id,
            None => {
                // Replicate the source columns empty, plus the new one.
                let src = &self.archetypes[location.archetype_id];
                let new_signature = src.signature().with(expr);
                let mut carried = Vec::with_capacity(src.column_exprs().len());
                for (idx, &col_expr) in src.column_exprs().iter().enumerate() {
                    let column = src.column(idx).expect("column index in range");
                    carried.push((col_expr, column.clone_empty()));
                }
                let id = self.get_or_create_archetype_with(&new_signature, |arch| {
                    for (col_expr, column) in carried {
                        arch.add_column_raw(col_expr, column);
                    }
                    arch.register_column::<T>(target);
                });
                self.transitions
                    .insert((location.archetype_id, expr, true), id);
                id
            }
        };

        self.move_entity(entity, location, dst_id, |arch| {
            arch.column_mut_typed::<T>(target)
                .expect("destination has the added column")
                .push(value);
        })
    }

    /// Remove the component keyed by `(T, target)` from an entity
    pub fn remove_component<T: Component>(&mut self, entity: EntityId, target: Target) -> Result<()> {
        let lock = self.lock.clone();
        let _guard = lock.write()?;

        let location = self
            .entity_locations
            .get(entity)
            .copied()
            .ok_or(EcsError::EntityNotAlive)?;
        let expr = TypeExpression::of::<T>(target);

        #[cfg(feature = "profiling")]
        let span = info_span!("world.remove_component", archetype = location.archetype_id);
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        if self.archetypes[location.archetype_id]
            .column_index(&expr)
            .is_none()
        {
            return Err(EcsError::ComponentNotFound);
        }

        let dst_id = match self
            .transitions
            .get(&(location.archetype_id, expr, false))
            .copied()
        {
            Some(id) => id,
            None => {
                let src = &self.archetypes[location.archetype_id];
                let new_signature = src.signature().without(&expr);
                let mut carried = Vec::with_capacity(src.column_exprs().len());
                for (idx, &col_expr) in src.column_exprs().iter().enumerate() {
                    if col_expr == expr {
                        continue;
                    }
                    let column = src.column(idx).expect("column index in range");
                    carried.push((col_expr, column.clone_empty()));
                }
                let id = self.get_or_create_archetype_with(&new_signature, |arch| {
                    for (col_expr, column) in carried {
                        arch.add_column_raw(col_expr, column);
                    }
                });
                self.transitions
                    .insert((location.archetype_id, expr, false), id);
                id
            }
        };

        self.move_entity(entity, location, dst_id, |_| {})
    }

    /// Check if the entity has a column matching `(T, matcher)`
    ///
    /// Wildcards are valid here.
    pub fn has_component<T: Component>(&self, entity: EntityId, matcher: Match) -> bool {
        self.entity_locations
            .get(entity)
            .and_then(|loc| self.archetypes.get(loc.archetype_id))
            .map(|arch| arch.has_matching(TypeId::of::<T>(), &matcher))
            .unwrap_or(false)
    }

    /// Get immutable reference to the first column matching `(T, matcher)`
    pub fn get_component<T: Component>(&self, entity: EntityId, matcher: Match) -> Result<&T> {
        let location = self
            .entity_locations
            .get(entity)
            .ok_or(EcsError::EntityNotAlive)?;
        let archetype = &self.archetypes[location.archetype_id];
        let columns = archetype.matching_columns(TypeId::of::<T>(), &matcher);
        let idx = columns.first().copied().ok_or(EcsError::ComponentNotFound)?;
        archetype
            .column_typed_by_index::<T>(idx)
            .and_then(|col| col.get(location.archetype_row))
            .ok_or(EcsError::ComponentNotFound)
    }

    /// Get mutable reference to the first column matching `(T, matcher)`
    pub fn get_component_mut<T: Component>(
        &mut self,
        entity: EntityId,
        matcher: Match,
    ) -> Result<&mut T> {
        let location = self
            .entity_locations
            .get(entity)
            .copied()
            .ok_or(EcsError::EntityNotAlive)?;
        let archetype = &mut self.archetypes[location.archetype_id];
        let columns = archetype.matching_columns(TypeId::of::<T>(), &matcher);
        let idx = columns.first().copied().ok_or(EcsError::ComponentNotFound)?;
        archetype
            .column_mut_typed_by_index::<T>(idx)
            .and_then(|col| col.get_mut(location.archetype_row))
            .ok_or(EcsError::ComponentNotFound)
    }

    /// Get the matching component, adding a defaulted one when absent
    ///
    /// The matcher must name a specific target when the component has to be
    /// created; a wildcard with no existing match fails with `InvalidMatch`.
    pub fn get_or_create_component<T: Component + Default>(
        &mut self,
        entity: EntityId,
        matcher: Match,
    ) -> Result<&mut T> {
        if !self.entity_locations.contains_key(entity) {
            return Err(EcsError::EntityNotAlive);
        }
        if !self.has_component::<T>(entity, matcher) {
            let target = matcher.to_target().ok_or(EcsError::InvalidMatch)?;
            self.add_component::<T>(entity, target, T::default())?;
        }
        self.get_component_mut::<T>(entity, matcher)
    }

    // ========== Archetype Access ==========

    /// Get archetype by ID
    pub fn archetype(&self, id: usize) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Get archetype mutably
    pub(crate) fn archetype_mut(&mut self, id: usize) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id)
    }

    /// Get all archetypes
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entity_locations.len()
    }

    // ========== Queries and Locking ==========

    /// Build a query over the given stream tuple, all streams matching plain
    /// columns until adjusted
    pub fn query<'w, S: StreamSet<'w>>(&'w mut self) -> Query<'w, S> {
        Query::new(self)
    }

    /// Scoped read guard over the structure
    ///
    /// While the guard lives, component references resolved from the world
    /// stay valid; structural mutation is rejected.
    pub fn lock(&self) -> WorldLock<'_> {
        WorldLock::new(&self.lock)
    }

    pub(crate) fn structural_handle(&self) -> Arc<StructuralLock> {
        self.lock.clone()
    }

    /// Get or update cached matches for a query mask
    ///
    /// Incremental: only archetypes created since the last call are tested,
    /// so a mask once satisfied by a signature keeps matching it.
    pub(crate) fn matched_archetypes(&self, mask: &QueryMask) -> Vec<usize> {
        let mut cache = self.query_cache.borrow_mut();
        if let Some(cached) = cache.get_mut(mask) {
            cached.update(&self.archetypes);
            return cached.matches.clone();
        }
        let cached = CachedQueryResult::new(mask.clone(), &self.archetypes);
        let matches = cached.matches.clone();
        cache.insert(mask.clone(), cached);
        matches
    }

    // ========== Internal ==========

    /// Get or create archetype for a signature, running `on_create` only on
    /// first creation
    fn get_or_create_archetype_with<F>(&mut self, signature: &Signature, on_create: F) -> usize
    where
        F: FnOnce(&mut Archetype),
    {
        if let Some(&id) = self.archetype_index.get(signature) {
            return id;
        }

        let mut archetype = Archetype::new(signature.clone());
        on_create(&mut archetype);

        // Push first so the index never refers to a missing archetype.
        self.archetypes.push(archetype);
        let id = self.archetypes.len() - 1;
        self.archetype_index.insert(signature.clone(), id);
        id
    }

    /// Move entity between archetypes, fixing up directory entries
    fn move_entity<F>(
        &mut self,
        entity: EntityId,
        old_loc: EntityLocation,
        dst_id: usize,
        write_new: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Archetype),
    {
        if old_loc.archetype_id == dst_id {
            return Ok(());
        }

        // Access both archetypes safely using split_at_mut.
        let (src, dst) = if old_loc.archetype_id < dst_id {
            let (left, right) = self.archetypes.split_at_mut(dst_id);
            (&mut left[old_loc.archetype_id], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(old_loc.archetype_id);
            (&mut right[0], &mut left[dst_id])
        };

        let (new_row, swapped) = src.migrate_row(old_loc.archetype_row, dst)?;
        write_new(dst);
        #[cfg(debug_assertions)]
        dst.debug_assert_coherent();

        if let Some(swapped_entity) = swapped {
            if let Some(loc) = self.entity_locations.get_mut(swapped_entity) {
                loc.archetype_row = old_loc.archetype_row;
            }
        }
        if let Some(loc) = self.entity_locations.get_mut(entity) {
            *loc = EntityLocation {
                archetype_id: dst_id,
                archetype_row: new_row,
            };
        }
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

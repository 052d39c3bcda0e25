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

//! Archetype storage with row allocation, removal and migration
//!
//! An archetype holds every entity whose column-key set equals its signature:
//! one entity-id column plus one typed column per expression. Note that the
//! target is part of the key, so entities related to different targets land in
//! different archetypes; fine-grained relations therefore produce many small
//! archetypes. That cost buys allocation-free iteration within each one.

use std::any::{Any, TypeId};
use std::ptr::NonNull;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::component::Component;
use crate::entity::EntityId;
use crate::error::Result;
use crate::expr::{Match, Signature, Target, TypeExpression};
use crate::storage::{Column, TypedColumn};

/// Archetype: Structure of Arrays storage
pub struct Archetype {
    signature: Signature,
    entities: Vec<EntityId>,
    columns: Vec<Box<dyn Column>>,
    column_exprs: Vec<TypeExpression>,
    column_indices: FxHashMap<TypeExpression, usize>,
}

impl Archetype {
    /// Create new archetype; columns are registered separately
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            entities: Vec::new(),
            columns: Vec::new(),
            column_exprs: Vec::new(),
            column_indices: FxHashMap::default(),
        }
    }

    /// Get signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get all entities
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Entity occupying `row`
    pub fn entity_at(&self, row: usize) -> Option<EntityId> {
        self.entities.get(row).copied()
    }

    /// Register a typed column for `(T, target)` if absent
    pub fn register_column<T: Component>(&mut self, target: Target) {
        let expr = TypeExpression::of::<T>(target);
        if !self.column_indices.contains_key(&expr) {
            self.push_column(expr, Box::new(TypedColumn::<T>::new()));
        }
    }

    /// Attach a pre-built (empty) column under the given key
    pub(crate) fn add_column_raw(&mut self, expr: TypeExpression, column: Box<dyn Column>) {
        if !self.column_indices.contains_key(&expr) {
            self.push_column(expr, column);
        }
    }

    fn push_column(&mut self, expr: TypeExpression, column: Box<dyn Column>) {
        let idx = self.columns.len();
        self.columns.push(column);
        self.column_exprs.push(expr);
        self.column_indices.insert(expr, idx);
    }

    /// Column index for an exact key
    pub fn column_index(&self, expr: &TypeExpression) -> Option<usize> {
        self.column_indices.get(expr).copied()
    }

    /// Indices of every column accepted by `(type_id, matcher)`
    ///
    /// Wildcard matchers can select several columns of the same component
    /// type; the order follows column registration order.
    pub fn matching_columns(&self, type_id: TypeId, matcher: &Match) -> SmallVec<[usize; 4]> {
        self.column_exprs
            .iter()
            .enumerate()
            .filter(|(_, expr)| expr.matches(type_id, matcher))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Does any column match `(type_id, matcher)`?
    pub fn has_matching(&self, type_id: TypeId, matcher: &Match) -> bool {
        self.signature.matches(type_id, matcher)
    }

    /// Column keys in registration order
    pub(crate) fn column_exprs(&self) -> &[TypeExpression] {
        &self.column_exprs
    }

    /// Get column by index
    pub fn column(&self, index: usize) -> Option<&dyn Column> {
        self.columns.get(index).map(|c| c.as_ref())
    }

    /// Get column mutably by index
    pub fn column_mut(&mut self, index: usize) -> Option<&mut dyn Column> {
        match self.columns.get_mut(index) {
            Some(c) => Some(c.as_mut()),
            None => None,
        }
    }

    /// Typed view of the column keyed by `(T, target)`
    pub fn column_typed<T: Component>(&self, target: Target) -> Option<&TypedColumn<T>> {
        let idx = self.column_index(&TypeExpression::of::<T>(target))?;
        self.columns[idx].as_any().downcast_ref::<TypedColumn<T>>()
    }

    /// Mutable typed view of the column keyed by `(T, target)`
    pub fn column_mut_typed<T: Component>(&mut self, target: Target) -> Option<&mut TypedColumn<T>> {
        let idx = self.column_index(&TypeExpression::of::<T>(target))?;
        self.columns[idx]
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
    }

    /// Typed view of a column by precomputed index
    pub(crate) fn column_typed_by_index<T: Component>(
        &self,
        index: usize,
    ) -> Option<&TypedColumn<T>> {
        self.columns
            .get(index)?
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
    }

    /// Mutable typed view of a column by precomputed index
    pub(crate) fn column_mut_typed_by_index<T: Component>(
        &mut self,
        index: usize,
    ) -> Option<&mut TypedColumn<T>> {
        self.columns
            .get_mut(index)?
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
    }

    /// Base pointer of a typed column for query iteration
    ///
    /// Dangling (but non-null) when the column is empty; callers only offset
    /// it by in-bounds rows.
    pub(crate) fn column_ptr<T: Component>(&mut self, index: usize) -> Option<NonNull<T>> {
        let typed = self.column_mut_typed_by_index::<T>(index)?;
        NonNull::new(typed.as_mut_ptr())
    }

    /// Base pointer of the entity column for query iteration
    pub(crate) fn entities_ptr(&mut self) -> Option<NonNull<EntityId>> {
        NonNull::new(self.entities.as_mut_ptr())
    }

    /// Append the entity id; component values are pushed per column afterwards
    pub(crate) fn push_entity(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Overwrite the keyed column with a single value on every row
    pub fn fill(&mut self, expr: &TypeExpression, value: &dyn Any) -> Result<()> {
        let idx = self
            .column_index(expr)
            .ok_or(crate::error::EcsError::ColumnMissing)?;
        self.columns[idx].blit_erased(value)
    }

    /// Remove row and return the entity that was swapped in
    ///
    /// Every column applies the same swap-remove, so rows stay aligned. When
    /// another entity now occupies `row`, it is returned so the caller can
    /// update its directory entry.
    pub(crate) fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        debug_assert!(row < self.entities.len());
        for column in &mut self.columns {
            column.delete(row, 1);
        }
        self.entities.swap_remove(row);
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Move the entity at `row` into `dst`
    ///
    /// Shared columns move their element; source-only columns drop theirs.
    /// Columns that exist only in `dst` are left one short and must be filled
    /// by the caller before the row is observed. Returns the new row in `dst`
    /// and the entity swapped into `row`, if any.
    pub(crate) fn migrate_row(
        &mut self,
        row: usize,
        dst: &mut Archetype,
    ) -> Result<(usize, Option<EntityId>)> {
        debug_assert!(row < self.entities.len());
        let entity = self.entities[row];
        let new_row = dst.entities.len();
        dst.entities.push(entity);

        for (idx, expr) in self.column_exprs.iter().enumerate() {
            match dst.column_indices.get(expr).copied() {
                Some(dst_idx) => {
                    self.columns[idx].move_row(row, dst.columns[dst_idx].as_mut())?;
                }
                None => {
                    self.columns[idx].delete(row, 1);
                }
            }
        }

        self.entities.swap_remove(row);
        let swapped = if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        };
        Ok((new_row, swapped))
    }

    /// Every column must be as long as the entity column
    #[cfg(debug_assertions)]
    pub(crate) fn debug_assert_coherent(&self) {
        for (idx, column) in self.columns.iter().enumerate() {
            debug_assert_eq!(
                column.len(),
                self.entities.len(),
                "column {idx} out of step with entity column"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Hp(u32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Likes(u8);

    fn archetype_with_hp() -> Archetype {
        let sig = Signature::from_exprs([TypeExpression::plain::<Hp>()]);
        let mut arch = Archetype::new(sig);
        arch.register_column::<Hp>(Target::Plain);
        arch
    }

    fn spawn_row(arch: &mut Archetype, entity: EntityId, hp: Hp) -> usize {
        let row = arch.push_entity(entity);
        arch.column_mut_typed::<Hp>(Target::Plain).unwrap().push(hp);
        row
    }

    fn keys(n: usize) -> Vec<EntityId> {
        let mut map = slotmap::SlotMap::<EntityId, ()>::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn remove_row_reports_swapped_entity() {
        let ids = keys(3);
        let mut arch = archetype_with_hp();
        for (i, &id) in ids.iter().enumerate() {
            spawn_row(&mut arch, id, Hp(i as u32));
        }

        let swapped = arch.remove_row(0);
        assert_eq!(swapped, Some(ids[2]));
        assert_eq!(arch.len(), 2);
        assert_eq!(
            arch.column_typed::<Hp>(Target::Plain).unwrap().as_slice(),
            &[Hp(2), Hp(1)]
        );

        let swapped = arch.remove_row(1);
        assert_eq!(swapped, None);
        assert_eq!(arch.len(), 1);
    }

    #[test]
    fn wildcard_match_selects_every_target_column() {
        let ids = keys(2);
        let sig = Signature::from_exprs([
            TypeExpression::of::<Likes>(Target::Entity(ids[0])),
            TypeExpression::of::<Likes>(Target::Entity(ids[1])),
        ]);
        let mut arch = Archetype::new(sig);
        arch.register_column::<Likes>(Target::Entity(ids[0]));
        arch.register_column::<Likes>(Target::Entity(ids[1]));

        let cols = arch.matching_columns(TypeId::of::<Likes>(), &Match::AnyEntity);
        assert_eq!(cols.len(), 2);

        let cols = arch.matching_columns(TypeId::of::<Likes>(), &Match::Entity(ids[1]));
        assert_eq!(cols.len(), 1);

        assert!(!arch.has_matching(TypeId::of::<Likes>(), &Match::Plain));
    }

    #[test]
    fn migrate_row_moves_shared_and_drops_source_only() {
        let ids = keys(2);

        let mut src = archetype_with_hp();
        let likes_expr = TypeExpression::of::<Likes>(Target::Entity(ids[1]));
        src.add_column_raw(likes_expr, Box::new(TypedColumn::<Likes>::new()));
        let sig = Signature::from_exprs([TypeExpression::plain::<Hp>(), likes_expr]);
        src.signature = sig;

        let row = src.push_entity(ids[0]);
        src.column_mut_typed::<Hp>(Target::Plain).unwrap().push(Hp(5));
        src.column_mut_typed::<Likes>(Target::Entity(ids[1]))
            .unwrap()
            .push(Likes(1));

        let mut dst = archetype_with_hp();
        let (new_row, swapped) = src.migrate_row(row, &mut dst).unwrap();
        assert_eq!(new_row, 0);
        assert_eq!(swapped, None);
        assert!(src.is_empty());
        assert_eq!(dst.entity_at(0), Some(ids[0]));
        assert_eq!(
            dst.column_typed::<Hp>(Target::Plain).unwrap().get(0),
            Some(&Hp(5))
        );
    }
}

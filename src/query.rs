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

//! Query system with archetype filtering and column cross-joins
//!
//! A query declares a tuple of stream types, each paired with a target
//! matcher. Matching archetypes are cached and updated incrementally as new
//! archetypes appear. Within an archetype, a wildcard matcher can accept
//! several columns of one component type; iteration enumerates the cartesian
//! product of the per-stream column candidates, so every combination is
//! visited exactly once.

use std::any::TypeId;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::Archetype;
use crate::component::Component;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::expr::{Match, Target, TypeExpression};
use crate::lock::StructuralLock;
use crate::world::World;

/// Maximum number of stream and filter terms held inline
pub const MAX_STREAM_TYPES: usize = 8;

/// Structural predicate over archetype signatures
///
/// Every `required` term must be satisfied by at least one column, no
/// `excluded` term may be satisfied, and when `any_of` is non-empty at least
/// one of its terms must be.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryMask {
    pub(crate) required: SmallVec<[(TypeId, Match); MAX_STREAM_TYPES]>,
    pub(crate) excluded: SmallVec<[(TypeId, Match); MAX_STREAM_TYPES]>,
    pub(crate) any_of: SmallVec<[(TypeId, Match); MAX_STREAM_TYPES]>,
}

impl QueryMask {
    /// Check if an archetype's signature satisfies this mask
    pub fn matches(&self, archetype: &Archetype) -> bool {
        for (type_id, matcher) in &self.required {
            if !archetype.has_matching(*type_id, matcher) {
                return false;
            }
        }
        for (type_id, matcher) in &self.excluded {
            if archetype.has_matching(*type_id, matcher) {
                return false;
            }
        }
        if !self.any_of.is_empty()
            && !self
                .any_of
                .iter()
                .any(|(type_id, matcher)| archetype.has_matching(*type_id, matcher))
        {
            return false;
        }
        true
    }
}

/// Cached result for a specific query mask
pub(crate) struct CachedQueryResult {
    pub(crate) matches: Vec<usize>,
    pub(crate) seen_archetypes: usize,
    pub(crate) mask: QueryMask,
}

impl CachedQueryResult {
    pub(crate) fn new(mask: QueryMask, archetypes: &[Archetype]) -> Self {
        let matches = archetypes
            .iter()
            .enumerate()
            .filter_map(|(id, arch)| if mask.matches(arch) { Some(id) } else { None })
            .collect();

        Self {
            matches,
            seen_archetypes: archetypes.len(),
            mask,
        }
    }

    /// Test only archetypes created since the last call; matches never drop out
    pub(crate) fn update(&mut self, archetypes: &[Archetype]) {
        let count = archetypes.len();
        if count > self.seen_archetypes {
            for (id, arch) in archetypes.iter().enumerate().skip(self.seen_archetypes) {
                if self.mask.matches(arch) {
                    self.matches.push(id);
                }
            }
            self.seen_archetypes = count;
        }
    }
}

/// Tuple of stream component types a query yields per row
///
/// Implemented for component tuples of arity 1 to 4. Each arity is its own
/// compiled form; the iteration skeleton is shared.
///
/// # Safety
/// Implementations must return base pointers from `prepare` that stay valid
/// for the archetype borrow, and `fetch`/`slices` must only be called with
/// in-bounds rows and pairwise-distinct columns.
pub unsafe trait StreamSet<'w>: 'static {
    /// Per-row callback payload: one mutable reference per stream
    type Item;
    /// Bulk payload: one contiguous slice per stream
    type Slices;
    /// Base pointers for one archetype and one column combination
    type State: Copy;

    /// Component type ids in stream order
    fn type_ids() -> SmallVec<[TypeId; MAX_STREAM_TYPES]>;

    /// Resolve base pointers; `columns[i]` is the chosen column for stream `i`
    fn prepare(archetype: &mut Archetype, columns: &[usize]) -> Option<Self::State>;

    /// Fetch references for one row
    ///
    /// # Safety
    /// `row` must be within the archetype's row count at `prepare` time, and
    /// no two live items may alias the same row of the same column.
    unsafe fn fetch(state: &Self::State, row: usize) -> Self::Item;

    /// Borrow the full live region of each chosen column
    ///
    /// # Safety
    /// `len` must equal the archetype's row count at `prepare` time.
    unsafe fn slices(state: &Self::State, len: usize) -> Self::Slices;
}

macro_rules! impl_stream_set {
    ($(($T:ident, $idx:tt)),+) => {
        unsafe impl<'w, $($T: Component),+> StreamSet<'w> for ($($T,)+) {
            type Item = ($(&'w mut $T,)+);
            type Slices = ($(&'w mut [$T],)+);
            type State = ($(NonNull<$T>,)+);

            fn type_ids() -> SmallVec<[TypeId; MAX_STREAM_TYPES]> {
                smallvec![$(TypeId::of::<$T>()),+]
            }

            fn prepare(archetype: &mut Archetype, columns: &[usize]) -> Option<Self::State> {
                Some(($(archetype.column_ptr::<$T>(columns[$idx])?,)+))
            }

            unsafe fn fetch(state: &Self::State, row: usize) -> Self::Item {
                ($(&mut *state.$idx.as_ptr().add(row),)+)
            }

            unsafe fn slices(state: &Self::State, len: usize) -> Self::Slices {
                ($(std::slice::from_raw_parts_mut(state.$idx.as_ptr(), len),)+)
            }
        }
    };
}

impl_stream_set!((A, 0));
impl_stream_set!((A, 0), (B, 1));
impl_stream_set!((A, 0), (B, 1), (C, 2));
impl_stream_set!((A, 0), (B, 1), (C, 2), (D, 3));

/// Per-stream candidate columns within one archetype
///
/// `None` when any stream has no acceptable column there.
fn candidate_columns(
    archetype: &Archetype,
    type_ids: &[TypeId],
    matchers: &[Match],
) -> Option<SmallVec<[SmallVec<[usize; 4]>; MAX_STREAM_TYPES]>> {
    let mut lists = SmallVec::new();
    for (type_id, matcher) in type_ids.iter().zip(matchers.iter()) {
        let columns = archetype.matching_columns(*type_id, matcher);
        if columns.is_empty() {
            return None;
        }
        lists.push(columns);
    }
    Some(lists)
}

fn all_distinct(cols: &[usize]) -> bool {
    for i in 1..cols.len() {
        if cols[..i].contains(&cols[i]) {
            return false;
        }
    }
    true
}

/// Enumerate the cartesian product of candidate columns in lexicographic
/// order, skipping combinations that would select one column twice
fn for_each_column_tuple<F>(candidates: &[SmallVec<[usize; 4]>], mut visit: F)
where
    F: FnMut(&[usize]),
{
    let k = candidates.len();
    debug_assert!(k > 0 && k <= MAX_STREAM_TYPES);
    let mut cursor = [0usize; MAX_STREAM_TYPES];
    let mut cols = [0usize; MAX_STREAM_TYPES];
    loop {
        for i in 0..k {
            cols[i] = candidates[i][cursor[i]];
        }
        if all_distinct(&cols[..k]) {
            visit(&cols[..k]);
        }

        // Advance the rightmost position, carrying leftwards.
        let mut pos = k;
        loop {
            if pos == 0 {
                return;
            }
            pos -= 1;
            cursor[pos] += 1;
            if cursor[pos] < candidates[pos].len() {
                break;
            }
            cursor[pos] = 0;
            if pos == 0 {
                return;
            }
        }
    }
}

/// Compiled view over the archetypes matching a mask
///
/// Holds the world exclusively for its lifetime; every iteration entry point
/// additionally takes the structural read lock for its whole run, so the
/// archetype graph cannot change underneath an iteration even through leaked
/// lock handles.
pub struct Query<'w, S: StreamSet<'w>> {
    world: &'w mut World,
    lock: Arc<StructuralLock>,
    stream_matches: SmallVec<[Match; MAX_STREAM_TYPES]>,
    required_terms: SmallVec<[(TypeId, Match); MAX_STREAM_TYPES]>,
    excluded_terms: SmallVec<[(TypeId, Match); MAX_STREAM_TYPES]>,
    any_of_terms: SmallVec<[(TypeId, Match); MAX_STREAM_TYPES]>,
    _marker: PhantomData<S>,
}

impl<'w, S: StreamSet<'w>> Query<'w, S> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        #[cfg(feature = "profiling")]
        let span = info_span!("query.new", archetype_count = world.archetype_count());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let lock = world.structural_handle();
        let arity = S::type_ids().len();
        Self {
            world,
            lock,
            stream_matches: smallvec![Match::Plain; arity],
            required_terms: SmallVec::new(),
            excluded_terms: SmallVec::new(),
            any_of_terms: SmallVec::new(),
            _marker: PhantomData,
        }
    }

    /// Set the target matcher of one stream position
    pub fn matching(mut self, stream: usize, matcher: Match) -> Self {
        self.stream_matches[stream] = matcher;
        self
    }

    /// Require a column matching `(T, matcher)` without streaming it
    pub fn with<T: Component>(mut self, matcher: Match) -> Self {
        self.required_terms.push((TypeId::of::<T>(), matcher));
        self
    }

    /// Exclude archetypes with a column matching `(T, matcher)`
    pub fn without<T: Component>(mut self, matcher: Match) -> Self {
        self.excluded_terms.push((TypeId::of::<T>(), matcher));
        self
    }

    /// Require at least one of the accumulated `any_of` terms to match
    pub fn any_of<T: Component>(mut self, matcher: Match) -> Self {
        self.any_of_terms.push((TypeId::of::<T>(), matcher));
        self
    }

    /// The structural mask this query compiles to
    pub fn mask(&self) -> QueryMask {
        let type_ids = S::type_ids();
        let mut required: SmallVec<[(TypeId, Match); MAX_STREAM_TYPES]> = type_ids
            .iter()
            .copied()
            .zip(self.stream_matches.iter().copied())
            .collect();
        required.extend(self.required_terms.iter().copied());
        QueryMask {
            required,
            excluded: self.excluded_terms.clone(),
            any_of: self.any_of_terms.clone(),
        }
    }

    /// Total rows across matching archetypes
    ///
    /// Rows, not callback invocations: a wildcard stream matching several
    /// columns visits each row once per column combination.
    pub fn count(&self) -> usize {
        let indices = self.world.matched_archetypes(&self.mask());
        indices
            .iter()
            .filter_map(|&id| self.world.archetype(id))
            .map(|arch| arch.len())
            .sum()
    }

    /// Drive the matched archetypes through every column combination
    fn visit_tuples<F>(&mut self, mut visit: F)
    where
        F: FnMut(&mut Archetype, &[usize]),
    {
        let indices = self.world.matched_archetypes(&self.mask());
        let type_ids = S::type_ids();
        let stream_matches = self.stream_matches.clone();

        let lock = self.lock.clone();
        let _guard = lock.read();

        for id in indices {
            let Some(archetype) = self.world.archetype_mut(id) else {
                continue;
            };
            if archetype.is_empty() {
                continue;
            }
            let Some(candidates) = candidate_columns(archetype, &type_ids, &stream_matches)
            else {
                continue;
            };
            for_each_column_tuple(&candidates, |cols| visit(&mut *archetype, cols));
        }
    }

    /// Invoke `action` once per row and column combination
    pub fn for_each<F>(&mut self, mut action: F)
    where
        F: FnMut(S::Item),
    {
        self.visit_tuples(|archetype, cols| {
            let len = archetype.len();
            if let Some(state) = S::prepare(archetype, cols) {
                for row in 0..len {
                    // SAFETY: row is in bounds and the combination holds
                    // pairwise-distinct columns.
                    action(unsafe { S::fetch(&state, row) });
                }
            }
        });
    }

    /// As `for_each`, threading a caller-supplied value through each call
    pub fn for_each_with<U, F>(&mut self, uniform: &mut U, mut action: F)
    where
        F: FnMut(&mut U, S::Item),
    {
        self.visit_tuples(|archetype, cols| {
            let len = archetype.len();
            if let Some(state) = S::prepare(archetype, cols) {
                for row in 0..len {
                    // SAFETY: as in for_each.
                    action(&mut *uniform, unsafe { S::fetch(&state, row) });
                }
            }
        });
    }

    /// As `for_each`, also passing the entity id of each row
    pub fn for_each_entity<F>(&mut self, mut action: F)
    where
        F: FnMut(EntityId, S::Item),
    {
        self.visit_tuples(|archetype, cols| {
            let len = archetype.len();
            let Some(entities) = archetype.entities_ptr() else {
                return;
            };
            if let Some(state) = S::prepare(archetype, cols) {
                for row in 0..len {
                    // SAFETY: the entity column is as long as every component
                    // column; row is in bounds.
                    let entity = unsafe { *entities.as_ptr().add(row) };
                    action(entity, unsafe { S::fetch(&state, row) });
                }
            }
        });
    }

    /// Entity-aware variant threading a caller-supplied value
    pub fn for_each_entity_with<U, F>(&mut self, uniform: &mut U, mut action: F)
    where
        F: FnMut(&mut U, EntityId, S::Item),
    {
        self.visit_tuples(|archetype, cols| {
            let len = archetype.len();
            let Some(entities) = archetype.entities_ptr() else {
                return;
            };
            if let Some(state) = S::prepare(archetype, cols) {
                for row in 0..len {
                    // SAFETY: as in for_each_entity.
                    let entity = unsafe { *entities.as_ptr().add(row) };
                    action(&mut *uniform, entity, unsafe { S::fetch(&state, row) });
                }
            }
        });
    }

    /// Invoke `action` once per archetype and column combination with
    /// contiguous views over all rows
    ///
    /// Suited to early-exit searches and bulk memory handoff: the callback
    /// may simply stop doing work once it has what it needs.
    pub fn raw<F>(&mut self, mut action: F)
    where
        F: FnMut(S::Slices),
    {
        self.visit_tuples(|archetype, cols| {
            let len = archetype.len();
            if let Some(state) = S::prepare(archetype, cols) {
                // SAFETY: len is the live row count of every chosen column.
                action(unsafe { S::slices(&state, len) });
            }
        });
    }

    /// Bulk variant threading a caller-supplied value
    pub fn raw_with<U, F>(&mut self, uniform: &mut U, mut action: F)
    where
        F: FnMut(&mut U, S::Slices),
    {
        self.visit_tuples(|archetype, cols| {
            let len = archetype.len();
            if let Some(state) = S::prepare(archetype, cols) {
                // SAFETY: as in raw.
                action(&mut *uniform, unsafe { S::slices(&state, len) });
            }
        });
    }

    /// Parallel `for_each`: rows are split into chunks and dispatched onto
    /// the rayon pool; blocks until every chunk completes
    #[cfg(feature = "parallel")]
    pub fn job<F>(&mut self, action: F)
    where
        F: Fn(S::Item) + Send + Sync,
    {
        self.job_with(&(), move |_, item| action(item));
    }

    /// Parallel variant threading a shared caller-supplied value
    #[cfg(feature = "parallel")]
    pub fn job_with<U, F>(&mut self, uniform: &U, action: F)
    where
        U: Sync,
        F: Fn(&U, S::Item) + Send + Sync,
    {
        use rayon::prelude::*;

        let threads = rayon::current_num_threads().max(1);
        self.visit_tuples(|archetype, cols| {
            let len = archetype.len();
            let chunk = (len / threads).max(1);
            let arch_addr = archetype as *mut Archetype as usize;
            let cols: SmallVec<[usize; MAX_STREAM_TYPES]> = cols.iter().copied().collect();

            let mut ranges = Vec::with_capacity(len / chunk + 1);
            let mut start = 0;
            while start < len {
                let end = (start + chunk).min(len);
                ranges.push((start, end));
                start = end;
            }

            ranges.into_par_iter().for_each(|(start, end)| {
                // SAFETY: chunks cover disjoint row ranges of one archetype,
                // the structural read lock is held for the whole dispatch,
                // and this scope outlives every worker task.
                let archetype = unsafe { &mut *(arch_addr as *mut Archetype) };
                if let Some(state) = S::prepare(archetype, &cols) {
                    for row in start..end {
                        // SAFETY: row is within this chunk's disjoint range.
                        action(uniform, unsafe { S::fetch(&state, row) });
                    }
                }
            });
        });
    }

    /// Write one value over the `(T, target)` column of every matched
    /// archetype
    ///
    /// Fails with `ColumnMissing` before writing anything when a matched
    /// archetype lacks the exact column.
    pub fn blit<T: Component>(&mut self, value: T, target: Target) -> Result<()> {
        let indices = self.world.matched_archetypes(&self.mask());
        let lock = self.lock.clone();
        let _guard = lock.read();

        let expr = TypeExpression::of::<T>(target);
        for &id in &indices {
            let missing = self
                .world
                .archetype(id)
                .map(|arch| arch.column_index(&expr).is_none())
                .unwrap_or(true);
            if missing {
                return Err(EcsError::ColumnMissing);
            }
        }
        for &id in &indices {
            if let Some(archetype) = self.world.archetype_mut(id) {
                archetype.fill(&expr, &value)?;
            }
        }
        Ok(())
    }

    /// Run the iteration paths once with a no-op callback
    ///
    /// Semantically nothing happens; match caches and the worker pool are
    /// warmed so the first real iteration pays no setup cost.
    pub fn warmup(&mut self) {
        self.for_each(|_| {});
        #[cfg(feature = "parallel")]
        self.job(|_| {});
    }
}
